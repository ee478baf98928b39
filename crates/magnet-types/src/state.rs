// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Solver State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Per-term breakdown of the optimization objective.
///
/// `data` is 0.5‖Am − b‖²; the regularization terms use the
/// non-dimensionalised weights actually seen by the solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveTerms {
    pub data: f64,
    pub relax: f64,
    pub l2: f64,
    pub l2_shifted: f64,
    pub l1: f64,
    pub l0: f64,
}

impl ObjectiveTerms {
    /// Part of the objective minimized by the inner solver.
    pub fn smooth(&self) -> f64 {
        self.data + self.relax + self.l2 + self.l2_shifted
    }

    pub fn total(&self) -> f64 {
        self.smooth() + self.l1 + self.l0
    }
}

/// One observational snapshot of the inner solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Inner iteration, counted from zero within its solve.
    pub iteration: usize,
    /// Outer relax-and-split step this entry belongs to.
    pub outer_step: usize,
    pub objective: ObjectiveTerms,
    pub moments: Array1<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_sums() {
        let terms = ObjectiveTerms {
            data: 1.0,
            relax: 0.5,
            l2: 0.25,
            l2_shifted: 0.125,
            l1: 2.0,
            l0: 3.0,
        };
        assert!((terms.smooth() - 1.875).abs() < 1e-15);
        assert!((terms.total() - 6.875).abs() < 1e-15);
    }

    #[test]
    fn test_history_entry_json_roundtrip() {
        let entry = HistoryEntry {
            iteration: 7,
            outer_step: 1,
            objective: ObjectiveTerms {
                data: 0.3,
                ..Default::default()
            },
            moments: Array1::from(vec![1.0, -2.0, 0.5]),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: HistoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
