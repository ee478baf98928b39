// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! JSON configuration for grid construction and the constrained solver.
//!
//! Every option that used to travel as a loose keyword is a named field
//! here; algorithm-specific parameters live inside the variant that uses
//! them. Call `validate()` once before handing a config to a solver.

use crate::constants::B_MAX_DEFAULT;
use crate::error::{MagnetError, MagnetResult};
use serde::{Deserialize, Serialize};

/// Top-level optimizer configuration, one JSON file per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagnetConfig {
    #[serde(default)]
    pub name: String,
    pub grid: GridConfig,
    pub solver: SolverConfig,
}

impl MagnetConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> MagnetResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> MagnetResult<()> {
        self.grid.validate()?;
        self.solver.validate()
    }
}

// ── Grid ─────────────────────────────────────────────────────────────

/// Lattice used to seed candidate dipole positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LatticeConfig {
    /// R × Z lattice on every toroidal slice of the plasma surface.
    Cylindrical { dr: f64, dz: f64 },
    /// X × Y × Z lattice, points snapped to the nearest toroidal slice.
    Cartesian { dx: f64, dy: f64, dz: f64 },
}

impl Default for LatticeConfig {
    fn default() -> Self {
        LatticeConfig::Cylindrical { dr: 0.05, dz: 0.05 }
    }
}

impl LatticeConfig {
    pub fn spacings(&self) -> Vec<f64> {
        match *self {
            LatticeConfig::Cylindrical { dr, dz } => vec![dr, dz],
            LatticeConfig::Cartesian { dx, dy, dz } => vec![dx, dy, dz],
        }
    }
}

/// Boundary file formats understood by the surface loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryFormat {
    /// FOCUS/FAMUS plasma boundary file (`n m rc rs zc zs` table).
    Focus,
    /// VMEC input namelist (`RBC(n,m) = ...`).
    VmecInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryFileConfig {
    pub format: BoundaryFormat,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Gap between plasma boundary and inner magnet surface (m).
    pub plasma_offset: f64,
    /// Additional gap between inner and outer magnet surface (m).
    pub coil_offset: f64,
    #[serde(default)]
    pub lattice: LatticeConfig,
    /// Remanent field used for the per-cell moment bound (T).
    #[serde(default = "default_b_max")]
    pub b_max: f64,
    /// Re-load the base surface for the offsets from this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary_file: Option<BoundaryFileConfig>,
    /// Offset the plasma surface itself when no file is given.
    #[serde(default = "default_true")]
    pub derive_from_plasma: bool,
    /// Pre-made FAMUS grid; bypasses lattice construction when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub famus_file: Option<String>,
}

fn default_b_max() -> f64 {
    B_MAX_DEFAULT
}
fn default_true() -> bool {
    true
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            plasma_offset: 0.1,
            coil_offset: 0.2,
            lattice: LatticeConfig::default(),
            b_max: B_MAX_DEFAULT,
            boundary_file: None,
            derive_from_plasma: true,
            famus_file: None,
        }
    }
}

impl GridConfig {
    /// Offsets only matter when the bounding surfaces are derived.
    pub fn validate_offsets(&self) -> MagnetResult<()> {
        if !self.plasma_offset.is_finite() || self.plasma_offset <= 0.0 {
            return Err(MagnetError::ConfigError(format!(
                "grid.plasma_offset must be finite and > 0, got {}",
                self.plasma_offset
            )));
        }
        if !self.coil_offset.is_finite() || self.coil_offset <= 0.0 {
            return Err(MagnetError::ConfigError(format!(
                "grid.coil_offset must be finite and > 0, got {}",
                self.coil_offset
            )));
        }
        Ok(())
    }

    pub fn validate_lattice(&self) -> MagnetResult<()> {
        for spacing in self.lattice.spacings() {
            if !spacing.is_finite() || spacing <= 0.0 {
                return Err(MagnetError::ConfigError(format!(
                    "grid.lattice spacing must be finite and > 0, got {spacing}"
                )));
            }
        }
        if !self.b_max.is_finite() || self.b_max <= 0.0 {
            return Err(MagnetError::ConfigError(format!(
                "grid.b_max must be finite and > 0, got {}",
                self.b_max
            )));
        }
        Ok(())
    }

    pub fn validate(&self) -> MagnetResult<()> {
        self.validate_lattice()?;
        if self.famus_file.is_none() {
            self.validate_offsets()?;
        }
        if let Some(file) = &self.boundary_file {
            if file.path.trim().is_empty() {
                return Err(MagnetError::ConfigError(
                    "grid.boundary_file.path must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ── Solver ───────────────────────────────────────────────────────────

/// Parameters of the projected/conjugate gradient inner solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MwpgpParams {
    #[serde(default = "default_mwpgp_max_iter")]
    pub max_iter: usize,
    /// Stop once the largest per-coordinate change drops below this.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Proportioning constant of the CG/projection switch.
    #[serde(default = "default_delta")]
    pub delta: f64,
    #[serde(default)]
    pub reg_l2: f64,
    /// Weight of the penalty pulling every moment towards its bound.
    #[serde(default)]
    pub reg_l2_shifted: f64,
    /// Record a history entry every this many iterations (default: max_iter / 10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_every: Option<usize>,
}

fn default_mwpgp_max_iter() -> usize {
    50
}
fn default_epsilon() -> f64 {
    1e-4
}
fn default_delta() -> f64 {
    0.5
}

impl Default for MwpgpParams {
    fn default() -> Self {
        Self {
            max_iter: default_mwpgp_max_iter(),
            epsilon: default_epsilon(),
            delta: default_delta(),
            reg_l2: 0.0,
            reg_l2_shifted: 0.0,
            history_every: None,
        }
    }
}

impl MwpgpParams {
    pub fn history_interval(&self) -> usize {
        self.history_every
            .unwrap_or(self.max_iter / 10)
            .max(1)
    }

    pub fn validate(&self) -> MagnetResult<()> {
        if self.max_iter == 0 {
            return Err(MagnetError::ConfigError(
                "mwpgp.max_iter must be >= 1".to_string(),
            ));
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(MagnetError::ConfigError(
                "mwpgp.epsilon must be finite and >= 0".to_string(),
            ));
        }
        if !self.delta.is_finite() || self.delta <= 0.0 {
            return Err(MagnetError::ConfigError(
                "mwpgp.delta must be finite and > 0".to_string(),
            ));
        }
        if !self.reg_l2.is_finite() || self.reg_l2 < 0.0 {
            return Err(MagnetError::ConfigError(
                "mwpgp.reg_l2 must be finite and >= 0".to_string(),
            ));
        }
        if !self.reg_l2_shifted.is_finite() || self.reg_l2_shifted < 0.0 {
            return Err(MagnetError::ConfigError(
                "mwpgp.reg_l2_shifted must be finite and >= 0".to_string(),
            ));
        }
        if self.history_every == Some(0) {
            return Err(MagnetError::ConfigError(
                "mwpgp.history_every must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Non-smooth penalty handled by the proximal step of relax-and-split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SparsityPenalty {
    /// Count of active dipoles; `reg` is dimensionless in [0, 1].
    L0 { reg: f64 },
    /// Sum of absolute moment components; `reg` is in moment units.
    L1 { reg: f64 },
}

impl SparsityPenalty {
    pub fn reg(&self) -> f64 {
        match *self {
            SparsityPenalty::L0 { reg } | SparsityPenalty::L1 { reg } => reg,
        }
    }

    pub fn with_reg(&self, reg: f64) -> Self {
        match self {
            SparsityPenalty::L0 { .. } => SparsityPenalty::L0 { reg },
            SparsityPenalty::L1 { .. } => SparsityPenalty::L1 { reg },
        }
    }
}

/// How the penalty weight evolves over the outer iterations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Escalation {
    #[default]
    Constant,
    /// Start at `initial_fraction · reg`, reach `reg` at the last outer step.
    Linear { initial_fraction: f64 },
}

impl Escalation {
    pub fn factor(&self, step: usize, total_steps: usize) -> f64 {
        match *self {
            Escalation::Constant => 1.0,
            Escalation::Linear { initial_fraction } => {
                if total_steps <= 1 {
                    return 1.0;
                }
                let t = step.min(total_steps - 1) as f64 / (total_steps - 1) as f64;
                initial_fraction + (1.0 - initial_fraction) * t
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxSplitParams {
    /// Coupling between the smooth variable and its sparse proxy.
    #[serde(default = "default_nu")]
    pub nu: f64,
    #[serde(default = "default_rs_max_iter")]
    pub max_iter: usize,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default)]
    pub escalation: Escalation,
}

fn default_nu() -> f64 {
    1e3
}
fn default_rs_max_iter() -> usize {
    4
}

impl Default for RelaxSplitParams {
    fn default() -> Self {
        Self {
            nu: default_nu(),
            max_iter: default_rs_max_iter(),
            epsilon: default_epsilon(),
            escalation: Escalation::Constant,
        }
    }
}

/// Solver variant with the parameters only that variant reads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Algorithm {
    /// Single convex solve, no sparsity penalty.
    #[default]
    Mwpgp,
    RelaxAndSplit {
        penalty: SparsityPenalty,
        #[serde(default)]
        params: RelaxSplitParams,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitialGuess {
    Zero,
    /// Uniform inside each moment bound, reproducible from `seed`.
    Random { seed: u64 },
    /// Minimum-norm least-squares solution projected onto the bounds.
    #[default]
    PseudoInverse,
    /// Flat moment vector of length 3N.
    Provided { moments: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub mwpgp: MwpgpParams,
    #[serde(default)]
    pub initial_guess: InitialGuess,
    /// Normal-matrix entries at or below this magnitude are dropped.
    #[serde(default = "default_geometric_threshold")]
    pub geometric_threshold: f64,
}

fn default_geometric_threshold() -> f64 {
    1e-50
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            mwpgp: MwpgpParams::default(),
            initial_guess: InitialGuess::default(),
            geometric_threshold: default_geometric_threshold(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> MagnetResult<()> {
        self.mwpgp.validate()?;
        if !self.geometric_threshold.is_finite() || self.geometric_threshold < 0.0 {
            return Err(MagnetError::ConfigError(
                "solver.geometric_threshold must be finite and >= 0".to_string(),
            ));
        }
        if let InitialGuess::Provided { moments } = &self.initial_guess {
            if moments.iter().any(|v| !v.is_finite()) {
                return Err(MagnetError::ConfigError(
                    "solver.initial_guess contains non-finite moments".to_string(),
                ));
            }
        }
        if let Algorithm::RelaxAndSplit { penalty, params } = &self.algorithm {
            match *penalty {
                SparsityPenalty::L0 { reg } => {
                    if !reg.is_finite() || !(0.0..=1.0).contains(&reg) {
                        return Err(MagnetError::ConfigError(format!(
                            "L0 regularization must be in [0, 1], got {reg}"
                        )));
                    }
                }
                SparsityPenalty::L1 { reg } => {
                    if !reg.is_finite() || reg < 0.0 {
                        return Err(MagnetError::ConfigError(format!(
                            "L1 regularization must be finite and >= 0, got {reg}"
                        )));
                    }
                }
            }
            if !params.nu.is_finite() || params.nu <= 0.0 {
                return Err(MagnetError::ConfigError(
                    "relax_split.nu must be finite and > 0".to_string(),
                ));
            }
            if params.max_iter == 0 {
                return Err(MagnetError::ConfigError(
                    "relax_split.max_iter must be >= 1".to_string(),
                ));
            }
            if !params.epsilon.is_finite() || params.epsilon < 0.0 {
                return Err(MagnetError::ConfigError(
                    "relax_split.epsilon must be finite and >= 0".to_string(),
                ));
            }
            if let Escalation::Linear { initial_fraction } = params.escalation {
                if !initial_fraction.is_finite() || !(0.0..=1.0).contains(&initial_fraction) {
                    return Err(MagnetError::ConfigError(format!(
                        "relax_split.escalation.initial_fraction must be in [0, 1], got {initial_fraction}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// CARGO_MANIFEST_DIR points to crates/magnet-types/, two levels below the root.
    fn project_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
    }

    fn config_path(relative: &str) -> String {
        project_root().join(relative).to_string_lossy().to_string()
    }

    #[test]
    fn test_load_relax_split_config() {
        let cfg = MagnetConfig::from_file(&config_path("configs/relax_split_l0.json")).unwrap();
        assert_eq!(cfg.name, "torus-l0-demo");
        assert!((cfg.grid.plasma_offset - 0.05).abs() < 1e-12);
        assert!((cfg.grid.b_max - 1.4).abs() < 1e-12);
        match &cfg.solver.algorithm {
            Algorithm::RelaxAndSplit { penalty, params } => {
                assert_eq!(*penalty, SparsityPenalty::L0 { reg: 0.05 });
                assert_eq!(params.max_iter, 6);
                assert_eq!(
                    params.escalation,
                    Escalation::Linear {
                        initial_fraction: 0.25
                    }
                );
            }
            other => panic!("unexpected algorithm {other:?}"),
        }
        cfg.validate().unwrap();
    }

    #[test]
    fn test_load_all_configs() {
        for relative in ["configs/relax_split_l0.json", "configs/convex_cartesian.json"] {
            let path = config_path(relative);
            let cfg = MagnetConfig::from_file(&path);
            assert!(cfg.is_ok(), "Failed to load config: {path}");
            assert!(cfg.unwrap().validate().is_ok(), "Invalid config: {path}");
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = MagnetConfig::from_file("/nonexistent/magnet.json").unwrap_err();
        assert!(matches!(err, MagnetError::Io(_)));
    }

    #[test]
    fn test_defaults_are_valid() {
        GridConfig::default().validate().unwrap();
        SolverConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_nonpositive_offsets() {
        let cfg = GridConfig {
            coil_offset: 0.0,
            ..Default::default()
        };
        let err = cfg.validate().expect_err("zero coil offset must fail");
        match err {
            MagnetError::ConfigError(msg) => assert!(msg.contains("coil_offset")),
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_famus_grid_skips_offset_check() {
        let cfg = GridConfig {
            plasma_offset: -1.0,
            famus_file: Some("grid.focus".to_string()),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_spacing() {
        let cfg = GridConfig {
            lattice: LatticeConfig::Cartesian {
                dx: 0.05,
                dy: -0.05,
                dz: 0.05,
            },
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(MagnetError::ConfigError(msg)) if msg.contains("spacing")
        ));
    }

    #[test]
    fn test_rejects_l0_outside_unit_interval() {
        let cfg = SolverConfig {
            algorithm: Algorithm::RelaxAndSplit {
                penalty: SparsityPenalty::L0 { reg: 1.5 },
                params: RelaxSplitParams::default(),
            },
            ..Default::default()
        };
        let err = cfg.validate().expect_err("reg_l0 > 1 must fail");
        match err {
            MagnetError::ConfigError(msg) => assert!(msg.contains("[0, 1]")),
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_nonpositive_nu() {
        let cfg = SolverConfig {
            algorithm: Algorithm::RelaxAndSplit {
                penalty: SparsityPenalty::L1 { reg: 1e-3 },
                params: RelaxSplitParams {
                    nu: 0.0,
                    ..Default::default()
                },
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_history_interval_defaults_to_tenth() {
        let params = MwpgpParams {
            max_iter: 200,
            ..Default::default()
        };
        assert_eq!(params.history_interval(), 20);
        let params = MwpgpParams {
            max_iter: 5,
            ..Default::default()
        };
        assert_eq!(params.history_interval(), 1);
    }

    #[test]
    fn test_linear_escalation_endpoints() {
        let esc = Escalation::Linear {
            initial_fraction: 0.2,
        };
        assert!((esc.factor(0, 5) - 0.2).abs() < 1e-12);
        assert!((esc.factor(4, 5) - 1.0).abs() < 1e-12);
        assert!((esc.factor(2, 5) - 0.6).abs() < 1e-12);
        assert!((Escalation::Constant.factor(3, 5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_algorithm_json_tagging() {
        let json = r#"{"kind":"relax_and_split","penalty":{"kind":"l1","reg":0.01}}"#;
        let alg: Algorithm = serde_json::from_str(json).unwrap();
        match alg {
            Algorithm::RelaxAndSplit { penalty, params } => {
                assert_eq!(penalty, SparsityPenalty::L1 { reg: 0.01 });
                assert_eq!(params, RelaxSplitParams::default());
            }
            other => panic!("unexpected algorithm {other:?}"),
        }
    }
}
