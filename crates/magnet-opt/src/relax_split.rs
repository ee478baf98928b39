// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Relax-and-Split
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Outer relax-and-split loop around MwPGP.
//!
//! The smooth objective is solved for `m` with a coupling term pulling it
//! towards the sparse proxy `w`; `w` is then the proximal map of the sparsity
//! penalty applied to `m`. Penalty weights are non-dimensionalised by ‖AᵀA‖₂
//! so the same numbers work across grids of different size.

use crate::constraints::project_onto_balls;
use crate::mwpgp::{mwpgp, QpSystem};
use crate::problem::MagnetProblem;
use magnet_math::linalg::{cgls, pinv_svd};
use magnet_types::config::{Algorithm, InitialGuess, MwpgpParams, SolverConfig, SparsityPenalty};
use magnet_types::constants::DIPOLE_DIM;
use magnet_types::error::{MagnetError, MagnetResult};
use magnet_types::state::{HistoryEntry, ObjectiveTerms};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument};

/// Above this many unknowns the pseudo-inverse guess uses CGLS instead of SVD.
const PINV_SVD_MAX_DIM: usize = 60;

#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Solution of the smooth subproblem.
    pub m: Array1<f64>,
    /// Sparse proxy after the last proximal step (equals `m` without a penalty).
    pub m_proxy: Array1<f64>,
    pub history: Vec<HistoryEntry>,
    /// Objective breakdown after each outer step.
    pub outer_objectives: Vec<ObjectiveTerms>,
    pub inner_iterations: usize,
    pub outer_iterations: usize,
    pub converged: bool,
    /// Mean |B·n| (T) of the initial guess.
    pub initial_bnormal: f64,
    pub final_bnormal: f64,
    pub final_bnormal_proxy: f64,
}

impl OptimizationResult {
    /// Triplets of the proxy with non-zero moment.
    pub fn active_dipoles(&self) -> usize {
        nonzero_triplets(&self.m_proxy)
    }
}

// ── Proximal operators ───────────────────────────────────────────────

/// Hard threshold per triplet: zero every dipole with ‖m_k‖ < `threshold`.
pub fn prox_l0(m: &Array1<f64>, threshold: f64) -> Array1<f64> {
    let mut w = m.clone();
    for mut t in w.exact_chunks_mut(DIPOLE_DIM) {
        if t.dot(&t).sqrt() < threshold {
            t.fill(0.0);
        }
    }
    w
}

/// Soft threshold per coordinate.
pub fn prox_l1(m: &Array1<f64>, threshold: f64) -> Array1<f64> {
    m.mapv(|v| v.signum() * (v.abs() - threshold).max(0.0))
}

fn nonzero_triplets(m: &Array1<f64>) -> usize {
    m.exact_chunks(DIPOLE_DIM)
        .into_iter()
        .filter(|t| t.iter().any(|v| *v != 0.0))
        .count()
}

/// Penalty weight as seen by the solver; `nu` is the unscaled coupling.
pub fn scaled_penalty(penalty: &SparsityPenalty, nu: f64, ata_scale: f64, max_moment: f64) -> f64 {
    match *penalty {
        SparsityPenalty::L0 { reg } => reg * ata_scale * max_moment * max_moment / (2.0 * nu),
        SparsityPenalty::L1 { reg } => reg * ata_scale / nu,
    }
}

/// Proximal map of the scaled penalty with coupling νₛ.
fn prox(penalty: &SparsityPenalty, reg_s: f64, nu_s: f64, m: &Array1<f64>) -> Array1<f64> {
    match penalty {
        SparsityPenalty::L0 { .. } => prox_l0(m, (2.0 * reg_s * nu_s).sqrt()),
        SparsityPenalty::L1 { .. } => prox_l1(m, reg_s * nu_s),
    }
}

// ── Initial guess ────────────────────────────────────────────────────

/// Starting moments, always projected onto the ball constraints.
pub fn initial_guess(problem: &MagnetProblem, guess: &InitialGuess) -> MagnetResult<Array1<f64>> {
    let m_max = problem.grid().m_maxima();
    let n = DIPOLE_DIM * m_max.len();
    let mut m = match guess {
        InitialGuess::Zero => Array1::zeros(n),
        InitialGuess::Random { seed } => {
            let mut rng = StdRng::seed_from_u64(*seed);
            Array1::from_shape_fn(n, |i| {
                let bound = m_max[i / DIPOLE_DIM];
                if bound > 0.0 {
                    rng.gen_range(-bound..=bound)
                } else {
                    0.0
                }
            })
        }
        InitialGuess::PseudoInverse => least_squares(problem.operator().a(), problem.operator().b())?,
        InitialGuess::Provided { moments } => {
            if moments.len() != n {
                return Err(MagnetError::ConfigError(format!(
                    "initial guess has {} entries, expected 3 × {} = {n}",
                    moments.len(),
                    m_max.len()
                )));
            }
            Array1::from(moments.clone())
        }
    };
    project_onto_balls(&mut m, m_max);
    Ok(m)
}

/// Minimum-norm least-squares solution of A m = b.
fn least_squares(a: &Array2<f64>, b: &Array1<f64>) -> MagnetResult<Array1<f64>> {
    if a.ncols() <= PINV_SVD_MAX_DIM {
        let frobenius = a.iter().map(|v| v * v).sum::<f64>().sqrt();
        Ok(pinv_svd(a, 1e-10 * frobenius).dot(b))
    } else {
        cgls(a, b, 0.0, 2 * a.ncols(), 1e-10)
    }
}

// ── Objective bookkeeping ────────────────────────────────────────────

struct ObjectiveWeights<'a> {
    params: &'a MwpgpParams,
    shift: &'a Array1<f64>,
    nu_s: Option<f64>,
    penalty: Option<(SparsityPenalty, f64)>,
}

impl ObjectiveWeights<'_> {
    fn evaluate(
        &self,
        problem: &MagnetProblem,
        m: &Array1<f64>,
        w: &Array1<f64>,
    ) -> MagnetResult<ObjectiveTerms> {
        let mut terms = ObjectiveTerms {
            data: problem.operator().squared_flux(m)?,
            l2: self.params.reg_l2 * m.dot(m),
            ..Default::default()
        };
        if self.params.reg_l2_shifted > 0.0 {
            let d = m - self.shift;
            terms.l2_shifted = self.params.reg_l2_shifted * d.dot(&d);
        }
        if let Some(nu_s) = self.nu_s {
            let d = m - w;
            terms.relax = d.dot(&d) / (2.0 * nu_s);
        }
        match self.penalty {
            Some((SparsityPenalty::L0 { .. }, reg_s)) => terms.l0 = reg_s * nonzero_triplets(w) as f64,
            Some((SparsityPenalty::L1 { .. }, reg_s)) => {
                terms.l1 = reg_s * w.mapv(f64::abs).sum()
            }
            None => {}
        }
        Ok(terms)
    }
}

fn add_to_diagonal(h: &mut Array2<f64>, value: f64) {
    if value != 0.0 {
        h.diag_mut().mapv_inplace(|d| d + value);
    }
}

// ── Driver ───────────────────────────────────────────────────────────

/// Run the configured solver on a prepared problem.
#[instrument(skip_all, fields(dipoles = problem.num_dipoles()))]
pub fn optimize(problem: &MagnetProblem, config: &SolverConfig) -> MagnetResult<OptimizationResult> {
    config.validate()?;
    let op = problem.operator();
    let ata_scale = op.ata_scale();
    if ata_scale <= 0.0 {
        return Err(MagnetError::LinAlg(
            "AᵀA vanishes: no dipole couples to the plasma boundary".to_string(),
        ));
    }
    let params = &config.mwpgp;
    let m_max = problem.grid().m_maxima();
    let shift = Array1::from_shape_fn(op.num_moments(), |i| m_max[i / DIPOLE_DIM]);

    let mut rhs_base = op.atb().clone();
    rhs_base.scaled_add(2.0 * params.reg_l2_shifted, &shift);
    let mut hessian = op.ata().clone();
    add_to_diagonal(&mut hessian, 2.0 * (params.reg_l2 + params.reg_l2_shifted));

    let m0 = initial_guess(problem, &config.initial_guess)?;
    let initial_bnormal = op.mean_abs_bnormal(&m0)?;
    info!(initial_bnormal, ata_scale, "starting permanent-magnet solve");

    let mut history = Vec::new();
    let mut outer_objectives = Vec::new();
    let mut inner_iterations = 0;

    let (m, m_proxy, outer_iterations, converged) = match &config.algorithm {
        Algorithm::Mwpgp => {
            let system = QpSystem::new(&hessian, m_max.clone(), config.geometric_threshold)?;
            let outcome = mwpgp(&system, &rhs_base, &m0, params)?;
            let weights = ObjectiveWeights {
                params,
                shift: &shift,
                nu_s: None,
                penalty: None,
            };
            for (iteration, x) in outcome.snapshots {
                history.push(HistoryEntry {
                    iteration,
                    outer_step: 0,
                    objective: weights.evaluate(problem, &x, &x)?,
                    moments: x,
                });
            }
            outer_objectives.push(weights.evaluate(problem, &outcome.x, &outcome.x)?);
            inner_iterations = outcome.iterations;
            (outcome.x.clone(), outcome.x, 1, outcome.converged)
        }
        Algorithm::RelaxAndSplit { penalty, params: rs } => {
            let nu_s = rs.nu / ata_scale;
            add_to_diagonal(&mut hessian, 1.0 / nu_s);
            let system = QpSystem::new(&hessian, m_max.clone(), config.geometric_threshold)?;
            let max_moment = problem.grid().max_moment();

            let mut m = m0.clone();
            let mut w = m0;
            let mut steps = 0;
            let mut converged = false;
            for step in 0..rs.max_iter {
                let stepped = penalty.with_reg(penalty.reg() * rs.escalation.factor(step, rs.max_iter));
                let reg_s = scaled_penalty(&stepped, rs.nu, ata_scale, max_moment);
                let weights = ObjectiveWeights {
                    params,
                    shift: &shift,
                    nu_s: Some(nu_s),
                    penalty: Some((stepped, reg_s)),
                };

                let mut rhs = rhs_base.clone();
                rhs.scaled_add(1.0 / nu_s, &w);
                let outcome = mwpgp(&system, &rhs, &m, params)?;
                inner_iterations += outcome.iterations;
                for (iteration, x) in outcome.snapshots {
                    history.push(HistoryEntry {
                        iteration,
                        outer_step: step,
                        objective: weights.evaluate(problem, &x, &w)?,
                        moments: x,
                    });
                }
                m = outcome.x;
                w = prox(&stepped, reg_s, nu_s, &m);
                let terms = weights.evaluate(problem, &m, &w)?;
                let gap = (&m - &w).mapv(|v| v * v).sum().sqrt();
                info!(
                    step,
                    reg = reg_s,
                    data = terms.data,
                    total = terms.total(),
                    active = nonzero_triplets(&w),
                    gap,
                    "relax-and-split step"
                );
                outer_objectives.push(terms);
                steps = step + 1;
                if gap < rs.epsilon {
                    converged = true;
                    break;
                }
            }
            (m, w, steps, converged)
        }
    };

    let final_bnormal = op.mean_abs_bnormal(&m)?;
    let final_bnormal_proxy = op.mean_abs_bnormal(&m_proxy)?;
    debug!(inner_iterations, outer_iterations, converged, "solver loop done");
    info!(
        initial_bnormal,
        final_bnormal,
        final_bnormal_proxy,
        active = nonzero_triplets(&m_proxy),
        "permanent-magnet solve finished"
    );
    Ok(OptimizationResult {
        m,
        m_proxy,
        history,
        outer_objectives,
        inner_iterations,
        outer_iterations,
        converged,
        initial_bnormal,
        final_bnormal,
        final_bnormal_proxy,
    })
}
