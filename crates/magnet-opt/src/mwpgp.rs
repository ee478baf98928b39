// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — MwPGP Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Modified proportioning with reduced gradient projections (MwPGP).
//!
//! Minimizes ½xᵀHx − hᵀx subject to ‖x_k‖ <= m_max_k for every triplet.
//! Each iteration chooses between a conjugate-gradient step on the free
//! triplets, a feasible half step followed by a projection, and a plain
//! projected-gradient step, depending on how much of the reduced gradient
//! lives on the free set.

use crate::constraints::{
    chopped_gradient, free_gradient, max_feasible_step, project_onto_balls, projected,
};
use magnet_math::linalg::spectral_norm_bound_sym;
use magnet_math::sparse::{csr_matvec, density, truncate_to_csr};
use magnet_types::config::MwpgpParams;
use magnet_types::constants::DIPOLE_DIM;
use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::{Array1, Array2};
use sprs::CsMat;
use tracing::debug;

/// Quadratic model with its ball bounds: sparse H, step size and m_max.
#[derive(Debug, Clone)]
pub struct QpSystem {
    hessian: CsMat<f64>,
    alpha: f64,
    m_max: Array1<f64>,
}

impl QpSystem {
    /// `dense_h` is truncated at `threshold` for storage; the step size
    /// α = 2/U comes from an upper bound U >= ‖H‖₂ of the dense matrix.
    pub fn new(dense_h: &Array2<f64>, m_max: Array1<f64>, threshold: f64) -> MagnetResult<Self> {
        let n = DIPOLE_DIM * m_max.len();
        if dense_h.dim() != (n, n) {
            return Err(MagnetError::shape("QP Hessian", &[n, n], dense_h.shape()));
        }
        let h_norm = spectral_norm_bound_sym(dense_h)?;
        if h_norm <= 0.0 {
            return Err(MagnetError::LinAlg(
                "QP Hessian has zero spectral norm".to_string(),
            ));
        }
        let hessian = truncate_to_csr(dense_h, threshold);
        debug!(dim = n, h_norm, density = density(&hessian), "QP system ready");
        Ok(Self {
            hessian,
            alpha: 2.0 / h_norm,
            m_max,
        })
    }

    pub fn dim(&self) -> usize {
        self.hessian.rows()
    }

    pub fn step_size(&self) -> f64 {
        self.alpha
    }

    pub fn m_max(&self) -> &Array1<f64> {
        &self.m_max
    }

    pub fn hessian(&self) -> &CsMat<f64> {
        &self.hessian
    }

    pub fn apply(&self, x: &Array1<f64>) -> MagnetResult<Array1<f64>> {
        csr_matvec(&self.hessian, x)
    }

    /// H x − h.
    pub fn gradient(&self, x: &Array1<f64>, rhs: &Array1<f64>) -> MagnetResult<Array1<f64>> {
        Ok(self.apply(x)? - rhs)
    }

    /// ½xᵀHx − hᵀx.
    pub fn quadratic(&self, x: &Array1<f64>, rhs: &Array1<f64>) -> MagnetResult<f64> {
        Ok(0.5 * x.dot(&self.apply(x)?) - rhs.dot(x))
    }
}

#[derive(Debug, Clone)]
pub struct MwpgpOutcome {
    pub x: Array1<f64>,
    pub iterations: usize,
    pub converged: bool,
    /// (iteration, iterate) pairs taken every history interval and at exit.
    pub snapshots: Vec<(usize, Array1<f64>)>,
}

pub fn mwpgp(
    system: &QpSystem,
    rhs: &Array1<f64>,
    x0: &Array1<f64>,
    params: &MwpgpParams,
) -> MagnetResult<MwpgpOutcome> {
    let n = system.dim();
    if rhs.len() != n {
        return Err(MagnetError::shape("QP rhs", &[n], &[rhs.len()]));
    }
    if x0.len() != n {
        return Err(MagnetError::shape("initial guess", &[n], &[x0.len()]));
    }
    let alpha = system.step_size();
    let m_max = system.m_max();
    let interval = params.history_interval();

    let mut x = projected(x0, m_max);
    let mut g = system.gradient(&x, rhs)?;
    let mut p = free_gradient(&x, &g, m_max);
    let mut snapshots = Vec::new();
    let mut iterations = 0;
    let mut converged = false;
    let (mut cg_steps, mut mixed_steps, mut pg_steps) = (0usize, 0usize, 0usize);

    for k in 0..params.max_iter {
        if k % interval == 0 {
            snapshots.push((k, x.clone()));
        }
        let x_prev = x.clone();
        let phi = free_gradient(&x, &g, m_max);
        let reduced = &phi + &chopped_gradient(&x, &g, m_max, alpha);
        let proportional = 2.0 * params.delta * reduced.dot(&reduced) <= phi.dot(&phi);

        let mut advanced = false;
        if proportional {
            let hp = system.apply(&p)?;
            let curvature = p.dot(&hp);
            let alpha_cg = if curvature > 0.0 {
                g.dot(&p) / curvature
            } else {
                0.0
            };
            if alpha_cg > 0.0 {
                let alpha_f = max_feasible_step(&x, &p, m_max);
                if alpha_cg < alpha_f {
                    x.scaled_add(-alpha_cg, &p);
                    g.scaled_add(-alpha_cg, &hp);
                    let phi_new = free_gradient(&x, &g, m_max);
                    let gamma = phi_new.dot(&hp) / curvature;
                    p = phi_new - gamma * &p;
                    cg_steps += 1;
                } else {
                    x.scaled_add(-alpha_f, &p);
                    let mut g_half = g.clone();
                    g_half.scaled_add(-alpha_f, &hp);
                    x.scaled_add(-alpha, &g_half);
                    project_onto_balls(&mut x, m_max);
                    g = system.gradient(&x, rhs)?;
                    p = free_gradient(&x, &g, m_max);
                    mixed_steps += 1;
                }
                advanced = true;
            }
        }
        if !advanced {
            x.scaled_add(-alpha, &g);
            project_onto_balls(&mut x, m_max);
            g = system.gradient(&x, rhs)?;
            p = free_gradient(&x, &g, m_max);
            pg_steps += 1;
        }

        iterations = k + 1;
        let change = (&x - &x_prev).fold(0.0f64, |acc, v| acc.max(v.abs()));
        if change < params.epsilon {
            converged = true;
            break;
        }
    }
    if snapshots.last().map(|(k, _)| *k) != Some(iterations) {
        snapshots.push((iterations, x.clone()));
    }
    debug!(
        iterations,
        converged, cg_steps, mixed_steps, pg_steps, "MwPGP finished"
    );
    Ok(MwpgpOutcome {
        x,
        iterations,
        converged,
        snapshots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::is_feasible;
    use ndarray::{array, Array2};

    fn params(max_iter: usize) -> MwpgpParams {
        MwpgpParams {
            max_iter,
            epsilon: 1e-12,
            history_every: Some(1),
            ..Default::default()
        }
    }

    /// Symmetric positive definite 3N × 3N test matrix.
    fn spd(n: usize) -> Array2<f64> {
        let b = Array2::from_shape_fn((n + 2, n), |(i, j)| ((i * 7 + j * 3) as f64 * 0.37).sin());
        b.t().dot(&b) + Array2::<f64>::eye(n) * 0.1
    }

    #[test]
    fn test_interior_optimum_matches_linear_solve() {
        let h = Array2::from_diag(&array![2.0, 4.0, 8.0]);
        let system = QpSystem::new(&h, array![10.0], 0.0).unwrap();
        let rhs = array![2.0, 4.0, 8.0];
        let out = mwpgp(&system, &rhs, &Array1::zeros(3), &params(50)).unwrap();
        assert!(out.converged);
        assert!(out.x.iter().all(|v| (v - 1.0).abs() < 1e-9), "{:?}", out.x);
    }

    #[test]
    fn test_boundary_optimum_on_sphere() {
        let h = Array2::<f64>::eye(3);
        let system = QpSystem::new(&h, array![1.0], 0.0).unwrap();
        let rhs = array![2.0, 0.0, 0.0];
        let out = mwpgp(&system, &rhs, &array![0.0, 0.5, 0.0], &params(200)).unwrap();
        assert!((out.x[0] - 1.0).abs() < 1e-6, "{:?}", out.x);
        assert!(out.x[1].abs() < 1e-6 && out.x[2].abs() < 1e-12);
    }

    #[test]
    fn test_iterates_feasible_and_descending() {
        let n = 12;
        let h = spd(n);
        let m_max = array![0.3, 0.5, 0.0, 1.0];
        let system = QpSystem::new(&h, m_max.clone(), 0.0).unwrap();
        let rhs = Array1::from_shape_fn(n, |i| 3.0 * (1.3 * i as f64).cos());
        let x0 = Array1::from_elem(n, 2.0);
        let out = mwpgp(&system, &rhs, &x0, &params(100)).unwrap();

        let mut last = f64::INFINITY;
        for (k, x) in &out.snapshots {
            assert!(is_feasible(x, &m_max, 1e-12), "infeasible at iteration {k}");
            let f = system.quadratic(x, &rhs).unwrap();
            assert!(f <= last + 1e-9 * last.abs().max(1.0), "ascent at iteration {k}");
            last = f;
        }
        assert_eq!(&out.x.as_slice().unwrap()[6..9], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_clustered_spectrum_keeps_descent() {
        let h = Array2::from_diag(&array![1.0, 0.9999, 0.9999]);
        let system = QpSystem::new(&h, array![1.0], 0.0).unwrap();
        assert!(system.step_size() <= 2.0, "alpha = {}", system.step_size());
        let rhs = array![1e-3, 0.0, 0.0];
        let out = mwpgp(&system, &rhs, &array![1.0, 0.0, 0.0], &params(20)).unwrap();
        let mut last = f64::INFINITY;
        for (k, x) in &out.snapshots {
            let f = system.quadratic(x, &rhs).unwrap();
            assert!(f <= last + 1e-12, "objective rose to {f} at iteration {k}");
            last = f;
        }
        assert!(last <= -4.9e-7, "final objective {last}");
    }

    #[test]
    fn test_history_cadence() {
        let h = spd(6);
        let system = QpSystem::new(&h, array![1.0, 1.0], 0.0).unwrap();
        let rhs = Array1::from_elem(6, 1.0);
        let p = MwpgpParams {
            max_iter: 10,
            epsilon: 0.0,
            history_every: Some(4),
            ..Default::default()
        };
        let out = mwpgp(&system, &rhs, &Array1::zeros(6), &p).unwrap();
        let marks: Vec<usize> = out.snapshots.iter().map(|(k, _)| *k).collect();
        assert_eq!(marks, vec![0, 4, 8, 10]);
        assert_eq!(out.iterations, 10);
        assert!(!out.converged);
    }

    #[test]
    fn test_rejects_bad_shapes_and_zero_hessian() {
        let h = Array2::<f64>::eye(3);
        let system = QpSystem::new(&h, array![1.0], 0.0).unwrap();
        assert!(mwpgp(&system, &Array1::zeros(4), &Array1::zeros(3), &params(5)).is_err());
        assert!(mwpgp(&system, &Array1::zeros(3), &Array1::zeros(6), &params(5)).is_err());
        assert!(matches!(
            QpSystem::new(&Array2::zeros((3, 3)), array![1.0], 0.0),
            Err(MagnetError::LinAlg(_))
        ));
        assert!(matches!(
            QpSystem::new(&h, array![1.0, 1.0], 0.0),
            Err(MagnetError::ShapeMismatch { .. })
        ));
    }
}
