// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Ball Constraints
// © 1998–2026 Miroslav Šotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-dipole Euclidean ball constraints ‖m_k‖ <= m_max_k.
//!
//! Moments are stored flat as `[m_0x, m_0y, m_0z, m_1x, ...]`; the bound
//! vector holds one radius per triplet.

use magnet_types::constants::DIPOLE_DIM;
use ndarray::Array1;

/// Squared-norm slack used to decide whether a triplet sits on its sphere.
const ACTIVE_REL_TOL: f64 = 1e-8;

#[inline]
fn triplet(x: &Array1<f64>, k: usize) -> [f64; 3] {
    let i = DIPOLE_DIM * k;
    [x[i], x[i + 1], x[i + 2]]
}

#[inline]
fn norm_sq(v: [f64; 3]) -> f64 {
    v[0] * v[0] + v[1] * v[1] + v[2] * v[2]
}

/// A triplet is active when it lies on (or outside) its sphere. A zero
/// bound pins the triplet, so it always counts as active.
#[inline]
pub fn is_active(v: [f64; 3], m_max: f64) -> bool {
    m_max <= 0.0 || norm_sq(v) >= m_max * m_max * (1.0 - ACTIVE_REL_TOL)
}

/// Radial projection of every triplet onto its ball, in place.
pub fn project_onto_balls(x: &mut Array1<f64>, m_max: &Array1<f64>) {
    for (k, &m) in m_max.iter().enumerate() {
        let i = DIPOLE_DIM * k;
        if m <= 0.0 {
            x[i] = 0.0;
            x[i + 1] = 0.0;
            x[i + 2] = 0.0;
            continue;
        }
        let len = norm_sq(triplet(x, k)).sqrt();
        if len > m {
            let s = m / len;
            x[i] *= s;
            x[i + 1] *= s;
            x[i + 2] *= s;
        }
    }
}

pub fn projected(x: &Array1<f64>, m_max: &Array1<f64>) -> Array1<f64> {
    let mut out = x.clone();
    project_onto_balls(&mut out, m_max);
    out
}

/// φ(x): the gradient restricted to free triplets.
pub fn free_gradient(x: &Array1<f64>, g: &Array1<f64>, m_max: &Array1<f64>) -> Array1<f64> {
    let mut phi = g.clone();
    for (k, &m) in m_max.iter().enumerate() {
        if is_active(triplet(x, k), m) {
            let i = DIPOLE_DIM * k;
            phi[i] = 0.0;
            phi[i + 1] = 0.0;
            phi[i + 2] = 0.0;
        }
    }
    phi
}

/// β̃(x): the chopped gradient on active triplets.
///
/// When the gradient points along the outward normal a descent step moves
/// inward, so the full gradient is kept; otherwise the scaled projected
/// gradient `(x − P(x − αg)) / α` is used.
pub fn chopped_gradient(
    x: &Array1<f64>,
    g: &Array1<f64>,
    m_max: &Array1<f64>,
    alpha: f64,
) -> Array1<f64> {
    let mut beta = Array1::zeros(x.len());
    for (k, &m) in m_max.iter().enumerate() {
        let xk = triplet(x, k);
        if !is_active(xk, m) {
            continue;
        }
        let gk = triplet(g, k);
        let i = DIPOLE_DIM * k;
        let len = norm_sq(xk).sqrt();
        let outward = len > 0.0 && (xk[0] * gk[0] + xk[1] * gk[1] + xk[2] * gk[2]) / len > 0.0;
        if outward {
            for c in 0..DIPOLE_DIM {
                beta[i + c] = gk[c];
            }
            continue;
        }
        let mut trial = [xk[0] - alpha * gk[0], xk[1] - alpha * gk[1], xk[2] - alpha * gk[2]];
        let trial_len = norm_sq(trial).sqrt();
        if m <= 0.0 {
            trial = [0.0; 3];
        } else if trial_len > m {
            let s = m / trial_len;
            trial = [trial[0] * s, trial[1] * s, trial[2] * s];
        }
        for c in 0..DIPOLE_DIM {
            beta[i + c] = (xk[c] - trial[c]) / alpha;
        }
    }
    beta
}

/// φ(x) + β̃(x). Vanishes exactly at constrained stationary points.
pub fn reduced_projected_gradient(
    x: &Array1<f64>,
    g: &Array1<f64>,
    m_max: &Array1<f64>,
    alpha: f64,
) -> Array1<f64> {
    free_gradient(x, g, m_max) + chopped_gradient(x, g, m_max, alpha)
}

/// Largest α >= 0 with every triplet of `x − α·p` still inside its ball.
/// Returns `f64::INFINITY` when `p` moves no triplet.
pub fn max_feasible_step(x: &Array1<f64>, p: &Array1<f64>, m_max: &Array1<f64>) -> f64 {
    let mut alpha = f64::INFINITY;
    for (k, &m) in m_max.iter().enumerate() {
        let xk = triplet(x, k);
        let pk = triplet(p, k);
        let a = norm_sq(pk);
        if a <= 0.0 {
            continue;
        }
        let b = -2.0 * (xk[0] * pk[0] + xk[1] * pk[1] + xk[2] * pk[2]);
        let c = (norm_sq(xk) - m.max(0.0).powi(2)).min(0.0);
        let root = (-b + (b * b - 4.0 * a * c).max(0.0).sqrt()) / (2.0 * a);
        alpha = alpha.min(root.max(0.0));
    }
    alpha
}

pub fn is_feasible(x: &Array1<f64>, m_max: &Array1<f64>, rel_tol: f64) -> bool {
    m_max.iter().enumerate().all(|(k, &m)| {
        let len = norm_sq(triplet(x, k)).sqrt();
        len <= m.max(0.0) * (1.0 + rel_tol) + f64::MIN_POSITIVE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_projection_scales_only_outside_points() {
        let mut x = array![3.0, 4.0, 0.0, 0.1, 0.0, 0.0, 1.0, 1.0, 1.0];
        let m = array![1.0, 1.0, 0.0];
        project_onto_balls(&mut x, &m);
        assert!((x[0] - 0.6).abs() < 1e-15 && (x[1] - 0.8).abs() < 1e-15);
        assert_eq!(x[3], 0.1);
        assert_eq!(&x.as_slice().unwrap()[6..], &[0.0, 0.0, 0.0]);
        assert!(is_feasible(&x, &m, 0.0));
    }

    #[test]
    fn test_active_set_detection() {
        assert!(is_active([0.6, 0.8, 0.0], 1.0));
        assert!(is_active([0.6, 0.8 * (1.0 - 1e-10), 0.0], 1.0));
        assert!(!is_active([0.5, 0.0, 0.0], 1.0));
        assert!(is_active([0.0, 0.0, 0.0], 0.0));
    }

    #[test]
    fn test_free_and_chopped_split() {
        let x = array![1.0, 0.0, 0.0, 0.2, 0.0, 0.0];
        let m = array![1.0, 1.0];
        let g = array![-1.0, 0.5, 0.0, 0.3, 0.3, 0.3];
        let phi = free_gradient(&x, &g, &m);
        assert_eq!(phi.to_vec(), vec![0.0, 0.0, 0.0, 0.3, 0.3, 0.3]);

        // Active triplet pushed outward: only the tangential part survives.
        let beta = chopped_gradient(&x, &g, &m, 1e-3);
        assert!(beta[0].abs() < 1e-3, "radial part {}", beta[0]);
        assert!((beta[1] - 0.5).abs() < 1e-3);
        assert_eq!(&beta.as_slice().unwrap()[3..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_inward_gradient_is_kept_whole() {
        let x = array![0.0, 1.0, 0.0];
        let g = array![0.2, 0.7, -0.1];
        let beta = chopped_gradient(&x, &g, &array![1.0], 0.1);
        assert_eq!(beta, g);
    }

    #[test]
    fn test_stationary_boundary_point() {
        // Minimizer of ‖x − (2,0,0)‖² on the unit ball sits at (1,0,0).
        let x = array![1.0, 0.0, 0.0];
        let g = array![-2.0, 0.0, 0.0];
        let r = reduced_projected_gradient(&x, &g, &array![1.0], 0.5);
        assert!(r.iter().all(|v| v.abs() < 1e-14), "{r:?}");
    }

    #[test]
    fn test_max_feasible_step_hits_sphere() {
        let x = array![0.0, 0.0, 0.0, 0.5, 0.0, 0.0];
        let p = array![-1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let m = array![2.0, 1.0];
        let alpha = max_feasible_step(&x, &p, &m);
        assert!((alpha - 2.0).abs() < 1e-14);
        let zero = Array1::zeros(6);
        assert!(max_feasible_step(&x, &zero, &m).is_infinite());
    }
}
