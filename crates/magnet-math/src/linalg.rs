// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Linear Algebra
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Linear algebra utilities.
//!
//! Spectral norm by power iteration plus a certified upper bound, CGLS least
//! squares, and a small Jacobi SVD / pseudo-inverse used as a reference for
//! the iterative paths.

use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::{Array1, Array2};

const POWER_ITER_MAX: usize = 1000;
const POWER_ITER_TOL: f64 = 1e-12;

/// Largest eigenvalue magnitude of a symmetric matrix, i.e. ‖A‖₂.
///
/// Power iteration from a fixed, non-degenerate start vector so results are
/// reproducible. The estimate approaches ‖A‖₂ from below.
pub fn spectral_norm_sym(a: &Array2<f64>) -> MagnetResult<f64> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(MagnetError::LinAlg(format!(
            "spectral_norm_sym requires a square matrix, got {rows}x{cols}"
        )));
    }
    if rows == 0 {
        return Ok(0.0);
    }
    let mut v = Array1::from_shape_fn(rows, |i| 1.0 + 0.25 * (0.7 * i as f64 + 0.3).sin());
    let v_norm = v.dot(&v).sqrt();
    v /= v_norm;

    let mut lambda = 0.0;
    for _ in 0..POWER_ITER_MAX {
        let w = a.dot(&v);
        let w_norm = w.dot(&w).sqrt();
        if !w_norm.is_finite() {
            return Err(MagnetError::LinAlg(
                "spectral_norm_sym encountered a non-finite iterate".to_string(),
            ));
        }
        if w_norm == 0.0 {
            return Ok(0.0);
        }
        let converged = (w_norm - lambda).abs() <= POWER_ITER_TOL * w_norm;
        lambda = w_norm;
        v = w / w_norm;
        if converged {
            break;
        }
    }
    Ok(lambda)
}

/// Upper bound on ‖A‖₂ for a symmetric matrix.
///
/// The smaller of the largest absolute row sum (Gershgorin) and
/// trace(A⁴)^{1/4} = ‖A²‖_F^{1/2}, padded by a few ulps for rounding. Unlike
/// [`spectral_norm_sym`] it never lands below ‖A‖₂, however close the top
/// eigenvalues are.
pub fn spectral_norm_bound_sym(a: &Array2<f64>) -> MagnetResult<f64> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(MagnetError::LinAlg(format!(
            "spectral_norm_bound_sym requires a square matrix, got {rows}x{cols}"
        )));
    }
    let fro = a.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !fro.is_finite() {
        return Err(MagnetError::LinAlg(
            "spectral_norm_bound_sym encountered a non-finite entry".to_string(),
        ));
    }
    if fro == 0.0 {
        return Ok(0.0);
    }
    let gershgorin = a
        .rows()
        .into_iter()
        .map(|r| r.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    // Scale to unit Frobenius norm so the square cannot under- or overflow.
    let b = a / fro;
    let b2 = b.dot(&b);
    let quartic = fro * b2.iter().map(|v| v * v).sum::<f64>().sqrt().sqrt();
    let pad = 1.0 + 4.0 * (rows as f64) * f64::EPSILON;
    Ok(gershgorin.min(quartic) * pad)
}

/// Least squares min ‖Ax − b‖² + damp²‖x‖² by CGLS started from zero.
///
/// With `damp = 0` the iterates stay in the row space of A, so the limit is
/// the minimum-norm solution, the same one `pinv_svd(a) · b` gives.
pub fn cgls(
    a: &Array2<f64>,
    b: &Array1<f64>,
    damp: f64,
    max_iter: usize,
    tol: f64,
) -> MagnetResult<Array1<f64>> {
    let (rows, cols) = a.dim();
    if b.len() != rows {
        return Err(MagnetError::shape("cgls rhs", &[rows], &[b.len()]));
    }
    if !damp.is_finite() || damp < 0.0 {
        return Err(MagnetError::LinAlg(format!(
            "cgls damping must be finite and >= 0, got {damp}"
        )));
    }
    let damp2 = damp * damp;
    let mut x = Array1::zeros(cols);
    let mut r = b.clone();
    let mut s = a.t().dot(&r);
    let mut p = s.clone();
    let mut gamma = s.dot(&s);
    let gamma0 = gamma;
    if gamma0 == 0.0 {
        return Ok(x);
    }

    for _ in 0..max_iter {
        let q = a.dot(&p);
        let delta = q.dot(&q) + damp2 * p.dot(&p);
        if delta <= 0.0 || !delta.is_finite() {
            break;
        }
        let alpha = gamma / delta;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &q);
        s = a.t().dot(&r);
        if damp2 > 0.0 {
            s.scaled_add(-damp2, &x);
        }
        let gamma_new = s.dot(&s);
        if gamma_new.sqrt() <= tol * gamma0.sqrt() {
            break;
        }
        let beta = gamma_new / gamma;
        p = &s + &(beta * &p);
        gamma = gamma_new;
    }
    Ok(x)
}

/// Thin SVD of a small dense matrix via cyclic Jacobi rotations on AᵀA.
///
/// Returns (U, sigma, Vt) with A ≈ U · diag(sigma) · Vt, sigma descending.
/// Cost grows as n³ per sweep; meant for operators with a few dozen columns.
pub fn svd_small(a: &Array2<f64>) -> (Array2<f64>, Array1<f64>, Array2<f64>) {
    const MAX_SWEEPS: usize = 100;
    let (m, n) = a.dim();
    let k = m.min(n);
    let mut gram = a.t().dot(a);
    let mut v: Array2<f64> = Array2::eye(n);
    // Tolerances are relative to trace(AᵀA).
    let scale = gram.diag().sum().max(f64::MIN_POSITIVE);

    for _ in 0..MAX_SWEEPS {
        let mut off_diag = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off_diag += gram[[p, q]].abs();
            }
        }
        if off_diag < 1e-14 * scale {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let gpq = gram[[p, q]];
                if gpq.abs() < 1e-15 * scale {
                    continue;
                }
                let tau = (gram[[q, q]] - gram[[p, p]]) / (2.0 * gpq);
                let t = tau.signum() / (tau.abs() + (1.0 + tau * tau).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;

                let gpp = gram[[p, p]];
                let gqq = gram[[q, q]];
                gram[[p, p]] = gpp - t * gpq;
                gram[[q, q]] = gqq + t * gpq;
                gram[[p, q]] = 0.0;
                gram[[q, p]] = 0.0;
                for r in 0..n {
                    if r == p || r == q {
                        continue;
                    }
                    let grp = gram[[r, p]];
                    let grq = gram[[r, q]];
                    gram[[r, p]] = c * grp - s * grq;
                    gram[[p, r]] = gram[[r, p]];
                    gram[[r, q]] = s * grp + c * grq;
                    gram[[q, r]] = gram[[r, q]];
                }
                for r in 0..n {
                    let vrp = v[[r, p]];
                    let vrq = v[[r, q]];
                    v[[r, p]] = c * vrp - s * vrq;
                    v[[r, q]] = s * vrp + c * vrq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| gram[[j, j]].total_cmp(&gram[[i, i]]));

    let sigma = Array1::from_iter(
        order
            .iter()
            .take(k)
            .map(|&col| gram[[col, col]].max(0.0).sqrt()),
    );
    let mut vt = Array2::zeros((k, n));
    for (row, &col) in order.iter().take(k).enumerate() {
        vt.row_mut(row).assign(&v.column(col));
    }
    let mut u = a.dot(&vt.t());
    for (idx, mut col) in u.columns_mut().into_iter().enumerate() {
        if sigma[idx] > 1e-14 * scale.sqrt() {
            col /= sigma[idx];
        } else {
            col.fill(0.0);
        }
    }
    (u, sigma, vt)
}

/// Moore–Penrose pseudo-inverse, singular values <= `sv_cutoff` discarded.
pub fn pinv_svd(a: &Array2<f64>, sv_cutoff: f64) -> Array2<f64> {
    let (u, sigma, vt) = svd_small(a);
    let inv_sigma = sigma.mapv(|s| if s > sv_cutoff { 1.0 / s } else { 0.0 });
    let scaled_v = &vt.t() * &inv_sigma;
    scaled_v.dot(&u.t())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn wide_matrix() -> Array2<f64> {
        array![
            [1.0, 0.5, -0.2, 0.0, 0.3],
            [0.0, 2.0, 0.1, -0.4, 0.0],
            [0.7, 0.0, 1.5, 0.2, -0.6]
        ]
    }

    #[test]
    fn test_spectral_norm_diagonal() {
        let a = Array2::from_diag(&array![1.0, 4.0, 2.5]);
        let norm = spectral_norm_sym(&a).unwrap();
        assert!((norm - 4.0).abs() < 1e-9, "norm = {norm}");
    }

    #[test]
    fn test_spectral_norm_matches_svd() {
        let a = wide_matrix();
        let ata = a.t().dot(&a);
        let (_u, sigma, _vt) = svd_small(&a);
        let norm = spectral_norm_sym(&ata).unwrap();
        let expected = sigma[0] * sigma[0];
        assert!(
            (norm - expected).abs() < 1e-8 * expected,
            "power={norm} svd={expected}"
        );
    }

    #[test]
    fn test_spectral_bound_never_below_norm() {
        let a = wide_matrix();
        let ata = a.t().dot(&a);
        let (_u, sigma, _vt) = svd_small(&a);
        let exact = sigma[0] * sigma[0];
        let bound = spectral_norm_bound_sym(&ata).unwrap();
        assert!(bound >= exact, "bound={bound} exact={exact}");
        assert!(bound <= 2.0 * exact);
        assert_eq!(spectral_norm_bound_sym(&Array2::zeros((3, 3))).unwrap(), 0.0);
        assert!(spectral_norm_bound_sym(&Array2::zeros((2, 3))).is_err());
    }

    #[test]
    fn test_spectral_bound_with_clustered_top_eigenvalues() {
        let a = Array2::from_diag(&array![1.0, 0.9999, 0.9999]);
        let bound = spectral_norm_bound_sym(&a).unwrap();
        assert!(bound >= 1.0 && bound < 1.0 + 1e-12, "bound = {bound}");
        // The power estimate approaches 1 from below.
        assert!(spectral_norm_sym(&a).unwrap() <= bound);
    }

    #[test]
    fn test_spectral_norm_rejects_rectangular() {
        let err = spectral_norm_sym(&Array2::zeros((2, 3))).unwrap_err();
        assert!(matches!(err, MagnetError::LinAlg(_)));
    }

    #[test]
    fn test_svd_identity() {
        let a = Array2::eye(3);
        let (u, sigma, vt) = svd_small(&a);
        for i in 0..3 {
            assert!((sigma[i] - 1.0).abs() < 1e-10, "sigma[{i}] = {}", sigma[i]);
        }
        let reconstructed = u.dot(&Array2::from_diag(&sigma)).dot(&vt);
        for ((i, j), v) in reconstructed.indexed_iter() {
            assert!((v - a[[i, j]]).abs() < 1e-10, "Reconstruction failed at ({i}, {j})");
        }
    }

    #[test]
    fn test_cgls_min_norm_matches_pinv() {
        let a = wide_matrix();
        let b = array![0.3, -1.2, 0.8];
        let x = cgls(&a, &b, 0.0, 200, 1e-14).unwrap();
        let x_ref = pinv_svd(&a, 1e-12).dot(&b);
        for i in 0..x.len() {
            assert!((x[i] - x_ref[i]).abs() < 1e-8, "x[{i}] {} vs {}", x[i], x_ref[i]);
        }
    }

    #[test]
    fn test_cgls_overdetermined_normal_equations() {
        let a = wide_matrix().t().to_owned();
        let b = array![1.0, 0.0, -1.0, 2.0, 0.5];
        let x = cgls(&a, &b, 0.0, 200, 1e-14).unwrap();
        let grad = a.t().dot(&(a.dot(&x) - &b));
        assert!(grad.iter().all(|g| g.abs() < 1e-9), "grad = {grad:?}");
    }

    #[test]
    fn test_cgls_damping_shrinks_solution() {
        let a = wide_matrix();
        let b = array![0.3, -1.2, 0.8];
        let free = cgls(&a, &b, 0.0, 200, 1e-14).unwrap();
        let damped = cgls(&a, &b, 1.0, 200, 1e-14).unwrap();
        assert!(damped.dot(&damped) < free.dot(&free));
    }
}
