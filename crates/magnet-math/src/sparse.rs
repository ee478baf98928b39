// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Sparse Normal Matrix
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Threshold truncation of dense matrices into CSR storage.

use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

/// Drop every entry with |a_ij| <= `threshold` and store the rest as CSR.
pub fn truncate_to_csr(dense: &Array2<f64>, threshold: f64) -> CsMat<f64> {
    let mut tri = TriMat::new(dense.dim());
    for ((i, j), &v) in dense.indexed_iter() {
        if v.abs() > threshold {
            tri.add_triplet(i, j, v);
        }
    }
    tri.to_csr()
}

/// y = A x for a CSR matrix, rows evaluated in parallel.
pub fn csr_matvec(a: &CsMat<f64>, x: &Array1<f64>) -> MagnetResult<Array1<f64>> {
    if !a.is_csr() {
        return Err(MagnetError::LinAlg(
            "csr_matvec requires CSR storage".to_string(),
        ));
    }
    if a.cols() != x.len() {
        return Err(MagnetError::shape("csr_matvec x", &[a.cols()], &[x.len()]));
    }
    let y: Vec<f64> = (0..a.rows())
        .into_par_iter()
        .map(|i| match a.outer_view(i) {
            Some(row) => row.iter().map(|(j, &v)| v * x[j]).sum(),
            None => 0.0,
        })
        .collect();
    Ok(Array1::from(y))
}

/// Fraction of stored entries relative to the dense size.
pub fn density(a: &CsMat<f64>) -> f64 {
    let total = a.rows() * a.cols();
    if total == 0 {
        return 0.0;
    }
    a.nnz() as f64 / total as f64
}
