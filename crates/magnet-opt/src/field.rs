// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Dipole Field Evaluation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Magnetic field and vector potential of a finished dipole arrangement.

use crate::grid::DipoleGrid;
use magnet_geometry::ToroidalSurface;
use magnet_math::vec3::{cross, dot, sub};
use magnet_types::constants::{DIPOLE_DIM, MU0_OVER_4PI};
use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Axis};

/// Field at offset `r` (observer − dipole) of moment `m`.
pub fn dipole_b(r: [f64; 3], m: [f64; 3]) -> [f64; 3] {
    let r2 = dot(r, r);
    if r2 <= 0.0 {
        return [0.0; 3];
    }
    let inv_r = 1.0 / r2.sqrt();
    let inv_r3 = inv_r / r2;
    let mr = dot(m, r) / r2;
    let mut b = [0.0; 3];
    for c in 0..3 {
        b[c] = MU0_OVER_4PI * inv_r3 * (3.0 * mr * r[c] - m[c]);
    }
    b
}

/// Vector potential μ0/4π · m × r / |r|³.
pub fn dipole_a(r: [f64; 3], m: [f64; 3]) -> [f64; 3] {
    let r2 = dot(r, r);
    if r2 <= 0.0 {
        return [0.0; 3];
    }
    let s = MU0_OVER_4PI / (r2 * r2.sqrt());
    let mxr = cross(m, r);
    [s * mxr[0], s * mxr[1], s * mxr[2]]
}

#[derive(Debug, Clone)]
pub struct DipoleField {
    positions: Vec<[f64; 3]>,
    moments: Vec<[f64; 3]>,
}

fn rows3(a: &Array2<f64>) -> Vec<[f64; 3]> {
    a.axis_iter(Axis(0)).map(|r| [r[0], r[1], r[2]]).collect()
}

impl DipoleField {
    pub fn new(positions: &Array2<f64>, moments: &Array2<f64>) -> MagnetResult<Self> {
        let n = positions.nrows();
        if positions.ncols() != 3 {
            return Err(MagnetError::shape("dipole positions", &[n, 3], positions.shape()));
        }
        if moments.shape() != [n, 3] {
            return Err(MagnetError::shape("dipole moments", &[n, 3], moments.shape()));
        }
        Ok(Self {
            positions: rows3(positions),
            moments: rows3(moments),
        })
    }

    /// Pair a flat solution vector `[m_0x, m_0y, m_0z, ...]` with its grid.
    pub fn from_solution(grid: &DipoleGrid, m: &Array1<f64>) -> MagnetResult<Self> {
        let n = grid.len();
        if m.len() != DIPOLE_DIM * n {
            return Err(MagnetError::shape("moment vector", &[DIPOLE_DIM * n], &[m.len()]));
        }
        let moments = m
            .exact_chunks(DIPOLE_DIM)
            .into_iter()
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        Ok(Self {
            positions: rows3(grid.positions()),
            moments,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn evaluate(
        &self,
        points: &Array2<f64>,
        kernel: fn([f64; 3], [f64; 3]) -> [f64; 3],
    ) -> MagnetResult<Array2<f64>> {
        if points.ncols() != 3 {
            return Err(MagnetError::shape(
                "evaluation points",
                &[points.nrows(), 3],
                points.shape(),
            ));
        }
        let mut out = Array2::zeros((points.nrows(), 3));
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(points.axis_iter(Axis(0)))
            .for_each(|(mut acc, p)| {
                let p = [p[0], p[1], p[2]];
                for (pos, m) in self.positions.iter().zip(&self.moments) {
                    let v = kernel(sub(p, *pos), *m);
                    for c in 0..3 {
                        acc[c] += v[c];
                    }
                }
            });
        Ok(out)
    }

    /// B at each point, shape (M, 3).
    pub fn b_at(&self, points: &Array2<f64>) -> MagnetResult<Array2<f64>> {
        self.evaluate(points, dipole_b)
    }

    /// Vector potential at each point, shape (M, 3).
    pub fn a_at(&self, points: &Array2<f64>) -> MagnetResult<Array2<f64>> {
        self.evaluate(points, dipole_a)
    }

    /// B·n̂ on the surface quadrature grid, shape (nφ, nθ).
    pub fn bnormal_on(&self, surface: &dyn ToroidalSurface) -> MagnetResult<Array2<f64>> {
        let (nphi, ntheta) = surface.dims();
        let points = surface
            .gamma()
            .into_shape((nphi * ntheta, 3))
            .map_err(|e| MagnetError::LinAlg(format!("surface reshape failed: {e}")))?;
        let normals = surface
            .unitnormal()
            .into_shape((nphi * ntheta, 3))
            .map_err(|e| MagnetError::LinAlg(format!("surface reshape failed: {e}")))?;
        let b = self.b_at(&points)?;
        let bn: Array1<f64> = (&b * &normals).sum_axis(Axis(1));
        bn.into_shape((nphi, ntheta))
            .map_err(|e| MagnetError::LinAlg(format!("bnormal reshape failed: {e}")))
    }
}
