// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Geometric Operator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Linear map from dipole moments to normal field on the plasma boundary.
//!
//! Row i of `A` holds the normal field at plasma sample i per unit moment
//! component, weighted by √(ΔφΔθ) so that ½‖Am − b‖² approximates the
//! squared-flux integral. `AᵀA` and `Aᵀb` are formed once and shared by
//! every solver configuration.

use crate::grid::DipoleGrid;
use magnet_geometry::ToroidalSurface;
use magnet_math::linalg::spectral_norm_sym;
use magnet_math::vec3::{dot, norm, sub, try_normalize};
use magnet_types::constants::{DIPOLE_DIM, MU0_OVER_4PI};
use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Array3, Axis};
use tracing::{debug, info, instrument};

/// Target field on the plasma boundary.
#[derive(Debug, Clone, Copy)]
pub enum TargetField<'a> {
    /// Full field vector per sample, shape (nφ, nθ, 3).
    Vector(&'a Array3<f64>),
    /// Normal component B·n̂ per sample, shape (nφ, nθ).
    Normal(&'a Array2<f64>),
}

/// Flattened plasma samples with unit normals and the quadrature weight.
#[derive(Debug, Clone)]
pub(crate) struct PlasmaSamples {
    pub points: Vec<[f64; 3]>,
    pub normals: Vec<[f64; 3]>,
    pub weight: f64,
    pub dims: (usize, usize),
}

impl PlasmaSamples {
    pub fn from_surface(plasma: &dyn ToroidalSurface) -> Self {
        let dims = plasma.dims();
        let gamma = plasma.gamma();
        let unit = plasma.unitnormal();
        let mut points = Vec::with_capacity(dims.0 * dims.1);
        let mut normals = Vec::with_capacity(dims.0 * dims.1);
        for i in 0..dims.0 {
            for j in 0..dims.1 {
                points.push([gamma[[i, j, 0]], gamma[[i, j, 1]], gamma[[i, j, 2]]]);
                normals.push([unit[[i, j, 0]], unit[[i, j, 1]], unit[[i, j, 2]]]);
            }
        }
        Self {
            points,
            normals,
            weight: (plasma.dphi() * plasma.dtheta()).abs().sqrt(),
            dims,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// B·n̂ per sample, flattened in (φ, θ) row-major order.
    pub fn target_bnormal(&self, target: TargetField<'_>) -> MagnetResult<Array1<f64>> {
        let (nphi, ntheta) = self.dims;
        match target {
            TargetField::Vector(b) => {
                let expected = [nphi, ntheta, 3];
                if b.shape() != expected {
                    return Err(MagnetError::shape("target field", &expected, b.shape()));
                }
                let mut bn = Array1::zeros(self.len());
                let mut ratio_sum = 0.0;
                let mut ratio_count = 0usize;
                for (idx, n) in self.normals.iter().enumerate() {
                    let (i, j) = (idx / ntheta, idx % ntheta);
                    let bv = [b[[i, j, 0]], b[[i, j, 1]], b[[i, j, 2]]];
                    bn[idx] = dot(bv, *n);
                    let mag = norm(bv);
                    if mag > 0.0 {
                        ratio_sum += bn[idx].abs() / mag;
                        ratio_count += 1;
                    }
                }
                if ratio_count > 0 {
                    info!(
                        mean_abs_bn_over_b = ratio_sum / ratio_count as f64,
                        "target field alignment"
                    );
                }
                Ok(bn)
            }
            TargetField::Normal(bn) => {
                let expected = [nphi, ntheta];
                if bn.shape() != expected {
                    return Err(MagnetError::shape("target normal field", &expected, bn.shape()));
                }
                Ok(bn.iter().copied().collect())
            }
        }
    }
}

/// Candidate orientations per dipole, shape (N, P, 3), each a unit vector.
#[derive(Debug, Clone)]
pub struct PolarizationSet {
    directions: Array3<f64>,
}

impl PolarizationSet {
    pub fn new(mut directions: Array3<f64>) -> MagnetResult<Self> {
        let (n, p, d) = directions.dim();
        if d != 3 {
            return Err(MagnetError::shape("polarization directions", &[n, p, 3], directions.shape()));
        }
        for mut v in directions.lanes_mut(Axis(2)) {
            let unit = try_normalize([v[0], v[1], v[2]]).ok_or_else(|| {
                MagnetError::ConfigError("polarization direction must be non-zero".to_string())
            })?;
            for c in 0..3 {
                v[c] = unit[c];
            }
        }
        Ok(Self { directions })
    }

    pub fn num_dipoles(&self) -> usize {
        self.directions.dim().0
    }

    pub fn num_orientations(&self) -> usize {
        self.directions.dim().1
    }

    pub fn direction(&self, k: usize, p: usize) -> [f64; 3] {
        [
            self.directions[[k, p, 0]],
            self.directions[[k, p, 1]],
            self.directions[[k, p, 2]],
        ]
    }
}

#[derive(Debug, Clone)]
pub struct GeometricOperator {
    a: Array2<f64>,
    b: Array1<f64>,
    ata: Array2<f64>,
    atb: Array1<f64>,
    ata_scale: f64,
    weight: f64,
    dims: (usize, usize),
}

/// Normal field at `point` (unit normal `n_hat`) of a unit moment along each
/// Cartesian axis, placed at `dipole`. Coincident points contribute zero.
#[inline]
pub(crate) fn dipole_normal_kernel(point: [f64; 3], n_hat: [f64; 3], dipole: [f64; 3]) -> [f64; 3] {
    let d = sub(point, dipole);
    let r2 = dot(d, d);
    if r2 <= 0.0 {
        return [0.0; 3];
    }
    let r5 = r2 * r2 * r2.sqrt();
    let dn = dot(d, n_hat);
    let mut out = [0.0; 3];
    for c in 0..3 {
        out[c] = MU0_OVER_4PI * (3.0 * dn * d[c] - r2 * n_hat[c]) / r5;
    }
    out
}

impl GeometricOperator {
    #[instrument(skip_all, fields(dipoles = grid.len()))]
    pub fn build(
        plasma: &dyn ToroidalSurface,
        grid: &DipoleGrid,
        target: TargetField<'_>,
    ) -> MagnetResult<Self> {
        let samples = PlasmaSamples::from_surface(plasma);
        let bn = samples.target_bnormal(target)?;
        info!(
            mean_abs_bn = bn.mapv(f64::abs).mean().unwrap_or(0.0),
            "target normal field on plasma boundary"
        );

        let ndip = grid.len();
        let positions = grid.positions();
        let dipoles: Vec<[f64; 3]> = (0..ndip)
            .map(|k| [positions[[k, 0]], positions[[k, 1]], positions[[k, 2]]])
            .collect();
        let weight = samples.weight;

        let mut a = Array2::zeros((samples.len(), DIPOLE_DIM * ndip));
        a.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, mut row)| {
                let (point, n_hat) = (samples.points[i], samples.normals[i]);
                for (k, &dipole) in dipoles.iter().enumerate() {
                    let col = dipole_normal_kernel(point, n_hat, dipole);
                    for c in 0..DIPOLE_DIM {
                        row[DIPOLE_DIM * k + c] = col[c] * weight;
                    }
                }
            });
        let b = bn.mapv(|v| -v * weight);
        Self::from_parts(a, b, weight, samples.dims)
    }

    /// Assemble from a precomputed row-weighted operator and right-hand side.
    pub fn from_parts(
        a: Array2<f64>,
        b: Array1<f64>,
        weight: f64,
        dims: (usize, usize),
    ) -> MagnetResult<Self> {
        if a.nrows() != b.len() {
            return Err(MagnetError::shape("operator rhs", &[a.nrows()], &[b.len()]));
        }
        if dims.0 * dims.1 != a.nrows() {
            return Err(MagnetError::shape("operator rows", &[dims.0 * dims.1], &[a.nrows()]));
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(MagnetError::ConfigError(format!(
                "quadrature weight must be finite and > 0, got {weight}"
            )));
        }
        let ata = a.t().dot(&a);
        let atb = a.t().dot(&b);
        let ata_scale = spectral_norm_sym(&ata)?;
        debug!(
            rows = a.nrows(),
            cols = a.ncols(),
            ata_scale,
            "geometric operator assembled"
        );
        Ok(Self {
            a,
            b,
            ata,
            atb,
            ata_scale,
            weight,
            dims,
        })
    }

    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    pub fn b(&self) -> &Array1<f64> {
        &self.b
    }

    pub fn ata(&self) -> &Array2<f64> {
        &self.ata
    }

    pub fn atb(&self) -> &Array1<f64> {
        &self.atb
    }

    /// ‖AᵀA‖₂, the natural scale for non-dimensionalising penalties.
    pub fn ata_scale(&self) -> f64 {
        self.ata_scale
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn dims(&self) -> (usize, usize) {
        self.dims
    }

    pub fn num_samples(&self) -> usize {
        self.a.nrows()
    }

    pub fn num_moments(&self) -> usize {
        self.a.ncols()
    }

    fn check_moments(&self, m: &Array1<f64>) -> MagnetResult<()> {
        if m.len() != self.num_moments() {
            return Err(MagnetError::shape("moment vector", &[self.num_moments()], &[m.len()]));
        }
        Ok(())
    }

    /// A m − b.
    pub fn residual(&self, m: &Array1<f64>) -> MagnetResult<Array1<f64>> {
        self.check_moments(m)?;
        Ok(self.a.dot(m) - &self.b)
    }

    /// ½‖A m − b‖².
    pub fn squared_flux(&self, m: &Array1<f64>) -> MagnetResult<f64> {
        let r = self.residual(m)?;
        Ok(0.5 * r.dot(&r))
    }

    /// Mean |B·n̂| of dipoles plus target on the boundary (T).
    pub fn mean_abs_bnormal(&self, m: &Array1<f64>) -> MagnetResult<f64> {
        let r = self.residual(m)?;
        Ok(r.mapv(f64::abs).mean().unwrap_or(0.0) / self.weight)
    }

    /// Total normal field reshaped to (nφ, nθ).
    pub fn bnormal_grid(&self, m: &Array1<f64>) -> MagnetResult<Array2<f64>> {
        let r = self.residual(m)? / self.weight;
        r.into_shape(self.dims)
            .map_err(|e| MagnetError::LinAlg(format!("bnormal reshape failed: {e}")))
    }

    /// Operator restricted to fixed orientations: A_pol[i, k, p] = A[i, 3k..3k+3]·e_kp.
    pub fn polarized(&self, pol: &PolarizationSet) -> MagnetResult<Array3<f64>> {
        let ndip = self.num_moments() / DIPOLE_DIM;
        if pol.num_dipoles() != ndip {
            return Err(MagnetError::shape(
                "polarization set",
                &[ndip, pol.num_orientations(), 3],
                &[pol.num_dipoles(), pol.num_orientations(), 3],
            ));
        }
        let np = pol.num_orientations();
        let mut out = Array3::zeros((self.num_samples(), ndip, np));
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(self.a.axis_iter(Axis(0)))
            .for_each(|(mut slab, row)| {
                for k in 0..ndip {
                    let col = [row[3 * k], row[3 * k + 1], row[3 * k + 2]];
                    for p in 0..np {
                        slab[[k, p]] = dot(col, pol.direction(k, p));
                    }
                }
            });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnet_geometry::{QuadRange, SurfaceRZFourier};
    use ndarray::{array, Array};
    use std::f64::consts::PI;

    fn plasma() -> SurfaceRZFourier {
        SurfaceRZFourier::torus(1.0, 0.1, 1, QuadRange::FullTorus, 6, 8).unwrap()
    }

    fn two_dipoles() -> DipoleGrid {
        let positions = array![[1.2, 0.0, 0.0], [0.0, -1.25, 0.05]];
        DipoleGrid::from_parts(positions, array![1e-3, 1e-3], array![1e3, 1e3], vec![0, 2])
            .unwrap()
    }

    #[test]
    fn test_normal_matrix_matches_product() {
        let plasma = plasma();
        let bn = Array2::from_elem((6, 8), 0.01);
        let op = GeometricOperator::build(&plasma, &two_dipoles(), TargetField::Normal(&bn))
            .unwrap();
        assert_eq!(op.a().dim(), (48, 6));
        let ata = op.a().t().dot(op.a());
        assert!((&ata - op.ata()).iter().all(|v| v.abs() < 1e-20));
        assert!((&op.ata().t() - op.ata()).iter().all(|v| v.abs() < 1e-20));
        let w = (2.0 * PI / 6.0 * 2.0 * PI / 8.0).sqrt();
        assert!((op.weight() - w).abs() < 1e-14);
        assert!(op.b().iter().all(|&v| (v + 0.01 * w).abs() < 1e-15));
        assert!(op.ata_scale() > 0.0);
    }

    #[test]
    fn test_vector_target_projects_onto_normal() {
        let plasma = plasma();
        let unit = plasma.unitnormal();
        let field = unit.mapv(|v| 0.02 * v);
        let bn = Array2::from_elem((6, 8), 0.02);
        let grid = two_dipoles();
        let from_vec = GeometricOperator::build(&plasma, &grid, TargetField::Vector(&field)).unwrap();
        let from_bn = GeometricOperator::build(&plasma, &grid, TargetField::Normal(&bn)).unwrap();
        assert!((from_vec.b() - from_bn.b()).iter().all(|v| v.abs() < 1e-14));
    }

    #[test]
    fn test_target_shape_mismatch() {
        let plasma = plasma();
        let bad = Array3::zeros((6, 7, 3));
        let err = GeometricOperator::build(&plasma, &two_dipoles(), TargetField::Vector(&bad))
            .unwrap_err();
        assert!(matches!(err, MagnetError::ShapeMismatch { .. }));
        let bad_bn = Array2::zeros((8, 6));
        assert!(GeometricOperator::build(&plasma, &two_dipoles(), TargetField::Normal(&bad_bn))
            .is_err());
    }

    #[test]
    fn test_kernel_on_axis() {
        // m = ẑ at the origin, observed on the z axis: B = μ0/4π · 2/z³ ẑ.
        let col = dipole_normal_kernel([0.0, 0.0, 0.5], [0.0, 0.0, 1.0], [0.0; 3]);
        assert!((col[2] - MU0_OVER_4PI * 2.0 / 0.125).abs() < 1e-18);
        assert_eq!(col[0], 0.0);
        assert_eq!(dipole_normal_kernel([1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0]), [0.0; 3]);
    }

    #[test]
    fn test_residual_diagnostics_at_zero() {
        let plasma = plasma();
        let bn = Array2::from_elem((6, 8), 0.01);
        let op = GeometricOperator::build(&plasma, &two_dipoles(), TargetField::Normal(&bn))
            .unwrap();
        let zero = Array1::zeros(6);
        assert!((op.mean_abs_bnormal(&zero).unwrap() - 0.01).abs() < 1e-15);
        let expected = 0.5 * 48.0 * (0.01 * op.weight()).powi(2);
        assert!((op.squared_flux(&zero).unwrap() - expected).abs() < 1e-15);
        let grid = op.bnormal_grid(&zero).unwrap();
        assert_eq!(grid.dim(), (6, 8));
        assert!(grid.iter().all(|v| (v - 0.01).abs() < 1e-15));
        assert!(op.residual(&Array1::zeros(5)).is_err());
    }

    #[test]
    fn test_polarized_operator_matches_projection() {
        let plasma = plasma();
        let bn = Array2::zeros((6, 8));
        let op = GeometricOperator::build(&plasma, &two_dipoles(), TargetField::Normal(&bn))
            .unwrap();
        let dirs = Array::from_shape_vec(
            (2, 2, 3),
            vec![1.0, 0.0, 0.0, 0.0, 2.0, 2.0, 0.0, 0.0, -1.0, 3.0, 4.0, 0.0],
        )
        .unwrap();
        let pol = PolarizationSet::new(dirs).unwrap();
        let ap = op.polarized(&pol).unwrap();
        assert_eq!(ap.dim(), (48, 2, 2));
        let s = 0.5f64.sqrt();
        for i in 0..48 {
            let row = op.a().row(i);
            assert!((ap[[i, 0, 0]] - row[0]).abs() < 1e-15);
            assert!((ap[[i, 0, 1]] - s * (row[1] + row[2])).abs() < 1e-15);
            assert!((ap[[i, 1, 0]] + row[5]).abs() < 1e-15);
            assert!((ap[[i, 1, 1]] - (0.6 * row[3] + 0.8 * row[4])).abs() < 1e-15);
        }
    }

    #[test]
    fn test_zero_polarization_rejected() {
        let dirs = Array3::zeros((1, 1, 3));
        assert!(matches!(
            PolarizationSet::new(dirs),
            Err(MagnetError::ConfigError(_))
        ));
    }
}
