// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Surface Trait
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Sampled toroidal surfaces and normal-offset construction.
//!
//! Quadrature points are fractions of a full turn: the physical toroidal
//! angle of slice `i` is 2π·`quadpoints_phi()[i]`, likewise for θ.

use magnet_math::vec3::{cross, norm, scale, try_normalize};
use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::{Array3, Axis};
use std::f64::consts::PI;

/// Relative tolerance when comparing quadrature points of two surfaces.
const QUADPOINT_TOL: f64 = 1e-12;

/// Toroidal extent covered by the φ quadrature points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadRange {
    FullTorus,
    FieldPeriod,
    /// Half a field period, shifted by half a step off the symmetry plane.
    HalfPeriod,
}

pub fn quadpoints_phi(range: QuadRange, nfp: usize, nphi: usize) -> Vec<f64> {
    let nfp = nfp.max(1) as f64;
    let n = nphi as f64;
    (0..nphi)
        .map(|i| {
            let i = i as f64;
            match range {
                QuadRange::FullTorus => i / n,
                QuadRange::FieldPeriod => i / (nfp * n),
                QuadRange::HalfPeriod => (i + 0.5) / (2.0 * nfp * n),
            }
        })
        .collect()
}

pub fn quadpoints_theta(ntheta: usize) -> Vec<f64> {
    (0..ntheta).map(|j| j as f64 / ntheta as f64).collect()
}

pub(crate) fn validate_quadpoints(phi: &[f64], theta: &[f64]) -> MagnetResult<()> {
    if phi.len() < 2 || theta.len() < 2 {
        return Err(MagnetError::ConfigError(format!(
            "surface needs at least 2 quadrature points per direction, got nphi={} ntheta={}",
            phi.len(),
            theta.len()
        )));
    }
    if phi.iter().chain(theta).any(|q| !q.is_finite()) {
        return Err(MagnetError::ConfigError(
            "surface quadrature points must be finite".to_string(),
        ));
    }
    Ok(())
}

pub trait ToroidalSurface: Send + Sync {
    fn nfp(&self) -> usize;

    fn quadpoints_phi(&self) -> &[f64];

    fn quadpoints_theta(&self) -> &[f64];

    /// Surface points, shape (nφ, nθ, 3).
    fn gamma(&self) -> Array3<f64>;

    /// Un-normalized normal ∂γ/∂φ × ∂γ/∂θ, shape (nφ, nθ, 3).
    fn normal(&self) -> Array3<f64>;

    fn unitnormal(&self) -> Array3<f64> {
        let mut n = self.normal();
        for mut v in n.lanes_mut(Axis(2)) {
            let len = norm([v[0], v[1], v[2]]);
            if len > 0.0 {
                v /= len;
            }
        }
        n
    }

    fn dims(&self) -> (usize, usize) {
        (self.quadpoints_phi().len(), self.quadpoints_theta().len())
    }

    /// Physical toroidal spacing Δφ (rad).
    fn dphi(&self) -> f64 {
        let q = self.quadpoints_phi();
        2.0 * PI * (q[1] - q[0])
    }

    /// Physical poloidal spacing Δθ (rad).
    fn dtheta(&self) -> f64 {
        let q = self.quadpoints_theta();
        2.0 * PI * (q[1] - q[0])
    }

    /// Shift every point by `distance` along its unit normal projected onto
    /// the constant-φ plane. The offset surface keeps this surface's normals.
    fn extend_via_projected_normal(&self, distance: f64) -> SampledSurface {
        let mut gamma = self.gamma();
        let unit = self.unitnormal();
        let (nphi, ntheta) = self.dims();
        for i in 0..nphi {
            for j in 0..ntheta {
                let (x, y) = (gamma[[i, j, 0]], gamma[[i, j, 1]]);
                let phi = y.atan2(x);
                let (sin_p, cos_p) = phi.sin_cos();
                let n = [unit[[i, j, 0]], unit[[i, j, 1]], unit[[i, j, 2]]];
                let n_r = n[0] * cos_p + n[1] * sin_p;
                let shift = match try_normalize([n_r, 0.0, n[2]]) {
                    Some(p) => [p[0] * cos_p, p[0] * sin_p, p[2]],
                    None => n,
                };
                let shift = scale(shift, distance);
                for c in 0..3 {
                    gamma[[i, j, c]] += shift[c];
                }
            }
        }
        SampledSurface {
            nfp: self.nfp(),
            quadpoints_phi: self.quadpoints_phi().to_vec(),
            quadpoints_theta: self.quadpoints_theta().to_vec(),
            gamma,
            normal: self.normal(),
        }
    }
}

/// Check that two surfaces are sampled at the same (φ, θ) points.
pub fn check_same_quadrature(
    a: &dyn ToroidalSurface,
    b: &dyn ToroidalSurface,
    what: &str,
) -> MagnetResult<()> {
    let (pa, ta) = (a.quadpoints_phi(), a.quadpoints_theta());
    let (pb, tb) = (b.quadpoints_phi(), b.quadpoints_theta());
    if pa.len() != pb.len() || ta.len() != tb.len() {
        return Err(MagnetError::SurfaceMismatch(format!(
            "{what}: quadrature sizes differ ({}x{} vs {}x{})",
            pa.len(),
            ta.len(),
            pb.len(),
            tb.len()
        )));
    }
    let close = |x: &f64, y: &f64| (x - y).abs() <= QUADPOINT_TOL * (1.0 + x.abs());
    if !pa.iter().zip(pb).all(|(x, y)| close(x, y)) || !ta.iter().zip(tb).all(|(x, y)| close(x, y))
    {
        return Err(MagnetError::SurfaceMismatch(format!(
            "{what}: quadrature point locations differ"
        )));
    }
    Ok(())
}

/// Tabulated surface: points and normals stored directly.
#[derive(Debug, Clone)]
pub struct SampledSurface {
    nfp: usize,
    quadpoints_phi: Vec<f64>,
    quadpoints_theta: Vec<f64>,
    gamma: Array3<f64>,
    normal: Array3<f64>,
}

impl SampledSurface {
    pub fn new(
        nfp: usize,
        quadpoints_phi: Vec<f64>,
        quadpoints_theta: Vec<f64>,
        gamma: Array3<f64>,
        normal: Array3<f64>,
    ) -> MagnetResult<Self> {
        validate_quadpoints(&quadpoints_phi, &quadpoints_theta)?;
        let expected = [quadpoints_phi.len(), quadpoints_theta.len(), 3];
        if gamma.shape() != expected {
            return Err(MagnetError::shape("surface gamma", &expected, gamma.shape()));
        }
        if normal.shape() != expected {
            return Err(MagnetError::shape("surface normal", &expected, normal.shape()));
        }
        Ok(Self {
            nfp,
            quadpoints_phi,
            quadpoints_theta,
            gamma,
            normal,
        })
    }

    /// Snapshot any surface into tabulated form.
    pub fn from_surface(surface: &dyn ToroidalSurface) -> Self {
        Self {
            nfp: surface.nfp(),
            quadpoints_phi: surface.quadpoints_phi().to_vec(),
            quadpoints_theta: surface.quadpoints_theta().to_vec(),
            gamma: surface.gamma(),
            normal: surface.normal(),
        }
    }
}

impl ToroidalSurface for SampledSurface {
    fn nfp(&self) -> usize {
        self.nfp
    }

    fn quadpoints_phi(&self) -> &[f64] {
        &self.quadpoints_phi
    }

    fn quadpoints_theta(&self) -> &[f64] {
        &self.quadpoints_theta
    }

    fn gamma(&self) -> Array3<f64> {
        self.gamma.clone()
    }

    fn normal(&self) -> Array3<f64> {
        self.normal.clone()
    }
}

/// Area element |n| summed with the quadrature weights: ∫ dA ≈ Σ |n| Δφ̂ Δθ̂.
pub fn surface_area(surface: &dyn ToroidalSurface) -> f64 {
    let q_phi = surface.quadpoints_phi();
    let q_theta = surface.quadpoints_theta();
    let weight = (q_phi[1] - q_phi[0]) * (q_theta[1] - q_theta[0]);
    surface
        .normal()
        .lanes(Axis(2))
        .into_iter()
        .map(|v| norm([v[0], v[1], v[2]]))
        .sum::<f64>()
        * weight
}

pub(crate) fn normal_from_tangents(d_phi: [f64; 3], d_theta: [f64; 3]) -> [f64; 3] {
    cross(d_phi, d_theta)
}
