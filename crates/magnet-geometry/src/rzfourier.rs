// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — RZ Fourier Surface
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Boundary given by a double Fourier series in cylindrical coordinates.
//!
//! R(θ, φ) = Σ rc cos(mθ − nfp·nφ) + rs sin(mθ − nfp·nφ), Z likewise with
//! zc/zs; m in 0..=mpol, n in −ntor..=ntor. Coefficient arrays are indexed
//! `[m, n + ntor]`.

use crate::surface::{
    normal_from_tangents, quadpoints_phi, quadpoints_theta, validate_quadpoints, QuadRange,
    ToroidalSurface,
};
use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::{Array2, Array3};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy)]
enum Coefficient {
    Rc,
    Rs,
    Zc,
    Zs,
}

#[derive(Debug, Clone)]
pub struct SurfaceRZFourier {
    nfp: usize,
    stellsym: bool,
    mpol: usize,
    ntor: usize,
    rc: Array2<f64>,
    rs: Array2<f64>,
    zc: Array2<f64>,
    zs: Array2<f64>,
    quadpoints_phi: Vec<f64>,
    quadpoints_theta: Vec<f64>,
}

/// Values and quadpoint derivatives of R and Z at one (φ, θ) sample.
struct RzSample {
    r: f64,
    z: f64,
    r_phi: f64,
    z_phi: f64,
    r_theta: f64,
    z_theta: f64,
}

impl SurfaceRZFourier {
    pub fn new(
        nfp: usize,
        stellsym: bool,
        mpol: usize,
        ntor: usize,
        range: QuadRange,
        nphi: usize,
        ntheta: usize,
    ) -> MagnetResult<Self> {
        Self::with_quadpoints(
            nfp,
            stellsym,
            mpol,
            ntor,
            quadpoints_phi(range, nfp, nphi),
            quadpoints_theta(ntheta),
        )
    }

    pub fn with_quadpoints(
        nfp: usize,
        stellsym: bool,
        mpol: usize,
        ntor: usize,
        quadpoints_phi: Vec<f64>,
        quadpoints_theta: Vec<f64>,
    ) -> MagnetResult<Self> {
        if nfp == 0 {
            return Err(MagnetError::ConfigError(
                "surface nfp must be >= 1".to_string(),
            ));
        }
        validate_quadpoints(&quadpoints_phi, &quadpoints_theta)?;
        let shape = (mpol + 1, 2 * ntor + 1);
        Ok(Self {
            nfp,
            stellsym,
            mpol,
            ntor,
            rc: Array2::zeros(shape),
            rs: Array2::zeros(shape),
            zc: Array2::zeros(shape),
            zs: Array2::zeros(shape),
            quadpoints_phi,
            quadpoints_theta,
        })
    }

    /// Circular-cross-section torus R = R0 + a cos θ, Z = a sin θ.
    pub fn torus(
        major_radius: f64,
        minor_radius: f64,
        nfp: usize,
        range: QuadRange,
        nphi: usize,
        ntheta: usize,
    ) -> MagnetResult<Self> {
        if !major_radius.is_finite() || !minor_radius.is_finite() || minor_radius <= 0.0 {
            return Err(MagnetError::ConfigError(format!(
                "torus radii must be finite with minor > 0, got R0={major_radius} a={minor_radius}"
            )));
        }
        if minor_radius >= major_radius {
            return Err(MagnetError::ConfigError(format!(
                "torus minor radius {minor_radius} must be below major radius {major_radius}"
            )));
        }
        let mut surf = Self::new(nfp, true, 1, 0, range, nphi, ntheta)?;
        surf.set_rc(0, 0, major_radius)?;
        surf.set_rc(1, 0, minor_radius)?;
        surf.set_zs(1, 0, minor_radius)?;
        Ok(surf)
    }

    /// Same coefficients evaluated on new quadrature points.
    pub fn resampled(
        &self,
        quadpoints_phi: Vec<f64>,
        quadpoints_theta: Vec<f64>,
    ) -> MagnetResult<Self> {
        validate_quadpoints(&quadpoints_phi, &quadpoints_theta)?;
        Ok(Self {
            quadpoints_phi,
            quadpoints_theta,
            ..self.clone()
        })
    }

    pub fn mpol(&self) -> usize {
        self.mpol
    }

    pub fn ntor(&self) -> usize {
        self.ntor
    }

    pub fn stellsym(&self) -> bool {
        self.stellsym
    }

    pub fn major_radius(&self) -> f64 {
        self.rc[[0, self.ntor]]
    }

    fn index(&self, m: usize, n: i32) -> MagnetResult<(usize, usize)> {
        if m > self.mpol || n.unsigned_abs() as usize > self.ntor {
            return Err(MagnetError::ConfigError(format!(
                "mode (m={m}, n={n}) outside mpol={} ntor={}",
                self.mpol, self.ntor
            )));
        }
        Ok((m, (n + self.ntor as i32) as usize))
    }

    fn set(&mut self, which: Coefficient, m: usize, n: i32, value: f64) -> MagnetResult<()> {
        if !value.is_finite() {
            return Err(MagnetError::ConfigError(format!(
                "{which:?}(m={m}, n={n}) must be finite"
            )));
        }
        let idx = self.index(m, n)?;
        if self.stellsym && matches!(which, Coefficient::Rs | Coefficient::Zc) && value != 0.0 {
            self.stellsym = false;
        }
        let target = match which {
            Coefficient::Rc => &mut self.rc,
            Coefficient::Rs => &mut self.rs,
            Coefficient::Zc => &mut self.zc,
            Coefficient::Zs => &mut self.zs,
        };
        target[idx] = value;
        Ok(())
    }

    pub fn set_rc(&mut self, m: usize, n: i32, value: f64) -> MagnetResult<()> {
        self.set(Coefficient::Rc, m, n, value)
    }

    pub fn set_rs(&mut self, m: usize, n: i32, value: f64) -> MagnetResult<()> {
        self.set(Coefficient::Rs, m, n, value)
    }

    pub fn set_zc(&mut self, m: usize, n: i32, value: f64) -> MagnetResult<()> {
        self.set(Coefficient::Zc, m, n, value)
    }

    pub fn set_zs(&mut self, m: usize, n: i32, value: f64) -> MagnetResult<()> {
        self.set(Coefficient::Zs, m, n, value)
    }

    pub fn get_rc(&self, m: usize, n: i32) -> MagnetResult<f64> {
        Ok(self.rc[self.index(m, n)?])
    }

    pub fn get_zs(&self, m: usize, n: i32) -> MagnetResult<f64> {
        Ok(self.zs[self.index(m, n)?])
    }

    fn sample(&self, phi: f64, theta: f64) -> RzSample {
        let mut s = RzSample {
            r: 0.0,
            z: 0.0,
            r_phi: 0.0,
            z_phi: 0.0,
            r_theta: 0.0,
            z_theta: 0.0,
        };
        let nfp = self.nfp as f64;
        for m in 0..=self.mpol {
            for col in 0..(2 * self.ntor + 1) {
                let n = col as f64 - self.ntor as f64;
                let (rc, rs) = (self.rc[[m, col]], self.rs[[m, col]]);
                let (zc, zs) = (self.zc[[m, col]], self.zs[[m, col]]);
                if rc == 0.0 && rs == 0.0 && zc == 0.0 && zs == 0.0 {
                    continue;
                }
                let arg = 2.0 * PI * (m as f64 * theta - nfp * n * phi);
                let (sin_a, cos_a) = arg.sin_cos();
                let darg_dphi = -2.0 * PI * nfp * n;
                let darg_dtheta = 2.0 * PI * m as f64;
                let dr = -rc * sin_a + rs * cos_a;
                let dz = -zc * sin_a + zs * cos_a;
                s.r += rc * cos_a + rs * sin_a;
                s.z += zc * cos_a + zs * sin_a;
                s.r_phi += dr * darg_dphi;
                s.z_phi += dz * darg_dphi;
                s.r_theta += dr * darg_dtheta;
                s.z_theta += dz * darg_dtheta;
            }
        }
        s
    }

    fn fill<F>(&self, f: F) -> Array3<f64>
    where
        F: Fn(&RzSample, f64) -> [f64; 3],
    {
        let (nphi, ntheta) = (self.quadpoints_phi.len(), self.quadpoints_theta.len());
        let mut out = Array3::zeros((nphi, ntheta, 3));
        for (i, &phi) in self.quadpoints_phi.iter().enumerate() {
            for (j, &theta) in self.quadpoints_theta.iter().enumerate() {
                let v = f(&self.sample(phi, theta), 2.0 * PI * phi);
                for c in 0..3 {
                    out[[i, j, c]] = v[c];
                }
            }
        }
        out
    }
}

impl ToroidalSurface for SurfaceRZFourier {
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
        self.fill(|s, angle| {
            let (sin_p, cos_p) = angle.sin_cos();
            [s.r * cos_p, s.r * sin_p, s.z]
        })
    }

    fn normal(&self) -> Array3<f64> {
        self.fill(|s, angle| {
            let (sin_p, cos_p) = angle.sin_cos();
            let d_phi = [
                s.r_phi * cos_p - 2.0 * PI * s.r * sin_p,
                s.r_phi * sin_p + 2.0 * PI * s.r * cos_p,
                s.z_phi,
            ];
            let d_theta = [s.r_theta * cos_p, s.r_theta * sin_p, s.z_theta];
            normal_from_tangents(d_phi, d_theta)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torus_gamma_on_circle() {
        let surf = SurfaceRZFourier::torus(2.0, 0.5, 1, QuadRange::FullTorus, 4, 8).unwrap();
        let g = surf.gamma();
        // φ = 0 slice lies in the x-z half plane.
        for j in 0..8 {
            assert!(g[[0, j, 1]].abs() < 1e-14);
            let rho = (g[[0, j, 0]] - 2.0).hypot(g[[0, j, 2]]);
            assert!((rho - 0.5).abs() < 1e-14);
        }
    }

    #[test]
    fn test_normal_points_outward() {
        let surf = SurfaceRZFourier::torus(1.0, 0.2, 1, QuadRange::FullTorus, 6, 10).unwrap();
        let g = surf.gamma();
        let n = surf.unitnormal();
        for i in 0..6 {
            for j in 0..10 {
                let r = g[[i, j, 0]].hypot(g[[i, j, 1]]);
                let phi = g[[i, j, 1]].atan2(g[[i, j, 0]]);
                // Outward direction from the magnetic axis in the slice plane.
                let out = [(r - 1.0) * phi.cos(), (r - 1.0) * phi.sin(), g[[i, j, 2]]];
                let dot = out[0] * n[[i, j, 0]] + out[1] * n[[i, j, 1]] + out[2] * n[[i, j, 2]];
                assert!((dot - 0.2).abs() < 1e-12, "dot = {dot} at ({i}, {j})");
            }
        }
    }

    #[test]
    fn test_rotating_ellipse_normal_matches_finite_difference() {
        let mut surf =
            SurfaceRZFourier::new(3, true, 1, 1, QuadRange::FieldPeriod, 5, 7).unwrap();
        surf.set_rc(0, 0, 1.0).unwrap();
        surf.set_rc(1, 0, 0.15).unwrap();
        surf.set_zs(1, 0, 0.1).unwrap();
        surf.set_rc(1, 1, 0.04).unwrap();
        surf.set_zs(1, 1, 0.03).unwrap();
        let n = surf.normal();

        let (i, j) = (2, 3);
        let (phi, theta) = (surf.quadpoints_phi()[i], surf.quadpoints_theta()[j]);
        let h = 1e-6;
        let point = |p: f64, t: f64| {
            let probe = surf.resampled(vec![p, p + 0.5], vec![t, t + 0.5]).unwrap();
            let g = probe.gamma();
            [g[[0, 0, 0]], g[[0, 0, 1]], g[[0, 0, 2]]]
        };
        let fd = |a: [f64; 3], b: [f64; 3]| {
            [(a[0] - b[0]) / (2.0 * h), (a[1] - b[1]) / (2.0 * h), (a[2] - b[2]) / (2.0 * h)]
        };
        let d_phi = fd(point(phi + h, theta), point(phi - h, theta));
        let d_theta = fd(point(phi, theta + h), point(phi, theta - h));
        let expected = normal_from_tangents(d_phi, d_theta);
        for c in 0..3 {
            assert!(
                (n[[i, j, c]] - expected[c]).abs() < 1e-5 * (1.0 + expected[c].abs()),
                "component {c}: {} vs {}",
                n[[i, j, c]],
                expected[c]
            );
        }
    }

    #[test]
    fn test_out_of_range_mode_rejected() {
        let mut surf = SurfaceRZFourier::new(1, true, 2, 1, QuadRange::FullTorus, 4, 4).unwrap();
        assert!(surf.set_rc(3, 0, 1.0).is_err());
        assert!(surf.set_zs(1, -2, 1.0).is_err());
        assert!(surf.set_rs(1, -1, 0.1).is_ok());
        assert!(!surf.stellsym());
        surf.set_zs(1, 1, 0.02).unwrap();
        assert_eq!(surf.get_zs(1, 1).unwrap(), 0.02);
        assert_eq!(surf.get_rc(0, 0).unwrap(), 0.0);
        assert!(surf.get_rc(0, 2).is_err());
    }

    #[test]
    fn test_degenerate_torus_rejected() {
        assert!(SurfaceRZFourier::torus(1.0, 1.5, 1, QuadRange::FullTorus, 4, 4).is_err());
        assert!(SurfaceRZFourier::torus(1.0, 0.1, 1, QuadRange::FullTorus, 1, 4).is_err());
    }
}
