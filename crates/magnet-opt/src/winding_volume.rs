// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Winding Volume
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Current-carrying winding volume between the bounding surfaces.
//!
//! Every Cartesian cell carries a linear, divergence-free current density
//! spanned by 11 basis functions of the local coordinate ξ = (x − x_c)/L,
//! L = (dx·dy·dz)^(1/3). The normal field on the plasma boundary is linear
//! in the basis coefficients and is fitted by ridge-regularized least squares.

use crate::grid::{cartesian_cells, ShellSurfaces, SliceShell};
use crate::operator::{PlasmaSamples, TargetField};
use magnet_geometry::ToroidalSurface;
use magnet_math::linalg::cgls;
use magnet_math::vec3::{cross, dot, sub};
use magnet_types::config::{GridConfig, LatticeConfig};
use magnet_types::constants::{MU0_OVER_4PI, WV_BASIS_DIM};
use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Axis};
use tracing::{info, instrument};

/// Basis current `f` at local coordinate `xi`.
pub fn basis_current(f: usize, xi: [f64; 3]) -> [f64; 3] {
    let [x, y, z] = xi;
    match f {
        0 => [1.0, 0.0, 0.0],
        1 => [0.0, 1.0, 0.0],
        2 => [0.0, 0.0, 1.0],
        3 => [y, 0.0, 0.0],
        4 => [z, 0.0, 0.0],
        5 => [0.0, x, 0.0],
        6 => [0.0, z, 0.0],
        7 => [0.0, 0.0, x],
        8 => [0.0, 0.0, y],
        9 => [x, -y, 0.0],
        10 => [x, 0.0, -z],
        _ => [0.0; 3],
    }
}

/// Cell centres of the winding volume, grouped by toroidal sector.
#[derive(Debug, Clone)]
pub struct WindingVolumeGrid {
    centers: Array2<f64>,
    sector_offsets: Vec<usize>,
    spacing: [f64; 3],
}

impl WindingVolumeGrid {
    #[instrument(skip_all)]
    pub fn build(
        plasma: &dyn ToroidalSurface,
        shell: &ShellSurfaces,
        cfg: &GridConfig,
    ) -> MagnetResult<Self> {
        cfg.validate_lattice()?;
        let LatticeConfig::Cartesian { dx, dy, dz } = cfg.lattice else {
            return Err(MagnetError::ConfigError(
                "winding volume requires a cartesian lattice".to_string(),
            ));
        };
        let slices = SliceShell::all(shell);
        let cells = cartesian_cells(
            &slices,
            plasma.quadpoints_phi(),
            &shell.outer().gamma(),
            [dx, dy, dz],
            plasma.dphi(),
        );
        let mut centers = Array2::zeros((cells.len(), 3));
        let mut counts = vec![0usize; slices.len()];
        for (k, cell) in cells.iter().enumerate() {
            for c in 0..3 {
                centers[[k, c]] = cell.position[c];
            }
            counts[cell.slice] += 1;
        }
        let mut sector_offsets = vec![0];
        for count in counts {
            sector_offsets.push(sector_offsets[sector_offsets.len() - 1] + count);
        }
        info!(cells = cells.len(), "built winding volume");
        Ok(Self {
            centers,
            sector_offsets,
            spacing: [dx, dy, dz],
        })
    }

    pub fn len(&self) -> usize {
        self.centers.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn centers(&self) -> &Array2<f64> {
        &self.centers
    }

    pub fn sector_offsets(&self) -> &[usize] {
        &self.sector_offsets
    }

    pub fn cell_volume(&self) -> f64 {
        self.spacing.iter().product()
    }

    pub fn length_scale(&self) -> f64 {
        self.cell_volume().cbrt()
    }

    /// 2×2×2 Gauss points of cell `k` as (point, local ξ).
    fn quadrature(&self, k: usize) -> Vec<([f64; 3], [f64; 3])> {
        let l = self.length_scale();
        let center = [self.centers[[k, 0]], self.centers[[k, 1]], self.centers[[k, 2]]];
        let g = 0.5 / 3f64.sqrt();
        let mut pts = Vec::with_capacity(8);
        for sx in [-g, g] {
            for sy in [-g, g] {
                for sz in [-g, g] {
                    let off = [sx * self.spacing[0], sy * self.spacing[1], sz * self.spacing[2]];
                    pts.push((
                        [center[0] + off[0], center[1] + off[1], center[2] + off[2]],
                        [off[0] / l, off[1] / l, off[2] / l],
                    ));
                }
            }
        }
        pts
    }

    /// Current density in cell `k` at local coordinate `xi` for coefficients `alpha`.
    pub fn current_density(&self, alpha: &Array1<f64>, k: usize, xi: [f64; 3]) -> [f64; 3] {
        let mut j = [0.0; 3];
        for f in 0..WV_BASIS_DIM {
            let coeff = alpha[WV_BASIS_DIM * k + f];
            let jf = basis_current(f, xi);
            for c in 0..3 {
                j[c] += coeff * jf[c];
            }
        }
        j
    }
}

#[derive(Debug, Clone)]
pub struct WindingVolumeSolution {
    pub coefficients: Array1<f64>,
    /// ‖A α − b‖.
    pub residual_norm: f64,
    /// Mean |B·n| (T) left on the boundary.
    pub mean_abs_bnormal: f64,
}

#[derive(Debug, Clone)]
pub struct WindingVolumeOperator {
    a: Array2<f64>,
    b: Array1<f64>,
    weight: f64,
}

impl WindingVolumeOperator {
    #[instrument(skip_all, fields(cells = grid.len()))]
    pub fn build(
        plasma: &dyn ToroidalSurface,
        grid: &WindingVolumeGrid,
        target: TargetField<'_>,
    ) -> MagnetResult<Self> {
        if grid.is_empty() {
            return Err(MagnetError::ConfigError(
                "winding volume is empty: no cell lies between the bounding surfaces".to_string(),
            ));
        }
        let samples = PlasmaSamples::from_surface(plasma);
        let bn = samples.target_bnormal(target)?;
        let weight = samples.weight;
        let dv = grid.cell_volume() / 8.0;
        let quad: Vec<_> = (0..grid.len()).map(|k| grid.quadrature(k)).collect();

        let mut a = Array2::zeros((samples.len(), WV_BASIS_DIM * grid.len()));
        a.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, mut row)| {
                let (p, n_hat) = (samples.points[i], samples.normals[i]);
                for (k, points) in quad.iter().enumerate() {
                    for &(x, xi) in points {
                        let d = sub(p, x);
                        let r2 = dot(d, d);
                        if r2 <= 0.0 {
                            continue;
                        }
                        let s = MU0_OVER_4PI * dv * weight / (r2 * r2.sqrt());
                        for f in 0..WV_BASIS_DIM {
                            row[WV_BASIS_DIM * k + f] += s * dot(n_hat, cross(basis_current(f, xi), d));
                        }
                    }
                }
            });
        Ok(Self {
            a,
            b: bn.mapv(|v| -v * weight),
            weight,
        })
    }

    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    pub fn b(&self) -> &Array1<f64> {
        &self.b
    }

    /// min ‖Aα − b‖² + λ‖α‖².
    pub fn solve_ridge(&self, lambda: f64, max_iter: usize) -> MagnetResult<WindingVolumeSolution> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(MagnetError::ConfigError(format!(
                "winding volume ridge weight must be finite and >= 0, got {lambda}"
            )));
        }
        let coefficients = cgls(&self.a, &self.b, lambda.sqrt(), max_iter, 1e-12)?;
        let r = self.a.dot(&coefficients) - &self.b;
        let residual_norm = r.dot(&r).sqrt();
        let mean_abs_bnormal = r.mapv(f64::abs).mean().unwrap_or(0.0) / self.weight;
        info!(residual_norm, mean_abs_bnormal, "winding volume fit");
        Ok(WindingVolumeSolution {
            coefficients,
            residual_norm,
            mean_abs_bnormal,
        })
    }
}
