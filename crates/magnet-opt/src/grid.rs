// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Dipole Grid Construction
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Candidate dipole cells between an inner and an outer bounding surface.
//!
//! A regular lattice spans the bounding box of the outer surface; every
//! lattice point is tested on its toroidal slice with a ray cast along the
//! projected normal of the nearest bounding-surface sample. For a sample `s`
//! the closest approach of the ray `p + t·d` (t >= 0) sits at the ray origin
//! exactly when τ = (s − p)·d <= 0. A point is kept when the inner surface
//! is closest at the origin and the outer surface is not.

use magnet_geometry::surface::check_same_quadrature;
use magnet_geometry::{read_boundary, SampledSurface, ToroidalSurface};
use magnet_math::vec3::to_cylindrical;
use magnet_types::config::{GridConfig, LatticeConfig};
use magnet_types::constants::MU0_SI;
use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::{Array1, Array2, Array3};
use rayon::prelude::*;
use std::f64::consts::PI;
use std::ops::Range;
use tracing::{info, instrument, warn};

/// Ray parameters this close to zero count as "at the origin" (m).
const MEMBERSHIP_TOL: f64 = 1e-12;

/// Inner and outer bounding surfaces, sampled at identical (φ, θ) points.
#[derive(Debug, Clone)]
pub struct ShellSurfaces {
    inner: SampledSurface,
    outer: SampledSurface,
}

impl ShellSurfaces {
    pub fn explicit(inner: &dyn ToroidalSurface, outer: &dyn ToroidalSurface) -> MagnetResult<Self> {
        check_same_quadrature(inner, outer, "inner/outer bounding surfaces")?;
        Ok(Self {
            inner: SampledSurface::from_surface(inner),
            outer: SampledSurface::from_surface(outer),
        })
    }

    /// Offset a base surface by `plasma_offset` (inner) and by
    /// `plasma_offset + coil_offset` (outer). The base is the boundary file
    /// when one is configured, otherwise the plasma surface itself.
    pub fn derive(plasma: &dyn ToroidalSurface, cfg: &GridConfig) -> MagnetResult<Self> {
        cfg.validate_offsets()?;
        let base: Box<dyn ToroidalSurface> = match (&cfg.boundary_file, cfg.derive_from_plasma) {
            (Some(file), _) => Box::new(read_boundary(file.format, &file.path)?.to_surface(
                plasma.quadpoints_phi().to_vec(),
                plasma.quadpoints_theta().to_vec(),
            )?),
            (None, true) => Box::new(SampledSurface::from_surface(plasma)),
            (None, false) => {
                return Err(MagnetError::ConfigError(
                    "no bounding surfaces: supply explicit inner/outer surfaces, \
                     grid.boundary_file, or enable grid.derive_from_plasma"
                        .to_string(),
                ))
            }
        };
        Ok(Self {
            inner: base.extend_via_projected_normal(cfg.plasma_offset),
            outer: base.extend_via_projected_normal(cfg.plasma_offset + cfg.coil_offset),
        })
    }

    /// Explicit surfaces win; otherwise derive from the configuration.
    pub fn resolve(
        plasma: &dyn ToroidalSurface,
        cfg: &GridConfig,
        explicit: Option<(&dyn ToroidalSurface, &dyn ToroidalSurface)>,
    ) -> MagnetResult<Self> {
        match explicit {
            Some((inner, outer)) => Self::explicit(inner, outer),
            None => Self::derive(plasma, cfg),
        }
    }

    pub fn inner(&self) -> &SampledSurface {
        &self.inner
    }

    pub fn outer(&self) -> &SampledSurface {
        &self.outer
    }
}

/// One toroidal cross-section of the shell in the (R, Z) plane.
pub(crate) struct SliceShell {
    inner: Vec<[f64; 2]>,
    outer: Vec<[f64; 2]>,
    inner_dirs: Vec<Option<[f64; 2]>>,
    outer_dirs: Vec<Option<[f64; 2]>>,
}

fn slice_samples(
    gamma: &Array3<f64>,
    normal: &Array3<f64>,
    slice: usize,
) -> (Vec<[f64; 2]>, Vec<Option<[f64; 2]>>) {
    let ntheta = gamma.shape()[1];
    let mut points = Vec::with_capacity(ntheta);
    let mut dirs = Vec::with_capacity(ntheta);
    for j in 0..ntheta {
        let (x, y, z) = (gamma[[slice, j, 0]], gamma[[slice, j, 1]], gamma[[slice, j, 2]]);
        let (sin_p, cos_p) = y.atan2(x).sin_cos();
        points.push([x.hypot(y), z]);
        let n_r = normal[[slice, j, 0]] * cos_p + normal[[slice, j, 1]] * sin_p;
        let n_z = normal[[slice, j, 2]];
        let len = n_r.hypot(n_z);
        dirs.push(if len > f64::MIN_POSITIVE && len.is_finite() {
            Some([n_r / len, n_z / len])
        } else {
            None
        });
    }
    (points, dirs)
}

fn nearest(points: &[[f64; 2]], p: [f64; 2]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (k, s) in points.iter().enumerate() {
        let d2 = (s[0] - p[0]).powi(2) + (s[1] - p[1]).powi(2);
        if d2 < best.1 {
            best = (k, d2);
        }
    }
    best
}

impl SliceShell {
    pub(crate) fn all(shell: &ShellSurfaces) -> Vec<SliceShell> {
        let (gi, ni) = (shell.inner.gamma(), shell.inner.normal());
        let (go, no) = (shell.outer.gamma(), shell.outer.normal());
        (0..gi.shape()[0])
            .map(|i| {
                let (inner, inner_dirs) = slice_samples(&gi, &ni, i);
                let (outer, outer_dirs) = slice_samples(&go, &no, i);
                SliceShell {
                    inner,
                    outer,
                    inner_dirs,
                    outer_dirs,
                }
            })
            .collect()
    }

    /// Ray-cast membership of an (R, Z) point.
    pub(crate) fn contains(&self, p: [f64; 2]) -> bool {
        let (ki, di) = nearest(&self.inner, p);
        let (ko, dout) = nearest(&self.outer, p);
        let dir = if di < dout {
            self.inner_dirs[ki]
        } else {
            self.outer_dirs[ko]
        };
        let Some(d) = dir else {
            return false;
        };
        let tau = |s: [f64; 2]| (s[0] - p[0]) * d[0] + (s[1] - p[1]) * d[1];
        let inner_at_origin = tau(self.inner[ki]) <= MEMBERSHIP_TOL;
        let outer_at_origin = tau(self.outer[ko]) <= MEMBERSHIP_TOL;
        inner_at_origin && !outer_at_origin
    }
}

/// A retained lattice point before assembly.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cell {
    pub slice: usize,
    pub position: [f64; 3],
    pub volume: f64,
}

/// `floor(extent / spacing)` evenly spaced values from `lo` to `hi`.
fn lattice_axis(lo: f64, hi: f64, spacing: f64) -> Vec<f64> {
    let n = ((hi - lo) / spacing).floor();
    if !n.is_finite() || n < 1.0 {
        return Vec::new();
    }
    let n = n as usize;
    if n == 1 {
        return vec![lo];
    }
    Array1::linspace(lo, hi, n).to_vec()
}

struct BoundingBox {
    lo: [f64; 3],
    hi: [f64; 3],
    r_lo: f64,
    r_hi: f64,
}

fn bounding_box(gamma: &Array3<f64>) -> BoundingBox {
    let mut bb = BoundingBox {
        lo: [f64::INFINITY; 3],
        hi: [f64::NEG_INFINITY; 3],
        r_lo: f64::INFINITY,
        r_hi: f64::NEG_INFINITY,
    };
    let (nphi, ntheta, _) = gamma.dim();
    for i in 0..nphi {
        for j in 0..ntheta {
            let p = [gamma[[i, j, 0]], gamma[[i, j, 1]], gamma[[i, j, 2]]];
            for c in 0..3 {
                bb.lo[c] = bb.lo[c].min(p[c]);
                bb.hi[c] = bb.hi[c].max(p[c]);
            }
            let r = p[0].hypot(p[1]);
            bb.r_lo = bb.r_lo.min(r);
            bb.r_hi = bb.r_hi.max(r);
        }
    }
    bb
}

fn cylindrical_cells(
    slices: &[SliceShell],
    quadpoints_phi: &[f64],
    bb: &BoundingBox,
    dr: f64,
    dz: f64,
    dphi: f64,
) -> Vec<Cell> {
    let r_axis = lattice_axis(bb.r_lo, bb.r_hi, dr);
    let z_axis = lattice_axis(bb.lo[2], bb.hi[2], dz);
    let per_slice: Vec<Vec<Cell>> = slices
        .par_iter()
        .enumerate()
        .map(|(i, slice)| {
            let (sin_p, cos_p) = (2.0 * PI * quadpoints_phi[i]).sin_cos();
            let mut cells = Vec::new();
            for &r in &r_axis {
                for &z in &z_axis {
                    if slice.contains([r, z]) {
                        cells.push(Cell {
                            slice: i,
                            position: [r * cos_p, r * sin_p, z],
                            volume: r * dr * dz * dphi,
                        });
                    }
                }
            }
            cells
        })
        .collect();
    per_slice.into_iter().flatten().collect()
}

/// Index of the slice nearest to toroidal angle `phi`, if within `half_width`.
fn nearest_slice(slice_angles: &[f64], phi: f64, half_width: f64) -> Option<usize> {
    let mut best = (0, f64::INFINITY);
    for (i, &angle) in slice_angles.iter().enumerate() {
        let d = (phi - angle).rem_euclid(2.0 * PI);
        let d = d.min(2.0 * PI - d);
        if d < best.1 {
            best = (i, d);
        }
    }
    (best.1 <= half_width).then_some(best.0)
}

/// Cartesian lattice points inside the shell, sorted by slice.
pub(crate) fn cartesian_cells(
    slices: &[SliceShell],
    quadpoints_phi: &[f64],
    outer_gamma: &Array3<f64>,
    spacing: [f64; 3],
    dphi: f64,
) -> Vec<Cell> {
    let bb = bounding_box(outer_gamma);
    let axes: Vec<Vec<f64>> = (0..3)
        .map(|c| lattice_axis(bb.lo[c], bb.hi[c], spacing[c]))
        .collect();
    let slice_angles: Vec<f64> = quadpoints_phi.iter().map(|q| 2.0 * PI * q).collect();
    let half_width = 0.5 * dphi.abs() * (1.0 + 1e-9);
    let volume = spacing[0] * spacing[1] * spacing[2];

    let per_x: Vec<Vec<Cell>> = axes[0]
        .par_iter()
        .map(|&x| {
            let mut cells = Vec::new();
            for &y in &axes[1] {
                let r = x.hypot(y);
                if r <= 0.0 {
                    continue;
                }
                let Some(i) = nearest_slice(&slice_angles, y.atan2(x), half_width) else {
                    continue;
                };
                for &z in &axes[2] {
                    if slices[i].contains([r, z]) {
                        cells.push(Cell {
                            slice: i,
                            position: [x, y, z],
                            volume,
                        });
                    }
                }
            }
            cells
        })
        .collect();
    let mut cells: Vec<Cell> = per_x.into_iter().flatten().collect();
    cells.sort_by_key(|c| c.slice);
    cells
}

/// Candidate dipoles grouped contiguously by toroidal sector.
#[derive(Debug, Clone)]
pub struct DipoleGrid {
    positions: Array2<f64>,
    cylindrical: Array2<f64>,
    cell_volumes: Array1<f64>,
    m_maxima: Array1<f64>,
    sector_offsets: Vec<usize>,
}

impl DipoleGrid {
    pub fn from_parts(
        positions: Array2<f64>,
        cell_volumes: Array1<f64>,
        m_maxima: Array1<f64>,
        sector_offsets: Vec<usize>,
    ) -> MagnetResult<Self> {
        let n = positions.nrows();
        if positions.ncols() != 3 {
            return Err(MagnetError::shape("dipole positions", &[n, 3], positions.shape()));
        }
        if cell_volumes.len() != n {
            return Err(MagnetError::shape("cell volumes", &[n], &[cell_volumes.len()]));
        }
        if m_maxima.len() != n {
            return Err(MagnetError::shape("moment bounds", &[n], &[m_maxima.len()]));
        }
        if m_maxima.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(MagnetError::ConfigError(
                "moment bounds must be finite and >= 0".to_string(),
            ));
        }
        let ordered = sector_offsets.windows(2).all(|w| w[0] <= w[1]);
        if sector_offsets.first() != Some(&0) || sector_offsets.last() != Some(&n) || !ordered {
            return Err(MagnetError::ConfigError(format!(
                "sector offsets must rise from 0 to {n}, got {sector_offsets:?}"
            )));
        }
        let mut cylindrical = Array2::zeros((n, 3));
        for k in 0..n {
            let c = to_cylindrical([positions[[k, 0]], positions[[k, 1]], positions[[k, 2]]]);
            for d in 0..3 {
                cylindrical[[k, d]] = c[d];
            }
        }
        Ok(Self {
            positions,
            cylindrical,
            cell_volumes,
            m_maxima,
            sector_offsets,
        })
    }

    pub(crate) fn from_cells(cells: &[Cell], num_sectors: usize, b_max: f64) -> MagnetResult<Self> {
        let n = cells.len();
        let mut positions = Array2::zeros((n, 3));
        let mut volumes = Array1::zeros(n);
        let mut counts = vec![0usize; num_sectors];
        for (k, cell) in cells.iter().enumerate() {
            for c in 0..3 {
                positions[[k, c]] = cell.position[c];
            }
            volumes[k] = cell.volume;
            counts[cell.slice] += 1;
        }
        let mut offsets = Vec::with_capacity(num_sectors + 1);
        offsets.push(0);
        for count in counts {
            offsets.push(offsets[offsets.len() - 1] + count);
        }
        let m_maxima = volumes.mapv(|v| b_max * v / MU0_SI);
        Self::from_parts(positions, volumes, m_maxima, offsets)
    }

    /// Lattice construction between two bounding surfaces.
    #[instrument(skip_all, fields(lattice = ?cfg.lattice))]
    pub fn build(
        plasma: &dyn ToroidalSurface,
        shell: &ShellSurfaces,
        cfg: &GridConfig,
    ) -> MagnetResult<Self> {
        cfg.validate_lattice()?;
        check_same_quadrature(&shell.inner, &shell.outer, "inner/outer bounding surfaces")?;
        let q_phi = plasma.quadpoints_phi();
        let shell_phi = shell.inner.quadpoints_phi();
        let same_phi = q_phi.len() == shell_phi.len()
            && q_phi
                .iter()
                .zip(shell_phi)
                .all(|(a, b)| (a - b).abs() <= 1e-12 * (1.0 + a.abs()));
        if !same_phi {
            return Err(MagnetError::SurfaceMismatch(
                "bounding surfaces must share the plasma toroidal quadrature points".to_string(),
            ));
        }

        let slices = SliceShell::all(shell);
        let outer_gamma = shell.outer.gamma();
        let dphi = plasma.dphi();
        let cells = match cfg.lattice {
            LatticeConfig::Cylindrical { dr, dz } => {
                let bb = bounding_box(&outer_gamma);
                cylindrical_cells(&slices, q_phi, &bb, dr, dz, dphi)
            }
            LatticeConfig::Cartesian { dx, dy, dz } => {
                cartesian_cells(&slices, q_phi, &outer_gamma, [dx, dy, dz], dphi)
            }
        };
        let grid = Self::from_cells(&cells, q_phi.len(), cfg.b_max)?;

        if grid.is_empty() {
            warn!("no lattice point lies between the bounding surfaces");
        } else {
            info!(
                dipoles = grid.len(),
                sectors = grid.num_sectors(),
                max_moment = grid.max_moment(),
                max_cell_volume = grid.cell_volumes.fold(0.0f64, |a, &v| a.max(v)),
                "built permanent-magnet grid"
            );
        }
        Ok(grid)
    }

    pub fn len(&self) -> usize {
        self.positions.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian positions, shape (N, 3).
    pub fn positions(&self) -> &Array2<f64> {
        &self.positions
    }

    /// (R, φ, Z) positions, shape (N, 3).
    pub fn cylindrical(&self) -> &Array2<f64> {
        &self.cylindrical
    }

    pub fn cell_volumes(&self) -> &Array1<f64> {
        &self.cell_volumes
    }

    /// Per-dipole bound on ‖m_k‖ (A·m²).
    pub fn m_maxima(&self) -> &Array1<f64> {
        &self.m_maxima
    }

    pub fn max_moment(&self) -> f64 {
        self.m_maxima.fold(0.0f64, |a, &m| a.max(m))
    }

    pub fn sector_offsets(&self) -> &[usize] {
        &self.sector_offsets
    }

    pub fn num_sectors(&self) -> usize {
        self.sector_offsets.len() - 1
    }

    /// Dipole index range of toroidal sector `s`.
    pub fn sector(&self, s: usize) -> Range<usize> {
        self.sector_offsets[s]..self.sector_offsets[s + 1]
    }
}
