// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — FAMUS Grid Reader
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Pre-made dipole grids in FAMUS focus format or plain `x, y, z, flag` rows.

use crate::grid::DipoleGrid;
use magnet_types::config::LatticeConfig;
use magnet_types::constants::MU0_SI;
use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::{Array1, Array2};
use std::f64::consts::PI;
use std::path::Path;
use tracing::{debug, info};

const HEADER_LINES: usize = 3;
/// Toroidal angles closer than this share a sector (rad).
const SECTOR_PHI_TOL: f64 = 1e-4;

#[derive(Debug, Clone, Copy)]
struct FamusRow {
    position: [f64; 3],
    m_max: Option<f64>,
}

fn parse_field(line: usize, name: &str, text: &str) -> MagnetResult<f64> {
    let val = text.trim().parse::<f64>().map_err(|e| MagnetError::Parse {
        line,
        message: format!("failed to parse {name} ({}): {e}", text.trim()),
    })?;
    if !val.is_finite() {
        return Err(MagnetError::Parse {
            line,
            message: format!("{name} must be finite, got {val}"),
        });
    }
    Ok(val)
}

fn parse_flag(line: usize, text: &str) -> MagnetResult<bool> {
    match parse_field(line, "flag", text)? {
        f if f == 0.0 => Ok(false),
        f if f == 1.0 => Ok(true),
        other => Err(MagnetError::Parse {
            line,
            message: format!("inclusion flag must be 0 or 1, got {other}"),
        }),
    }
}

/// Parse one data row; `None` for rows flagged off.
fn parse_row(line: usize, text: &str) -> MagnetResult<Option<FamusRow>> {
    let cols: Vec<&str> = text.split(',').map(str::trim).collect();
    let (xyz, keep, m_max) = match cols.len() {
        4 => (&cols[0..3], parse_flag(line, cols[3])?, None),
        n if n >= 7 => {
            let m_max = match cols.get(7) {
                Some(text) => {
                    let m = parse_field(line, "M_0", text)?;
                    if m < 0.0 {
                        return Err(MagnetError::Parse {
                            line,
                            message: format!("M_0 must be >= 0, got {m}"),
                        });
                    }
                    Some(m)
                }
                None => None,
            };
            (&cols[3..6], parse_flag(line, cols[6])?, m_max)
        }
        n => {
            return Err(MagnetError::Parse {
                line,
                message: format!("expected 4 or at least 7 comma-separated columns, got {n}"),
            })
        }
    };
    if !keep {
        return Ok(None);
    }
    Ok(Some(FamusRow {
        position: [
            parse_field(line, "x", xyz[0])?,
            parse_field(line, "y", xyz[1])?,
            parse_field(line, "z", xyz[2])?,
        ],
        m_max,
    }))
}

/// Build a grid from grid-file text. Rows without `M_0` take their bound from
/// the lattice cell volume and `b_max`.
pub fn parse_famus_grid(text: &str, lattice: &LatticeConfig, b_max: f64) -> MagnetResult<DipoleGrid> {
    let mut rows = Vec::new();
    let mut discarded = 0usize;
    for (idx, raw) in text.lines().enumerate().skip(HEADER_LINES) {
        if raw.trim().is_empty() {
            continue;
        }
        match parse_row(idx + 1, raw)? {
            Some(row) => rows.push(row),
            None => discarded += 1,
        }
    }
    if rows.is_empty() {
        return Err(MagnetError::ConfigError(
            "grid file contains no retained dipoles".to_string(),
        ));
    }

    let phi_of = |r: &FamusRow| r.position[1].atan2(r.position[0]).rem_euclid(2.0 * PI);
    rows.sort_by(|a, b| phi_of(a).total_cmp(&phi_of(b)));

    let mut offsets = vec![0];
    let mut sector_phis = vec![phi_of(&rows[0])];
    for (k, row) in rows.iter().enumerate().skip(1) {
        let phi = phi_of(row);
        if phi - sector_phis[sector_phis.len() - 1] > SECTOR_PHI_TOL {
            offsets.push(k);
            sector_phis.push(phi);
        }
    }
    // A sector straddling φ = 0 sorts to both ends; fold its tail into the head.
    let n = rows.len();
    if sector_phis.len() > 1
        && 2.0 * PI - sector_phis[sector_phis.len() - 1] + sector_phis[0] <= SECTOR_PHI_TOL
    {
        if let Some(tail_start) = offsets.pop() {
            let shift = n - tail_start;
            rows.rotate_right(shift);
            for offset in offsets.iter_mut().skip(1) {
                *offset += shift;
            }
            sector_phis.pop();
        }
    }
    offsets.push(n);

    let wrap_gap = match (sector_phis.first(), sector_phis.last()) {
        (Some(first), Some(last)) if sector_phis.len() > 1 => 2.0 * PI - last + first,
        _ => 2.0 * PI,
    };
    let dphi = sector_phis
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(wrap_gap, f64::min);
    let volume_of = |p: [f64; 3]| match *lattice {
        LatticeConfig::Cylindrical { dr, dz } => p[0].hypot(p[1]) * dr * dz * dphi,
        LatticeConfig::Cartesian { dx, dy, dz } => dx * dy * dz,
    };

    let mut positions = Array2::zeros((n, 3));
    let mut volumes = Array1::zeros(n);
    let mut m_maxima = Array1::zeros(n);
    for (k, row) in rows.iter().enumerate() {
        for c in 0..3 {
            positions[[k, c]] = row.position[c];
        }
        volumes[k] = volume_of(row.position);
        m_maxima[k] = row.m_max.unwrap_or(b_max * volumes[k] / MU0_SI);
    }
    debug!(retained = n, discarded, sectors = offsets.len() - 1, "parsed grid file");
    DipoleGrid::from_parts(positions, volumes, m_maxima, offsets)
}

pub fn read_famus_grid(
    path: impl AsRef<Path>,
    lattice: &LatticeConfig,
    b_max: f64,
) -> MagnetResult<DipoleGrid> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let grid = parse_famus_grid(&text, lattice, b_max)?;
    info!(
        path = %path.display(),
        dipoles = grid.len(),
        max_moment = grid.max_moment(),
        "loaded pre-made dipole grid"
    );
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn project_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
    }

    #[test]
    fn test_famus_file_filters_by_flag() {
        let path = project_root().join("testdata/famus_grid.focus");
        let grid = read_famus_grid(&path, &LatticeConfig::default(), 1.4).unwrap();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.sector_offsets(), &[0, 3, 6]);
        for k in grid.sector(0) {
            assert!((grid.m_maxima()[k] - 25.0).abs() < 1e-12);
            assert!(grid.positions()[[k, 1]].abs() < 1e-12);
        }
        for k in grid.sector(1) {
            assert!((grid.m_maxima()[k] - 20.0).abs() < 1e-12);
        }
        // Stable within a sector: file order survives.
        assert!((grid.positions()[[0, 0]] - 1.2).abs() < 1e-12);
        assert!((grid.positions()[[1, 2]] - 0.15).abs() < 1e-12);
        assert!((grid.positions()[[2, 0]] - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_xyz_rows_take_volume_bound() {
        let path = project_root().join("testdata/famus_xyz.txt");
        let grid = read_famus_grid(&path, &LatticeConfig::default(), 1.4).unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.sector_offsets(), &[0, 1, 2]);
        let expected = 1.4 * 1.2 * 0.05 * 0.05 * (PI / 2.0) / MU0_SI;
        for k in 0..2 {
            assert!((grid.m_maxima()[k] - expected).abs() < 1e-9 * expected);
        }
    }

    #[test]
    fn test_sector_across_phi_zero_is_merged() {
        let eps = 1e-5f64;
        let (s, c) = eps.sin_cos();
        let text = format!(
            "h\nh\nh\n{c}, {s}, 0.0, 1\n0.0, 1.2, 0.0, 1\n{c}, {}, 0.1, 1\n-1.0, 0.0, 0.0, 1\n",
            -s
        );
        let grid = parse_famus_grid(&text, &LatticeConfig::default(), 1.4).unwrap();
        assert_eq!(grid.num_sectors(), 3);
        assert_eq!(grid.sector_offsets(), &[0, 2, 3, 4]);
        // The point just below 2π leads the merged sector.
        assert!(grid.positions()[[0, 1]] < 0.0 && grid.positions()[[1, 1]] > 0.0);
        // Δφ is the gap to the φ = π/2 sector, not the 2e-5 split across φ = 0.
        let expected = 1.4 * 0.05 * 0.05 * (PI / 2.0 - eps) / MU0_SI;
        assert!((grid.m_maxima()[0] - expected).abs() < 1e-9 * expected);
    }

    #[test]
    fn test_cartesian_volume_for_xyz_rows() {
        let text = "h\nh\nh\n1.0, 0.0, 0.0, 1\n";
        let lattice = LatticeConfig::Cartesian {
            dx: 0.1,
            dy: 0.1,
            dz: 0.1,
        };
        let grid = parse_famus_grid(text, &lattice, 1.0).unwrap();
        assert!((grid.cell_volumes()[0] - 1e-3).abs() < 1e-15);
        assert!((grid.m_maxima()[0] - 1e-3 / MU0_SI).abs() < 1e-6);
    }

    #[test]
    fn test_bad_flag_reports_line() {
        let text = "h\nh\nh\n1.0, 0.0, 0.0, 1\n1.0, 0.0, 0.1, 2\n";
        match parse_famus_grid(text, &LatticeConfig::default(), 1.4) {
            Err(MagnetError::Parse { line, message }) => {
                assert_eq!(line, 5);
                assert!(message.contains("0 or 1"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_wrong_column_count() {
        let text = "h\nh\nh\n1.0, 0.0, 0.0, 1, 5\n";
        assert!(matches!(
            parse_famus_grid(text, &LatticeConfig::default(), 1.4),
            Err(MagnetError::Parse { line: 4, .. })
        ));
    }

    #[test]
    fn test_all_rows_flagged_off() {
        let text = "h\nh\nh\n1.0, 0.0, 0.0, 0\n";
        assert!(matches!(
            parse_famus_grid(text, &LatticeConfig::default(), 1.4),
            Err(MagnetError::ConfigError(_))
        ));
    }
}
