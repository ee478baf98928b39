// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Boundary Loaders
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Plasma boundary readers for FOCUS tables and VMEC input namelists.
//!
//! Both formats reduce to the same [`BoundaryData`]: field-period count plus
//! a list of (m, n) Fourier modes, with n counted per field period.

use crate::rzfourier::SurfaceRZFourier;
use crate::surface::{quadpoints_phi, quadpoints_theta, QuadRange};
use magnet_types::config::BoundaryFormat;
use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::Array2;
use std::f64::consts::PI;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FourierMode {
    pub m: usize,
    pub n: i32,
    pub r_cos: f64,
    pub r_sin: f64,
    pub z_cos: f64,
    pub z_sin: f64,
}

/// Normal-field harmonic Bn = bn_cos cos(mθ − nfp·nφ) + bn_sin sin(…).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BnMode {
    pub m: usize,
    pub n: i32,
    pub bn_cos: f64,
    pub bn_sin: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryData {
    pub nfp: usize,
    pub modes: Vec<FourierMode>,
    /// Plasma normal-field harmonics (FOCUS files only).
    pub bn_modes: Vec<BnMode>,
}

impl BoundaryData {
    pub fn mpol(&self) -> usize {
        self.modes.iter().map(|m| m.m).max().unwrap_or(0)
    }

    pub fn ntor(&self) -> usize {
        self.modes
            .iter()
            .map(|m| m.n.unsigned_abs() as usize)
            .max()
            .unwrap_or(0)
    }

    pub fn to_surface(
        &self,
        quadpoints_phi: Vec<f64>,
        quadpoints_theta: Vec<f64>,
    ) -> MagnetResult<SurfaceRZFourier> {
        let stellsym = self.modes.iter().all(|m| m.r_sin == 0.0 && m.z_cos == 0.0);
        let mut surf = SurfaceRZFourier::with_quadpoints(
            self.nfp,
            stellsym,
            self.mpol(),
            self.ntor(),
            quadpoints_phi,
            quadpoints_theta,
        )?;
        for mode in &self.modes {
            surf.set_rc(mode.m, mode.n, mode.r_cos)?;
            surf.set_rs(mode.m, mode.n, mode.r_sin)?;
            surf.set_zc(mode.m, mode.n, mode.z_cos)?;
            surf.set_zs(mode.m, mode.n, mode.z_sin)?;
        }
        Ok(surf)
    }

    /// Evaluate the Bn harmonics on a (φ, θ) quadrature grid, shape (nφ, nθ).
    pub fn bnormal_grid(&self, quadpoints_phi: &[f64], quadpoints_theta: &[f64]) -> Array2<f64> {
        let nfp = self.nfp as f64;
        Array2::from_shape_fn(
            (quadpoints_phi.len(), quadpoints_theta.len()),
            |(i, j)| {
                self.bn_modes
                    .iter()
                    .map(|b| {
                        let arg = 2.0
                            * PI
                            * (b.m as f64 * quadpoints_theta[j]
                                - nfp * b.n as f64 * quadpoints_phi[i]);
                        b.bn_cos * arg.cos() + b.bn_sin * arg.sin()
                    })
                    .sum()
            },
        )
    }
}

fn parse_err(line: usize, message: impl Into<String>) -> MagnetError {
    MagnetError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_float(line: usize, key: &str, text: &str) -> MagnetResult<f64> {
    let normalized = text.trim().replace(|c: char| c == 'D' || c == 'd', "E");
    let val = normalized
        .parse::<f64>()
        .map_err(|e| parse_err(line, format!("failed to parse '{key}' as float ({text}): {e}")))?;
    if !val.is_finite() {
        return Err(parse_err(line, format!("'{key}' must be finite, got {val}")));
    }
    Ok(val)
}

fn parse_int<T>(line: usize, key: &str, text: &str) -> MagnetResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse::<T>()
        .map_err(|e| parse_err(line, format!("failed to parse '{key}' as integer ({text}): {e}")))
}

// ── FOCUS ────────────────────────────────────────────────────────────

/// FOCUS boundary: `Nfou nfp nbf`, then Nfou rows `n m rc rs zc zs`,
/// then nbf rows `n m bnc bns`. Lines starting with `#` are comments.
pub fn parse_focus(text: &str) -> MagnetResult<BoundaryData> {
    let mut rows = text
        .lines()
        .enumerate()
        .map(|(idx, l)| (idx + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

    let (line, header) = rows
        .next()
        .ok_or_else(|| parse_err(0, "FOCUS file has no header line"))?;
    let cols: Vec<&str> = header.split_whitespace().collect();
    if cols.len() < 3 {
        return Err(parse_err(line, "FOCUS header needs 'Nfou nfp nbf'"));
    }
    let n_modes: usize = parse_int(line, "Nfou", cols[0])?;
    let nfp: usize = parse_int(line, "nfp", cols[1])?;
    let n_bn: usize = parse_int(line, "nbf", cols[2])?;
    if nfp == 0 {
        return Err(parse_err(line, "nfp must be >= 1"));
    }
    let mut last_line = line;

    let mut modes = Vec::with_capacity(n_modes);
    for k in 0..n_modes {
        let (line, row) = rows.next().ok_or_else(|| {
            parse_err(last_line, format!("expected {n_modes} boundary modes, found {k}"))
        })?;
        last_line = line;
        let cols: Vec<&str> = row.split_whitespace().collect();
        if cols.len() < 6 {
            return Err(parse_err(line, "boundary mode row needs 'n m rc rs zc zs'"));
        }
        modes.push(FourierMode {
            n: parse_int(line, "n", cols[0])?,
            m: parse_int(line, "m", cols[1])?,
            r_cos: parse_float(line, "rc", cols[2])?,
            r_sin: parse_float(line, "rs", cols[3])?,
            z_cos: parse_float(line, "zc", cols[4])?,
            z_sin: parse_float(line, "zs", cols[5])?,
        });
    }

    let mut bn_modes = Vec::with_capacity(n_bn);
    for k in 0..n_bn {
        let (line, row) = rows
            .next()
            .ok_or_else(|| parse_err(last_line, format!("expected {n_bn} Bn modes, found {k}")))?;
        last_line = line;
        let cols: Vec<&str> = row.split_whitespace().collect();
        if cols.len() < 4 {
            return Err(parse_err(line, "Bn mode row needs 'n m bnc bns'"));
        }
        bn_modes.push(BnMode {
            n: parse_int(line, "n", cols[0])?,
            m: parse_int(line, "m", cols[1])?,
            bn_cos: parse_float(line, "bnc", cols[2])?,
            bn_sin: parse_float(line, "bns", cols[3])?,
        });
    }

    Ok(BoundaryData {
        nfp,
        modes,
        bn_modes,
    })
}

// ── VMEC input namelist ──────────────────────────────────────────────

/// One `KEY(i,j) = value` or `KEY = value` assignment.
struct Assignment<'a> {
    key: String,
    indices: Option<&'a str>,
    value: &'a str,
}

/// Split a namelist line into assignments. Stops at the first token that
/// is not an assignment (array continuations, group markers).
fn scan_assignments(line: &str) -> Vec<Assignment<'_>> {
    let mut out = Vec::new();
    let mut rest = line;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        let ident_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if ident_len == 0 {
            break;
        }
        let key = rest[..ident_len].to_ascii_uppercase();
        rest = rest[ident_len..].trim_start();
        let mut indices = None;
        if let Some(after) = rest.strip_prefix('(') {
            let Some(close) = after.find(')') else {
                break;
            };
            indices = Some(&after[..close]);
            rest = after[close + 1..].trim_start();
        }
        let Some(after_eq) = rest.strip_prefix('=') else {
            break;
        };
        let after_eq = after_eq.trim_start();
        let value_len = after_eq
            .find(|c: char| c.is_whitespace() || c == ',')
            .unwrap_or(after_eq.len());
        out.push(Assignment {
            key,
            indices,
            value: &after_eq[..value_len],
        });
        rest = &after_eq[value_len..];
    }
    out
}

fn parse_fortran_bool(line: usize, text: &str) -> MagnetResult<bool> {
    match text.trim().trim_matches('.').to_ascii_uppercase().as_str() {
        "T" | "TRUE" => Ok(true),
        "F" | "FALSE" => Ok(false),
        other => Err(parse_err(line, format!("invalid logical value '{other}'"))),
    }
}

/// VMEC `&INDATA` namelist: `NFP`, `LASYM` and `RBC/RBS/ZBC/ZBS(n,m)` entries.
pub fn parse_vmec_input(text: &str) -> MagnetResult<BoundaryData> {
    let mut nfp: Option<usize> = None;
    let mut lasym = false;
    let mut modes: Vec<FourierMode> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split('!').next().unwrap_or("").trim();
        if line.is_empty() || line.starts_with('&') || line == "/" {
            continue;
        }
        for a in scan_assignments(line) {
            match a.key.as_str() {
                "NFP" => {
                    let v: usize = parse_int(line_no, "NFP", a.value)?;
                    if v == 0 {
                        return Err(parse_err(line_no, "NFP must be >= 1"));
                    }
                    nfp = Some(v);
                }
                "LASYM" => lasym = parse_fortran_bool(line_no, a.value)?,
                "RBC" | "RBS" | "ZBC" | "ZBS" => {
                    let indices = a.indices.ok_or_else(|| {
                        parse_err(line_no, format!("{} needs (n,m) indices", a.key))
                    })?;
                    let (n_txt, m_txt) = indices.split_once(',').ok_or_else(|| {
                        parse_err(line_no, format!("{} indices must be (n,m)", a.key))
                    })?;
                    let n: i32 = parse_int(line_no, "n", n_txt)?;
                    let m: i32 = parse_int(line_no, "m", m_txt)?;
                    if m < 0 {
                        return Err(parse_err(line_no, format!("{} requires m >= 0", a.key)));
                    }
                    let value = parse_float(line_no, &a.key, a.value)?;
                    let m = m as usize;
                    let pos = match modes.iter().position(|md| md.m == m && md.n == n) {
                        Some(p) => p,
                        None => {
                            modes.push(FourierMode {
                                m,
                                n,
                                r_cos: 0.0,
                                r_sin: 0.0,
                                z_cos: 0.0,
                                z_sin: 0.0,
                            });
                            modes.len() - 1
                        }
                    };
                    let mode = &mut modes[pos];
                    match a.key.as_str() {
                        "RBC" => mode.r_cos = value,
                        "RBS" => mode.r_sin = value,
                        "ZBC" => mode.z_cos = value,
                        _ => mode.z_sin = value,
                    }
                }
                _ => {}
            }
        }
    }

    if !modes.iter().any(|md| md.m == 0 && md.n == 0 && md.r_cos != 0.0) {
        return Err(parse_err(0, "VMEC input is missing RBC(0,0)"));
    }
    let nfp = nfp.ok_or_else(|| parse_err(0, "VMEC input is missing NFP"))?;
    if !lasym {
        let asym = modes.iter().any(|md| md.r_sin != 0.0 || md.z_cos != 0.0);
        if asym {
            debug!("VMEC input has RBS/ZBC terms with LASYM = F; keeping them");
        }
    }
    Ok(BoundaryData {
        nfp,
        modes,
        bn_modes: Vec::new(),
    })
}

// ── Entry points ─────────────────────────────────────────────────────

pub fn parse_boundary(format: BoundaryFormat, text: &str) -> MagnetResult<BoundaryData> {
    match format {
        BoundaryFormat::Focus => parse_focus(text),
        BoundaryFormat::VmecInput => parse_vmec_input(text),
    }
}

pub fn read_boundary(format: BoundaryFormat, path: impl AsRef<Path>) -> MagnetResult<BoundaryData> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let data = parse_boundary(format, &text)?;
    debug!(
        path = %path.display(),
        nfp = data.nfp,
        modes = data.modes.len(),
        "loaded plasma boundary"
    );
    Ok(data)
}

/// Load a boundary file and sample it on a regular (φ, θ) grid.
pub fn load_boundary(
    format: BoundaryFormat,
    path: impl AsRef<Path>,
    range: QuadRange,
    nphi: usize,
    ntheta: usize,
) -> MagnetResult<SurfaceRZFourier> {
    let data = read_boundary(format, path)?;
    data.to_surface(
        quadpoints_phi(range, data.nfp, nphi),
        quadpoints_theta(ntheta),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOCUS_TEXT: &str = "\
# bmn  bNfp  nbf
  3    2    1
#plasma boundary
# n m Rbc Rbs Zbc Zbs
  0  0  1.00  0.0  0.0  0.00
  0  1  0.12  0.0  0.0  0.12
  1  1  0.02  0.0  0.0  0.015
#Bn harmonics
# n m bnc bns
  0  1  1.0e-3  0.0
";

    #[test]
    fn test_parse_focus_modes() {
        let data = parse_focus(FOCUS_TEXT).unwrap();
        assert_eq!(data.nfp, 2);
        assert_eq!(data.modes.len(), 3);
        assert_eq!(data.mpol(), 1);
        assert_eq!(data.ntor(), 1);
        assert_eq!(data.modes[2].n, 1);
        assert!((data.modes[2].z_sin - 0.015).abs() < 1e-15);
        assert_eq!(data.bn_modes.len(), 1);
    }

    #[test]
    fn test_focus_bnormal_grid() {
        let data = parse_focus(FOCUS_TEXT).unwrap();
        let bn = data.bnormal_grid(&[0.0, 0.1], &[0.0, 0.25, 0.5]);
        assert_eq!(bn.dim(), (2, 3));
        assert!((bn[[0, 0]] - 1e-3).abs() < 1e-15);
        assert!(bn[[1, 1]].abs() < 1e-15);
        assert!((bn[[0, 2]] + 1e-3).abs() < 1e-15);
    }

    #[test]
    fn test_focus_truncated_file() {
        let text = "# header\n 4 1 0\n 0 0 1.0 0 0 0\n";
        let err = parse_focus(text).unwrap_err();
        match err {
            MagnetError::Parse { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("expected 4"));
            }
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_focus_bad_number_reports_line() {
        let text = "# header\n 1 1 0\n 0 0 abc 0 0 0\n";
        match parse_focus(text).unwrap_err() {
            MagnetError::Parse { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("rc"));
            }
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_vmec_input() {
        let text = "\
&INDATA
  NFP = 3
  LASYM = F
  RBC(0,0) = 1.0E+00  ZBS(0,0) = 0.0E+00
  RBC(0,1) = 1.0D-01, ZBS(0,1) = 1.0D-01 ! circular
  RBC(1,1) = 2.0E-02  ZBS(-1,1) = -5.0E-03
  AM = 0.0 0.0 0.0
/
";
        let data = parse_vmec_input(text).unwrap();
        assert_eq!(data.nfp, 3);
        assert_eq!(data.ntor(), 1);
        let m11 = data.modes.iter().find(|m| m.m == 1 && m.n == 1).unwrap();
        assert!((m11.r_cos - 0.02).abs() < 1e-15);
        let m1m1 = data.modes.iter().find(|m| m.m == 1 && m.n == -1).unwrap();
        assert!((m1m1.z_sin + 0.005).abs() < 1e-15);
        let surf = data.to_surface(vec![0.0, 0.1], vec![0.0, 0.5]).unwrap();
        assert!((surf.major_radius() - 1.0).abs() < 1e-15);
        assert!(surf.stellsym());
    }

    #[test]
    fn test_vmec_missing_keys() {
        let err = parse_vmec_input("&INDATA\n RBC(0,0) = 1.0\n/\n").unwrap_err();
        assert!(matches!(err, MagnetError::Parse { message, .. } if message.contains("NFP")));
        let err = parse_vmec_input("&INDATA\n NFP = 2\n/\n").unwrap_err();
        assert!(matches!(err, MagnetError::Parse { message, .. } if message.contains("RBC(0,0)")));
    }

    #[test]
    fn test_vmec_bad_indices() {
        let err = parse_vmec_input("NFP = 1\nRBC(0) = 1.0\n").unwrap_err();
        assert!(matches!(err, MagnetError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_boundary(BoundaryFormat::Focus, "/nonexistent/plasma.focus").unwrap_err();
        assert!(matches!(err, MagnetError::Io(_)));
    }
}
