// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Vacuum permeability (H/m), classical exact value 4π × 1e-7.
pub const MU0_SI: f64 = 4.0 * std::f64::consts::PI * 1e-7;

/// μ0 / 4π (T·m/A), the Biot–Savart prefactor.
pub const MU0_OVER_4PI: f64 = 1e-7;

/// Default remanent field of the magnet material (T), NdFeB-class.
pub const B_MAX_DEFAULT: f64 = 1.4;

/// Number of moment components per dipole.
pub const DIPOLE_DIM: usize = 3;

/// Number of linear divergence-free current basis functions per winding-volume cell.
pub const WV_BASIS_DIM: usize = 11;
