// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Permanent Magnet Optimizer
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Permanent-magnet grid optimizer.
//!
//! Pipeline: bounding shell → dipole grid → geometric operator →
//! MwPGP / relax-and-split solve → field evaluation of the result.

pub mod constraints;
pub mod famus;
pub mod field;
pub mod grid;
pub mod mwpgp;
pub mod operator;
pub mod problem;
pub mod relax_split;
pub mod winding_volume;

pub use field::DipoleField;
pub use grid::{DipoleGrid, ShellSurfaces};
pub use operator::{GeometricOperator, PolarizationSet, TargetField};
pub use problem::MagnetProblem;
pub use relax_split::{optimize, OptimizationResult};
pub use winding_volume::{WindingVolumeGrid, WindingVolumeOperator, WindingVolumeSolution};
