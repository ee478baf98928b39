// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Boundary Geometry
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Toroidal boundary surfaces sampled on (φ, θ) quadrature grids.
//!
//! Everything downstream consumes surfaces through [`surface::ToroidalSurface`]:
//! points `gamma()` of shape (nφ, nθ, 3), un-normalized normals and the
//! quadrature spacings.

pub mod loaders;
pub mod rzfourier;
pub mod surface;

pub use loaders::{load_boundary, parse_boundary, read_boundary, BoundaryData};
pub use magnet_types::config::BoundaryFormat;
pub use rzfourier::SurfaceRZFourier;
pub use surface::{quadpoints_phi, quadpoints_theta, QuadRange, SampledSurface, ToroidalSurface};
