//! Mathematical primitives for the permanent-magnet optimizer.

pub mod linalg;
pub mod sparse;
pub mod vec3;
