// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — 3-Vector Helpers
// © 1998–2026 Miroslav Šotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

/// 3D dot product.
#[inline]
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// 3D cross product a × b.
#[inline]
pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn scale(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[inline]
pub fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Unit vector along `a`, or `None` when `a` has (numerically) zero length.
#[inline]
pub fn try_normalize(a: [f64; 3]) -> Option<[f64; 3]> {
    let n = norm(a);
    if n <= f64::MIN_POSITIVE || !n.is_finite() {
        return None;
    }
    Some(scale(a, 1.0 / n))
}

/// Cartesian (x, y, z) to cylindrical (R, φ, Z), φ in (−π, π].
#[inline]
pub fn to_cylindrical(p: [f64; 3]) -> [f64; 3] {
    [p[0].hypot(p[1]), p[1].atan2(p[0]), p[2]]
}
