//! Pure vector helpers over equal-length `f32` slices.
//!
//! Mismatched lengths are a caller bug and only checked in debug builds.

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "dot on mismatched lengths");
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn length(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Vector pointing from `a` to `b`.
pub fn delta(a: &[f32], b: &[f32]) -> Vec<f32> {
    debug_assert_eq!(a.len(), b.len(), "delta on mismatched lengths");
    a.iter().zip(b).map(|(x, y)| y - x).collect()
}

/// Scales `v` to unit length. `None` when the norm is zero.
pub fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm = length(v);
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

/// Unit-length elementwise average of `a` and `b`.
///
/// Returns `None` for the degenerate case where the average is the zero
/// vector (e.g. `a == -b`).
pub fn midpoint(a: &[f32], b: &[f32]) -> Option<Vec<f32>> {
    debug_assert_eq!(a.len(), b.len(), "midpoint on mismatched lengths");
    let avg: Vec<f32> = a.iter().zip(b).map(|(x, y)| (x + y) / 2.0).collect();
    normalize(&avg)
}

/// Cosine similarity. Zero vectors have similarity 0 with everything.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let denom = length(a) * length(b);
    if denom == 0.0 {
        return 0.0;
    }
    dot(a, b) / denom
}
