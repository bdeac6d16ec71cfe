//! Vector math shared by the store's distance function and the search
//! engine.

/// Cosine distance `1 - cos(a, b)`, accumulated in `f64`.
///
/// Returns `None` when the lengths differ. A zero-norm operand has no
/// direction; it is treated as orthogonal to everything (distance `1.0`).
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    cosine_similarity(a, b).map(|similarity| 1.0 - similarity)
}

/// Cosine similarity in `[-1, 1]`, accumulated in `f64`.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Euclidean norm.
#[must_use]
pub fn norm(v: &[f32]) -> f64 {
    v.iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt()
}
