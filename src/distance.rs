//! Distance kernels over fixed-dimension float vectors.
//!
//! All three kernels are "smaller = closer". Grounded on the cosine/Euclidean/dot
//! implementations in the teacher's `Vector` type, generalized to free functions
//! over plain slices (the store keeps raw `Vec<f32>` on `Noun`/`Verb` rather than
//! a cached-magnitude wrapper type) and made fallible: cosine distance rejects a
//! zero-norm operand with `InvalidVector` rather than silently returning zero.

use crate::error::{BrainyError, BrainyResult};

/// Squared Euclidean distance. Monotone with Euclidean distance and cheaper
/// (no square root), so it is preferred wherever only relative ordering matters.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> BrainyResult<f32> {
    require_same_dims(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum())
}

/// Euclidean distance.
pub fn euclidean(a: &[f32], b: &[f32]) -> BrainyResult<f32> {
    Ok(squared_euclidean(a, b)?.sqrt())
}

/// Cosine distance: `1 - dot(a, b) / (||a|| * ||b||)`.
///
/// Fails with `InvalidVector` if either operand has zero norm, or if either
/// operand contains a NaN or infinite component.
pub fn cosine(a: &[f32], b: &[f32]) -> BrainyResult<f32> {
    require_same_dims(a, b)?;
    require_finite(a)?;
    require_finite(b)?;

    let mag_a = magnitude(a);
    let mag_b = magnitude(b);
    if mag_a == 0.0 || mag_b == 0.0 {
        return Err(BrainyError::InvalidVector {
            reason: "cosine distance is undefined for a zero-norm vector".to_string(),
        });
    }

    let dot_ab = dot(a, b)?;
    Ok(1.0 - dot_ab / (mag_a * mag_b))
}

/// Dot product.
pub fn dot(a: &[f32], b: &[f32]) -> BrainyResult<f32> {
    require_same_dims(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn require_same_dims(a: &[f32], b: &[f32]) -> BrainyResult<()> {
    if a.len() != b.len() {
        return Err(BrainyError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

fn require_finite(v: &[f32]) -> BrainyResult<()> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(BrainyError::InvalidVector {
            reason: "vector contains a NaN or infinite component".to_string(),
        });
    }
    Ok(())
}
