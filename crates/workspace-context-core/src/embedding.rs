//! Vector utilities for embeddings.
//!
//! The vector store keeps every embedding unit-length, so ranking reduces
//! to a dot product.

use crate::error::StoreError;

/// Euclidean (L2) length of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Return a unit-length copy of `v`.
///
/// # Errors
///
/// - [`StoreError::EmptyEmbedding`] for an empty vector.
/// - [`StoreError::ZeroNorm`] when the vector has no direction (all zeros,
///   or a norm below `f32::EPSILON`) or contains non-finite values.
///
/// # Example
///
/// ```rust
/// use workspace_context_core::embedding::{l2_norm, normalize};
///
/// let v = normalize(&[3.0, 4.0]).unwrap();
/// assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
/// assert!((v[0] - 0.6).abs() < 1e-6);
/// ```
pub fn normalize(v: &[f32]) -> Result<Vec<f32>, StoreError> {
    if v.is_empty() {
        return Err(StoreError::EmptyEmbedding);
    }
    let norm = l2_norm(v);
    if !norm.is_finite() || norm < f32::EPSILON {
        return Err(StoreError::ZeroNorm);
    }
    Ok(v.iter().map(|x| x / norm).collect())
}

/// Dot product of two equal-length vectors.
///
/// For unit vectors this is the cosine similarity. The result is clamped
/// to `[-1.0, 1.0]` to absorb rounding drift.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    let sum: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    sum.clamp(-1.0, 1.0)
}
