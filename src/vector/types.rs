//! Type-safe wrappers and core types for the clustered vector index.
//!
//! Newtypes keep cluster labels, corpus positions, similarity scores and
//! dimensions from being mixed up as bare integers and floats.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dimension produced by the default local embedding model (all-MiniLM-L6-v2).
pub const VECTOR_DIMENSION_384: usize = 384;

/// Dense global position of a profile inside one corpus snapshot.
///
/// This is the identity every query-time component works with; it is only
/// meaningful together with the `ProfileStore` the generation was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileIndex(u32);

impl ProfileIndex {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Builds an index from a corpus position.
    ///
    /// Returns `None` if the position does not fit in a `u32`.
    #[must_use]
    pub fn from_usize(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ProfileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cluster label within one index generation.
///
/// Labels are dense and zero-based (`0..k`). They are stable only inside a
/// single generation; a rebuild is free to reassign them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(u32);

impl ClusterId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns `None` if the label does not fit in a `u32`.
    #[must_use]
    pub fn from_usize(id: usize) -> Option<Self> {
        u32::try_from(id).ok().map(Self)
    }

    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Creates from little-endian bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for inner-product similarity scores.
///
/// Both the query and the indexed vectors are unit-normalized, so scores
/// are cosine similarities in the range [-1.0, 1.0]:
/// - 1.0 indicates identical direction
/// - 0.0 indicates orthogonal vectors
/// - -1.0 indicates opposite direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Score(f32);

impl Score {
    /// Creates a new `Score` with validation.
    ///
    /// Returns an error if the score is outside [-1.0, 1.0] or is NaN.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        if !(-1.0..=1.0).contains(&value) {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score must be in range [-1.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Creates a score from a raw inner product of unit vectors.
    ///
    /// Floating-point accumulation can push a dot product of unit vectors
    /// marginally past ±1.0; those values are clamped. NaN is still rejected.
    pub fn from_similarity(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        Ok(Self(value.clamp(-1.0, 1.0)))
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // NaN is rejected at construction, so total_cmp agrees with numeric order
        self.0.total_cmp(&other.0)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent dimension
/// mismatches between the corpus, the index and the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for VectorDimension {
    type Error = VectorError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VectorDimension> for usize {
    fn from(value: VectorDimension) -> Self {
        value.0
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid score value: {value}\nReason: {reason}")]
    InvalidScore { value: f32, reason: &'static str },

    #[error(
        "Vector contains non-finite values\nSuggestion: Check the embedding provider output for NaN or infinity"
    )]
    NonFinite,

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Rebuild the index with the current version"
    )]
    VersionMismatch { expected: u32, actual: u32 },
}

/// Computes the inner product of two equally sized vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Normalizes a vector in-place to unit length.
///
/// Vectors with a norm below `f32::EPSILON` are left untouched (effectively zero).
pub fn normalize_in_place(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Creates a unit-length copy of a vector.
#[must_use]
pub fn normalized(vector: &[f32]) -> Vec<f32> {
    let mut copy = vector.to_vec();
    normalize_in_place(&mut copy);
    copy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_index_conversion() {
        let idx = ProfileIndex::from_usize(42).unwrap();
        assert_eq!(idx.get(), 42);
        assert_eq!(idx.as_usize(), 42);
        assert!(ProfileIndex::from_usize(usize::MAX).is_none());
    }

    #[test]
    fn test_cluster_id_is_zero_based() {
        let id = ClusterId::new(0);
        assert_eq!(id.get(), 0);

        let bytes = ClusterId::new(7).to_bytes();
        assert_eq!(ClusterId::from_bytes(bytes), ClusterId::new(7));
    }

    #[test]
    fn test_score_validation() {
        assert_eq!(Score::new(0.5).unwrap().get(), 0.5);
        assert_eq!(Score::new(-0.5).unwrap().get(), -0.5);
        assert_eq!(Score::zero().get(), 0.0);
        assert_eq!(Score::one().get(), 1.0);

        assert!(Score::new(-1.1).is_err());
        assert!(Score::new(1.1).is_err());
        assert!(Score::new(f32::NAN).is_err());
    }

    #[test]
    fn test_score_from_similarity_clamps_rounding() {
        let score = Score::from_similarity(1.000_001).unwrap();
        assert_eq!(score.get(), 1.0);
        assert!(Score::from_similarity(f32::NAN).is_err());
    }

    #[test]
    fn test_score_ordering() {
        let mut scores = [Score::new(0.2).unwrap(), Score::new(0.9).unwrap(), Score::zero()];
        scores.sort_by(|a, b| b.cmp(a));
        assert_eq!(scores[0].get(), 0.9);
        assert_eq!(scores[2].get(), 0.0);
    }

    #[test]
    fn test_vector_dimension() {
        let dim = VectorDimension::new(384).unwrap();
        assert_eq!(dim.get(), 384);
        assert_eq!(VectorDimension::dimension_384(), dim);
        assert!(VectorDimension::new(0).is_err());

        assert!(dim.validate_vector(&vec![0.1; 384]).is_ok());
        assert!(matches!(
            dim.validate_vector(&vec![0.1; 100]),
            Err(VectorError::DimensionMismatch {
                expected: 384,
                actual: 100
            })
        ));
    }

    #[test]
    fn test_normalize() {
        let mut vector = vec![3.0, 4.0];
        normalize_in_place(&mut vector);
        assert!((vector[0] - 0.6).abs() < f32::EPSILON);
        assert!((vector[1] - 0.8).abs() < f32::EPSILON);

        let zero = normalized(&[0.0, 0.0]);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
