//! Exact inner-product index over the members of one cluster.
//!
//! Vectors are stored unit-normalized in a single contiguous buffer, so the
//! inner product against a normalized query is the cosine similarity and
//! every score lies in [-1.0, 1.0]. Local positions are assigned in insertion
//! order starting at zero and never change.

use std::cmp::Ordering;

use crate::vector::types::{Score, VectorDimension, VectorError, dot, normalize_in_place, normalized};

/// Brute-force inner-product index.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dimension: VectorDimension,
    data: Vec<f32>,
}

impl FlatIpIndex {
    /// Creates an empty index for vectors of the given dimension.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Creates an empty index with room for `capacity` vectors.
    #[must_use]
    pub fn with_capacity(dimension: VectorDimension, capacity: usize) -> Self {
        Self {
            dimension,
            data: Vec::with_capacity(capacity * dimension.get()),
        }
    }

    /// Rebuilds an index from rows that were already normalized when written.
    ///
    /// Used when loading a snapshot; `data` holds `len * dimension` values.
    pub fn from_rows(dimension: VectorDimension, data: Vec<f32>) -> Result<Self, VectorError> {
        if data.len() % dimension.get() != 0 {
            return Err(VectorError::DimensionMismatch {
                expected: dimension.get(),
                actual: data.len() % dimension.get(),
            });
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(VectorError::NonFinite);
        }
        Ok(Self { dimension, data })
    }

    /// Appends a vector and returns its local position.
    ///
    /// The stored copy is normalized to unit length.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, VectorError> {
        self.dimension.validate_vector(vector)?;
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(VectorError::NonFinite);
        }

        let position = self.len();
        let start = self.data.len();
        self.data.extend_from_slice(vector);
        normalize_in_place(&mut self.data[start..]);
        Ok(position)
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension.get()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Returns the stored (normalized) vector at a local position.
    #[must_use]
    pub fn row(&self, position: usize) -> Option<&[f32]> {
        let dim = self.dimension.get();
        let start = position.checked_mul(dim)?;
        self.data.get(start..start + dim)
    }

    /// Contiguous row-major view of every stored vector.
    #[must_use]
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Returns the `k` best local positions for `query`.
    ///
    /// Results are ordered by score descending, ties by ascending local
    /// position. The query is normalized before scoring. Asking for more
    /// than `len()` results returns all of them.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, Score)>, VectorError> {
        self.dimension.validate_vector(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = normalized(query);
        let mut hits = self
            .data
            .chunks_exact(self.dimension.get())
            .enumerate()
            .map(|(position, row)| Ok((position, Score::from_similarity(dot(&query, row))?)))
            .collect::<Result<Vec<_>, VectorError>>()?;

        let by_rank = |a: &(usize, Score), b: &(usize, Score)| -> Ordering {
            b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
        };

        if k < hits.len() {
            hits.select_nth_unstable_by(k, by_rank);
            hits.truncate(k);
        }
        hits.sort_by(by_rank);

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(rows: &[Vec<f32>]) -> FlatIpIndex {
        let mut index = FlatIpIndex::new(VectorDimension::new(rows[0].len()).unwrap());
        for row in rows {
            index.add(row).unwrap();
        }
        index
    }

    #[test]
    fn test_positions_follow_insertion_order() {
        let mut index = FlatIpIndex::new(VectorDimension::new(2).unwrap());
        assert_eq!(index.add(&[1.0, 0.0]).unwrap(), 0);
        assert_eq!(index.add(&[0.0, 2.0]).unwrap(), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.row(1).unwrap(), &[0.0, 1.0]);
        assert!(index.row(2).is_none());
    }

    #[test]
    fn test_search_orders_by_score_then_position() {
        let index = index_of(&[
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![1.0, 1.0],
        ]);

        let hits = index.search(&[3.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert!((hits[0].1.get() - 1.0).abs() < 1e-6);
        assert!((hits[2].1.get() - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn test_search_caps_at_member_count() {
        let index = index_of(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(index.search(&[1.0, 1.0], 10).unwrap().len(), 2);
        assert!(index.search(&[1.0, 1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_scores_stay_bounded_for_unnormalized_input() {
        let index = index_of(&[vec![10.0, 10.0], vec![-5.0, 0.0]]);
        for (_, score) in index.search(&[100.0, 0.0], 2).unwrap() {
            assert!((-1.0..=1.0).contains(&score.get()));
        }
    }

    #[test]
    fn test_rejects_bad_vectors() {
        let mut index = FlatIpIndex::new(VectorDimension::new(3).unwrap());
        assert!(matches!(
            index.add(&[1.0, 2.0]),
            Err(VectorError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            index.add(&[1.0, f32::INFINITY, 0.0]),
            Err(VectorError::NonFinite)
        ));
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_from_rows_validates_shape() {
        let dim = VectorDimension::new(2).unwrap();
        let index = FlatIpIndex::from_rows(dim, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(index.len(), 2);
        assert!(FlatIpIndex::from_rows(dim, vec![1.0, 0.0, 0.5]).is_err());
    }
}
