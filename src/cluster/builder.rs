//! Builds one flat inner-product index per cluster.

use rayon::prelude::*;

use crate::cluster::{ClusterIndex, ClusterSlot};
use crate::error::EngineError;
use crate::vector::{ClusterId, FlatIpIndex, ProfileIndex, VectorDimension};

/// Slots for every cluster id plus the errors of clusters that failed.
#[derive(Debug)]
pub struct BuildOutcome {
    /// One slot per cluster id, indexed by `ClusterId`.
    pub slots: Vec<ClusterSlot>,
    /// `EngineError::IndexBuild` for every slot that ended up `Failed`.
    pub failures: Vec<EngineError>,
}

impl BuildOutcome {
    #[must_use]
    pub fn built_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_built()).count()
    }
}

/// Groups embeddings by label and indexes each group.
#[derive(Debug, Clone, Copy)]
pub struct ClusterIndexBuilder {
    dimension: VectorDimension,
}

impl ClusterIndexBuilder {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    /// Builds indices where `embeddings[i]` is the profile at global position `i`.
    #[must_use]
    pub fn build(&self, embeddings: &[Vec<f32>], labels: &[ClusterId], k: usize) -> BuildOutcome {
        let positions: Vec<ProfileIndex> = (0..embeddings.len())
            .map(|i| ProfileIndex::new(i as u32))
            .collect();
        self.build_with_positions(&positions, embeddings, labels, k)
    }

    /// Builds indices where `embeddings[i]` belongs to profile `positions[i]`.
    ///
    /// Members are added in input order, so local positions follow corpus
    /// order. A cluster whose vectors cannot be indexed is marked `Failed`
    /// without affecting the others; a cluster with no members is `Empty`.
    #[must_use]
    pub fn build_with_positions(
        &self,
        positions: &[ProfileIndex],
        embeddings: &[Vec<f32>],
        labels: &[ClusterId],
        k: usize,
    ) -> BuildOutcome {
        debug_assert_eq!(positions.len(), embeddings.len());
        debug_assert_eq!(labels.len(), embeddings.len());

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
        for (i, label) in labels.iter().enumerate() {
            match members.get_mut(label.as_usize()) {
                Some(bucket) => bucket.push(i),
                None => tracing::warn!(label = %label, k, "label outside partition range, profile skipped"),
            }
        }

        let results: Vec<Result<ClusterSlot, EngineError>> = members
            .par_iter()
            .enumerate()
            .map(|(c, bucket)| {
                let cluster = ClusterId::new(c as u32);
                if bucket.is_empty() {
                    tracing::debug!(cluster = c, "cluster has no members");
                    return Ok(ClusterSlot::Empty);
                }
                self.build_one(cluster, bucket, positions, embeddings)
                    .map(ClusterSlot::Built)
            })
            .collect();

        let mut slots = Vec::with_capacity(k);
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(slot) => slots.push(slot),
                Err(error) => {
                    tracing::warn!(error = %error, "cluster index build failed");
                    slots.push(ClusterSlot::Failed {
                        reason: error.to_string(),
                    });
                    failures.push(error);
                }
            }
        }

        BuildOutcome { slots, failures }
    }

    fn build_one(
        &self,
        cluster: ClusterId,
        bucket: &[usize],
        positions: &[ProfileIndex],
        embeddings: &[Vec<f32>],
    ) -> Result<ClusterIndex, EngineError> {
        let mut index = FlatIpIndex::with_capacity(self.dimension, bucket.len());
        let mut mapping = Vec::with_capacity(bucket.len());

        for &i in bucket {
            index
                .add(&embeddings[i])
                .map_err(|e| EngineError::IndexBuild {
                    cluster,
                    reason: format!("profile {}: {e}", positions[i]),
                })?;
            mapping.push(positions[i]);
        }

        tracing::debug!(cluster = %cluster, members = mapping.len(), "built cluster index");
        ClusterIndex::new(cluster, index, mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(n: usize) -> VectorDimension {
        VectorDimension::new(n).unwrap()
    }

    #[test]
    fn test_members_follow_corpus_order() {
        let embeddings = vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.9, 0.1],
            vec![0.1, 0.9],
        ];
        let labels = [0, 1, 0, 1].map(ClusterId::new);

        let outcome = ClusterIndexBuilder::new(dim(2)).build(&embeddings, &labels, 2);
        assert!(outcome.failures.is_empty());

        let first = outcome.slots[0].as_built().unwrap();
        assert_eq!(first.positions(), &[ProfileIndex::new(0), ProfileIndex::new(2)]);
        let second = outcome.slots[1].as_built().unwrap();
        assert_eq!(second.positions(), &[ProfileIndex::new(1), ProfileIndex::new(3)]);
    }

    #[test]
    fn test_zero_member_cluster_is_empty() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let labels = [0, 2].map(ClusterId::new);

        let outcome = ClusterIndexBuilder::new(dim(2)).build(&embeddings, &labels, 3);
        assert_eq!(outcome.slots.len(), 3);
        assert_eq!(outcome.slots[1], ClusterSlot::Empty);
        assert_eq!(outcome.built_count(), 2);
    }

    #[test]
    fn test_failure_is_isolated_to_one_cluster() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0, 0.5], vec![0.5, 0.5]];
        let labels = [0, 1, 0].map(ClusterId::new);

        let outcome = ClusterIndexBuilder::new(dim(2)).build(&embeddings, &labels, 2);

        assert!(outcome.slots[0].is_built());
        assert_eq!(outcome.slots[0].member_count(), 2);
        assert!(matches!(outcome.slots[1], ClusterSlot::Failed { .. }));
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            EngineError::IndexBuild { cluster, .. } if cluster.get() == 1
        ));
    }

    #[test]
    fn test_explicit_positions_are_used() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let positions = vec![ProfileIndex::new(10), ProfileIndex::new(42)];
        let labels = [0, 0].map(ClusterId::new);

        let outcome =
            ClusterIndexBuilder::new(dim(2)).build_with_positions(&positions, &embeddings, &labels, 1);
        let cluster = outcome.slots[0].as_built().unwrap();
        assert_eq!(cluster.global_position(1), Some(ProfileIndex::new(42)));
    }
}
