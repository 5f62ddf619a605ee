//! Immutable index generations and atomic publication.
//!
//! An `IndexGeneration` bundles everything a query needs: centroids, the
//! per-cluster slots and the profile corpus the positions refer to. It is
//! never mutated after construction; a rebuild produces a new generation and
//! `GenerationHandle::publish` swaps it in. Readers holding the previous
//! `Arc` keep using it until they drop it.

mod build;
mod snapshot;

pub use build::{BuildReport, EmbeddingFailure, GenerationBuilder};
pub use snapshot::{MANIFEST_FILE, SNAPSHOT_FORMAT_VERSION, saved_generation_number};

use std::sync::Arc;

use parking_lot::RwLock;

use crate::cluster::ClusterSlot;
use crate::error::{EngineError, EngineResult};
use crate::profile::ProfileStore;
use crate::vector::{ClusterId, VectorDimension, normalized};

/// A complete, read-only set of cluster indices.
#[derive(Debug)]
pub struct IndexGeneration {
    number: u64,
    dimension: VectorDimension,
    centroids: Vec<Vec<f32>>,
    slots: Vec<ClusterSlot>,
    store: Arc<ProfileStore>,
}

impl IndexGeneration {
    /// Assembles a generation.
    ///
    /// Requires exactly one centroid per slot, every centroid and every built
    /// index in `dimension`, and every mapped position inside `store`.
    /// Centroids are stored unit-normalized.
    pub fn new(
        number: u64,
        dimension: VectorDimension,
        centroids: Vec<Vec<f32>>,
        slots: Vec<ClusterSlot>,
        store: Arc<ProfileStore>,
    ) -> EngineResult<Self> {
        if centroids.len() != slots.len() {
            return Err(EngineError::Config {
                reason: format!(
                    "generation has {} centroids for {} clusters",
                    centroids.len(),
                    slots.len()
                ),
            });
        }
        for centroid in &centroids {
            dimension.validate_vector(centroid)?;
        }
        for cluster in slots.iter().filter_map(ClusterSlot::as_built) {
            if cluster.index().dimension() != dimension {
                return Err(EngineError::Dimension {
                    expected: dimension.get(),
                    actual: cluster.index().dimension().get(),
                });
            }
            if let Some(outside) = cluster
                .positions()
                .iter()
                .find(|p| p.as_usize() >= store.len())
            {
                return Err(EngineError::IndexBuild {
                    cluster: cluster.id(),
                    reason: format!("position {outside} is outside a corpus of {}", store.len()),
                });
            }
        }

        Ok(Self {
            number,
            dimension,
            centroids: centroids.iter().map(|c| normalized(c)).collect(),
            slots,
            store,
        })
    }

    /// Monotonic build number, used for logging and snapshots.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.number
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Unit-length centroids indexed by cluster id.
    #[must_use]
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    #[must_use]
    pub fn slots(&self) -> &[ClusterSlot] {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, cluster: ClusterId) -> Option<&ClusterSlot> {
        self.slots.get(cluster.as_usize())
    }

    #[must_use]
    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    #[must_use]
    pub fn shared_store(&self) -> Arc<ProfileStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn built_cluster_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_built()).count()
    }

    /// Number of profiles reachable through some built cluster.
    #[must_use]
    pub fn indexed_profile_count(&self) -> usize {
        self.slots.iter().map(ClusterSlot::member_count).sum()
    }
}

/// Shared pointer to the generation queries should use.
#[derive(Debug)]
pub struct GenerationHandle {
    current: RwLock<Arc<IndexGeneration>>,
}

impl GenerationHandle {
    #[must_use]
    pub fn new(initial: IndexGeneration) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The generation to run the next query against.
    #[must_use]
    pub fn current(&self) -> Arc<IndexGeneration> {
        Arc::clone(&*self.current.read())
    }

    /// Atomically replaces the current generation and returns the previous one.
    pub fn publish(&self, next: IndexGeneration) -> Arc<IndexGeneration> {
        let next = Arc::new(next);
        tracing::info!(
            generation = next.number(),
            clusters = next.cluster_count(),
            "publishing index generation"
        );
        std::mem::replace(&mut *self.current.write(), next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterIndex;
    use crate::profile::Profile;
    use crate::vector::{FlatIpIndex, ProfileIndex};

    fn store(n: usize) -> Arc<ProfileStore> {
        let profiles = (0..n)
            .map(|i| Profile {
                profile_id: format!("p{i}"),
                ..Profile::default()
            })
            .collect();
        Arc::new(ProfileStore::new(profiles).unwrap())
    }

    fn built(id: u32, positions: &[u32]) -> ClusterSlot {
        let mut index = FlatIpIndex::new(VectorDimension::new(2).unwrap());
        for _ in positions {
            index.add(&[1.0, 0.0]).unwrap();
        }
        let positions = positions.iter().map(|&p| ProfileIndex::new(p)).collect();
        ClusterSlot::Built(ClusterIndex::new(ClusterId::new(id), index, positions).unwrap())
    }

    fn generation(number: u64) -> IndexGeneration {
        IndexGeneration::new(
            number,
            VectorDimension::new(2).unwrap(),
            vec![vec![2.0, 0.0], vec![0.0, 1.0]],
            vec![built(0, &[0, 1]), ClusterSlot::Empty],
            store(2),
        )
        .unwrap()
    }

    #[test]
    fn test_generation_counts_and_normalizes() {
        let generation = generation(1);
        assert_eq!(generation.cluster_count(), 2);
        assert_eq!(generation.built_cluster_count(), 1);
        assert_eq!(generation.indexed_profile_count(), 2);
        assert_eq!(generation.centroids()[0], vec![1.0, 0.0]);
    }

    #[test]
    fn test_generation_rejects_inconsistent_parts() {
        let dim = VectorDimension::new(2).unwrap();
        assert!(
            IndexGeneration::new(1, dim, vec![vec![1.0, 0.0]], vec![], store(1)).is_err()
        );
        assert!(
            IndexGeneration::new(1, dim, vec![vec![1.0, 0.0]], vec![built(0, &[5])], store(2))
                .is_err()
        );
    }

    #[test]
    fn test_handle_swaps_atomically() {
        let handle = GenerationHandle::new(generation(1));
        let reader = handle.current();

        let previous = handle.publish(generation(2));
        assert_eq!(previous.number(), 1);
        assert_eq!(reader.number(), 1);
        assert_eq!(handle.current().number(), 2);
    }
}
