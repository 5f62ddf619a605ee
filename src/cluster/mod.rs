//! Build-time clustering: partitioning, per-cluster indices and summaries.
//!
//! A cluster index is the unit the query path works with: a flat
//! inner-product index over the cluster's members plus the mapping from
//! local index positions back to global `ProfileIndex` values. The two are
//! produced, saved and loaded together and are never valid apart.

mod analysis;
mod builder;
mod partition;

pub use analysis::{ClusterSummary, analyze_clusters};
pub use builder::{BuildOutcome, ClusterIndexBuilder};
pub use partition::{KSelection, Partition, partition, select_k};

use crate::error::{EngineError, EngineResult};
use crate::vector::{ClusterId, FlatIpIndex, ProfileIndex};

/// A cluster's index together with its local -> global position mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterIndex {
    id: ClusterId,
    index: FlatIpIndex,
    positions: Vec<ProfileIndex>,
}

impl ClusterIndex {
    /// Pairs an index with its mapping.
    ///
    /// Fails when the mapping does not have exactly one entry per indexed vector.
    pub fn new(id: ClusterId, index: FlatIpIndex, positions: Vec<ProfileIndex>) -> EngineResult<Self> {
        if index.len() != positions.len() {
            return Err(EngineError::IndexBuild {
                cluster: id,
                reason: format!(
                    "index holds {} vectors but the mapping has {} positions",
                    index.len(),
                    positions.len()
                ),
            });
        }
        Ok(Self {
            id,
            index,
            positions,
        })
    }

    #[must_use]
    pub fn id(&self) -> ClusterId {
        self.id
    }

    #[must_use]
    pub fn index(&self) -> &FlatIpIndex {
        &self.index
    }

    /// Global positions in local position order.
    #[must_use]
    pub fn positions(&self) -> &[ProfileIndex] {
        &self.positions
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.positions.len()
    }

    /// Translates a local index position to its global profile index.
    #[must_use]
    pub fn global_position(&self, local: usize) -> Option<ProfileIndex> {
        self.positions.get(local).copied()
    }
}

/// Build state of one cluster id within a generation.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterSlot {
    Built(ClusterIndex),
    /// The partition assigned no members to this cluster.
    Empty,
    /// Index construction failed; the cluster is never routed to.
    Failed { reason: String },
}

impl ClusterSlot {
    #[must_use]
    pub fn as_built(&self) -> Option<&ClusterIndex> {
        match self {
            Self::Built(index) => Some(index),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built(_))
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.as_built().map_or(0, ClusterIndex::member_count)
    }

    /// Short lowercase state name used in manifests and tables.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Built(_) => "built",
            Self::Empty => "empty",
            Self::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::VectorDimension;

    #[test]
    fn test_cluster_index_round_trips_positions() {
        let mut index = FlatIpIndex::new(VectorDimension::new(2).unwrap());
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();

        let positions = vec![ProfileIndex::new(7), ProfileIndex::new(2)];
        let cluster = ClusterIndex::new(ClusterId::new(1), index, positions).unwrap();

        assert_eq!(cluster.member_count(), 2);
        assert_eq!(cluster.global_position(0), Some(ProfileIndex::new(7)));
        assert_eq!(cluster.global_position(1), Some(ProfileIndex::new(2)));
        assert_eq!(cluster.global_position(2), None);
    }

    #[test]
    fn test_mismatched_mapping_is_rejected() {
        let mut index = FlatIpIndex::new(VectorDimension::new(2).unwrap());
        index.add(&[1.0, 0.0]).unwrap();

        let result = ClusterIndex::new(ClusterId::new(0), index, vec![]);
        assert!(matches!(result, Err(EngineError::IndexBuild { .. })));
    }

    #[test]
    fn test_slot_accessors() {
        assert!(!ClusterSlot::Empty.is_built());
        assert_eq!(ClusterSlot::Empty.member_count(), 0);
        assert_eq!(
            ClusterSlot::Failed {
                reason: "bad".into()
            }
            .state_name(),
            "failed"
        );
    }
}
