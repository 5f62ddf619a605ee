//! Choosing which clusters a query is searched in.

use crate::generation::IndexGeneration;
use crate::vector::{ClusterId, dot, normalized};

/// A cluster selected for a query, with its centroid similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutedCluster {
    pub cluster_id: ClusterId,
    pub similarity: f32,
}

/// Ranks the built clusters of `generation` by centroid similarity to `query`.
///
/// Returns at most `max_clusters` entries, most similar first; equal
/// similarities keep ascending cluster id. Empty and failed clusters are
/// never returned, so fewer (possibly zero) clusters come back when not
/// enough are built.
#[must_use]
pub fn route(query: &[f32], generation: &IndexGeneration, max_clusters: usize) -> Vec<RoutedCluster> {
    let query = normalized(query);

    let mut ranked: Vec<RoutedCluster> = generation
        .centroids()
        .iter()
        .enumerate()
        .filter(|(i, _)| generation.slots().get(*i).is_some_and(|s| s.is_built()))
        .map(|(i, centroid)| RoutedCluster {
            cluster_id: ClusterId::new(i as u32),
            similarity: dot(&query, centroid),
        })
        .collect();

    // Stable sort keeps ascending id among equal similarities
    ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    ranked.truncate(max_clusters);

    tracing::debug!(
        clusters = ?ranked.iter().map(|r| r.cluster_id.get()).collect::<Vec<_>>(),
        "routed query"
    );
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterIndex, ClusterSlot};
    use crate::profile::{Profile, ProfileStore};
    use crate::vector::{FlatIpIndex, ProfileIndex, VectorDimension};
    use std::sync::Arc;

    fn built(id: u32, position: u32) -> ClusterSlot {
        let mut index = FlatIpIndex::new(VectorDimension::new(2).unwrap());
        index.add(&[1.0, 0.0]).unwrap();
        ClusterSlot::Built(
            ClusterIndex::new(ClusterId::new(id), index, vec![ProfileIndex::new(position)]).unwrap(),
        )
    }

    fn generation(centroids: Vec<Vec<f32>>, slots: Vec<ClusterSlot>) -> IndexGeneration {
        let profiles = (0..4)
            .map(|i| Profile {
                profile_id: format!("p{i}"),
                ..Profile::default()
            })
            .collect();
        let store = Arc::new(ProfileStore::new(profiles).unwrap());
        IndexGeneration::new(1, VectorDimension::new(2).unwrap(), centroids, slots, store).unwrap()
    }

    fn ids(routed: &[RoutedCluster]) -> Vec<u32> {
        routed.iter().map(|r| r.cluster_id.get()).collect()
    }

    #[test]
    fn test_orders_by_similarity_and_truncates() {
        let generation = generation(
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]],
            vec![built(0, 0), built(1, 1), built(2, 2)],
        );

        let routed = route(&[3.0, 0.0], &generation, 2);
        assert_eq!(ids(&routed), vec![1, 2]);
        assert!(routed[0].similarity > routed[1].similarity);

        assert_eq!(ids(&route(&[1.0, 0.0], &generation, 10)), vec![1, 2, 0]);
    }

    #[test]
    fn test_skips_clusters_that_are_not_built() {
        let generation = generation(
            vec![vec![1.0, 0.0], vec![0.9, 0.1], vec![0.0, 1.0]],
            vec![
                ClusterSlot::Empty,
                ClusterSlot::Failed {
                    reason: "corrupt".to_string(),
                },
                built(2, 3),
            ],
        );

        let routed = route(&[1.0, 0.0], &generation, 2);
        assert_eq!(ids(&routed), vec![2]);
    }

    #[test]
    fn test_ties_keep_ascending_cluster_id() {
        let generation = generation(
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]],
            vec![built(0, 0), built(1, 1), built(2, 2)],
        );
        assert_eq!(ids(&route(&[1.0, 0.0], &generation, 2)), vec![1, 2]);
    }

    #[test]
    fn test_no_built_clusters_routes_nowhere() {
        let generation = generation(vec![vec![1.0, 0.0]], vec![ClusterSlot::Empty]);
        assert!(route(&[1.0, 0.0], &generation, 3).is_empty());
    }
}
