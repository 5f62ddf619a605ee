//! Over-fetching candidates from one cluster.

use std::collections::HashSet;

use crate::cluster::ClusterIndex;
use crate::error::{EngineError, EngineResult};
use crate::vector::{ClusterId, ProfileIndex, Score};

/// A profile found in a cluster, before filtering and merging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub index: ProfileIndex,
    pub score: Score,
    pub cluster_id: ClusterId,
}

/// How many neighbours to ask a cluster for.
///
/// Over-fetching leaves room for candidates removed by the hard-criteria
/// filter. Never more than the cluster holds.
#[must_use]
pub fn fetch_count(requested: usize, over_fetch_factor: usize, member_count: usize) -> usize {
    requested.saturating_mul(over_fetch_factor).min(member_count)
}

/// Searches `cluster` and maps local hits to global profile positions.
///
/// Hits are returned in index order (score descending, then local position).
/// Local positions with no mapping entry are dropped; if a global position
/// occurs twice only its best-scored occurrence is kept.
pub fn retrieve(
    cluster: &ClusterIndex,
    query: &[f32],
    requested: usize,
    over_fetch_factor: usize,
) -> EngineResult<Vec<Candidate>> {
    let fetch = fetch_count(requested, over_fetch_factor, cluster.member_count());
    let hits = cluster
        .index()
        .search(query, fetch)
        .map_err(|e| EngineError::Retrieval {
            cluster: cluster.id(),
            reason: e.to_string(),
        })?;

    let mut seen = HashSet::with_capacity(hits.len());
    let mut candidates = Vec::with_capacity(hits.len());
    for (local, score) in hits {
        let Some(index) = cluster.global_position(local) else {
            tracing::debug!(cluster = %cluster.id(), local, "hit has no position mapping, dropped");
            continue;
        };
        if seen.insert(index) {
            candidates.push(Candidate {
                index,
                score,
                cluster_id: cluster.id(),
            });
        }
    }

    tracing::debug!(
        cluster = %cluster.id(),
        fetch,
        candidates = candidates.len(),
        "retrieved cluster candidates"
    );
    Ok(candidates)
}
