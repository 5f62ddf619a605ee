//! Combining per-cluster candidates into one ranking.

use std::collections::HashMap;

use crate::search::retriever::Candidate;
use crate::vector::ProfileIndex;

/// Merges candidate lists given in router order into the global top `limit`.
///
/// A profile found in several clusters appears once, with its highest score
/// and the cluster that produced it; on equal scores the first occurrence
/// wins. The result is sorted by score descending. Equal scores keep router
/// order, then the order within each cluster.
#[must_use]
pub fn merge(per_cluster: Vec<Vec<Candidate>>, limit: usize) -> Vec<Candidate> {
    let mut merged: Vec<Candidate> = Vec::new();
    let mut slot_of: HashMap<ProfileIndex, usize> = HashMap::new();

    for candidate in per_cluster.into_iter().flatten() {
        match slot_of.get(&candidate.index) {
            Some(&slot) => {
                if candidate.score > merged[slot].score {
                    merged[slot] = candidate;
                }
            }
            None => {
                slot_of.insert(candidate.index, merged.len());
                merged.push(candidate);
            }
        }
    }

    merged.sort_by(|a, b| b.score.cmp(&a.score));
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{ClusterId, Score};

    fn candidate(index: u32, score: f32, cluster: u32) -> Candidate {
        Candidate {
            index: ProfileIndex::new(index),
            score: Score::new(score).unwrap(),
            cluster_id: ClusterId::new(cluster),
        }
    }

    #[test]
    fn test_duplicates_keep_highest_score_and_its_cluster() {
        let merged = merge(
            vec![
                vec![candidate(1, 0.9, 0), candidate(2, 0.5, 0)],
                vec![candidate(2, 0.8, 1), candidate(3, 0.4, 1)],
            ],
            10,
        );

        let expected = vec![candidate(1, 0.9, 0), candidate(2, 0.8, 1), candidate(3, 0.4, 1)];
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_equal_duplicate_keeps_first_seen() {
        let merged = merge(
            vec![vec![candidate(5, 0.7, 2)], vec![candidate(5, 0.7, 0)]],
            10,
        );
        assert_eq!(merged, vec![candidate(5, 0.7, 2)]);
    }

    #[test]
    fn test_ties_keep_router_then_cluster_order() {
        let merged = merge(
            vec![
                vec![candidate(8, 0.6, 3), candidate(4, 0.6, 3)],
                vec![candidate(1, 0.6, 0)],
            ],
            10,
        );
        let order: Vec<u32> = merged.iter().map(|c| c.index.get()).collect();
        assert_eq!(order, vec![8, 4, 1]);
    }

    #[test]
    fn test_truncates_to_limit() {
        let merged = merge(
            vec![vec![candidate(1, 0.1, 0), candidate(2, 0.3, 0), candidate(3, 0.2, 0)]],
            2,
        );
        let order: Vec<u32> = merged.iter().map(|c| c.index.get()).collect();
        assert_eq!(order, vec![2, 3]);
        assert!(merge(Vec::new(), 5).is_empty());
    }
}
