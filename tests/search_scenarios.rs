//! End-to-end search over a synthetic 200-profile corpus.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use talent_search::cluster::{ClusterIndex, ClusterSlot};
use talent_search::config::SearchConfig;
use talent_search::vector::{EmbeddingGenerator, FlatIpIndex, VectorDimension, normalized};
use talent_search::{
    ClusterId, HardCriteria, IndexGeneration, Profile, ProfileIndex, ProfileStore, SearchEngine,
};

use common::{DIMENSION, build_generation, build_generation_over, clustering_config, generator};

fn engine() -> SearchEngine {
    SearchEngine::new(Arc::new(generator()), SearchConfig::default())
}

fn star_lawyer(index: usize) -> Profile {
    Profile {
        profile_id: "profile-star".to_string(),
        experience_years: Some(6.0),
        skills: vec!["corporate law".to_string(), "litigation".to_string()],
        raw_text: Some("corporate lawyer".to_string()),
        ..common::synthetic_profile(index)
    }
}

#[tokio::test]
async fn test_every_profile_lands_in_exactly_one_cluster() {
    let (generation, report) = build_generation(clustering_config(3)).await;

    assert_eq!(report.profiles_indexed, common::CORPUS_SIZE);
    assert!(report.embedding_failures.is_empty());
    assert_eq!(generation.cluster_count(), 3);

    let mut seen = HashSet::new();
    for cluster in generation.slots().iter().filter_map(ClusterSlot::as_built) {
        assert!(cluster.id().as_usize() < 3);
        for position in cluster.positions() {
            assert!(seen.insert(*position), "{position} indexed twice");
        }
    }
    assert_eq!(seen.len(), common::CORPUS_SIZE);
}

#[tokio::test]
async fn test_local_positions_map_back_to_member_vectors() {
    let (generation, _) = build_generation(clustering_config(3)).await;
    let generator = generator();

    for cluster in generation.slots().iter().filter_map(ClusterSlot::as_built) {
        for (local, global) in cluster.positions().iter().enumerate() {
            let profile = generation.store().get(*global).unwrap();
            let expected = normalized(&generator.embed_one(&profile.embedding_text()).unwrap());
            let stored = cluster.index().row(local).unwrap();
            for (a, b) in stored.iter().zip(&expected) {
                assert!((a - b).abs() < 1e-5);
            }
        }
    }
}

#[tokio::test]
async fn test_corporate_lawyer_with_required_skill_and_experience() {
    let (generation, _) = build_generation(clustering_config(3)).await;
    let criteria = HardCriteria {
        required_skills: Some(vec!["Corporate Lawyer".to_string()]),
        min_experience: Some(2.0),
        ..HardCriteria::default()
    };

    let results = engine()
        .search(&generation, "corporate lawyer", Some(&criteria), 10, 3)
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.len() <= 10);
    for result in &results {
        assert!(result.profile.experience_years.unwrap() >= 2.0);
        assert!(
            result
                .profile
                .skills
                .iter()
                .any(|s| s.to_lowercase().contains("corporate law"))
        );
    }
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_excluded_skill_removes_top_candidate() {
    let mut profiles = common::synthetic_profiles();
    profiles.push(star_lawyer(0));
    let store = Arc::new(ProfileStore::new(profiles).unwrap());
    let (generation, _) = build_generation_over(store, clustering_config(3)).await;
    let engine = engine();

    let unfiltered = engine
        .search(&generation, "corporate lawyer", None, 10, 3)
        .await
        .unwrap();
    assert_eq!(unfiltered[0].profile.profile_id, "profile-star");

    let criteria = HardCriteria {
        excluded_skills: Some(vec!["Litigation".to_string()]),
        ..HardCriteria::default()
    };
    let filtered = engine
        .search(&generation, "corporate lawyer", Some(&criteria), 10, 3)
        .await
        .unwrap();

    assert!(!filtered.is_empty());
    assert!(filtered.iter().all(|r| r.profile.profile_id != "profile-star"));
    assert!(
        filtered
            .iter()
            .all(|r| !r.profile.skills.iter().any(|s| s == "litigation"))
    );
}

#[tokio::test]
async fn test_empty_criteria_rank_like_no_criteria() {
    let (generation, _) = build_generation(clustering_config(3)).await;
    let engine = engine();

    let plain = engine
        .search(&generation, "python data pipelines", None, 15, 2)
        .await
        .unwrap();
    let empty = engine
        .search(&generation, "python data pipelines", Some(&HardCriteria::default()), 15, 2)
        .await
        .unwrap();

    let key = |results: &[talent_search::SearchResult<'_>]| -> Vec<(ProfileIndex, f32)> {
        results.iter().map(|r| (r.index, r.score.get())).collect()
    };
    assert_eq!(key(&plain), key(&empty));
}

#[tokio::test]
async fn test_results_are_unique_sorted_and_bounded() {
    let (generation, _) = build_generation(clustering_config(3)).await;

    for limit in [1, 5, 40] {
        let results = engine()
            .search(&generation, "mechanical design engineer", None, limit, 3)
            .await
            .unwrap();
        assert!(results.len() <= limit);

        let unique: HashSet<ProfileIndex> = results.iter().map(|r| r.index).collect();
        assert_eq!(unique.len(), results.len());
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[test]
fn test_empty_cluster_is_never_routed() {
    let generator = generator();
    let dim = VectorDimension::new(DIMENSION).unwrap();
    let store = Arc::new(ProfileStore::new(common::synthetic_profiles()).unwrap());

    // Cluster 1 holds the software profiles; cluster 0 is empty but its
    // centroid is exactly the query
    let query = generator.embed_one("python data engineering").unwrap();
    let mut index = FlatIpIndex::new(dim);
    let mut positions = Vec::new();
    for (position, profile) in store.iter() {
        if common::group_of(position.as_usize()) == common::Group::Software {
            index
                .add(&generator.embed_one(&profile.embedding_text()).unwrap())
                .unwrap();
            positions.push(position);
        }
    }
    let software = ClusterIndex::new(ClusterId::new(1), index, positions).unwrap();
    let generation = IndexGeneration::new(
        1,
        dim,
        vec![query.clone(), software.index().row(0).unwrap().to_vec()],
        vec![ClusterSlot::Empty, ClusterSlot::Built(software)],
        store,
    )
    .unwrap();

    let results = engine()
        .search_embedding(&generation, &query, None, 5, 1)
        .unwrap();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.cluster_id == ClusterId::new(1)));

    let routed = talent_search::search::route(&query, &generation, 5);
    assert_eq!(routed.len(), 1);
    assert_eq!(routed[0].cluster_id, ClusterId::new(1));
}

#[tokio::test]
async fn test_automatic_k_stays_in_candidate_range() {
    let config = talent_search::config::ClusteringConfig {
        n_clusters: None,
        n_init: 1,
        max_iterations: 20,
        ..talent_search::config::ClusteringConfig::default()
    };
    let (generation, report) = build_generation(config).await;

    let selection = report.selection.expect("K chosen automatically");
    // 200 profiles / 10 = 20, so candidates are 5..20
    assert_eq!(selection.scores.first().map(|(k, _)| *k), Some(5));
    assert_eq!(selection.scores.last().map(|(k, _)| *k), Some(19));
    assert!((5..20).contains(&generation.cluster_count()));
    assert_eq!(report.k, generation.cluster_count());
    assert_eq!(generation.indexed_profile_count(), common::CORPUS_SIZE);
}
