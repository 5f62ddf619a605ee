//! Partitioning a corpus of embeddings into K clusters.
//!
//! K is either fixed by configuration or chosen by fitting every candidate
//! in `[min_k, min(max_k, sample / sample_divisor))` on a (sub)sample of the
//! corpus and keeping the one with the highest mean silhouette coefficient.
//! The final fit always runs on the full corpus.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::Serialize;

use crate::config::ClusteringConfig;
use crate::error::{EngineError, EngineResult};
use crate::vector::{ClusterId, KMeansParams, kmeans_clustering, silhouette_score};

/// Output of a partitioning run.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// One label per input embedding, each in `0..k`.
    pub labels: Vec<ClusterId>,
    /// Unit-length centroid per cluster id.
    pub centroids: Vec<Vec<f32>>,
    pub k: usize,
    /// Iterations of the winning K-means run.
    pub iterations: usize,
    /// Present when K was chosen automatically.
    pub selection: Option<KSelection>,
}

/// Result of automatic K selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KSelection {
    pub k: usize,
    /// Silhouette score per candidate K, in ascending K order.
    pub scores: Vec<(usize, f32)>,
    /// Number of embeddings the candidates were fit on.
    pub sample_size: usize,
}

fn kmeans_params(config: &ClusteringConfig) -> KMeansParams {
    KMeansParams {
        max_iterations: config.max_iterations,
        tolerance: config.tolerance,
        n_init: config.n_init,
        seed: config.seed,
    }
}

/// Partitions `embeddings` into clusters.
///
/// Fails with `DataInsufficient` when the corpus is below
/// `min_corpus_size`, when a fixed K exceeds the corpus, or when automatic
/// selection has no candidate K to try. Nothing is produced on failure.
pub fn partition(embeddings: &[Vec<f32>], config: &ClusteringConfig) -> EngineResult<Partition> {
    config.validate()?;

    let profiles = embeddings.len();
    if profiles < config.min_corpus_size {
        return Err(EngineError::DataInsufficient {
            profiles,
            required: config.min_corpus_size,
        });
    }

    let (k, selection) = match config.n_clusters {
        Some(k) if k > profiles => {
            return Err(EngineError::DataInsufficient {
                profiles,
                required: k,
            });
        }
        Some(k) => (k, None),
        None => {
            let selection = select_k(embeddings, config)?;
            (selection.k, Some(selection))
        }
    };

    tracing::info!(k, profiles, "fitting final partition");
    let result = kmeans_clustering(embeddings, k, &kmeans_params(config))?;

    Ok(Partition {
        labels: result.assignments,
        centroids: result.centroids,
        k,
        iterations: result.iterations,
        selection,
    })
}

/// Chooses K by silhouette score.
///
/// Corpora above `optimization_sample_cap` are subsampled without
/// replacement, and the silhouette of each candidate is measured on the same
/// seeded subset of at most `silhouette_sample_cap` points. The highest score
/// wins; ties go to the smallest K.
pub fn select_k(embeddings: &[Vec<f32>], config: &ClusteringConfig) -> EngineResult<KSelection> {
    let mut rng = StdRng::seed_from_u64(config.seed);

    let sampled: Vec<Vec<f32>>;
    let working: &[Vec<f32>] = if embeddings.len() > config.optimization_sample_cap {
        let mut picked = sample(&mut rng, embeddings.len(), config.optimization_sample_cap).into_vec();
        picked.sort_unstable();
        sampled = picked.into_iter().map(|i| embeddings[i].clone()).collect();
        &sampled
    } else {
        embeddings
    };

    let upper = config.max_k.min(working.len() / config.sample_divisor);
    if config.min_k >= upper {
        return Err(EngineError::DataInsufficient {
            profiles: embeddings.len(),
            required: (config.min_k + 1) * config.sample_divisor,
        });
    }

    let silhouette_subset: Option<Vec<usize>> = (working.len() > config.silhouette_sample_cap)
        .then(|| {
            let mut picked = sample(&mut rng, working.len(), config.silhouette_sample_cap).into_vec();
            picked.sort_unstable();
            picked
        });
    let silhouette_points: Vec<Vec<f32>> = match &silhouette_subset {
        Some(subset) => subset.iter().map(|&i| working[i].clone()).collect(),
        None => Vec::new(),
    };

    let params = kmeans_params(config);
    let mut scores = Vec::with_capacity(upper - config.min_k);
    let mut best: Option<(usize, f32)> = None;

    for k in config.min_k..upper {
        let fit = kmeans_clustering(working, k, &params)?;

        let score = match &silhouette_subset {
            Some(subset) => {
                let labels: Vec<ClusterId> = subset.iter().map(|&i| fit.assignments[i]).collect();
                silhouette_score(&silhouette_points, &labels, k)
            }
            None => silhouette_score(working, &fit.assignments, k),
        }
        // Undefined silhouette (a single populated cluster) ranks last
        .unwrap_or(-1.0);

        tracing::debug!(k, silhouette = score, "evaluated candidate cluster count");
        scores.push((k, score));

        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((k, score));
        }
    }

    let (k, silhouette) = best.ok_or(EngineError::DataInsufficient {
        profiles: embeddings.len(),
        required: (config.min_k + 1) * config.sample_divisor,
    })?;
    tracing::info!(k, silhouette, candidates = scores.len(), "selected cluster count");

    Ok(KSelection {
        k,
        scores,
        sample_size: working.len(),
    })
}
