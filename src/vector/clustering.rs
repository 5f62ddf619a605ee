//! K-means clustering for partitioning profile embeddings.
//!
//! This module provides a pure Rust implementation of spherical K-means
//! clustering. It uses cosine similarity as the distance metric and K-means++
//! for centroid initialization, and exposes the silhouette coefficient used
//! to compare partitions with different cluster counts.
//!
//! Centroids live on the unit sphere and points are compared by cosine
//! similarity. Seeding is K-means++ from a seeded `StdRng`, so the same
//! input and seed always give the same partition. A fit keeps the lowest
//! inertia out of `n_init` runs and stops a run once assignments settle or
//! centroids move less than the tolerance.
//!
//! Each run costs `O(n * k * d)` per iteration. Assignment and silhouette
//! evaluation run on the rayon pool.

use crate::vector::types::{ClusterId, VectorError, dot, normalize_in_place, normalized};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

/// Default maximum number of iterations for one K-means run.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default convergence tolerance for centroid updates.
pub const DEFAULT_CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Below this a norm or a distance sum counts as zero.
const EPSILON: f32 = 1e-10;

/// Tunables for a K-means fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansParams {
    /// Upper bound on Lloyd iterations per run.
    pub max_iterations: usize,
    /// Mean cosine movement of centroids below which a run stops.
    pub tolerance: f32,
    /// Number of independently seeded runs; the lowest inertia is kept.
    pub n_init: usize,
    /// Base seed. Run `i` uses `seed + i`.
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_CONVERGENCE_TOLERANCE,
            n_init: 10,
            seed: 42,
        }
    }
}

/// Outcome of the best run of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Unit-length cluster centroids, indexed by `ClusterId`.
    pub centroids: Vec<Vec<f32>>,

    /// Cluster assignment for each input vector, in input order.
    pub assignments: Vec<ClusterId>,

    /// Number of iterations of the winning run.
    pub iterations: usize,

    /// Sum of cosine distances from each vector to its centroid.
    pub inertia: f32,
}

/// Why a K-means fit could not run.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error("No embeddings to cluster")]
    EmptyVectorSet,

    #[error("Cannot form {0} clusters: k must be between 1 and the number of embeddings")]
    InvalidClusterCount(usize),

    #[error("Embeddings passed to K-means have different dimensions")]
    DimensionMismatch,

    #[error("K-means++ seeding produced fewer centroids than requested")]
    InitializationFailed,

    #[error(transparent)]
    VectorError(#[from] VectorError),
}

/// Partitions `vectors` into `k` clusters by spherical K-means.
///
/// Runs `params.n_init` seeded fits and returns the one with the lowest
/// inertia. Vectors need not be normalized, but must share one dimension and
/// hold finite values; `k` must lie in `1..=vectors.len()`. Duplicate points
/// are allowed, and a cluster that ends up without members keeps a centroid
/// re-seeded from a random point.
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans_clustering(
    vectors: &[Vec<f32>],
    k: usize,
    params: &KMeansParams,
) -> Result<KMeansResult, ClusteringError> {
    if vectors.is_empty() {
        return Err(ClusteringError::EmptyVectorSet);
    }

    if k == 0 || k > vectors.len() {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(VectorError::NonFinite.into());
    }

    let norms: Vec<f32> = vectors
        .iter()
        .map(|v| v.iter().map(|x| x * x).sum::<f32>().sqrt())
        .collect();

    let mut best: Option<KMeansResult> = None;
    for run in 0..params.n_init.max(1) {
        let seed = params.seed.wrapping_add(run as u64);
        let result = single_run(vectors, &norms, k, params, seed)?;
        tracing::trace!(k, run, inertia = result.inertia, iterations = result.iterations, "k-means run finished");

        let improves = best
            .as_ref()
            .is_none_or(|current| result.inertia < current.inertia);
        if improves {
            best = Some(result);
        }
    }

    best.ok_or(ClusteringError::InitializationFailed)
}

fn single_run(
    vectors: &[Vec<f32>],
    norms: &[f32],
    k: usize,
    params: &KMeansParams,
    seed: u64,
) -> Result<KMeansResult, ClusteringError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = initialize_centroids_kmeans_plus_plus(vectors, k, &mut rng)?;
    let mut assignments: Vec<ClusterId> = Vec::new();
    let mut iterations = 0;

    loop {
        iterations += 1;

        let new_assignments = assign_all(vectors, &centroids);
        let converged = new_assignments == assignments;
        assignments = new_assignments;

        if converged || iterations >= params.max_iterations {
            break;
        }

        let new_centroids = update_centroids(vectors, &assignments, k, &mut rng);
        let centroid_movement = calculate_centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if centroid_movement < params.tolerance {
            // Labels must describe the centroids that are returned
            assignments = assign_all(vectors, &centroids);
            break;
        }
    }

    if iterations >= params.max_iterations {
        // Results are still returned even if not fully converged
        tracing::warn!(
            k,
            max_iterations = params.max_iterations,
            "K-means did not fully converge"
        );
    }

    let inertia = vectors
        .iter()
        .zip(norms)
        .zip(&assignments)
        .map(|((vector, &norm), cluster)| {
            if norm <= EPSILON {
                1.0
            } else {
                1.0 - dot(vector, &centroids[cluster.as_usize()]) / norm
            }
        })
        .sum();

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
        inertia,
    })
}

fn assign_all(vectors: &[Vec<f32>], centroids: &[Vec<f32>]) -> Vec<ClusterId> {
    let centroid_refs: Vec<&[f32]> = centroids.iter().map(|c| c.as_slice()).collect();
    vectors
        .par_iter()
        .map(|vector| assign_to_nearest_centroid(vector, &centroid_refs))
        .collect()
}

/// Assigns a vector to the nearest centroid based on cosine similarity.
///
/// Centroids are expected to be unit length, so the inner product ranks
/// centroids the same way cosine similarity does. Ties resolve to the
/// lowest cluster id.
pub fn assign_to_nearest_centroid(vector: &[f32], centroids: &[&[f32]]) -> ClusterId {
    let mut best_similarity = f32::NEG_INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = dot(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best_cluster = i;
        }
    }

    ClusterId::new(best_cluster as u32)
}

/// Updates centroids as the normalized mean of their assigned vectors.
///
/// A cluster that lost all of its members is re-seeded from a random vector
/// so the next iteration can still use it.
fn update_centroids(
    vectors: &[Vec<f32>],
    assignments: &[ClusterId],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut new_centroids = vec![vec![0.0; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, cluster_id) in vectors.iter().zip(assignments.iter()) {
        let cluster_idx = cluster_id.as_usize();
        for (acc, &value) in new_centroids[cluster_idx].iter_mut().zip(vector) {
            *acc += value;
        }
        cluster_sizes[cluster_idx] += 1;
    }

    for (centroid, &size) in new_centroids.iter_mut().zip(cluster_sizes.iter()) {
        if size == 0 {
            let random_idx = rng.random_range(0..vectors.len());
            *centroid = normalized(&vectors[random_idx]);
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
            normalize_in_place(centroid);
        }
    }

    new_centroids
}

/// Cosine similarity in `[-1, 1]`; zero when either vector is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let dot_product = dot(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// K-means++ seeding: each next centroid is drawn with probability
/// proportional to its squared cosine distance from the nearest one so far.
fn initialize_centroids_kmeans_plus_plus(
    vectors: &[Vec<f32>],
    k: usize,
    rng: &mut StdRng,
) -> Result<Vec<Vec<f32>>, ClusteringError> {
    let mut centroids = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(normalized(&vectors[first_idx]));

    // Squared cosine distance to the nearest chosen centroid, updated incrementally
    let mut distances: Vec<f32> = vectors
        .iter()
        .map(|v| {
            let d = 1.0 - cosine_similarity(v, &centroids[0]);
            d * d
        })
        .collect();

    for _ in 1..k {
        let total_distance: f32 = distances.iter().sum();

        let next_idx = if total_distance < EPSILON {
            // All points coincide with existing centroids; duplicate centroids
            // are fine, the empty ones get re-seeded during updates
            rng.random_range(0..vectors.len())
        } else {
            let target = rng.random::<f32>() * total_distance;
            let mut cumulative = 0.0;
            let mut chosen = vectors.len() - 1;
            for (i, &distance) in distances.iter().enumerate() {
                cumulative += distance;
                if cumulative >= target {
                    chosen = i;
                    break;
                }
            }
            chosen
        };

        let centroid = normalized(&vectors[next_idx]);
        for (distance, vector) in distances.iter_mut().zip(vectors) {
            let d = 1.0 - cosine_similarity(vector, &centroid);
            *distance = distance.min(d * d);
        }
        centroids.push(centroid);
    }

    if centroids.len() != k {
        return Err(ClusteringError::InitializationFailed);
    }

    Ok(centroids)
}

/// Mean cosine distance each centroid moved in one update.
fn calculate_centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| 1.0 - cosine_similarity(old_c, new_c))
        .sum::<f32>()
        / old.len() as f32
}

/// Mean silhouette coefficient of a labelling, using cosine distance.
///
/// For each point, `a` is the mean distance to the other members of its
/// cluster and `b` the smallest mean distance to any other cluster;
/// `s = (b - a) / max(a, b)`, and points in singleton clusters score 0.
///
/// Returns `None` when fewer than two clusters are populated, where the
/// coefficient is undefined.
#[must_use]
pub fn silhouette_score(vectors: &[Vec<f32>], labels: &[ClusterId], k: usize) -> Option<f32> {
    debug_assert_eq!(vectors.len(), labels.len());

    let mut sizes = vec![0usize; k];
    for label in labels {
        sizes[label.as_usize()] += 1;
    }
    if sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return None;
    }

    let units: Vec<Vec<f32>> = vectors.par_iter().map(|v| normalized(v)).collect();

    let total: f64 = (0..units.len())
        .into_par_iter()
        .map(|i| {
            let own = labels[i].as_usize();
            if sizes[own] <= 1 {
                return 0.0;
            }

            let mut sums = vec![0.0f64; k];
            for (j, other) in units.iter().enumerate() {
                if i != j {
                    sums[labels[j].as_usize()] += f64::from(1.0 - dot(&units[i], other));
                }
            }

            let a = sums[own] / (sizes[own] - 1) as f64;
            let b = sums
                .iter()
                .zip(&sizes)
                .enumerate()
                .filter(|&(c, (_, &size))| c != own && size > 0)
                .map(|(_, (&sum, &size))| sum / size as f64)
                .fold(f64::INFINITY, f64::min);

            let max_ab = a.max(b);
            if max_ab < f64::EPSILON {
                0.0
            } else {
                (b - a) / max_ab
            }
        })
        .sum();

    Some((total / units.len() as f64) as f32)
}
