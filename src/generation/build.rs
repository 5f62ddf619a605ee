//! End-to-end construction of an index generation from a profile corpus.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cluster::{ClusterIndexBuilder, ClusterSummary, KSelection, analyze_clusters, partition};
use crate::config::ClusteringConfig;
use crate::error::{EngineError, EngineResult};
use crate::generation::IndexGeneration;
use crate::profile::ProfileStore;
use crate::vector::{BulkEmbedder, ProfileIndex, VectorDimension};

/// A profile left out of the generation because it has no usable embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingFailure {
    pub index: ProfileIndex,
    pub profile_id: String,
    pub reason: String,
}

/// What happened during a build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub generation: u64,
    pub profiles_total: usize,
    pub profiles_indexed: usize,
    /// Profiles excluded before partitioning.
    pub embedding_failures: Vec<EmbeddingFailure>,
    /// Messages of clusters whose index could not be built.
    pub index_failures: Vec<String>,
    pub k: usize,
    pub empty_clusters: usize,
    pub selection: Option<KSelection>,
    pub summaries: Vec<ClusterSummary>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Embeddings ready for partitioning, aligned with their corpus positions.
struct Gathered {
    positions: Vec<ProfileIndex>,
    embeddings: Vec<Vec<f32>>,
    failures: Vec<EmbeddingFailure>,
}

/// Turns a `ProfileStore` into an `IndexGeneration`.
///
/// Profiles that ship an embedding use it; the rest are embedded from their
/// text through the configured `BulkEmbedder`. Profiles that still end up
/// without a usable vector are excluded and listed in the report.
pub struct GenerationBuilder {
    config: ClusteringConfig,
    embedder: Option<BulkEmbedder>,
    generation_number: u64,
}

impl GenerationBuilder {
    #[must_use]
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            config,
            embedder: None,
            generation_number: 1,
        }
    }

    #[must_use]
    pub fn with_embedder(mut self, embedder: BulkEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn with_generation_number(mut self, number: u64) -> Self {
        self.generation_number = number;
        self
    }

    /// Builds a generation, embedding profiles that lack a vector.
    ///
    /// Partitioning and index construction run on the blocking pool.
    pub async fn build(
        &self,
        store: Arc<ProfileStore>,
    ) -> EngineResult<(IndexGeneration, BuildReport)> {
        let started = Instant::now();
        let gathered = self.gather(&store).await?;

        let config = self.config.clone();
        let number = self.generation_number;
        let expected = self.expected_dimension();
        tokio::task::spawn_blocking(move || {
            assemble(number, &config, store, gathered, expected, started)
        })
            .await
            .map_err(|e| EngineError::Clustering {
                reason: format!("build task failed: {e}"),
            })?
    }

    /// Builds a generation from the embeddings already present on the profiles.
    ///
    /// Profiles without one are excluded and reported.
    pub fn build_from_stored(
        &self,
        store: Arc<ProfileStore>,
    ) -> EngineResult<(IndexGeneration, BuildReport)> {
        let started = Instant::now();
        let mut gathered = Gathered {
            positions: Vec::with_capacity(store.len()),
            embeddings: Vec::with_capacity(store.len()),
            failures: Vec::new(),
        };
        for (index, profile) in store.iter() {
            match &profile.embedding {
                Some(embedding) => {
                    gathered.positions.push(index);
                    gathered.embeddings.push(embedding.clone());
                }
                None => gathered.failures.push(EmbeddingFailure {
                    index,
                    profile_id: profile.profile_id.clone(),
                    reason: "profile has no embedding".to_string(),
                }),
            }
        }
        assemble(
            self.generation_number,
            &self.config,
            store,
            gathered,
            self.expected_dimension(),
            started,
        )
    }

    fn expected_dimension(&self) -> Option<VectorDimension> {
        self.embedder.as_ref().map(BulkEmbedder::dimension)
    }

    async fn gather(&self, store: &ProfileStore) -> EngineResult<Gathered> {
        let mut gathered = Gathered {
            positions: Vec::with_capacity(store.len()),
            embeddings: Vec::with_capacity(store.len()),
            failures: Vec::new(),
        };

        let mut pending: Vec<ProfileIndex> = Vec::new();
        for (index, profile) in store.iter() {
            match &profile.embedding {
                Some(embedding) => {
                    gathered.positions.push(index);
                    gathered.embeddings.push(embedding.clone());
                }
                None => pending.push(index),
            }
        }

        if pending.is_empty() {
            return Ok(gathered);
        }

        let Some(embedder) = &self.embedder else {
            return Err(EngineError::EmbeddingProvider {
                reason: format!(
                    "{} profiles have no embedding and no embedding provider is configured",
                    pending.len()
                ),
            });
        };

        tracing::info!(profiles = pending.len(), "embedding profiles without vectors");
        let texts: Vec<String> = pending
            .iter()
            .filter_map(|&i| store.get(i))
            .map(|p| p.embedding_text())
            .collect();
        let results = embedder.embed_all(texts).await;

        for (index, result) in pending.into_iter().zip(results) {
            match result {
                Ok(embedding) => {
                    gathered.positions.push(index);
                    gathered.embeddings.push(embedding);
                }
                Err(error) => gathered.failures.push(EmbeddingFailure {
                    index,
                    profile_id: profile_id(store, index),
                    reason: error.to_string(),
                }),
            }
        }

        // Freshly embedded profiles were appended; restore corpus order
        let mut order: Vec<usize> = (0..gathered.positions.len()).collect();
        order.sort_by_key(|&i| gathered.positions[i]);
        gathered.positions = order.iter().map(|&i| gathered.positions[i]).collect();
        gathered.embeddings = order
            .iter()
            .map(|&i| std::mem::take(&mut gathered.embeddings[i]))
            .collect();

        Ok(gathered)
    }
}

fn profile_id(store: &ProfileStore, index: ProfileIndex) -> String {
    store
        .get(index)
        .map(|p| p.profile_id.clone())
        .unwrap_or_default()
}

/// Drops vectors that cannot be clustered together with the rest.
///
/// The corpus dimension is `expected` when an embedder fixes it, otherwise
/// the most common vector length (ties go to the length seen first). Vectors
/// of any other length, or with non-finite values, are excluded.
fn screen(
    store: &ProfileStore,
    gathered: &mut Gathered,
    expected: Option<VectorDimension>,
) -> Option<VectorDimension> {
    let dimension = expected.or_else(|| dominant_dimension(&gathered.embeddings))?;

    let mut kept_positions = Vec::with_capacity(gathered.positions.len());
    let mut kept_embeddings = Vec::with_capacity(gathered.embeddings.len());

    for (index, embedding) in gathered
        .positions
        .drain(..)
        .zip(gathered.embeddings.drain(..))
    {
        let reason = if let Err(e) = dimension.validate_vector(&embedding) {
            Some(e.to_string())
        } else if embedding.iter().any(|x| !x.is_finite()) {
            Some("embedding contains non-finite values".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => gathered.failures.push(EmbeddingFailure {
                index,
                profile_id: profile_id(store, index),
                reason,
            }),
            None => {
                kept_positions.push(index);
                kept_embeddings.push(embedding);
            }
        }
    }

    gathered.positions = kept_positions;
    gathered.embeddings = kept_embeddings;
    Some(dimension)
}

fn dominant_dimension(embeddings: &[Vec<f32>]) -> Option<VectorDimension> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for embedding in embeddings.iter().filter(|e| !e.is_empty()) {
        match counts.iter_mut().find(|(len, _)| *len == embedding.len()) {
            Some((_, count)) => *count += 1,
            None => counts.push((embedding.len(), 1)),
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for &(len, count) in &counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((len, count));
        }
    }
    best.and_then(|(len, _)| VectorDimension::new(len).ok())
}

fn assemble(
    number: u64,
    config: &ClusteringConfig,
    store: Arc<ProfileStore>,
    mut gathered: Gathered,
    expected: Option<VectorDimension>,
    started: Instant,
) -> EngineResult<(IndexGeneration, BuildReport)> {
    let dimension = screen(&store, &mut gathered, expected).ok_or(EngineError::DataInsufficient {
        profiles: 0,
        required: config.min_corpus_size,
    })?;

    for failure in &gathered.failures {
        tracing::warn!(
            profile = %failure.profile_id,
            reason = %failure.reason,
            "profile excluded from index"
        );
    }

    let partition = partition(&gathered.embeddings, config)?;

    let outcome = ClusterIndexBuilder::new(dimension).build_with_positions(
        &gathered.positions,
        &gathered.embeddings,
        &partition.labels,
        partition.k,
    );

    let summaries = analyze_clusters(&store, &outcome.slots);
    let empty_clusters = outcome
        .slots
        .iter()
        .filter(|s| matches!(s, crate::cluster::ClusterSlot::Empty))
        .count();
    let index_failures: Vec<String> = outcome.failures.iter().map(ToString::to_string).collect();

    let generation = IndexGeneration::new(
        number,
        dimension,
        partition.centroids,
        outcome.slots,
        Arc::clone(&store),
    )?;

    let report = BuildReport {
        generation: number,
        profiles_total: store.len(),
        profiles_indexed: generation.indexed_profile_count(),
        embedding_failures: gathered.failures,
        index_failures,
        k: partition.k,
        empty_clusters,
        selection: partition.selection,
        summaries,
        elapsed: started.elapsed(),
    };

    tracing::info!(
        generation = number,
        k = report.k,
        indexed = report.profiles_indexed,
        excluded = report.embedding_failures.len(),
        failed_clusters = report.index_failures.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "index generation built"
    );

    Ok((generation, report))
}
