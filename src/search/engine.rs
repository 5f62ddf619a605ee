//! The query operation.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::error::{EngineError, EngineResult};
use crate::generation::IndexGeneration;
use crate::profile::Profile;
use crate::search::criteria::HardCriteria;
use crate::search::filter::filter_candidates;
use crate::search::merger::merge;
use crate::search::retriever::{Candidate, retrieve};
use crate::search::router::route;
use crate::vector::{ClusterId, EmbeddingGenerator, ProfileIndex, Score};

/// One ranked profile in a query result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult<'g> {
    pub profile: &'g Profile,
    pub index: ProfileIndex,
    pub score: Score,
    pub cluster_id: ClusterId,
}

/// Runs queries against an [`IndexGeneration`].
///
/// The engine holds no per-query state, so one instance can serve any number
/// of concurrent queries against any generation.
pub struct SearchEngine {
    embedder: Arc<dyn EmbeddingGenerator>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(embedder: Arc<dyn EmbeddingGenerator>, config: SearchConfig) -> Self {
        Self { embedder, config }
    }

    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Embeds `query` and returns the best `limit` profiles passing `criteria`.
    ///
    /// Only the `clusters` clusters whose centroids are closest to the query
    /// are searched. Absent and empty criteria behave the same. An empty
    /// result is not an error.
    pub async fn search<'g>(
        &self,
        generation: &'g IndexGeneration,
        query: &str,
        criteria: Option<&HardCriteria>,
        limit: usize,
        clusters: usize,
    ) -> EngineResult<Vec<SearchResult<'g>>> {
        self.search_cancellable(generation, query, criteria, limit, clusters, &CancellationToken::new())
            .await
    }

    /// Like [`SearchEngine::search`], abandoning the query once `cancel` fires.
    ///
    /// Cancellation is observed while the query is being embedded and before
    /// each cluster is searched; a cancelled query returns
    /// `EngineError::Cancelled`.
    pub async fn search_cancellable<'g>(
        &self,
        generation: &'g IndexGeneration,
        query: &str,
        criteria: Option<&HardCriteria>,
        limit: usize,
        clusters: usize,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<SearchResult<'g>>> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let embedding = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            joined = tokio::task::spawn_blocking(move || embedder.embed_one(&text)) => joined,
        };
        let embedding = embedding
            .map_err(|e| EngineError::EmbeddingProvider {
                reason: format!("query embedding task failed: {e}"),
            })?
            .map_err(|e| EngineError::EmbeddingProvider {
                reason: e.to_string(),
            })?;

        self.run(generation, &embedding, criteria, limit, clusters, Some(cancel))
    }

    /// Searches with a query that is already embedded.
    pub fn search_embedding<'g>(
        &self,
        generation: &'g IndexGeneration,
        embedding: &[f32],
        criteria: Option<&HardCriteria>,
        limit: usize,
        clusters: usize,
    ) -> EngineResult<Vec<SearchResult<'g>>> {
        self.run(generation, embedding, criteria, limit, clusters, None)
    }

    fn run<'g>(
        &self,
        generation: &'g IndexGeneration,
        embedding: &[f32],
        criteria: Option<&HardCriteria>,
        limit: usize,
        clusters: usize,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Vec<SearchResult<'g>>> {
        let started = Instant::now();
        if embedding.len() != generation.dimension().get() {
            return Err(EngineError::Dimension {
                expected: generation.dimension().get(),
                actual: embedding.len(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let routed = route(embedding, generation, clusters);
        if routed.is_empty() {
            tracing::info!(generation = generation.number(), "no built cluster to search");
            return Ok(Vec::new());
        }

        let criteria = criteria.filter(|c| !c.is_empty());
        let over_fetch = self.config.over_fetch_factor;
        let store = generation.store();
        let is_cancelled = || cancel.is_some_and(CancellationToken::is_cancelled);

        let per_cluster: Vec<Vec<Candidate>> = routed
            .par_iter()
            .map(|routed| {
                if is_cancelled() {
                    return Vec::new();
                }
                let Some(cluster) = generation.slot(routed.cluster_id).and_then(|s| s.as_built())
                else {
                    return Vec::new();
                };
                match retrieve(cluster, embedding, limit, over_fetch) {
                    Ok(candidates) => match criteria {
                        Some(criteria) => filter_candidates(candidates, store, criteria),
                        None => candidates,
                    },
                    Err(error) => {
                        tracing::warn!(cluster = %routed.cluster_id, error = %error, "cluster skipped");
                        Vec::new()
                    }
                }
            })
            .collect();

        if is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let results: Vec<SearchResult<'g>> = merge(per_cluster, limit)
            .into_iter()
            .filter_map(|c| {
                store.get(c.index).map(|profile| SearchResult {
                    profile,
                    index: c.index,
                    score: c.score,
                    cluster_id: c.cluster_id,
                })
            })
            .collect();

        tracing::info!(
            generation = generation.number(),
            clusters = routed.len(),
            filtered = criteria.is_some(),
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );
        Ok(results)
    }
}
