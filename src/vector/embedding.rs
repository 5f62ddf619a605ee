//! Embedding generation for profile texts and queries.
//!
//! This module provides the provider seam (`EmbeddingGenerator`), a local
//! fastembed-backed implementation, a deterministic generator for tests and
//! offline runs, and `BulkEmbedder`, which embeds a whole corpus with a cap
//! on in-flight requests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use indicatif::ProgressBar;
use tokio::sync::Semaphore;

use crate::error::{EngineError, EngineResult};
use crate::vector::types::{VectorDimension, VectorError, normalize_in_place};

/// Trait for generating embeddings from text.
///
/// Implementations of this trait should be thread-safe and
/// capable of handling batch processing efficiently.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    ///
    /// # Arguments
    /// * `texts` - Slice of text strings to generate embeddings for
    ///
    /// # Returns
    /// A vector of embeddings, one for each input text, or an error
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Embeds a single text, validating the returned dimension.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let embedding = self
            .generate_embeddings(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| VectorError::EmbeddingFailed("provider returned no embedding".into()))?;
        self.dimension().validate_vector(&embedding)?;
        Ok(embedding)
    }
}

/// Resolves a configured model name to a fastembed model and its dimension.
///
/// Only models that produce dense sentence embeddings are accepted.
pub fn parse_embedding_model(name: &str) -> Result<(EmbeddingModel, VectorDimension), VectorError> {
    let (model, dim) = match name {
        "AllMiniLML6V2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "AllMiniLML12V2" => (EmbeddingModel::AllMiniLML12V2, 384),
        "BGESmallENV15" => (EmbeddingModel::BGESmallENV15, 384),
        "BGEBaseENV15" => (EmbeddingModel::BGEBaseENV15, 768),
        "MultilingualE5Small" => (EmbeddingModel::MultilingualE5Small, 384),
        other => {
            return Err(VectorError::EmbeddingFailed(format!(
                "Unknown embedding model '{other}'. Supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small"
            )));
        }
    };
    Ok((model, VectorDimension::new(dim)?))
}

/// Local embedding provider backed by fastembed.
///
/// The model is downloaded into `cache_dir` on first use. The default model
/// (AllMiniLML6V2) produces 384-dimensional embeddings.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedGenerator {
    /// Create a generator for the named model.
    ///
    /// # Errors
    /// Returns an error if the model name is unknown or the model fails to
    /// initialize or download.
    pub fn new(
        model_name: &str,
        cache_dir: &Path,
        show_download_progress: bool,
    ) -> Result<Self, VectorError> {
        let (model, dimension) = parse_embedding_model(model_name)?;

        let model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        Ok(Self {
            model: Mutex::new(model),
            dimension,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // fastembed expects owned strings
        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Deterministic embedding generator for tests and offline runs.
///
/// Each lowercase alphanumeric token is hashed into one coordinate, so texts
/// that share vocabulary point in similar directions. Output is unit length.
#[derive(Debug, Clone)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
    fail_marker: Option<String>,
}

impl Default for MockEmbeddingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbeddingGenerator {
    /// Create a new mock generator with standard 384 dimensions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: VectorDimension::dimension_384(),
            fail_marker: None,
        }
    }

    /// Create a generator with custom dimension for testing.
    #[must_use]
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            fail_marker: None,
        }
    }

    /// Makes every request containing `marker` fail, to exercise error paths.
    #[must_use]
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut embedding = vec![0.0; dim];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let slot = (fnv1a(&token.to_lowercase()) % dim as u64) as usize;
            embedding[slot] += 1.0;
        }

        if embedding.iter().all(|&x| x == 0.0) {
            embedding.fill(1.0);
        }

        normalize_in_place(&mut embedding);
        embedding
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(VectorError::EmbeddingFailed(format!(
                    "mock provider rejected text containing '{marker}'"
                )));
            }
        }

        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Embeds many texts with a bounded number of concurrent provider requests.
///
/// Each text is sent as its own request on the blocking pool. A failure is
/// reported for that text only; the rest of the batch continues.
pub struct BulkEmbedder {
    generator: Arc<dyn EmbeddingGenerator>,
    permits: Arc<Semaphore>,
    progress: Option<ProgressBar>,
}

impl BulkEmbedder {
    /// Creates an embedder allowing at most `max_concurrent_requests` in flight.
    ///
    /// A limit of zero is treated as one.
    pub fn new(generator: Arc<dyn EmbeddingGenerator>, max_concurrent_requests: usize) -> Self {
        Self {
            generator,
            permits: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            progress: None,
        }
    }

    /// Advances `bar` by one for every finished text.
    #[must_use]
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.generator.dimension()
    }

    /// Embeds every text and returns one result per input, in input order.
    pub async fn embed_all(&self, texts: Vec<String>) -> Vec<EngineResult<Vec<f32>>> {
        let total = texts.len();
        let mut handles = Vec::with_capacity(total);

        for text in texts {
            let generator = Arc::clone(&self.generator);
            let permits = Arc::clone(&self.permits);
            let progress = self.progress.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| {
                    EngineError::EmbeddingProvider {
                        reason: format!("request limiter closed: {e}"),
                    }
                })?;

                let result = tokio::task::spawn_blocking(move || generator.embed_one(&text))
                    .await
                    .map_err(|e| EngineError::EmbeddingProvider {
                        reason: format!("embedding task failed: {e}"),
                    })?
                    .map_err(|e| EngineError::EmbeddingProvider {
                        reason: e.to_string(),
                    });

                if let Some(bar) = progress {
                    bar.inc(1);
                }
                result
            }));
        }

        let mut results = Vec::with_capacity(total);
        for handle in handles {
            let result = handle.await.unwrap_or_else(|e| {
                Err(EngineError::EmbeddingProvider {
                    reason: format!("embedding task failed: {e}"),
                })
            });
            if let Err(e) = &result {
                tracing::warn!(error = %e, "embedding request failed");
            }
            results.push(result);
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }

        tracing::debug!(
            total,
            failed = results.iter().filter(|r| r.is_err()).count(),
            "bulk embedding finished"
        );
        results
    }
}
