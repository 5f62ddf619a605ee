//! Error types for the clustered search engine
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use std::path::PathBuf;

use thiserror::Error;

use crate::vector::{ClusterId, ClusteringError, VectorError};

/// Main error type for building, persisting and querying index generations
#[derive(Error, Debug)]
pub enum EngineError {
    /// The corpus is too small to partition
    #[error("Not enough profiles to build clusters: have {profiles}, need at least {required}")]
    DataInsufficient { profiles: usize, required: usize },

    /// One cluster's index could not be built; other clusters are unaffected
    #[error("Failed to build index for cluster {cluster}: {reason}")]
    IndexBuild { cluster: ClusterId, reason: String },

    /// One cluster could not be searched for a query
    #[error("Failed to search cluster {cluster}: {reason}")]
    Retrieval { cluster: ClusterId, reason: String },

    /// The embedding provider failed or returned unusable output
    #[error("Embedding provider failed: {reason}")]
    EmbeddingProvider { reason: String },

    /// Snapshot errors
    #[error("Failed to load index generation from '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Failed to persist index generation to '{path}': {reason}")]
    Persist { path: PathBuf, reason: String },

    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}. The query and the index must use the same embedding model"
    )]
    Dimension { expected: usize, actual: usize },

    #[error("Clustering failed: {reason}")]
    Clustering { reason: String },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Profile corpus errors
    #[error("Invalid profile corpus: {reason}")]
    Corpus { reason: String },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Vector operation failed: {0}")]
    Vector(VectorError),
}

impl EngineError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::DataInsufficient { .. } => "DATA_INSUFFICIENT",
            Self::IndexBuild { .. } => "INDEX_BUILD_ERROR",
            Self::Retrieval { .. } => "RETRIEVAL_ERROR",
            Self::EmbeddingProvider { .. } => "EMBEDDING_PROVIDER_ERROR",
            Self::Load { .. } => "LOAD_ERROR",
            Self::Persist { .. } => "PERSIST_ERROR",
            Self::Dimension { .. } => "DIMENSION_MISMATCH",
            Self::Clustering { .. } => "CLUSTERING_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Corpus { .. } => "CORPUS_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Vector(_) => "VECTOR_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::DataInsufficient { .. } => vec![
                "Add more profiles to the corpus before building",
                "Pass an explicit --clusters value smaller than the corpus",
            ],
            Self::Load { .. } => vec![
                "Run 'talent-search build' to create a fresh index generation",
                "Check that every cluster_N.index has a matching cluster_N_positions.bin",
            ],
            Self::Persist { .. } => vec![
                "Check disk space and permissions in the index directory",
                "The previous generation on disk was not modified",
            ],
            Self::Dimension { .. } => vec![
                "Rebuild the index after changing the embedding model",
                "Check 'embedding.model' in .talent-search/settings.toml",
            ],
            Self::EmbeddingProvider { .. } => vec![
                "Ensure the embedding model can be downloaded on first use",
                "Try the operation again, provider failures are often transient",
            ],
            Self::Config { .. } => vec![
                "Run 'talent-search config' to inspect the effective settings",
                "Run 'talent-search init --force' to regenerate the settings file",
            ],
            Self::Corpus { .. } => vec![
                "The corpus must be JSON Lines with one profile object per line",
                "Every profile needs a unique profile_id",
            ],
            _ => vec![],
        }
    }
}

impl From<VectorError> for EngineError {
    fn from(error: VectorError) -> Self {
        match error {
            VectorError::DimensionMismatch { expected, actual } => {
                Self::Dimension { expected, actual }
            }
            VectorError::EmbeddingFailed(reason) => Self::EmbeddingProvider { reason },
            other => Self::Vector(other),
        }
    }
}

impl From<ClusteringError> for EngineError {
    fn from(error: ClusteringError) -> Self {
        match error {
            ClusteringError::VectorError(inner) => inner.into(),
            other => Self::Clustering {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Helper trait for attaching a snapshot path to storage errors
pub trait SnapshotContext<T> {
    /// Wrap the error as a load failure for `path`
    fn load_context(self, path: &std::path::Path) -> EngineResult<T>;

    /// Wrap the error as a persist failure for `path`
    fn persist_context(self, path: &std::path::Path) -> EngineResult<T>;
}

impl<T, E> SnapshotContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn load_context(self, path: &std::path::Path) -> EngineResult<T> {
        self.map_err(|e| EngineError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn persist_context(self, path: &std::path::Path) -> EngineResult<T> {
        self.map_err(|e| EngineError::Persist {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        let err = EngineError::DataInsufficient {
            profiles: 10,
            required: 50,
        };
        assert_eq!(err.status_code(), "DATA_INSUFFICIENT");
        assert!(!err.recovery_suggestions().is_empty());
        assert_eq!(EngineError::Cancelled.status_code(), "CANCELLED");
    }

    #[test]
    fn test_vector_errors_map_to_engine_variants() {
        let err: EngineError = VectorError::DimensionMismatch {
            expected: 384,
            actual: 3,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::Dimension {
                expected: 384,
                actual: 3
            }
        ));

        let err: EngineError = VectorError::EmbeddingFailed("offline".into()).into();
        assert!(matches!(err, EngineError::EmbeddingProvider { .. }));
    }

    #[test]
    fn test_snapshot_context_attaches_path() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::other("disk full"));
        let err = result
            .persist_context(std::path::Path::new("/tmp/idx"))
            .unwrap_err();
        assert!(err.to_string().contains("/tmp/idx"));
        assert!(err.to_string().contains("disk full"));
    }
}
