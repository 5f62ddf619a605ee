//! Clustered similarity search over professional profiles with hard-criteria
//! filtering.
//!
//! Build time partitions profile embeddings with spherical K-means and builds
//! one exact inner-product index per cluster. Query time routes the query to
//! the closest clusters, over-fetches from each, filters by [`HardCriteria`]
//! and merges everything into a single ranking.

pub mod cluster;
pub mod config;
pub mod display;
pub mod error;
pub mod generation;
pub mod logging;
pub mod profile;
pub mod search;
pub mod vector;

// Explicit exports for better API clarity
pub use cluster::{ClusterIndex, ClusterSlot, ClusterSummary};
pub use config::Settings;
pub use error::{EngineError, EngineResult};
pub use generation::{BuildReport, GenerationBuilder, GenerationHandle, IndexGeneration};
pub use profile::{Profile, ProfileStore};
pub use search::{HardCriteria, SearchEngine, SearchResult};
pub use vector::{ClusterId, EmbeddingGenerator, ProfileIndex, Score};
