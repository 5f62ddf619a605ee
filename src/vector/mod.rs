//! Vector primitives for clustered profile search.
//!
//! This module provides the building blocks the rest of the engine composes:
//! typed identifiers and scores, spherical K-means, an exact inner-product
//! index, the on-disk format of a cluster, and embedding providers.
//!
//! # Architecture
//! The engine uses IVF-style partitioning: embeddings are grouped by K-means
//! into clusters, every cluster gets its own flat inner-product index, and a
//! query is only scored against the members of the clusters whose centroids
//! it is closest to.

mod clustering;
mod embedding;
mod index;
mod storage;
mod types;

// Re-export core types for public API
pub use clustering::{
    ClusteringError, DEFAULT_CONVERGENCE_TOLERANCE, DEFAULT_MAX_ITERATIONS, KMeansParams,
    KMeansResult, assign_to_nearest_centroid, cosine_similarity, kmeans_clustering,
    silhouette_score,
};
pub use embedding::{
    BulkEmbedder, EmbeddingGenerator, FastEmbedGenerator, MockEmbeddingGenerator,
    parse_embedding_model,
};
pub use index::FlatIpIndex;
pub use storage::{
    MmapIndexBlob, VectorStorageError, index_blob_path, position_mapping_path,
    read_position_mapping, write_index_blob, write_position_mapping,
};
pub use types::{
    ClusterId, ProfileIndex, Score, VECTOR_DIMENSION_384, VectorDimension, VectorError, dot,
    normalize_in_place, normalized,
};
