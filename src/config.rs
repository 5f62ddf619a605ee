//! Configuration module for the clustered search engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `TS_` and use double underscores
//! to separate nested levels:
//! - `TS_SEARCH__OVER_FETCH_FACTOR=5` sets `search.over_fetch_factor`
//! - `TS_CLUSTERING__N_CLUSTERS=12` sets `clustering.n_clusters`
//! - `TS_LOGGING__LEVEL=debug` sets `logging.level`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};

/// Directory holding the settings file, discovered by walking up from the cwd.
pub const CONFIG_DIR: &str = ".talent-search";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory where index generations are saved and loaded
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Partitioning and K selection
    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Query-time behaviour
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClusteringConfig {
    /// Fixed cluster count; automatic selection when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_clusters: Option<usize>,

    /// Smallest K considered by automatic selection
    #[serde(default = "default_min_k")]
    pub min_k: usize,

    /// Largest K considered by automatic selection
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    /// Automatic selection tries K below `sample_size / sample_divisor`
    #[serde(default = "default_sample_divisor")]
    pub sample_divisor: usize,

    /// Corpora larger than this are subsampled for K selection
    #[serde(default = "default_optimization_sample_cap")]
    pub optimization_sample_cap: usize,

    /// Maximum number of points the silhouette coefficient is computed on
    #[serde(default = "default_silhouette_sample_cap")]
    pub silhouette_sample_cap: usize,

    /// Corpora smaller than this are rejected
    #[serde(default = "default_min_corpus_size")]
    pub min_corpus_size: usize,

    /// Independently seeded K-means runs per fit
    #[serde(default = "default_n_init")]
    pub n_init: usize,

    /// Iteration cap per K-means run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Mean centroid movement below which a run has converged
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,

    /// Seed for K-means++ and subsampling
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    /// Results returned when the caller does not specify a count
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Clusters examined per query
    #[serde(default = "default_clusters_to_examine")]
    pub clusters_to_examine: usize,

    /// Each cluster is asked for `requested × over_fetch_factor` candidates
    #[serde(default = "default_over_fetch_factor")]
    pub over_fetch_factor: usize,

    /// Worker threads for per-cluster search and index builds
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// fastembed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Where downloaded models are cached
    #[serde(default = "default_model_cache_dir")]
    pub cache_dir: PathBuf,

    /// In-flight request cap during bulk embedding
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Show a progress bar while the model downloads
    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit ANSI colors on stderr
    #[serde(default = "default_true")]
    pub ansi: bool,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".talent-search/index")
}
fn default_min_k() -> usize {
    5
}
fn default_max_k() -> usize {
    100
}
fn default_sample_divisor() -> usize {
    10
}
fn default_optimization_sample_cap() -> usize {
    100_000
}
fn default_silhouette_sample_cap() -> usize {
    10_000
}
fn default_min_corpus_size() -> usize {
    50
}
fn default_n_init() -> usize {
    10
}
fn default_max_iterations() -> usize {
    crate::vector::DEFAULT_MAX_ITERATIONS
}
fn default_tolerance() -> f32 {
    crate::vector::DEFAULT_CONVERGENCE_TOLERANCE
}
fn default_seed() -> u64 {
    42
}
fn default_limit() -> usize {
    10
}
fn default_clusters_to_examine() -> usize {
    3
}
fn default_over_fetch_factor() -> usize {
    3
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_model_cache_dir() -> PathBuf {
    PathBuf::from(".talent-search/models")
}
fn default_max_concurrent_requests() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            clustering: ClusteringConfig::default(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            n_clusters: None,
            min_k: default_min_k(),
            max_k: default_max_k(),
            sample_divisor: default_sample_divisor(),
            optimization_sample_cap: default_optimization_sample_cap(),
            silhouette_sample_cap: default_silhouette_sample_cap(),
            min_corpus_size: default_min_corpus_size(),
            n_init: default_n_init(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            seed: default_seed(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            clusters_to_examine: default_clusters_to_examine(),
            over_fetch_factor: default_over_fetch_factor(),
            parallel_threads: default_parallel_threads(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            cache_dir: default_model_cache_dir(),
            max_concurrent_requests: default_max_concurrent_requests(),
            show_download_progress: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: true,
        }
    }
}

impl ClusteringConfig {
    /// Rejects settings that would make partitioning meaningless.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |reason: String| Err(EngineError::Config { reason });

        if self.min_k == 0 || self.min_k >= self.max_k {
            return invalid(format!(
                "clustering.min_k ({}) must be at least 1 and below clustering.max_k ({})",
                self.min_k, self.max_k
            ));
        }
        if self.sample_divisor == 0 {
            return invalid("clustering.sample_divisor must be at least 1".to_string());
        }
        if self.n_clusters == Some(0) {
            return invalid("clustering.n_clusters must be at least 1".to_string());
        }
        if self.silhouette_sample_cap < 2 || self.optimization_sample_cap < 2 {
            return invalid("clustering sample caps must be at least 2".to_string());
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return invalid(format!(
                "clustering.tolerance must be a non-negative number, got {}",
                self.tolerance
            ));
        }
        Ok(())
    }
}

impl SearchConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.over_fetch_factor == 0 {
            return Err(EngineError::Config {
                reason: "search.over_fetch_factor must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(config_path).extract().map_err(Box::new)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed("TS_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for the config directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Validates every section.
    pub fn validate(&self) -> EngineResult<()> {
        self.clustering.validate()?;
        self.search.validate()?;
        if self.embedding.max_concurrent_requests == 0 {
            return Err(EngineError::Config {
                reason: "embedding.max_concurrent_requests must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# talent-search configuration

# Version of the configuration schema
version = 1

# Directory where index generations are written by `build` and read by `search`
index_path = ".talent-search/index"

[clustering]
# Fixed number of clusters. Leave unset to pick K by silhouette score.
# n_clusters = 20

# Automatic selection tries K in [min_k, min(max_k, sample / sample_divisor))
min_k = 5
max_k = 100
sample_divisor = 10

# Corpora above this size are subsampled while choosing K
optimization_sample_cap = 100000

# Silhouette is computed on at most this many points
silhouette_sample_cap = 10000

# Building is refused below this many profiles
min_corpus_size = 50

# K-means restarts, iteration cap and seed
n_init = 10
max_iterations = 100
tolerance = 0.0001
seed = 42

[search]
default_limit = 10
clusters_to_examine = 3

# Each examined cluster returns up to limit × over_fetch_factor candidates
# before hard criteria are applied
over_fetch_factor = 3

# Worker threads for per-cluster search (defaults to CPU count)
# parallel_threads = {}

[embedding]
# fastembed model: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small
model = "AllMiniLML6V2"
cache_dir = ".talent-search/models"
max_concurrent_requests = 10
show_download_progress = true

[logging]
# Used when RUST_LOG is not set
level = "warn"
ansi = true
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;

        Ok(config_path)
    }
}
