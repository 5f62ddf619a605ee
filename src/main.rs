//! CLI entry point for the profile search engine.
//!
//! Commands: `init` writes a settings file, `build` clusters a corpus and
//! saves the index generation, `search` queries a saved generation,
//! `analyze` summarizes its clusters and `config` prints the active settings.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde::Serialize;

use talent_search::cluster::analyze_clusters;
use talent_search::display::{
    THEME, create_build_table, create_cluster_table, create_progress_bar, create_results_table,
    create_spinner,
};
use talent_search::generation::saved_generation_number;
use talent_search::logging::init_tracing;
use talent_search::vector::{
    BulkEmbedder, EmbeddingGenerator, FastEmbedGenerator, MockEmbeddingGenerator,
    VECTOR_DIMENSION_384, VectorDimension,
};
use talent_search::{
    EngineError, GenerationBuilder, HardCriteria, IndexGeneration, ProfileStore, SearchEngine,
    Settings,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser)]
#[command(
    name = "talent-search",
    version,
    about = "Clustered semantic search over professional profiles",
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ talent-search init\n  $ talent-search build profiles.jsonl\n  $ talent-search search profiles.jsonl \"corporate lawyer in London\" --criteria criteria.json"
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the deterministic offline embedder instead of a downloaded model
    #[arg(long, global = true, env = "TS_MOCK_EMBEDDINGS")]
    mock_embeddings: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .talent-search/settings.toml with default settings
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Cluster a profile corpus and save the index generation
    Build {
        /// JSON Lines file with one profile per line
        profiles: PathBuf,

        /// Fixed number of clusters (overrides config; default picks K automatically)
        #[arg(short = 'k', long)]
        clusters: Option<usize>,

        /// Where to save the generation (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Worker threads (overrides config)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Show embedding progress
        #[arg(short, long)]
        progress: bool,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search a saved generation
    #[command(
        after_help = "Examples:\n  talent-search search profiles.jsonl \"tax attorney\"\n  talent-search search profiles.jsonl \"rust engineer\" --limit 20 --clusters 5\n  talent-search search profiles.jsonl \"nurse\" --criteria criteria.json --json"
    )]
    Search {
        /// The corpus the generation was built from
        profiles: PathBuf,

        /// Free-text query
        query: String,

        /// JSON file with hard criteria
        #[arg(long)]
        criteria: Option<PathBuf>,

        /// Number of results (overrides config)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Clusters to examine (overrides config)
        #[arg(long)]
        clusters: Option<usize>,

        /// Generation directory (overrides config)
        #[arg(short, long)]
        index: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize the clusters of a saved generation
    Analyze {
        /// The corpus the generation was built from
        profiles: PathBuf,

        /// Generation directory (overrides config)
        #[arg(short, long)]
        index: Option<PathBuf>,

        /// Print summaries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the active settings
    Config,
}

#[derive(Serialize)]
struct JsonResult<'a> {
    rank: usize,
    score: f32,
    cluster_id: u32,
    profile: &'a talent_search::Profile,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("Configuration error: {e:#}")));
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&settings.logging);

    match run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("{e:#}")));
            if let Some(engine_error) = e.downcast_ref::<EngineError>() {
                for suggestion in engine_error.recovery_suggestions() {
                    eprintln!("  {}", THEME.apply(&THEME.dim, suggestion));
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("cannot load {}", path.display()))?,
        None => Settings::load().map_err(|e| anyhow::anyhow!("{e}"))?,
    };
    settings.validate()?;
    Ok(settings)
}

async fn run(cli: Cli, mut settings: Settings) -> Result<()> {
    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!(
                "{}",
                THEME.success_with_icon(&format!("Created configuration file at {}", path.display()))
            );
        }

        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
        }

        Commands::Build {
            profiles,
            clusters,
            output,
            threads,
            progress,
            json,
        } => {
            if clusters.is_some() {
                settings.clustering.n_clusters = clusters;
            }
            if let Some(threads) = threads {
                settings.search.parallel_threads = threads;
            }
            settings.validate()?;
            configure_thread_pool(settings.search.parallel_threads);

            let output = output.unwrap_or_else(|| settings.index_path.clone());
            let store = Arc::new(ProfileStore::load_jsonl(&profiles)?);
            let number = saved_generation_number(&output)?.map_or(1, |n| n + 1);

            let mut builder =
                GenerationBuilder::new(settings.clustering.clone()).with_generation_number(number);
            let pending = store.profiles().iter().filter(|p| p.embedding.is_none()).count();
            if pending > 0 {
                let mut bulk = BulkEmbedder::new(
                    embedder(&settings, cli.mock_embeddings)?,
                    settings.embedding.max_concurrent_requests,
                );
                if progress {
                    bulk = bulk.with_progress(create_progress_bar(pending as u64, "embedding profiles"));
                }
                builder = builder.with_embedder(bulk);
            }

            let spinner = (progress && !json).then(|| create_spinner("clustering profiles"));
            let built = builder.build(Arc::clone(&store)).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }
            let (generation, report) = built?;
            generation.save(&output)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", create_build_table(&report));
                println!("{}", create_cluster_table(&report.summaries));
                for failure in &report.embedding_failures {
                    eprintln!(
                        "{}",
                        THEME.warning_with_icon(&format!(
                            "excluded {}: {}",
                            failure.profile_id, failure.reason
                        ))
                    );
                }
                println!(
                    "{}",
                    THEME.success_with_icon(&format!("Saved generation {number} to {}", output.display()))
                );
            }
        }

        Commands::Search {
            profiles,
            query,
            criteria,
            limit,
            clusters,
            index,
            json,
        } => {
            configure_thread_pool(settings.search.parallel_threads);
            let criteria = criteria.map(HardCriteria::from_json_file).transpose()?;
            let generation = load_generation(&settings, &profiles, index)?;

            let embedder = embedder(&settings, cli.mock_embeddings)?;
            if embedder.dimension() != generation.dimension() {
                return Err(EngineError::Dimension {
                    expected: generation.dimension().get(),
                    actual: embedder.dimension().get(),
                }
                .into());
            }

            let limit = limit.unwrap_or(settings.search.default_limit);
            let clusters = clusters.unwrap_or(settings.search.clusters_to_examine);
            let engine = SearchEngine::new(embedder, settings.search.clone());
            let results = engine
                .search(&generation, &query, criteria.as_ref(), limit, clusters)
                .await?;

            if json {
                let rows: Vec<JsonResult<'_>> = results
                    .iter()
                    .enumerate()
                    .map(|(i, r)| JsonResult {
                        rank: i + 1,
                        score: r.score.get(),
                        cluster_id: r.cluster_id.get(),
                        profile: r.profile,
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if results.is_empty() {
                println!("{}", THEME.warning_with_icon("No profiles matched"));
            } else {
                println!("{}", create_results_table(&results));
            }
        }

        Commands::Analyze {
            profiles,
            index,
            json,
        } => {
            let generation = load_generation(&settings, &profiles, index)?;
            let summaries = analyze_clusters(generation.store(), generation.slots());
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                println!(
                    "{}",
                    THEME.apply(
                        &THEME.header,
                        format!(
                            "Generation {}: {} clusters, {} built, {} profiles indexed",
                            generation.number(),
                            generation.cluster_count(),
                            generation.built_cluster_count(),
                            generation.indexed_profile_count()
                        )
                    )
                );
                println!("{}", create_cluster_table(&summaries));
            }
        }
    }

    Ok(())
}

fn load_generation(
    settings: &Settings,
    profiles: &Path,
    index: Option<PathBuf>,
) -> Result<IndexGeneration> {
    let dir = index.unwrap_or_else(|| settings.index_path.clone());
    let store = Arc::new(ProfileStore::load_jsonl(profiles)?);
    Ok(IndexGeneration::load(&dir, store)?)
}

fn embedder(settings: &Settings, mock: bool) -> Result<Arc<dyn EmbeddingGenerator>> {
    if mock {
        let dimension = VectorDimension::new(VECTOR_DIMENSION_384)?;
        return Ok(Arc::new(MockEmbeddingGenerator::with_dimension(dimension)));
    }
    let generator = FastEmbedGenerator::new(
        &settings.embedding.model,
        &settings.embedding.cache_dir,
        settings.embedding.show_download_progress,
    )?;
    Ok(Arc::new(generator))
}

fn configure_thread_pool(threads: usize) {
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        tracing::debug!(error = %e, "rayon pool already configured");
    }
}
