use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use papergraph_core::storage::list_records;
use papergraph_core::{AppConfig, CoreError, ExitCode, PaperRecord, validate_threshold};
use papergraph_science::graph::GraphStats;
use papergraph_science::{
    CorpusHarvester, MemoryStore, OpenAlexSource, PaperStore, RunReport, ScienceError,
    SimilarityGraphBuilder, StrapiStore, SyncCoordinator, SyncReport, create_embedder,
    harvest_to_cache, link_and_export, run_pipeline,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "papergraph",
    about = "Harvest an author's open-access papers and link them by semantic similarity",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting PAPERGRAPH_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Find an author, harvest their works and cache one JSON file per paper.
    Harvest {
        name: String,
        #[arg(long)]
        institution: Option<String>,
    },

    /// Build the similarity graph from cached records and write the link export.
    Link {
        /// Cache directory (defaults to every results_* directory under the output dir).
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        threshold: Option<f64>,
        /// Export path (defaults to cache.links_file).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Upsert cached papers and their similarity links into the store.
    Sync {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        threshold: Option<f64>,
        /// Use an in-memory store instead of the remote one.
        #[arg(long)]
        dry_run: bool,
    },

    /// Full pipeline: harvest → cache → link → sync.
    Run {
        name: String,
        #[arg(long)]
        institution: Option<String>,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

// ─── Config Actions ──────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration.
    List,
    /// Get a specific config key.
    Get { key: String },
    /// Print the config file path.
    Path,
    /// Write the default config file if none exists.
    Init,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let start = Instant::now();
    let cli = Cli::parse();
    let json_output = cli.json || std::env::var("PAPERGRAPH_JSON").as_deref() == Ok("1");

    init_logging();

    if let Err(err) = run(cli.command, json_output, start).await {
        let code = exit_code_for(&err);
        let dur = start.elapsed().as_millis();
        if json_output {
            let envelope = json!({
                "status": "error",
                "error": error_kind(code),
                "message": format!("{err:#}"),
                "meta": { "duration_ms": dur }
            });
            println!("{envelope}");
        } else {
            eprintln!("Error: {err:#}");
        }
        std::process::exit(code as i32);
    }
}

async fn run(command: Commands, json_output: bool, start: Instant) -> Result<()> {
    let mut config = AppConfig::load().context("loading configuration")?;
    tracing::debug!(path = %AppConfig::config_path().display(), "configuration loaded");

    match command {
        // ── Harvest ────────────────────────────────────────────────────────

        Commands::Harvest { name, institution } => {
            let catalog = Arc::new(OpenAlexSource::from_config(&config.catalog)?);
            let harvester = CorpusHarvester::from_config(catalog, &config.catalog);

            let Some(outcome) =
                harvest_to_cache(&harvester, &config, &name, institution.as_deref()).await?
            else {
                author_not_found(&name, json_output, start);
            };
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({
                    "status": "ok",
                    "data": {
                        "author": outcome.author,
                        "harvest": outcome.stats,
                        "cache_dir": outcome.cache_dir,
                        "cache_files": outcome.files_written,
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("Author: {} ({})", outcome.author.display_name, outcome.author.id);
                println!(
                    "Harvested {} works in {} pages",
                    outcome.stats.records, outcome.stats.pages
                );
                println!(
                    "Cached {} records in {}",
                    outcome.files_written,
                    outcome.cache_dir.display()
                );
            }
        }

        // ── Link ───────────────────────────────────────────────────────────

        Commands::Link { dir, threshold, out } => {
            apply_threshold(&mut config, threshold)?;
            let records = load_corpus(&config, dir.as_deref())?;
            let builder = graph_builder(&config).await?;
            let out = out.unwrap_or_else(|| config.links_path());

            let graph = link_and_export(&builder, &records, Some(&out)).await?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({
                    "status": "ok",
                    "data": { "graph": graph.stats, "links_file": out },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                print_graph_stats(&graph.stats);
                println!("Wrote {} links to {}", graph.edges.len(), out.display());
            }
        }

        // ── Sync ───────────────────────────────────────────────────────────

        Commands::Sync {
            dir,
            threshold,
            dry_run,
        } => {
            apply_threshold(&mut config, threshold)?;
            let records = load_corpus(&config, dir.as_deref())?;
            let builder = graph_builder(&config).await?;
            let graph = builder.build(&records).await?;

            let mut coordinator = coordinator(&config, dry_run)?;
            let report = coordinator.sync(&records, &graph.edges).await;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({
                    "status": "ok",
                    "data": { "graph": graph.stats, "sync": report, "dry_run": dry_run },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                print_graph_stats(&graph.stats);
                print_sync_report(&report, dry_run);
            }
        }

        // ── Run ────────────────────────────────────────────────────────────

        Commands::Run {
            name,
            institution,
            threshold,
            dry_run,
        } => {
            apply_threshold(&mut config, threshold)?;
            let catalog = Arc::new(OpenAlexSource::from_config(&config.catalog)?);
            let harvester = CorpusHarvester::from_config(catalog, &config.catalog);
            let builder = graph_builder(&config).await?;
            let mut coordinator = coordinator(&config, dry_run)?;

            let report = run_pipeline(
                &config,
                &harvester,
                &builder,
                &mut coordinator,
                &name,
                institution.as_deref(),
            )
            .await?;
            if report.author.is_none() {
                author_not_found(&name, json_output, start);
            }
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({
                    "status": "ok",
                    "data": report,
                    "meta": { "duration_ms": dur, "dry_run": dry_run }
                }))?;
            } else {
                print_run_report(&report, dry_run);
            }
        }

        // ── Config ─────────────────────────────────────────────────────────

        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::List => {
                    if json_output {
                        print_json(&json!({"status":"ok","data":config,"meta":{"duration_ms":dur}}))?;
                    } else {
                        for (k, v) in config_key_values(&config) {
                            println!("{k} = {v}");
                        }
                    }
                }
                ConfigAction::Get { key } => {
                    let kv = config_key_values(&config);
                    match kv.iter().find(|(k, _)| *k == key) {
                        Some((_, val)) => {
                            if json_output {
                                print_json(&json!({"status":"ok","data":{"key":key,"value":val},"meta":{"duration_ms":dur}}))?;
                            } else {
                                println!("{val}");
                            }
                        }
                        None => {
                            eprintln!("Unknown config key: {key}");
                            std::process::exit(ExitCode::InvalidArgs as i32);
                        }
                    }
                }
                ConfigAction::Path => {
                    let path = AppConfig::config_path();
                    if json_output {
                        print_json(&json!({"status":"ok","data":{"path":path,"exists":path.exists()},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("{}", path.display());
                    }
                }
                ConfigAction::Init => {
                    let path = AppConfig::config_path();
                    let created = !path.exists();
                    if created {
                        AppConfig::default().save_to(&path)?;
                    }
                    if json_output {
                        print_json(&json!({"status":"ok","data":{"path":path,"created":created},"meta":{"duration_ms":dur}}))?;
                    } else if created {
                        println!("Wrote default config to {}", path.display());
                    } else {
                        println!("Config already exists: {}", path.display());
                    }
                }
            }
        }
    }

    Ok(())
}

// ─── Stage Setup ────────────────────────────────────────────────────────────

fn apply_threshold(config: &mut AppConfig, threshold: Option<f64>) -> Result<()> {
    if let Some(t) = threshold {
        validate_threshold(t)?;
        config.linking.threshold = t;
    }
    Ok(())
}

async fn graph_builder(config: &AppConfig) -> Result<SimilarityGraphBuilder> {
    let embedder = create_embedder(&config.embedding).await?;
    Ok(SimilarityGraphBuilder::from_config(embedder, config)?)
}

fn coordinator(config: &AppConfig, dry_run: bool) -> Result<SyncCoordinator> {
    let store: Arc<dyn PaperStore> = if dry_run {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(StrapiStore::from_config(
            &config.store,
            &config.catalog.user_agent(),
        )?)
    };
    Ok(SyncCoordinator::new(store).with_concurrency(config.store.concurrency))
}

/// Records from one cache directory, or from every `results_*` directory
/// under the output dir, in file-name order.
fn load_corpus(config: &AppConfig, dir: Option<&Path>) -> Result<Vec<PaperRecord>> {
    if let Some(dir) = dir {
        if !dir.is_dir() {
            return Err(CoreError::DirectoryNotFound(dir.display().to_string()).into());
        }
        return Ok(list_records(dir)?);
    }

    let root = config.output_dir();
    if !root.is_dir() {
        return Err(CoreError::DirectoryNotFound(root.display().to_string()).into());
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(&root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("results_"))
        })
        .collect();
    dirs.sort();

    let mut records = Vec::new();
    for dir in &dirs {
        records.extend(list_records(dir)?);
    }
    Ok(records)
}

// ─── Output ─────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn print_graph_stats(stats: &GraphStats) {
    println!(
        "Graph: {} papers, {} with abstracts, {} pairs scored, {} edges",
        stats.corpus, stats.eligible, stats.pairs_scored, stats.edges
    );
}

fn print_sync_report(report: &SyncReport, dry_run: bool) {
    if dry_run {
        println!("Sync (dry run, in-memory store):");
    } else {
        println!("Sync:");
    }
    println!(
        "  Papers: {} attempted, {} created, {} existing, {} failed",
        report.papers_attempted, report.papers_created, report.papers_existing, report.papers_failed
    );
    println!(
        "  Links:  {} attempted, {} created, {} existing, {} unresolved, {} failed, {} duplicate, {} self",
        report.links_attempted,
        report.links_created,
        report.links_existing,
        report.links_unresolved,
        report.links_failed,
        report.links_duplicate,
        report.links_self
    );
    for error in &report.errors {
        println!("  ! {error}");
    }
}

fn print_run_report(report: &RunReport, dry_run: bool) {
    if let Some(author) = &report.author {
        println!("Author: {} ({})", author.display_name, author.id);
    }
    if let Some(harvest) = &report.harvest {
        println!("Harvest: {} works in {} pages", harvest.records, harvest.pages);
    }
    if let Some(dir) = &report.cache_dir {
        println!("Cache: {} files in {}", report.cache_files, dir.display());
    }
    if let Some(graph) = &report.graph {
        print_graph_stats(graph);
    }
    if let Some(path) = &report.links_file {
        println!("Links export: {}", path.display());
    }
    if let Some(sync) = &report.sync {
        print_sync_report(sync, dry_run);
    }
}

fn author_not_found(name: &str, json_output: bool, start: Instant) -> ! {
    let dur = start.elapsed().as_millis();
    if json_output {
        let envelope = json!({
            "status": "error",
            "error": "not_found",
            "message": format!("No author found for {name}"),
            "meta": { "duration_ms": dur }
        });
        println!("{envelope}");
    } else {
        eprintln!("No author found for: {name}");
    }
    std::process::exit(ExitCode::NotFound as i32);
}

fn config_key_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    vec![
        ("config_path", AppConfig::config_path().display().to_string()),
        ("catalog.base_url", config.catalog.base_url.clone()),
        ("catalog.page_size", config.catalog.page_size.to_string()),
        ("catalog.politeness_delay_ms", config.catalog.politeness_delay_ms.to_string()),
        ("embedding.backend", config.embedding.backend.clone()),
        ("embedding.batch_size", config.embedding.batch_size.to_string()),
        ("linking.threshold", config.linking.threshold.to_string()),
        ("store.base_url", config.store.base_url.clone()),
        ("store.concurrency", config.store.concurrency.to_string()),
        ("cache.output_dir", config.output_dir().display().to_string()),
        ("cache.links_file", config.links_path().display().to_string()),
    ]
}

// ─── Logging & Exit Codes ───────────────────────────────────────────────────

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(e) = err.downcast_ref::<ScienceError>() {
        return match e {
            ScienceError::Core(core) => core_exit_code(core),
            ScienceError::EmbeddingUnavailable(_) => ExitCode::EmbeddingError,
            ScienceError::InvalidThreshold(_) | ScienceError::Config(_) => ExitCode::InvalidArgs,
            e if e.is_network() => ExitCode::NetworkError,
            _ => ExitCode::GeneralError,
        };
    }
    if let Some(e) = err.downcast_ref::<CoreError>() {
        return core_exit_code(e);
    }
    ExitCode::GeneralError
}

fn core_exit_code(err: &CoreError) -> ExitCode {
    match err {
        CoreError::DirectoryNotFound(_) => ExitCode::NotFound,
        CoreError::ValidationError(_) | CoreError::ConfigError(_) | CoreError::TomlParse(_) => {
            ExitCode::InvalidArgs
        }
        CoreError::Io(_) => ExitCode::FileSystemError,
        _ => ExitCode::GeneralError,
    }
}

fn error_kind(code: ExitCode) -> &'static str {
    match code {
        ExitCode::Success => "ok",
        ExitCode::GeneralError => "error",
        ExitCode::NotFound => "not_found",
        ExitCode::InvalidArgs => "invalid_args",
        ExitCode::FileSystemError => "filesystem",
        ExitCode::EmbeddingError => "embedding",
        ExitCode::NetworkError => "network",
    }
}
