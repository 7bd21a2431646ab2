//! Stage wiring: harvest → cache → link → sync.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use papergraph_core::storage::{save_links, save_records};
use papergraph_core::{AppConfig, PaperRecord, short_id};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::graph::{GraphStats, SimilarityGraph, SimilarityGraphBuilder, export_links};
use crate::harvest::{CorpusHarvester, HarvestStats};
use crate::sources::{AuthorMatch, WorksCatalog};
use crate::sync::{SyncCoordinator, SyncReport};

/// Aggregated counters of one run; phases that did not run stay `None`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub author: Option<AuthorMatch>,
    pub harvest: Option<HarvestStats>,
    pub cache_dir: Option<PathBuf>,
    pub cache_files: usize,
    pub graph: Option<GraphStats>,
    pub links_file: Option<PathBuf>,
    pub sync: Option<SyncReport>,
}

#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    pub author: AuthorMatch,
    pub records: Vec<PaperRecord>,
    pub stats: HarvestStats,
    pub cache_dir: PathBuf,
    pub files_written: usize,
}

/// Find the author, page through their works and cache every normalized
/// record under `entity_dir(name)`. `Ok(None)` when no author matches.
pub async fn harvest_to_cache<C: WorksCatalog>(
    harvester: &CorpusHarvester<C>,
    config: &AppConfig,
    name: &str,
    institution: Option<&str>,
) -> Result<Option<HarvestOutcome>> {
    let Some(author) = harvester.find_author(name, institution).await? else {
        return Ok(None);
    };

    let harvest = harvester.harvest(short_id(&author.id)).await?;
    let records = harvest.records();
    let cache_dir = config.entity_dir(name);
    let files_written = save_records(&cache_dir, &records)?;
    info!(dir = %cache_dir.display(), files = files_written, "cached records");

    Ok(Some(HarvestOutcome {
        author,
        records,
        stats: harvest.stats(),
        cache_dir,
        files_written,
    }))
}

/// Build the similarity graph and, when `links_path` is given, write the
/// `graph_links.json` export.
pub async fn link_and_export(
    builder: &SimilarityGraphBuilder,
    records: &[PaperRecord],
    links_path: Option<&Path>,
) -> Result<SimilarityGraph> {
    let graph = builder.build(records).await?;
    if let Some(path) = links_path {
        save_links(path, &export_links(&graph.edges, records))?;
        info!(path = %path.display(), links = graph.edges.len(), "wrote link export");
    }
    Ok(graph)
}

/// Full pipeline for one author. Stops after the search when nobody matches.
pub async fn run_pipeline<C: WorksCatalog>(
    config: &AppConfig,
    harvester: &CorpusHarvester<C>,
    builder: &SimilarityGraphBuilder,
    coordinator: &mut SyncCoordinator,
    name: &str,
    institution: Option<&str>,
) -> Result<RunReport> {
    let mut report = RunReport {
        started_at: Some(Utc::now()),
        ..RunReport::default()
    };

    let Some(outcome) = harvest_to_cache(harvester, config, name, institution).await? else {
        report.finished_at = Some(Utc::now());
        return Ok(report);
    };
    report.author = Some(outcome.author);
    report.harvest = Some(outcome.stats);
    report.cache_dir = Some(outcome.cache_dir);
    report.cache_files = outcome.files_written;

    let links_path = config.links_path();
    let graph = link_and_export(builder, &outcome.records, Some(&links_path)).await?;
    report.graph = Some(graph.stats);
    report.links_file = Some(links_path);

    report.sync = Some(coordinator.sync(&outcome.records, &graph.edges).await);
    report.finished_at = Some(Utc::now());
    Ok(report)
}
