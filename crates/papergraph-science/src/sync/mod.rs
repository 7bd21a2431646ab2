//! Idempotent upsert of papers and similarity links into an external store.
//!
//! Papers go first, on a bounded pool. Links start only after every paper
//! upsert has finished, so each endpoint is either resolved or known missing.

pub mod memory;
pub mod store;
pub mod strapi;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use papergraph_core::{PaperRecord, SimilarityEdge};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, ScienceError};

pub use memory::MemoryStore;
pub use store::{PaperStore, RemoteId};
pub use strapi::StrapiStore;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// `external_id → remote id` for every paper known to exist remotely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteIdentityMap {
    ids: HashMap<String, RemoteId>,
}

impl RemoteIdentityMap {
    pub fn get(&self, external_id: &str) -> Option<&RemoteId> {
        self.ids.get(external_id)
    }

    pub fn insert(&mut self, external_id: impl Into<String>, remote_id: RemoteId) {
        self.ids.insert(external_id.into(), remote_id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RemoteId)> {
        self.ids.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub papers_attempted: usize,
    pub papers_created: usize,
    pub papers_existing: usize,
    pub papers_failed: usize,
    pub links_attempted: usize,
    pub links_created: usize,
    pub links_existing: usize,
    pub links_unresolved: usize,
    pub links_failed: usize,
    pub links_duplicate: usize,
    pub links_self: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

enum PaperOutcome {
    Created(RemoteId),
    Existing(RemoteId),
}

enum LinkOutcome {
    Created,
    Existing,
}

pub struct SyncCoordinator {
    store: Arc<dyn PaperStore>,
    concurrency: usize,
    identities: RemoteIdentityMap,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn PaperStore>) -> Self {
        Self {
            store,
            concurrency: DEFAULT_CONCURRENCY,
            identities: RemoteIdentityMap::default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn identities(&self) -> &RemoteIdentityMap {
        &self.identities
    }

    /// Upsert `records`, then `edges`. Individual failures are counted in the
    /// report; nothing here aborts the run.
    pub async fn sync(&mut self, records: &[PaperRecord], edges: &[SimilarityEdge]) -> SyncReport {
        let mut report = SyncReport::default();
        self.sync_papers(records, &mut report).await;
        self.sync_links(edges, &mut report).await;
        info!(
            store = self.store.name(),
            papers_created = report.papers_created,
            papers_existing = report.papers_existing,
            papers_failed = report.papers_failed,
            links_created = report.links_created,
            links_existing = report.links_existing,
            links_unresolved = report.links_unresolved,
            links_failed = report.links_failed,
            "sync complete"
        );
        report
    }

    async fn sync_papers(&mut self, records: &[PaperRecord], report: &mut SyncReport) {
        let mut seen = HashSet::new();
        let unique: Vec<&PaperRecord> = records
            .iter()
            .filter(|record| seen.insert(record.external_id.as_str()))
            .collect();
        report.papers_attempted = unique.len();

        let store = self.store.as_ref();
        let outcomes: Vec<(&str, Result<PaperOutcome>)> = stream::iter(unique)
            .map(|record| async move {
                (record.external_id.as_str(), upsert_paper(store, record).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (external_id, outcome) in outcomes {
            match outcome {
                Ok(PaperOutcome::Created(remote_id)) => {
                    report.papers_created += 1;
                    self.identities.insert(external_id, remote_id);
                }
                Ok(PaperOutcome::Existing(remote_id)) => {
                    report.papers_existing += 1;
                    self.identities.insert(external_id, remote_id);
                }
                Err(e) => {
                    warn!(external_id, error = %e, "paper upsert failed");
                    report.papers_failed += 1;
                    report.errors.push(e.to_string());
                }
            }
        }
    }

    async fn sync_links(&mut self, edges: &[SimilarityEdge], report: &mut SyncReport) {
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for edge in edges {
            report.links_attempted += 1;
            if edge.source_id == edge.target_id {
                let e = ScienceError::RemoteWriteFailed(
                    link_key(&edge.source_id, &edge.target_id),
                    "a paper cannot link to itself".to_string(),
                );
                warn!(source = %edge.source_id, error = %e, "skipping self-link");
                report.links_self += 1;
                report.errors.push(e.to_string());
                continue;
            }
            let (a, b) = edge.pair_key();
            if !seen.insert((a.to_string(), b.to_string())) {
                debug!(source = %edge.source_id, target = %edge.target_id, "duplicate edge in run");
                report.links_duplicate += 1;
                continue;
            }

            let source = self.resolve(&edge.source_id).await;
            let target = self.resolve(&edge.target_id).await;
            let (source, target) = match (source, target) {
                (Some(s), Some(t)) => (s, t),
                (s, _) => {
                    let missing = if s.is_none() { &edge.source_id } else { &edge.target_id };
                    let e = ScienceError::UnresolvedEdgeEndpoint(missing.clone());
                    warn!(source = %edge.source_id, target = %edge.target_id, error = %e, "skipping edge");
                    report.links_unresolved += 1;
                    report.errors.push(e.to_string());
                    continue;
                }
            };

            match upsert_link(self.store.as_ref(), &source, &target, edge.score).await {
                Ok(LinkOutcome::Created) => report.links_created += 1,
                Ok(LinkOutcome::Existing) => report.links_existing += 1,
                Err(e) => {
                    warn!(source = %edge.source_id, target = %edge.target_id, error = %e, "link upsert failed");
                    report.links_failed += 1;
                    report.errors.push(e.to_string());
                }
            }
        }
    }

    /// Remote id for a paper: the identity map first, then a store lookup.
    async fn resolve(&mut self, external_id: &str) -> Option<RemoteId> {
        if let Some(id) = self.identities.get(external_id) {
            return Some(id.clone());
        }
        match self.store.find_paper_by_external_id(external_id).await {
            Ok(Some(id)) => {
                self.identities.insert(external_id, id.clone());
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(external_id, error = %e, "paper lookup failed");
                None
            }
        }
    }
}

async fn upsert_paper(store: &dyn PaperStore, record: &PaperRecord) -> Result<PaperOutcome> {
    if record.external_id.trim().is_empty() {
        return Err(ScienceError::RemoteWriteFailed(
            String::new(),
            "record has no external id".to_string(),
        ));
    }
    let existing = store
        .find_paper_by_external_id(&record.external_id)
        .await
        .map_err(|e| write_failed(&record.external_id, e))?;
    if let Some(id) = existing {
        debug!(external_id = %record.external_id, remote_id = %id, "paper already exists");
        return Ok(PaperOutcome::Existing(id));
    }
    let id = store
        .create_paper(record)
        .await
        .map_err(|e| write_failed(&record.external_id, e))?;
    Ok(PaperOutcome::Created(id))
}

async fn upsert_link(
    store: &dyn PaperStore,
    source: &RemoteId,
    target: &RemoteId,
    score: f64,
) -> Result<LinkOutcome> {
    let existing = store
        .find_link(source, target)
        .await
        .map_err(|e| write_failed(&link_key(source, target), e))?;
    if existing.is_some() {
        return Ok(LinkOutcome::Existing);
    }
    store
        .create_link(source, target, score)
        .await
        .map_err(|e| write_failed(&link_key(source, target), e))?;
    Ok(LinkOutcome::Created)
}

/// Store failures during an upsert, lookups included, surface as
/// `RemoteWriteFailed` for the record being written.
fn write_failed(key: &str, error: ScienceError) -> ScienceError {
    match error {
        ScienceError::RemoteWriteFailed(..) => error,
        other => ScienceError::RemoteWriteFailed(key.to_string(), other.to_string()),
    }
}

fn link_key(source: &str, target: &str) -> String {
    format!("{source}<->{target}")
}
