use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use papergraph_core::PaperRecord;

use super::store::{PaperStore, RemoteId};
use crate::error::{Result, ScienceError};

#[derive(Debug)]
struct StoredLink {
    id: RemoteId,
    source: RemoteId,
    target: RemoteId,
}

#[derive(Debug, Default)]
struct MemoryState {
    papers: HashMap<String, (RemoteId, PaperRecord)>,
    links: Vec<StoredLink>,
    next_id: u64,
    paper_creates: usize,
    link_creates: usize,
}

impl MemoryState {
    fn allocate(&mut self, prefix: &str) -> RemoteId {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn link_between(&self, a: &str, b: &str) -> Option<&StoredLink> {
        self.links.iter().find(|link| {
            (link.source == a && link.target == b) || (link.source == b && link.target == a)
        })
    }
}

/// Process-local store with the same uniqueness rules as the remote one:
/// one paper per external id, one link per unordered pair of distinct
/// papers. Used for
/// `--dry-run` and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| ScienceError::Config("memory store lock poisoned".to_string()))
    }

    pub fn paper_count(&self) -> usize {
        self.state().map(|s| s.papers.len()).unwrap_or(0)
    }

    pub fn link_count(&self) -> usize {
        self.state().map(|s| s.links.len()).unwrap_or(0)
    }

    /// Number of `create_paper` calls, including rejected ones.
    pub fn paper_creates(&self) -> usize {
        self.state().map(|s| s.paper_creates).unwrap_or(0)
    }

    pub fn link_creates(&self) -> usize {
        self.state().map(|s| s.link_creates).unwrap_or(0)
    }

    pub fn remote_id(&self, external_id: &str) -> Option<RemoteId> {
        self.state()
            .ok()
            .and_then(|s| s.papers.get(external_id).map(|(id, _)| id.clone()))
    }
}

#[async_trait]
impl PaperStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find_paper_by_external_id(&self, external_id: &str) -> Result<Option<RemoteId>> {
        Ok(self.remote_id(external_id))
    }

    async fn create_paper(&self, record: &PaperRecord) -> Result<RemoteId> {
        let mut state = self.state()?;
        state.paper_creates += 1;
        if state.papers.contains_key(&record.external_id) {
            return Err(ScienceError::RemoteWriteFailed(
                record.external_id.clone(),
                "openAlexId must be unique".to_string(),
            ));
        }
        let id = state.allocate("paper");
        state
            .papers
            .insert(record.external_id.clone(), (id.clone(), record.clone()));
        Ok(id)
    }

    async fn find_link(&self, source: &RemoteId, target: &RemoteId) -> Result<Option<RemoteId>> {
        let state = self.state()?;
        Ok(state.link_between(source, target).map(|link| link.id.clone()))
    }

    async fn create_link(
        &self,
        source: &RemoteId,
        target: &RemoteId,
        _score: f64,
    ) -> Result<RemoteId> {
        let mut state = self.state()?;
        state.link_creates += 1;
        if source == target {
            return Err(ScienceError::RemoteWriteFailed(
                format!("{source}<->{target}"),
                "a paper cannot link to itself".to_string(),
            ));
        }
        if state.link_between(source, target).is_some() {
            return Err(ScienceError::RemoteWriteFailed(
                format!("{source}<->{target}"),
                "link already exists".to_string(),
            ));
        }
        let id = state.allocate("link");
        state.links.push(StoredLink {
            id: id.clone(),
            source: source.clone(),
            target: target.clone(),
        });
        Ok(id)
    }
}
