use async_trait::async_trait;
use papergraph_core::PaperRecord;

use crate::error::Result;

/// Identifier assigned by the external store.
pub type RemoteId = String;

/// External store receiving papers and similarity links.
///
/// Lookups return `Ok(None)` when nothing matches; only transport or protocol
/// problems are errors.
#[async_trait]
pub trait PaperStore: Send + Sync {
    fn name(&self) -> &str;

    async fn find_paper_by_external_id(&self, external_id: &str) -> Result<Option<RemoteId>>;

    async fn create_paper(&self, record: &PaperRecord) -> Result<RemoteId>;

    /// Existing link between two remote papers, in either direction.
    async fn find_link(&self, source: &RemoteId, target: &RemoteId) -> Result<Option<RemoteId>>;

    async fn create_link(&self, source: &RemoteId, target: &RemoteId, score: f64)
    -> Result<RemoteId>;
}
