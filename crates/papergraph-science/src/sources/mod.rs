use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sources::openalex::OpenAlexWork;

pub mod openalex;

/// Sentinel cursor that starts a paginated listing.
pub const INITIAL_CURSOR: &str = "*";

/// First match of an author search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorMatch {
    pub id: String,
    pub display_name: String,
    pub works_count: Option<u32>,
}

/// One page of works plus the cursor for the next one (`None` ends paging).
#[derive(Debug, Clone, Default)]
pub struct WorksPage {
    pub works: Vec<OpenAlexWork>,
    pub next_cursor: Option<String>,
}

/// Remote bibliographic catalog the harvester pages through.
#[async_trait]
pub trait WorksCatalog: Send + Sync {
    fn name(&self) -> &str;

    /// Search authors by name; the first ranked result is authoritative.
    /// `Ok(None)` means no author matched.
    async fn find_author(&self, name: &str, institution: Option<&str>)
    -> Result<Option<AuthorMatch>>;

    /// Fetch one page of the author's open-access works.
    async fn fetch_works_page(&self, author_id: &str, cursor: &str) -> Result<WorksPage>;
}
