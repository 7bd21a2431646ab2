//! Raw catalog work → canonical [`PaperRecord`].

use papergraph_core::{MAX_TOPICS, PaperRecord, UNKNOWN_AUTHOR};
use tracing::warn;

use crate::reconstruct::{reconstruct_checked, reconstruct_lossy};
use crate::sources::openalex::OpenAlexWork;

/// Map one parsed work to a record. Never fails: missing optional fields
/// become `None`/empty, and a malformed abstract index falls back to
/// best-effort text.
pub fn normalize_work(work: &OpenAlexWork) -> PaperRecord {
    let abstract_text = match reconstruct_checked(work.abstract_inverted_index.as_ref()) {
        Ok(text) => text,
        Err(e) => {
            warn!(work = %work.id, error = %e, "abstract index is malformed, using lossy text");
            reconstruct_lossy(work.abstract_inverted_index.as_ref())
        }
    };

    let co_authors = work
        .authorships
        .iter()
        .map(|authorship| {
            authorship
                .display_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(UNKNOWN_AUTHOR)
                .to_string()
        })
        .collect();

    PaperRecord {
        external_id: work.id.clone(),
        title: work.title.clone().unwrap_or_default(),
        doi: work.doi.clone(),
        year: work.publication_year,
        cited_by_count: work.cited_by_count,
        abstract_text,
        topics: work.topics.iter().take(MAX_TOPICS).cloned().collect(),
        co_authors,
        pdf_url: work.open_access.oa_url.clone(),
    }
}

pub fn normalize_works(works: &[OpenAlexWork]) -> Vec<PaperRecord> {
    works.iter().map(normalize_work).collect()
}
