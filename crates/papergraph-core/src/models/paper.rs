use serde::{Deserialize, Serialize};

/// Placeholder used when an authorship carries no display name.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Maximum number of topic labels kept per paper.
pub const MAX_TOPICS: usize = 3;

/// Canonical, normalized form of one catalog work.
///
/// The serialized layout is the flat object written to the local cache, so
/// field names follow the cache file format rather than Rust naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    #[serde(rename = "openAlexId")]
    pub external_id: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,

    #[serde(default)]
    pub doi: Option<String>,

    #[serde(default)]
    pub year: Option<i32>,

    #[serde(default, rename = "cited_by")]
    pub cited_by_count: Option<u32>,

    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,

    #[serde(default)]
    pub topics: Vec<String>,

    #[serde(default, rename = "authors", deserialize_with = "authors_with_placeholder")]
    pub co_authors: Vec<String>,

    #[serde(default)]
    pub pdf_url: Option<String>,
}

impl PaperRecord {
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            doi: None,
            year: None,
            cited_by_count: None,
            abstract_text: None,
            topics: Vec::new(),
            co_authors: Vec::new(),
            pdf_url: None,
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    /// Last path segment of the external id (`https://openalex.org/W1` → `W1`).
    pub fn short_id(&self) -> &str {
        short_id(&self.external_id)
    }

    /// A record takes part in linking only when it has non-blank abstract text.
    pub fn is_eligible(&self) -> bool {
        self.abstract_text
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }

    /// Text unit used for embedding: title and abstract joined by one space.
    pub fn embedding_text(&self) -> Option<String> {
        let abstract_text = self.abstract_text.as_deref()?;
        Some(format!("{} {}", self.title, abstract_text))
    }
}

pub fn short_id(external_id: &str) -> &str {
    external_id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(external_id)
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// Older cache files may contain `null` author slots; keep the slot.
fn authors_with_placeholder<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<Option<String>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|name| name.unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()))
        .collect())
}
