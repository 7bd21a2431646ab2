use papergraph_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("malformed inverted index: word {word:?} at position {position}")]
    MalformedIndex { word: String, position: i64 },

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("remote write failed for {0}: {1}")]
    RemoteWriteFailed(String, String),

    #[error("unresolved edge endpoint: {0}")]
    UnresolvedEdgeEndpoint(String),

    #[error("similarity threshold must be in [0, 1), got {0}")]
    InvalidThreshold(f64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ScienceError {
    /// Transport, status and rate-limit failures from a remote service.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::CatalogUnavailable(_) | Self::RateLimit(..) | Self::Http(_) | Self::ApiError(..)
        )
    }
}

pub type Result<T> = std::result::Result<T, ScienceError>;
