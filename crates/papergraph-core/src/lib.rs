//! Paper models, configuration and the local record cache.

pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{
    AppConfig, CacheConfig, CatalogConfig, EmbeddingConfig, LinkingConfig, StoreConfig,
    validate_threshold,
};
pub use error::{CoreError, ExitCode, Result};
pub use models::*;
