use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Root application configuration, loaded from `~/.config/papergraph/config.toml`.
///
/// Every component receives the section it needs at construction time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub embedding: EmbeddingConfig,
    pub linking: LinkingConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub page_size: u32,
    pub politeness_delay_ms: u64,
    pub max_retries: u32,
    pub search_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailto: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub dimension: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingConfig {
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    pub token_env: String,
    pub concurrency: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub output_dir: String,
    pub links_file: String,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openalex.org".to_string(),
            page_size: 50,
            politeness_delay_ms: 200,
            max_retries: 0,
            search_limit: 5,
            mailto: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "hashed".to_string(),
            model: None,
            dimension: 384,
            batch_size: 64,
        }
    }
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1337".to_string(),
            token_env: "STRAPI_TOKEN".to_string(),
            concurrency: 4,
            request_timeout_secs: 30,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            output_dir: "outputs".to_string(),
            links_file: "graph_links.json".to_string(),
        }
    }
}

impl CatalogConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn user_agent(&self) -> String {
        let version = env!("CARGO_PKG_VERSION");
        match &self.mailto {
            Some(email) => format!("papergraph/{version} (mailto:{email})"),
            None => format!("papergraph/{version}"),
        }
    }
}

impl StoreConfig {
    /// Bearer token read from the configured environment variable, if set.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/papergraph/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PAPERGRAPH_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("papergraph")
            .join("config.toml")
    }

    /// Load config from disk, apply environment overrides, and validate.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a specific path, falling back to defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Apply `PAPERGRAPH_STORE_URL` and `PAPERGRAPH_THRESHOLD`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PAPERGRAPH_STORE_URL") {
            self.store.base_url = url;
        }
        if let Some(raw) = lookup("PAPERGRAPH_THRESHOLD") {
            self.linking.threshold = raw.trim().parse::<f64>().map_err(|_| {
                CoreError::ConfigError(format!("PAPERGRAPH_THRESHOLD is not a number: {raw}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.linking.threshold)?;
        if self.catalog.page_size == 0 {
            return Err(CoreError::ConfigError("catalog.page_size must be > 0".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(CoreError::ConfigError("embedding.batch_size must be > 0".to_string()));
        }
        if self.store.concurrency == 0 {
            return Err(CoreError::ConfigError("store.concurrency must be > 0".to_string()));
        }
        Ok(())
    }

    // ─── Derived paths ─────────────────────────────────────

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.cache.output_dir)
    }

    /// Per-entity cache directory: `{output_dir}/results_{name}`.
    pub fn entity_dir(&self, entity: &str) -> PathBuf {
        self.output_dir()
            .join(format!("results_{}", entity.trim().replace(' ', "_")))
    }

    pub fn links_path(&self) -> PathBuf {
        PathBuf::from(&self.cache.links_file)
    }
}

/// Similarity thresholds live in `[0, 1)`.
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold.is_finite() && (0.0..1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(CoreError::ValidationError(format!(
            "similarity threshold must be in [0, 1), got {threshold}"
        )))
    }
}
