use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use tokio::sync::Mutex;
use tracing::info;

use super::Embedder;
use crate::error::{Result, ScienceError};

/// Local sentence-embedding model; `all-MiniLM-L6-v2` unless overridden.
#[derive(Clone)]
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedder {
    pub async fn new(model_override: Option<String>) -> Result<Self> {
        let model = match model_override {
            Some(code) => EmbeddingModel::from_str(&code)
                .map_err(|e| ScienceError::Config(format!("unknown fastembed model {code}: {e}")))?,
            None => EmbeddingModel::AllMiniLML6V2,
        };
        let model_name = model.to_string();
        let options = TextInitOptions::new(model.clone()).with_show_download_progress(false);

        let (text_embedding, dimension) = tokio::task::spawn_blocking(move || {
            let text_embedding = TextEmbedding::try_new(options).map_err(|e| {
                ScienceError::EmbeddingUnavailable(format!("initialising fastembed model: {e}"))
            })?;
            let info = EmbeddingModel::get_model_info(&model).ok_or_else(|| {
                ScienceError::EmbeddingUnavailable("fastembed model metadata missing".to_string())
            })?;
            Ok::<_, ScienceError>((text_embedding, info.dim))
        })
        .await
        .map_err(|e| ScienceError::EmbeddingUnavailable(format!("joining init task: {e}")))??;

        info!(model = %model_name, dimension, "loaded fastembed model");
        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut guard = self.model.lock().await;
        guard
            .embed(texts.to_vec(), None)
            .map_err(|e| ScienceError::EmbeddingUnavailable(e.to_string()))
    }
}
