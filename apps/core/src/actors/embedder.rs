use crate::actors::messages::AppError;
use crate::actors::traits::Embedder;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Local ONNX sentence embedder (AllMiniLML6V2, 384 dimensions).
///
/// Loading may fail when the model files are missing and cannot be downloaded;
/// every `embed` call then fails with `SearchUnavailable` and the pipeline
/// escalates instead of answering from the FAQ.
#[derive(Clone)]
pub struct FastEmbedEmbedder {
    model: Option<Arc<TextEmbedding>>,
}

impl FastEmbedEmbedder {
    /// Loads (and on first run downloads) the model on the blocking pool.
    pub async fn load(cache_dir: PathBuf) -> Self {
        tokio::task::spawn_blocking(move || Self::new(cache_dir))
            .await
            .unwrap_or_else(|e| {
                error!("Embedding model loader panicked: {}", e);
                Self { model: None }
            })
    }

    /// Blocks while the ONNX files load.
    fn new(cache_dir: PathBuf) -> Self {
        let mut options = InitOptions::new(EmbeddingModel::AllMiniLML6V2);
        options.show_download_progress = false;
        options.cache_dir = cache_dir;

        match TextEmbedding::try_new(options) {
            Ok(model) => {
                info!("Embedding model loaded successfully");
                Self {
                    model: Some(Arc::new(model)),
                }
            }
            Err(e) => {
                error!("Failed to load embedding model: {}", e);
                Self { model: None }
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }
}

#[async_trait]
impl Embedder for FastEmbedEmbedder {
    async fn embed(&self, text: String) -> Result<Vec<f32>, AppError> {
        let model = self
            .model
            .clone()
            .ok_or_else(|| AppError::SearchUnavailable("Embedding model not loaded".to_string()))?;

        // ONNX inference is CPU bound; keep it off the async workers.
        let embeddings = tokio::task::spawn_blocking(move || model.embed(vec![text], None))
            .await
            .map_err(|e| AppError::Internal(format!("Embedding task panicked: {}", e)))?
            .map_err(|e| AppError::SearchUnavailable(format!("Embedding failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::SearchUnavailable("No embedding generated".to_string()))
    }
}
