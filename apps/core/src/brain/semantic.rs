//! Semantic FAQ lookup: embed the utterance, ask the vector index for the
//! nearest questions and apply the similarity threshold.

use crate::actors::messages::{AppError, SearchHit};
use crate::actors::traits::{Embedder, VectorIndex};
use crate::config::PipelineConfig;
use crate::models::clamp_confidence;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of one semantic search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Best hit scored at or above the threshold.
    Match(SearchHit),
    /// Nothing cleared the threshold. `best_score` is 0 when the index is empty.
    NoConfidentMatch { best_score: f32 },
    /// Embedding or index failed, or the deadline passed.
    Unavailable { reason: String },
}

/// Embeds queries (with an LRU cache) and searches the FAQ index under a deadline.
pub struct SemanticSearchClient {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    top_k: usize,
    timeout: Duration,
    threshold: f32,
}

impl SemanticSearchClient {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: &PipelineConfig) -> Self {
        let cache_size = NonZeroUsize::new(config.embedding_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            embedder,
            index,
            cache: Mutex::new(LruCache::new(cache_size)),
            top_k: config.search_top_k.max(1),
            timeout: config.search_timeout(),
            threshold: config.faq_similarity_threshold,
        }
    }

    /// Runs one search. Never fails: errors and timeouts become `Unavailable`.
    pub async fn query(&self, text: &str) -> SearchOutcome {
        let hits = match tokio::time::timeout(self.timeout, self.search(text)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!("Semantic search failed: {}", e);
                return SearchOutcome::Unavailable { reason: e.to_string() };
            }
            Err(_) => {
                warn!("Semantic search timed out after {:?}", self.timeout);
                return SearchOutcome::Unavailable {
                    reason: format!("search timed out after {} ms", self.timeout.as_millis()),
                };
            }
        };

        let best = hits
            .into_iter()
            .map(|mut hit| {
                hit.score = clamp_confidence(hit.score);
                hit
            })
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some(hit) if hit.score >= self.threshold => {
                info!("FAQ match {} (score {:.3})", hit.candidate_id, hit.score);
                SearchOutcome::Match(hit)
            }
            Some(hit) => {
                debug!(
                    "Best FAQ candidate {} below threshold ({:.3} < {:.3})",
                    hit.candidate_id, hit.score, self.threshold
                );
                SearchOutcome::NoConfidentMatch { best_score: hit.score }
            }
            None => SearchOutcome::NoConfidentMatch { best_score: 0.0 },
        }
    }

    async fn search(&self, text: &str) -> Result<Vec<SearchHit>, AppError> {
        let vector = self.embed_cached(text).await?;
        self.index.search(vector, self.top_k).await
    }

    async fn embed_cached(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let key = text.trim().to_string();
        if let Some(vector) = self.cache.lock().await.get(&key) {
            debug!("Embedding cache hit for query: '{}'", key);
            return Ok(vector.clone());
        }

        let vector = self.embedder.embed(key.clone()).await?;
        self.cache.lock().await.put(key, vector.clone());
        Ok(vector)
    }
}

/// Cosine similarity of two vectors; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
