//! Few-shot example retrieval
//!
//! Ranks every stored embedding by cosine similarity to the query and
//! returns the top-K samples.
//!
//! # Scaling
//! The scan is O(n) per query over all stored vectors. That is fine for the
//! expected knowledge base size (up to ~10⁴ samples); larger stores would
//! need an approximate index.
//!
//! # Failure Handling
//! Embedding failures, store errors and undecodable vectors never fail the
//! caller: the result is simply empty (or shorter), turning few-shot
//! classification into zero-shot. Only cancellation propagates.

use crate::db;
use crate::error::{AiError, AiResult};
use crate::models::{blob_to_vector, Sample};
use crate::services::embedding::{cosine_similarity, EmbeddingClient};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of examples returned
pub const DEFAULT_TOP_K: usize = 3;

/// Retrieved sample with its similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub sample: Sample,
    pub score: f64,
}

pub struct Retriever {
    pool: SqlitePool,
    embedder: EmbeddingClient,
}

impl Retriever {
    pub fn new(pool: SqlitePool, embedder: EmbeddingClient) -> Self {
        Self { pool, embedder }
    }

    /// Top-`k` stored samples most similar to `query`, best first
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> AiResult<Vec<RetrievalResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = match self.embedder.embed(query, cancel).await? {
            Some(v) => v,
            None => {
                debug!("No query embedding, falling back to zero-shot");
                return Ok(Vec::new());
            }
        };

        let ranked = match self.rank(&query_vector).await {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(error = %e, "Similarity scan failed");
                return Ok(Vec::new());
            }
        };

        let mut results = Vec::with_capacity(k.min(ranked.len()));
        for (sample_id, score) in ranked {
            if results.len() == k {
                break;
            }
            if cancel.is_cancelled() {
                return Err(AiError::Cancelled);
            }
            match db::samples::get_sample(&self.pool, &sample_id).await {
                Ok(Some(sample)) => results.push(RetrievalResult { sample, score }),
                // Deindexed between the scan and the lookup
                Ok(None) => continue,
                Err(e) => {
                    warn!(sample_id = %sample_id, error = %e, "Sample lookup failed");
                    continue;
                }
            }
        }

        debug!(
            returned = results.len(),
            best = results.first().map(|r| r.score).unwrap_or(0.0),
            "Few-shot examples retrieved"
        );
        Ok(results)
    }

    /// All (sample id, score) pairs sorted by descending similarity
    async fn rank(&self, query: &[f32]) -> AiResult<Vec<(String, f64)>> {
        let stored = db::embeddings::load_all_vectors(&self.pool).await?;
        let mut scored = Vec::with_capacity(stored.len());

        for entry in stored {
            match blob_to_vector(&entry.blob) {
                Some(vector) => scored.push((entry.sample_id, cosine_similarity(query, &vector))),
                None => warn!(
                    sample_id = %entry.sample_id,
                    bytes = entry.blob.len(),
                    "Skipping undecodable embedding"
                ),
            }
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scored)
    }
}
