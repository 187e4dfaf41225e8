//! Embedding client
//!
//! Thin wrapper over an [`EmbeddingBackend`] that turns service failures
//! into "no vector" and only lets cancellation through.

use crate::error::{AiError, AiResult};
use crate::types::{EmbeddingBackend, ServiceError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
}

impl EmbeddingClient {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self { backend }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Embed `text`
    ///
    /// Returns `Ok(None)` for blank text or any service failure,
    /// `Err(Cancelled)` when `cancel` fires.
    pub async fn embed(&self, text: &str, cancel: &CancellationToken) -> AiResult<Option<Vec<f32>>> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Skipping embedding of blank text");
            return Ok(None);
        }

        match self.backend.embed(text, cancel).await {
            Ok(vector) if vector.is_empty() => {
                warn!(model = self.model_name(), "Embedding service returned an empty vector");
                Ok(None)
            }
            Ok(vector) => Ok(Some(vector)),
            Err(ServiceError::Cancelled) => Err(AiError::Cancelled),
            Err(e) => {
                warn!(model = self.model_name(), error = %e, "Embedding failed");
                Ok(None)
            }
        }
    }
}

/// Cosine similarity `dot(a,b) / (|a|·|b|)`
///
/// Returns 0 when the lengths differ, either vector is empty, or either
/// norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
