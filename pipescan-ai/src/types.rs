//! Core Types and Trait Definitions for pipescan-ai
//!
//! Defines the seams between the analysis pipeline and the external model
//! services:
//! - **ChatBackend:** structured chat completion (vision and text models)
//! - **EmbeddingBackend:** text → fixed-length vector
//!
//! # Architecture
//! The HTTP client in [`crate::services::ollama_client`] implements both
//! traits. Services only depend on the traits, so tests swap in in-memory
//! fakes and never touch the network.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Chat Messages
// ============================================================================

/// Single chat message sent to a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system" or "user"
    pub role: String,
    /// Message text
    pub content: String,
    /// Base64-encoded images (vision models only)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub images: Vec<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// Attach a base64-encoded image
    pub fn with_image(mut self, base64_image: String) -> Self {
        self.images.push(base64_image);
        self
    }
}

// ============================================================================
// Backend Traits
// ============================================================================

/// Structured chat completion backend
///
/// Implementations send `messages` to `model` and constrain the answer to
/// the JSON `schema`. The returned value is the parsed JSON answer.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat_structured(
        &self,
        model: &str,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ServiceError>;
}

/// Text embedding backend
#[async_trait::async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Model name recorded next to each stored vector
    fn model_name(&self) -> &str;

    /// Embed `text` into a fixed-length vector
    async fn embed(&self, text: &str, cancel: &CancellationToken)
        -> Result<Vec<f32>, ServiceError>;
}

// ============================================================================
// Errors
// ============================================================================

/// External model service errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// Connection or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Call exceeded the configured timeout (seconds)
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Non-success HTTP status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Malformed response or schema mismatch
    #[error("Parse error: {0}")]
    Parse(String),

    /// Service reachable but cannot serve the request (e.g. empty embedding)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Caller cancelled the call
    #[error("Cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_without_images_omits_field() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("images").is_none());
    }

    #[test]
    fn test_message_with_image_serializes_images() {
        let msg = ChatMessage::user("frame").with_image("aGVsbG8=".to_string());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["images"][0], "aGVsbG8=");
    }
}
