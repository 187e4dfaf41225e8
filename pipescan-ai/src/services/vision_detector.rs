//! Vision detection (pipeline stage 1)
//!
//! Frame image → multimodal model → raw natural-language defect
//! descriptions.
//!
//! Fail-open: a missing frame, a malformed answer or any service failure
//! yields an empty list. Only cancellation is returned as an error.

use crate::error::{AiError, AiResult};
use crate::types::{ChatBackend, ChatMessage, ServiceError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are an expert in sewer pipe inspection according to the VSA \
guideline and EN 13508-2. Analyse the inspection frame and describe every visible defect or \
anomaly precisely. If no defect is visible, set hasDefects to false.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectionAnswer {
    #[serde(default)]
    has_defects: bool,
    #[serde(default)]
    defects: Option<Vec<DetectedDefect>>,
}

#[derive(Debug, Deserialize)]
struct DetectedDefect {
    #[serde(default)]
    description: String,
    // Requested from the model for its own reasoning; not used downstream
    #[serde(default)]
    #[allow(dead_code)]
    severity: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    location: Option<String>,
}

pub struct VisionDetector {
    backend: Arc<dyn ChatBackend>,
    model: String,
    schema: serde_json::Value,
}

impl VisionDetector {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            schema: detection_schema(),
        }
    }

    /// Describe the defects visible in the frame at `frame_path`
    pub async fn detect(
        &self,
        frame_path: &Path,
        position: f64,
        cancel: &CancellationToken,
    ) -> AiResult<Vec<String>> {
        let image = match tokio::fs::read(frame_path).await {
            Ok(bytes) => BASE64.encode(bytes),
            Err(e) => {
                warn!(frame = %frame_path.display(), error = %e, "Frame not readable, skipping");
                return Ok(Vec::new());
            }
        };

        self.detect_encoded(image, position, cancel).await
    }

    /// Same as [`detect`](Self::detect) for an already base64-encoded image
    pub async fn detect_encoded(
        &self,
        image_base64: String,
        position: f64,
        cancel: &CancellationToken,
    ) -> AiResult<Vec<String>> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Position: {:.2} m. Analyse this frame.", position))
                .with_image(image_base64),
        ];

        let answer = match self
            .backend
            .chat_structured(&self.model, &messages, &self.schema, cancel)
            .await
        {
            Ok(value) => value,
            Err(ServiceError::Cancelled) => return Err(AiError::Cancelled),
            Err(e) => {
                warn!(position, error = %e, "Vision detection failed");
                return Ok(Vec::new());
            }
        };

        let answer: DetectionAnswer = match serde_json::from_value(answer) {
            Ok(a) => a,
            Err(e) => {
                warn!(position, error = %e, "Malformed vision answer");
                return Ok(Vec::new());
            }
        };

        if !answer.has_defects {
            debug!(position, "No defects reported");
            return Ok(Vec::new());
        }

        let descriptions: Vec<String> = answer
            .defects
            .unwrap_or_default()
            .into_iter()
            .map(|d| d.description.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        debug!(position, defects = descriptions.len(), "Vision detection complete");
        Ok(descriptions)
    }
}

fn detection_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["hasDefects", "defects"],
        "properties": {
            "hasDefects": { "type": "boolean" },
            "defects": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["description"],
                    "properties": {
                        "description": { "type": "string" },
                        "severity": { "type": "string" },
                        "location": { "type": "string" }
                    }
                }
            }
        }
    })
}
