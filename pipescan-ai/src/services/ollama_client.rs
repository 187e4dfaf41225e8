//! Ollama-compatible model service client
//!
//! Endpoints used:
//! - `POST /api/chat` structured output (JSON schema in `format`, images in messages)
//! - `POST /api/embed` text embeddings
//! - `GET /api/tags` health check and installed models
//!
//! Every call is raced against the caller's cancellation token and the
//! configured timeout. Exceeding the timeout fails that call only.

use crate::config::OllamaSettings;
use crate::types::{ChatBackend, ChatMessage, EmbeddingBackend, ServiceError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = concat!("pipescan-ai/", env!("CARGO_PKG_VERSION"));
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    format: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

/// Result of a `/api/tags` probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthStatus {
    pub reachable: bool,
    pub models: Vec<String>,
    pub error: Option<String>,
}

impl HealthStatus {
    /// Case-insensitive prefix match ("qwen2.5vl" matches "qwen2.5vl:7b")
    pub fn is_model_available(&self, model: &str) -> bool {
        let wanted = model.to_ascii_lowercase();
        self.models
            .iter()
            .any(|m| m.to_ascii_lowercase().starts_with(&wanted))
    }
}

/// Model service client
pub struct OllamaClient {
    http_client: reqwest::Client,
    settings: OllamaSettings,
}

impl OllamaClient {
    pub fn new(settings: OllamaSettings) -> Result<Self, ServiceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            settings,
        })
    }

    pub fn settings(&self) -> &OllamaSettings {
        &self.settings
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url, path)
    }

    /// Probe `/api/tags`; never fails, unreachable services report `reachable = false`
    pub async fn health(&self) -> HealthStatus {
        let request = self.http_client.get(self.url("/api/tags")).send();
        let response = match tokio::time::timeout(HEALTH_TIMEOUT, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return unreachable_status(e.to_string()),
            Err(_) => return unreachable_status("timed out".to_string()),
        };

        if !response.status().is_success() {
            return unreachable_status(format!("HTTP {}", response.status().as_u16()));
        }

        match response.json::<TagsResponse>().await {
            Ok(tags) => HealthStatus {
                reachable: true,
                models: tags.models.into_iter().map(|m| m.name).collect(),
                error: None,
            },
            Err(e) => HealthStatus {
                reachable: true,
                models: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    /// True when a model whose name starts with `model` is installed
    pub async fn is_model_available(&self, model: &str) -> bool {
        self.health().await.is_model_available(model)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ServiceError> {
        let response = self
            .http_client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api(status.as_u16(), error_text));
        }
        Ok(response)
    }
}

fn unreachable_status(error: String) -> HealthStatus {
    HealthStatus {
        reachable: false,
        models: Vec::new(),
        error: Some(error),
    }
}

/// Run `call`, failing with `Cancelled` or `Timeout` if either fires first
pub async fn run_cancellable<T, F>(
    cancel: &CancellationToken,
    timeout: Duration,
    call: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(inner) => inner,
            Err(_) => Err(ServiceError::Timeout(timeout.as_secs())),
        },
    }
}

/// Extract the structured JSON answer from a chat response body
fn parse_chat_content(response: ChatResponse) -> Result<serde_json::Value, ServiceError> {
    let content = response
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| ServiceError::Parse("chat response without message.content".to_string()))?;

    if content.trim().is_empty() {
        return Err(ServiceError::Parse("chat response content is empty".to_string()));
    }

    serde_json::from_str(&content)
        .map_err(|e| ServiceError::Parse(format!("structured answer is not JSON: {}", e)))
}

#[async_trait::async_trait]
impl ChatBackend for OllamaClient {
    async fn chat_structured(
        &self,
        model: &str,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ServiceError> {
        let request = ChatRequest {
            model,
            messages,
            stream: false,
            format: schema,
        };

        tracing::debug!(model, messages = messages.len(), "Sending chat request");

        run_cancellable(cancel, self.settings.timeout, async {
            let response = self.post_json("/api/chat", &request).await?;
            let body: ChatResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::Parse(e.to_string()))?;
            parse_chat_content(body)
        })
        .await
    }
}

#[async_trait::async_trait]
impl EmbeddingBackend for OllamaClient {
    fn model_name(&self) -> &str {
        &self.settings.embed_model
    }

    async fn embed(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, ServiceError> {
        let request = EmbedRequest {
            model: &self.settings.embed_model,
            input: text,
        };

        run_cancellable(cancel, self.settings.timeout, async {
            let response = self.post_json("/api/embed", &request).await?;
            let body: EmbedResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::Parse(e.to_string()))?;
            body.embeddings
                .into_iter()
                .next()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ServiceError::Unavailable("empty embedding".to_string()))
        })
        .await
    }
}
