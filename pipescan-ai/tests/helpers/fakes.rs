//! In-memory model backends

use async_trait::async_trait;
use pipescan_ai::types::{ChatBackend, ChatMessage, EmbeddingBackend, ServiceError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Keywords mapped to embedding dimensions
const KEYWORDS: &[&str] = &["crack", "root", "deposit", "joint", "deformation", "fracture"];

/// Embeds text as keyword counts; text containing "unembeddable" fails
pub struct KeywordEmbedder;

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .map(|k| lower.matches(k).count() as f32)
        .collect()
}

#[async_trait]
impl EmbeddingBackend for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>, ServiceError> {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        if text.contains("unembeddable") {
            return Err(ServiceError::Unavailable("no vector".to_string()));
        }
        Ok(keyword_vector(text))
    }
}

/// Classification answer for a description, keyed on keywords
pub fn classification_for(description: &str, position: f64) -> Value {
    let lower = description.to_lowercase();
    let (code, unit, value) = if lower.contains("crack") {
        ("BAB", "mm", 2.0)
    } else if lower.contains("deposit") {
        ("BCC", "%", 10.0)
    } else if lower.contains("percent fracture") {
        ("BAB", "%", 15.0)
    } else {
        ("ZZZ", "", 0.0)
    };

    let mut answer = json!({
        "vsaCode": code,
        "label": "",
        "text": description,
        "meterStart": position,
        "meterEnd": position,
        "isStreckenschaden": false,
        "detectionConf": 0.9,
        "classificationConf": 0.8,
        "quantificationConf": 0.7
    });
    if !unit.is_empty() {
        answer["quantValue"] = json!(value);
        answer["quantUnit"] = json!(unit);
    }
    if code == "BCC" {
        answer["characterization"] = json!("A");
    }
    answer
}

/// Vision model returns fixed descriptions; text model answers via
/// [`classification_for`]. Optionally cancels `cancel_after` calls in.
pub struct ScriptedChat {
    pub vision_model: String,
    pub descriptions: Vec<String>,
    pub calls: AtomicUsize,
    pub cancel_after: Option<(usize, CancellationToken)>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub fn new(descriptions: &[&str]) -> Self {
        Self {
            vision_model: "vision".to_string(),
            descriptions: descriptions.iter().map(|d| d.to_string()).collect(),
            calls: AtomicUsize::new(0),
            cancel_after: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn cancelling_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }
}

fn prompt_value<'a>(prompt: &'a str, key: &str) -> Option<&'a str> {
    prompt
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(key))
        .map(str::trim)
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn chat_structured(
        &self,
        model: &str,
        messages: &[ChatMessage],
        _schema: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if call > *limit {
                token.cancel();
            }
        }
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());

        if model == self.vision_model {
            let defects: Vec<Value> = self
                .descriptions
                .iter()
                .map(|d| json!({"description": d, "severity": "medium", "location": "crown"}))
                .collect();
            return Ok(json!({"hasDefects": !defects.is_empty(), "defects": defects}));
        }

        let description = prompt_value(&prompt, "Description:").unwrap_or_default();
        let position = prompt_value(&prompt, "Position:")
            .and_then(|p| p.trim_end_matches('m').trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        Ok(classification_for(description, position))
    }
}
