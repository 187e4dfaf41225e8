//! Classification (pipeline stage 2)
//!
//! Raw defect description + retrieved few-shot examples → text model with a
//! fixed output schema → structured [`Observation`].
//!
//! # Mapping Rules
//! - Unknown or blank code → discarded
//! - `start` ≤ 0 → position estimate of the frame
//! - `end` ≤ `start` → `end = start`
//! - Confidences clamped to [0, 1]
//! - Quantification only when both value and unit are present
//!
//! Any service or schema failure discards the description; only
//! cancellation is returned as an error.

use crate::catalog::CodeCatalog;
use crate::error::{AiError, AiResult};
use crate::models::{Characterization, ConfidenceScore, Observation, Quantification};
use crate::services::retriever::{RetrievalResult, Retriever, DEFAULT_TOP_K};
use crate::types::{ChatBackend, ChatMessage, ServiceError};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Answer shape requested from the text model
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ClassificationAnswer {
    vsa_code: String,
    characterization: Option<String>,
    label: String,
    text: String,
    meter_start: f64,
    meter_end: f64,
    is_streckenschaden: bool,
    quant_value: Option<f64>,
    quant_unit: Option<String>,
    quant_type: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    clock_position: Option<String>,
    detection_conf: f64,
    classification_conf: f64,
    quantification_conf: f64,
    evidence: Option<String>,
}

/// Models answer clock positions both as "3" and 3
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub struct Classifier {
    backend: Arc<dyn ChatBackend>,
    model: String,
    catalog: Arc<CodeCatalog>,
    retriever: Option<Arc<Retriever>>,
    few_shot_k: usize,
    system_prompt: String,
    schema: serde_json::Value,
}

impl Classifier {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
        catalog: Arc<CodeCatalog>,
    ) -> Self {
        let system_prompt = format!(
            "You are an expert in sewer pipe inspection according to the VSA standard \
             (EN 13508-2). Assign the defect description to a VSA code and write the \
             normative protocol text. Answer ONLY in the given JSON format. \
             Valid VSA codes: {}.",
            catalog.code_list()
        );

        Self {
            backend,
            model: model.into(),
            catalog,
            retriever: None,
            few_shot_k: DEFAULT_TOP_K,
            system_prompt,
            schema: classification_schema(),
        }
    }

    /// Use `retriever` for few-shot examples (zero-shot without one)
    pub fn with_retriever(mut self, retriever: Arc<Retriever>, few_shot_k: usize) -> Self {
        self.retriever = Some(retriever);
        self.few_shot_k = few_shot_k;
        self
    }

    /// Classify one raw description observed around `position` (meters)
    pub async fn classify(
        &self,
        description: &str,
        position: f64,
        cancel: &CancellationToken,
    ) -> AiResult<Option<Observation>> {
        let description = description.trim();
        if description.is_empty() {
            return Ok(None);
        }

        let examples = match &self.retriever {
            Some(retriever) => retriever.retrieve(description, self.few_shot_k, cancel).await?,
            None => Vec::new(),
        };

        let messages = [
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(build_user_prompt(description, position, &examples)),
        ];

        let answer = match self
            .backend
            .chat_structured(&self.model, &messages, &self.schema, cancel)
            .await
        {
            Ok(value) => value,
            Err(ServiceError::Cancelled) => return Err(AiError::Cancelled),
            Err(e) => {
                warn!(position, error = %e, "Classification failed");
                return Ok(None);
            }
        };

        let answer: ClassificationAnswer = match serde_json::from_value(answer) {
            Ok(a) => a,
            Err(e) => {
                warn!(position, error = %e, "Classification answer does not match schema");
                return Ok(None);
            }
        };

        let observation = map_to_observation(answer, position, &self.catalog);
        match &observation {
            Some(obs) => debug!(
                code = %obs.code,
                start = obs.start,
                end = obs.end,
                examples = examples.len(),
                "Description classified"
            ),
            None => debug!(position, "Classification discarded (unknown code)"),
        }
        Ok(observation)
    }
}

fn build_user_prompt(description: &str, position: f64, examples: &[RetrievalResult]) -> String {
    let mut prompt = String::new();

    if !examples.is_empty() {
        prompt.push_str("--- Similar examples ---\n");
        for example in examples {
            let _ = writeln!(prompt, "Description: {}", example.sample.description);
            let _ = writeln!(prompt, "Code: {}", example.sample.code);
            prompt.push('\n');
        }
    }

    prompt.push_str("--- New observation ---\n");
    let _ = writeln!(prompt, "Position: {:.2} m", position);
    let _ = writeln!(prompt, "Description: {}", description);
    prompt
}

fn map_to_observation(
    answer: ClassificationAnswer,
    position: f64,
    catalog: &CodeCatalog,
) -> Option<Observation> {
    let info = catalog.get(&answer.vsa_code)?;
    let code = answer.vsa_code.trim().to_ascii_uppercase();

    let quantification = match (answer.quant_value, non_blank(answer.quant_unit)) {
        (Some(value), Some(unit)) => Some(Quantification {
            value,
            unit,
            quant_type: non_blank(answer.quant_type).unwrap_or_else(|| info.label.clone()),
            clock_position: non_blank(answer.clock_position),
        }),
        _ => None,
    };

    let characterization = non_blank(answer.characterization).and_then(|raw| {
        let parsed = Characterization::parse(&raw);
        if parsed.is_none() {
            debug!(code = %code, value = %raw, "Ignoring unknown characterization");
        }
        parsed
    });

    let start = if answer.meter_start > 0.0 {
        answer.meter_start
    } else {
        position
    };
    let end = if answer.meter_end > start {
        answer.meter_end
    } else {
        start
    };

    let mut observation = Observation::new(
        code,
        start,
        ConfidenceScore::new(
            answer.detection_conf,
            answer.classification_conf,
            answer.quantification_conf,
        ),
    )
    .with_quantification(quantification)
    .with_characterization(characterization);

    observation.end = end;
    observation.is_range_defect = answer.is_streckenschaden;
    observation.label = non_blank(Some(answer.label)).unwrap_or_else(|| info.label.clone());
    observation.text = non_blank(Some(answer.text)).unwrap_or_else(|| info.label.clone());
    observation.evidence = answer.evidence.unwrap_or_default();
    Some(observation)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn classification_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["vsaCode", "label", "text", "meterStart", "meterEnd",
                     "detectionConf", "classificationConf", "quantificationConf"],
        "properties": {
            "vsaCode": { "type": "string" },
            "characterization": { "type": "string" },
            "label": { "type": "string" },
            "text": { "type": "string" },
            "meterStart": { "type": "number" },
            "meterEnd": { "type": "number" },
            "isStreckenschaden": { "type": "boolean" },
            "quantValue": { "type": "number" },
            "quantUnit": { "type": "string" },
            "quantType": { "type": "string" },
            "clockPosition": { "type": "string" },
            "detectionConf": { "type": "number" },
            "classificationConf": { "type": "number" },
            "quantificationConf": { "type": "number" },
            "evidence": { "type": "string" }
        }
    })
}
