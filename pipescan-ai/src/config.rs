//! Configuration resolution for pipescan-ai
//!
//! Provides multi-tier configuration resolution with ENV → TOML → compiled
//! default priority for the model-service settings. Everything else comes
//! from the bootstrap TOML (see `pipescan_common::config`).

use pipescan_common::config::{
    AnalysisSection, EvaluationSection, OllamaSection, RootFolderInitializer, RootFolderResolver,
    SamplingSection, TomlConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub const OLLAMA_URL_ENV: &str = "PIPESCAN_OLLAMA_URL";
pub const VISION_MODEL_ENV: &str = "PIPESCAN_VISION_MODEL";
pub const TEXT_MODEL_ENV: &str = "PIPESCAN_TEXT_MODEL";
pub const EMBED_MODEL_ENV: &str = "PIPESCAN_EMBED_MODEL";
pub const TIMEOUT_ENV: &str = "PIPESCAN_AI_TIMEOUT_SECS";

/// Resolved model-service settings
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaSettings {
    pub base_url: String,
    pub vision_model: String,
    pub text_model: String,
    pub embed_model: String,
    /// Per-call timeout
    pub timeout: Duration,
}

impl OllamaSettings {
    /// Settings from the TOML section only
    pub fn from_section(section: &OllamaSection) -> Self {
        Self {
            base_url: section.base_url.trim_end_matches('/').to_string(),
            vision_model: section.vision_model.clone(),
            text_model: section.text_model.clone(),
            embed_model: section.embed_model.clone(),
            timeout: Duration::from_secs(section.timeout_secs.max(1)),
        }
    }

    /// Apply overrides looked up through `lookup` (environment in production)
    ///
    /// Blank values are ignored. An unparseable timeout logs a warning and
    /// keeps the TOML value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_blank(OLLAMA_URL_ENV) {
            info!("Model service URL loaded from {}", OLLAMA_URL_ENV);
            self.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(model) = non_blank(VISION_MODEL_ENV) {
            self.vision_model = model.trim().to_string();
        }
        if let Some(model) = non_blank(TEXT_MODEL_ENV) {
            self.text_model = model.trim().to_string();
        }
        if let Some(model) = non_blank(EMBED_MODEL_ENV) {
            self.embed_model = model.trim().to_string();
        }
        if let Some(raw) = non_blank(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout = Duration::from_secs(secs),
                _ => warn!(
                    value = %raw,
                    "Ignoring invalid {}, keeping {}s",
                    TIMEOUT_ENV,
                    self.timeout.as_secs()
                ),
            }
        }
        self
    }

    /// ENV → TOML → defaults
    pub fn resolve(section: &OllamaSection) -> Self {
        Self::from_section(section).with_overrides(|key| std::env::var(key).ok())
    }
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self::from_section(&OllamaSection::default())
    }
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub root_folder: PathBuf,
    pub knowledge_base_path: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub ollama: OllamaSettings,
    pub analysis: AnalysisSection,
    pub sampling: SamplingSection,
    pub evaluation: EvaluationSection,
}

impl AiConfig {
    /// Resolve from the bootstrap TOML and an optional CLI root folder
    pub fn resolve(toml_config: &TomlConfig, cli_root: Option<PathBuf>) -> Self {
        let root_folder = RootFolderResolver::new("pipescan-ai")
            .with_cli_arg(cli_root)
            .with_toml(toml_config)
            .resolve();

        let knowledge_base_path = toml_config.knowledge_base.path.clone().unwrap_or_else(|| {
            RootFolderInitializer::new(root_folder.clone()).knowledge_base_path()
        });

        Self {
            knowledge_base_path,
            catalog_path: toml_config.knowledge_base.catalog_path.clone(),
            ollama: OllamaSettings::resolve(&toml_config.ollama),
            analysis: toml_config.analysis.clone(),
            sampling: toml_config.sampling.clone(),
            evaluation: toml_config.evaluation.clone(),
            root_folder,
        }
    }
}
