//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Every section and key is
//! optional: a missing file or a missing key falls back to compiled defaults
//! and never aborts startup.
//!
//! # Root Folder Priority
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `PIPESCAN_ROOT_FOLDER`
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "PIPESCAN_ROOT_FOLDER";

/// Knowledge base database file inside the root folder
const KNOWLEDGE_BASE_FILE: &str = "knowledge_base.db";

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
        }
    }
}

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder for the knowledge base and generated artifacts
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub ollama: OllamaSection,
    pub knowledge_base: KnowledgeBaseSection,
    pub analysis: AnalysisSection,
    pub sampling: SamplingSection,
    pub evaluation: EvaluationSection,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Model service endpoint and model names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSection {
    pub base_url: String,
    pub vision_model: String,
    pub text_model: String,
    pub embed_model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            vision_model: "qwen2.5vl:7b".to_string(),
            text_model: "qwen2.5:14b".to_string(),
            embed_model: "mxbai-embed-large".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Knowledge base and catalog locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseSection {
    /// Database file (defaults to `<root>/knowledge_base.db`)
    pub path: Option<PathBuf>,
    /// Optional TOML code catalog replacing the built-in table
    pub catalog_path: Option<PathBuf>,
}

/// Frame analysis tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    /// Few-shot examples retrieved per description
    pub few_shot_k: usize,
    /// Position gap (meters) under which same-code observations merge
    pub merge_tolerance: f64,
    /// Frames processed concurrently (1 = strictly sequential)
    pub max_concurrent_frames: usize,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            few_shot_k: 3,
            merge_tolerance: 0.5,
            max_concurrent_frames: 1,
        }
    }
}

/// Training sample generation tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSection {
    /// Points generated across a range defect
    pub range_sample_count: usize,
    /// Minimum range length (meters) before range sampling kicks in
    pub min_range_length: f64,
    /// Timeline/linear position delta (meters) that counts as a mismatch
    pub mismatch_threshold: f64,
}

impl Default for SamplingSection {
    fn default() -> Self {
        Self {
            range_sample_count: 5,
            min_range_length: 0.5,
            mismatch_threshold: 0.5,
        }
    }
}

/// Evaluation tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSection {
    /// Position tolerance (meters) around a ground truth interval
    pub position_tolerance: f64,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self {
            position_tolerance: 1.0,
        }
    }
}

/// Where the bootstrap configuration came from
///
/// Callers report it with [`ConfigSource::log`] after tracing is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// File does not exist; compiled defaults
    Missing(PathBuf),
    /// File exists but could not be read or parsed; compiled defaults
    Invalid { path: PathBuf, reason: String },
    /// No path given and no OS config directory; compiled defaults
    NoConfigDir,
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigSource::Missing(path) => {
                info!("Config file {} not found, using compiled defaults", path.display())
            }
            ConfigSource::Invalid { reason, .. } => warn!("{}; using compiled defaults", reason),
            ConfigSource::NoConfigDir => {
                warn!("No config directory available, using compiled defaults")
            }
        }
    }
}

/// Load TOML configuration from a file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::config(path, e))?;
    toml::from_str(&content).map_err(|e| Error::config(path, e))
}

/// Load TOML configuration, falling back to defaults on any problem
pub fn load_or_default(path: Option<&Path>) -> (TomlConfig, ConfigSource) {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => return (TomlConfig::default(), ConfigSource::NoConfigDir),
    };

    if !path.exists() {
        return (TomlConfig::default(), ConfigSource::Missing(path));
    }

    match load_toml_config(&path) {
        Ok(config) => (config, ConfigSource::File(path)),
        Err(e) => (
            TomlConfig::default(),
            ConfigSource::Invalid {
                path,
                reason: e.to_string(),
            },
        ),
    }
}

/// Write TOML configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).map_err(|e| Error::config(path, e))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Default configuration file path (`<config dir>/pipescan/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pipescan").join("config.toml"))
}

/// Resolves the root folder following the documented priority order
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!(module = %self.module_name, "Root folder from {}", ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            debug!(module = %self.module_name, "Root folder from TOML config");
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and derives well-known paths inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder {}", self.root_folder.display());
            std::fs::create_dir_all(&self.root_folder)?;
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn knowledge_base_path(&self) -> PathBuf {
        self.root_folder.join(KNOWLEDGE_BASE_FILE)
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root_folder.join("frames")
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("pipescan"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\pipescan"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("pipescan"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/pipescan"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("pipescan"))
            .unwrap_or_else(|| PathBuf::from("./pipescan_data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert!(config.root_folder.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.analysis.few_shot_k, 3);
        assert_eq!(config.sampling.range_sample_count, 5);
        assert_eq!(config.evaluation.position_tolerance, 1.0);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [ollama]
            text_model = "llama3:8b"
            "#,
        )
        .unwrap();
        assert_eq!(config.ollama.text_model, "llama3:8b");
        assert_eq!(config.ollama.embed_model, "mxbai-embed-large");
        assert_eq!(config.ollama.timeout_secs, 120);
    }

    #[test]
    fn test_initializer_paths() {
        let init = RootFolderInitializer::new(PathBuf::from("/tmp/pipescan-root"));
        assert_eq!(
            init.knowledge_base_path(),
            PathBuf::from("/tmp/pipescan-root/knowledge_base.db")
        );
        assert_eq!(init.frames_dir(), PathBuf::from("/tmp/pipescan-root/frames"));
    }
}
