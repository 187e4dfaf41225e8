//! pipescan-ai library interface
//!
//! Sewer inspection frame analysis: vision detection, few-shot code
//! classification against a knowledge base of approved samples, rule
//! checks, merging and evaluation against ground truth.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod fusion;
pub mod models;
pub mod services;
pub mod types;
pub mod utils;
pub mod validators;
pub mod workflow;

pub use crate::error::{AiError, AiResult};

use crate::catalog::CodeCatalog;
use crate::config::AiConfig;
use crate::services::{
    Classifier, EmbeddingClient, KnowledgeBase, OllamaClient, Retriever, VisionDetector,
};
use crate::types::{ChatBackend, EmbeddingBackend};
use crate::workflow::{Pipeline, PipelineConfig};
use pipescan_common::config::RootFolderInitializer;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Components shared by every command
pub struct AppState {
    pub config: AiConfig,
    /// Knowledge base connection pool
    pub db: SqlitePool,
    pub catalog: Arc<CodeCatalog>,
    pub ollama: Arc<OllamaClient>,
    pub knowledge_base: Arc<KnowledgeBase>,
    pub retriever: Arc<Retriever>,
}

impl AppState {
    /// Create the root folder, open the knowledge base and load the catalog
    pub async fn initialize(config: AiConfig) -> AiResult<Self> {
        RootFolderInitializer::new(config.root_folder.clone()).ensure_directory_exists()?;
        if let Some(parent) = config.knowledge_base_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db = db::init_database_pool(&config.knowledge_base_path).await?;
        info!(path = %config.knowledge_base_path.display(), "Knowledge base opened");

        let catalog = Arc::new(CodeCatalog::load_or_builtin(config.catalog_path.as_deref())?);
        info!(codes = catalog.len(), "Code catalog loaded");

        let ollama = Arc::new(OllamaClient::new(config.ollama.clone())?);
        let embedding_backend: Arc<dyn EmbeddingBackend> = ollama.clone();
        let embedder = EmbeddingClient::new(embedding_backend);

        Ok(Self {
            knowledge_base: Arc::new(KnowledgeBase::new(db.clone(), embedder.clone())),
            retriever: Arc::new(Retriever::new(db.clone(), embedder)),
            config,
            db,
            catalog,
            ollama,
        })
    }

    /// Frame pipeline wired to the model service and knowledge base
    pub fn build_pipeline(&self) -> Pipeline {
        let chat: Arc<dyn ChatBackend> = self.ollama.clone();
        let settings = &self.config.ollama;

        let detector = VisionDetector::new(chat.clone(), settings.vision_model.clone());
        let classifier = Classifier::new(chat, settings.text_model.clone(), self.catalog.clone())
            .with_retriever(self.retriever.clone(), self.config.analysis.few_shot_k);

        Pipeline::new(
            detector,
            classifier,
            self.catalog.clone(),
            PipelineConfig::from(&self.config.analysis),
        )
    }
}
