//! Service modules for frame analysis and the knowledge base
//!
//! External model access goes through [`crate::types::ChatBackend`] and
//! [`crate::types::EmbeddingBackend`]; [`OllamaClient`] implements both.

pub mod classifier;
pub mod embedding;
pub mod evaluator;
pub mod knowledge_base;
pub mod ollama_client;
pub mod retriever;
pub mod sample_generator;
pub mod timeline;
pub mod vision_detector;

pub use classifier::Classifier;
pub use embedding::{cosine_similarity, EmbeddingClient};
pub use evaluator::{CodeStats, EntryMatch, EvaluationReport, Evaluator};
pub use knowledge_base::{KnowledgeBase, RebuildProgress, RebuildReport};
pub use ollama_client::{HealthStatus, OllamaClient};
pub use retriever::{RetrievalResult, Retriever, DEFAULT_TOP_K};
pub use sample_generator::{
    GeneratedSample, GenerationContext, PositionSource, SampleGenerator,
};
pub use timeline::{Timeline, TimelinePoint};
pub use vision_detector::VisionDetector;
