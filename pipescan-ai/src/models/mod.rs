//! Data models for pipescan-ai

pub mod ground_truth;
pub mod observation;
pub mod sample;

pub use ground_truth::GroundTruthEntry;
pub use observation::{
    ApprovalState, Characterization, ConfidenceScore, Observation, Quantification,
    RANGE_DEFECT_MIN_LENGTH,
};
pub use sample::{blob_to_vector, vector_to_blob, Embedding, Sample, Version};
