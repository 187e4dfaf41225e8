//! Knowledge base records: samples, embeddings and version snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Approved training example stored in the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    pub case_id: String,
    pub code: String,
    /// Free-text defect description (the text that gets embedded)
    pub description: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub is_range_defect: bool,
    /// Path or identifier of the frame image
    #[serde(default)]
    pub frame_ref: String,
    pub exported_at: DateTime<Utc>,
    /// Version the sample was indexed under (set by the knowledge base)
    #[serde(default)]
    pub version_id: Option<String>,
}

/// Stored vector for one sample
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub sample_id: String,
    pub model: String,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot marker over the knowledge base contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub sample_count: i64,
    pub notes: String,
}

/// Encode a vector as little-endian f32 bytes
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode little-endian f32 bytes; `None` when the length is not a multiple of 4
pub fn blob_to_vector(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
