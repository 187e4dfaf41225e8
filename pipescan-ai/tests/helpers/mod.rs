//! Shared test helpers

#![allow(dead_code)]

pub mod fakes;

use pipescan_ai::models::Sample;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Temporary knowledge base store
///
/// Returns (TempDir, SqlitePool); TempDir must be kept alive for the test.
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = pipescan_ai::db::init_database_pool(&temp_dir.path().join("kb.db"))
        .await
        .unwrap();
    (temp_dir, pool)
}

pub fn create_sample(id: &str, code: &str, description: &str) -> Sample {
    Sample {
        id: id.to_string(),
        case_id: "case-1".to_string(),
        code: code.to_string(),
        description: description.to_string(),
        start: 1.0,
        end: 1.0,
        is_range_defect: false,
        frame_ref: String::new(),
        exported_at: chrono::Utc::now(),
        version_id: None,
    }
}
