//! Embedding table operations
//!
//! Vectors are stored as little-endian f32 blobs.

use crate::error::AiResult;
use crate::models::{vector_to_blob, Embedding};
use sqlx::{Row, SqliteExecutor, SqlitePool};

/// Stored vector as read back from the table, not yet decoded
#[derive(Debug, Clone)]
pub struct StoredVector {
    pub sample_id: String,
    pub model: String,
    pub blob: Vec<u8>,
}

pub async fn upsert_embedding<'e, E>(executor: E, embedding: &Embedding) -> AiResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO embeddings (sample_id, model, vector, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(sample_id) DO UPDATE SET
            model = excluded.model,
            vector = excluded.vector,
            created_at = excluded.created_at
        "#,
    )
    .bind(&embedding.sample_id)
    .bind(&embedding.model)
    .bind(vector_to_blob(&embedding.vector))
    .bind(embedding.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn delete_embedding<'e, E>(executor: E, sample_id: &str) -> AiResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("DELETE FROM embeddings WHERE sample_id = ?")
        .bind(sample_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_all_embeddings<'e, E>(executor: E) -> AiResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("DELETE FROM embeddings").execute(executor).await?;
    Ok(())
}

/// Load every stored vector for a similarity scan
pub async fn load_all_vectors(pool: &SqlitePool) -> AiResult<Vec<StoredVector>> {
    let rows = sqlx::query("SELECT sample_id, model, vector FROM embeddings")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(StoredVector {
                sample_id: row.try_get("sample_id")?,
                model: row.try_get("model")?,
                blob: row.try_get("vector")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use crate::models::blob_to_vector;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_and_load_vectors() {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("kb.db")).await.unwrap();

        let embedding = Embedding {
            sample_id: "s1".to_string(),
            model: "mxbai-embed-large".to_string(),
            vector: vec![0.25, -0.5, 1.0],
            created_at: Utc::now(),
        };
        upsert_embedding(&pool, &embedding).await.unwrap();

        let stored = load_all_vectors(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].model, "mxbai-embed-large");
        assert_eq!(blob_to_vector(&stored[0].blob), Some(vec![0.25, -0.5, 1.0]));

        delete_embedding(&pool, "s1").await.unwrap();
        assert!(load_all_vectors(&pool).await.unwrap().is_empty());
    }
}
