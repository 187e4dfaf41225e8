//! Version table operations

use crate::error::AiResult;
use crate::models::Version;
use sqlx::{Row, SqliteExecutor, SqlitePool};

pub async fn insert_version<'e, E>(executor: E, version: &Version) -> AiResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO versions (id, created_at, sample_count, notes)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&version.id)
    .bind(version.created_at)
    .bind(version.sample_count)
    .bind(&version.notes)
    .execute(executor)
    .await?;
    Ok(())
}

/// Record the final sample count of a version
pub async fn set_sample_count<'e, E>(executor: E, id: &str, sample_count: i64) -> AiResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE versions SET sample_count = ? WHERE id = ?")
        .bind(sample_count)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_all_versions<'e, E>(executor: E) -> AiResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("DELETE FROM versions").execute(executor).await?;
    Ok(())
}

pub async fn get_version(pool: &SqlitePool, id: &str) -> AiResult<Option<Version>> {
    let row = sqlx::query("SELECT id, created_at, sample_count, notes FROM versions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| {
        Ok(Version {
            id: r.try_get("id")?,
            created_at: r.try_get("created_at")?,
            sample_count: r.try_get("sample_count")?,
            notes: r.try_get("notes")?,
        })
    })
    .transpose()
}

/// All versions, oldest first
pub async fn list_versions(pool: &SqlitePool) -> AiResult<Vec<Version>> {
    let rows = sqlx::query(
        "SELECT id, created_at, sample_count, notes FROM versions ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| {
            Ok(Version {
                id: r.try_get("id")?,
                created_at: r.try_get("created_at")?,
                sample_count: r.try_get("sample_count")?,
                notes: r.try_get("notes")?,
            })
        })
        .collect()
}
