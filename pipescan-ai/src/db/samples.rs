//! Sample table operations

use crate::error::AiResult;
use crate::models::Sample;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};

/// Insert or overwrite a sample under `version_id`
pub async fn upsert_sample<'e, E>(executor: E, sample: &Sample, version_id: &str) -> AiResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO samples (
            id, case_id, code, description, position_start, position_end,
            is_range, frame_ref, exported_at, version_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            case_id = excluded.case_id,
            code = excluded.code,
            description = excluded.description,
            position_start = excluded.position_start,
            position_end = excluded.position_end,
            is_range = excluded.is_range,
            frame_ref = excluded.frame_ref,
            exported_at = excluded.exported_at,
            version_id = excluded.version_id
        "#,
    )
    .bind(&sample.id)
    .bind(&sample.case_id)
    .bind(&sample.code)
    .bind(&sample.description)
    .bind(sample.start)
    .bind(sample.end)
    .bind(sample.is_range_defect)
    .bind(&sample.frame_ref)
    .bind(sample.exported_at)
    .bind(version_id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Delete a sample; returns true if a row was removed
pub async fn delete_sample<'e, E>(executor: E, id: &str) -> AiResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM samples WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_all_samples<'e, E>(executor: E) -> AiResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("DELETE FROM samples").execute(executor).await?;
    Ok(())
}

/// Load a sample by id
pub async fn get_sample(pool: &SqlitePool, id: &str) -> AiResult<Option<Sample>> {
    let row = sqlx::query(
        r#"
        SELECT id, case_id, code, description, position_start, position_end,
               is_range, frame_ref, exported_at, version_id
        FROM samples
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| sample_from_row(&r)).transpose()
}

pub async fn sample_exists(pool: &SqlitePool, id: &str) -> AiResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM samples WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

pub async fn count_samples<'e, E>(executor: E) -> AiResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM samples")
        .fetch_one(executor)
        .await?;
    Ok(count)
}

fn sample_from_row(row: &SqliteRow) -> AiResult<Sample> {
    let exported_at: DateTime<Utc> = row.try_get("exported_at")?;
    Ok(Sample {
        id: row.try_get("id")?,
        case_id: row.try_get("case_id")?,
        code: row.try_get("code")?,
        description: row.try_get("description")?,
        start: row.try_get("position_start")?,
        end: row.try_get("position_end")?,
        is_range_defect: row.try_get("is_range")?,
        frame_ref: row.try_get("frame_ref")?,
        exported_at,
        version_id: Some(row.try_get("version_id")?),
    })
}
