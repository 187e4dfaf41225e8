//! Knowledge base database access
//!
//! Single SQLite file with three tables: `samples`, `embeddings` and
//! `versions`. The file is checked with `PRAGMA integrity_check` when it is
//! opened; a corrupt file is deleted and recreated empty instead of failing
//! startup.

pub mod embeddings;
pub mod samples;
pub mod versions;

use crate::error::AiResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};

/// Open (or create) the knowledge base database
pub async fn init_database_pool(db_path: &Path) -> AiResult<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = if db_path.exists() {
        match open_checked(db_path).await {
            Ok(pool) => pool,
            Err(reason) => {
                error!(
                    path = %db_path.display(),
                    reason = %reason,
                    "Knowledge base is corrupt, resetting to an empty store"
                );
                remove_database_files(db_path)?;
                connect(db_path).await?
            }
        }
    } else {
        connect(db_path).await?
    };

    init_tables(&pool).await?;
    Ok(pool)
}

async fn connect(db_path: &Path) -> AiResult<SqlitePool> {
    debug!("Connecting to database: {}", db_path.display());

    // WAL lets retrieval scans read while a writer is active
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Open an existing file; any failure to open or verify it counts as corruption
async fn open_checked(db_path: &Path) -> Result<SqlitePool, String> {
    let pool = connect(db_path).await.map_err(|e| e.to_string())?;
    if let Err(reason) = check_integrity(&pool).await {
        pool.close().await;
        return Err(reason);
    }
    Ok(pool)
}

/// Run `PRAGMA integrity_check`; any error or non-"ok" answer counts as corrupt
async fn check_integrity(pool: &SqlitePool) -> Result<(), String> {
    match sqlx::query_scalar::<_, String>("PRAGMA integrity_check")
        .fetch_one(pool)
        .await
    {
        Ok(answer) if answer.eq_ignore_ascii_case("ok") => Ok(()),
        Ok(answer) => Err(answer),
        Err(e) => Err(e.to_string()),
    }
}

fn remove_database_files(db_path: &Path) -> std::io::Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        let path = std::path::PathBuf::from(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Create knowledge base tables if they don't exist
async fn init_tables(pool: &SqlitePool) -> AiResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
            id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL,
            code TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            position_start REAL NOT NULL DEFAULT 0,
            position_end REAL NOT NULL DEFAULT 0,
            is_range INTEGER NOT NULL DEFAULT 0,
            frame_ref TEXT NOT NULL DEFAULT '',
            exported_at TEXT NOT NULL,
            version_id TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            sample_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            vector BLOB NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versions (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            sample_count INTEGER NOT NULL DEFAULT 0,
            notes TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_samples_code ON samples(code)")
        .execute(pool)
        .await?;

    info!("Knowledge base tables initialized (samples, embeddings, versions)");
    Ok(())
}
