//! Knowledge base of approved samples
//!
//! Persistent, versioned store of samples and their embeddings. Feeds the
//! [`Retriever`](crate::services::retriever::Retriever) read path.
//!
//! # Concurrency
//! Writes (index, deindex, rebuild, create_version) are serialized through a
//! single writer mutex that also owns the id of the currently open version.
//! Reads go straight to the pool and may miss a write in progress.
//!
//! # Versions
//! Indexed samples are tagged with the open version, which is created on the
//! first write. `rebuild` opens a fresh version and finalizes it with the
//! number of successfully indexed samples; `create_version` records a
//! snapshot of the current sample count.
//!
//! # Progress
//! `rebuild_with_progress` sends a [`RebuildProgress`] after every sample.
//! A closed receiver is ignored.

use crate::db;
use crate::error::{AiError, AiResult};
use crate::models::{Embedding, Sample, Version};
use crate::services::embedding::EmbeddingClient;
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub version_id: String,
    pub indexed: usize,
    pub failed: usize,
}

/// Rebuild position after one more sample was embedded or skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildProgress {
    pub processed: usize,
    pub total: usize,
    pub indexed: usize,
    pub failed: usize,
}

pub struct KnowledgeBase {
    pool: SqlitePool,
    embedder: EmbeddingClient,
    /// Writer lock; holds the open version id
    writer: Mutex<Option<String>>,
    max_lock_wait_ms: u64,
}

impl KnowledgeBase {
    pub fn new(pool: SqlitePool, embedder: EmbeddingClient) -> Self {
        Self {
            pool,
            embedder,
            writer: Mutex::new(None),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    /// Embed and store a sample under the open version
    ///
    /// Returns `Ok(false)` without touching the store when the sample
    /// cannot be embedded.
    pub async fn index_sample(&self, sample: &Sample, cancel: &CancellationToken) -> AiResult<bool> {
        let vector = match self.embedder.embed(&sample.description, cancel).await? {
            Some(v) => v,
            None => {
                warn!(sample_id = %sample.id, "Sample not indexed: no embedding");
                return Ok(false);
            }
        };

        let mut open_version = self.writer.lock().await;
        let version_id = self.open_version(&mut open_version).await?;
        self.store(sample, vector, &version_id).await?;

        debug!(sample_id = %sample.id, code = %sample.code, version_id = %version_id, "Sample indexed");
        Ok(true)
    }

    /// Remove a sample and its embedding; missing ids are not an error
    pub async fn deindex_sample(&self, sample_id: &str) -> AiResult<()> {
        let _guard = self.writer.lock().await;
        let pool = &self.pool;

        retry_on_lock("deindex sample", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;
            db::embeddings::delete_embedding(&mut *tx, sample_id).await?;
            db::samples::delete_sample(&mut *tx, sample_id).await?;
            tx.commit().await?;
            Ok::<(), AiError>(())
        })
        .await?;

        debug!(sample_id, "Sample deindexed");
        Ok(())
    }

    /// Clear the store and index `samples` sequentially under a new version
    ///
    /// Cancellation is checked between samples; a cancelled rebuild returns
    /// `Err(Cancelled)` and leaves its version unfinalized.
    pub async fn rebuild(
        &self,
        samples: &[Sample],
        cancel: &CancellationToken,
    ) -> AiResult<RebuildReport> {
        self.rebuild_with_progress(samples, cancel, None).await
    }

    /// [`rebuild`](Self::rebuild) reporting per-sample progress on `progress`
    pub async fn rebuild_with_progress(
        &self,
        samples: &[Sample],
        cancel: &CancellationToken,
        progress: Option<&mpsc::Sender<RebuildProgress>>,
    ) -> AiResult<RebuildReport> {
        let mut open_version = self.writer.lock().await;

        info!(samples = samples.len(), "Rebuilding knowledge base");

        let pool = &self.pool;
        retry_on_lock("clear knowledge base", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;
            db::embeddings::delete_all_embeddings(&mut *tx).await?;
            db::samples::delete_all_samples(&mut *tx).await?;
            db::versions::delete_all_versions(&mut *tx).await?;
            tx.commit().await?;
            Ok::<(), AiError>(())
        })
        .await?;

        *open_version = None;
        let version_id = self.open_version(&mut open_version).await?;

        let mut indexed = 0usize;
        let mut failed = 0usize;
        for sample in samples {
            if cancel.is_cancelled() {
                info!(indexed, remaining = samples.len() - indexed - failed, "Rebuild cancelled");
                return Err(AiError::Cancelled);
            }

            match self.embedder.embed(&sample.description, cancel).await? {
                Some(vector) => {
                    self.store(sample, vector, &version_id).await?;
                    indexed += 1;
                }
                None => {
                    warn!(sample_id = %sample.id, "Sample skipped during rebuild: no embedding");
                    failed += 1;
                }
            }

            let step = RebuildProgress {
                processed: indexed + failed,
                total: samples.len(),
                indexed,
                failed,
            };
            debug!(processed = step.processed, total = step.total, "Rebuild progress");
            if let Some(tx) = progress {
                let _ = tx.send(step).await;
            }
        }

        let finalized_id = version_id.as_str();
        retry_on_lock("finalize version", self.max_lock_wait_ms, || {
            db::versions::set_sample_count(pool, finalized_id, indexed as i64)
        })
        .await?;
        *open_version = None;

        info!(version_id = %version_id, indexed, failed, "Knowledge base rebuilt");
        Ok(RebuildReport {
            version_id,
            indexed,
            failed,
        })
    }

    /// Record a snapshot of the current sample count
    pub async fn create_version(&self, notes: &str) -> AiResult<Version> {
        let _guard = self.writer.lock().await;

        let version = Version {
            id: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now(),
            sample_count: db::samples::count_samples(&self.pool).await?,
            notes: notes.to_string(),
        };

        let (pool, snapshot) = (&self.pool, &version);
        retry_on_lock("create version", self.max_lock_wait_ms, || {
            db::versions::insert_version(pool, snapshot)
        })
        .await?;

        info!(version_id = %version.id, sample_count = version.sample_count, "Version created");
        Ok(version)
    }

    pub async fn is_indexed(&self, sample_id: &str) -> AiResult<bool> {
        db::samples::sample_exists(&self.pool, sample_id).await
    }

    pub async fn count(&self) -> AiResult<i64> {
        db::samples::count_samples(&self.pool).await
    }

    pub async fn get_sample(&self, sample_id: &str) -> AiResult<Option<Sample>> {
        db::samples::get_sample(&self.pool, sample_id).await
    }

    /// All versions, oldest first
    pub async fn versions(&self) -> AiResult<Vec<Version>> {
        db::versions::list_versions(&self.pool).await
    }

    pub async fn version(&self, version_id: &str) -> AiResult<Option<Version>> {
        db::versions::get_version(&self.pool, version_id).await
    }

    /// Id of the open version, creating it if needed. Caller holds the writer lock.
    async fn open_version(&self, open_version: &mut Option<String>) -> AiResult<String> {
        if let Some(id) = open_version.as_ref() {
            return Ok(id.clone());
        }

        let version = Version {
            id: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now(),
            sample_count: 0,
            notes: String::new(),
        };
        let (pool, opened) = (&self.pool, &version);
        retry_on_lock("open version", self.max_lock_wait_ms, || {
            db::versions::insert_version(pool, opened)
        })
        .await?;

        debug!(version_id = %version.id, "Opened knowledge base version");
        *open_version = Some(version.id.clone());
        Ok(version.id)
    }

    /// Upsert sample and embedding in one transaction. Caller holds the writer lock.
    async fn store(&self, sample: &Sample, vector: Vec<f32>, version_id: &str) -> AiResult<()> {
        let embedding = Embedding {
            sample_id: sample.id.clone(),
            model: self.embedder.model_name().to_string(),
            vector,
            created_at: Utc::now(),
        };

        let (pool, embedding) = (&self.pool, &embedding);
        retry_on_lock("index sample", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;
            db::samples::upsert_sample(&mut *tx, sample, version_id).await?;
            db::embeddings::upsert_embedding(&mut *tx, embedding).await?;
            tx.commit().await?;
            Ok::<(), AiError>(())
        })
        .await
    }
}
