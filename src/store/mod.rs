//! Persisted job/chunk records.
//!
//! The engine treats the store as externally owned: it only issues
//! well-defined updates (status, byte counters) and re-reads records as the
//! single source of truth for resumability. [`JobStore`] is the boundary
//! contract; [`SqliteStore`] is the implementation the binary wires in.
//!
//! # Example
//!
//! ```no_run
//! use fetchkit::store::{Database, SqliteStore};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("fetchkit.db")).await?;
//! let store = SqliteStore::new(db);
//! # let _ = store;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

use crate::classify::UrlCategory;
use crate::engine::ChunkSpec;
use crate::job::{Chunk, ChunkStatus, Job, JobStatus};

/// Maximum pool connections. Kept low: SQLite uses file-level locking.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in milliseconds.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Store-related errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database connectivity or query failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// No job exists with the given external token.
    #[error("job not found: {job_id}")]
    JobNotFound {
        /// The unknown external token.
        job_id: String,
    },
}

/// Database connection wrapper with connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `db_path`.
    ///
    /// Enables WAL mode for concurrent readers, sets a busy timeout, and
    /// runs pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on connection or migration failure.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(&db_url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query(&format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS}"))
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates an in-memory database for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on connection or migration failure.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Fields for a newly submitted job.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// External job token.
    pub job_id: String,
    /// Owning user reference.
    pub owner_id: i64,
    /// Normalized source URL.
    pub url: String,
    /// Provider category.
    pub category: UrlCategory,
    /// Bound handler name.
    pub handler_name: String,
}

/// Metadata learned during info resolution, written before the transfer.
#[derive(Debug, Clone)]
pub struct ResolvedJobInfo {
    /// Target filename.
    pub filename: String,
    /// Declared total size when known.
    pub total_size: Option<u64>,
    /// MIME type when declared.
    pub mime_type: Option<String>,
}

/// Boundary contract for job/chunk persistence.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new pending job and returns the stored record.
    async fn insert_job(&self, new: &NewJob) -> Result<Job, StoreError>;

    /// Fetches a job by external token.
    async fn job(&self, job_id: &str) -> Result<Job, StoreError>;

    /// Lists jobs for an owner, newest first, optionally filtered by status.
    async fn jobs_for_owner(
        &self,
        owner_id: i64,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, StoreError>;

    /// Sets a job's status; clears or records error detail as given.
    async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Records resolved target metadata on the job and stamps `started_at`.
    async fn record_resolved(&self, job_id: &str, info: &ResolvedJobInfo)
        -> Result<(), StoreError>;

    /// Updates live progress counters.
    async fn update_progress(
        &self,
        job_id: &str,
        downloaded_bytes: u64,
        progress: f64,
        speed_bps: Option<u64>,
        eta_seconds: Option<u64>,
    ) -> Result<(), StoreError>;

    /// Marks a job completed with its final artifact path and size.
    async fn record_completed(
        &self,
        job_id: &str,
        save_path: &str,
        total_bytes: u64,
    ) -> Result<(), StoreError>;

    /// Inserts planned chunk records for a job.
    async fn insert_chunks(
        &self,
        job_pk: i64,
        specs: &[ChunkSpec],
        temp_paths: &[String],
    ) -> Result<Vec<Chunk>, StoreError>;

    /// Fetches a job's chunk records ordered by index.
    async fn chunks(&self, job_pk: i64) -> Result<Vec<Chunk>, StoreError>;

    /// Updates a chunk's byte counter.
    async fn update_chunk_progress(&self, chunk_id: i64, downloaded_bytes: u64)
        -> Result<(), StoreError>;

    /// Updates a chunk's status.
    async fn set_chunk_status(&self, chunk_id: i64, status: ChunkStatus) -> Result<(), StoreError>;

    /// Deletes all chunk records for a job (after merge or cancel).
    async fn delete_chunks(&self, job_pk: i64) -> Result<(), StoreError>;
}

/// SQLite-backed [`JobStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Creates the store over an opened database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    #[instrument(skip(self, new), fields(job_id = %new.job_id))]
    async fn insert_job(&self, new: &NewJob) -> Result<Job, StoreError> {
        sqlx::query(
            "INSERT INTO jobs (job_id, owner_id, url, category, handler_name) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&new.job_id)
        .bind(new.owner_id)
        .bind(&new.url)
        .bind(new.category.as_str())
        .bind(&new.handler_name)
        .execute(self.pool())
        .await?;

        self.job(&new.job_id).await
    }

    async fn job(&self, job_id: &str) -> Result<Job, StoreError> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    async fn jobs_for_owner(
        &self,
        owner_id: i64,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, StoreError> {
        let jobs = match status {
            Some(status) => {
                sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE owner_id = ? AND status = ? ORDER BY id DESC",
                )
                .bind(owner_id)
                .bind(status.as_str())
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE owner_id = ? ORDER BY id DESC",
                )
                .bind(owner_id)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let completed_stamp = matches!(
            status,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        );
        let query = if completed_stamp {
            "UPDATE jobs SET status = ?, error_message = ?, completed_at = datetime('now') \
             WHERE job_id = ?"
        } else {
            "UPDATE jobs SET status = ?, error_message = ? WHERE job_id = ?"
        };
        let result = sqlx::query(query)
            .bind(status.as_str())
            .bind(error_message)
            .bind(job_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound {
                job_id: job_id.to_string(),
            });
        }
        Ok(())
    }

    async fn record_resolved(
        &self,
        job_id: &str,
        info: &ResolvedJobInfo,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE jobs SET filename = ?, total_size = ?, mime_type = ?, \
             started_at = datetime('now') WHERE job_id = ?",
        )
        .bind(&info.filename)
        .bind(info.total_size.map(|s| i64::try_from(s).unwrap_or(i64::MAX)))
        .bind(&info.mime_type)
        .bind(job_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn update_progress(
        &self,
        job_id: &str,
        downloaded_bytes: u64,
        progress: f64,
        speed_bps: Option<u64>,
        eta_seconds: Option<u64>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE jobs SET downloaded_bytes = ?, progress = ?, speed_bps = ?, \
             eta_seconds = ? WHERE job_id = ?",
        )
        .bind(i64::try_from(downloaded_bytes).unwrap_or(i64::MAX))
        .bind(progress)
        .bind(speed_bps.map(|s| i64::try_from(s).unwrap_or(i64::MAX)))
        .bind(eta_seconds.map(|s| i64::try_from(s).unwrap_or(i64::MAX)))
        .bind(job_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_completed(
        &self,
        job_id: &str,
        save_path: &str,
        total_bytes: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', progress = 100.0, \
             downloaded_bytes = ?, total_size = ?, save_path = ?, error_message = NULL, \
             completed_at = datetime('now') WHERE job_id = ?",
        )
        .bind(i64::try_from(total_bytes).unwrap_or(i64::MAX))
        .bind(i64::try_from(total_bytes).unwrap_or(i64::MAX))
        .bind(save_path)
        .bind(job_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn insert_chunks(
        &self,
        job_pk: i64,
        specs: &[ChunkSpec],
        temp_paths: &[String],
    ) -> Result<Vec<Chunk>, StoreError> {
        let mut tx = self.pool().begin().await?;
        for (spec, temp_path) in specs.iter().zip(temp_paths) {
            sqlx::query(
                "INSERT INTO chunks (job_pk, chunk_index, start_byte, end_byte, temp_path) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(job_pk)
            .bind(i64::from(spec.index))
            .bind(i64::try_from(spec.start).unwrap_or(i64::MAX))
            .bind(i64::try_from(spec.end).unwrap_or(i64::MAX))
            .bind(temp_path)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.chunks(job_pk).await
    }

    async fn chunks(&self, job_pk: i64) -> Result<Vec<Chunk>, StoreError> {
        let chunks = sqlx::query_as::<_, Chunk>(
            "SELECT * FROM chunks WHERE job_pk = ? ORDER BY chunk_index ASC",
        )
        .bind(job_pk)
        .fetch_all(self.pool())
        .await?;
        Ok(chunks)
    }

    async fn update_chunk_progress(
        &self,
        chunk_id: i64,
        downloaded_bytes: u64,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE chunks SET downloaded_bytes = ? WHERE id = ?")
            .bind(i64::try_from(downloaded_bytes).unwrap_or(i64::MAX))
            .bind(chunk_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn set_chunk_status(&self, chunk_id: i64, status: ChunkStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE chunks SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chunk_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn delete_chunks(&self, job_pk: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM chunks WHERE job_pk = ?")
            .bind(job_pk)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
