//! The concurrent chunked transfer engine.
//!
//! Given a resolved target and a job, the engine plans a chunk set (or a
//! single sequential stream), runs a semaphore-bounded worker pool fetching
//! ranges into per-chunk temp files, retries failed chunks with offset
//! truncation, and merges completed chunks into the final artifact in
//! strict index order. Cancellation is cooperative: every body-read
//! iteration observes the interrupt channel.
//!
//! # Concurrency Model
//!
//! - Each chunk fetch runs in its own Tokio task
//! - A semaphore permit is acquired before starting each fetch (RAII)
//! - Chunk completion order is unconstrained; merge order never is
//! - The engine bounds per-job chunk concurrency only; cross-job
//!   concurrency belongs to the caller

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::RANGE;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::handler::ResolvedTarget;
use crate::job::{Chunk, ChunkStatus, Job};
use crate::progress::ByteProgress;
use crate::store::JobStore;

use super::config::EngineConfig;
use super::error::{EngineError, TransferError};
use super::plan::{TransferPlan, plan_transfer};
use super::retry::{ChunkRetryPolicy, RetryDecision};

/// Bytes written between persisted chunk-counter flushes.
const COUNTER_FLUSH_BYTES: u64 = 256 * 1024;

/// An externally requested interruption of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Abort and discard partial state.
    Cancel,
    /// Stop but preserve partial state for resume.
    Pause,
    /// Internal: the job wall-clock ceiling was reached.
    Deadline,
}

/// Filesystem locations for one job's transfer.
#[derive(Debug, Clone)]
pub struct JobPaths {
    /// Per-job scratch directory for chunk temp files.
    pub scratch_dir: PathBuf,
    /// Final artifact path.
    pub dest_path: PathBuf,
}

/// How a transfer run ended (errors are a separate channel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Artifact merged and verified.
    Completed {
        /// Final artifact path.
        path: PathBuf,
        /// Final artifact size in bytes.
        bytes: u64,
    },
    /// Cancelled; partial state removed.
    Cancelled,
    /// Paused; partial state preserved for resume.
    Paused,
}

/// Result of a single chunk worker.
enum ChunkRun {
    Done,
    Interrupted(Interrupt),
}

/// The transfer engine.
///
/// Cheap to clone: workers receive a clone per task.
#[derive(Clone)]
pub struct TransferEngine {
    client: Client,
    config: Arc<EngineConfig>,
    store: Arc<dyn JobStore>,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransferEngine {
    /// Creates an engine with the given configuration and store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: EngineConfig, store: Arc<dyn JobStore>) -> Result<Self, EngineError> {
        config.validate()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .gzip(false) // ranged fetches need the raw byte stream
            .build()
            .map_err(EngineError::ClientBuild)?;
        Ok(Self {
            client,
            config: Arc::new(config),
            store,
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes a transfer for `job` against the resolved `target`.
    ///
    /// Emits absolute per-chunk byte counters on `progress` as the transfer
    /// proceeds and observes `interrupt` cooperatively. Existing chunk
    /// records for the job are resumed: completed chunks are never
    /// re-requested, partial chunks continue from their confirmed offset.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] on unrecoverable failure; recoverable
    /// per-chunk errors are retried internally and never surface.
    #[instrument(skip_all, fields(job_id = %job.job_id, url = %target.fetch_url))]
    pub async fn run(
        &self,
        job: &Job,
        target: &ResolvedTarget,
        paths: &JobPaths,
        progress: mpsc::Sender<ByteProgress>,
        interrupt: watch::Receiver<Option<Interrupt>>,
    ) -> Result<TransferOutcome, TransferError> {
        // Merge the external interrupt with the wall-clock ceiling into one
        // channel every worker watches.
        let (merged_tx, merged_rx) = watch::channel(None);
        let forwarder = spawn_interrupt_forwarder(
            interrupt,
            merged_tx,
            self.config.job_wall_clock_timeout,
        );

        let result = self
            .run_inner(job, target, paths, progress, merged_rx)
            .await;
        forwarder.abort();
        result
    }

    async fn run_inner(
        &self,
        job: &Job,
        target: &ResolvedTarget,
        paths: &JobPaths,
        progress: mpsc::Sender<ByteProgress>,
        interrupt: watch::Receiver<Option<Interrupt>>,
    ) -> Result<TransferOutcome, TransferError> {
        tokio::fs::create_dir_all(&paths.scratch_dir)
            .await
            .map_err(|e| TransferError::io(paths.scratch_dir.clone(), e))?;
        if let Some(parent) = paths.dest_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::io(parent.to_path_buf(), e))?;
        }

        // Resume check: prior chunk records are the source of truth.
        let existing = self.store.chunks(job.id).await.map_err(store_io)?;
        let chunks = if existing.is_empty() {
            match plan_transfer(&target.info, &self.config) {
                TransferPlan::Sequential => {
                    return self
                        .run_sequential(job, target, paths, progress, interrupt)
                        .await;
                }
                TransferPlan::Chunked(specs) => {
                    let temp_paths: Vec<String> = specs
                        .iter()
                        .map(|s| {
                            paths
                                .scratch_dir
                                .join(format!("chunk_{}.part", s.index))
                                .to_string_lossy()
                                .into_owned()
                        })
                        .collect();
                    self.store
                        .insert_chunks(job.id, &specs, &temp_paths)
                        .await
                        .map_err(store_io)?
                }
            }
        } else {
            info!(chunks = existing.len(), "resuming from persisted chunk records");
            existing
        };

        self.run_chunked(job, target, paths, chunks, progress, interrupt)
            .await
    }

    /// Chunked execution: bounded pool, retries, merge.
    async fn run_chunked(
        &self,
        job: &Job,
        target: &ResolvedTarget,
        paths: &JobPaths,
        chunks: Vec<Chunk>,
        progress: mpsc::Sender<ByteProgress>,
        interrupt: watch::Receiver<Option<Interrupt>>,
    ) -> Result<TransferOutcome, TransferError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_chunks));
        let mut workers: JoinSet<Result<ChunkRun, TransferError>> = JoinSet::new();

        for chunk in &chunks {
            if chunk.status() == ChunkStatus::Completed {
                // Already confirmed on a prior attempt; report and skip.
                let _ = progress.try_send(ByteProgress {
                    chunk_index: chunk_index_u32(chunk),
                    downloaded: chunk.len(),
                });
                continue;
            }

            let engine = self.clone();
            let chunk = chunk.clone();
            let url = target.fetch_url.clone();
            let semaphore = Arc::clone(&semaphore);
            let progress = progress.clone();
            let interrupt = interrupt.clone();

            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    // Semaphore only closes when the engine is torn down.
                    return Ok(ChunkRun::Interrupted(Interrupt::Cancel));
                };
                engine
                    .fetch_chunk_with_retry(&url, &chunk, &progress, interrupt)
                    .await
            });
        }

        let mut interrupted: Option<Interrupt> = None;
        let mut failure: Option<TransferError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(ChunkRun::Done)) => {}
                Ok(Ok(ChunkRun::Interrupted(kind))) => interrupted = Some(kind),
                Ok(Err(e)) => {
                    // First failure wins; drain remaining workers so their
                    // permits release and partial files settle.
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Err(join_err) => {
                    warn!(error = %join_err, "chunk worker panicked");
                    if failure.is_none() {
                        failure = Some(TransferError::io(
                            paths.scratch_dir.clone(),
                            std::io::Error::other(join_err.to_string()),
                        ));
                    }
                }
            }
        }

        match (interrupted, failure) {
            (Some(Interrupt::Cancel), _) => {
                self.discard_partial_state(job, paths).await;
                Ok(TransferOutcome::Cancelled)
            }
            (Some(Interrupt::Pause), _) => Ok(TransferOutcome::Paused),
            (Some(Interrupt::Deadline), _) => Err(TransferError::WallClockExceeded {
                limit_secs: self.config.job_wall_clock_timeout.as_secs(),
            }),
            (None, Some(error)) => Err(error),
            (None, None) => {
                let chunks = self.store.chunks(job.id).await.map_err(store_io)?;
                let bytes = self.merge_chunks(&chunks, &paths.dest_path).await?;
                self.store.delete_chunks(job.id).await.map_err(store_io)?;
                info!(path = %paths.dest_path.display(), bytes, "chunked transfer complete");
                Ok(TransferOutcome::Completed {
                    path: paths.dest_path.clone(),
                    bytes,
                })
            }
        }
    }

    /// Fetches one chunk with bounded retries and offset truncation.
    async fn fetch_chunk_with_retry(
        &self,
        url: &str,
        chunk: &Chunk,
        progress: &mpsc::Sender<ByteProgress>,
        mut interrupt: watch::Receiver<Option<Interrupt>>,
    ) -> Result<ChunkRun, TransferError> {
        let policy = ChunkRetryPolicy::new(self.config.chunk_retry_limit);
        self.store
            .set_chunk_status(chunk.id, ChunkStatus::Downloading)
            .await
            .map_err(store_io)?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self
                .fetch_chunk_once(url, chunk, progress, &mut interrupt)
                .await
            {
                Ok(ChunkRun::Done) => {
                    self.store
                        .set_chunk_status(chunk.id, ChunkStatus::Completed)
                        .await
                        .map_err(store_io)?;
                    self.store
                        .update_chunk_progress(chunk.id, chunk.len())
                        .await
                        .map_err(store_io)?;
                    return Ok(ChunkRun::Done);
                }
                Ok(interrupted) => return Ok(interrupted),
                Err(error) => match policy.decide(&error, attempt) {
                    RetryDecision::Retry { delay, attempt: next } => {
                        warn!(
                            chunk = chunk.chunk_index,
                            attempt = next,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "retrying chunk"
                        );
                        // Truncate back to the last confirmed offset so a
                        // torn tail never survives into the merge.
                        self.truncate_to_confirmed(chunk).await?;
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            kind = wait_for_interrupt(&mut interrupt) => {
                                return Ok(ChunkRun::Interrupted(kind));
                            }
                        }
                    }
                    RetryDecision::GiveUp { reason } => {
                        debug!(chunk = chunk.chunk_index, %reason, "chunk exhausted");
                        self.store
                            .set_chunk_status(chunk.id, ChunkStatus::Failed)
                            .await
                            .map_err(store_io)?;
                        return Err(TransferError::ChunkExhausted {
                            index: chunk_index_u32(chunk),
                            start: u64::try_from(chunk.start_byte).unwrap_or(0),
                            end: u64::try_from(chunk.end_byte).unwrap_or(0),
                            attempts: attempt,
                            source: Box::new(error),
                        });
                    }
                },
            }
        }
    }

    /// One fetch attempt for a chunk, resuming from the temp file length.
    async fn fetch_chunk_once(
        &self,
        url: &str,
        chunk: &Chunk,
        progress: &mpsc::Sender<ByteProgress>,
        interrupt: &mut watch::Receiver<Option<Interrupt>>,
    ) -> Result<ChunkRun, TransferError> {
        let temp_path = PathBuf::from(&chunk.temp_path);
        let expected = chunk.len();

        // Confirmed offset is whatever survived on disk, clamped to the
        // range length.
        let confirmed = tokio::fs::metadata(&temp_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0)
            .min(expected);

        if confirmed >= expected {
            report(progress, chunk_index_u32(chunk), expected);
            return Ok(ChunkRun::Done);
        }

        let range_start = u64::try_from(chunk.start_byte).unwrap_or(0) + confirmed;
        let range_end = u64::try_from(chunk.end_byte).unwrap_or(0);
        let range = format!("bytes={range_start}-{range_end}");
        debug!(chunk = chunk.chunk_index, %range, "requesting chunk range");

        let request = self.client.get(url).header(RANGE, range);
        let response = tokio::select! {
            result = request.send() => result.map_err(|e| request_error(url, e))?,
            kind = wait_for_interrupt(interrupt) => {
                return Ok(ChunkRun::Interrupted(kind));
            }
        };

        // Chunked mode requires honored ranges; a 200 here would replay the
        // whole body into one chunk's file.
        if response.status().as_u16() != 206 {
            let status = response.status().as_u16();
            let retry_after = header_string(&response, "retry-after");
            return Err(TransferError::http_status(url, status, retry_after));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&temp_path)
            .await
            .map_err(|e| TransferError::io(temp_path.clone(), e))?;
        if confirmed < tokio::fs::metadata(&temp_path).await.map(|m| m.len()).unwrap_or(0) {
            // Disk had more than the clamped confirmed count; drop the tail.
            file.set_len(confirmed)
                .await
                .map_err(|e| TransferError::io(temp_path.clone(), e))?;
        }

        let mut downloaded = confirmed;
        let mut unflushed = 0u64;
        let mut stream = response.bytes_stream();

        loop {
            tokio::select! {
                kind = wait_for_interrupt(interrupt) => {
                    file.flush().await.ok();
                    return Ok(ChunkRun::Interrupted(kind));
                }
                item = stream.next() => {
                    let Some(item) = item else { break };
                    let bytes = item.map_err(|e| request_error(url, e))?;
                    file.write_all(&bytes)
                        .await
                        .map_err(|e| TransferError::io(temp_path.clone(), e))?;
                    downloaded += bytes.len() as u64;
                    unflushed += bytes.len() as u64;
                    report(progress, chunk_index_u32(chunk), downloaded);
                    if unflushed >= COUNTER_FLUSH_BYTES {
                        unflushed = 0;
                        self.store
                            .update_chunk_progress(chunk.id, downloaded)
                            .await
                            .map_err(store_io)?;
                    }
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| TransferError::io(temp_path.clone(), e))?;

        if downloaded != expected {
            return Err(TransferError::Stalled {
                url: url.to_string(),
                received: downloaded,
                expected,
            });
        }

        report(progress, chunk_index_u32(chunk), downloaded);
        Ok(ChunkRun::Done)
    }

    /// Truncates a chunk's temp file to its last persisted counter.
    async fn truncate_to_confirmed(&self, chunk: &Chunk) -> Result<(), TransferError> {
        let temp_path = PathBuf::from(&chunk.temp_path);
        let Ok(file) = OpenOptions::new().write(true).open(&temp_path).await else {
            return Ok(()); // nothing written yet
        };
        let len = tokio::fs::metadata(&temp_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        let confirmed = len.min(chunk.len());
        file.set_len(confirmed)
            .await
            .map_err(|e| TransferError::io(temp_path, e))?;
        Ok(())
    }

    /// Concatenates completed chunk files into the destination, strictly in
    /// ascending chunk-index order, then removes the temp files.
    ///
    /// Idempotent: when the destination already exists with the expected
    /// size, the merge is a no-op. Partial merges never happen; every chunk
    /// is verified present and full-length before the first byte is copied.
    async fn merge_chunks(&self, chunks: &[Chunk], dest: &Path) -> Result<u64, TransferError> {
        let total: u64 = chunks.iter().map(Chunk::len).sum();

        if let Ok(meta) = tokio::fs::metadata(dest).await
            && meta.len() == total
        {
            debug!(path = %dest.display(), "destination already merged");
            return Ok(total);
        }

        let mut ordered: Vec<&Chunk> = chunks.iter().collect();
        ordered.sort_by_key(|c| c.chunk_index);

        // Verify the full set before touching the destination.
        for chunk in &ordered {
            let temp_path = PathBuf::from(&chunk.temp_path);
            let actual = tokio::fs::metadata(&temp_path)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            if chunk.status() != ChunkStatus::Completed || actual != chunk.len() {
                return Err(TransferError::MergeCorrupt {
                    index: chunk_index_u32(chunk),
                    path: temp_path,
                    expected_bytes: chunk.len(),
                    actual_bytes: actual,
                });
            }
        }

        // Append rather than replace the extension: distinct artifacts in
        // one directory must never share a staging path.
        let mut staging = dest.as_os_str().to_owned();
        staging.push(".merging");
        let staging = PathBuf::from(staging);
        let mut out = File::create(&staging)
            .await
            .map_err(|e| TransferError::io(staging.clone(), e))?;

        for chunk in &ordered {
            let temp_path = PathBuf::from(&chunk.temp_path);
            let mut input = File::open(&temp_path)
                .await
                .map_err(|e| TransferError::io(temp_path.clone(), e))?;
            tokio::io::copy(&mut input, &mut out)
                .await
                .map_err(|e| TransferError::io(temp_path.clone(), e))?;
        }
        out.flush()
            .await
            .map_err(|e| TransferError::io(staging.clone(), e))?;
        drop(out);

        let merged = tokio::fs::metadata(&staging)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if merged != total {
            return Err(TransferError::Integrity {
                path: staging,
                expected_bytes: total,
                actual_bytes: merged,
            });
        }

        tokio::fs::rename(&staging, dest)
            .await
            .map_err(|e| TransferError::io(dest.to_path_buf(), e))?;

        for chunk in &ordered {
            let _ = tokio::fs::remove_file(&chunk.temp_path).await;
        }

        Ok(total)
    }

    /// Sequential fallback: one stream, optional mid-stream range resume.
    async fn run_sequential(
        &self,
        job: &Job,
        target: &ResolvedTarget,
        paths: &JobPaths,
        progress: mpsc::Sender<ByteProgress>,
        mut interrupt: watch::Receiver<Option<Interrupt>>,
    ) -> Result<TransferOutcome, TransferError> {
        let url = &target.fetch_url;
        let part_path = paths.scratch_dir.join("stream.part");

        // Resume only when the handler previously confirmed range support.
        let already = if target.info.accepts_ranges {
            tokio::fs::metadata(&part_path)
                .await
                .map(|m| m.len())
                .unwrap_or(0)
        } else {
            0
        };

        let mut request = self.client.get(url);
        if already > 0 {
            request = request.header(RANGE, format!("bytes={already}-"));
        }
        let response = tokio::select! {
            result = request.send() => result.map_err(|e| request_error(url, e))?,
            kind = wait_for_interrupt(&mut interrupt) => {
                return match kind {
                    Interrupt::Cancel => {
                        self.discard_partial_state(job, paths).await;
                        Ok(TransferOutcome::Cancelled)
                    }
                    Interrupt::Pause => Ok(TransferOutcome::Paused),
                    Interrupt::Deadline => Err(TransferError::WallClockExceeded {
                        limit_secs: self.config.job_wall_clock_timeout.as_secs(),
                    }),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = header_string(&response, "retry-after");
            return Err(TransferError::http_status(url, status.as_u16(), retry_after));
        }

        // 206 appends at the confirmed offset; anything else restarts.
        let resumed = status.as_u16() == 206 && already > 0;
        let mut downloaded = if resumed { already } else { 0 };

        let mut file = if resumed {
            OpenOptions::new()
                .append(true)
                .open(&part_path)
                .await
                .map_err(|e| TransferError::io(part_path.clone(), e))?
        } else {
            File::create(&part_path)
                .await
                .map_err(|e| TransferError::io(part_path.clone(), e))?
        };

        let mut stream = response.bytes_stream();
        loop {
            tokio::select! {
                kind = wait_for_interrupt(&mut interrupt) => {
                    file.flush().await.ok();
                    return match kind {
                        Interrupt::Cancel => {
                            self.discard_partial_state(job, paths).await;
                            Ok(TransferOutcome::Cancelled)
                        }
                        Interrupt::Pause => Ok(TransferOutcome::Paused),
                        Interrupt::Deadline => Err(TransferError::WallClockExceeded {
                            limit_secs: self.config.job_wall_clock_timeout.as_secs(),
                        }),
                    };
                }
                item = stream.next() => {
                    let Some(item) = item else { break };
                    let bytes = item.map_err(|e| request_error(url, e))?;
                    file.write_all(&bytes)
                        .await
                        .map_err(|e| TransferError::io(part_path.clone(), e))?;
                    downloaded += bytes.len() as u64;
                    report(&progress, 0, downloaded);
                }
            }
        }
        file.flush()
            .await
            .map_err(|e| TransferError::io(part_path.clone(), e))?;
        drop(file);

        if let Some(expected) = target.info.size
            && expected != downloaded
        {
            return Err(TransferError::Integrity {
                path: part_path,
                expected_bytes: expected,
                actual_bytes: downloaded,
            });
        }

        tokio::fs::rename(&part_path, &paths.dest_path)
            .await
            .map_err(|e| TransferError::io(paths.dest_path.clone(), e))?;

        info!(path = %paths.dest_path.display(), bytes = downloaded, "sequential transfer complete");
        Ok(TransferOutcome::Completed {
            path: paths.dest_path.clone(),
            bytes: downloaded,
        })
    }

    /// Removes a cancelled job's scratch files and chunk records.
    async fn discard_partial_state(&self, job: &Job, paths: &JobPaths) {
        if let Err(e) = tokio::fs::remove_dir_all(&paths.scratch_dir).await {
            debug!(error = %e, "scratch cleanup after cancel failed");
        }
        if let Err(e) = self.store.delete_chunks(job.id).await {
            warn!(error = %e, "chunk record cleanup after cancel failed");
        }
    }
}

/// Forwards the first external interrupt, or fires `Deadline` at the
/// wall-clock ceiling, into the merged channel.
fn spawn_interrupt_forwarder(
    mut external: watch::Receiver<Option<Interrupt>>,
    merged: watch::Sender<Option<Interrupt>>,
    limit: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => {
                    let _ = merged.send(Some(Interrupt::Deadline));
                    break;
                }
                changed = external.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = *external.borrow();
                    if value.is_some() {
                        let _ = merged.send(value);
                        break;
                    }
                }
            }
        }
    })
}

/// Resolves once an interrupt is (or already was) requested.
///
/// Pending forever when the sender side closes without an interrupt, which
/// only happens at engine teardown after the transfer finished.
async fn wait_for_interrupt(interrupt: &mut watch::Receiver<Option<Interrupt>>) -> Interrupt {
    loop {
        if let Some(kind) = *interrupt.borrow_and_update() {
            return kind;
        }
        if interrupt.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn report(progress: &mpsc::Sender<ByteProgress>, chunk_index: u32, downloaded: u64) {
    // Counters are absolute; a dropped message is subsumed by the next one.
    let _ = progress.try_send(ByteProgress {
        chunk_index,
        downloaded,
    });
}

fn chunk_index_u32(chunk: &Chunk) -> u32 {
    u32::try_from(chunk.chunk_index).unwrap_or(0)
}

fn request_error(url: &str, error: reqwest::Error) -> TransferError {
    if error.is_timeout() {
        TransferError::timeout(url)
    } else {
        TransferError::network(url, error)
    }
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(std::string::ToString::to_string)
}

fn store_io(error: crate::store::StoreError) -> TransferError {
    TransferError::io(
        PathBuf::from("<store>"),
        std::io::Error::other(error.to_string()),
    )
}
