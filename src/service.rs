//! Boundary facade tying classification, handlers, engine, store, and
//! events together.
//!
//! [`DownloadService`] exposes the operations an external transport (HTTP
//! API, queue worker, CLI) drives: submit, probe, execute, cancel, pause,
//! resume, status, subscribe, and artifact fetch. The service owns no
//! transport concerns; it mutates records, runs transfers, and publishes
//! events.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::fs::File;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::classify::{self, ClassifyError, UrlCategory};
use crate::engine::{EngineError, Interrupt, JobPaths, TransferEngine, TransferOutcome};
use crate::filename::{resolve_unique_path, sanitize_filename};
use crate::handler::{HandlerError, HandlerRegistry, RemoteInfo, ResolvedTarget};
use crate::job::{InvalidTransition, Job, JobStatus, generate_job_token};
use crate::progress::{ByteProgress, Event, EventPublisher, ProgressAggregator, Subscription};
use crate::store::{JobStore, NewJob, ResolvedJobInfo, StoreError};

/// Progress channel depth; counters are absolute so overflow only costs
/// granularity, never correctness.
const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Errors surfaced by service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// URL rejected at submission.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// Handler selection or resolution failure.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Engine construction failure.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Status transition forbidden by the state machine.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    /// The operation requires a different job state.
    #[error("job {job_id} is {status}; expected {expected}")]
    WrongState {
        /// The job token.
        job_id: String,
        /// Its current status.
        status: JobStatus,
        /// What the operation needed.
        expected: &'static str,
    },

    /// The artifact is not present on disk despite a completed status.
    #[error("artifact missing for job {job_id}: {path}")]
    ArtifactMissing {
        /// The job token.
        job_id: String,
        /// The recorded artifact path.
        path: PathBuf,
    },
}

/// Read-only result of probing a URL without creating a job.
#[derive(Debug, Clone)]
pub struct Preview {
    /// Whether a transfer of this URL can be attempted.
    pub downloadable: bool,
    /// Reason when not downloadable.
    pub reason: Option<String>,
    /// Assigned category.
    pub category: Option<UrlCategory>,
    /// Best-known filename.
    pub filename: Option<String>,
    /// Declared size when known.
    pub size: Option<u64>,
    /// MIME type when declared.
    pub mime_type: Option<String>,
    /// Whether the origin confirmed byte-range support.
    pub accepts_ranges: bool,
}

/// A completed job's artifact, opened for reading.
#[derive(Debug)]
pub struct Artifact {
    /// Path of the artifact on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Open handle for streaming out.
    pub file: File,
}

/// The boundary facade.
pub struct DownloadService {
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry>,
    engine: TransferEngine,
    publisher: Arc<EventPublisher>,
    data_dir: PathBuf,
}

impl DownloadService {
    /// Creates the service.
    ///
    /// `data_dir` roots both the per-job scratch directories and the
    /// per-owner artifact directories.
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<HandlerRegistry>,
        engine: TransferEngine,
        publisher: Arc<EventPublisher>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            registry,
            engine,
            publisher,
            data_dir,
        }
    }

    /// Returns the event publisher (for transports embedding the service).
    #[must_use]
    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    /// Submits a URL, creating a pending job.
    ///
    /// Classification runs first; malformed or empty URLs are rejected and
    /// no job is created.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Classify`] for rejected URLs and
    /// [`ServiceError::Store`] on persistence failure.
    #[instrument(skip(self))]
    pub async fn submit(&self, url: &str, owner_id: i64) -> Result<Job, ServiceError> {
        let classification = classify::classify(url)?;
        let handler = self
            .registry
            .select(classification.category)
            .ok_or_else(|| HandlerError::UnknownHandler {
                name: classification.category.to_string(),
            })?;

        let job = self
            .store
            .insert_job(&NewJob {
                job_id: generate_job_token(),
                owner_id,
                url: classification.url,
                category: classification.category,
                handler_name: handler.name().to_string(),
            })
            .await?;

        info!(job_id = %job.job_id, category = %job.category_str, "job submitted");
        Ok(job)
    }

    /// Probes a URL without creating a job.
    ///
    /// Never errors on bad targets: classification failures and handler
    /// capability gaps come back as `downloadable: false` with a reason.
    ///
    /// # Errors
    ///
    /// Only internal failures (none today) error; the result carries the
    /// user-facing outcome.
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str) -> Result<Preview, ServiceError> {
        let classification = match classify::classify(url) {
            Ok(c) => c,
            Err(e) => {
                return Ok(Preview {
                    downloadable: false,
                    reason: Some(e.to_string()),
                    category: None,
                    filename: None,
                    size: None,
                    mime_type: None,
                    accepts_ranges: false,
                });
            }
        };

        let Some(handler) = self.registry.select(classification.category) else {
            return Ok(Preview {
                downloadable: false,
                reason: Some("no handler for this URL".to_string()),
                category: Some(classification.category),
                filename: None,
                size: None,
                mime_type: None,
                accepts_ranges: false,
            });
        };

        match handler.resolve(&classification.url).await {
            Ok(ResolvedTarget { info, .. }) => Ok(Preview {
                downloadable: true,
                reason: None,
                category: Some(classification.category),
                filename: Some(info.filename),
                size: info.size,
                mime_type: info.mime_type,
                accepts_ranges: info.accepts_ranges,
            }),
            Err(e) => Ok(Preview {
                downloadable: false,
                reason: Some(e.to_string()),
                category: Some(classification.category),
                filename: None,
                size: None,
                mime_type: None,
                accepts_ranges: false,
            }),
        }
    }

    /// Executes a job: classify → resolve → transfer → merge.
    ///
    /// Intended to be driven by an external queue worker. Mutates job and
    /// chunk records as it proceeds and pushes events to the publisher.
    /// Accepts jobs in `pending` (fresh or externally retried) and
    /// `paused` (resume) states.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] for invalid states and store failures.
    /// Transfer failures do NOT error: they are recorded on the job and
    /// published as a `failed` event.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn execute(&self, job_id: &str) -> Result<Job, ServiceError> {
        let job = self.store.job(job_id).await?;

        let resuming = match job.status() {
            JobStatus::Pending => false,
            JobStatus::Paused => true,
            status => {
                return Err(ServiceError::WrongState {
                    job_id: job_id.to_string(),
                    status,
                    expected: "pending or paused",
                });
            }
        };

        if !resuming {
            job.check_transition(JobStatus::Analyzing)?;
            self.store
                .set_status(job_id, JobStatus::Analyzing, None)
                .await?;
        }

        // Re-bind the handler by name; a renamed or removed handler falls
        // back to category selection so persisted jobs stay executable.
        let handler = match self.registry.select_by_name(&job.handler_name) {
            Ok(handler) => handler,
            Err(_) => self
                .registry
                .select(job.category())
                .ok_or_else(|| HandlerError::UnknownHandler {
                    name: job.handler_name.clone(),
                })?,
        };

        let target = match handler.resolve(&job.url).await {
            Ok(target) => target,
            Err(e) => {
                // Provider-capability errors fail immediately with the
                // handler's user-facing message.
                return self.finish_failed(&job, e.to_string()).await;
            }
        };

        let filename = self.stable_filename(&job, &target.info);
        self.store
            .record_resolved(
                job_id,
                &ResolvedJobInfo {
                    filename: filename.clone(),
                    total_size: target.info.size,
                    mime_type: target.info.mime_type.clone(),
                },
            )
            .await?;

        self.store
            .set_status(job_id, JobStatus::Downloading, None)
            .await?;
        let job = self.store.job(job_id).await?;

        let paths = self.job_paths(&job, &filename);
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let (interrupt_tx, interrupt_rx) = watch::channel(None);

        let poller = self.spawn_status_poller(job_id.to_string(), interrupt_tx);
        let pump = self.spawn_progress_pump(&job, &target.info, progress_rx);

        let outcome = self
            .engine
            .run(&job, &target, &paths, progress_tx, interrupt_rx)
            .await;

        // Engine dropped its sender; wait for the pump to drain so the
        // final progress event precedes any terminal event.
        if let Err(e) = pump.await {
            warn!(error = %e, "progress pump task failed");
        }
        poller.abort();

        match outcome {
            Ok(TransferOutcome::Completed { path, bytes }) => {
                self.store
                    .record_completed(job_id, &path.to_string_lossy(), bytes)
                    .await?;
                let job = self.store.job(job_id).await?;
                self.publish_final_progress(&job);
                self.publisher.publish(
                    job_id,
                    Event::Completed {
                        job_id: job_id.to_string(),
                        save_path: path.to_string_lossy().into_owned(),
                    },
                );
                // Scratch dir is empty after merge; drop it.
                let _ = tokio::fs::remove_dir_all(&paths.scratch_dir).await;
                Ok(job)
            }
            Ok(TransferOutcome::Cancelled) => {
                self.publisher.publish(
                    job_id,
                    Event::Cancelled {
                        job_id: job_id.to_string(),
                    },
                );
                self.store.job(job_id).await.map_err(Into::into)
            }
            Ok(TransferOutcome::Paused) => {
                debug!("transfer paused; partial state preserved");
                self.store.job(job_id).await.map_err(Into::into)
            }
            Err(error) => {
                let job = self.store.job(job_id).await?;
                self.finish_failed(&job, error.to_string()).await
            }
        }
    }

    /// Cancels a job. Succeeds only from active states.
    ///
    /// The status flips in the store immediately; a running engine observes
    /// it at its next cooperative check and cleans up.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on persistence failure.
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: &str) -> Result<bool, ServiceError> {
        let job = self.store.job(job_id).await?;
        if !job.status().is_active() {
            return Ok(false);
        }
        self.store
            .set_status(job_id, JobStatus::Cancelled, None)
            .await?;
        // A job cancelled before execution never has a running engine to
        // publish the terminal event; do it here for waiting subscribers.
        if job.status() == JobStatus::Pending {
            self.publisher.publish(
                job_id,
                Event::Cancelled {
                    job_id: job_id.to_string(),
                },
            );
        }
        info!("job cancelled");
        Ok(true)
    }

    /// Pauses a job, preserving partial state for resume.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on persistence failure.
    #[instrument(skip(self))]
    pub async fn pause(&self, job_id: &str) -> Result<bool, ServiceError> {
        let job = self.store.job(job_id).await?;
        if !job.status().is_active() || job.status() == JobStatus::Paused {
            return Ok(false);
        }
        self.store
            .set_status(job_id, JobStatus::Paused, None)
            .await?;
        Ok(true)
    }

    /// Re-queues a failed job for another execution attempt.
    ///
    /// Downloaded bytes and chunk records are preserved; the next execute
    /// resumes from confirmed offsets when the origin supports ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::WrongState`] unless the job is `failed`.
    #[instrument(skip(self))]
    pub async fn resume(&self, job_id: &str) -> Result<Job, ServiceError> {
        let job = self.store.job(job_id).await?;
        match job.status() {
            JobStatus::Failed => {
                self.store
                    .set_status(job_id, JobStatus::Pending, None)
                    .await?;
                self.store.job(job_id).await.map_err(Into::into)
            }
            JobStatus::Paused => Ok(job),
            status => Err(ServiceError::WrongState {
                job_id: job_id.to_string(),
                status,
                expected: "failed or paused",
            }),
        }
    }

    /// Returns a job snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] for unknown tokens.
    pub async fn status(&self, job_id: &str) -> Result<Job, ServiceError> {
        self.store.job(job_id).await.map_err(Into::into)
    }

    /// Lists an owner's jobs, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on persistence failure.
    pub async fn list(
        &self,
        owner_id: i64,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, ServiceError> {
        self.store
            .jobs_for_owner(owner_id, status)
            .await
            .map_err(Into::into)
    }

    /// Subscribes to a job's live event stream.
    ///
    /// The stream is seeded: after `Connected`, a snapshot progress event
    /// reflects the job's current persisted state, then live events follow
    /// until a terminal event or transport timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] for unknown tokens.
    pub async fn subscribe(&self, job_id: &str) -> Result<Subscription, ServiceError> {
        let job = self.store.job(job_id).await?;
        let subscription = self.publisher.subscribe(job_id);

        // Seed with the persisted snapshot so late subscribers see state
        // immediately; terminal jobs get their terminal event too.
        self.publish_final_progress(&job);
        match job.status() {
            JobStatus::Completed => self.publisher.publish(
                job_id,
                Event::Completed {
                    job_id: job_id.to_string(),
                    save_path: job.save_path.clone().unwrap_or_default(),
                },
            ),
            JobStatus::Failed => self.publisher.publish(
                job_id,
                Event::Failed {
                    job_id: job_id.to_string(),
                    error: job.error_message.clone().unwrap_or_default(),
                },
            ),
            JobStatus::Cancelled => self.publisher.publish(
                job_id,
                Event::Cancelled {
                    job_id: job_id.to_string(),
                },
            ),
            _ => {}
        }

        Ok(subscription)
    }

    /// Opens a completed job's artifact for reading.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::WrongState`] unless the job is `completed`,
    /// and [`ServiceError::ArtifactMissing`] when the file is gone.
    #[instrument(skip(self))]
    pub async fn artifact(&self, job_id: &str) -> Result<Artifact, ServiceError> {
        let job = self.store.job(job_id).await?;
        if job.status() != JobStatus::Completed {
            return Err(ServiceError::WrongState {
                job_id: job_id.to_string(),
                status: job.status(),
                expected: "completed",
            });
        }
        let path = PathBuf::from(job.save_path.clone().unwrap_or_default());
        let file = File::open(&path)
            .await
            .map_err(|_| ServiceError::ArtifactMissing {
                job_id: job_id.to_string(),
                path: path.clone(),
            })?;
        let size = file
            .metadata()
            .await
            .map(|m| m.len())
            .unwrap_or(u64::try_from(job.downloaded_bytes).unwrap_or(0));
        Ok(Artifact { path, size, file })
    }

    // ==================== internals ====================

    /// Keeps the filename stable across resumes: once resolved, reuse it.
    fn stable_filename(&self, job: &Job, info: &RemoteInfo) -> String {
        if !job.filename.is_empty() {
            return job.filename.clone();
        }
        let sanitized = sanitize_filename(&info.filename);
        let name = if sanitized.is_empty() {
            crate::filename::timestamp_filename()
        } else {
            sanitized
        };
        let owner_dir = self.owner_dir(job.owner_id);
        resolve_unique_path(&owner_dir, &name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(name)
    }

    fn owner_dir(&self, owner_id: i64) -> PathBuf {
        self.data_dir.join("files").join(owner_id.to_string())
    }

    fn job_paths(&self, job: &Job, filename: &str) -> JobPaths {
        JobPaths {
            scratch_dir: self.data_dir.join("tmp").join(&job.job_id),
            dest_path: self.owner_dir(job.owner_id).join(filename),
        }
    }

    /// Publishes an unconditional progress snapshot of the persisted job.
    fn publish_final_progress(&self, job: &Job) {
        let downloaded = u64::try_from(job.downloaded_bytes).unwrap_or(0);
        let total = job.total_size.and_then(|t| u64::try_from(t).ok());
        let progress = if job.status() == JobStatus::Completed {
            Some(100.0)
        } else if total.is_some() {
            Some(job.progress)
        } else {
            None
        };
        self.publisher.publish(
            &job.job_id,
            Event::Progress {
                job_id: job.job_id.clone(),
                status: job.status(),
                progress,
                downloaded,
                total,
                speed_bps: job.speed_bps.and_then(|s| u64::try_from(s).ok()),
                eta_seconds: job.eta_seconds.and_then(|s| u64::try_from(s).ok()),
                filename: job.filename.clone(),
            },
        );
    }

    async fn finish_failed(&self, job: &Job, error: String) -> Result<Job, ServiceError> {
        warn!(job_id = %job.job_id, error = %error, "job failed");
        self.store
            .set_status(&job.job_id, JobStatus::Failed, Some(&error))
            .await?;
        self.publisher.publish(
            &job.job_id,
            Event::Failed {
                job_id: job.job_id.clone(),
                error,
            },
        );
        self.store.job(&job.job_id).await.map_err(Into::into)
    }

    /// Watches the persisted status for external cancel/pause requests.
    fn spawn_status_poller(
        &self,
        job_id: String,
        interrupt_tx: watch::Sender<Option<Interrupt>>,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let interval = self.engine.config().cancel_poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Ok(job) = store.job(&job_id).await else {
                    break;
                };
                match job.status() {
                    JobStatus::Cancelled => {
                        let _ = interrupt_tx.send(Some(Interrupt::Cancel));
                        break;
                    }
                    JobStatus::Paused => {
                        let _ = interrupt_tx.send(Some(Interrupt::Pause));
                        break;
                    }
                    status if status.is_terminal() => break,
                    _ => {}
                }
            }
        })
    }

    /// Folds worker counters into snapshots; persists and publishes them.
    fn spawn_progress_pump(
        &self,
        job: &Job,
        info: &RemoteInfo,
        mut progress_rx: mpsc::Receiver<ByteProgress>,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let publisher = Arc::clone(&self.publisher);
        let job_id = job.job_id.clone();
        let filename = job.filename.clone();
        let initial = u64::try_from(job.downloaded_bytes).unwrap_or(0);
        let mut aggregator = ProgressAggregator::new(info.size, initial);

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    message = progress_rx.recv() => {
                        match message {
                            Some(p) => aggregator.record(p),
                            None => break, // engine finished; final state is
                                           // published by the caller
                        }
                    }
                    _ = tick.tick() => {
                        aggregator.sample(Instant::now());
                        let snapshot = aggregator.snapshot();
                        publisher.publish_progress(
                            &job_id,
                            JobStatus::Downloading,
                            &snapshot,
                            &filename,
                        );
                        if let Err(e) = store
                            .update_progress(
                                &job_id,
                                snapshot.downloaded,
                                snapshot.progress.unwrap_or(0.0),
                                snapshot.speed_bps,
                                snapshot.eta_seconds,
                            )
                            .await
                        {
                            debug!(error = %e, "progress persistence failed");
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for DownloadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadService")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}
