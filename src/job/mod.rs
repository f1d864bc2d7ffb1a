//! Job and chunk records with the download status state machine.
//!
//! A [`Job`] is one requested transfer; a [`Chunk`] is one contiguous byte
//! range of a chunked job. Status transitions are validated in code: the
//! persisted record is the source of truth, and every mutation goes through
//! a transition that [`JobStatus::can_transition_to`] permits.
//!
//! # State machine
//!
//! ```text
//! pending → analyzing → downloading → {completed | failed | cancelled | paused}
//! paused → downloading            (resume)
//! failed → pending                (external retry)
//! ```
//!
//! `completed` and `cancelled` are terminal. `failed` is terminal unless
//! externally resumed, which re-enters at `pending`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::classify::UrlCategory;

/// Status of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting for execution.
    Pending,
    /// Info resolution (probe) in progress.
    Analyzing,
    /// Transfer in progress.
    Downloading,
    /// Intentionally deferred; downloaded bytes retained for resume.
    Paused,
    /// Transfer finished and artifact merged.
    Completed,
    /// Unrecoverable error; may be externally resumed.
    Failed,
    /// Externally cancelled; partial state discarded.
    Cancelled,
}

impl JobStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// True for states where the job is still being worked on or waiting.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Analyzing | Self::Downloading | Self::Paused
        )
    }

    /// True for states the job can never leave on its own.
    ///
    /// `failed` is not terminal here: an external retry re-enters `pending`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns whether a transition from `self` to `next` is valid.
    #[must_use]
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::{
            Analyzing, Cancelled, Completed, Downloading, Failed, Paused, Pending,
        };
        match (self, next) {
            (Pending, Analyzing) => true,
            (Analyzing, Downloading | Failed) => true,
            (Downloading, Completed | Failed | Cancelled | Paused) => true,
            (Paused, Downloading | Cancelled) => true,
            // External retry of a failed job re-enters the queue.
            (Failed, Pending) => true,
            // Any active state may be cancelled or paused externally.
            (Pending | Analyzing, Cancelled | Paused) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "analyzing" => Ok(Self::Analyzing),
            "downloading" => Ok(Self::Downloading),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}

/// Status of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Planned, not yet started.
    Pending,
    /// A worker is fetching this range.
    Downloading,
    /// Fully fetched and verified against its range length.
    Completed,
    /// Retry budget exhausted.
    Failed,
}

impl ChunkStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChunkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid chunk status: {s}")),
        }
    }
}

/// Error raised when a status transition violates the state machine.
#[derive(Debug, Error)]
#[error("invalid job status transition: {from} -> {to}")]
pub struct InvalidTransition {
    /// Current status.
    pub from: JobStatus,
    /// Rejected target status.
    pub to: JobStatus,
}

/// One requested transfer, as persisted.
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    /// Internal numeric id (primary key).
    pub id: i64,
    /// Stable external job token.
    pub job_id: String,
    /// Owning user reference.
    pub owner_id: i64,
    /// Source URL as submitted (normalized).
    pub url: String,
    /// Provider category string (parsed via [`Job::category`]).
    #[sqlx(rename = "category")]
    pub category_str: String,
    /// Name of the handler bound at submission; resumes re-bind by name.
    pub handler_name: String,
    /// Target filename (empty until resolved).
    pub filename: String,
    /// Declared total size; None until probed or forever unknown.
    pub total_size: Option<i64>,
    /// Bytes confirmed on disk so far.
    pub downloaded_bytes: i64,
    /// Progress percentage, 0-100 with two-decimal precision.
    pub progress: f64,
    /// Current status (stored as text, parsed via [`Job::status`]).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// Smoothed transfer speed in bytes/sec.
    pub speed_bps: Option<i64>,
    /// Estimated seconds remaining.
    pub eta_seconds: Option<i64>,
    /// Human-readable failure detail.
    pub error_message: Option<String>,
    /// Final artifact path once merged.
    pub save_path: Option<String>,
    /// MIME type reported by the origin.
    pub mime_type: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// When the transfer actually started.
    pub started_at: Option<String>,
    /// When the job reached a terminal state.
    pub completed_at: Option<String>,
}

impl Job {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Pending` if the stored string is invalid.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status_str.parse().unwrap_or(JobStatus::Pending)
    }

    /// Returns the parsed provider category.
    ///
    /// Falls back to `Other` if the stored string is invalid.
    #[must_use]
    pub fn category(&self) -> UrlCategory {
        self.category_str.parse().unwrap_or(UrlCategory::Other)
    }

    /// Validates a transition from the current status.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the state machine forbids it.
    pub fn check_transition(&self, to: JobStatus) -> Result<(), InvalidTransition> {
        let from = self.status();
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(InvalidTransition { from, to })
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Job {{ job_id: {}, url: {}, status: {} }}",
            self.job_id,
            self.url,
            self.status()
        )
    }
}

/// One contiguous byte range of a job's transfer, as persisted.
#[derive(Debug, Clone, FromRow)]
pub struct Chunk {
    /// Internal numeric id (primary key).
    pub id: i64,
    /// Parent job's internal id.
    pub job_pk: i64,
    /// 0-based index defining merge order.
    pub chunk_index: i64,
    /// First byte of the range (inclusive).
    pub start_byte: i64,
    /// Last byte of the range (inclusive).
    pub end_byte: i64,
    /// Bytes confirmed in the temp file.
    pub downloaded_bytes: i64,
    /// Current status (stored as text, parsed via [`Chunk::status`]).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// Path of this chunk's exclusive temp spill file.
    pub temp_path: String,
}

impl Chunk {
    /// Returns the parsed status enum, falling back to `Pending`.
    #[must_use]
    pub fn status(&self) -> ChunkStatus {
        self.status_str.parse().unwrap_or(ChunkStatus::Pending)
    }

    /// Total length of this chunk's byte range.
    #[must_use]
    pub fn len(&self) -> u64 {
        u64::try_from(self.end_byte - self.start_byte + 1).unwrap_or(0)
    }

    /// True when the range is degenerate (never valid for a planned chunk).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end_byte < self.start_byte
    }
}

/// Generates an opaque external job token.
///
/// 128 bits of randomness rendered as hex, prefixed for log readability.
#[must_use]
pub fn generate_job_token() -> String {
    let hi: u64 = rand::random();
    let lo: u64 = rand::random();
    format!("job_{hi:016x}{lo:016x}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn job_with_status(status: &str) -> Job {
        Job {
            id: 1,
            job_id: "job_abc".to_string(),
            owner_id: 7,
            url: "https://example.com/file.bin".to_string(),
            category_str: "direct_file".to_string(),
            handler_name: "direct".to_string(),
            filename: "file.bin".to_string(),
            total_size: Some(1024),
            downloaded_bytes: 0,
            progress: 0.0,
            status_str: status.to_string(),
            speed_bps: None,
            eta_seconds: None,
            error_message: None,
            save_path: None,
            mime_type: None,
            created_at: "2026-01-01 00:00:00".to_string(),
            started_at: None,
            completed_at: None,
        }
    }

    // ==================== JobStatus Tests ====================

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Analyzing,
            JobStatus::Downloading,
            JobStatus::Paused,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_job_status_active_flags() {
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Analyzing.is_active());
        assert!(JobStatus::Downloading.is_active());
        assert!(JobStatus::Paused.is_active());
        assert!(!JobStatus::Completed.is_active());
        assert!(!JobStatus::Failed.is_active());
        assert!(!JobStatus::Cancelled.is_active());
    }

    #[test]
    fn test_job_status_terminal_flags() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Downloading.is_terminal());
    }

    #[test]
    fn test_valid_happy_path_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Analyzing));
        assert!(JobStatus::Analyzing.can_transition_to(JobStatus::Downloading));
        assert!(JobStatus::Downloading.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_valid_failure_transitions() {
        assert!(JobStatus::Analyzing.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Downloading.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_pause_resume_transitions() {
        assert!(JobStatus::Downloading.can_transition_to(JobStatus::Paused));
        assert!(JobStatus::Paused.can_transition_to(JobStatus::Downloading));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Paused));
    }

    #[test]
    fn test_cancel_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Downloading.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Paused.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Downloading));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Downloading));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_job_check_transition() {
        let job = job_with_status("downloading");
        assert!(job.check_transition(JobStatus::Completed).is_ok());
        let err = job.check_transition(JobStatus::Analyzing).unwrap_err();
        assert!(err.to_string().contains("downloading"));
        assert!(err.to_string().contains("analyzing"));
    }

    #[test]
    fn test_job_status_fallback_on_invalid() {
        let job = job_with_status("garbage");
        assert_eq!(job.status(), JobStatus::Pending);
    }

    // ==================== ChunkStatus Tests ====================

    #[test]
    fn test_chunk_status_roundtrip() {
        for status in [
            ChunkStatus::Pending,
            ChunkStatus::Downloading,
            ChunkStatus::Completed,
            ChunkStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ChunkStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_chunk_len() {
        let chunk = Chunk {
            id: 1,
            job_pk: 1,
            chunk_index: 0,
            start_byte: 0,
            end_byte: 1023,
            downloaded_bytes: 0,
            status_str: "pending".to_string(),
            temp_path: "/tmp/chunk_0.part".to_string(),
        };
        assert_eq!(chunk.len(), 1024);
        assert!(!chunk.is_empty());
    }

    // ==================== Token Tests ====================

    #[test]
    fn test_generate_job_token_format() {
        let token = generate_job_token();
        assert!(token.starts_with("job_"));
        assert_eq!(token.len(), 4 + 32);
    }

    #[test]
    fn test_generate_job_token_unique() {
        let a = generate_job_token();
        let b = generate_job_token();
        assert_ne!(a, b);
    }
}
