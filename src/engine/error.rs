//! Error types for the transfer engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::handler::HandlerError;

/// Errors that can occur while executing a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network-level error (DNS, connection refused, TLS, mid-stream drop).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx/5xx).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (429 responses).
        retry_after: Option<String>,
    },

    /// File system error while spilling or merging bytes.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The job URL failed to parse at execution time.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The origin closed the stream before the full range arrived.
    #[error("stream from {url} stalled at {received} of {expected} bytes")]
    Stalled {
        /// The URL whose stream ended early.
        url: String,
        /// Bytes received before the stream ended.
        received: u64,
        /// Bytes the range should have carried.
        expected: u64,
    },

    /// A chunk exhausted its retry budget.
    #[error(
        "chunk {index} (bytes {start}-{end}) failed after {attempts} attempts: {source}"
    )]
    ChunkExhausted {
        /// Index of the failing chunk.
        index: u32,
        /// First byte of the chunk's range.
        start: u64,
        /// Last byte of the chunk's range.
        end: u64,
        /// Attempts made before giving up.
        attempts: u32,
        /// The final attempt's error.
        #[source]
        source: Box<TransferError>,
    },

    /// A chunk temp file was missing or short at merge time.
    #[error(
        "merge failed: chunk {index} at {path} has {actual_bytes} bytes, expected {expected_bytes}"
    )]
    MergeCorrupt {
        /// Index of the offending chunk.
        index: u32,
        /// The chunk's temp file path.
        path: PathBuf,
        /// Bytes expected for the chunk's range.
        expected_bytes: u64,
        /// Bytes actually present.
        actual_bytes: u64,
    },

    /// The final artifact size does not match the declared total.
    #[error("integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Integrity {
        /// The artifact path that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// The job exceeded its wall-clock ceiling.
    #[error("job exceeded wall-clock limit of {limit_secs}s")]
    WallClockExceeded {
        /// The configured ceiling in seconds.
        limit_secs: u64,
    },

    /// The bound handler could not produce a fetchable target.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl TransferError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16, retry_after: Option<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

/// Errors in engine construction and orchestration.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The supplied configuration is unusable.
    #[error("invalid engine config: {reason}")]
    InvalidConfig {
        /// Why validation rejected it.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl EngineError {
    /// Creates an invalid-config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
