//! The concurrent chunked transfer engine.
//!
//! Planning, execution, retry, and merge for one job's transfer:
//! - [`EngineConfig`] - all tuning knobs in one explicit structure
//! - [`plan_transfer`] / [`plan_chunks`] - pure chunk planning
//! - [`TransferEngine`] - bounded worker pool, resume, merge, fallback
//! - [`ChunkRetryPolicy`] - per-chunk retry with backoff and jitter

mod config;
mod error;
mod plan;
mod retry;
mod transfer;

pub use config::{ChunkSizeTier, DEFAULT_CONCURRENT_CHUNKS, EngineConfig, default_chunk_size_tiers};
pub use error::{EngineError, TransferError};
pub use plan::{ChunkSpec, TransferPlan, plan_chunks, plan_transfer};
pub use retry::{ChunkRetryPolicy, FailureType, RetryDecision, classify_failure, parse_retry_after};
pub use transfer::{Interrupt, JobPaths, TransferEngine, TransferOutcome};
