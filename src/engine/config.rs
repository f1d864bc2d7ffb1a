//! Transfer engine configuration.
//!
//! All tuning knobs the engine consumes live in one explicit structure
//! passed in at construction, instead of scattered ambient constants.

use std::time::Duration;

use super::EngineError;

/// Minimum allowed per-job chunk concurrency.
const MIN_CONCURRENT_CHUNKS: usize = 1;

/// Maximum allowed per-job chunk concurrency.
const MAX_CONCURRENT_CHUNKS: usize = 64;

/// Default per-job chunk concurrency.
pub const DEFAULT_CONCURRENT_CHUNKS: usize = 4;

/// One chunk-size tier: files at or above `min_file_size` use `chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizeTier {
    /// Lower bound (inclusive) of file sizes this tier applies to.
    pub min_file_size: u64,
    /// Chunk size used for files in this tier.
    pub chunk_size: u64,
}

/// Configuration for the transfer engine.
///
/// # Defaults
///
/// - `max_concurrent_chunks`: 4
/// - `chunk_size_tiers`: ≥1 GiB → 10 MiB, ≥100 MiB → 5 MiB, else 1 MiB
/// - `chunk_retry_limit`: 3 attempts per chunk
/// - `job_wall_clock_timeout`: 6 hours
/// - `connect_timeout`: 30s, `read_timeout`: 5 minutes
/// - `progress_emit_min_delta_pct`: 1.0, `progress_emit_max_silence`: 10s
/// - `cancel_poll_interval`: 500ms
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded worker pool size for one job's chunk set.
    pub max_concurrent_chunks: usize,
    /// Size-tiered chunk sizing policy, sorted by `min_file_size` descending.
    pub chunk_size_tiers: Vec<ChunkSizeTier>,
    /// Maximum attempts per chunk (including the first).
    pub chunk_retry_limit: u32,
    /// Overall wall-clock ceiling for one job's transfer.
    pub job_wall_clock_timeout: Duration,
    /// Per-request connect timeout.
    pub connect_timeout: Duration,
    /// Per-request read timeout.
    pub read_timeout: Duration,
    /// Minimum progress delta (percent) that forces an event emission.
    pub progress_emit_min_delta_pct: f64,
    /// Maximum silence between progress events regardless of delta.
    pub progress_emit_max_silence: Duration,
    /// How often the engine re-reads the persisted status for cancellation.
    pub cancel_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_chunks: DEFAULT_CONCURRENT_CHUNKS,
            chunk_size_tiers: default_chunk_size_tiers(),
            chunk_retry_limit: 3,
            job_wall_clock_timeout: Duration::from_secs(6 * 3600),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(300),
            progress_emit_min_delta_pct: 1.0,
            progress_emit_max_silence: Duration::from_secs(10),
            cancel_poll_interval: Duration::from_millis(500),
        }
    }
}

/// Default size-tiered chunk policy: larger chunks for larger files.
#[must_use]
pub fn default_chunk_size_tiers() -> Vec<ChunkSizeTier> {
    vec![
        ChunkSizeTier {
            min_file_size: 1024 * 1024 * 1024,
            chunk_size: 10 * 1024 * 1024,
        },
        ChunkSizeTier {
            min_file_size: 100 * 1024 * 1024,
            chunk_size: 5 * 1024 * 1024,
        },
        ChunkSizeTier {
            min_file_size: 0,
            chunk_size: 1024 * 1024,
        },
    ]
}

impl EngineConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] when concurrency is out of
    /// range, the retry limit is zero, the tier table is empty or contains a
    /// zero chunk size, or no tier covers small files.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(MIN_CONCURRENT_CHUNKS..=MAX_CONCURRENT_CHUNKS).contains(&self.max_concurrent_chunks) {
            return Err(EngineError::invalid_config(format!(
                "max_concurrent_chunks {} outside {MIN_CONCURRENT_CHUNKS}..={MAX_CONCURRENT_CHUNKS}",
                self.max_concurrent_chunks
            )));
        }
        if self.chunk_retry_limit == 0 {
            return Err(EngineError::invalid_config(
                "chunk_retry_limit must be at least 1",
            ));
        }
        if self.chunk_size_tiers.is_empty() {
            return Err(EngineError::invalid_config("chunk_size_tiers is empty"));
        }
        if self.chunk_size_tiers.iter().any(|t| t.chunk_size == 0) {
            return Err(EngineError::invalid_config(
                "chunk_size_tiers contains a zero chunk size",
            ));
        }
        if !self.chunk_size_tiers.iter().any(|t| t.min_file_size == 0) {
            return Err(EngineError::invalid_config(
                "chunk_size_tiers must include a tier with min_file_size 0",
            ));
        }
        Ok(())
    }

    /// Returns the chunk size for a file of `file_size` bytes.
    ///
    /// Picks the tier with the largest `min_file_size` not exceeding the
    /// file size. The default table guarantees a catch-all tier.
    #[must_use]
    pub fn chunk_size_for(&self, file_size: u64) -> u64 {
        self.chunk_size_tiers
            .iter()
            .filter(|t| file_size >= t.min_file_size)
            .max_by_key(|t| t.min_file_size)
            .map_or(1024 * 1024, |t| t.chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = EngineConfig {
            max_concurrent_chunks: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_excessive_concurrency() {
        let config = EngineConfig {
            max_concurrent_chunks: 65,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_retry_limit() {
        let config = EngineConfig {
            chunk_retry_limit: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_tiers() {
        let config = EngineConfig {
            chunk_size_tiers: Vec::new(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_catch_all_tier() {
        let config = EngineConfig {
            chunk_size_tiers: vec![ChunkSizeTier {
                min_file_size: 100,
                chunk_size: 10,
            }],
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_size_tiers_small_file() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size_for(10 * 1024 * 1024), 1024 * 1024);
    }

    #[test]
    fn test_chunk_size_tiers_medium_file() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size_for(200 * 1024 * 1024), 5 * 1024 * 1024);
    }

    #[test]
    fn test_chunk_size_tiers_large_file() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size_for(2 * 1024 * 1024 * 1024), 10 * 1024 * 1024);
    }

    #[test]
    fn test_chunk_size_tier_boundary_exact() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size_for(100 * 1024 * 1024), 5 * 1024 * 1024);
        assert_eq!(config.chunk_size_for(100 * 1024 * 1024 - 1), 1024 * 1024);
    }
}
