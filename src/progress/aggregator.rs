//! Job-level progress folding.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Instant;

/// Number of one-second speed samples in the sliding window.
const SPEED_WINDOW: usize = 10;

/// One progress message from a transfer worker.
///
/// Counters are absolute per chunk (bytes confirmed so far), not deltas, so
/// the aggregator only ever needs the latest message per chunk and a lost
/// message can never skew totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteProgress {
    /// Index of the reporting chunk (0 for sequential transfers).
    pub chunk_index: u32,
    /// Bytes confirmed on disk for this chunk.
    pub downloaded: u64,
}

/// A folded, job-level view of transfer progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Total bytes confirmed across all chunks.
    pub downloaded: u64,
    /// Declared total when known.
    pub total: Option<u64>,
    /// Percentage 0-100 (two decimals); None while total is unknown.
    pub progress: Option<f64>,
    /// Sliding-window mean speed in bytes/sec; None before the first sample.
    pub speed_bps: Option<u64>,
    /// Estimated seconds remaining; None without total or speed.
    pub eta_seconds: Option<u64>,
}

/// Folds per-chunk byte counters into job-level progress.
///
/// Read-mostly: the aggregator never mutates chunk state, it only observes
/// counters. Speed is a short sliding-window average of bytes-per-second
/// samples rather than an instantaneous derivative, damping jitter from
/// bursty chunk completions.
#[derive(Debug)]
pub struct ProgressAggregator {
    total: Option<u64>,
    counters: HashMap<u32, u64>,
    samples: VecDeque<u64>,
    last_sample_at: Instant,
    last_sample_bytes: u64,
}

impl ProgressAggregator {
    /// Creates an aggregator for a job with the given declared total.
    ///
    /// `initial_downloaded` seeds resumed jobs so speed samples measure only
    /// newly transferred bytes.
    #[must_use]
    pub fn new(total: Option<u64>, initial_downloaded: u64) -> Self {
        Self {
            total,
            counters: HashMap::new(),
            samples: VecDeque::with_capacity(SPEED_WINDOW),
            last_sample_at: Instant::now(),
            last_sample_bytes: initial_downloaded,
        }
    }

    /// Records the latest counter for a chunk.
    pub fn record(&mut self, progress: ByteProgress) {
        self.counters.insert(progress.chunk_index, progress.downloaded);
    }

    /// Seeds a chunk counter (used when resuming with prior byte counts).
    pub fn seed(&mut self, chunk_index: u32, downloaded: u64) {
        self.counters.insert(chunk_index, downloaded);
    }

    /// Total bytes confirmed across all chunks.
    #[must_use]
    pub fn downloaded(&self) -> u64 {
        self.counters.values().sum()
    }

    /// Takes a speed sample over the elapsed interval since the last one.
    ///
    /// Call roughly once per second; sub-100ms intervals are ignored to
    /// avoid wild instantaneous rates.
    pub fn sample(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_sample_at);
        if elapsed.as_millis() < 100 {
            return;
        }
        let downloaded = self.downloaded();
        let delta = downloaded.saturating_sub(self.last_sample_bytes);
        let rate = (delta as f64 / elapsed.as_secs_f64()) as u64;

        if self.samples.len() == SPEED_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(rate);
        self.last_sample_at = now;
        self.last_sample_bytes = downloaded;
    }

    /// Returns the current folded snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let downloaded = self.downloaded();

        let progress = self.total.map(|total| {
            if total == 0 {
                // Zero-length origins report unknown progress until
                // completion, at which point the caller reports 100.
                0.0
            } else {
                round2((downloaded as f64 / total as f64) * 100.0).min(100.0)
            }
        });

        let speed_bps = if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<u64>() / self.samples.len() as u64)
        };

        let eta_seconds = match (self.total, speed_bps) {
            (Some(total), Some(speed)) if speed > 0 && total > downloaded => {
                Some((total - downloaded).div_ceil(speed))
            }
            _ => None,
        };

        ProgressSnapshot {
            downloaded,
            total: self.total,
            progress,
            speed_bps,
            eta_seconds,
        }
    }
}

/// Rounds to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
