//! Chunk planning for ranged transfers.
//!
//! Planning is pure arithmetic over the resolved file size and the
//! configured tier table. The resulting chunk set strictly partitions
//! `[0, size)`: no gaps, no overlaps, no zero-length ranges.

use crate::handler::RemoteInfo;

use super::config::EngineConfig;

/// One planned byte range, prior to persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    /// 0-based index defining merge order.
    pub index: u32,
    /// First byte (inclusive).
    pub start: u64,
    /// Last byte (inclusive).
    pub end: u64,
}

impl ChunkSpec {
    /// Length of the range in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Planned chunks are never empty; kept for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// How a transfer will be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    /// Concurrent ranged fetch of the given chunk set.
    Chunked(Vec<ChunkSpec>),
    /// Single-stream sequential fetch (no ranges, unknown size, or file
    /// small enough that one chunk would cover it).
    Sequential,
}

/// Decides the transfer plan for a resolved target.
///
/// Chunking requires confirmed range support and a known size strictly
/// larger than one chunk's worth; everything else falls back to a single
/// sequential stream. Zero-length origins are valid and sequential.
#[must_use]
pub fn plan_transfer(info: &RemoteInfo, config: &EngineConfig) -> TransferPlan {
    let Some(size) = info.size else {
        return TransferPlan::Sequential;
    };
    if !info.accepts_ranges {
        return TransferPlan::Sequential;
    }
    let chunk_size = config.chunk_size_for(size);
    if size <= chunk_size {
        return TransferPlan::Sequential;
    }
    TransferPlan::Chunked(plan_chunks(size, chunk_size))
}

/// Partitions `[0, size)` into chunks of `chunk_size` bytes.
///
/// The final chunk absorbs the remainder and is never zero-length. Callers
/// must guarantee `size > 0` and `chunk_size > 0`.
#[must_use]
pub fn plan_chunks(size: u64, chunk_size: u64) -> Vec<ChunkSpec> {
    debug_assert!(size > 0 && chunk_size > 0);

    let count = size.div_ceil(chunk_size);
    let mut chunks = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    let mut start = 0u64;
    let mut index = 0u32;
    while start < size {
        let end = (start + chunk_size - 1).min(size - 1);
        chunks.push(ChunkSpec { index, start, end });
        start = end + 1;
        index += 1;
    }
    chunks
}
