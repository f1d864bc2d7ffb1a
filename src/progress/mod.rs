//! Progress aggregation and live event publishing.
//!
//! Workers push [`ByteProgress`] messages over an mpsc channel; the
//! [`ProgressAggregator`] folds the latest counter per chunk into job-level
//! downloaded bytes, percentage, smoothed speed, and ETA. The
//! [`EventPublisher`](publisher::EventPublisher) turns snapshots and state
//! transitions into a throttled typed event stream.

mod aggregator;
mod publisher;

pub use aggregator::{ByteProgress, ProgressAggregator, ProgressSnapshot};
pub use publisher::{Event, EventPublisher, Subscription, ThrottlePolicy};
