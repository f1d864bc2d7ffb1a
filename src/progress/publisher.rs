//! Typed event publishing with throttling.
//!
//! The publisher owns one broadcast channel per live job. Progress events
//! are throttled: an update goes out only when status changed, progress
//! moved by at least the configured delta, or the max-silence interval
//! elapsed. Terminal events always go out and close the stream.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::job::JobStatus;

use super::aggregator::ProgressSnapshot;

/// Broadcast buffer per job; slow subscribers lag rather than block.
const CHANNEL_CAPACITY: usize = 64;

/// Default ceiling on one subscription's lifetime.
const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(1800);

/// A typed live-stream event.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Stream opened.
    Connected {
        /// Subscribed job token.
        job_id: String,
        /// Unix timestamp of the subscription.
        timestamp: u64,
    },
    /// Progress update.
    Progress {
        /// Job token.
        job_id: String,
        /// Current status string.
        status: JobStatus,
        /// Percentage 0-100, when total is known.
        progress: Option<f64>,
        /// Bytes confirmed so far.
        downloaded: u64,
        /// Declared total when known.
        total: Option<u64>,
        /// Smoothed speed in bytes/sec.
        speed_bps: Option<u64>,
        /// Estimated seconds remaining.
        eta_seconds: Option<u64>,
        /// Target filename.
        filename: String,
    },
    /// Transfer finished; artifact available.
    Completed {
        /// Job token.
        job_id: String,
        /// Reference usable to fetch the final artifact.
        save_path: String,
    },
    /// Transfer failed.
    Failed {
        /// Job token.
        job_id: String,
        /// Human-readable failure detail.
        error: String,
    },
    /// Transfer cancelled.
    Cancelled {
        /// Job token.
        job_id: String,
    },
    /// Stream closed normally.
    Disconnected,
    /// Stream exceeded its lifetime ceiling.
    Timeout,
}

impl Event {
    /// True for events that terminate a subscription.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. }
                | Self::Failed { .. }
                | Self::Cancelled { .. }
                | Self::Disconnected
                | Self::Timeout
        )
    }
}

/// Throttle rules for progress emission.
#[derive(Debug, Clone, Copy)]
pub struct ThrottlePolicy {
    /// Minimum progress delta (percent) that forces an emission.
    pub min_delta_pct: f64,
    /// Maximum silence between emissions regardless of delta.
    pub max_silence: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            min_delta_pct: 1.0,
            max_silence: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct ThrottleState {
    last_progress: Option<f64>,
    last_status: JobStatus,
    last_emit: Instant,
}

/// Publishes job events to per-job broadcast channels.
#[derive(Debug)]
pub struct EventPublisher {
    channels: DashMap<String, broadcast::Sender<Event>>,
    throttle_states: DashMap<String, ThrottleState>,
    policy: ThrottlePolicy,
}

impl EventPublisher {
    /// Creates a publisher with the given throttle policy.
    #[must_use]
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            channels: DashMap::new(),
            throttle_states: DashMap::new(),
            policy,
        }
    }

    /// Subscribes to a job's event stream.
    ///
    /// The returned subscription yields events until a terminal event or
    /// the stream timeout. A `Connected` event is delivered first.
    #[must_use]
    pub fn subscribe(&self, job_id: &str) -> Subscription {
        let sender = self
            .channels
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        let receiver = sender.subscribe();
        Subscription {
            receiver,
            deadline: Instant::now() + DEFAULT_STREAM_TIMEOUT,
            pending: Some(Event::Connected {
                job_id: job_id.to_string(),
                timestamp: unix_now(),
            }),
            done: false,
        }
    }

    /// Publishes an event unconditionally (state transitions, terminals).
    ///
    /// Terminal events tear down the per-job channel after delivery.
    pub fn publish(&self, job_id: &str, event: Event) {
        let terminal = event.is_terminal();
        if let Some(sender) = self.channels.get(job_id) {
            // Send errors just mean no subscriber is listening right now.
            let _ = sender.send(event);
        }
        if terminal {
            self.channels.remove(job_id);
            self.throttle_states.remove(job_id);
        }
    }

    /// Publishes a progress snapshot, subject to throttling.
    ///
    /// Emits iff the status changed, the progress moved at least
    /// `min_delta_pct`, or `max_silence` elapsed since the last emission.
    /// Returns whether an event was emitted.
    pub fn publish_progress(
        &self,
        job_id: &str,
        status: JobStatus,
        snapshot: &ProgressSnapshot,
        filename: &str,
    ) -> bool {
        let now = Instant::now();
        let should_emit = match self.throttle_states.get(job_id) {
            None => true,
            Some(state) => {
                let status_changed = state.last_status != status;
                let delta_reached = match (state.last_progress, snapshot.progress) {
                    (Some(last), Some(current)) => {
                        (current - last).abs() >= self.policy.min_delta_pct
                    }
                    (None, Some(_)) => true,
                    _ => false,
                };
                let silence_elapsed = now.duration_since(state.last_emit) >= self.policy.max_silence;
                status_changed || delta_reached || silence_elapsed
            }
        };

        if !should_emit {
            return false;
        }

        self.throttle_states.insert(
            job_id.to_string(),
            ThrottleState {
                last_progress: snapshot.progress,
                last_status: status,
                last_emit: now,
            },
        );

        debug!(job_id = %job_id, progress = ?snapshot.progress, "emitting progress event");
        self.publish(
            job_id,
            Event::Progress {
                job_id: job_id.to_string(),
                status,
                progress: snapshot.progress,
                downloaded: snapshot.downloaded,
                total: snapshot.total,
                speed_bps: snapshot.speed_bps,
                eta_seconds: snapshot.eta_seconds,
                filename: filename.to_string(),
            },
        );
        true
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(ThrottlePolicy::default())
    }
}

/// A live event stream for one job.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
    deadline: Instant,
    pending: Option<Event>,
    done: bool,
}

impl Subscription {
    /// Yields the next event, or `None` once the stream has terminated.
    ///
    /// Terminates after delivering a terminal event, or with a final
    /// `Timeout` event when the stream ceiling is reached. Lagged
    /// subscribers skip missed events and keep receiving.
    pub async fn next(&mut self) -> Option<Event> {
        if self.done {
            return None;
        }
        if let Some(event) = self.pending.take() {
            return Some(event);
        }

        loop {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.done = true;
                return Some(Event::Timeout);
            }
            match tokio::time::timeout(remaining, self.receiver.recv()).await {
                Ok(Ok(event)) => {
                    if event.is_terminal() {
                        self.done = true;
                    }
                    return Some(event);
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    debug!(skipped, "subscription lagged; continuing");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    self.done = true;
                    return Some(Event::Disconnected);
                }
                Err(_) => {
                    self.done = true;
                    return Some(Event::Timeout);
                }
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
