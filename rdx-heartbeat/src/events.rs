//! Typed events broadcast by a [`crate::heartbeat::Heartbeat`].
//!
//! Subscribers receive these over a `tokio::sync::broadcast` channel; a
//! heartbeat with no subscribers simply drops them. The stream reports state
//! transitions and per-tick outcomes, it carries no delivery guarantees.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Events describing the lifecycle and ticks of a heartbeat.
#[derive(Debug, Clone)]
pub enum HeartbeatEvent {
    /// The heartbeat was started (or restarted) with the given pulse.
    Started {
        pulse: Option<Duration>,
        timestamp: DateTime<Utc>,
    },
    /// The heartbeat was stopped; no beats occur after this.
    Stopped,
    /// Upcoming beats were marked to be skipped.
    Delayed { pending_skips: u64 },
    /// A beat fired and the registry was executed.
    Beat { beat_count: u64 },
    /// A beat was suppressed by the skip counter.
    BeatSkipped { remaining: u64 },
}
