// Session events published to the presentation layer
//
// The sampling task never touches externally-visible state directly; it
// emits these over a broadcast channel and the control side applies them.
// Sends are fire-and-forget so sample arrival can never stall on a slow
// or absent subscriber.

use serde::{Deserialize, Serialize};

use crate::motion::{RepCounters, RepOutcome};
use crate::session::SessionSummary;

/// Live-data status of the sensor link as seen by the sampling task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Samples are arriving
    Live,
    /// The link is gone; the session continues without live data
    Degraded,
}

/// Events emitted during an active session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A sample was appended to the measurement log
    SampleRecorded {
        t_s: f64,
        angle: f64,
        force: f64,
        /// Normalized progress in [0, 1]
        progress: f64,
    },
    /// One repetition cycle completed and was classified
    RepetitionCompleted {
        outcome: RepOutcome,
        counters: RepCounters,
    },
    /// The sensor link changed state
    SourceStatusChanged { status: SourceStatus },
    Paused,
    Resumed,
    /// The session finalized and its record was persisted
    SessionEnded { summary: SessionSummary },
    /// The session was abandoned; nothing was persisted
    SessionDiscarded,
    /// The finalized record could not be written; the outcome is lost
    PersistFailed { reason: String },
}
