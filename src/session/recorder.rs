// Session recorder
//
// Accumulates every raw sample plus FSM outcomes into the in-memory
// session record. The measurement log is raw telemetry: samples are
// appended in arrival order regardless of repetition-detection state.
// Finalization runs at most once; the second call is a no-op.

use std::time::Instant;

use chrono::Local;
use log::info;
use rand::RngCore;

use crate::motion::RepCounters;
use crate::plan::Plan;
use crate::session::{Measurement, SessionRecord, SessionStatus};

/// Timestamp format used in record bodies
pub(crate) const STARTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Generate the 8-hex-uppercase session id.
///
/// Generated exactly once per session and embedded in both the pending
/// file name and the record body, which makes persist retries idempotent.
fn new_session_id() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[derive(Debug)]
pub struct SessionRecorder {
    plan: Plan,
    patient: String,
    session_id: String,
    started_at: String,
    start_instant: Instant,
    measurements: Vec<Measurement>,
    counters: RepCounters,
    score: u32,
    finalized: bool,
}

impl SessionRecorder {
    pub fn new(plan: Plan, patient: impl Into<String>) -> Self {
        Self {
            plan,
            patient: patient.into(),
            session_id: new_session_id(),
            started_at: Local::now().format(STARTED_AT_FORMAT).to_string(),
            start_instant: Instant::now(),
            measurements: Vec::new(),
            counters: RepCounters::default(),
            score: 0,
            finalized: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn sample_count(&self) -> usize {
        self.measurements.len()
    }

    /// Seconds elapsed since session start. Wall-clock: pause intervals
    /// are included.
    pub fn elapsed_s(&self) -> f64 {
        self.start_instant.elapsed().as_secs_f64()
    }

    /// Append a raw sample and return its relative timestamp.
    pub fn record_sample(&mut self, angle: f64, force: f64) -> f64 {
        let t = (self.elapsed_s() * 1000.0).round() / 1000.0;
        self.measurements.push(Measurement(t, angle, force));
        t
    }

    /// Adopt the counters snapshot from a completed repetition.
    pub fn apply_counters(&mut self, counters: RepCounters) {
        self.counters = counters;
    }

    /// Add presentation-layer score points.
    pub fn add_score(&mut self, points: u32) {
        self.score = self.score.saturating_add(points);
    }

    /// Finalize the session and build its immutable record.
    ///
    /// Returns `None` on the second and later calls. Status is `Completed`
    /// whenever the target was reached, even on a forced finish; otherwise
    /// `Partial`.
    pub fn finalize(&mut self, forced: bool) -> Option<SessionRecord> {
        if self.finalized {
            info!(
                "[Recorder] Ignoring duplicate finalize for session {}",
                self.session_id
            );
            return None;
        }
        self.finalized = true;

        let status = if self.counters.total >= self.plan.target_repetitions {
            SessionStatus::Completed
        } else {
            SessionStatus::Partial
        };
        if forced {
            info!(
                "[Recorder] Forced finish for session {}: {:?} at {}/{} reps",
                self.session_id, status, self.counters.total, self.plan.target_repetitions
            );
        }

        Some(SessionRecord {
            patient: self.patient.clone(),
            started_at: self.started_at.clone(),
            plan_id: self.plan.id,
            duration_s: self.elapsed_s() as u64,
            repetitions: format!("{}/{}", self.counters.total, self.plan.target_repetitions),
            correct: self.counters.correct,
            partial: self.counters.partial,
            incorrect: self.counters.incorrect,
            status,
            score: self.score,
            session_id: self.session_id.clone(),
            measurements: std::mem::take(&mut self.measurements),
        })
    }
}
