// Session record types
//
// The persisted session file is a JSON object whose field names are the
// wire contract consumed by the history screens and the sync collaborator;
// Rust-side names stay descriptive and serde renames keep the contract.

use serde::{Deserialize, Serialize};

/// One timestamped measurement, serialized as a `[t, angle, force]` triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement(pub f64, pub f64, pub f64);

impl Measurement {
    pub fn t_s(&self) -> f64 {
        self.0
    }

    pub fn angle(&self) -> f64 {
        self.1
    }

    pub fn force(&self) -> f64 {
        self.2
    }
}

/// Terminal status of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// The target repetition count was reached
    Completed,
    /// The session ended early (forced finish) before reaching the target
    #[default]
    Partial,
}

/// Finalized, immutable session record as written to the pending queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "usuario")]
    pub patient: String,
    /// Start time, `%Y-%m-%d %H:%M:%S`
    #[serde(rename = "fecha")]
    pub started_at: String,
    #[serde(rename = "plan_usado")]
    pub plan_id: u32,
    #[serde(rename = "duracion_s")]
    pub duration_s: u64,
    /// `"total/target"`
    #[serde(rename = "repeticiones")]
    pub repetitions: String,
    #[serde(rename = "correctas")]
    pub correct: u32,
    #[serde(rename = "parciales")]
    pub partial: u32,
    #[serde(rename = "incorrectas")]
    pub incorrect: u32,
    #[serde(rename = "estado")]
    pub status: SessionStatus,
    pub score: u32,
    pub session_id: String,
    #[serde(rename = "mediciones")]
    pub measurements: Vec<Measurement>,
}

impl SessionRecord {
    /// Summary view without the measurement log.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            patient: self.patient.clone(),
            started_at: self.started_at.clone(),
            plan_id: self.plan_id,
            duration_s: self.duration_s,
            repetitions: self.repetitions.clone(),
            correct: self.correct,
            partial: self.partial,
            incorrect: self.incorrect,
            status: self.status,
            score: self.score,
            session_id: self.session_id.clone(),
        }
    }
}

/// Lightweight summary used for history listings and session-end events.
///
/// Deserialization is tolerant: history listing must survive records
/// written by older builds, so every field falls back to a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSummary {
    #[serde(rename = "usuario")]
    pub patient: String,
    #[serde(rename = "fecha")]
    pub started_at: String,
    #[serde(rename = "plan_usado")]
    pub plan_id: u32,
    #[serde(rename = "duracion_s")]
    pub duration_s: u64,
    #[serde(rename = "repeticiones")]
    pub repetitions: String,
    #[serde(rename = "correctas")]
    pub correct: u32,
    #[serde(rename = "parciales")]
    pub partial: u32,
    #[serde(rename = "incorrectas")]
    pub incorrect: u32,
    #[serde(rename = "estado")]
    pub status: SessionStatus,
    pub score: u32,
    pub session_id: String,
}

impl Default for SessionSummary {
    fn default() -> Self {
        Self {
            patient: String::new(),
            started_at: "-".to_string(),
            plan_id: 0,
            duration_s: 0,
            repetitions: "0/0".to_string(),
            correct: 0,
            partial: 0,
            incorrect: 0,
            status: SessionStatus::Partial,
            score: 0,
            session_id: String::new(),
        }
    }
}
