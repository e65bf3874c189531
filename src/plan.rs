// Plan - therapist-authored exercise configuration
//
// A plan is owned by a patient, created and mutated only through the
// therapist-facing CRUD, and becomes immutable once embedded in a completed
// session record. Validation happens here, at the boundary, before a
// session may start.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Exercise mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlanMode {
    Active,
    Passive,
}

/// Which leg the device is fitted to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Leg {
    Right,
    Left,
}

/// Exercise type, also sent to the device as its setup command byte
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExerciseType {
    Flexion,
    Extension,
}

impl ExerciseType {
    /// Single-byte command the firmware expects during setup
    pub fn command_byte(self) -> u8 {
        match self {
            ExerciseType::Flexion => b'F',
            ExerciseType::Extension => b'E',
        }
    }
}

/// One exercise session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Unique per patient, monotonically assigned
    pub id: u32,
    pub mode: PlanMode,
    pub leg: Leg,
    pub exercise: ExerciseType,
    /// Spring setting, 1-3
    pub spring: u8,
    /// Minimum joint angle in degrees
    pub angle_min: f64,
    /// Maximum joint angle in degrees, must exceed `angle_min`
    pub angle_max: f64,
    pub target_repetitions: u32,
}

impl Plan {
    /// Validate plan boundaries before a session may start.
    ///
    /// Invalid plans refuse session start with a reported reason rather
    /// than being silently defaulted. The degenerate `angle_min == angle_max`
    /// case is rejected here too; the normalizer's substitution only guards
    /// an already-running session against division by zero.
    pub fn validate(&self) -> Result<(), SessionError> {
        if !self.angle_min.is_finite() || !self.angle_max.is_finite() {
            return Err(SessionError::InvalidPlan {
                reason: "angle range must be finite".to_string(),
            });
        }
        if self.angle_max <= self.angle_min {
            return Err(SessionError::InvalidPlan {
                reason: format!(
                    "angle_max ({}) must be greater than angle_min ({})",
                    self.angle_max, self.angle_min
                ),
            });
        }
        if self.target_repetitions == 0 {
            return Err(SessionError::InvalidPlan {
                reason: "target_repetitions must be positive".to_string(),
            });
        }
        if !(1..=3).contains(&self.spring) {
            return Err(SessionError::InvalidPlan {
                reason: format!("spring setting {} outside 1-3", self.spring),
            });
        }
        Ok(())
    }
}
