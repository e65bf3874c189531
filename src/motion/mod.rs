//! Motion analysis: angle normalization and repetition detection.
//!
//! The Sample Source feeds raw angles in here; the output is a stream of
//! classified repetition events consumed by the session recorder and the
//! presentation layer.

mod normalize;
mod repetition;

pub use normalize::normalize;
pub use repetition::{
    RepCounters, RepOutcome, RepetitionEvent, RepetitionTracker, NEAR_MAX_THRESHOLD,
    NEAR_MIN_THRESHOLD, PARTIAL_THRESHOLD,
};
