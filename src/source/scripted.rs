// Scripted sample source
//
// Deterministic source for tests and offline replay: plays back a fixed
// poll sequence, then repeats a configurable exhausted answer forever.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::TransportError;
use crate::source::{SamplePoll, SampleSource, SensorReading};

pub struct ScriptedSource {
    polls: VecDeque<SamplePoll>,
    exhausted: SamplePoll,
    released: bool,
}

impl ScriptedSource {
    pub fn new(polls: Vec<SamplePoll>) -> Self {
        Self {
            polls: polls.into(),
            exhausted: SamplePoll::Disconnected,
            released: false,
        }
    }

    /// Build from plain (angle, force) readings.
    pub fn from_readings(readings: &[(f64, f64)]) -> Self {
        Self::new(
            readings
                .iter()
                .map(|&(angle, force)| SamplePoll::Sample(SensorReading { angle, force }))
                .collect(),
        )
    }

    /// Answer returned forever once the script runs out (default
    /// `Disconnected`).
    pub fn when_exhausted(mut self, poll: SamplePoll) -> Self {
        self.exhausted = poll;
        self
    }

    pub fn was_released(&self) -> bool {
        self.released
    }
}

impl SampleSource for ScriptedSource {
    fn next_sample(&mut self, _timeout: Duration) -> SamplePoll {
        self.polls.pop_front().unwrap_or_else(|| self.exhausted.clone())
    }

    fn release(&mut self) -> Result<(), TransportError> {
        self.released = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plays_script_then_exhausted_answer() {
        let mut source =
            ScriptedSource::from_readings(&[(10.0, 1.0)]).when_exhausted(SamplePoll::Timeout);
        let timeout = Duration::from_millis(1);

        assert!(matches!(source.next_sample(timeout), SamplePoll::Sample(_)));
        assert_eq!(source.next_sample(timeout), SamplePoll::Timeout);
        assert_eq!(source.next_sample(timeout), SamplePoll::Timeout);
    }

    #[test]
    fn test_release_is_observable() {
        let mut source = ScriptedSource::new(vec![]);
        assert!(!source.was_released());
        source.release().unwrap();
        assert!(source.was_released());
    }
}
