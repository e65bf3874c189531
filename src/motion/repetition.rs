// Repetition detection state machine
//
// Tracks one repetition cycle at a time over the normalized progress
// stream. The machine is edge-triggered on returns to the minimum
// threshold, not on reaching the maximum: a repetition is entirely defined
// by consecutive visits to the minimum with some excursion in between.
// Classification happens exactly once per completed cycle.

use serde::{Deserialize, Serialize};

/// Progress at or below this counts as "at the minimum"
pub const NEAR_MIN_THRESHOLD: f64 = 0.10;
/// Progress at or above this counts as "reached the maximum"
pub const NEAR_MAX_THRESHOLD: f64 = 0.98;
/// Peak progress at or above this downgrades a missed maximum to Partial
pub const PARTIAL_THRESHOLD: f64 = 0.50;

/// Quality classification of one completed repetition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RepOutcome {
    /// The maximum threshold was reached during the cycle
    Correct,
    /// Peak progress reached at least half range but not the maximum
    Partial,
    /// Peak progress stayed below half range
    Incorrect,
}

/// Running repetition counters for the active session
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepCounters {
    pub total: u32,
    pub correct: u32,
    pub partial: u32,
    pub incorrect: u32,
}

impl RepCounters {
    fn record(&mut self, outcome: RepOutcome) {
        self.total += 1;
        match outcome {
            RepOutcome::Correct => self.correct += 1,
            RepOutcome::Partial => self.partial += 1,
            RepOutcome::Incorrect => self.incorrect += 1,
        }
    }
}

/// Emitted when a repetition cycle completes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepetitionEvent {
    pub outcome: RepOutcome,
    /// Counters after recording this repetition
    pub counters: RepCounters,
    /// True when this repetition reached the session target; the tracker
    /// is terminal afterwards and processes no further samples
    pub session_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WaitingMin,
    GoingUp,
}

/// Repetition FSM fed with normalized progress samples
#[derive(Debug)]
pub struct RepetitionTracker {
    target: u32,
    phase: Phase,
    max_reached: bool,
    peak: f64,
    counters: RepCounters,
    complete: bool,
}

impl RepetitionTracker {
    pub fn new(target: u32) -> Self {
        Self {
            target,
            phase: Phase::WaitingMin,
            max_reached: false,
            peak: 0.0,
            counters: RepCounters::default(),
            complete: false,
        }
    }

    pub fn counters(&self) -> RepCounters {
        self.counters
    }

    /// Whether the session target has been reached (terminal state)
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Feed one normalized progress sample.
    ///
    /// Returns an event only when a repetition cycle completes. After the
    /// target is reached the tracker is terminal and ignores all input.
    pub fn process(&mut self, p: f64) -> Option<RepetitionEvent> {
        if self.complete {
            return None;
        }

        let near_min = p <= NEAR_MIN_THRESHOLD;
        let near_max = p >= NEAR_MAX_THRESHOLD;

        match self.phase {
            Phase::WaitingMin => {
                if near_min {
                    self.phase = Phase::GoingUp;
                    self.max_reached = false;
                    self.peak = p;
                }
                None
            }
            Phase::GoingUp => {
                self.peak = self.peak.max(p);
                if near_max {
                    self.max_reached = true;
                }
                if near_min && self.peak > NEAR_MIN_THRESHOLD {
                    let outcome = if self.max_reached {
                        RepOutcome::Correct
                    } else if self.peak >= PARTIAL_THRESHOLD {
                        RepOutcome::Partial
                    } else {
                        RepOutcome::Incorrect
                    };
                    self.counters.record(outcome);

                    if self.counters.total >= self.target {
                        self.complete = true;
                    } else {
                        // The closing minimum opens the next cycle
                        self.max_reached = false;
                        self.peak = p;
                    }
                    return Some(RepetitionEvent {
                        outcome,
                        counters: self.counters,
                        session_complete: self.complete,
                    });
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut RepetitionTracker, samples: &[f64]) -> Vec<RepetitionEvent> {
        samples.iter().filter_map(|&p| tracker.process(p)).collect()
    }

    #[test]
    fn test_two_full_cycles_yield_two_correct() {
        let mut tracker = RepetitionTracker::new(2);
        let events = feed(&mut tracker, &[0.05, 0.99, 0.05, 0.99, 0.05]);

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.outcome == RepOutcome::Correct));
        assert!(!events[0].session_complete);
        assert!(events[1].session_complete);
        assert!(tracker.is_complete());
        assert_eq!(tracker.counters().correct, 2);
    }

    #[test]
    fn test_single_cycle_below_target_is_not_complete() {
        let mut tracker = RepetitionTracker::new(4);
        let events = feed(&mut tracker, &[0.05, 0.99, 0.05]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, RepOutcome::Correct);
        assert!(!events[0].session_complete);
        assert_eq!(tracker.counters().total, 1);
        assert!(!tracker.is_complete());
    }

    #[test]
    fn test_half_range_cycle_is_partial() {
        let mut tracker = RepetitionTracker::new(4);
        let events = feed(&mut tracker, &[0.05, 0.60, 0.05]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, RepOutcome::Partial);
    }

    #[test]
    fn test_shallow_cycle_is_incorrect() {
        let mut tracker = RepetitionTracker::new(4);
        let events = feed(&mut tracker, &[0.05, 0.30, 0.05]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, RepOutcome::Incorrect);
    }

    #[test]
    fn test_flat_at_minimum_never_completes_a_rep() {
        let mut tracker = RepetitionTracker::new(2);
        let events = feed(&mut tracker, &[0.0; 500]);

        assert!(events.is_empty());
        assert_eq!(tracker.counters().total, 0);
    }

    #[test]
    fn test_no_rep_without_initial_minimum() {
        // Starting high never arms the cycle; only a visit to the minimum does
        let mut tracker = RepetitionTracker::new(2);
        let events = feed(&mut tracker, &[0.99, 0.99, 0.50]);
        assert!(events.is_empty());

        // First minimum arms it, the next excursion counts
        let events = feed(&mut tracker, &[0.05, 0.99, 0.05]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, RepOutcome::Correct);
    }

    #[test]
    fn test_terminal_after_target() {
        let mut tracker = RepetitionTracker::new(1);
        let events = feed(&mut tracker, &[0.05, 0.99, 0.05]);
        assert_eq!(events.len(), 1);
        assert!(tracker.is_complete());

        // Further perfect cycles are ignored
        let events = feed(&mut tracker, &[0.05, 0.99, 0.05, 0.99, 0.05]);
        assert!(events.is_empty());
        assert_eq!(tracker.counters().total, 1);
    }

    #[test]
    fn test_noisy_dips_inside_cycle_update_peak_only() {
        // Dips that stay above near_min must not close the cycle
        let mut tracker = RepetitionTracker::new(4);
        let events = feed(&mut tracker, &[0.05, 0.40, 0.20, 0.70, 0.99, 0.30, 0.05]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, RepOutcome::Correct);
    }

    #[test]
    fn test_back_to_back_cycles_share_the_closing_minimum() {
        // The minimum that closes one rep immediately arms the next
        let mut tracker = RepetitionTracker::new(10);
        let events = feed(&mut tracker, &[0.05, 0.60, 0.05, 0.60, 0.05, 0.60, 0.05]);

        assert_eq!(events.len(), 3);
        assert_eq!(tracker.counters().partial, 3);
    }

    #[test]
    fn test_counters_accumulate_by_outcome() {
        let mut tracker = RepetitionTracker::new(10);
        feed(
            &mut tracker,
            &[
                0.05, 0.99, 0.05, // correct
                0.60, 0.05, // partial
                0.30, 0.05, // incorrect
            ],
        );

        let c = tracker.counters();
        assert_eq!(c.total, 3);
        assert_eq!(c.correct, 1);
        assert_eq!(c.partial, 1);
        assert_eq!(c.incorrect, 1);
    }
}
