// Fixed-rate ticker
//
// Rate limiting for the sampling loop, independent of any presentation
// framework. Deadlines advance by a fixed period; after a stall (pause,
// slow read) the schedule realigns instead of bursting to catch up.

use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(rate_hz: u32) -> Self {
        let rate_hz = rate_hz.max(1);
        let period = Duration::from_secs_f64(1.0 / rate_hz as f64);
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleep until the next deadline, then advance it.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        }
        self.next += self.period;
        let now = Instant::now();
        if self.next < now {
            // Missed ticks are dropped, not replayed
            self.next = now + self.period;
        }
    }
}
