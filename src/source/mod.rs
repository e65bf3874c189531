//! Sample Source abstractions over the physical sensor link.
//!
//! The trainer device streams `"<angle>,<force>\n"` lines over serial; this
//! module owns the byte-level line contract and hides the transport behind
//! the [SampleSource] trait so the session core runs against real hardware,
//! capture files, or scripted test input without changes.

use std::time::Duration;

use crate::error::TransportError;
use crate::plan::Plan;

mod line;
mod scripted;

pub use line::{parse_sample_line, send_device_setup, LineSampleSource};
pub use scripted::ScriptedSource;

/// One raw sensor reading as produced by the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub angle: f64,
    pub force: f64,
}

/// Result of one polling attempt on a sample source
#[derive(Debug, Clone, PartialEq)]
pub enum SamplePoll {
    /// A valid sample arrived within the timeout
    Sample(SensorReading),
    /// No sample this tick (timeout, empty or malformed line)
    Timeout,
    /// The link is gone; the session continues without live data
    Disconnected,
}

/// Trait implemented by sensor transports.
///
/// The source is a single exclusively-owned resource: exactly one sampling
/// task polls it. `next_sample` must not block the caller beyond `timeout`,
/// and an indefinitely absent source is reported as `Disconnected` on every
/// poll rather than as an error.
pub trait SampleSource: Send {
    /// Send pre-session device configuration over the link. Failure leaves
    /// the session in degraded mode, it never refuses the session. Default
    /// no-op for sources without a command channel.
    fn prepare(&mut self, _plan: &Plan) -> Result<(), TransportError> {
        Ok(())
    }

    fn next_sample(&mut self, timeout: Duration) -> SamplePoll;

    /// Release the underlying transport. Best-effort: failures are logged
    /// by the caller, never fatal.
    fn release(&mut self) -> Result<(), TransportError>;
}
