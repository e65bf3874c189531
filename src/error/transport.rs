// Transport error types
//
// Errors on the sensor link. These never abort a running session: the
// control loop degrades to "no live data" and surfaces the status.

use std::fmt;

/// Errors raised by the sensor transport layer
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The serial link dropped or was never present
    Disconnected,

    /// A read on the link failed at the I/O level
    ReadFailed { reason: String },

    /// Writing the device setup commands failed
    SetupFailed { reason: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Disconnected => write!(f, "sensor link disconnected"),
            TransportError::ReadFailed { reason } => {
                write!(f, "sensor read failed: {}", reason)
            }
            TransportError::SetupFailed { reason } => {
                write!(f, "device setup failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::ReadFailed {
            reason: err.to_string(),
        }
    }
}
