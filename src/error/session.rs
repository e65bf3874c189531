// Session error types
//
// Configuration errors are fatal to session start and are reported before
// the Sample Source is engaged. Lifecycle errors cover misuse of the
// driver handle; persistence failures are wrapped so the control loop can
// report them explicitly.

use crate::error::StorageError;
use std::fmt;

/// Errors raised by session setup and lifecycle
#[derive(Debug)]
pub enum SessionError {
    /// Plan failed boundary validation; the session is refused
    InvalidPlan { reason: String },

    /// A session is already running on this driver
    AlreadyRunning,

    /// No session is running
    NotRunning,

    /// The finalized record could not be written to local storage
    Persistence(StorageError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidPlan { reason } => {
                write!(f, "plan rejected: {}", reason)
            }
            SessionError::AlreadyRunning => {
                write!(f, "a session is already running on this driver")
            }
            SessionError::NotRunning => write!(f, "no session is running"),
            SessionError::Persistence(err) => {
                write!(f, "session result could not be persisted: {}", err)
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::Persistence(err)
    }
}
