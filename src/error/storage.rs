// Storage error types
//
// A failed local write means the session outcome is lost, which is the one
// unrecoverable failure in the core. These errors are surfaced distinctly
// from transport errors and must never be swallowed.

use log::error;
use std::fmt;

/// Errors raised by the encrypted local store
#[derive(Debug)]
pub enum StorageError {
    /// Filesystem operation failed
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Encryption or decryption failed (bad key, tampered file)
    Crypto { reason: String },

    /// Record could not be serialized or deserialized
    Serde { reason: String },

    /// The vault key file could not be loaded or created
    KeyUnavailable { reason: String },
}

/// Log a storage error with its operation context.
///
/// Persistence failures must be loudly reported, never just dropped; callers
/// that cannot propagate the error further should at minimum go through here.
pub fn log_storage_error(err: &StorageError, context: &str) {
    error!("[Storage] {} failed: {}", context, err);
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io { path, source } => {
                write!(f, "storage I/O error on {}: {}", path, source)
            }
            StorageError::Crypto { reason } => write!(f, "crypto failure: {}", reason),
            StorageError::Serde { reason } => {
                write!(f, "record (de)serialization failed: {}", reason)
            }
            StorageError::KeyUnavailable { reason } => {
                write!(f, "vault key unavailable: {}", reason)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serde {
            reason: err.to_string(),
        }
    }
}
