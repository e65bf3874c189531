// Error types for the trainer core
//
// This module defines per-domain error types following the taxonomy in the
// design: transport errors are recoverable and degrade to "no data",
// configuration errors are fatal to session start, and storage errors are
// the single loudly-reported unrecoverable failure.

mod session;
mod storage;
mod transport;

pub use session::SessionError;
pub use storage::{log_storage_error, StorageError};
pub use transport::TransportError;
