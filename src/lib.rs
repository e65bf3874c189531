// Kneeflex Core - knee rehabilitation trainer engine
// Real-time repetition tracking over a serial sensor stream with
// encrypted local session persistence.

// Module declarations
pub mod config;
pub mod error;
pub mod motion;
pub mod plan;
pub mod session;
pub mod source;
pub mod storage;
pub mod sync;

// Re-exports for convenience
pub use config::AppConfig;
pub use plan::Plan;
pub use session::{SessionDriver, SessionEvent, SessionSummary};

/// Initialize logging for binaries and examples.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .try_init();
}
