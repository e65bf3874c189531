//! Session lifecycle: recording, summarization and orchestration.
//!
//! Data flow: Sample Source -> normalizer -> repetition FSM -> recorder ->
//! pending queue. The driver owns the sampling thread and pushes
//! pause/cancel signals into every downstream stage.

mod driver;
mod events;
mod record;
mod recorder;
mod ticker;

pub use driver::{SessionDriver, SessionHandle};
pub use events::{SessionEvent, SourceStatus};
pub use record::{Measurement, SessionRecord, SessionStatus, SessionSummary};
pub use recorder::SessionRecorder;
pub use ticker::Ticker;
