//! Upload/sync contract over the pending queue.
//!
//! The concrete telemetry-service client lives outside the core; this
//! module fixes the contract it consumes: per-patient pending directories,
//! feed naming, the payload shape, and the rule that a local entry is
//! deleted only after every send for it succeeded.

use std::fmt;

use log::{info, warn};

use crate::error::StorageError;
use crate::session::SessionRecord;
use crate::storage::PendingStore;

/// Feed receiving one summary payload per session
pub fn session_feed(patient: &str) -> String {
    format!("{}-sesion", patient.to_lowercase())
}

/// Feed receiving per-sample angle values
pub fn angle_feed(patient: &str) -> String {
    format!("{}-angulo", patient.to_lowercase())
}

/// Feed receiving per-sample force values
pub fn force_feed(patient: &str) -> String {
    format!("{}-fuerza", patient.to_lowercase())
}

/// Error from the external upload transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadError {
    pub reason: String,
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upload failed: {}", self.reason)
    }
}

impl std::error::Error for UploadError {}

/// Transport the external sync collaborator plugs in.
pub trait UploadSink {
    fn send(&mut self, feed: &str, value: &str) -> Result<(), UploadError>;
}

/// Upload every pending session for `patient`, deleting each local file
/// only after all of its sends succeeded.
///
/// Per-file failures (unreadable entry, transport error) are logged and
/// the file is kept for the next drain; they never abort the whole pass.
/// Returns the number of sessions uploaded and removed.
pub fn drain_pending(
    store: &PendingStore,
    patient: &str,
    sink: &mut dyn UploadSink,
) -> Result<usize, StorageError> {
    let files = store.list(patient)?;
    let mut uploaded = 0;

    for path in files {
        let record = match store.read_record(&path) {
            Ok(record) => record,
            Err(err) => {
                warn!("[Sync] Skipping unreadable {}: {}", path.display(), err);
                continue;
            }
        };

        if let Err(err) = upload_record(&record, sink) {
            warn!(
                "[Sync] Upload failed for {}, keeping local copy: {}",
                path.display(),
                err
            );
            continue;
        }

        match store.confirm_uploaded(&path) {
            Ok(()) => {
                info!("[Sync] Session {} uploaded and removed", record.session_id);
                uploaded += 1;
            }
            Err(err) => {
                // The upload went through; the entry will be retried and
                // the receiver must deduplicate on session_id
                warn!(
                    "[Sync] Could not remove {} after upload: {}",
                    path.display(),
                    err
                );
            }
        }
    }

    Ok(uploaded)
}

fn upload_record(record: &SessionRecord, sink: &mut dyn UploadSink) -> Result<(), UploadError> {
    let angle_feed = angle_feed(&record.patient);
    let force_feed = force_feed(&record.patient);

    let marker = format!(
        "session start - id: {} | patient: {} | plan: {} | date: {}",
        record.session_id, record.patient, record.plan_id, record.started_at
    );
    sink.send(&angle_feed, &marker)?;
    sink.send(&force_feed, &marker)?;

    let summary = serde_json::to_string(&record.summary()).map_err(|err| UploadError {
        reason: format!("summary serialization: {}", err),
    })?;
    sink.send(&session_feed(&record.patient), &summary)?;

    for m in &record.measurements {
        sink.send(&angle_feed, &format!("{:.3}", m.angle()))?;
        sink.send(&force_feed, &format!("{:.3}", m.force()))?;
    }
    Ok(())
}
