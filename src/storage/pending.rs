// Pending upload queue
//
// Durable local holding area for finalized session records awaiting
// confirmed upstream delivery. The core's responsibility ends at the
// atomic local write; only the sync collaborator deletes entries, and
// only after the upload succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use log::warn;

use crate::error::StorageError;
use crate::session::{SessionRecord, SessionSummary};
use crate::storage::Vault;

const SESSION_FILE_SUFFIX: &str = ".json.enc";

/// Per-patient encrypted pending queue under `<data_dir>/pending/`.
#[derive(Clone)]
pub struct PendingStore {
    root: PathBuf,
    vault: Arc<Vault>,
}

impl PendingStore {
    pub fn new(data_dir: impl Into<PathBuf>, vault: Arc<Vault>) -> Self {
        Self {
            root: data_dir.into().join("pending"),
            vault,
        }
    }

    /// Directory holding one patient's pending session files.
    pub fn patient_dir(&self, patient: &str) -> PathBuf {
        self.root.join(patient)
    }

    /// Write a finalized record to the patient's pending queue.
    ///
    /// The file name encodes the patient id, the session start stamp and
    /// the session id; since the id is fixed at session start, a retry
    /// overwrites the same entry atomically instead of duplicating it.
    pub fn persist(&self, record: &SessionRecord) -> Result<PathBuf, StorageError> {
        let path = self.patient_dir(&record.patient).join(format!(
            "{}_session_{}_{}{}",
            record.patient,
            file_stamp(&record.started_at),
            record.session_id,
            SESSION_FILE_SUFFIX
        ));

        let json = serde_json::to_vec_pretty(record)?;
        self.vault.write_encrypted(&path, &json)?;
        Ok(path)
    }

    /// All pending session files for a patient, oldest first.
    pub fn list(&self, patient: &str) -> Result<Vec<PathBuf>, StorageError> {
        let dir = self.patient_dir(patient);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir).map_err(|err| StorageError::Io {
            path: dir.display().to_string(),
            source: err,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy().ends_with(SESSION_FILE_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Decrypt and parse a full session record.
    pub fn read_record(&self, path: &Path) -> Result<SessionRecord, StorageError> {
        let json = self.vault.read_encrypted(path)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Decrypt and parse only the summary view of a session file.
    pub fn read_summary(&self, path: &Path) -> Result<SessionSummary, StorageError> {
        let json = self.vault.read_encrypted(path)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Session history for a patient, most recent first.
    ///
    /// Unreadable files are skipped with a warning so one corrupt entry
    /// cannot hide the rest of the history.
    pub fn list_summaries(&self, patient: &str) -> Vec<SessionSummary> {
        let files = match self.list(patient) {
            Ok(files) => files,
            Err(err) => {
                warn!("[Pending] Could not list sessions for {}: {}", patient, err);
                return Vec::new();
            }
        };

        let mut summaries: Vec<SessionSummary> = files
            .iter()
            .filter_map(|path| match self.read_summary(path) {
                Ok(summary) => Some(summary),
                Err(err) => {
                    warn!("[Pending] Skipping unreadable {}: {}", path.display(), err);
                    None
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        summaries
    }

    /// Remove an entry after the sync collaborator confirmed delivery.
    pub fn confirm_uploaded(&self, path: &Path) -> Result<(), StorageError> {
        std::fs::remove_file(path).map_err(|err| StorageError::Io {
            path: path.display().to_string(),
            source: err,
        })
    }
}

/// Compact `YYYYmmdd_HHMMSS` stamp for file names, derived from the record
/// body so retries produce the same name.
fn file_stamp(started_at: &str) -> String {
    match NaiveDateTime::parse_from_str(started_at, "%Y-%m-%d %H:%M:%S") {
        Ok(dt) => dt.format("%Y%m%d_%H%M%S").to_string(),
        Err(_) => started_at
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect(),
    }
}
