//! Checkpoint records for resuming interrupted conversions.
//!
//! One JSON record per job fingerprint lives under the checkpoints directory.
//! The orchestrator saves after every completed unit, so a save must be cheap
//! relative to unit duration and durable across an abrupt process kill
//! between units. Writes are atomic (temp + rename) and monotonic: a record
//! for unit `N` is never replaced by one for unit `< N`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::job::JobFingerprint;
use crate::paths::{self, PathError};

/// Resume state for one job, written incrementally as units complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Fingerprint of the job request this checkpoint belongs to.
    pub fingerprint: JobFingerprint,
    /// Last unit that fully completed (1-based). Equal to `total_units`
    /// means the job is effectively complete and must not be resumed.
    pub last_completed_unit: u32,
    /// Total number of units in the job.
    pub total_units: u32,
    /// Location of the partial output the engine has written so far.
    pub partial_output: PathBuf,
    /// When this record was last written.
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Whether every unit already completed; such a record is equivalent to
    /// `Completed` and is discarded instead of resumed.
    pub const fn is_complete(&self) -> bool {
        self.last_completed_unit >= self.total_units
    }
}

/// Errors surfaced by checkpoint writes. Loads never error: a corrupt or
/// missing record degrades to "no checkpoint".
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Could not resolve or create the checkpoints directory.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Writing the record failed.
    #[error("Failed to write checkpoint {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// File-backed store keeping one checkpoint record per fingerprint.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Store backed by the default user-scoped checkpoints directory.
    pub fn open_default() -> Result<Self, CheckpointError> {
        Ok(Self::at(paths::checkpoints_dir()?))
    }

    /// Store backed by an explicit directory (tests, portable installs).
    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Persist a checkpoint, enforcing monotonicity.
    ///
    /// If a record for the same fingerprint already holds a later unit, the
    /// write is skipped: unit completion reporting may itself be concurrent
    /// and an out-of-order write must never roll the resume point back.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if let Some(existing) = self.load(&checkpoint.fingerprint) {
            if existing.last_completed_unit > checkpoint.last_completed_unit {
                debug!(
                    fingerprint = %checkpoint.fingerprint,
                    existing = existing.last_completed_unit,
                    incoming = checkpoint.last_completed_unit,
                    "Skipping out-of-order checkpoint write"
                );
                return Ok(());
            }
        }

        paths::ensure_directory(&self.dir)?;
        let path = self.record_path(&checkpoint.fingerprint);
        let serialized =
            serde_json::to_string_pretty(checkpoint).map_err(|e| CheckpointError::Write {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serialized).map_err(|e| CheckpointError::Write {
            path: tmp.clone(),
            reason: e.to_string(),
        })?;
        fs::rename(&tmp, &path).map_err(|e| CheckpointError::Write {
            path,
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Load the checkpoint for a fingerprint, if a readable one exists.
    ///
    /// Corrupt records are discarded with a warning; losing a resume point
    /// is non-fatal.
    pub fn load(&self, fingerprint: &JobFingerprint) -> Option<Checkpoint> {
        let path = self.record_path(fingerprint);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint unreadable, ignoring");
                return None;
            }
        };

        match serde_json::from_str::<Checkpoint>(&raw) {
            Ok(checkpoint) if checkpoint.fingerprint == *fingerprint => Some(checkpoint),
            Ok(checkpoint) => {
                warn!(
                    path = %path.display(),
                    stored = %checkpoint.fingerprint,
                    "Checkpoint record names a different fingerprint, discarding"
                );
                let _ = fs::remove_file(&path);
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint corrupt, discarding");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Remove every record except the one for `keep`.
    ///
    /// Records are keyed by fingerprint, so one left behind by a superseded
    /// request (changed voice, speed, format) can never be resumed again;
    /// without a sweep the directory only grows.
    pub fn sweep_except(&self, keep: &JobFingerprint) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            // Nothing to sweep before the first save creates the directory
            Err(_) => return,
        };
        let keep_name = format!("{keep}.json");
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".json") && name != keep_name {
                match fs::remove_file(entry.path()) {
                    Ok(()) => debug!(record = %name, "Swept superseded checkpoint"),
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "Failed to sweep checkpoint");
                    }
                }
            }
        }
    }

    /// Remove the record for a fingerprint (job completed or record stale).
    pub fn clear(&self, fingerprint: &JobFingerprint) {
        let path = self.record_path(fingerprint);
        match fs::remove_file(&path) {
            Ok(()) => debug!(fingerprint = %fingerprint, "Checkpoint cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to clear checkpoint"),
        }
    }

    fn record_path(&self, fingerprint: &JobFingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRequest, OutputFormat};
    use tempfile::tempdir;

    fn fingerprint() -> JobFingerprint {
        JobRequest {
            input_path: PathBuf::from("/books/dracula.epub"),
            output_dir: PathBuf::from("/tmp/out"),
            output_format: OutputFormat::Mp3,
            voice_id: "af_sky".to_string(),
            speed_factor: 1.0,
            character_voice_map: None,
            resume: false,
        }
        .fingerprint()
    }

    fn checkpoint(unit: u32) -> Checkpoint {
        Checkpoint {
            fingerprint: fingerprint(),
            last_completed_unit: unit,
            total_units: 100,
            partial_output: PathBuf::from("/tmp/out/dracula.mp3.part"),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_round_trip_preserves_unit_index() {
        let temp = tempdir().unwrap();
        let store = CheckpointStore::at(temp.path().to_path_buf());

        store.save(&checkpoint(40)).unwrap();
        let loaded = store.load(&fingerprint()).unwrap();
        assert_eq!(loaded.last_completed_unit, 40);
        assert_eq!(loaded.total_units, 100);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let temp = tempdir().unwrap();
        let store = CheckpointStore::at(temp.path().to_path_buf());
        assert!(store.load(&fingerprint()).is_none());
    }

    #[test]
    fn test_saves_are_monotonic() {
        let temp = tempdir().unwrap();
        let store = CheckpointStore::at(temp.path().to_path_buf());

        store.save(&checkpoint(41)).unwrap();
        // A straggler report for an earlier unit must not roll us back
        store.save(&checkpoint(39)).unwrap();

        let loaded = store.load(&fingerprint()).unwrap();
        assert_eq!(loaded.last_completed_unit, 41);
    }

    #[test]
    fn test_corrupt_record_is_discarded() {
        let temp = tempdir().unwrap();
        let store = CheckpointStore::at(temp.path().to_path_buf());

        store.save(&checkpoint(10)).unwrap();
        let path = temp.path().join(format!("{}.json", fingerprint()));
        fs::write(&path, "garbage").unwrap();

        assert!(store.load(&fingerprint()).is_none());
        assert!(!path.exists(), "corrupt record should be removed");
    }

    #[test]
    fn test_clear_removes_record() {
        let temp = tempdir().unwrap();
        let store = CheckpointStore::at(temp.path().to_path_buf());

        store.save(&checkpoint(5)).unwrap();
        store.clear(&fingerprint());
        assert!(store.load(&fingerprint()).is_none());
        // Clearing again is a no-op
        store.clear(&fingerprint());
    }

    #[test]
    fn test_sweep_keeps_only_the_named_fingerprint() {
        let temp = tempdir().unwrap();
        let store = CheckpointStore::at(temp.path().to_path_buf());

        let other = JobRequest {
            input_path: PathBuf::from("/books/dracula.epub"),
            output_dir: PathBuf::from("/tmp/out"),
            output_format: OutputFormat::Mp3,
            voice_id: "am_adam".to_string(),
            speed_factor: 1.0,
            character_voice_map: None,
            resume: false,
        }
        .fingerprint();

        store.save(&checkpoint(12)).unwrap();
        store
            .save(&Checkpoint {
                fingerprint: other.clone(),
                last_completed_unit: 7,
                total_units: 100,
                partial_output: PathBuf::from("/tmp/out/dracula.mp3.part"),
                updated_at: Utc::now(),
            })
            .unwrap();

        store.sweep_except(&fingerprint());
        assert!(store.load(&other).is_none(), "superseded record must go");
        assert_eq!(store.load(&fingerprint()).unwrap().last_completed_unit, 12);

        // Sweeping a directory that does not exist yet is a no-op
        CheckpointStore::at(temp.path().join("missing")).sweep_except(&fingerprint());
    }

    #[test]
    fn test_complete_checkpoint_is_flagged() {
        assert!(checkpoint(100).is_complete());
        assert!(!checkpoint(99).is_complete());
    }
}
