//! Job request and lifecycle state types.
//!
//! A `JobRequest` is immutable once submitted. Its `JobFingerprint` decides
//! whether a stored checkpoint is applicable to a later request: any change
//! to the input, voice, format, speed or character map produces a different
//! fingerprint and invalidates old resume points.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Audio container format for the synthesized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// MPEG layer III audio.
    Mp3,
    /// MPEG-4 audiobook container (chapter support).
    M4b,
    /// Uncompressed WAV.
    Wav,
}

impl OutputFormat {
    /// File extension for this format, without the leading dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::M4b => "m4b",
            Self::Wav => "wav",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A request to convert one input document into synthesized audio.
///
/// Immutable once submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Path to the input document (text or ebook).
    pub input_path: PathBuf,
    /// Directory where the finished output is written.
    pub output_dir: PathBuf,
    /// Output audio format.
    pub output_format: OutputFormat,
    /// Narrator voice identifier.
    pub voice_id: String,
    /// Playback speed factor (1.0 = natural).
    pub speed_factor: f64,
    /// Optional per-character voice assignments (character name -> voice id).
    ///
    /// A `BTreeMap` keeps the fingerprint independent of insertion order.
    #[serde(default)]
    pub character_voice_map: Option<BTreeMap<String, String>>,
    /// Whether to resume from a stored checkpoint if one matches.
    #[serde(default)]
    pub resume: bool,
}

impl JobRequest {
    /// Compute the fingerprint identifying this request for checkpoint purposes.
    ///
    /// Covers every field except `resume`, which only selects behavior and
    /// does not change the work being performed.
    pub fn fingerprint(&self) -> JobFingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.input_path.to_string_lossy().as_bytes());
        hasher.update([0]);
        hasher.update(self.output_format.extension().as_bytes());
        hasher.update([0]);
        hasher.update(self.voice_id.as_bytes());
        hasher.update([0]);
        // Fixed decimal rendering so the same speed always hashes identically
        hasher.update(format!("{:.4}", self.speed_factor).as_bytes());
        hasher.update([0]);
        if let Some(map) = &self.character_voice_map {
            for (name, voice) in map {
                hasher.update(name.as_bytes());
                hasher.update([1]);
                hasher.update(voice.as_bytes());
                hasher.update([1]);
            }
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(32);
        for byte in &digest[..16] {
            use fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        JobFingerprint(hex)
    }

    /// Filename stem for output files derived from the input path.
    pub fn output_stem(&self) -> String {
        self.input_path
            .file_stem()
            .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().to_string())
    }
}

/// Identity of a job request, stable across process restarts.
///
/// Hex-encoded and filename-safe, so it doubles as the checkpoint record name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobFingerprint(String);

impl JobFingerprint {
    /// The hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of the (single) conversion job.
///
/// Exactly one of these exists process-wide; the orchestrator is its sole
/// owner and all transitions happen inside the orchestrator's task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No job submitted.
    Idle,
    /// Dependency resolution is running for a submitted job.
    Resolving,
    /// The engine is converting.
    Running,
    /// A cancel was requested; waiting for the next unit boundary.
    Cancelling,
    /// A pause was requested and honored; the checkpoint is retained.
    Paused,
    /// The job stopped at a unit boundary after a cancel request.
    Cancelled,
    /// The job finished and the output was written.
    Completed,
    /// The job terminated with an error.
    Failed,
}

impl JobState {
    /// Whether a new job may be submitted from this state.
    pub const fn accepts_submission(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Paused | Self::Cancelled | Self::Completed | Self::Failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JobRequest {
        JobRequest {
            input_path: PathBuf::from("/books/dracula.epub"),
            output_dir: PathBuf::from("/tmp/out"),
            output_format: OutputFormat::Mp3,
            voice_id: "af_sky".to_string(),
            speed_factor: 1.0,
            character_voice_map: None,
            resume: false,
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(request().fingerprint(), request().fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_resume_flag() {
        let mut resumed = request();
        resumed.resume = true;
        assert_eq!(request().fingerprint(), resumed.fingerprint());
    }

    #[test]
    fn test_fingerprint_sensitive_to_every_identity_field() {
        let base = request().fingerprint();

        let mut changed = request();
        changed.input_path = PathBuf::from("/books/carmilla.epub");
        assert_ne!(base, changed.fingerprint());

        let mut changed = request();
        changed.output_format = OutputFormat::Wav;
        assert_ne!(base, changed.fingerprint());

        let mut changed = request();
        changed.voice_id = "am_adam".to_string();
        assert_ne!(base, changed.fingerprint());

        let mut changed = request();
        changed.speed_factor = 1.25;
        assert_ne!(base, changed.fingerprint());

        let mut changed = request();
        changed.character_voice_map =
            Some([("Mina".to_string(), "af_bella".to_string())].into());
        assert_ne!(base, changed.fingerprint());
    }

    #[test]
    fn test_fingerprint_is_filename_safe_hex() {
        let fp = request().fingerprint();
        assert_eq!(fp.as_str().len(), 32);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_terminal_states_accept_submission() {
        assert!(JobState::Idle.accepts_submission());
        assert!(JobState::Completed.accepts_submission());
        assert!(JobState::Failed.accepts_submission());
        assert!(JobState::Cancelled.accepts_submission());
        assert!(!JobState::Running.accepts_submission());
        assert!(!JobState::Resolving.accepts_submission());
        assert!(!JobState::Cancelling.accepts_submission());
    }
}
