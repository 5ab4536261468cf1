//! Port definition for the external conversion engine.
//!
//! The engine (text parsing + neural speech synthesis) is an external
//! collaborator. The orchestrator only needs this contract: run the
//! conversion, report each completed unit through the observer, and honor
//! the observer's stop request at the next unit boundary. Checkpoint
//! bookkeeping is NOT the engine's job; the orchestrator drives it from the
//! unit reports.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::OutputFormat;

/// Everything the engine needs to perform one conversion.
///
/// Derived from a `JobRequest` by the orchestrator; `resume_after_unit`
/// carries the checkpoint decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSpec {
    /// Path to the input document.
    pub input_path: PathBuf,
    /// Output audio format.
    pub output_format: OutputFormat,
    /// Narrator voice identifier.
    pub voice_id: String,
    /// Playback speed factor.
    pub speed_factor: f64,
    /// Optional per-character voice assignments.
    pub character_voice_map: Option<BTreeMap<String, String>>,
    /// Resume point: `Some(k)` means units `1..=k` are already in the
    /// partial output and synthesis continues with unit `k + 1`.
    pub resume_after_unit: Option<u32>,
    /// Where the engine appends per-unit audio before finalization.
    pub partial_output: PathBuf,
    /// Where the finished output must land.
    pub output_dir: PathBuf,
    /// Verified path to the external encoder binary.
    pub encoder_path: PathBuf,
    /// Verified path to the voice model bundle.
    pub asset_path: PathBuf,
}

/// Report for one completed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitReport {
    /// 1-based index of the unit that just completed.
    pub index: u32,
    /// Total number of units in this conversion.
    pub total_units: u32,
    /// Wall-clock milliseconds spent on this unit.
    pub elapsed_ms: u64,
    /// Characters of source text processed in this unit.
    pub chars_processed: u64,
}

/// Instruction returned from the unit callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitDisposition {
    /// Keep synthesizing.
    Continue,
    /// Stop at this unit boundary, leaving the partial output consistent.
    Stop,
}

/// Observer the orchestrator passes into `convert`.
///
/// Callbacks are synchronous and must be cheap; the engine invokes them
/// between units, never mid-unit.
pub trait UnitObserver: Send + Sync {
    /// Called once before the first unit, when the unit count is known.
    fn on_start(&self, total_units: u32);

    /// Called after each unit completes. Returning `Stop` requests a
    /// cooperative stop; the engine must not synthesize further units.
    fn on_unit(&self, report: UnitReport) -> UnitDisposition;
}

/// How a conversion ended from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// All units synthesized and the output finalized.
    Completed {
        /// Path of the finished output file.
        output_path: PathBuf,
    },
    /// The observer requested a stop; the partial output is consistent up to
    /// (and including) `last_completed_unit`.
    Stopped {
        /// Last unit boundary reached before stopping.
        last_completed_unit: u32,
    },
}

/// Terminal engine failure, surfaced verbatim and never retried
/// automatically — conversion is expensive, retries are a user decision.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The input document could not be parsed into units.
    #[error("Failed to parse input: {0}")]
    InputParse(String),

    /// Synthesis of a unit failed unrecoverably.
    #[error("Synthesis failed at unit {unit}: {detail}")]
    Synthesis {
        /// Unit that failed.
        unit: u32,
        /// Engine-provided detail.
        detail: String,
    },

    /// Encoding or finalizing the output failed.
    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// The conversion engine contract.
///
/// `convert` is a blocking, long-running operation from the orchestrator's
/// point of view; the orchestrator calls it from the job's background task
/// and never from the interactive context.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    /// Run (or continue) a conversion, reporting each unit to `observer`.
    async fn convert(
        &self,
        spec: &ConversionSpec,
        observer: &dyn UnitObserver,
    ) -> Result<EngineOutcome, EngineError>;
}
