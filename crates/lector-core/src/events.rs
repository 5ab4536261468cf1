//! Progress events streamed from the orchestrator to the interactive surface.
//!
//! Events are ordered and append-only with a single producer. Serialized with
//! a `type` tag so GUI adapters can consume them without extra mapping.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One event in the job progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The job entered `Running`; unit count is known.
    Started {
        /// Total number of units the engine will synthesize.
        #[serde(rename = "totalUnits")]
        total_units: u32,
        /// First unit that will actually be synthesized (1 for a fresh run,
        /// `k + 1` when resuming after unit `k`).
        #[serde(rename = "firstUnit")]
        first_unit: u32,
    },

    /// One unit of work finished.
    ///
    /// May be coalesced or dropped under backpressure; never reordered.
    UnitCompleted {
        /// 1-based index of the completed unit.
        index: u32,
        /// Total number of units.
        #[serde(rename = "totalUnits")]
        total_units: u32,
        /// Wall-clock time spent on this unit.
        #[serde(rename = "elapsedMs")]
        elapsed_ms: u64,
        /// Characters of source text processed in this unit.
        #[serde(rename = "charsProcessed")]
        chars_processed: u64,
    },

    /// A non-fatal condition the user should see.
    Warning {
        /// Human-readable description.
        message: String,
    },

    /// Terminal: the job finished and the output file is complete.
    Completed {
        /// Path of the finished output.
        #[serde(rename = "outputPath")]
        output_path: PathBuf,
    },

    /// Terminal: the job stopped at a unit boundary after a pause request.
    /// The checkpoint is retained, so a resumed submission continues.
    Paused {
        /// Last unit that completed before pausing.
        #[serde(rename = "lastCompletedUnit")]
        last_completed_unit: u32,
    },

    /// Terminal: the job failed.
    Failed {
        /// What went wrong, suitable for display.
        reason: String,
    },

    /// Terminal: the job stopped cooperatively after a cancel request.
    Cancelled,
}

impl ProgressEvent {
    /// Whether this event ends the stream.
    ///
    /// Terminal events are exempt from backpressure drop: the channel must
    /// always deliver them.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Paused { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(ProgressEvent::Cancelled.is_terminal());
        assert!(
            ProgressEvent::Completed {
                output_path: PathBuf::from("/tmp/out.mp3")
            }
            .is_terminal()
        );
        assert!(
            ProgressEvent::Failed {
                reason: "engine".into()
            }
            .is_terminal()
        );
        assert!(!ProgressEvent::Started {
            total_units: 10,
            first_unit: 1
        }
        .is_terminal());
        assert!(!ProgressEvent::Warning {
            message: "stale checkpoint".into()
        }
        .is_terminal());
    }

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = ProgressEvent::UnitCompleted {
            index: 3,
            total_units: 100,
            elapsed_ms: 1200,
            chars_processed: 2048,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "unit_completed");
        assert_eq!(json["totalUnits"], 100);
    }
}
