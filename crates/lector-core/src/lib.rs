//! Core domain types, ports and user-scoped persistence for lector.
//!
//! This crate holds everything the orchestration runtime and GUI adapters
//! share: the job model, the progress event union, dependency-resolution
//! domain types, the config and checkpoint stores, and the port trait for
//! the external conversion engine. No process spawning and no network
//! access happen here.

pub mod checkpoint;
pub mod config;
pub mod deps;
pub mod engine;
pub mod events;
pub mod job;
pub mod paths;

// Re-export commonly used types for convenience
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use config::{AssetStorageMode, ConfigError, ConfigStore, PersistedConfig};
pub use deps::{
    DependencyKind, MisconfiguredOverride, ProbeResult, ProbeStrategy, Remedy, ResolveError,
    ResolvedDependencies, StrategyAttempt,
};
pub use engine::{
    ConversionEngine, ConversionSpec, EngineError, EngineOutcome, UnitDisposition, UnitObserver,
    UnitReport,
};
pub use events::ProgressEvent;
pub use job::{JobFingerprint, JobRequest, JobState, OutputFormat};
pub use paths::{DATA_DIR_ENV, PathError};
