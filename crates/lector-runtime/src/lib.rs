//! Runtime adapters for the lector conversion core: dependency probing and
//! resolution, asset fetching, and the single-flight job orchestrator.

// Re-export core types for convenience
pub use lector_core::checkpoint::{Checkpoint, CheckpointStore};
pub use lector_core::config::{AssetStorageMode, ConfigStore, PersistedConfig};
pub use lector_core::deps::{
    DependencyKind, ProbeResult, ProbeStrategy, Remedy, ResolveError, ResolvedDependencies,
    StrategyAttempt,
};
pub use lector_core::engine::{
    ConversionEngine, ConversionSpec, EngineError, EngineOutcome, UnitDisposition, UnitObserver,
    UnitReport,
};
pub use lector_core::events::ProgressEvent;
pub use lector_core::job::{JobFingerprint, JobRequest, JobState, OutputFormat};

pub mod fetch;
pub mod probe;
pub mod progress;

mod orchestrator;
mod resolver;

pub use fetch::{AssetFetcher, HttpAssetFetcher};
pub use orchestrator::{JobOrchestrator, StartError};
pub use probe::{AssetSpec, ProbeContext, ToolSpec};
pub use progress::{ProgressReceiver, ProgressSender, ProgressThrottle, progress_channel};
pub use resolver::DependencyResolver;
