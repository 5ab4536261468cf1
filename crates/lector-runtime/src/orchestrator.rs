//! Single-flight job orchestrator.
//!
//! Owns the one process-wide `JobState` and drives a submitted job through
//! its whole lifecycle on a background task: dependency gate, checkpoint
//! decision, engine run, terminal bookkeeping. The interactive surface only
//! ever calls the non-blocking control methods (`start`, `cancel`, `pause`,
//! `state`) and consumes the returned event stream.
//!
//! Cancel and pause are advisory. They flip a token the unit observer reads
//! at each unit boundary; the engine is never interrupted mid-unit, so the
//! partial output stays consistent and resumable.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lector_core::checkpoint::{Checkpoint, CheckpointStore};
use lector_core::config::ConfigStore;
use lector_core::deps::DependencyKind;
use lector_core::engine::{
    ConversionEngine, ConversionSpec, EngineOutcome, UnitDisposition, UnitObserver, UnitReport,
};
use lector_core::events::ProgressEvent;
use lector_core::job::{JobFingerprint, JobRequest, JobState};

use crate::probe::ProbeContext;
use crate::progress::{DEFAULT_CHANNEL_CAPACITY, ProgressReceiver, ProgressSender, progress_channel};
use crate::resolver::DependencyResolver;

/// Rejection returned synchronously from `start`.
#[derive(Debug, Error)]
pub enum StartError {
    /// A job is already in flight; at most one runs at a time.
    #[error("A conversion job is already active (state: {0:?})")]
    AlreadyRunning(JobState),
}

/// Why the observer asked the engine to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancel,
    Pause,
}

/// Control handles for the job currently in flight.
struct ActiveJob {
    stop: CancellationToken,
    reason: Arc<Mutex<Option<StopReason>>>,
}

/// Sole owner of the job lifecycle.
pub struct JobOrchestrator {
    engine: Arc<dyn ConversionEngine>,
    resolver: Arc<DependencyResolver>,
    checkpoints: Arc<CheckpointStore>,
    config: Arc<ConfigStore>,
    state: Mutex<JobState>,
    active: Mutex<Option<ActiveJob>>,
    /// Fixed probe snapshot instead of the live environment (tests).
    probe_ctx: Option<ProbeContext>,
}

impl JobOrchestrator {
    pub fn new(
        engine: Arc<dyn ConversionEngine>,
        resolver: Arc<DependencyResolver>,
        checkpoints: Arc<CheckpointStore>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            engine,
            resolver,
            checkpoints,
            config,
            state: Mutex::new(JobState::Idle),
            active: Mutex::new(None),
            probe_ctx: None,
        }
    }

    /// Resolve against a fixed snapshot instead of the live environment.
    #[must_use]
    pub fn with_probe_context(mut self, ctx: ProbeContext) -> Self {
        self.probe_ctx = Some(ctx);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        *self.state.lock().expect("state lock")
    }

    /// Submit a job. Rejected immediately if one is already active.
    ///
    /// Returns the event stream for this job; all further outcomes arrive
    /// there, ending with exactly one terminal event.
    pub fn start(self: &Arc<Self>, request: JobRequest) -> Result<ProgressReceiver, StartError> {
        {
            let mut state = self.state.lock().expect("state lock");
            if !state.accepts_submission() {
                return Err(StartError::AlreadyRunning(*state));
            }
            *state = JobState::Resolving;
        }

        let (tx, rx) = progress_channel(DEFAULT_CHANNEL_CAPACITY);
        let stop = CancellationToken::new();
        let reason = Arc::new(Mutex::new(None));
        *self.active.lock().expect("active lock") = Some(ActiveJob {
            stop: stop.clone(),
            reason: Arc::clone(&reason),
        });

        info!(
            input = %request.input_path.display(),
            format = %request.output_format,
            voice = %request.voice_id,
            resume = request.resume,
            "Job submitted"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_job(request, Arc::new(tx), stop, reason).await;
        });
        Ok(rx)
    }

    /// Request cancellation; honored at the next unit boundary.
    pub fn cancel(&self) {
        self.request_stop(StopReason::Cancel);
    }

    /// Request a pause; like cancel, but the job lands in `Paused` and its
    /// checkpoint is the designated resume point.
    pub fn pause(&self) {
        self.request_stop(StopReason::Pause);
    }

    fn request_stop(&self, why: StopReason) {
        let mut state = self.state.lock().expect("state lock");
        if !matches!(*state, JobState::Resolving | JobState::Running) {
            debug!(state = ?*state, request = ?why, "Stop request ignored, no job in flight");
            return;
        }
        if why == StopReason::Cancel {
            *state = JobState::Cancelling;
        }
        drop(state);

        if let Some(active) = self.active.lock().expect("active lock").as_ref() {
            *active.reason.lock().expect("reason lock") = Some(why);
            active.stop.cancel();
            info!(request = ?why, "Stop requested, waiting for unit boundary");
        }
    }

    fn set_state(&self, next: JobState) {
        *self.state.lock().expect("state lock") = next;
    }

    async fn run_job(
        self: Arc<Self>,
        request: JobRequest,
        tx: Arc<ProgressSender>,
        stop: CancellationToken,
        reason: Arc<Mutex<Option<StopReason>>>,
    ) {
        // Dependency gate. Probing is filesystem- and process-heavy, so it
        // runs on the blocking pool.
        let resolver = Arc::clone(&self.resolver);
        let ctx = self.probe_ctx.clone();
        let resolved = task::spawn_blocking(move || match ctx {
            Some(ctx) => resolver.resolve_in(&ctx),
            None => resolver.resolve(),
        })
        .await;

        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                self.fail(&tx, format!("dependency resolution panicked: {e}"));
                return;
            }
        };
        if let Some(gate) = DependencyResolver::gate_error(&resolved) {
            self.fail(&tx, gate.to_string());
            return;
        }
        let (Some(encoder_path), Some(asset_path)) = (
            resolved.path(DependencyKind::ExternalTool).cloned(),
            resolved.path(DependencyKind::AssetBundle).cloned(),
        ) else {
            self.fail(&tx, "dependency resolution returned no paths".to_string());
            return;
        };

        // Checkpoint decision.
        let fingerprint = request.fingerprint();
        let resume_from = self.resume_point(&request, &fingerprint, &tx);
        if resume_from.is_none() {
            // Fresh run: a stale record for this fingerprint would describe
            // a partial output this run is about to overwrite, and the
            // store's monotonic rule would suppress the new run's saves
            // below the stale unit.
            self.checkpoints.clear(&fingerprint);
        }
        // Records for superseded requests (changed voice, speed, format)
        // can never be resumed again
        self.checkpoints.sweep_except(&fingerprint);

        let default_partial = request.output_dir.join(format!(
            "{}.{}.part",
            request.output_stem(),
            request.output_format.extension()
        ));
        let partial_output = resume_from
            .as_ref()
            .map_or(default_partial, |cp| cp.partial_output.clone());
        let resume_after_unit = resume_from.map(|cp| cp.last_completed_unit);

        let spec = ConversionSpec {
            input_path: request.input_path.clone(),
            output_format: request.output_format,
            voice_id: request.voice_id.clone(),
            speed_factor: request.speed_factor,
            character_voice_map: request.character_voice_map.clone(),
            resume_after_unit,
            partial_output: partial_output.clone(),
            output_dir: request.output_dir.clone(),
            encoder_path,
            asset_path,
        };

        // A stop may already have been requested while resolving; honor it
        // before the engine synthesizes anything.
        if stop.is_cancelled() {
            let why = reason
                .lock()
                .expect("reason lock")
                .unwrap_or(StopReason::Cancel);
            match why {
                StopReason::Pause => {
                    let last_completed_unit = resume_after_unit.unwrap_or(0);
                    self.set_state(JobState::Paused);
                    info!(last_completed_unit, "Pause honored before the engine started");
                    tx.emit(ProgressEvent::Paused { last_completed_unit });
                }
                StopReason::Cancel => {
                    self.set_state(JobState::Cancelled);
                    info!("Cancel honored before the engine started");
                    tx.emit(ProgressEvent::Cancelled);
                }
            }
            return;
        }

        self.set_state(JobState::Running);
        let observer = BoundaryObserver {
            tx: Arc::clone(&tx),
            checkpoints: Arc::clone(&self.checkpoints),
            fingerprint: fingerprint.clone(),
            partial_output,
            first_unit: resume_after_unit.map_or(1, |k| k + 1),
            stop,
        };

        match self.engine.convert(&spec, &observer).await {
            Ok(EngineOutcome::Completed { output_path }) => {
                self.checkpoints.clear(&fingerprint);
                self.remember_output_dir(&request.output_dir);
                self.set_state(JobState::Completed);
                info!(output = %output_path.display(), "Conversion completed");
                tx.emit(ProgressEvent::Completed { output_path });
            }
            Ok(EngineOutcome::Stopped { last_completed_unit }) => {
                let why = reason
                    .lock()
                    .expect("reason lock")
                    .unwrap_or(StopReason::Cancel);
                match why {
                    StopReason::Pause => {
                        self.set_state(JobState::Paused);
                        info!(last_completed_unit, "Conversion paused at unit boundary");
                        tx.emit(ProgressEvent::Paused { last_completed_unit });
                    }
                    StopReason::Cancel => {
                        self.set_state(JobState::Cancelled);
                        info!(last_completed_unit, "Conversion cancelled at unit boundary");
                        tx.emit(ProgressEvent::Cancelled);
                    }
                }
            }
            Err(e) => self.fail(&tx, e.to_string()),
        }
    }

    /// Pick the checkpoint to resume from, if the request asks for one and a
    /// usable record exists. Unusable records are discarded with a warning
    /// and the job runs fresh.
    fn resume_point(
        &self,
        request: &JobRequest,
        fingerprint: &JobFingerprint,
        tx: &ProgressSender,
    ) -> Option<Checkpoint> {
        if !request.resume {
            return None;
        }
        match self.checkpoints.load(fingerprint) {
            Some(cp) if cp.is_complete() => {
                warn!(
                    fingerprint = %fingerprint,
                    "Checkpoint covers every unit, discarding and starting fresh"
                );
                self.checkpoints.clear(fingerprint);
                tx.emit(ProgressEvent::Warning {
                    message: "Previous run already completed; converting from the start".into(),
                });
                None
            }
            Some(cp) => {
                info!(
                    fingerprint = %fingerprint,
                    last_completed_unit = cp.last_completed_unit,
                    total_units = cp.total_units,
                    "Resuming from checkpoint"
                );
                Some(cp)
            }
            None => {
                warn!(fingerprint = %fingerprint, "Resume requested but no matching checkpoint");
                tx.emit(ProgressEvent::Warning {
                    message: "No resumable progress found for these settings; starting fresh"
                        .into(),
                });
                None
            }
        }
    }

    fn fail(&self, tx: &ProgressSender, reason: String) {
        self.set_state(JobState::Failed);
        warn!(%reason, "Job failed");
        tx.emit(ProgressEvent::Failed { reason });
    }

    /// Remember the output directory as the default for the next job.
    fn remember_output_dir(&self, dir: &std::path::Path) {
        let mut config = self.config.load();
        config.last_output_directory = Some(dir.to_path_buf());
        if let Err(e) = self.config.save(&config) {
            warn!(error = %e, "Could not persist last output directory");
        }
    }
}

/// Observer driving checkpoints and progress from the engine's unit reports.
///
/// Runs on the engine's thread between units; everything here must stay
/// cheap relative to unit duration.
struct BoundaryObserver {
    tx: Arc<ProgressSender>,
    checkpoints: Arc<CheckpointStore>,
    fingerprint: JobFingerprint,
    partial_output: PathBuf,
    first_unit: u32,
    stop: CancellationToken,
}

impl UnitObserver for BoundaryObserver {
    fn on_start(&self, total_units: u32) {
        self.tx.emit(ProgressEvent::Started {
            total_units,
            first_unit: self.first_unit,
        });
    }

    fn on_unit(&self, report: UnitReport) -> UnitDisposition {
        // Checkpoint first: a kill between units must find this unit durable
        let checkpoint = Checkpoint {
            fingerprint: self.fingerprint.clone(),
            last_completed_unit: report.index,
            total_units: report.total_units,
            partial_output: self.partial_output.clone(),
            updated_at: Utc::now(),
        };
        if let Err(e) = self.checkpoints.save(&checkpoint) {
            // Losing a resume point degrades resume, not the conversion
            warn!(unit = report.index, error = %e, "Checkpoint write failed");
        }

        self.tx.emit(ProgressEvent::UnitCompleted {
            index: report.index,
            total_units: report.total_units,
            elapsed_ms: report.elapsed_ms,
            chars_processed: report.chars_processed,
        });

        if self.stop.is_cancelled() {
            UnitDisposition::Stop
        } else {
            UnitDisposition::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    use async_trait::async_trait;
    use lector_core::config::PersistedConfig;
    use lector_core::engine::EngineError;

    /// Deterministic engine: synthesizes `total_units` instantly, honoring
    /// resume points and boundary stops, with an optional per-unit hook.
    struct FakeEngine {
        total_units: u32,
        fail_at: Option<u32>,
        processed: StdMutex<Vec<u32>>,
        unit_hook: StdMutex<Option<Box<dyn Fn(u32) + Send + Sync>>>,
    }

    impl FakeEngine {
        fn new(total_units: u32) -> Arc<Self> {
            Arc::new(Self {
                total_units,
                fail_at: None,
                processed: StdMutex::new(Vec::new()),
                unit_hook: StdMutex::new(None),
            })
        }

        fn set_unit_hook(&self, hook: impl Fn(u32) + Send + Sync + 'static) {
            *self.unit_hook.lock().unwrap() = Some(Box::new(hook));
        }

        fn processed(&self) -> Vec<u32> {
            self.processed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConversionEngine for FakeEngine {
        async fn convert(
            &self,
            spec: &ConversionSpec,
            observer: &dyn UnitObserver,
        ) -> Result<EngineOutcome, EngineError> {
            observer.on_start(self.total_units);
            let first = spec.resume_after_unit.map_or(1, |k| k + 1);
            for index in first..=self.total_units {
                // Yield so control methods interleave with the run
                tokio::task::yield_now().await;
                if self.fail_at == Some(index) {
                    return Err(EngineError::Synthesis {
                        unit: index,
                        detail: "fake failure".into(),
                    });
                }
                self.processed.lock().unwrap().push(index);
                if let Some(hook) = self.unit_hook.lock().unwrap().as_ref() {
                    hook(index);
                }
                let report = UnitReport {
                    index,
                    total_units: self.total_units,
                    elapsed_ms: 3,
                    chars_processed: 120,
                };
                if observer.on_unit(report) == UnitDisposition::Stop {
                    return Ok(EngineOutcome::Stopped {
                        last_completed_unit: index,
                    });
                }
            }
            let output_path = spec.output_dir.join(format!(
                "output.{}",
                spec.output_format.extension()
            ));
            fs::write(&output_path, b"audio").map_err(|e| EngineError::Encoding(e.to_string()))?;
            Ok(EngineOutcome::Completed { output_path })
        }
    }

    struct Fixture {
        temp: TempDir,
        engine: Arc<FakeEngine>,
        orchestrator: Arc<JobOrchestrator>,
        checkpoints: Arc<CheckpointStore>,
        config: Arc<ConfigStore>,
    }

    #[cfg(unix)]
    fn write_fake_ffmpeg(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ffmpeg");
        fs::write(&path, "#!/bin/sh\necho 'ffmpeg version 6.1'\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Satisfied-dependency fixture: valid tool + bundle overrides in config,
    /// everything rooted in one tempdir.
    #[cfg(unix)]
    fn fixture(total_units: u32) -> Fixture {
        let temp = TempDir::new().unwrap();
        let tool = write_fake_ffmpeg(temp.path());

        let bundle = temp.path().join("models");
        fs::create_dir_all(&bundle).unwrap();
        for name in crate::probe::AssetSpec::voice_models().required_files {
            fs::write(bundle.join(name), b"model").unwrap();
        }

        let config = Arc::new(ConfigStore::at(temp.path().join("config.json")));
        config
            .save(&PersistedConfig {
                tool_override_path: Some(tool),
                asset_override_path: Some(bundle),
                ..Default::default()
            })
            .unwrap();

        let checkpoints = Arc::new(CheckpointStore::at(temp.path().join("checkpoints")));
        let engine = FakeEngine::new(total_units);
        let ctx = empty_ctx(temp.path());
        let orchestrator = Arc::new(
            JobOrchestrator::new(
                engine.clone(),
                Arc::new(DependencyResolver::new(Arc::clone(&config))),
                Arc::clone(&checkpoints),
                Arc::clone(&config),
            )
            .with_probe_context(ctx),
        );

        Fixture {
            temp,
            engine,
            orchestrator,
            checkpoints,
            config,
        }
    }

    fn empty_ctx(home: &Path) -> ProbeContext {
        ProbeContext {
            home: home.to_path_buf(),
            path_var: None,
            shell_profiles: Vec::new(),
            tool_env_path: None,
            asset_env_path: None,
            tool_well_known: Vec::new(),
            asset_well_known: Vec::new(),
            query_package_manager: false,
        }
    }

    fn request(temp: &TempDir, resume: bool) -> JobRequest {
        let output_dir = temp.path().join("out");
        fs::create_dir_all(&output_dir).unwrap();
        JobRequest {
            input_path: temp.path().join("book.epub"),
            output_dir,
            output_format: lector_core::job::OutputFormat::Mp3,
            voice_id: "af_sky".to_string(),
            speed_factor: 1.0,
            character_voice_map: None,
            resume,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_happy_path_completes_and_clears_checkpoint() {
        let f = fixture(5);
        let mut rx = f.orchestrator.start(request(&f.temp, false)).unwrap();

        let events = rx.collect_to_end().await;
        assert!(matches!(events.first(), Some(ProgressEvent::Started { .. })));
        assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
        assert_eq!(f.orchestrator.state(), JobState::Completed);

        // Checkpoint gone, output directory remembered
        let fp = request(&f.temp, false).fingerprint();
        assert!(f.checkpoints.load(&fp).is_none());
        assert_eq!(
            f.config.load().last_output_directory,
            Some(f.temp.path().join("out"))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_second_submission_is_rejected_while_running() {
        let f = fixture(200);
        let gate = Arc::new(tokio::sync::Notify::new());
        let release = Arc::clone(&gate);
        f.engine.set_unit_hook(move |i| {
            if i == 1 {
                release.notify_one();
            }
        });

        let mut rx = f.orchestrator.start(request(&f.temp, false)).unwrap();
        gate.notified().await;

        match f.orchestrator.start(request(&f.temp, false)) {
            Err(StartError::AlreadyRunning(_)) => {}
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }

        f.orchestrator.cancel();
        let events = rx.collect_to_end().await;
        assert!(matches!(events.last(), Some(ProgressEvent::Cancelled)));
    }

    #[tokio::test]
    async fn test_unsatisfied_dependencies_fail_before_engine_runs() {
        let temp = TempDir::new().unwrap();
        let config = Arc::new(ConfigStore::at(temp.path().join("config.json")));
        let checkpoints = Arc::new(CheckpointStore::at(temp.path().join("checkpoints")));
        let engine = FakeEngine::new(5);
        let orchestrator = Arc::new(
            JobOrchestrator::new(
                engine.clone(),
                Arc::new(DependencyResolver::new(Arc::clone(&config))),
                checkpoints,
                config,
            )
            .with_probe_context(empty_ctx(temp.path())),
        );

        let mut rx = orchestrator.start(request(&temp, false)).unwrap();
        let events = rx.collect_to_end().await;

        match events.last() {
            Some(ProgressEvent::Failed { reason }) => {
                assert!(reason.contains("ffmpeg") || reason.contains("tool"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(orchestrator.state(), JobState::Failed);
        assert!(engine.processed().is_empty(), "engine must not have run");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_failure_surfaces_verbatim() {
        let f = fixture(5);
        // Rebuild the engine with a failure point
        let engine = Arc::new(FakeEngine {
            total_units: 5,
            fail_at: Some(3),
            processed: StdMutex::new(Vec::new()),
            unit_hook: StdMutex::new(None),
        });
        let orchestrator = Arc::new(
            JobOrchestrator::new(
                engine,
                Arc::new(DependencyResolver::new(Arc::clone(&f.config))),
                Arc::clone(&f.checkpoints),
                Arc::clone(&f.config),
            )
            .with_probe_context(empty_ctx(f.temp.path())),
        );

        let mut rx = orchestrator.start(request(&f.temp, false)).unwrap();
        let events = rx.collect_to_end().await;
        match events.last() {
            Some(ProgressEvent::Failed { reason }) => {
                assert!(reason.contains("unit 3"), "got: {reason}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }

        // Failure keeps the checkpoint for a later resume
        let fp = request(&f.temp, false).fingerprint();
        assert_eq!(f.checkpoints.load(&fp).unwrap().last_completed_unit, 2);
    }
}
