//! Pipeline controller.
//!
//! Drives one source through the change gate, the detection engine and the
//! notifier, one frame per tick:
//!
//! ```text
//! Idle --start() ok--> Streaming --stop()--> Stopped
//!   \--start() err--> Idle (startup error)
//! ```
//!
//! Only frames the gate admits are classified, and only positives are
//! dispatched. Per-tick failures are logged and absorbed; only `start()` can fail.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::detect::DetectionEngine;
use crate::error::WatchError;
use crate::frame::{Frame, GeoCoordinate};
use crate::gate::ChangeGate;
use crate::ingest::FrameSource;
use crate::notify::{DispatchSummary, Notifier};

/// How often `run` logs a health line.
pub const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Stopped,
}

/// Cooperative stop request, safe to trigger from any thread (e.g. a signal handler).
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// The pipeline is not streaming; nothing was read.
    NotStreaming,
    /// The source had no frame this tick.
    FrameUnavailable,
    /// The frame was too similar to the last admitted one.
    Suppressed,
    /// Admitted and classified negative.
    Negative,
    /// Admitted, but the model failed; counted as negative.
    ClassificationFailed,
    /// Positive; the alert went out (possibly with per-recipient failures).
    Alerted(DispatchSummary),
    /// Positive, but the alert could not be assembled.
    AlertFailed(WatchError),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub ticks: u64,
    pub frames_read: u64,
    pub frames_unavailable: u64,
    pub suppressed: u64,
    pub admitted: u64,
    pub positives: u64,
    pub classification_failures: u64,
    pub alerts_delivered: u64,
    pub dispatch_failures: u64,
}

pub struct Pipeline<N: Notifier> {
    source: Arc<Mutex<dyn FrameSource>>,
    gate: ChangeGate,
    engine: DetectionEngine,
    notifier: N,
    coordinate: GeoCoordinate,
    state: SessionState,
    stop: StopHandle,
    snapshot_dir: Option<PathBuf>,
    stats: PipelineStats,
}

impl<N: Notifier> Pipeline<N> {
    pub fn new<S: FrameSource + 'static>(
        source: S,
        engine: DetectionEngine,
        notifier: N,
        coordinate: GeoCoordinate,
    ) -> Self {
        let source: Arc<Mutex<dyn FrameSource>> = Arc::new(Mutex::new(source));
        Self {
            source,
            gate: ChangeGate::new(),
            engine,
            notifier,
            coordinate,
            state: SessionState::Idle,
            stop: StopHandle::default(),
            snapshot_dir: None,
            stats: PipelineStats::default(),
        }
    }

    /// Also write every positive frame as `frame_<unix_timestamp>.jpg` under `dir`.
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn coordinate(&self) -> GeoCoordinate {
        self.coordinate
    }

    /// Handle for stopping the pipeline from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The source, shared with best-effort readers such as the preview renderer.
    pub fn shared_source(&self) -> Arc<Mutex<dyn FrameSource>> {
        Arc::clone(&self.source)
    }

    /// Open the source and begin streaming. On failure the pipeline stays `Idle`.
    pub fn start(&mut self) -> Result<(), WatchError> {
        match self.state {
            SessionState::Streaming => return Ok(()),
            SessionState::Stopped => {
                return Err(WatchError::source_unavailable(
                    &self.source_uri(),
                    "pipeline already stopped",
                ))
            }
            SessionState::Idle => {}
        }

        {
            let mut source = self.lock_source()?;
            source.open()?;
            log::info!("pipeline streaming from {}", source.uri());
        }
        self.state = SessionState::Streaming;
        Ok(())
    }

    /// Stop streaming and release the source. Idempotent.
    pub fn stop(&mut self) {
        self.stop.stop();
        if self.state == SessionState::Stopped {
            return;
        }
        if self.state == SessionState::Streaming {
            match self.source.lock() {
                Ok(mut source) => source.close(),
                Err(poisoned) => poisoned.into_inner().close(),
            }
        }
        self.state = SessionState::Stopped;
        log::info!("pipeline stopped");
    }

    /// Process at most one frame.
    pub fn tick(&mut self) -> TickOutcome {
        if self.stop.is_stopped() && self.state != SessionState::Stopped {
            self.stop();
        }
        if self.state != SessionState::Streaming {
            return TickOutcome::NotStreaming;
        }
        self.stats.ticks += 1;

        let frame = match self.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("tick skipped: {}", err);
                self.stats.frames_unavailable += 1;
                return TickOutcome::FrameUnavailable;
            }
        };
        self.stats.frames_read += 1;

        if !self.gate.admit(&frame) {
            self.stats.suppressed += 1;
            return TickOutcome::Suppressed;
        }
        self.stats.admitted += 1;

        match self.engine.classify(&frame) {
            Ok(false) => TickOutcome::Negative,
            Err(err) => {
                log::warn!("treating frame as negative: {}", err);
                self.stats.classification_failures += 1;
                TickOutcome::ClassificationFailed
            }
            Ok(true) => {
                self.stats.positives += 1;
                log::warn!("fire detected at {}", self.coordinate);
                self.save_snapshot(&frame);
                self.alert(&frame)
            }
        }
    }

    /// Tick until stopped or the source runs dry, pacing ticks `tick_interval` apart.
    pub fn run(&mut self, tick_interval: Duration) -> Result<PipelineStats> {
        if self.state == SessionState::Idle {
            self.start()?;
        }

        let mut last_health_log = Instant::now();
        loop {
            let tick_started = Instant::now();
            if let TickOutcome::NotStreaming = self.tick() {
                break;
            }
            if !self.source_active() {
                log::info!("source no longer active");
                self.stop();
                break;
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "pipeline health frames={} suppressed={} admitted={} positives={} alerts={} failures={}",
                    self.stats.frames_read,
                    self.stats.suppressed,
                    self.stats.admitted,
                    self.stats.positives,
                    self.stats.alerts_delivered,
                    self.stats.dispatch_failures
                );
                last_health_log = Instant::now();
            }

            if let Some(rest) = tick_interval.checked_sub(tick_started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        Ok(self.stats.clone())
    }

    fn alert(&mut self, frame: &Frame) -> TickOutcome {
        match self.notifier.dispatch(frame, self.coordinate) {
            Ok(summary) => {
                self.stats.alerts_delivered += summary.delivered as u64;
                self.stats.dispatch_failures += summary.failures.len() as u64;
                log::info!(
                    "fire alert dispatched: delivered={} failed={}",
                    summary.delivered,
                    summary.failures.len()
                );
                TickOutcome::Alerted(summary)
            }
            Err(err) => {
                log::error!("fire alert not sent: {}", err);
                self.stats.dispatch_failures += 1;
                TickOutcome::AlertFailed(err)
            }
        }
    }

    fn save_snapshot(&self, frame: &Frame) {
        let Some(dir) = &self.snapshot_dir else {
            return;
        };
        match frame.save_snapshot(dir) {
            Ok(path) => log::info!("snapshot written to {}", path.display()),
            Err(err) => log::warn!("snapshot not written: {:#}", err),
        }
    }

    fn read_frame(&self) -> Result<Frame, WatchError> {
        self.lock_source()?.read_frame()
    }

    fn source_active(&self) -> bool {
        self.source
            .lock()
            .map(|source| source.is_active())
            .unwrap_or(false)
    }

    fn source_uri(&self) -> String {
        self.source
            .lock()
            .map(|source| source.uri().to_string())
            .unwrap_or_default()
    }

    fn lock_source(&self) -> Result<std::sync::MutexGuard<'_, dyn FrameSource + 'static>, WatchError> {
        self.source
            .lock()
            .map_err(|_| WatchError::FrameUnavailable("source lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::ingest::SyntheticSource;

    #[derive(Default)]
    struct CountingNotifier {
        calls: usize,
    }

    impl Notifier for CountingNotifier {
        fn dispatch(
            &mut self,
            _frame: &Frame,
            _coordinate: GeoCoordinate,
        ) -> Result<DispatchSummary, WatchError> {
            self.calls += 1;
            Ok(DispatchSummary {
                delivered: 1,
                failures: Vec::new(),
            })
        }
    }

    fn pipeline(score: f32) -> Pipeline<CountingNotifier> {
        let engine = DetectionEngine::new(Box::new(StubBackend::new(score)));
        Pipeline::new(
            SyntheticSource::new("stub://test", 64, 48),
            engine,
            CountingNotifier::default(),
            GeoCoordinate {
                latitude: 40.0,
                longitude: -105.0,
            },
        )
    }

    #[test]
    fn idle_pipeline_does_not_read() {
        let mut pipeline = pipeline(1.0);
        assert_eq!(pipeline.state(), SessionState::Idle);
        assert!(matches!(pipeline.tick(), TickOutcome::NotStreaming));
        assert_eq!(pipeline.stats().ticks, 0);
    }

    #[test]
    fn failed_open_stays_idle() {
        let engine = DetectionEngine::new(Box::new(StubBackend::never_fire()));
        let mut pipeline = Pipeline::new(
            SyntheticSource::new("stub://broken", 0, 0),
            engine,
            CountingNotifier::default(),
            GeoCoordinate {
                latitude: 0.0,
                longitude: 0.0,
            },
        );
        let err = pipeline.start().unwrap_err();
        assert!(matches!(err, WatchError::SourceUnavailable { .. }));
        assert_eq!(pipeline.state(), SessionState::Idle);
    }

    #[test]
    fn static_scene_is_classified_once() -> anyhow::Result<()> {
        let mut pipeline = pipeline(1.0);
        pipeline.start()?;
        assert!(matches!(pipeline.tick(), TickOutcome::Negative));
        for _ in 0..10 {
            assert!(matches!(pipeline.tick(), TickOutcome::Suppressed));
        }
        assert_eq!(pipeline.stats().admitted, 1);
        assert_eq!(pipeline.notifier().calls, 0);
        Ok(())
    }

    struct BrokenModel;

    impl crate::detect::ModelBackend for BrokenModel {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn score(&mut self, _input: &crate::detect::ModelInput) -> anyhow::Result<f32> {
            Err(anyhow::anyhow!("output tensor missing"))
        }
    }

    #[test]
    fn classification_failure_is_absorbed_as_negative() -> anyhow::Result<()> {
        let engine = DetectionEngine::new(Box::new(BrokenModel)).without_color_prefilter();
        let mut pipeline = Pipeline::new(
            SyntheticSource::new("stub://test", 64, 48),
            engine,
            CountingNotifier::default(),
            GeoCoordinate {
                latitude: 40.0,
                longitude: -105.0,
            },
        );
        pipeline.start()?;

        assert!(matches!(pipeline.tick(), TickOutcome::ClassificationFailed));
        assert_eq!(pipeline.state(), SessionState::Streaming);
        assert_eq!(pipeline.notifier().calls, 0);

        // The next frame is read and gated as usual.
        assert!(matches!(pipeline.tick(), TickOutcome::Suppressed));
        let stats = pipeline.stats();
        assert_eq!(stats.frames_read, 2);
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.classification_failures, 1);
        assert_eq!(stats.positives, 0);
        assert_eq!(pipeline.notifier().calls, 0);
        Ok(())
    }

    #[test]
    fn stop_handle_ends_streaming_at_next_tick() -> anyhow::Result<()> {
        let mut pipeline = pipeline(1.0);
        pipeline.start()?;
        let handle = pipeline.stop_handle();
        handle.stop();
        assert!(matches!(pipeline.tick(), TickOutcome::NotStreaming));
        assert_eq!(pipeline.state(), SessionState::Stopped);
        assert!(!pipeline.source_active());
        assert!(pipeline.start().is_err());
        Ok(())
    }

    #[test]
    fn run_returns_after_external_stop() -> anyhow::Result<()> {
        let mut pipeline = pipeline(1.0);
        let handle = pipeline.stop_handle();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.stop();
        });
        let stats = pipeline.run(Duration::from_millis(5))?;
        stopper.join().map_err(|_| anyhow::anyhow!("stopper panicked"))?;
        assert!(stats.frames_read >= 1);
        assert_eq!(pipeline.state(), SessionState::Stopped);
        Ok(())
    }

    #[test]
    fn positives_write_snapshots() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = DetectionEngine::new(Box::new(StubBackend::new(0.2))).without_color_prefilter();
        let mut pipeline = Pipeline::new(
            SyntheticSource::new("stub://test", 16, 12),
            engine,
            CountingNotifier::default(),
            GeoCoordinate {
                latitude: 1.0,
                longitude: 2.0,
            },
        )
        .with_snapshot_dir(dir.path());
        pipeline.start()?;
        assert!(matches!(pipeline.tick(), TickOutcome::Alerted(_)));
        assert_eq!(pipeline.notifier().calls, 1);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}
