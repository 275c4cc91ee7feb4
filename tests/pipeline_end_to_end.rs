use std::collections::VecDeque;

use anyhow::Result;
use image::{Rgb, RgbImage};

use wildfire_watch::detect::{ModelBackend, ModelInput};
use wildfire_watch::ingest::SourceStats;
use wildfire_watch::{
    DetectionEngine, DispatchSummary, Frame, FrameSource, GeoCoordinate, Notifier, Pipeline,
    SessionState, TickOutcome, WatchError,
};

const FLAME: [u8; 3] = [220, 151, 117];

/// Plays a fixed list of frames, then reports inactive.
struct ScriptedSource {
    frames: VecDeque<Frame>,
    open: bool,
    fail_open: bool,
    served: u64,
}

impl ScriptedSource {
    fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            open: false,
            fail_open: false,
            served: 0,
        }
    }

    fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Self::new(Vec::new())
        }
    }
}

impl FrameSource for ScriptedSource {
    fn uri(&self) -> &str {
        "script://test"
    }

    fn open(&mut self) -> Result<(), WatchError> {
        if self.fail_open {
            return Err(WatchError::SourceUnavailable {
                uri: self.uri().to_string(),
                reason: "no such device".to_string(),
            });
        }
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, WatchError> {
        if !self.open {
            return Err(WatchError::FrameUnavailable("closed".to_string()));
        }
        let frame = self
            .frames
            .pop_front()
            .ok_or_else(|| WatchError::FrameUnavailable("script finished".to_string()))?;
        self.served += 1;
        Ok(frame)
    }

    fn is_active(&self) -> bool {
        self.open && !self.frames.is_empty()
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.served,
            uri: self.uri().to_string(),
        }
    }
}

/// 0.1 when the canvas holds bright red-dominant pixels, 0.9 otherwise.
struct FlameSensitiveModel;

impl ModelBackend for FlameSensitiveModel {
    fn name(&self) -> &'static str {
        "flame-sensitive"
    }

    fn score(&mut self, input: &ModelInput) -> Result<f32> {
        let flame = input
            .data
            .chunks_exact(3)
            .any(|px| px[0] > 0.8 && px[0] > px[2] + 0.2);
        Ok(if flame { 0.1 } else { 0.9 })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    alerts: Vec<(Vec<u8>, GeoCoordinate)>,
}

impl Notifier for RecordingNotifier {
    fn dispatch(
        &mut self,
        frame: &Frame,
        coordinate: GeoCoordinate,
    ) -> Result<DispatchSummary, WatchError> {
        let png = frame
            .encode_png()
            .map_err(|err| WatchError::AlertBuild(err.to_string()))?;
        self.alerts.push((png, coordinate));
        Ok(DispatchSummary {
            delivered: 1,
            failures: Vec::new(),
        })
    }
}

fn fire_box_frame() -> Frame {
    let mut image = RgbImage::new(64, 48);
    for y in 16..32 {
        for x in 22..42 {
            image.put_pixel(x, y, Rgb(FLAME));
        }
    }
    Frame::new(image)
}

fn camera() -> GeoCoordinate {
    GeoCoordinate {
        latitude: 37.8651,
        longitude: -119.5383,
    }
}

fn pipeline(frames: Vec<Frame>) -> Pipeline<RecordingNotifier> {
    Pipeline::new(
        ScriptedSource::new(frames),
        DetectionEngine::new(Box::new(FlameSensitiveModel)),
        RecordingNotifier::default(),
        camera(),
    )
}

#[test]
fn fire_frame_after_dark_scene_alerts_exactly_once() -> Result<()> {
    let fire = fire_box_frame();
    let expected_png = fire.encode_png()?;
    let mut pipeline = pipeline(vec![Frame::black(64, 48), Frame::black(64, 48), fire]);
    pipeline.start()?;

    // A black opening frame matches the zero reference and is never classified.
    assert!(matches!(pipeline.tick(), TickOutcome::Suppressed));
    assert!(matches!(pipeline.tick(), TickOutcome::Suppressed));
    match pipeline.tick() {
        TickOutcome::Alerted(summary) => assert_eq!(summary.delivered, 1),
        other => panic!("expected an alert, got {:?}", other),
    }

    let alerts = &pipeline.notifier().alerts;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].0, expected_png);
    assert_eq!(alerts[0].1, camera());

    let stats = pipeline.stats();
    assert_eq!(stats.frames_read, 3);
    assert_eq!(stats.suppressed, 2);
    assert_eq!(stats.admitted, 1);
    assert_eq!(stats.positives, 1);
    Ok(())
}

#[test]
fn lit_opening_scene_is_classified_negative() -> Result<()> {
    let dusk = Frame::filled(64, 48, [70, 70, 70]);
    let mut pipeline = pipeline(vec![dusk.clone(), dusk, fire_box_frame()]);
    pipeline.start()?;

    assert!(matches!(pipeline.tick(), TickOutcome::Negative));
    assert!(matches!(pipeline.tick(), TickOutcome::Suppressed));
    assert!(matches!(pipeline.tick(), TickOutcome::Alerted(_)));
    assert_eq!(pipeline.notifier().alerts.len(), 1);
    Ok(())
}

#[test]
fn run_drains_the_source_and_stops() -> Result<()> {
    let mut pipeline = pipeline(vec![
        Frame::black(64, 48),
        Frame::black(64, 48),
        fire_box_frame(),
    ]);
    let stats = pipeline.run(std::time::Duration::from_millis(1))?;

    assert_eq!(pipeline.state(), SessionState::Stopped);
    assert_eq!(stats.frames_read, 3);
    assert_eq!(pipeline.notifier().alerts.len(), 1);
    Ok(())
}

#[test]
fn unavailable_source_fails_startup_and_stays_idle() {
    let mut pipeline = Pipeline::new(
        ScriptedSource::unavailable(),
        DetectionEngine::new(Box::new(FlameSensitiveModel)),
        RecordingNotifier::default(),
        camera(),
    );

    let err = pipeline.start().unwrap_err();
    assert!(matches!(err, WatchError::SourceUnavailable { .. }));
    assert_eq!(pipeline.state(), SessionState::Idle);
    assert!(matches!(pipeline.tick(), TickOutcome::NotStreaming));
    assert!(pipeline.run(std::time::Duration::from_millis(1)).is_err());
}

#[test]
fn missing_frames_skip_the_tick() -> Result<()> {
    let mut pipeline = pipeline(Vec::new());
    pipeline.start()?;
    assert!(matches!(pipeline.tick(), TickOutcome::FrameUnavailable));
    assert!(matches!(pipeline.tick(), TickOutcome::FrameUnavailable));
    assert_eq!(pipeline.state(), SessionState::Streaming);
    assert_eq!(pipeline.stats().frames_unavailable, 2);
    Ok(())
}

#[test]
fn stop_handle_stops_from_another_thread() -> Result<()> {
    let mut pipeline = pipeline(vec![Frame::black(8, 8); 4]);
    pipeline.start()?;
    let handle = pipeline.stop_handle();
    std::thread::spawn(move || handle.stop())
        .join()
        .map_err(|_| anyhow::anyhow!("stopper panicked"))?;

    assert!(matches!(pipeline.tick(), TickOutcome::NotStreaming));
    assert_eq!(pipeline.state(), SessionState::Stopped);
    assert_eq!(pipeline.stats().frames_read, 0);
    Ok(())
}
