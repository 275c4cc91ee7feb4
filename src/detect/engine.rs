//! Two-stage fire/smoke classifier.
//!
//! Every frame is letterboxed onto the model canvas first. The color pre-filter
//! (when enabled) then runs on that canvas, so its size thresholds are in canvas
//! pixels. Only frames the pre-filter accepts are scored by the model.

use crate::config::DetectorSettings;
use crate::detect::backend::{ModelBackend, ModelInput};
use crate::detect::backends::StubBackend;
use crate::detect::color::{ColorFilter, Region};
use crate::detect::letterbox::letterbox;
use crate::error::WatchError;
use crate::frame::Frame;

/// The model's class-0 output is low for fire; at or below this is a positive.
pub const FIRE_SCORE_CEILING: f32 = 0.5;

/// Side of the square model canvas.
pub const DEFAULT_INPUT_SIZE: u32 = 128;

/// `score <= 0.5` is fire. NaN never is.
pub fn is_fire_score(score: f32) -> bool {
    score <= FIRE_SCORE_CEILING
}

/// Stage-by-stage account of one classification.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionReport {
    /// Candidate regions found by the pre-filter; `None` when it is disabled.
    pub regions: Option<Vec<Region>>,
    pub prefilter_passed: bool,
    /// Model output; `None` when the pre-filter rejected the frame.
    pub score: Option<f32>,
    pub fire: bool,
}

pub struct DetectionEngine {
    backend: Box<dyn ModelBackend>,
    input_size: u32,
    prefilter: Option<ColorFilter>,
}

impl DetectionEngine {
    pub fn new(backend: Box<dyn ModelBackend>) -> Self {
        Self {
            backend,
            input_size: DEFAULT_INPUT_SIZE,
            prefilter: Some(ColorFilter::new()),
        }
    }

    /// Engine for the configured model, or the stub backend when no model is set.
    pub fn from_settings(settings: &DetectorSettings) -> anyhow::Result<Self> {
        let backend = build_backend(settings)?;
        let engine = Self::new(backend).with_input_size(settings.input_size);
        Ok(if settings.color_prefilter {
            engine
        } else {
            engine.without_color_prefilter()
        })
    }

    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    /// Score every frame with the model alone.
    pub fn without_color_prefilter(mut self) -> Self {
        self.prefilter = None;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    pub fn warm_up(&mut self) -> anyhow::Result<()> {
        self.backend.warm_up()
    }

    /// Fire/smoke verdict for one frame.
    ///
    /// A model failure is returned as `ClassificationFailure`; callers treat it
    /// as a negative for this frame only.
    pub fn classify(&mut self, frame: &Frame) -> Result<bool, WatchError> {
        self.inspect(frame).map(|report| report.fire)
    }

    pub fn inspect(&mut self, frame: &Frame) -> Result<DetectionReport, WatchError> {
        let canvas = letterbox(frame.image(), self.input_size);

        let (regions, prefilter_passed) = match &self.prefilter {
            Some(filter) => {
                let regions = filter.candidate_regions(&canvas);
                let passed = regions.iter().any(|r| filter.is_significant(r));
                (Some(regions), passed)
            }
            None => (None, true),
        };
        if !prefilter_passed {
            return Ok(DetectionReport {
                regions,
                prefilter_passed,
                score: None,
                fire: false,
            });
        }

        let input = ModelInput::from_canvas(&canvas)
            .map_err(|err| WatchError::ClassificationFailure(err.to_string()))?;
        let score = self.backend.score(&input).map_err(|err| {
            WatchError::ClassificationFailure(format!("{} backend: {:#}", self.backend.name(), err))
        })?;
        let fire = is_fire_score(score);
        log::debug!(
            "detection: backend={} score={:.4} fire={}",
            self.backend.name(),
            score,
            fire
        );

        Ok(DetectionReport {
            regions,
            prefilter_passed,
            score: Some(score),
            fire,
        })
    }
}

fn build_backend(settings: &DetectorSettings) -> anyhow::Result<Box<dyn ModelBackend>> {
    match &settings.model_path {
        #[cfg(feature = "backend-tract")]
        Some(path) => {
            let backend = crate::detect::backends::TractBackend::new(
                path,
                settings.input_size,
                settings.channels_last,
            )?;
            log::info!("detection: loaded {}", path.display());
            Ok(Box::new(backend))
        }
        #[cfg(not(feature = "backend-tract"))]
        Some(path) => Err(anyhow::anyhow!(
            "model {} needs the backend-tract feature",
            path.display()
        )),
        None => {
            log::warn!(
                "detection: no model configured, stub backend scores every frame {}",
                settings.stub_score
            );
            Ok(Box::new(StubBackend::new(settings.stub_score)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use image::{Rgb, RgbImage};

    struct FailingBackend;

    impl ModelBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn score(&mut self, _input: &ModelInput) -> anyhow::Result<f32> {
            Err(anyhow!("tensor shape mismatch"))
        }
    }

    fn flame_frame() -> Frame {
        let mut image = RgbImage::new(64, 48);
        for y in 16..32 {
            for x in 22..42 {
                image.put_pixel(x, y, Rgb([220, 151, 117]));
            }
        }
        Frame::new(image)
    }

    #[test]
    fn half_is_fire() {
        assert!(is_fire_score(0.5));
        assert!(is_fire_score(0.0));
        assert!(!is_fire_score(0.500_001));
        assert!(!is_fire_score(f32::NAN));
    }

    #[test]
    fn boundary_score_classifies_as_fire() -> anyhow::Result<()> {
        let mut engine = DetectionEngine::new(Box::new(StubBackend::new(0.5)));
        assert!(engine.classify(&flame_frame())?);
        Ok(())
    }

    #[test]
    fn prefilter_rejection_skips_the_model() -> anyhow::Result<()> {
        let mut engine = DetectionEngine::new(Box::new(StubBackend::new(0.0)));
        let report = engine.inspect(&Frame::black(64, 48))?;
        assert!(!report.prefilter_passed);
        assert_eq!(report.score, None);
        assert!(!report.fire);
        Ok(())
    }

    #[test]
    fn model_alone_decides_without_prefilter() -> anyhow::Result<()> {
        let mut engine =
            DetectionEngine::new(Box::new(StubBackend::new(0.1))).without_color_prefilter();
        let report = engine.inspect(&Frame::black(64, 48))?;
        assert_eq!(report.regions, None);
        assert_eq!(report.score, Some(0.1));
        assert!(report.fire);
        Ok(())
    }

    #[test]
    fn verdict_is_deterministic() -> anyhow::Result<()> {
        let mut engine = DetectionEngine::new(Box::new(StubBackend::new(0.3)));
        let frame = flame_frame();
        let first = engine.inspect(&frame)?;
        for _ in 0..3 {
            assert_eq!(engine.inspect(&frame)?, first);
        }
        Ok(())
    }

    #[test]
    fn settings_without_model_use_stub() -> anyhow::Result<()> {
        let settings = DetectorSettings {
            model_path: None,
            input_size: 96,
            color_prefilter: false,
            channels_last: true,
            stub_score: 0.25,
        };
        let mut engine = DetectionEngine::from_settings(&settings)?;
        assert_eq!(engine.backend_name(), "stub");
        assert_eq!(engine.input_size(), 96);
        assert!(engine.classify(&Frame::black(10, 10))?);
        Ok(())
    }

    #[test]
    fn model_failure_is_a_classification_failure() {
        let mut engine = DetectionEngine::new(Box::new(FailingBackend)).without_color_prefilter();
        let err = engine.classify(&flame_frame()).unwrap_err();
        assert!(matches!(err, WatchError::ClassificationFailure(_)));
    }
}
