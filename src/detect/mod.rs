mod backend;
mod backends;
pub mod color;
mod engine;
mod letterbox;

pub use backend::{ModelBackend, ModelInput};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use color::{ColorFilter, HsvRange, Region};
pub use engine::{
    is_fire_score, DetectionEngine, DetectionReport, DEFAULT_INPUT_SIZE, FIRE_SCORE_CEILING,
};
pub use letterbox::letterbox;
