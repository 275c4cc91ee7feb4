use anyhow::Result;

use crate::detect::backend::{ModelBackend, ModelInput};

/// Fixed-score backend for tests and camera-less runs.
pub struct StubBackend {
    score: f32,
}

impl StubBackend {
    pub fn new(score: f32) -> Self {
        Self { score }
    }

    /// Scores every input as "no fire".
    pub fn never_fire() -> Self {
        Self::new(1.0)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::never_fire()
    }
}

impl ModelBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn score(&mut self, _input: &ModelInput) -> Result<f32> {
        Ok(self.score)
    }
}
