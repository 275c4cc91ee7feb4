use anyhow::{anyhow, Result};
use image::RgbImage;

/// Square, letterboxed model input: `size x size x 3` floats in `[0, 1]`, HWC order.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelInput {
    pub size: u32,
    pub data: Vec<f32>,
}

impl ModelInput {
    /// Normalize a square canvas produced by `letterbox`.
    pub fn from_canvas(canvas: &RgbImage) -> Result<Self> {
        let (width, height) = canvas.dimensions();
        if width != height {
            return Err(anyhow!(
                "model canvas must be square, got {}x{}",
                width,
                height
            ));
        }
        let data = canvas.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        Ok(Self { size: width, data })
    }

    /// Channel value at `(x, y, channel)`.
    pub fn at(&self, x: usize, y: usize, channel: usize) -> f32 {
        self.data[(y * self.size as usize + x) * 3 + channel]
    }
}

/// Scoring model behind the detection engine.
///
/// `score` returns the model's class-0 probability. It is *low* for fire: the
/// engine treats `score <= 0.5` as a positive.
pub trait ModelBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn score(&mut self, input: &ModelInput) -> Result<f32>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: ModelBackend + ?Sized> ModelBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn score(&mut self, input: &ModelInput) -> Result<f32> {
        (**self).score(input)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
