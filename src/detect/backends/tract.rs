#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{ModelBackend, ModelInput};

/// Tract-based backend for ONNX fire classifiers.
///
/// Loads a local model file once; inference is in-process with no network I/O.
/// The class-0 value of the first output is the score.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    size: u32,
    channels_last: bool,
}

impl TractBackend {
    /// Load an ONNX model taking a `size x size` RGB input.
    ///
    /// `channels_last` selects NHWC (Keras exports) over NCHW input layout.
    pub fn new<P: AsRef<Path>>(model_path: P, size: u32, channels_last: bool) -> Result<Self> {
        let model_path = model_path.as_ref();
        let s = size as usize;
        let shape = if channels_last {
            tvec!(1, s, s, 3)
        } else {
            tvec!(1, 3, s, s)
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            size,
            channels_last,
        })
    }

    fn build_input(&self, input: &ModelInput) -> Result<Tensor> {
        if input.size != self.size {
            return Err(anyhow!(
                "input canvas {} does not match model input {}",
                input.size,
                self.size
            ));
        }
        let s = self.size as usize;
        let tensor = if self.channels_last {
            tract_ndarray::Array4::from_shape_fn((1, s, s, 3), |(_, y, x, c)| input.at(x, y, c))
                .into_tensor()
        } else {
            tract_ndarray::Array4::from_shape_fn((1, 3, s, s), |(_, c, y, x)| input.at(x, y, c))
                .into_tensor()
        };
        Ok(tensor)
    }

    fn extract_score(&self, outputs: TVec<TValue>) -> Result<f32> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        scores
            .iter()
            .next()
            .copied()
            .ok_or_else(|| anyhow!("model output tensor was empty"))
    }
}

impl ModelBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn score(&mut self, input: &ModelInput) -> Result<f32> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        self.extract_score(outputs)
    }

    /// One blank inference so the first real frame does not pay plan setup.
    fn warm_up(&mut self) -> Result<()> {
        let blank = ModelInput {
            size: self.size,
            data: vec![0.0; (self.size as usize).pow(2) * 3],
        };
        self.score(&blank).map(|_| ())
    }
}
