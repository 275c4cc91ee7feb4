//! Change gate: suppress frames that look like the last admitted one.
//!
//! Dissimilarity is the mean squared error over every channel sample, so the score
//! ranges over `[0, 255^2]`. A frame is admitted when the score reaches
//! `CHANGE_THRESHOLD`; admission replaces the reference frame.
//!
//! The reference starts out as an implicit all-black frame. The first real frame
//! is therefore admitted unless the scene itself is close to black.

use crate::frame::Frame;

/// Minimum MSE for a frame to count as a scene change.
pub const CHANGE_THRESHOLD: f64 = 1200.0;

/// Mean squared error between two frames of equal size.
///
/// Returns `None` when the dimensions differ.
pub fn mean_squared_error(a: &Frame, b: &Frame) -> Option<f64> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let total = a.element_count();
    if total == 0 {
        return Some(0.0);
    }
    let sum: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| {
            let d = x as i64 - y as i64;
            (d * d) as u64
        })
        .sum();
    Some(sum as f64 / total as f64)
}

/// MSE against an all-zero frame of the same size.
fn mean_squared_energy(frame: &Frame) -> f64 {
    let total = frame.element_count();
    if total == 0 {
        return 0.0;
    }
    let sum: u64 = frame
        .as_raw()
        .iter()
        .map(|&v| (v as u64) * (v as u64))
        .sum();
    sum as f64 / total as f64
}

/// Single-writer change detector owned by the pipeline thread.
#[derive(Debug, Default)]
pub struct ChangeGate {
    last_admitted: Option<Frame>,
}

impl ChangeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score `frame` against the reference. Dimension changes always count as a change.
    pub fn score(&self, frame: &Frame) -> f64 {
        match &self.last_admitted {
            None => mean_squared_energy(frame),
            Some(last) => mean_squared_error(frame, last).unwrap_or(f64::INFINITY),
        }
    }

    /// Returns `true` and takes `frame` as the new reference if it differs enough.
    pub fn admit(&mut self, frame: &Frame) -> bool {
        let mse = self.score(frame);
        let admitted = mse >= CHANGE_THRESHOLD;
        log::debug!(
            "change gate: mse={:.1} threshold={} admitted={}",
            mse,
            CHANGE_THRESHOLD,
            admitted
        );
        if admitted {
            self.last_admitted = Some(frame.clone());
        }
        admitted
    }

    /// The frame detection last ran on, if any.
    pub fn last_admitted(&self) -> Option<&Frame> {
        self.last_admitted.as_ref()
    }
}
