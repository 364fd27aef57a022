//! Trait for object detection inference backends.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt::Display;

use crate::integration::Frame;
use crate::tracker::Detection;

/// Trait for object detection inference backends.
///
/// Implement this trait to connect any detection model to a camera loop.
///
/// # Example
///
/// ```ignore
/// use roomtrack_rs::{DetectionSource, Detection, Frame};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
///         // Run inference and return person boxes
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error: Display;

    /// Run inference on one frame and return its detections.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error>;
}

/// Replays precomputed detections, one batch per frame, ignoring pixel data.
///
/// Useful for offline evaluation of recorded detector output. Once the
/// recording is exhausted every further frame yields no detections.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    batches: VecDeque<Vec<Detection>>,
}

impl ReplaySource {
    pub fn new(batches: impl IntoIterator<Item = Vec<Detection>>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

impl DetectionSource for ReplaySource {
    type Error = Infallible;

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
        Ok(self.batches.pop_front().unwrap_or_default())
    }
}
