use image::RgbImage;
use image::imageops::{self, FilterType};
use thiserror::Error;

use crate::appearance::{Embedding, EmbeddingError};
use crate::tracker::Rect;

/// Failure of an embedder for one frame.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("invalid embedder input: {0}")]
    InvalidInput(String),
    #[error("embedding inference failed: {0}")]
    Inference(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Capability that turns an image region into an appearance embedding.
///
/// Implementations must be pure with respect to shared state so that camera
/// loops can call them concurrently without locking.
///
/// # Example
///
/// ```ignore
/// use roomtrack_rs::{Embedder, Embedding, EmbedError, Rect};
///
/// struct ReidNet { /* ... */ }
///
/// impl Embedder for ReidNet {
///     fn embed(&self, frame: &image::RgbImage, bbox: &Rect) -> Result<Embedding, EmbedError> {
///         // Crop, run inference, wrap the output
///         Ok(Embedding::new(vec![0.0; 512])?)
///     }
/// }
/// ```
pub trait Embedder: Send + Sync {
    fn embed(&self, frame: &RgbImage, bbox: &Rect) -> Result<Embedding, EmbedError>;

    /// Embed every box of one frame. Any failure invalidates the whole batch.
    fn embed_all(&self, frame: &RgbImage, boxes: &[Rect]) -> Result<Vec<Embedding>, EmbedError> {
        boxes.iter().map(|bbox| self.embed(frame, bbox)).collect()
    }
}

/// Crop `bbox` out of `frame` (clipped to the frame) and resize it to
/// `width x height`. Returns `None` when nothing of the box is visible.
pub(crate) fn crop_resized(frame: &RgbImage, bbox: &Rect, width: u32, height: u32) -> Option<RgbImage> {
    let region = bbox.clip(frame.width() as f32, frame.height() as f32);
    let [x1, y1, x2, y2] = region.to_tlbr();
    let x = x1.floor() as u32;
    let y = y1.floor() as u32;
    let crop_width = (x2.ceil() as u32).min(frame.width()).saturating_sub(x);
    let crop_height = (y2.ceil() as u32).min(frame.height()).saturating_sub(y);
    if crop_width == 0 || crop_height == 0 {
        return None;
    }

    let crop = imageops::crop_imm(frame, x, y, crop_width, crop_height).to_image();
    Some(imageops::resize(&crop, width, height, FilterType::Triangle))
}
