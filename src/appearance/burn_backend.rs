//! Burn inference backend for learned appearance embeddings.
//!
//! This module provides a `BurnEmbedder` that implements [`Embedder`] for
//! re-identification networks built with the Burn framework. It replaces the
//! built-in histogram descriptor without changes to any caller.
//!
//! # Example
//!
//! ```ignore
//! use roomtrack_rs::appearance::{BurnEmbedder, BurnEmbedModel};
//! use burn::backend::NdArray;
//!
//! struct OsNet { /* ... */ }
//!
//! impl BurnEmbedModel<NdArray> for OsNet {
//!     fn forward(&self, input: burn::tensor::Tensor<NdArray, 4>) -> burn::tensor::Tensor<NdArray, 2> {
//!         // Run inference, one feature row per input image
//!     }
//! }
//!
//! let embedder = BurnEmbedder::new(OsNet::load("osnet.bin"), Default::default());
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;
use image::RgbImage;

use crate::appearance::embedder::crop_resized;
use crate::appearance::{EmbedError, Embedder, Embedding};
use crate::tracker::Rect;

/// ImageNet channel statistics used by most re-id backbones.
const PIXEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const PIXEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Trait for Burn-based re-identification models.
pub trait BurnEmbedModel<B: Backend>: Send + Sync {
    /// Run a forward pass on a `[batch, 3, height, width]` tensor and return
    /// one feature row per image.
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Expected input size as (width, height).
    fn input_size(&self) -> (u32, u32) {
        (128, 256)
    }
}

/// Burn-based embedder implementing [`Embedder`].
pub struct BurnEmbedder<B: Backend, M: BurnEmbedModel<B>> {
    model: M,
    device: B::Device,
}

impl<B: Backend, M: BurnEmbedModel<B>> BurnEmbedder<B, M> {
    pub fn new(model: M, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Crop, resize and normalize a region into a `[1, 3, H, W]` tensor.
    pub fn preprocess(&self, frame: &RgbImage, bbox: &Rect) -> Result<Tensor<B, 4>, EmbedError> {
        let (width, height) = self.model.input_size();
        let patch = crop_resized(frame, bbox, width, height).ok_or_else(|| {
            EmbedError::InvalidInput(format!("box {bbox:?} lies outside the frame"))
        })?;

        let plane = (width * height) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (x, y, pixel) in patch.enumerate_pixels() {
            let offset = (y * width + x) as usize;
            for c in 0..3 {
                data[c * plane + offset] = (pixel.0[c] as f32 / 255.0 - PIXEL_MEAN[c]) / PIXEL_STD[c];
            }
        }

        Ok(Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([
            1,
            3,
            height as usize,
            width as usize,
        ]))
    }
}

impl<B: Backend, M: BurnEmbedModel<B>> Embedder for BurnEmbedder<B, M> {
    fn embed(&self, frame: &RgbImage, bbox: &Rect) -> Result<Embedding, EmbedError> {
        let input = self.preprocess(frame, bbox)?;
        let output = self.model.forward(input);
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| EmbedError::Inference(format!("{e:?}")))?;
        Ok(Embedding::new(values)?)
    }
}
