//! Hand-crafted appearance descriptor used when no learned model is injected.
//!
//! The descriptor concatenates per-channel color histograms, a coarse spatial
//! grid of edge density and a gradient orientation histogram. It is cheap and
//! noticeably less discriminative than a re-id network.

use image::imageops;
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use crate::appearance::embedder::crop_resized;
use crate::appearance::{EmbedError, Embedder, Embedding};
use crate::tracker::Rect;

const PATCH_WIDTH: u32 = 64;
const PATCH_HEIGHT: u32 = 128;
const COLOR_BINS: usize = 16;
const GRID_COLS: usize = 4;
const GRID_ROWS: usize = 8;
const ORIENTATION_BINS: usize = 9;

/// Length of the vectors produced by [`HistogramEmbedder`].
pub const HISTOGRAM_EMBEDDING_DIM: usize =
    3 * COLOR_BINS + GRID_COLS * GRID_ROWS + ORIENTATION_BINS;

type GradientImage = ImageBuffer<Luma<i16>, Vec<i16>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramEmbedder;

impl HistogramEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Describe the region of `frame` under `bbox`. Never fails: an empty or
    /// off-frame region yields a uniform descriptor.
    pub fn describe(&self, frame: &RgbImage, bbox: &Rect) -> Embedding {
        let Some(patch) = crop_resized(frame, bbox, PATCH_WIDTH, PATCH_HEIGHT) else {
            return uniform();
        };

        let mut features = Vec::with_capacity(HISTOGRAM_EMBEDDING_DIM);
        color_histograms(&patch, &mut features);

        let gray: GrayImage = imageops::grayscale(&patch);
        let gx = horizontal_sobel(&gray);
        let gy = vertical_sobel(&gray);
        edge_grid(&gx, &gy, &mut features);
        orientation_histogram(&gx, &gy, &mut features);

        Embedding::new(features).unwrap_or_else(|_| uniform())
    }
}

impl Embedder for HistogramEmbedder {
    fn embed(&self, frame: &RgbImage, bbox: &Rect) -> Result<Embedding, EmbedError> {
        Ok(self.describe(frame, bbox))
    }
}

fn uniform() -> Embedding {
    Embedding::from_raw(vec![1.0; HISTOGRAM_EMBEDDING_DIM])
}

fn color_histograms(patch: &RgbImage, out: &mut Vec<f32>) {
    let mut bins = [[0f32; COLOR_BINS]; 3];
    for pixel in patch.pixels() {
        for (channel, &value) in pixel.0.iter().enumerate() {
            bins[channel][value as usize * COLOR_BINS / 256] += 1.0;
        }
    }

    let total = (patch.width() * patch.height()).max(1) as f32;
    for channel in bins {
        out.extend(channel.iter().map(|count| count / total));
    }
}

fn edge_grid(gx: &GradientImage, gy: &GradientImage, out: &mut Vec<f32>) {
    let (width, height) = gx.dimensions();
    let mut sums = [0f32; GRID_COLS * GRID_ROWS];
    let mut counts = [0u32; GRID_COLS * GRID_ROWS];

    for (x, y, gxp) in gx.enumerate_pixels() {
        let gyp = gy.get_pixel(x, y);
        let col = (x as usize * GRID_COLS / width as usize).min(GRID_COLS - 1);
        let row = (y as usize * GRID_ROWS / height as usize).min(GRID_ROWS - 1);
        let cell = row * GRID_COLS + col;
        sums[cell] += magnitude(gxp.0[0], gyp.0[0]);
        counts[cell] += 1;
    }

    let means: Vec<f32> = sums
        .iter()
        .zip(counts)
        .map(|(sum, count)| if count > 0 { sum / count as f32 } else { 0.0 })
        .collect();
    let max = means.iter().cloned().fold(0.0, f32::max);
    if max > 0.0 {
        out.extend(means.iter().map(|m| m / max));
    } else {
        out.extend(means);
    }
}

fn orientation_histogram(gx: &GradientImage, gy: &GradientImage, out: &mut Vec<f32>) {
    let mut bins = [0f32; ORIENTATION_BINS];
    let mut total = 0.0;

    for (x, y, gxp) in gx.enumerate_pixels() {
        let dx = gxp.0[0] as f32;
        let dy = gy.get_pixel(x, y).0[0] as f32;
        let weight = (dx * dx + dy * dy).sqrt();
        if weight == 0.0 {
            continue;
        }
        // Unsigned orientation in [0, pi).
        let mut angle = dy.atan2(dx);
        if angle < 0.0 {
            angle += std::f32::consts::PI;
        }
        let bin = ((angle / std::f32::consts::PI) * ORIENTATION_BINS as f32) as usize;
        bins[bin.min(ORIENTATION_BINS - 1)] += weight;
        total += weight;
    }

    if total > 0.0 {
        bins.iter_mut().for_each(|b| *b /= total);
    }
    out.extend(bins);
}

#[inline]
fn magnitude(dx: i16, dy: i16) -> f32 {
    let (dx, dy) = (dx as f32, dy as f32);
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn two_people_frame() -> RgbImage {
        // Red person on the left, blue striped person on the right.
        RgbImage::from_fn(200, 200, |x, y| {
            if x < 100 {
                Rgb([200, 30, 30])
            } else if y % 8 < 4 {
                Rgb([20, 40, 220])
            } else {
                Rgb([240, 240, 240])
            }
        })
    }

    #[test]
    fn test_dimension_and_norm() {
        let frame = two_people_frame();
        let e = HistogramEmbedder::new().describe(&frame, &Rect::new(10.0, 10.0, 60.0, 150.0));
        assert_eq!(e.len(), HISTOGRAM_EMBEDDING_DIM);
        let norm: f32 = e.as_slice().iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_same_region_is_identical() {
        let frame = two_people_frame();
        let embedder = HistogramEmbedder::new();
        let bbox = Rect::new(120.0, 20.0, 50.0, 120.0);
        let a = embedder.describe(&frame, &bbox);
        let b = embedder.describe(&frame, &bbox);
        assert!((a.cosine_similarity(&b).unwrap() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_different_appearance_is_less_similar() {
        let frame = two_people_frame();
        let embedder = HistogramEmbedder::new();
        let left_a = embedder.describe(&frame, &Rect::new(10.0, 10.0, 60.0, 150.0));
        let left_b = embedder.describe(&frame, &Rect::new(20.0, 30.0, 60.0, 150.0));
        let right = embedder.describe(&frame, &Rect::new(120.0, 10.0, 60.0, 150.0));

        let same = left_a.cosine_similarity(&left_b).unwrap();
        let different = left_a.cosine_similarity(&right).unwrap();
        assert!(same > different);
    }

    #[test]
    fn test_off_frame_box_still_succeeds() {
        let frame = two_people_frame();
        let embedder = HistogramEmbedder::new();
        let result = embedder.embed(&frame, &Rect::new(500.0, 500.0, 20.0, 20.0));
        let e = result.unwrap();
        assert_eq!(e.len(), HISTOGRAM_EMBEDDING_DIM);
        assert!(e.validate().is_ok());
    }
}
