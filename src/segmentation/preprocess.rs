use crate::error::{Error, Result};
use image::{imageops, GrayImage, RgbImage};
use ndarray::Array4;
use rayon::prelude::*;

/// Per-channel pixel mean used to normalise encoder input (RGB order)
pub const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
/// Per-channel pixel standard deviation (RGB order)
pub const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// Preprocessor for converting RGB images to SAM encoder input tensors
pub struct Preprocessor {
    target_length: u32,
}

impl Preprocessor {
    pub fn new(target_length: u32) -> Self {
        Self { target_length }
    }

    pub fn target_length(&self) -> u32 {
        self.target_length
    }

    /// Size of `width` x `height` once its longest side is scaled to the target length
    pub fn resized_shape(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = self.target_length as f64 / width.max(height) as f64;
        let new_width = (width as f64 * scale + 0.5) as u32;
        let new_height = (height as f64 * scale + 0.5) as u32;
        (new_width.max(1), new_height.max(1))
    }

    /// Preprocess an RGB image into a normalized, padded NCHW tensor
    ///
    /// Steps:
    /// 1. Resize so the longest side equals the target length
    /// 2. Normalize each channel with the pixel mean and std
    /// 3. Zero-pad bottom and right to a square of the target length
    ///
    /// Channel planes are filled in parallel on the current rayon pool.
    ///
    /// Returns: Array4<f32> with shape [1, 3, target, target]
    pub fn preprocess(&self, image: &RgbImage) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        let (width, height) = image.dimensions();
        let (new_width, new_height) = self.resized_shape(width, height);
        let resized = if (new_width, new_height) != (width, height) {
            imageops::resize(image, new_width, new_height, imageops::FilterType::Triangle)
        } else {
            image.clone()
        };

        let side = self.target_length as usize;
        let plane_len = side * side;
        let mut data = vec![0.0f32; 3 * plane_len];

        data.par_chunks_mut(plane_len)
            .enumerate()
            .for_each(|(channel, plane)| {
                for (x, y, pixel) in resized.enumerate_pixels() {
                    plane[y as usize * side + x as usize] =
                        (pixel[channel] as f32 - PIXEL_MEAN[channel]) / PIXEL_STD[channel];
                }
            });

        Array4::from_shape_vec((1, 3, side, side), data)
            .map_err(|e| Error::Embedding(format!("invalid input tensor shape: {e}")))
    }

    /// Map a point from source image coordinates into the resized frame
    pub fn transform_point(&self, x: f32, y: f32, width: u32, height: u32) -> (f32, f32) {
        let (new_width, new_height) = self.resized_shape(width, height);
        (
            x * (new_width as f32 / width as f32),
            y * (new_height as f32 / height as f32),
        )
    }
}

/// Stability of a mask under a shift of the binarisation threshold
///
/// Ratio of pixels above `threshold + offset` to pixels above
/// `threshold - offset`. An empty union scores 0.
pub fn stability_score(logits: &[f32], threshold: f32, offset: f32) -> f32 {
    let intersections = logits.iter().filter(|&&v| v > threshold + offset).count();
    let unions = logits.iter().filter(|&&v| v > threshold - offset).count();

    if unions == 0 {
        0.0
    } else {
        intersections as f32 / unions as f32
    }
}

/// Binarise mask logits into a greyscale image: 255 above `threshold`, 0 elsewhere
///
/// Returns `None` when `logits` does not hold exactly `width * height` values.
pub fn binarize_mask(logits: &[f32], width: u32, height: u32, threshold: f32) -> Option<GrayImage> {
    let pixels = logits
        .iter()
        .map(|&v| if v > threshold { 255 } else { 0 })
        .collect();
    GrayImage::from_raw(width, height, pixels)
}
