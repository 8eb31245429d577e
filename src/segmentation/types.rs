use crate::error::Result;
use image::{GrayImage, RgbImage};

/// A single positive point prompt in source image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPrompt {
    pub x: f32,
    pub y: f32,
}

impl PointPrompt {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Geometric centre of a `width` x `height` image (floating-point halves)
    pub fn center_of(width: u32, height: u32) -> Self {
        Self {
            x: width as f32 / 2.0,
            y: height as f32 / 2.0,
        }
    }

    /// Whether the point lies in `[0, width) x [0, height)`
    pub fn is_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.x < width as f32 && self.y < height as f32
    }
}

/// One proposed segmentation of the source image
///
/// `mask` is single channel; a pixel value greater than zero marks the pixel
/// as part of the object.
#[derive(Debug, Clone)]
pub struct MaskCandidate {
    pub mask: GrayImage,
    /// Model's predicted IoU for this mask
    pub iou: f32,
    pub stability_score: f32,
}

/// Trait for promptable segmentation models
///
/// The image embedding is computed once and cached inside the model, then
/// reused by any number of mask requests for the same image.
pub trait SegmentationModel {
    /// Encode `image` and cache the embedding
    ///
    /// `n_threads <= 0` selects the default worker count.
    fn compute_embedding(&mut self, image: &RgbImage, n_threads: i32) -> Result<()>;

    /// Decode candidate masks for `point` against the cached embedding
    ///
    /// Returns candidates ordered by the model's own ranking. An empty list
    /// means no candidate passed the model's quality filters.
    fn compute_masks(
        &mut self,
        image: &RgbImage,
        n_threads: i32,
        point: PointPrompt,
    ) -> Result<Vec<MaskCandidate>>;

    /// Drop the cached embedding
    fn clear_embedding(&mut self) {
        // Default implementation: no-op for models without a cache
    }

    /// Get the model's input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for Box<M> {
    fn compute_embedding(&mut self, image: &RgbImage, n_threads: i32) -> Result<()> {
        (**self).compute_embedding(image, n_threads)
    }

    fn compute_masks(
        &mut self,
        image: &RgbImage,
        n_threads: i32,
        point: PointPrompt,
    ) -> Result<Vec<MaskCandidate>> {
        (**self).compute_masks(image, n_threads, point)
    }

    fn clear_embedding(&mut self) {
        (**self).clear_embedding()
    }

    fn input_size(&self) -> (u32, u32) {
        (**self).input_size()
    }
}
