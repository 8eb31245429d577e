mod compose;
mod files;

pub use compose::{composite, ACCENT};
pub use files::{FileSink, OutputFormat, JPEG_QUALITY};

use crate::error::Result;
use image::{GrayImage, RgbImage};

/// Trait for destinations of composited mask candidates
pub trait MaskSink {
    /// Persist the greyscale mask and RGB overlay of candidate `index`
    fn write_candidate(&mut self, index: usize, mask: &GrayImage, overlay: &RgbImage)
        -> Result<()>;
}
