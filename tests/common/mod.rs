use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use samcli::segmentation::{MaskCandidate, PointPrompt, SegmentationModel};
use samcli::{Error, Result};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Writes a gradient RGB PNG and returns its path
pub fn write_rgb_png(dir: &Path, width: u32, height: u32) -> PathBuf {
    let path = dir.join("input.png");
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 90])
    })
    .save(&path)
    .expect("Failed to save test image");
    path
}

/// Writes an RGBA PNG and returns its path
pub fn write_rgba_png(dir: &Path, width: u32, height: u32) -> PathBuf {
    let path = dir.join("input_rgba.png");
    RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 128]))
        .save(&path)
        .expect("Failed to save test image");
    path
}

/// In-memory model that records every call and returns scripted masks
pub struct ScriptedModel {
    log: Rc<RefCell<Vec<String>>>,
    candidates: usize,
    fail_embedding: bool,
    embedded: Option<(u32, u32)>,
}

impl ScriptedModel {
    pub fn with_candidates(candidates: usize) -> Self {
        Self {
            log: Rc::default(),
            candidates,
            fail_embedding: false,
            embedded: None,
        }
    }

    pub fn failing_embedding() -> Self {
        Self {
            log: Rc::default(),
            candidates: 1,
            fail_embedding: true,
            embedded: None,
        }
    }

    pub fn log(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.log)
    }

    /// Mask of candidate `index`: every `(index + 2)`th column is included
    pub fn mask_for(index: usize, width: u32, height: u32) -> GrayImage {
        let stride = index as u32 + 2;
        GrayImage::from_fn(width, height, |x, _| {
            Luma([if x % stride == 0 { 255 } else { 0 }])
        })
    }
}

impl SegmentationModel for ScriptedModel {
    fn compute_embedding(&mut self, image: &RgbImage, n_threads: i32) -> Result<()> {
        let (width, height) = image.dimensions();
        self.log
            .borrow_mut()
            .push(format!("embed:{}x{}:{}", width, height, n_threads));

        if self.fail_embedding {
            return Err(Error::Embedding("scripted failure".to_string()));
        }
        self.embedded = Some((width, height));
        Ok(())
    }

    fn compute_masks(
        &mut self,
        image: &RgbImage,
        _n_threads: i32,
        point: PointPrompt,
    ) -> Result<Vec<MaskCandidate>> {
        let (width, height) = image.dimensions();
        self.log
            .borrow_mut()
            .push(format!("masks:{}x{}:{},{}", width, height, point.x, point.y));

        if self.embedded != Some((width, height)) {
            return Err(Error::MissingEmbedding { width, height });
        }

        Ok((0..self.candidates)
            .map(|index| MaskCandidate {
                mask: Self::mask_for(index, width, height),
                iou: 1.0 - index as f32 * 0.01,
                stability_score: 1.0,
            })
            .collect())
    }

    fn clear_embedding(&mut self) {
        self.embedded = None;
    }

    fn input_size(&self) -> (u32, u32) {
        (1024, 1024)
    }
}

impl Drop for ScriptedModel {
    fn drop(&mut self) {
        self.log.borrow_mut().push("release".to_string());
    }
}
