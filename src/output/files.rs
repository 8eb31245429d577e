use super::MaskSink;
use crate::error::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder, ImageError, RgbImage};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// JPEG quality used for every written image
pub const JPEG_QUALITY: u8 = 85;

/// Encoding of the written mask and overlay images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Jpg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// Writes `mask_<index>.<ext>` and `seg_<index>.<ext>` into a directory
pub struct FileSink {
    dir: PathBuf,
    format: OutputFormat,
    written: Vec<PathBuf>,
}

impl FileSink {
    /// Create a sink writing into `dir`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(dir: P, format: OutputFormat) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| Error::Write {
            path: dir.to_path_buf(),
            source: ImageError::IoError(e),
        })?;

        tracing::debug!("Writing outputs to {} as {}", dir.display(), format.extension());

        Ok(Self {
            dir: dir.to_path_buf(),
            format,
            written: Vec::new(),
        })
    }

    pub fn mask_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("mask_{}.{}", index, self.format.extension()))
    }

    pub fn seg_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("seg_{}.{}", index, self.format.extension()))
    }

    /// Every file written so far, in write order
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn encode(
        &mut self,
        path: PathBuf,
        data: &[u8],
        width: u32,
        height: u32,
        color: ExtendedColorType,
    ) -> Result<()> {
        let write_error = |source| Error::Write {
            path: path.clone(),
            source,
        };

        let file = File::create(&path).map_err(|e| write_error(ImageError::IoError(e)))?;
        let mut writer = BufWriter::new(file);

        let encoded = match self.format {
            OutputFormat::Jpg => JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
                .write_image(data, width, height, color),
            OutputFormat::Png => PngEncoder::new(&mut writer).write_image(data, width, height, color),
        };
        encoded.map_err(write_error)?;

        writer
            .flush()
            .map_err(|e| write_error(ImageError::IoError(e)))?;

        tracing::debug!("Wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

impl MaskSink for FileSink {
    fn write_candidate(
        &mut self,
        index: usize,
        mask: &GrayImage,
        overlay: &RgbImage,
    ) -> Result<()> {
        let (width, height) = mask.dimensions();
        self.encode(
            self.mask_path(index),
            mask.as_raw(),
            width,
            height,
            ExtendedColorType::L8,
        )?;

        let (width, height) = overlay.dimensions();
        self.encode(
            self.seg_path(index),
            overlay.as_raw(),
            width,
            height,
            ExtendedColorType::Rgb8,
        )
    }
}
