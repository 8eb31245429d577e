use crate::error::{Error, Result};
use image::{ImageError, ImageReader, RgbImage};
use std::path::Path;

/// Decode an image file into a packed 8-bit RGB buffer
///
/// The format is sniffed from the file contents. Images that do not carry
/// exactly three colour channels (greyscale, grey+alpha, RGBA) are rejected
/// instead of being converted.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let path = path.as_ref();
    let _span = tracing::debug_span!("load_image").entered();

    let decoded = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(ImageError::IoError)
        .and_then(|reader| reader.decode())
        .map_err(|source| Error::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let channels = decoded.color().channel_count();
    if channels != 3 {
        return Err(Error::UnsupportedChannels {
            path: path.to_path_buf(),
            channels,
        });
    }

    let image = decoded.into_rgb8();
    tracing::debug!(
        "Decoded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );

    Ok(image)
}
