use image::{GrayImage, Rgb, RgbImage};

/// Background tint applied where a mask is inactive
pub const ACCENT: Rgb<u8> = Rgb([0x00, 0x47, 0xAB]);

/// Build the two visualisations of one mask candidate
///
/// Returns the greyscale mask (a copy of `mask`) and an RGB overlay that
/// keeps the source pixel wherever the mask is positive and paints
/// [`ACCENT`] everywhere else.
///
/// # Panics
/// If `mask` and `source` differ in size.
pub fn composite(source: &RgbImage, mask: &GrayImage) -> (GrayImage, RgbImage) {
    assert_eq!(
        mask.dimensions(),
        source.dimensions(),
        "mask and source image dimensions differ"
    );

    let (width, height) = source.dimensions();
    let mut overlay = RgbImage::new(width, height);

    for ((out, src), value) in overlay
        .pixels_mut()
        .zip(source.pixels())
        .zip(mask.pixels())
    {
        *out = if value[0] > 0 { *src } else { ACCENT };
    }

    (mask.clone(), overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8 * 40, y as u8 * 30, 200]))
    }

    #[test]
    fn test_full_mask_passes_source_through() {
        let source = RgbImage::new(4, 4);
        let mask = GrayImage::from_pixel(4, 4, Luma([1]));

        let (mask_image, overlay) = composite(&source, &mask);
        assert_eq!(overlay, source);
        assert_eq!(mask_image, mask);
    }

    #[test]
    fn test_empty_mask_paints_accent() {
        let source = gradient(4, 4);
        let mask = GrayImage::new(4, 4);

        let (_, overlay) = composite(&source, &mask);
        assert!(overlay.pixels().all(|p| *p == Rgb([0x00, 0x47, 0xAB])));
    }

    #[test]
    fn test_mixed_mask_per_pixel() {
        let source = gradient(5, 3);
        let mask = GrayImage::from_fn(5, 3, |x, y| Luma([((x + y) % 3 * 100) as u8]));

        let (mask_image, overlay) = composite(&source, &mask);
        assert_eq!(mask_image.as_raw(), mask.as_raw());
        for (x, y, pixel) in overlay.enumerate_pixels() {
            if mask.get_pixel(x, y)[0] > 0 {
                assert_eq!(pixel, source.get_pixel(x, y));
            } else {
                assert_eq!(*pixel, ACCENT);
            }
        }
    }

    #[test]
    #[should_panic(expected = "dimensions differ")]
    fn test_dimension_mismatch_panics() {
        composite(&RgbImage::new(4, 4), &GrayImage::new(4, 3));
    }
}
