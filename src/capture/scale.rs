use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{Error, Result};

/// Decode any still image the `image` crate understands into RGB.
pub fn decode_file(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)?.into_rgb8())
}

/// Copy a packed RGB buffer with row padding (`stride` bytes per row) into an image.
pub fn from_rgb_rows(data: &[u8], width: u32, height: u32, stride: usize) -> Result<RgbImage> {
    let row = width as usize * 3;
    if stride < row || data.len() < stride * height.saturating_sub(1) as usize + row {
        return Err(Error::Source(format!(
            "short RGB buffer: {} bytes for {}x{} with stride {}",
            data.len(),
            width,
            height,
            stride
        )));
    }

    let mut packed = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        packed.extend_from_slice(&data[y * stride..y * stride + row]);
    }
    RgbImage::from_raw(width, height, packed)
        .ok_or_else(|| Error::Source("RGB buffer does not match frame size".into()))
}

/// Rescale to a fixed width keeping the aspect ratio, so every frame of a
/// session lands on the same working size.
pub fn scale_to_width(image: RgbImage, width: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == width || w == 0 {
        return image;
    }
    let scale = width as f64 / w as f64;
    let height = ((h as f64 * scale) as u32).max(1);
    // Triangle widens its support when shrinking, which averages like an area filter
    imageops::resize(&image, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn keeps_aspect_ratio() {
        let img = RgbImage::new(1200, 675);
        assert_eq!(scale_to_width(img, 600).dimensions(), (600, 337));

        let img = RgbImage::new(300, 200);
        assert_eq!(scale_to_width(img, 600).dimensions(), (600, 400));
    }

    #[test]
    fn same_width_is_untouched() {
        let img = RgbImage::from_pixel(600, 10, Rgb([1, 2, 3]));
        assert_eq!(scale_to_width(img.clone(), 600), img);
    }

    #[test]
    fn strips_row_padding() {
        // 2x2 RGB with 8-byte stride (2 bytes padding per row)
        let data = [1, 1, 1, 2, 2, 2, 0, 0, 3, 3, 3, 4, 4, 4, 0, 0];
        let img = from_rgb_rows(&data, 2, 2, 8).unwrap();
        assert_eq!(*img.get_pixel(1, 0), Rgb([2, 2, 2]));
        assert_eq!(*img.get_pixel(0, 1), Rgb([3, 3, 3]));
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(from_rgb_rows(&[0; 10], 2, 2, 6).is_err());
    }
}
