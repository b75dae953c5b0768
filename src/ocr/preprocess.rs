use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};

/// Mean luma below which an image counts as dark mode.
const DARK_MEAN: f32 = 110.0;

/// Prepares a cropped card for Tesseract.
///
/// Converts to grayscale, inverts dark-mode cards so text ends up dark on a
/// light background, and optionally upscales small crops.
pub fn prepare_for_ocr(img: &RgbaImage, upscale: u32) -> GrayImage {
    let mut gray = imageops::grayscale(img);

    if mean_luma(&gray) < DARK_MEAN {
        imageops::invert(&mut gray);
    }

    if upscale > 1 {
        let (w, h) = gray.dimensions();
        gray = imageops::resize(&gray, w * upscale, h * upscale, FilterType::Triangle);
    }

    gray
}

/// Average pixel value, 0 for an empty image.
pub fn mean_luma(img: &GrayImage) -> f32 {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = img.pixels().map(|p| p[0] as u64).sum();
    sum as f32 / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_dark_card_is_inverted() {
        // Dark background with one bright "text" pixel
        let mut img = RgbaImage::from_pixel(4, 1, Rgba([20, 20, 20, 255]));
        img.put_pixel(1, 0, Rgba([250, 250, 250, 255]));

        let out = prepare_for_ocr(&img, 1);
        assert!(out.get_pixel(0, 0)[0] > 200, "background should turn light");
        assert!(out.get_pixel(1, 0)[0] < 50, "text should turn dark");
    }

    #[test]
    fn test_light_card_kept() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([240, 240, 240, 255]));
        let out = prepare_for_ocr(&img, 1);
        assert!(out.get_pixel(0, 0)[0] > 200);
    }

    #[test]
    fn test_upscale() {
        let img = RgbaImage::from_pixel(10, 5, Rgba([240, 240, 240, 255]));
        assert_eq!(prepare_for_ocr(&img, 2).dimensions(), (20, 10));
    }

    #[test]
    fn test_mean_luma_empty() {
        assert_eq!(mean_luma(&GrayImage::new(0, 0)), 0.0);
    }
}
