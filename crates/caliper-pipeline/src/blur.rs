//! Gaussian smoothing ahead of detection.
//!
//! The photo is smoothed once in colour right after decoding; the
//! detector smooths its grayscale copy again with its own sigma before
//! running Canny.

use image::{GrayImage, RgbImage};

/// Smooth a grayscale image. A non-positive `sigma` is a no-op, since
/// `imageproc` panics on it.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(image, sigma)
    } else {
        image.clone()
    }
}

/// Smooth all three channels of a colour photo.
///
/// A non-positive `sigma` is a no-op.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur_rgb(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma > 0.0 {
        image::imageops::blur(image, sigma)
    } else {
        image.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dark square in the middle of a light 12x12 field.
    fn square() -> GrayImage {
        GrayImage::from_fn(12, 12, |x, y| {
            let inside = (4..8).contains(&x) && (4..8).contains(&y);
            image::Luma([if inside { 20 } else { 220 }])
        })
    }

    #[test]
    fn non_positive_sigma_is_identity() {
        let img = square();
        assert_eq!(gaussian_blur(&img, 0.0), img);
        let rgb = RgbImage::from_pixel(3, 3, image::Rgb([9, 8, 7]));
        assert_eq!(gaussian_blur_rgb(&rgb, -0.5), rgb);
    }

    #[test]
    fn square_corners_soften() {
        let blurred = gaussian_blur(&square(), 1.4);
        let corner = blurred.get_pixel(4, 4).0[0];
        let centre = blurred.get_pixel(6, 6).0[0];
        assert!(corner > 20, "corner stayed at {corner}");
        assert!(centre < corner, "centre {centre} vs corner {corner}");
    }

    #[test]
    fn colour_blur_keeps_flat_regions() {
        let img = RgbImage::from_pixel(16, 16, image::Rgb([30, 120, 250]));
        let blurred = gaussian_blur_rgb(&img, 1.1);
        assert_eq!(blurred.dimensions(), (16, 16));
        let px = blurred.get_pixel(8, 8).0;
        for (got, want) in px.iter().zip([30u8, 120, 250]) {
            assert!(got.abs_diff(want) <= 1, "got {px:?}");
        }
    }
}
