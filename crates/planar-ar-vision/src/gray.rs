use image::{imageops, GrayImage, RgbImage};

/// Standard luma conversion of an RGB frame.
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    let mut out = GrayImage::new(frame.width(), frame.height());
    for (dst, src) in out.pixels_mut().zip(frame.pixels()) {
        let [r, g, b] = src.0;
        let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        dst.0 = [y.round().clamp(0.0, 255.0) as u8];
    }
    out
}

/// Bilinear downscale by a factor in (0, 1].
///
/// Used by the calibration capture path to run detection on a half-size
/// frame for throughput; detected coordinates are rescaled by the caller.
pub fn downscale(src: &GrayImage, factor: f64) -> GrayImage {
    let w = ((src.width() as f64 * factor).round() as u32).max(1);
    let h = ((src.height() as f64 * factor).round() as u32).max(1);
    imageops::resize(src, w, h, imageops::FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn luma_of_pure_channels() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        img.put_pixel(2, 0, Rgb([0, 0, 255]));
        let g = to_gray(&img);
        assert_eq!(g.get_pixel(0, 0)[0], 76);
        assert_eq!(g.get_pixel(1, 0)[0], 150);
        assert_eq!(g.get_pixel(2, 0)[0], 29);
    }

    #[test]
    fn half_downscale_halves_dimensions() {
        let img = GrayImage::new(64, 48);
        let small = downscale(&img, 0.5);
        assert_eq!(small.dimensions(), (32, 24));
    }
}
