use image::GrayImage;

use crate::blur::gaussian_blur;

/// Sobel gradients with a quantized direction map.
///
/// Directions: 0 = horizontal edge response, 1 = 45 degrees, 2 = vertical,
/// 3 = 135 degrees.
fn gradients_and_directions(src: &GrayImage) -> (Vec<f32>, Vec<u8>) {
    let width = src.width() as usize;
    let height = src.height() as usize;
    let raw = src.as_raw();
    let mut mag = vec![0.0f32; width * height];
    let mut dir = vec![0u8; width * height];

    const TAN_22_5: f32 = 0.414_213_56;

    for y in 1..height - 1 {
        let r0 = (y - 1) * width;
        let r1 = y * width;
        let r2 = (y + 1) * width;
        for x in 1..width - 1 {
            let p00 = raw[r0 + x - 1] as f32;
            let p01 = raw[r0 + x] as f32;
            let p02 = raw[r0 + x + 1] as f32;
            let p10 = raw[r1 + x - 1] as f32;
            let p12 = raw[r1 + x + 1] as f32;
            let p20 = raw[r2 + x - 1] as f32;
            let p21 = raw[r2 + x] as f32;
            let p22 = raw[r2 + x + 1] as f32;

            let gx = -p00 + p02 - 2.0 * p10 + 2.0 * p12 - p20 + p22;
            let gy = -p00 - 2.0 * p01 - p02 + p20 + 2.0 * p21 + p22;

            mag[r1 + x] = (gx * gx + gy * gy).sqrt();

            let abs_gx = gx.abs();
            let abs_gy = gy.abs();
            dir[r1 + x] = if abs_gy <= abs_gx * TAN_22_5 {
                0
            } else if abs_gx <= abs_gy * TAN_22_5 {
                2
            } else if gx * gy > 0.0 {
                1
            } else {
                3
            };
        }
    }
    (mag, dir)
}

fn non_max_suppression(width: usize, height: usize, mag: &[f32], dir: &[u8]) -> Vec<f32> {
    let mut out = vec![0.0f32; width * height];
    for y in 1..height - 1 {
        let r0 = (y - 1) * width;
        let r1 = y * width;
        let r2 = (y + 1) * width;
        for x in 1..width - 1 {
            let m = mag[r1 + x];
            let (m1, m2) = match dir[r1 + x] {
                0 => (mag[r1 + x - 1], mag[r1 + x + 1]),
                1 => (mag[r0 + x + 1], mag[r2 + x - 1]),
                2 => (mag[r0 + x], mag[r2 + x]),
                _ => (mag[r0 + x - 1], mag[r2 + x + 1]),
            };
            if m >= m1 && m >= m2 {
                out[r1 + x] = m;
            }
        }
    }
    out
}

fn hysteresis(width: usize, height: usize, nms: &[f32], low: f32, high: f32) -> GrayImage {
    const STRONG: u8 = 255;
    const WEAK: u8 = 75;

    let mut state = vec![0u8; width * height];
    let mut stack = Vec::new();

    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let idx = y * width + x;
            let v = nms[idx];
            if v >= high {
                state[idx] = STRONG;
                stack.push((x, y));
            } else if v >= low {
                state[idx] = WEAK;
            }
        }
    }

    while let Some((x, y)) = stack.pop() {
        let y0 = y.saturating_sub(1);
        let y1 = (y + 1).min(height - 1);
        let x0 = x.saturating_sub(1);
        let x1 = (x + 1).min(width - 1);
        for ny in y0..=y1 {
            for nx in x0..=x1 {
                let nidx = ny * width + nx;
                if state[nidx] == WEAK {
                    state[nidx] = STRONG;
                    stack.push((nx, ny));
                }
            }
        }
    }

    let data: Vec<u8> = state
        .iter()
        .map(|&s| if s == STRONG { 255 } else { 0 })
        .collect();
    GrayImage::from_raw(width as u32, height as u32, data)
        .unwrap_or_else(|| GrayImage::new(width as u32, height as u32))
}

/// Canny edge detection: Gaussian smoothing, Sobel gradients, direction
/// non-max suppression, double-threshold hysteresis.
pub fn canny(src: &GrayImage, low_threshold: u8, high_threshold: u8) -> GrayImage {
    if src.width() < 3 || src.height() < 3 {
        return GrayImage::new(src.width(), src.height());
    }

    let blurred = gaussian_blur(src, 5, 0.0);
    let width = blurred.width() as usize;
    let height = blurred.height() as usize;

    let (mag, dir) = gradients_and_directions(&blurred);
    let nms = non_max_suppression(width, height, &mag, &dir);
    let low = low_threshold as f32;
    let high = high_threshold.max(low_threshold) as f32;
    hysteresis(width, height, &nms, low, high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn vertical_step_edge_is_found() {
        let mut img = GrayImage::new(32, 32);
        for y in 0..32 {
            for x in 16..32 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let edges = canny(&img, 50, 150);
        let hits = edges.pixels().filter(|p| p[0] == 255).count();
        assert!(hits > 0, "step edge should produce edge pixels");
        // Edge pixels must concentrate near the step column.
        for (x, _, p) in edges.enumerate_pixels() {
            if p[0] == 255 {
                assert!((x as i32 - 16).abs() <= 3);
            }
        }
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let img = GrayImage::from_pixel(24, 24, Luma([128]));
        let edges = canny(&img, 50, 150);
        assert!(edges.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn higher_thresholds_never_add_edges() {
        let mut img = GrayImage::new(24, 24);
        for y in 0..24 {
            for x in 0..24 {
                if (x / 6 + y / 6) % 2 == 0 {
                    img.put_pixel(x, y, Luma([200]));
                }
            }
        }
        let lo = canny(&img, 10, 50);
        let hi = canny(&img, 100, 200);
        let lo_n = lo.pixels().filter(|p| p[0] == 255).count();
        let hi_n = hi.pixels().filter(|p| p[0] == 255).count();
        assert!(hi_n <= lo_n);
    }
}
