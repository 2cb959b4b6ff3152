use image::GrayImage;

fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f64> {
    // OpenCV's convention for sigma <= 0: derive it from the window size.
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let half = (ksize / 2) as i64;
    let mut k: Vec<f64> = (-half..=half)
        .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = k.iter().sum();
    for v in &mut k {
        *v /= sum;
    }
    k
}

fn sample_replicate(src: &GrayImage, x: i64, y: i64) -> f64 {
    let xi = x.clamp(0, src.width() as i64 - 1) as u32;
    let yi = y.clamp(0, src.height() as i64 - 1) as u32;
    src.get_pixel(xi, yi)[0] as f64
}

/// Separable Gaussian blur with a square `ksize` window.
///
/// `sigma <= 0` selects the window-derived default, matching the common
/// `GaussianBlur(src, dst, Size(5, 5), 0)` call.
pub fn gaussian_blur(src: &GrayImage, ksize: usize, sigma: f64) -> GrayImage {
    debug_assert!(ksize % 2 == 1, "kernel size must be odd");
    let k = gaussian_kernel(ksize, sigma);
    let half = (ksize / 2) as i64;
    let (w, h) = src.dimensions();

    // Horizontal pass into an f64 scratch buffer.
    let mut tmp = vec![0.0f64; (w * h) as usize];
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut acc = 0.0;
            for (i, &kv) in k.iter().enumerate() {
                acc += kv * sample_replicate(src, x + i as i64 - half, y);
            }
            tmp[(y as u32 * w + x as u32) as usize] = acc;
        }
    }

    // Vertical pass.
    let mut out = GrayImage::new(w, h);
    for y in 0..h as i64 {
        for x in 0..w {
            let mut acc = 0.0;
            for (i, &kv) in k.iter().enumerate() {
                let yy = (y + i as i64 - half).clamp(0, h as i64 - 1) as u32;
                acc += kv * tmp[(yy * w + x) as usize];
            }
            out.put_pixel(x, y as u32, image::Luma([acc.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}
