use image::GrayImage;
use nalgebra::{Matrix2, Point2, Vector2};

/// Sparse pyramidal Lucas-Kanade tracker.
///
/// Tracks a set of points from one grayscale frame to the next and reports
/// a per-point status flag. A point is dropped (status `false`) when it
/// leaves the frame, its local structure is too flat to solve, or the final
/// photometric residual exceeds `max_error`.
pub struct LucasKanade {
    /// Side of the square correlation window, in pixels. Must be odd.
    pub window_size: usize,
    /// Iteration cap of the per-level refinement.
    pub max_iterations: usize,
    /// Convergence threshold on the per-iteration displacement update.
    pub epsilon: f64,
    /// Number of pyramid levels including the base image.
    pub pyramid_levels: usize,
    /// Mean absolute intensity residual above which a track is rejected.
    pub max_error: f64,
}

impl Default for LucasKanade {
    fn default() -> Self {
        Self {
            window_size: 21,
            max_iterations: 30,
            epsilon: 0.01,
            pyramid_levels: 3,
            max_error: 20.0,
        }
    }
}

fn sample(img: &[f64], w: usize, h: usize, x: f64, y: f64) -> f64 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;
    let at = |xi: i64, yi: i64| -> f64 {
        let xi = xi.clamp(0, w as i64 - 1) as usize;
        let yi = yi.clamp(0, h as i64 - 1) as usize;
        img[yi * w + xi]
    };
    let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1, y0) * fx;
    let bot = at(x0, y0 + 1) * (1.0 - fx) + at(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bot * fy
}

struct Level {
    data: Vec<f64>,
    width: usize,
    height: usize,
}

impl Level {
    fn from_image(img: &GrayImage) -> Self {
        Self {
            data: img.as_raw().iter().map(|&p| p as f64).collect(),
            width: img.width() as usize,
            height: img.height() as usize,
        }
    }

    /// 2x2 box downsampling, halving each dimension.
    fn halved(&self) -> Self {
        let w = (self.width / 2).max(1);
        let h = (self.height / 2).max(1);
        let mut data = vec![0.0f64; w * h];
        for y in 0..h {
            for x in 0..w {
                let x0 = (x * 2).min(self.width - 1);
                let x1 = (x * 2 + 1).min(self.width - 1);
                let y0 = (y * 2).min(self.height - 1);
                let y1 = (y * 2 + 1).min(self.height - 1);
                data[y * w + x] = 0.25
                    * (self.data[y0 * self.width + x0]
                        + self.data[y0 * self.width + x1]
                        + self.data[y1 * self.width + x0]
                        + self.data[y1 * self.width + x1]);
            }
        }
        Self { data, width: w, height: h }
    }
}

fn build_pyramid(img: &GrayImage, levels: usize) -> Vec<Level> {
    let mut pyr = vec![Level::from_image(img)];
    for _ in 1..levels {
        let top = pyr[pyr.len() - 1].halved();
        if top.width < 8 || top.height < 8 {
            break;
        }
        pyr.push(top);
    }
    pyr
}

impl LucasKanade {
    /// Track `points` from `prev` into `next`. Output order matches input;
    /// each entry carries the tracked position and its validity.
    pub fn track_points(
        &self,
        prev: &GrayImage,
        next: &GrayImage,
        points: &[Point2<f64>],
    ) -> Vec<(Point2<f64>, bool)> {
        let prev_pyr = build_pyramid(prev, self.pyramid_levels);
        let next_pyr = build_pyramid(next, self.pyramid_levels);
        points
            .iter()
            .map(|&p| self.track_one(&prev_pyr, &next_pyr, p))
            .collect()
    }

    fn track_one(
        &self,
        prev_pyr: &[Level],
        next_pyr: &[Level],
        point: Point2<f64>,
    ) -> (Point2<f64>, bool) {
        let top = prev_pyr.len() - 1;
        let scale_top = (1u32 << top) as f64;
        let mut flow = Vector2::zeros();
        let mut base = Point2::new(point.x / scale_top, point.y / scale_top);
        let r = (self.window_size / 2) as i64;

        for level in (0..prev_pyr.len()).rev() {
            let pl = &prev_pyr[level];
            let nl = &next_pyr[level];

            // Spatial gradient matrix around the point in the previous frame.
            let mut g = Matrix2::<f64>::zeros();
            let mut grads = Vec::with_capacity(self.window_size * self.window_size);
            for dy in -r..=r {
                for dx in -r..=r {
                    let px = base.x + dx as f64;
                    let py = base.y + dy as f64;
                    let gx = (sample(&pl.data, pl.width, pl.height, px + 1.0, py)
                        - sample(&pl.data, pl.width, pl.height, px - 1.0, py))
                        * 0.5;
                    let gy = (sample(&pl.data, pl.width, pl.height, px, py + 1.0)
                        - sample(&pl.data, pl.width, pl.height, px, py - 1.0))
                        * 0.5;
                    g[(0, 0)] += gx * gx;
                    g[(0, 1)] += gx * gy;
                    g[(1, 0)] += gx * gy;
                    g[(1, 1)] += gy * gy;
                    grads.push((gx, gy));
                }
            }
            let det = g[(0, 0)] * g[(1, 1)] - g[(0, 1)] * g[(1, 0)];
            if det.abs() < 1e-6 {
                return (point, false);
            }
            let g_inv = Matrix2::new(g[(1, 1)], -g[(0, 1)], -g[(1, 0)], g[(0, 0)]) / det;

            for _ in 0..self.max_iterations {
                let mut b = Vector2::zeros();
                let mut k = 0;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let px = base.x + dx as f64;
                        let py = base.y + dy as f64;
                        let diff = sample(&pl.data, pl.width, pl.height, px, py)
                            - sample(
                                &nl.data,
                                nl.width,
                                nl.height,
                                px + flow.x,
                                py + flow.y,
                            );
                        let (gx, gy) = grads[k];
                        k += 1;
                        b.x += diff * gx;
                        b.y += diff * gy;
                    }
                }
                let delta = g_inv * b;
                flow += delta;
                if delta.norm() < self.epsilon {
                    break;
                }
            }

            if level > 0 {
                base = Point2::new(base.x * 2.0, base.y * 2.0);
                flow *= 2.0;
            }
        }

        let tracked = Point2::new(base.x + flow.x, base.y + flow.y);
        let base_level = &next_pyr[0];
        if tracked.x < 0.0
            || tracked.y < 0.0
            || tracked.x >= base_level.width as f64
            || tracked.y >= base_level.height as f64
        {
            return (tracked, false);
        }

        // Photometric check at full resolution.
        let pl = &prev_pyr[0];
        let mut residual = 0.0;
        let mut count = 0.0;
        for dy in -r..=r {
            for dx in -r..=r {
                let a = sample(
                    &pl.data,
                    pl.width,
                    pl.height,
                    point.x + dx as f64,
                    point.y + dy as f64,
                );
                let b = sample(
                    &base_level.data,
                    base_level.width,
                    base_level.height,
                    tracked.x + dx as f64,
                    tracked.y + dy as f64,
                );
                residual += (a - b).abs();
                count += 1.0;
            }
        }
        (tracked, residual / count <= self.max_error)
    }
}
