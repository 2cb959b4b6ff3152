use image::GrayImage;
use log::debug;
use nalgebra::{Matrix2, Point2, Vector2};

use crate::blur::gaussian_blur;

const HARRIS_K: f64 = 0.04;
const RESPONSE_FLOOR: f64 = 0.01;
const NMS_RADIUS: i64 = 5;
const KMEANS_ROUNDS: usize = 25;

/// Harris corner response map of a pre-smoothed frame.
fn harris_response(src: &GrayImage) -> Vec<f64> {
    let w = src.width() as usize;
    let h = src.height() as usize;
    let raw = src.as_raw();

    let mut ixx = vec![0.0f64; w * h];
    let mut iyy = vec![0.0f64; w * h];
    let mut ixy = vec![0.0f64; w * h];

    for y in 1..h - 1 {
        let r0 = (y - 1) * w;
        let r1 = y * w;
        let r2 = (y + 1) * w;
        for x in 1..w - 1 {
            let p00 = raw[r0 + x - 1] as f64;
            let p01 = raw[r0 + x] as f64;
            let p02 = raw[r0 + x + 1] as f64;
            let p10 = raw[r1 + x - 1] as f64;
            let p12 = raw[r1 + x + 1] as f64;
            let p20 = raw[r2 + x - 1] as f64;
            let p21 = raw[r2 + x] as f64;
            let p22 = raw[r2 + x + 1] as f64;

            let gx = -p00 + p02 - 2.0 * p10 + 2.0 * p12 - p20 + p22;
            let gy = -p00 - 2.0 * p01 - p02 + p20 + 2.0 * p21 + p22;
            ixx[r1 + x] = gx * gx;
            iyy[r1 + x] = gy * gy;
            ixy[r1 + x] = gx * gy;
        }
    }

    // Box-average the structure tensor over a 5x5 neighborhood.
    let mut response = vec![0.0f64; w * h];
    for y in 2..h - 2 {
        for x in 2..w - 2 {
            let mut sxx = 0.0;
            let mut syy = 0.0;
            let mut sxy = 0.0;
            for dy in -2i64..=2 {
                let row = (y as i64 + dy) as usize * w;
                for dx in -2i64..=2 {
                    let idx = row + (x as i64 + dx) as usize;
                    sxx += ixx[idx];
                    syy += iyy[idx];
                    sxy += ixy[idx];
                }
            }
            let det = sxx * syy - sxy * sxy;
            let trace = sxx + syy;
            response[y * w + x] = det - HARRIS_K * trace * trace;
        }
    }
    response
}

/// Keep local maxima above a fraction of the global peak.
fn non_max_peaks(response: &[f64], w: usize, h: usize) -> Vec<(Point2<f64>, f64)> {
    let peak = response.iter().cloned().fold(0.0f64, f64::max);
    if peak <= 0.0 {
        return Vec::new();
    }
    let floor = peak * RESPONSE_FLOOR;

    let mut out = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let v = response[y * w + x];
            if v < floor {
                continue;
            }
            let mut is_max = true;
            'scan: for dy in -NMS_RADIUS..=NMS_RADIUS {
                let ny = y as i64 + dy;
                if ny < 0 || ny >= h as i64 {
                    continue;
                }
                for dx in -NMS_RADIUS..=NMS_RADIUS {
                    let nx = x as i64 + dx;
                    if nx < 0 || nx >= w as i64 {
                        continue;
                    }
                    let nv = response[ny as usize * w + nx as usize];
                    if nv > v || (nv == v && (ny, nx) < (y as i64, x as i64)) {
                        is_max = false;
                        break 'scan;
                    }
                }
            }
            if is_max {
                out.push((Point2::new(x as f64, y as f64), v));
            }
        }
    }
    out
}

/// Principal axes of the candidate cloud, longest axis first.
fn principal_axes(points: &[Point2<f64>]) -> (Point2<f64>, Vector2<f64>, Vector2<f64>) {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;

    let mut cov = Matrix2::<f64>::zeros();
    for p in points {
        let dx = p.x - cx;
        let dy = p.y - cy;
        cov[(0, 0)] += dx * dx;
        cov[(0, 1)] += dx * dy;
        cov[(1, 0)] += dx * dy;
        cov[(1, 1)] += dy * dy;
    }
    cov /= n;

    let eig = cov.symmetric_eigen();
    let (major, minor) = if eig.eigenvalues[0] >= eig.eigenvalues[1] {
        (eig.eigenvectors.column(0), eig.eigenvectors.column(1))
    } else {
        (eig.eigenvectors.column(1), eig.eigenvectors.column(0))
    };

    let u = Vector2::new(major[0], major[1]);
    let v = Vector2::new(minor[0], minor[1]);
    (Point2::new(cx, cy), u, v)
}

/// 1D k-means with evenly spaced initial centers. Returns per-sample labels
/// sorted so that label order follows center order.
fn kmeans_1d(values: &[f64], k: usize) -> Option<Vec<usize>> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(max - min).is_finite() || max - min < 1e-9 {
        return None;
    }

    let mut centers: Vec<f64> = (0..k)
        .map(|i| min + (max - min) * (i as f64 + 0.5) / k as f64)
        .collect();
    let mut labels = vec![0usize; values.len()];

    for _ in 0..KMEANS_ROUNDS {
        for (label, &v) in labels.iter_mut().zip(values) {
            let mut best = 0;
            let mut best_d = f64::INFINITY;
            for (i, &c) in centers.iter().enumerate() {
                let d = (v - c).abs();
                if d < best_d {
                    best_d = d;
                    best = i;
                }
            }
            *label = best;
        }
        let mut sums = vec![0.0f64; k];
        let mut counts = vec![0usize; k];
        for (&label, &v) in labels.iter().zip(values) {
            sums[label] += v;
            counts[label] += 1;
        }
        if counts.iter().any(|&c| c == 0) {
            return None;
        }
        for i in 0..k {
            centers[i] = sums[i] / counts[i] as f64;
        }
    }

    // Relabel so cluster index increases with center value.
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| centers[a].total_cmp(&centers[b]));
    let mut rank = vec![0usize; k];
    for (r, &i) in order.iter().enumerate() {
        rank[i] = r;
    }
    for label in &mut labels {
        *label = rank[*label];
    }
    Some(labels)
}

/// Find the inner corners of a `cols x rows` chessboard, ordered row-major
/// from the top-left, or `None` when the full grid cannot be recovered.
///
/// Candidates come from a Harris response with non-max suppression; grid
/// structure is imposed by projecting the candidates onto the cloud's
/// principal axes and clustering each projection into `cols` and `rows`
/// bands. Every band intersection must hold exactly one candidate.
pub fn find_chessboard_corners(
    src: &GrayImage,
    cols: usize,
    rows: usize,
) -> Option<Vec<Point2<f64>>> {
    if src.width() < 8 || src.height() < 8 || cols < 2 || rows < 2 {
        return None;
    }
    let expected = cols * rows;

    let smoothed = gaussian_blur(src, 5, 1.0);
    let response = harris_response(&smoothed);
    let mut peaks = non_max_peaks(
        &response,
        smoothed.width() as usize,
        smoothed.height() as usize,
    );
    if peaks.len() < expected {
        debug!(
            "chessboard: {} corner candidates, expected {}",
            peaks.len(),
            expected
        );
        return None;
    }
    // Saddle junctions respond much more strongly than lone square corners
    // on the board boundary; keep the strongest grid's worth.
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1));
    peaks.truncate(expected);
    let candidates: Vec<Point2<f64>> = peaks.into_iter().map(|(p, _)| p).collect();

    let (center, mut u, mut v) = principal_axes(&candidates);
    // The longer grid dimension dominates the spread; align u with columns.
    if rows > cols {
        std::mem::swap(&mut u, &mut v);
    }
    if u.x < 0.0 {
        u = -u;
    }
    if v.y < 0.0 {
        v = -v;
    }

    let us: Vec<f64> = candidates.iter().map(|p| (p - center).dot(&u)).collect();
    let vs: Vec<f64> = candidates.iter().map(|p| (p - center).dot(&v)).collect();
    let col_labels = kmeans_1d(&us, cols)?;
    let row_labels = kmeans_1d(&vs, rows)?;

    let mut grid: Vec<Option<Point2<f64>>> = vec![None; expected];
    for (i, p) in candidates.iter().enumerate() {
        let slot = row_labels[i] * cols + col_labels[i];
        if grid[slot].is_some() {
            debug!("chessboard: two candidates fell into grid cell {slot}");
            return None;
        }
        grid[slot] = Some(*p);
    }
    grid.into_iter().collect()
}
