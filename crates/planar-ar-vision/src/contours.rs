use image::GrayImage;
use nalgebra::Point2;

/// An ordered boundary of a foreground region, in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<(i32, i32)>,
}

const DIRS_8: [(i32, i32); 8] = [
    (1, 0),   // E
    (1, 1),   // SE
    (0, 1),   // S
    (-1, 1),  // SW
    (-1, 0),  // W
    (-1, -1), // NW
    (0, -1),  // N
    (1, -1),  // NE
];

fn in_bounds(x: i32, y: i32, w: i32, h: i32) -> bool {
    x >= 0 && y >= 0 && x < w && y < h
}

fn is_foreground(data: &[u8], w: i32, h: i32, x: i32, y: i32) -> bool {
    in_bounds(x, y, w, h) && data[(y * w + x) as usize] > 0
}

fn is_boundary(data: &[u8], w: i32, h: i32, x: i32, y: i32) -> bool {
    if !is_foreground(data, w, h, x, y) {
        return false;
    }
    for (dx, dy) in DIRS_8 {
        let nx = x + dx;
        let ny = y + dy;
        if !in_bounds(nx, ny, w, h) || !is_foreground(data, w, h, nx, ny) {
            return true;
        }
    }
    false
}

fn trace_boundary(data: &[u8], w: i32, h: i32, sx: i32, sy: i32) -> Vec<(i32, i32)> {
    let mut contour = Vec::new();
    let mut current = (sx, sy);
    let mut prev_dir = 4usize; // start as if we came from W
    let start = current;
    let start_prev_dir = prev_dir;
    let max_steps = (w as usize * h as usize).saturating_mul(8).max(32);

    for _ in 0..max_steps {
        contour.push(current);

        let mut found = None;
        for step in 1..=8 {
            let k = (prev_dir + step) % 8;
            let nx = current.0 + DIRS_8[k].0;
            let ny = current.1 + DIRS_8[k].1;
            if is_foreground(data, w, h, nx, ny) {
                // Backtrack direction for the next step: the neighbor
                // before k in the clockwise search.
                prev_dir = (k + 6) % 8;
                found = Some((nx, ny));
                break;
            }
        }

        let Some(next) = found else { break };

        if next == start && prev_dir == start_prev_dir && contour.len() > 1 {
            break;
        }
        current = next;
    }

    if contour.len() > 1 && contour.first() == contour.last() {
        contour.pop();
    }
    contour
}

/// Trace the boundaries of all foreground regions of a binary image
/// (non-zero pixels are foreground).
pub fn find_contours(binary: &GrayImage) -> Vec<Contour> {
    let w = binary.width() as i32;
    let h = binary.height() as i32;
    let data = binary.as_raw();
    let mut visited = vec![false; (w * h).max(0) as usize];
    let mut contours = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if visited[idx] || !is_boundary(data, w, h, x, y) {
                continue;
            }
            let points = trace_boundary(data, w, h, x, y);
            if points.len() >= 3 {
                for &(px, py) in &points {
                    visited[(py * w + px) as usize] = true;
                }
                contours.push(Contour { points });
            } else {
                visited[idx] = true;
            }
        }
    }

    contours
}

/// Polygon area (shoelace). The contour is treated as closed.
pub fn contour_area(points: &[(i32, i32)]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0f64;
    for i in 0..n {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % n];
        area += x0 as f64 * y1 as f64 - x1 as f64 * y0 as f64;
    }
    area.abs() * 0.5
}

/// Closed-contour perimeter.
pub fn contour_perimeter(points: &[(i32, i32)]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    let mut p = 0.0f64;
    for i in 0..n {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % n];
        let dx = (x1 - x0) as f64;
        let dy = (y1 - y0) as f64;
        p += (dx * dx + dy * dy).sqrt();
    }
    p
}

fn point_line_distance(p: (i32, i32), a: (i32, i32), b: (i32, i32)) -> f64 {
    let (px, py) = (p.0 as f64, p.1 as f64);
    let (ax, ay) = (a.0 as f64, a.1 as f64);
    let (bx, by) = (b.0 as f64, b.1 as f64);
    let dx = bx - ax;
    let dy = by - ay;
    if dx == 0.0 && dy == 0.0 {
        let ex = px - ax;
        let ey = py - ay;
        return (ex * ex + ey * ey).sqrt();
    }
    let t = ((px - ax) * dx + (py - ay) * dy) / (dx * dx + dy * dy);
    let proj_x = ax + t * dx;
    let proj_y = ay + t * dy;
    let ex = px - proj_x;
    let ey = py - proj_y;
    (ex * ex + ey * ey).sqrt()
}

fn rdp(points: &[(i32, i32)], epsilon: f64, out: &mut Vec<(i32, i32)>) {
    if points.len() < 2 {
        return;
    }
    let first = points[0];
    let last = points[points.len() - 1];
    let mut max_dist = 0.0f64;
    let mut idx = 0usize;
    for (i, &p) in points
        .iter()
        .enumerate()
        .skip(1)
        .take(points.len().saturating_sub(2))
    {
        let d = point_line_distance(p, first, last);
        if d > max_dist {
            max_dist = d;
            idx = i;
        }
    }

    if max_dist > epsilon && idx > 0 {
        rdp(&points[..=idx], epsilon, out);
        out.pop();
        rdp(&points[idx..], epsilon, out);
    } else {
        out.push(first);
        out.push(last);
    }
}

/// Douglas-Peucker polygonal approximation of a closed contour.
pub fn approx_poly_dp(points: &[(i32, i32)], epsilon: f64) -> Vec<(i32, i32)> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut pts = points.to_vec();
    if pts.first() != pts.last() {
        pts.push(pts[0]);
    }

    let mut out = Vec::new();
    rdp(&pts, epsilon.max(0.0), &mut out);

    out.dedup();
    if out.len() > 2 && out.first() == out.last() {
        out.pop();
    }
    out
}

/// Convexity check: all non-zero cross products along the polygon share
/// one sign.
pub fn is_convex(points: &[(i32, i32)]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0i64;
    for i in 0..n {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % n];
        let (x2, y2) = points[(i + 2) % n];
        let cross =
            (x1 - x0) as i64 * (y2 - y1) as i64 - (y1 - y0) as i64 * (x2 - x1) as i64;
        if cross != 0 {
            if sign == 0 {
                sign = cross.signum();
            } else if sign != cross.signum() {
                return false;
            }
        }
    }
    true
}

/// Side lengths (width, height) of the minimum-area rotated rectangle,
/// by rotating calipers over the convex hull.
pub fn min_area_rect_size(points: &[(i32, i32)]) -> (f64, f64) {
    let hull = convex_hull(points);
    let n = hull.len();
    if n < 3 {
        // Degenerate: fall back to the axis-aligned extent.
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in points {
            min_x = min_x.min(x as f64);
            min_y = min_y.min(y as f64);
            max_x = max_x.max(x as f64);
            max_y = max_y.max(y as f64);
        }
        if points.is_empty() {
            return (0.0, 0.0);
        }
        return (max_x - min_x, max_y - min_y);
    }

    let mut best_area = f64::INFINITY;
    let mut best = (0.0, 0.0);
    for i in 0..n {
        let (x0, y0) = hull[i];
        let (x1, y1) = hull[(i + 1) % n];
        let ex = (x1 - x0) as f64;
        let ey = (y1 - y0) as f64;
        let len = (ex * ex + ey * ey).sqrt();
        if len < 1e-12 {
            continue;
        }
        let ux = ex / len;
        let uy = ey / len;

        let mut min_u = f64::INFINITY;
        let mut max_u = f64::NEG_INFINITY;
        let mut min_v = f64::INFINITY;
        let mut max_v = f64::NEG_INFINITY;
        for &(px, py) in &hull {
            let dx = px as f64;
            let dy = py as f64;
            let u = dx * ux + dy * uy;
            let v = -dx * uy + dy * ux;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }
        let w = max_u - min_u;
        let h = max_v - min_v;
        if w * h < best_area {
            best_area = w * h;
            best = (w, h);
        }
    }
    best
}

fn cross(o: (i32, i32), a: (i32, i32), b: (i32, i32)) -> i64 {
    let (ox, oy) = o;
    let (ax, ay) = a;
    let (bx, by) = b;
    (ax - ox) as i64 * (by - oy) as i64 - (ay - oy) as i64 * (bx - ox) as i64
}

/// Monotone-chain convex hull.
fn convex_hull(points: &[(i32, i32)]) -> Vec<(i32, i32)> {
    let mut pts: Vec<(i32, i32)> = points.to_vec();
    pts.sort_unstable();
    pts.dedup();
    if pts.len() <= 2 {
        return pts;
    }

    let mut lower = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Convenience conversion for downstream geometry.
pub fn to_points2(points: &[(i32, i32)]) -> Vec<Point2<f64>> {
    points
        .iter()
        .map(|&(x, y)| Point2::new(x as f64, y as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn finds_rectangle_contour_and_descriptors() {
        let mut img = GrayImage::new(32, 24);
        for y in 6..18 {
            for x in 8..22 {
                img.put_pixel(x, y, Luma([255]));
            }
        }

        let contours = find_contours(&img);
        assert!(!contours.is_empty());
        let c = &contours[0];

        assert!(contour_area(&c.points) > 0.0);
        assert!(contour_perimeter(&c.points) > 0.0);
    }

    #[test]
    fn approx_poly_reduces_a_square_outline_to_four_vertices() {
        let mut pts = Vec::new();
        for x in 0..20 {
            pts.push((x, 0));
        }
        for y in 0..20 {
            pts.push((20, y));
        }
        for x in (1..=20).rev() {
            pts.push((x, 20));
        }
        for y in (1..=20).rev() {
            pts.push((0, y));
        }
        let eps = 0.02 * contour_perimeter(&pts);
        let approx = approx_poly_dp(&pts, eps);
        assert_eq!(approx.len(), 4);
        assert!(is_convex(&approx));
    }

    #[test]
    fn convexity_of_a_dart_is_rejected() {
        let convex = [(0, 0), (10, 0), (10, 10), (0, 10)];
        let dart = [(0, 0), (10, 0), (4, 4), (0, 10)];
        assert!(is_convex(&convex));
        assert!(!is_convex(&dart));
    }

    #[test]
    fn min_area_rect_of_rotated_square() {
        // A diamond: a square of diagonal 20, i.e. side ~14.14.
        let diamond = [(10, 0), (20, 10), (10, 20), (0, 10)];
        let (w, h) = min_area_rect_size(&diamond);
        let side = (200.0f64).sqrt();
        assert!((w - side).abs() < 1e-9, "w = {w}");
        assert!((h - side).abs() < 1e-9, "h = {h}");
    }

    #[test]
    fn shoelace_area_of_unit_square_scaled() {
        let sq = [(0, 0), (8, 0), (8, 6), (0, 6)];
        assert!((contour_area(&sq) - 48.0).abs() < 1e-12);
    }
}
