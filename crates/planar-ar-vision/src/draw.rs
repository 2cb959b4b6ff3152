use image::{Rgb, RgbImage};
use nalgebra::Point2;

/// RGB drawing color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    pub const RED: Color = Color(255, 0, 0);
    pub const GREEN: Color = Color(0, 255, 0);
    pub const BLUE: Color = Color(0, 0, 255);
    pub const YELLOW: Color = Color(255, 255, 0);
    pub const CYAN: Color = Color(0, 255, 255);
    pub const MAGENTA: Color = Color(255, 0, 255);
    pub const WHITE: Color = Color(255, 255, 255);
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Color) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, Rgb([color.0, color.1, color.2]));
    }
}

/// Bresenham line between two sub-pixel endpoints, clipped to the frame.
pub fn draw_line(img: &mut RgbImage, from: Point2<f64>, to: Point2<f64>, color: Color) {
    if !(from.x.is_finite() && from.y.is_finite() && to.x.is_finite() && to.y.is_finite()) {
        return;
    }
    let mut x0 = from.x.round() as i64;
    let mut y0 = from.y.round() as i64;
    let x1 = to.x.round() as i64;
    let y1 = to.y.round() as i64;

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Filled disc of the given radius.
pub fn draw_circle_filled(img: &mut RgbImage, center: Point2<f64>, radius: u32, color: Color) {
    if !(center.x.is_finite() && center.y.is_finite()) {
        return;
    }
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    let r = radius as i64;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                put(img, cx + dx, cy + dy, color);
            }
        }
    }
}

/// Outline of a tracked quadrilateral with a dot on each corner.
pub fn draw_marker_quad(img: &mut RgbImage, corners: &[Point2<f64>; 4], color: Color) {
    for i in 0..4 {
        draw_line(img, corners[i], corners[(i + 1) % 4], color);
    }
    for c in corners {
        draw_circle_filled(img, *c, 3, color);
    }
}

/// Detected-corner overlay: a dot per corner plus a polyline threading the
/// grid in detection order.
pub fn draw_point_grid(img: &mut RgbImage, points: &[Point2<f64>], color: Color) {
    for pair in points.windows(2) {
        draw_line(img, pair[0], pair[1], color);
    }
    for p in points {
        draw_circle_filled(img, *p, 2, color);
    }
}
