use image::RgbImage;
use nalgebra::Point2;

use planar_ar_vision::{
    approx_poly_dp, canny, contour_area, contour_perimeter, find_contours, gaussian_blur,
    is_convex, min_area_rect_size, to_gray, to_points2,
};

const CANNY_LOW: u8 = 50;
const CANNY_HIGH: u8 = 150;
const APPROX_EPS_FACTOR: f64 = 0.02;
const MIN_AREA: f64 = 1000.0;
const TARGET_ASPECT: f64 = 8.0 / 6.0;
const ASPECT_TOLERANCE: f64 = 0.5;

/// Canonical ordering of four coplanar points: [TL, TR, BR, BL].
///
/// TL minimizes x+y, BR maximizes it; TR minimizes y-x, BL maximizes it.
/// The heuristic assumes a near-axis-aligned target; labels degrade once
/// the quad rotates past about 45 degrees.
pub fn order_points(pts: [Point2<f64>; 4]) -> [Point2<f64>; 4] {
    let by_sum = |p: &Point2<f64>| p.x + p.y;
    let by_diff = |p: &Point2<f64>| p.y - p.x;

    let mut tl = pts[0];
    let mut br = pts[0];
    let mut tr = pts[0];
    let mut bl = pts[0];
    for p in &pts[1..] {
        if by_sum(p) < by_sum(&tl) {
            tl = *p;
        }
        if by_sum(p) > by_sum(&br) {
            br = *p;
        }
        if by_diff(p) < by_diff(&tr) {
            tr = *p;
        }
        if by_diff(p) > by_diff(&bl) {
            bl = *p;
        }
    }
    [tl, tr, br, bl]
}

/// Find the most rectangle-like quadrilateral in the frame.
///
/// Filter chain over every traced contour: polygonal approximation at
/// 0.02 x perimeter must yield exactly four vertices, the quad must be
/// convex, cover at least 1000 px^2, and its minimum-area rotated rect
/// must have an aspect ratio within 0.5 of 8/6 (normalized to >= 1).
/// Among survivors the largest area wins; its corners come back in
/// canonical TL/TR/BR/BL order.
pub fn detect_rectangle(frame: &RgbImage) -> Option<[Point2<f64>; 4]> {
    let gray = to_gray(frame);
    let blurred = gaussian_blur(&gray, 5, 0.0);
    let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);

    let mut best: Option<(f64, Vec<(i32, i32)>)> = None;
    for contour in find_contours(&edges) {
        let perimeter = contour_perimeter(&contour.points);
        let approx = approx_poly_dp(&contour.points, APPROX_EPS_FACTOR * perimeter);
        if approx.len() != 4 || !is_convex(&approx) {
            continue;
        }
        let area = contour_area(&approx);
        if area < MIN_AREA {
            continue;
        }
        let (w, h) = min_area_rect_size(&approx);
        if w <= 0.0 || h <= 0.0 {
            continue;
        }
        let mut ratio = w / h;
        if ratio < 1.0 {
            ratio = 1.0 / ratio;
        }
        if (ratio - TARGET_ASPECT).abs() > ASPECT_TOLERANCE {
            continue;
        }
        if best.as_ref().is_none_or(|(a, _)| area > *a) {
            best = Some((area, approx));
        }
    }

    let (_, quad) = best?;
    let p = to_points2(&quad);
    Some(order_points([p[0], p[1], p[2], p[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn order_points_on_the_unit_example() {
        let input = [
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(0.0, 10.0),
        ];
        let ordered = order_points(input);
        assert_eq!(ordered[0], Point2::new(0.0, 0.0));
        assert_eq!(ordered[1], Point2::new(10.0, 0.0));
        assert_eq!(ordered[2], Point2::new(10.0, 10.0));
        assert_eq!(ordered[3], Point2::new(0.0, 10.0));
    }

    #[test]
    fn order_points_is_idempotent() {
        let input = [
            Point2::new(4.0, 9.0),
            Point2::new(12.0, 2.0),
            Point2::new(3.0, 1.0),
            Point2::new(13.0, 8.0),
        ];
        let once = order_points(input);
        let twice = order_points(once);
        assert_eq!(once, twice);
    }

    #[test]
    fn order_points_handles_any_permutation_of_a_rectangle() {
        let tl = Point2::new(2.0, 3.0);
        let tr = Point2::new(22.0, 3.0);
        let br = Point2::new(22.0, 17.0);
        let bl = Point2::new(2.0, 17.0);

        let perms = [
            [tl, tr, br, bl],
            [br, tl, bl, tr],
            [bl, br, tr, tl],
            [tr, bl, tl, br],
        ];
        for perm in perms {
            assert_eq!(order_points(perm), [tl, tr, br, bl]);
        }
    }

    fn frame_with_rect() -> RgbImage {
        let mut img = RgbImage::from_pixel(320, 240, Rgb([0, 0, 0]));
        for y in 60..180 {
            for x in 80..240 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        img
    }

    #[test]
    fn solid_rectangle_is_detected_with_ordered_corners() {
        let corners = detect_rectangle(&frame_with_rect()).expect("rectangle");

        // TL near (80, 60), BR near (240, 180); edge localization is a few
        // pixels wide after smoothing.
        assert!((corners[0].x - 80.0).abs() < 6.0, "tl = {:?}", corners[0]);
        assert!((corners[0].y - 60.0).abs() < 6.0);
        assert!((corners[2].x - 240.0).abs() < 6.0, "br = {:?}", corners[2]);
        assert!((corners[2].y - 180.0).abs() < 6.0);
        assert!(corners[1].x > corners[0].x);
        assert!(corners[3].y > corners[0].y);
    }

    #[test]
    fn blank_frame_has_no_rectangle() {
        let img = RgbImage::from_pixel(320, 240, Rgb([0, 0, 0]));
        assert!(detect_rectangle(&img).is_none());
    }

    #[test]
    fn wrong_aspect_is_rejected() {
        // A square: ratio 1.0, outside 8/6 +- 0.5 is false (1.0 is within
        // 0.83..1.83), so use a long strip instead: ratio 4.0.
        let mut img = RgbImage::from_pixel(320, 240, Rgb([0, 0, 0]));
        for y in 100..140 {
            for x in 40..200 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        assert!(detect_rectangle(&img).is_none());
    }
}
