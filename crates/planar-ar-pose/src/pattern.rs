use nalgebra::Point3;

use planar_ar_calib::object_point_grid;

/// A planar target of known geometry, anchoring the world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pattern {
    /// Checkerboard with `cols x rows` inner corners.
    Checkerboard { cols: usize, rows: usize },
    /// Plain rectangle with corners at (0,0), (w,0), (w,h), (0,h), z = 0.
    Rectangle { width: f64, height: f64 },
}

impl Pattern {
    /// The 9x6 inner-corner board used by the calibration and pose demos.
    pub fn default_checkerboard() -> Self {
        Pattern::Checkerboard { cols: 9, rows: 6 }
    }

    /// The 8x6-unit rectangle the detect/track pipeline looks for.
    pub fn default_rectangle() -> Self {
        Pattern::Rectangle {
            width: 8.0,
            height: 6.0,
        }
    }

    /// Target-local 3D points, ordered to match the corresponding detector:
    /// row-major grid for the checkerboard, TL/TR/BR/BL for the rectangle.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        match *self {
            Pattern::Checkerboard { cols, rows } => object_point_grid(cols, rows),
            Pattern::Rectangle { width, height } => vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(width, 0.0, 0.0),
                Point3::new(width, height, 0.0),
                Point3::new(0.0, height, 0.0),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_points_follow_the_calibration_grid() {
        let pts = Pattern::default_checkerboard().object_points();
        assert_eq!(pts.len(), 54);
        assert_eq!(pts[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[1], Point3::new(1.0, 0.0, 0.0));
        assert_eq!(pts[9], Point3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn rectangle_corners_are_tl_tr_br_bl() {
        let pts = Pattern::default_rectangle().object_points();
        assert_eq!(
            pts,
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(8.0, 0.0, 0.0),
                Point3::new(8.0, 6.0, 0.0),
                Point3::new(0.0, 6.0, 0.0),
            ]
        );
    }
}
