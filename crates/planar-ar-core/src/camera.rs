use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::GeometryError;

/// Pinhole camera matrix K.
///
/// Invariants: K is upper-triangular with `K[2,2] = 1`; after a calibration
/// fit both focal lengths are strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Identity focal length with the principal point at the image center.
    /// This is the initial guess used by the calibration fit.
    pub fn initial_guess(image_width: u32, image_height: u32) -> Self {
        Self {
            fx: 1.0,
            fy: 1.0,
            cx: image_width as f64 / 2.0,
            cy: image_height as f64 / 2.0,
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Build from a 3x3 camera matrix, validating the K invariants.
    pub fn from_matrix(k: &Matrix3<f64>) -> Result<Self, GeometryError> {
        let off_ok = k[(1, 0)].abs() < 1e-9 && k[(2, 0)].abs() < 1e-9 && k[(2, 1)].abs() < 1e-9;
        if !off_ok || (k[(2, 2)] - 1.0).abs() > 1e-9 {
            return Err(GeometryError::InvalidCameraMatrix);
        }
        Ok(Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        })
    }

    pub fn inverse_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            1.0 / self.fx,
            0.0,
            -self.cx / self.fx,
            0.0,
            1.0 / self.fy,
            -self.cy / self.fy,
            0.0,
            0.0,
            1.0,
        )
    }

    pub fn validate_fitted(&self) -> Result<(), GeometryError> {
        if self.fx <= 0.0 || self.fy <= 0.0 || !self.fx.is_finite() || !self.fy.is_finite() {
            return Err(GeometryError::InvalidFocalLength {
                fx: self.fx,
                fy: self.fy,
            });
        }
        Ok(())
    }
}

/// Standard 5-parameter radial/tangential lens distortion (k1, k2, p1, p2, k3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn none() -> Self {
        Self::default()
    }

    /// Coefficients in the conventional (k1, k2, p1, p2, k3) order.
    pub fn coeffs(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_coeffs(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    /// Distort an ideal normalized coordinate.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let xd = x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (xd, yd)
    }

    /// Undistort a normalized coordinate by fixed-point iteration.
    pub fn remove(&self, xd: f64, yd: f64) -> (f64, f64) {
        let mut x = xd;
        let mut y = yd;
        for _ in 0..8 {
            let (px, py) = self.apply(x, y);
            x += xd - px;
            y += yd - py;
        }
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn matrix_round_trips() {
        let k = CameraIntrinsics::new(812.4, 812.4, 331.0, 243.5);
        let back = CameraIntrinsics::from_matrix(&k.matrix()).expect("valid K");
        assert_eq!(k, back);
    }

    #[test]
    fn lower_triangle_entries_are_rejected() {
        let mut m = CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0).matrix();
        m[(2, 0)] = 0.5;
        assert!(CameraIntrinsics::from_matrix(&m).is_err());
    }

    #[test]
    fn inverse_matrix_matches_nalgebra_inverse() {
        let k = CameraIntrinsics::new(640.0, 655.0, 311.0, 248.0);
        let inv = k.matrix().try_inverse().expect("invertible");
        let ours = k.inverse_matrix();
        for r in 0..3 {
            for c in 0..3 {
                assert_relative_eq!(inv[(r, c)], ours[(r, c)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn distortion_remove_inverts_apply() {
        let d = Distortion {
            k1: -0.21,
            k2: 0.07,
            p1: 1.2e-3,
            p2: -8.0e-4,
            k3: 0.0,
        };
        for (x, y) in [(0.0, 0.0), (0.12, -0.08), (-0.3, 0.25)] {
            let (xd, yd) = d.apply(x, y);
            let (xu, yu) = d.remove(xd, yd);
            assert_relative_eq!(xu, x, epsilon = 1e-8);
            assert_relative_eq!(yu, y, epsilon = 1e-8);
        }
    }

    #[test]
    fn fitted_validation_rejects_nonpositive_focal() {
        let k = CameraIntrinsics::new(-1.0, 800.0, 320.0, 240.0);
        assert!(k.validate_fitted().is_err());
    }
}
