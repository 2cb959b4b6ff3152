use nalgebra::{DMatrix, DVector, Matrix3, Matrix6, Point2, Point3, Rotation3, Vector3, Vector6};

use crate::{CameraIntrinsics, Distortion, GeometryError};

/// Rigid transform from target frame to camera frame.
///
/// The rotation is stored as a Rodrigues vector (axis * angle), matching
/// the on-the-wire convention of most PnP solvers. Poses are recomputed
/// per frame and never persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn from_rotation(r: Matrix3<f64>, tvec: Vector3<f64>) -> Self {
        let rvec = Rotation3::from_matrix(&r).scaled_axis();
        Self { rvec, tvec }
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        Rotation3::new(self.rvec).into_inner()
    }

    /// Transform a target-frame point into the camera frame.
    pub fn transform(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.rotation() * p.coords + self.tvec
    }
}

/// Project target-frame points through the full pinhole + distortion model.
///
/// Points that land on (or numerically behind) the camera plane project to
/// the principal point; the wireframe rasterizer clips them like any other
/// off-frame vertex.
pub fn project_points(
    points: &[Point3<f64>],
    pose: &Pose,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> Vec<Point2<f64>> {
    let r = pose.rotation();
    points
        .iter()
        .map(|p| {
            let pc = r * p.coords + pose.tvec;
            if pc[2].abs() <= 1e-12 {
                return Point2::new(intrinsics.cx, intrinsics.cy);
            }
            let (xd, yd) = distortion.apply(pc[0] / pc[2], pc[1] / pc[2]);
            Point2::new(
                intrinsics.fx * xd + intrinsics.cx,
                intrinsics.fy * yd + intrinsics.cy,
            )
        })
        .collect()
}

/// Recover the pose of a planar target (z = 0) from a homography that maps
/// target-plane coordinates to *ideal* (undistorted) pixel coordinates.
///
/// Standard decomposition: the first two columns of K^-1 H are the rotation
/// columns r1, r2 up to scale; r3 = r1 x r2; the result is projected onto
/// SO(3) via SVD.
pub fn pose_from_planar_homography(
    intrinsics: &CameraIntrinsics,
    h: &Matrix3<f64>,
) -> Result<Pose, GeometryError> {
    let k_inv = intrinsics.inverse_matrix();
    let r1_raw = k_inv * h.column(0);
    let r2_raw = k_inv * h.column(1);
    let t_raw = k_inv * h.column(2);

    let norm = r1_raw.norm();
    if norm < 1e-12 {
        return Err(GeometryError::Degenerate("homography column collapsed"));
    }
    let scale = 1.0 / norm;

    let r1 = r1_raw * scale;
    let r2 = r2_raw * scale;
    let r3 = r1.cross(&r2);
    let approx = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = approx.svd(true, true);
    let u = svd
        .u
        .ok_or(GeometryError::Degenerate("SVD failed on rotation estimate"))?;
    let vt = svd
        .v_t
        .ok_or(GeometryError::Degenerate("SVD failed on rotation estimate"))?;
    let mut r = u * vt;
    let mut t = t_raw * scale;
    if r.determinant() < 0.0 {
        r = -r;
        t = -t;
    }
    // The target must sit in front of the camera.
    if t[2] < 0.0 {
        r.column_mut(0).neg_mut();
        r.column_mut(1).neg_mut();
        t = -t;
    }

    Ok(Pose::from_rotation(r, t))
}

fn reprojection_residuals(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    pose: &Pose,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> DVector<f64> {
    let projected = project_points(object, pose, intrinsics, distortion);
    let mut r = DVector::<f64>::zeros(object.len() * 2);
    for (i, (p, o)) in projected.iter().zip(image).enumerate() {
        r[2 * i] = p.x - o.x;
        r[2 * i + 1] = p.y - o.y;
    }
    r
}

/// Gauss-Newton refinement of a pose over its six (rvec, tvec) parameters,
/// minimizing pixel reprojection error through the full distortion model.
/// The Jacobian is taken by central differences; `init` must already be in
/// the convergence basin (e.g. a planar-homography decomposition).
pub fn refine_pose(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
    init: Pose,
    max_iters: usize,
) -> Pose {
    const STEP: f64 = 1e-6;
    let mut pose = init;

    for _ in 0..max_iters {
        let r0 = reprojection_residuals(object, image, &pose, intrinsics, distortion);
        let n = r0.len();
        let mut jac = DMatrix::<f64>::zeros(n, 6);

        for p in 0..6 {
            let mut plus = pose;
            let mut minus = pose;
            if p < 3 {
                plus.rvec[p] += STEP;
                minus.rvec[p] -= STEP;
            } else {
                plus.tvec[p - 3] += STEP;
                minus.tvec[p - 3] -= STEP;
            }
            let rp = reprojection_residuals(object, image, &plus, intrinsics, distortion);
            let rm = reprojection_residuals(object, image, &minus, intrinsics, distortion);
            for i in 0..n {
                jac[(i, p)] = (rp[i] - rm[i]) / (2.0 * STEP);
            }
        }

        let jtj = Matrix6::from_fn(|r, c| jac.column(r).dot(&jac.column(c)));
        let jtr = Vector6::from_fn(|r, _| jac.column(r).dot(&r0));
        let damped = jtj + Matrix6::identity() * 1e-9;
        let Some(delta) = damped.lu().solve(&jtr) else {
            break;
        };

        for p in 0..3 {
            pose.rvec[p] -= delta[p];
            pose.tvec[p] -= delta[p + 3];
        }
        if delta.norm() < 1e-12 {
            break;
        }
    }
    pose
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate_homography;
    use approx::assert_relative_eq;

    fn test_camera() -> CameraIntrinsics {
        CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0)
    }

    #[test]
    fn rodrigues_round_trip() {
        let rvec = Vector3::new(0.3, -0.2, 0.9);
        let pose = Pose::new(rvec, Vector3::new(1.0, 2.0, 3.0));
        let back = Pose::from_rotation(pose.rotation(), pose.tvec);
        assert_relative_eq!(back.rvec, rvec, epsilon = 1e-10);
    }

    #[test]
    fn projection_of_origin_hits_principal_point_offset_by_translation() {
        let k = test_camera();
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 10.0));
        let pts = project_points(
            &[Point3::new(0.0, 0.0, 0.0)],
            &pose,
            &k,
            &Distortion::none(),
        );
        assert_relative_eq!(pts[0].x, 320.0, epsilon = 1e-9);
        assert_relative_eq!(pts[0].y, 240.0, epsilon = 1e-9);
    }

    #[test]
    fn planar_homography_recovers_known_pose() {
        let k = test_camera();
        let truth = Pose::new(Vector3::new(0.1, -0.25, 0.05), Vector3::new(-1.0, 0.5, 12.0));

        // Grid of planar points with their exact projections.
        let object: Vec<Point3<f64>> = (0..3)
            .flat_map(|i| (0..4).map(move |j| Point3::new(j as f64, -(i as f64), 0.0)))
            .collect();
        let image = project_points(&object, &truth, &k, &Distortion::none());

        let plane: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
        let h = estimate_homography(&plane, &image).expect("homography");
        let pose = pose_from_planar_homography(&k, &h).expect("pose");

        assert_relative_eq!(pose.rvec, truth.rvec, epsilon = 1e-6);
        assert_relative_eq!(pose.tvec, truth.tvec, epsilon = 1e-6);
    }
}
