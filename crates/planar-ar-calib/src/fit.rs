use nalgebra::{DMatrix, DVector, Matrix3, Point2, Point3};

use planar_ar_core::{
    estimate_homography, pose_from_planar_homography, project_points, refine_pose,
    CameraIntrinsics, Distortion, GeometryError, Pose,
};

use crate::CalibError;

/// Output of a successful intrinsic fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
    /// Mean pixel distance between observed and reprojected corners.
    pub reprojection_error: f64,
    /// Per-view extrinsics, one per calibration sample.
    pub poses: Vec<Pose>,
}

const REFINE_ROUNDS: usize = 5;
const POSE_ITERS: usize = 10;

/// Zhang row v_ij for columns i and j of a homography.
fn zhang_row(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 6] {
    let hi = h.column(i);
    let hj = h.column(j);
    [
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ]
}

/// Closed-form intrinsics from per-view plane homographies (Zhang's method),
/// with the skew term forced to zero and fx = fy enforced afterwards.
fn intrinsics_from_homographies(
    homographies: &[Matrix3<f64>],
) -> Result<CameraIntrinsics, CalibError> {
    let mut v = DMatrix::<f64>::zeros(homographies.len() * 2, 6);
    for (n, h) in homographies.iter().enumerate() {
        let v12 = zhang_row(h, 0, 1);
        let v11 = zhang_row(h, 0, 0);
        let v22 = zhang_row(h, 1, 1);
        for c in 0..6 {
            v[(2 * n, c)] = v12[c];
            v[(2 * n + 1, c)] = v11[c] - v22[c];
        }
    }

    let svd = v.svd(false, true);
    let vt = svd
        .v_t
        .ok_or(CalibError::Degenerate("SVD failed on the Zhang system"))?;
    let b = vt.row(vt.nrows() - 1);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    if denom.abs() < 1e-18 || b11.abs() < 1e-18 {
        return Err(CalibError::Degenerate("homography set is rank deficient"));
    }
    let cy = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + cy * (b12 * b13 - b11 * b23)) / b11;

    let fx2 = lambda / b11;
    let fy2 = lambda * b11 / denom;
    if fx2 <= 0.0 || fy2 <= 0.0 {
        return Err(CalibError::Degenerate("negative focal-length estimate"));
    }
    let fx = fx2.sqrt();
    let fy = fy2.sqrt();
    let cx = -b13 * fx * fx / lambda;

    // Aspect-ratio-fixed option: collapse the two focal estimates.
    let f = 0.5 * (fx + fy);
    Ok(CameraIntrinsics::new(f, f, cx, cy))
}

/// Linear least-squares update of the five distortion coefficients; the
/// residual is linear in (k1, k2, p1, p2, k3) once poses and K are held.
fn solve_distortion(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
    k: &CameraIntrinsics,
    poses: &[Pose],
) -> Option<Distortion> {
    let total: usize = object_points.iter().map(Vec::len).sum();
    let mut a = DMatrix::<f64>::zeros(total * 2, 5);
    let mut rhs = DVector::<f64>::zeros(total * 2);

    let mut row = 0;
    for ((obj, img), pose) in object_points.iter().zip(image_points).zip(poses) {
        let r = pose.rotation();
        for (p, uv) in obj.iter().zip(img) {
            let pc = r * p.coords + pose.tvec;
            if pc[2].abs() < 1e-9 {
                return None;
            }
            let x = pc[0] / pc[2];
            let y = pc[1] / pc[2];
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;

            a[(row, 0)] = k.fx * x * r2;
            a[(row, 1)] = k.fx * x * r4;
            a[(row, 2)] = k.fx * 2.0 * x * y;
            a[(row, 3)] = k.fx * (r2 + 2.0 * x * x);
            a[(row, 4)] = k.fx * x * r6;
            rhs[row] = uv.x - k.fx * x - k.cx;
            row += 1;

            a[(row, 0)] = k.fy * y * r2;
            a[(row, 1)] = k.fy * y * r4;
            a[(row, 2)] = k.fy * (r2 + 2.0 * y * y);
            a[(row, 3)] = k.fy * 2.0 * x * y;
            a[(row, 4)] = k.fy * y * r6;
            rhs[row] = uv.y - k.fy * y - k.cy;
            row += 1;
        }
    }

    let sol = a.svd(true, true).solve(&rhs, 1e-12).ok()?;
    Some(Distortion::from_coeffs([
        sol[0], sol[1], sol[2], sol[3], sol[4],
    ]))
}

/// Linear least-squares update of (f, cx, cy) with fx = fy = f, holding the
/// poses and distortion.
fn solve_focal_center(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
    distortion: &Distortion,
    poses: &[Pose],
) -> Option<CameraIntrinsics> {
    let total: usize = object_points.iter().map(Vec::len).sum();
    let mut a = DMatrix::<f64>::zeros(total * 2, 3);
    let mut rhs = DVector::<f64>::zeros(total * 2);

    let mut row = 0;
    for ((obj, img), pose) in object_points.iter().zip(image_points).zip(poses) {
        let r = pose.rotation();
        for (p, uv) in obj.iter().zip(img) {
            let pc = r * p.coords + pose.tvec;
            if pc[2].abs() < 1e-9 {
                return None;
            }
            let (xd, yd) = distortion.apply(pc[0] / pc[2], pc[1] / pc[2]);

            a[(row, 0)] = xd;
            a[(row, 1)] = 1.0;
            rhs[row] = uv.x;
            row += 1;

            a[(row, 0)] = yd;
            a[(row, 2)] = 1.0;
            rhs[row] = uv.y;
            row += 1;
        }
    }

    let sol = a.svd(true, true).solve(&rhs, 1e-12).ok()?;
    if sol[0] <= 0.0 {
        return None;
    }
    Some(CameraIntrinsics::new(sol[0], sol[0], sol[1], sol[2]))
}

fn mean_reprojection_error(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
    k: &CameraIntrinsics,
    d: &Distortion,
    poses: &[Pose],
) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for ((obj, img), pose) in object_points.iter().zip(image_points).zip(poses) {
        let projected = project_points(obj, pose, k, d);
        for (p, o) in projected.iter().zip(img) {
            sum += (p - o).norm();
            count += 1;
        }
    }
    if count == 0 {
        f64::INFINITY
    } else {
        sum / count as f64
    }
}

/// Full intrinsic fit from planar calibration views.
///
/// Closed-form Zhang initialization from per-view homographies, then an
/// alternating refinement: per-view pose Gauss-Newton, linear distortion
/// solve, linear (f, cx, cy) solve. `fx = fy` is enforced throughout.
pub fn fit_intrinsics(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
) -> Result<FitResult, CalibError> {
    if object_points.len() < 3 || object_points.len() != image_points.len() {
        return Err(CalibError::Degenerate(
            "need at least three planar views for the closed-form init",
        ));
    }

    let homographies: Vec<Matrix3<f64>> = object_points
        .iter()
        .zip(image_points)
        .map(|(obj, img)| {
            let plane: Vec<Point2<f64>> =
                obj.iter().map(|p| Point2::new(p.x, p.y)).collect();
            estimate_homography(&plane, img).map_err(CalibError::from)
        })
        .collect::<Result<_, CalibError>>()?;

    let mut k = intrinsics_from_homographies(&homographies)?;
    let mut d = Distortion::none();
    let mut poses: Vec<Pose> = homographies
        .iter()
        .map(|h| pose_from_planar_homography(&k, h))
        .collect::<Result<_, GeometryError>>()?;

    for _ in 0..REFINE_ROUNDS {
        for ((pose, obj), img) in poses.iter_mut().zip(object_points).zip(image_points) {
            *pose = refine_pose(obj, img, &k, &d, *pose, POSE_ITERS);
        }
        if let Some(next) = solve_distortion(object_points, image_points, &k, &poses) {
            d = next;
        }
        if let Some(next) = solve_focal_center(object_points, image_points, &d, &poses) {
            k = next;
        }
    }
    for ((pose, obj), img) in poses.iter_mut().zip(object_points).zip(image_points) {
        *pose = refine_pose(obj, img, &k, &d, *pose, POSE_ITERS);
    }

    k.validate_fitted()?;
    let reprojection_error = mean_reprojection_error(object_points, image_points, &k, &d, &poses);

    Ok(FitResult {
        intrinsics: k,
        distortion: d,
        reprojection_error,
        poses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::object_point_grid;
    use nalgebra::Vector3;

    fn synthetic_views(
        k: &CameraIntrinsics,
        d: &Distortion,
    ) -> (Vec<Vec<Point3<f64>>>, Vec<Vec<Point2<f64>>>) {
        let grid = object_point_grid(9, 6);
        let poses = [
            Pose::new(Vector3::new(0.15, 0.05, 0.02), Vector3::new(-4.0, 2.5, 18.0)),
            Pose::new(Vector3::new(-0.25, 0.20, 0.00), Vector3::new(-3.0, 3.0, 20.0)),
            Pose::new(Vector3::new(0.05, -0.30, 0.10), Vector3::new(-5.0, 2.0, 16.0)),
            Pose::new(Vector3::new(0.30, 0.25, -0.08), Vector3::new(-4.5, 3.5, 22.0)),
            Pose::new(Vector3::new(-0.10, -0.15, 0.20), Vector3::new(-3.5, 2.0, 19.0)),
            Pose::new(Vector3::new(0.22, -0.12, -0.15), Vector3::new(-4.0, 2.8, 17.0)),
        ];
        let mut object = Vec::new();
        let mut image = Vec::new();
        for pose in &poses {
            object.push(grid.clone());
            image.push(project_points(&grid, pose, k, d));
        }
        (object, image)
    }

    #[test]
    fn recovers_intrinsics_from_exact_views() {
        let truth = CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0);
        let (object, image) = synthetic_views(&truth, &Distortion::none());
        let fit = fit_intrinsics(&object, &image).expect("fit");

        assert!((fit.intrinsics.fx - 800.0).abs() < 1.0, "fx = {}", fit.intrinsics.fx);
        assert!((fit.intrinsics.cx - 320.0).abs() < 1.0);
        assert!((fit.intrinsics.cy - 240.0).abs() < 1.0);
        assert_eq!(fit.intrinsics.fx, fit.intrinsics.fy);
        assert!(fit.reprojection_error < 0.1, "err = {}", fit.reprojection_error);
        assert_eq!(fit.poses.len(), 6);
    }

    #[test]
    fn recovers_mild_radial_distortion() {
        let truth = CameraIntrinsics::new(750.0, 750.0, 310.0, 245.0);
        let d_truth = Distortion {
            k1: -0.15,
            k2: 0.03,
            p1: 0.0,
            p2: 0.0,
            k3: 0.0,
        };
        let (object, image) = synthetic_views(&truth, &d_truth);
        let fit = fit_intrinsics(&object, &image).expect("fit");

        assert!(fit.reprojection_error < 0.5, "err = {}", fit.reprojection_error);
        assert!((fit.distortion.k1 - d_truth.k1).abs() < 0.05);
    }

    #[test]
    fn too_few_views_are_rejected() {
        let truth = CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0);
        let (object, image) = synthetic_views(&truth, &Distortion::none());
        let err = fit_intrinsics(&object[..2], &image[..2]).unwrap_err();
        assert!(matches!(err, CalibError::Degenerate(_)));
    }
}
