use image::RgbImage;
use log::warn;
use nalgebra::{Point2, Point3};

use planar_ar_core::{
    estimate_homography, pose_from_planar_homography, project_points, refine_pose,
    CameraIntrinsics, Distortion, GeometryError, Pose,
};
use planar_ar_model::Model;
use planar_ar_vision::{
    draw_line, find_chessboard_corners, refine_corners_subpix, to_gray, Color,
};

pub const DEFAULT_AXIS_LENGTH: f64 = 3.0;

const SUBPIX_WIN_RADIUS: u32 = 5;
const SUBPIX_MAX_ITERS: usize = 30;
const SUBPIX_EPS: f64 = 0.1;
const POSE_REFINE_ITERS: usize = 20;

#[derive(thiserror::Error, Debug)]
pub enum PoseError {
    #[error("pattern not found in frame")]
    NotFound,

    #[error("pose estimation failed: {0}")]
    Failure(&'static str),

    #[error("pose estimation failed: {0}")]
    Geometry(#[from] GeometryError),
}

/// Per-frame pose estimation and overlay rendering for one calibrated
/// camera.
pub struct PoseEngine {
    intrinsics: CameraIntrinsics,
    distortion: Distortion,
}

impl PoseEngine {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// Detect a full `cols x rows` checkerboard corner grid at full
    /// resolution. Acceptance requires the complete grid; the corners are
    /// always sub-pixel refined before being returned.
    pub fn detect_checkerboard(
        &self,
        frame: &RgbImage,
        cols: usize,
        rows: usize,
    ) -> Result<Vec<Point2<f64>>, PoseError> {
        let gray = to_gray(frame);
        let mut corners =
            find_chessboard_corners(&gray, cols, rows).ok_or(PoseError::NotFound)?;
        refine_corners_subpix(
            &gray,
            &mut corners,
            SUBPIX_WIN_RADIUS,
            SUBPIX_MAX_ITERS,
            SUBPIX_EPS,
        );
        Ok(corners)
    }

    /// Solve the planar PnP problem for index-matched correspondences.
    ///
    /// The observed pixels are undistorted, a plane-to-image homography is
    /// decomposed into an initial pose, and the result is polished by
    /// Gauss-Newton through the full distortion model.
    pub fn solve_pose(
        &self,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
    ) -> Result<Pose, PoseError> {
        if object_points.len() != image_points.len() || object_points.len() < 4 {
            return Err(PoseError::Failure(
                "need at least 4 index-matched correspondences",
            ));
        }
        if object_points.iter().any(|p| p.z.abs() > 1e-9) {
            return Err(PoseError::Failure("object points must lie in the z = 0 plane"));
        }

        let plane: Vec<Point2<f64>> = object_points
            .iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect();
        let ideal: Vec<Point2<f64>> = image_points
            .iter()
            .map(|p| {
                let xn = (p.x - self.intrinsics.cx) / self.intrinsics.fx;
                let yn = (p.y - self.intrinsics.cy) / self.intrinsics.fy;
                let (xu, yu) = self.distortion.remove(xn, yn);
                Point2::new(
                    self.intrinsics.fx * xu + self.intrinsics.cx,
                    self.intrinsics.fy * yu + self.intrinsics.cy,
                )
            })
            .collect();

        let h = estimate_homography(&plane, &ideal)?;
        let init = pose_from_planar_homography(&self.intrinsics, &h)?;
        Ok(refine_pose(
            object_points,
            image_points,
            &self.intrinsics,
            &self.distortion,
            init,
            POSE_REFINE_ITERS,
        ))
    }

    /// Draw the model as an unfilled wireframe anchored to the pose.
    ///
    /// Off-frame vertices are the rasterizer's concern; faces with indices
    /// outside the vertex list are skipped and reported.
    pub fn render_model(&self, frame: &mut RgbImage, model: &Model, pose: &Pose) {
        let projected = project_points(
            &model.vertices,
            pose,
            &self.intrinsics,
            &self.distortion,
        );
        for (i, face) in model.faces.iter().enumerate() {
            if face.iter().any(|&v| v >= projected.len()) {
                warn!("model face {i} references a vertex out of range, skipped");
                continue;
            }
            for e in 0..3 {
                draw_line(
                    frame,
                    projected[face[e]],
                    projected[face[(e + 1) % 3]],
                    Color::BLUE,
                );
            }
        }
    }

    /// Draw the target-frame coordinate axes at the origin: X red, Y green,
    /// Z blue.
    pub fn render_axes(&self, frame: &mut RgbImage, pose: &Pose, length: f64) {
        let pts = project_points(
            &[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(length, 0.0, 0.0),
                Point3::new(0.0, length, 0.0),
                Point3::new(0.0, 0.0, length),
            ],
            pose,
            &self.intrinsics,
            &self.distortion,
        );
        draw_line(frame, pts[0], pts[1], Color::RED);
        draw_line(frame, pts[0], pts[2], Color::GREEN);
        draw_line(frame, pts[0], pts[3], Color::BLUE);
    }
}
