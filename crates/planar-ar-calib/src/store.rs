use std::path::Path;

use image::RgbImage;
use log::{info, warn};
use nalgebra::{Point2, Point3};

use planar_ar_core::{load_intrinsics, save_intrinsics, CameraIntrinsics, Distortion};
use planar_ar_vision::{
    downscale, draw_point_grid, find_chessboard_corners, refine_corners_subpix, to_gray, Color,
};

use crate::fit::{fit_intrinsics, FitResult};
use crate::CalibError;

/// Detection runs on a half-size frame for throughput; corners are scaled
/// back to full resolution afterwards.
const DETECT_SCALE: f64 = 0.5;
const SUBPIX_WIN_RADIUS: u32 = 5;
const SUBPIX_MAX_ITERS: usize = 30;
const SUBPIX_EPS: f64 = 0.1;
pub const MIN_SAMPLES: usize = 5;

struct Sample {
    image_points: Vec<Point2<f64>>,
    object_points: Vec<Point3<f64>>,
    frame: RgbImage,
}

/// One `capture_candidate` call's result: the annotated frame plus whether
/// a full corner grid was found in it.
pub struct CaptureOutcome {
    pub overlay: RgbImage,
    pub detected: bool,
}

/// Accumulates checkerboard observations and runs the intrinsic fit.
///
/// Samples are append-only; the image size is fixed by the first committed
/// sample. A successful detection stays pending until it is committed or a
/// newer detection replaces it.
pub struct CalibrationStore {
    pattern_cols: usize,
    pattern_rows: usize,
    image_size: Option<(u32, u32)>,
    samples: Vec<Sample>,
    pending: Option<(Vec<Point2<f64>>, RgbImage)>,
    fit: Option<FitResult>,
}

/// Target-local 3D grid for a `(cols, rows)` checkerboard: point `i*W + j`
/// is `(j, -i, 0)`. Y grows downward so the board's top-left matches the
/// image's top-left.
pub fn object_point_grid(cols: usize, rows: usize) -> Vec<Point3<f64>> {
    let mut grid = Vec::with_capacity(cols * rows);
    for i in 0..rows {
        for j in 0..cols {
            grid.push(Point3::new(j as f64, -(i as f64), 0.0));
        }
    }
    grid
}

impl CalibrationStore {
    pub fn new(pattern_cols: usize, pattern_rows: usize) -> Self {
        Self {
            pattern_cols,
            pattern_rows,
            image_size: None,
            samples: Vec::new(),
            pending: None,
            fit: None,
        }
    }

    /// Detect the corner grid in `frame` and keep it as the pending sample.
    ///
    /// Detection runs on a half-size grayscale copy; found corners are
    /// refined to sub-pixel accuracy there and rescaled to full resolution.
    /// The returned overlay carries the detected grid when there is one.
    pub fn capture_candidate(&mut self, frame: &RgbImage) -> CaptureOutcome {
        let gray = to_gray(frame);
        let small = downscale(&gray, DETECT_SCALE);

        let Some(mut corners) =
            find_chessboard_corners(&small, self.pattern_cols, self.pattern_rows)
        else {
            return CaptureOutcome {
                overlay: frame.clone(),
                detected: false,
            };
        };

        refine_corners_subpix(
            &small,
            &mut corners,
            SUBPIX_WIN_RADIUS,
            SUBPIX_MAX_ITERS,
            SUBPIX_EPS,
        );
        for c in &mut corners {
            c.x /= DETECT_SCALE;
            c.y /= DETECT_SCALE;
        }

        let mut overlay = frame.clone();
        draw_point_grid(&mut overlay, &corners, Color::GREEN);
        self.pending = Some((corners, frame.clone()));
        CaptureOutcome {
            overlay,
            detected: true,
        }
    }

    /// Append the pending detection to the calibration set. Returns whether
    /// a sample was committed.
    pub fn commit_last_valid(&mut self) -> bool {
        let Some((corners, frame)) = self.pending.take() else {
            warn!("no valid detection pending, nothing to commit");
            return false;
        };

        let size = frame.dimensions();
        match self.image_size {
            None => self.image_size = Some(size),
            Some(expected) if expected != size => {
                warn!(
                    "frame size {size:?} differs from calibration set size {expected:?}, \
                     sample rejected"
                );
                return false;
            }
            Some(_) => {}
        }

        self.samples.push(Sample {
            image_points: corners,
            object_points: object_point_grid(self.pattern_cols, self.pattern_rows),
            frame,
        });
        info!("committed calibration sample {}", self.samples.len());
        true
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn fit_result(&self) -> Option<&FitResult> {
        self.fit.as_ref()
    }

    /// Run the intrinsic fit over the committed samples.
    ///
    /// Requires at least [`MIN_SAMPLES`] samples; below that the call fails
    /// with `Underdetermined` and any previously fitted intrinsics remain
    /// untouched.
    pub fn run_fit(&mut self) -> Result<&FitResult, CalibError> {
        if self.samples.len() < MIN_SAMPLES {
            return Err(CalibError::Underdetermined {
                have: self.samples.len(),
                min: MIN_SAMPLES,
            });
        }

        let object: Vec<Vec<Point3<f64>>> = self
            .samples
            .iter()
            .map(|s| s.object_points.clone())
            .collect();
        let image: Vec<Vec<Point2<f64>>> = self
            .samples
            .iter()
            .map(|s| s.image_points.clone())
            .collect();

        let result = fit_intrinsics(&object, &image)?;
        info!(
            "calibration fit over {} samples: f = {:.2}, c = ({:.2}, {:.2}), \
             mean reprojection error = {:.4} px",
            self.samples.len(),
            result.intrinsics.fx,
            result.intrinsics.cx,
            result.intrinsics.cy,
            result.reprojection_error,
        );
        Ok(&*self.fit.insert(result))
    }

    /// Write the fitted intrinsics document.
    pub fn persist(&self, path: &Path) -> Result<(), CalibError> {
        let fit = self.fit.as_ref().ok_or(CalibError::NotFitted)?;
        save_intrinsics(
            path,
            &fit.intrinsics,
            &fit.distortion,
            fit.reprojection_error,
        )?;
        Ok(())
    }

    /// Read an intrinsics document written by [`CalibrationStore::persist`].
    pub fn load(path: &Path) -> Result<(CameraIntrinsics, Distortion), CalibError> {
        Ok(load_intrinsics(path)?)
    }

    /// Dump the committed reference frames as `calibration_image_<i>.png`.
    pub fn write_calibration_images(&self, dir: &Path) -> Result<(), CalibError> {
        for (i, sample) in self.samples.iter().enumerate() {
            let path = dir.join(format!("calibration_image_{i}.png"));
            sample
                .frame
                .save(&path)
                .map_err(|source| CalibError::ImageWrite {
                    path: path.display().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;
    use nalgebra::Vector3;
    use planar_ar_core::{project_points, Pose};

    #[test]
    fn object_grid_is_row_major_with_inverted_y() {
        let grid = object_point_grid(3, 2);
        let expected = [
            (0.0, 0.0),
            (1.0, 0.0),
            (2.0, 0.0),
            (0.0, -1.0),
            (1.0, -1.0),
            (2.0, -1.0),
        ];
        assert_eq!(grid.len(), 6);
        for (p, (x, y)) in grid.iter().zip(expected) {
            assert_relative_eq!(p.x, x);
            assert_relative_eq!(p.y, y);
            assert_relative_eq!(p.z, 0.0);
        }
    }

    #[test]
    fn grid_index_law() {
        let (w, h) = (9, 6);
        let grid = object_point_grid(w, h);
        for i in 0..h {
            for j in 0..w {
                let p = grid[i * w + j];
                assert_eq!((p.x, p.y, p.z), (j as f64, -(i as f64), 0.0));
            }
        }
    }

    #[test]
    fn commit_without_detection_is_refused() {
        let mut store = CalibrationStore::new(9, 6);
        assert!(!store.commit_last_valid());
        assert_eq!(store.sample_count(), 0);
    }

    fn push_synthetic_sample(store: &mut CalibrationStore, pose: &Pose) {
        let k = CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0);
        let grid = object_point_grid(store.pattern_cols, store.pattern_rows);
        let image_points = project_points(&grid, pose, &k, &Distortion::none());
        store.pending = Some((image_points, RgbImage::new(640, 480)));
        assert!(store.commit_last_valid());
    }

    #[test]
    fn fit_gate_requires_five_samples() {
        let mut store = CalibrationStore::new(9, 6);
        let poses = [
            Pose::new(Vector3::new(0.15, 0.05, 0.02), Vector3::new(-4.0, 2.5, 18.0)),
            Pose::new(Vector3::new(-0.25, 0.20, 0.00), Vector3::new(-3.0, 3.0, 20.0)),
            Pose::new(Vector3::new(0.05, -0.30, 0.10), Vector3::new(-5.0, 2.0, 16.0)),
            Pose::new(Vector3::new(0.30, 0.25, -0.08), Vector3::new(-4.5, 3.5, 22.0)),
        ];
        for pose in &poses {
            push_synthetic_sample(&mut store, pose);
        }

        let err = store.run_fit().unwrap_err();
        assert!(matches!(
            err,
            CalibError::Underdetermined { have: 4, min: 5 }
        ));
        assert!(store.fit_result().is_none(), "gate must not mutate the fit");

        push_synthetic_sample(
            &mut store,
            &Pose::new(Vector3::new(-0.10, -0.15, 0.20), Vector3::new(-3.5, 2.0, 19.0)),
        );
        let fit = store.run_fit().expect("five samples fit");
        assert!(fit.reprojection_error.is_finite());
        assert!((fit.intrinsics.fx - 800.0).abs() < 2.0);
    }

    #[test]
    fn mismatched_frame_size_is_rejected() {
        let mut store = CalibrationStore::new(9, 6);
        let pose = Pose::new(Vector3::new(0.1, 0.0, 0.0), Vector3::new(-4.0, 2.5, 18.0));
        push_synthetic_sample(&mut store, &pose);

        let grid = object_point_grid(9, 6);
        let k = CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0);
        store.pending = Some((
            project_points(&grid, &pose, &k, &Distortion::none()),
            RgbImage::new(320, 240),
        ));
        assert!(!store.commit_last_valid());
        assert_eq!(store.sample_count(), 1);
    }

    /// Render a board, run the real capture path, and commit.
    #[test]
    fn capture_candidate_detects_a_rendered_board() {
        let cols = 4;
        let rows = 3;
        let sq = 40u32;
        let (ox, oy) = (40u32, 40u32);
        let w = ox * 2 + (cols as u32 + 1) * sq;
        let h = oy * 2 + (rows as u32 + 1) * sq;

        let mut frame = RgbImage::from_pixel(w, h, Rgb([200, 200, 200]));
        for cy in 0..=rows as u32 {
            for cx in 0..=cols as u32 {
                if (cx + cy) % 2 == 0 {
                    for y in 0..sq {
                        for x in 0..sq {
                            frame.put_pixel(ox + cx * sq + x, oy + cy * sq + y, Rgb([30, 30, 30]));
                        }
                    }
                }
            }
        }

        let mut store = CalibrationStore::new(cols, rows);
        let outcome = store.capture_candidate(&frame);
        assert!(outcome.detected, "rendered board should be detected");

        // First inner corner at full resolution, near (ox + sq, oy + sq).
        let (corners, _) = store.pending.as_ref().expect("pending detection");
        assert!((corners[0].x - (ox + sq) as f64).abs() < 4.0);
        assert!((corners[0].y - (oy + sq) as f64).abs() < 4.0);

        assert!(store.commit_last_valid());
        assert_eq!(store.sample_count(), 1);
        assert!(store.pending.is_none(), "commit consumes the pending sample");
    }

    #[test]
    fn blank_frame_is_not_detected() {
        let mut store = CalibrationStore::new(9, 6);
        let frame = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        let outcome = store.capture_candidate(&frame);
        assert!(!outcome.detected);
        assert!(store.pending.is_none());
    }

    #[test]
    fn calibration_images_are_numbered() {
        let mut store = CalibrationStore::new(9, 6);
        let pose = Pose::new(Vector3::new(0.1, 0.0, 0.0), Vector3::new(-4.0, 2.5, 18.0));
        push_synthetic_sample(&mut store, &pose);
        push_synthetic_sample(&mut store, &pose);

        let dir = tempfile::tempdir().expect("tempdir");
        store.write_calibration_images(dir.path()).expect("write");
        assert!(dir.path().join("calibration_image_0.png").exists());
        assert!(dir.path().join("calibration_image_1.png").exists());
    }
}
