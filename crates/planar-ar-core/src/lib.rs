//! Core camera-model types for the `planar-ar-*` workspace.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete detector or image type: it owns the pinhole
//! camera model (K + radial/tangential distortion), Rodrigues poses,
//! point projection, planar homography estimation, and the on-disk
//! intrinsics document.

mod camera;
mod homography;
mod logger;
mod persist;
mod pose;

pub use camera::{CameraIntrinsics, Distortion};
pub use homography::estimate_homography;
pub use logger::init_with_level;
pub use persist::{load_intrinsics, save_intrinsics, PersistError};
pub use pose::{pose_from_planar_homography, project_points, refine_pose, Pose};

/// Errors produced by geometric routines in this crate.
#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    #[error("camera matrix is not a valid upper-triangular K (K[2,2] must be 1)")]
    InvalidCameraMatrix,

    #[error("focal length must be strictly positive (got fx={fx}, fy={fy})")]
    InvalidFocalLength { fx: f64, fy: f64 },

    #[error("homography estimation needs at least 4 correspondences of equal length")]
    UnderdeterminedHomography,

    #[error("degenerate configuration: {0}")]
    Degenerate(&'static str),
}
