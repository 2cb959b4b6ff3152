//! Camera calibration from repeated checkerboard observations.
//!
//! [`CalibrationStore`] accumulates detected corner sets together with their
//! generated object-point grids, runs the intrinsic fit once enough samples
//! are committed, and persists the result as the on-disk intrinsics
//! document.

mod fit;
mod store;

pub use fit::{fit_intrinsics, FitResult};
pub use store::{object_point_grid, CalibrationStore, CaptureOutcome};

#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    #[error("calibration requires at least {min} samples, have {have}")]
    Underdetermined { have: usize, min: usize },

    #[error("degenerate calibration geometry: {0}")]
    Degenerate(&'static str),

    #[error("no fitted intrinsics available yet")]
    NotFitted,

    #[error(transparent)]
    Geometry(#[from] planar_ar_core::GeometryError),

    #[error(transparent)]
    Persist(#[from] planar_ar_core::PersistError),

    #[error("failed to write calibration image {path}: {source}")]
    ImageWrite {
        path: String,
        #[source]
        source: image::ImageError,
    },
}
