//! Umbrella crate for the planar-AR workspace.
//!
//! Re-exports the camera model and persistence (`planar-ar-core`), the
//! vision primitives (`planar-ar-vision`), the OBJ model loader
//! (`planar-ar-model`), camera calibration (`planar-ar-calib`), pose
//! estimation and overlay rendering (`planar-ar-pose`), and the
//! detect/track state machine (`planar-ar-track`).

pub use planar_ar_calib as calib;
pub use planar_ar_model as model;
pub use planar_ar_pose as pose;
pub use planar_ar_track as track;
pub use planar_ar_vision as vision;

pub use planar_ar_calib::{fit_intrinsics, object_point_grid, CalibError, CalibrationStore};
pub use planar_ar_core::{
    init_with_level, load_intrinsics, save_intrinsics, CameraIntrinsics, Distortion,
    GeometryError, PersistError, Pose,
};
pub use planar_ar_model::{load_obj, Model, ObjError};
pub use planar_ar_pose::{Pattern, PoseEngine, PoseError};
pub use planar_ar_track::{DetectTrackMachine, TrackState};
