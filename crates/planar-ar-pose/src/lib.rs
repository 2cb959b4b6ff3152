//! Per-frame pose estimation over a known planar target, plus the AR
//! overlay rendering (wireframe model and coordinate axes).

mod engine;
mod pattern;

pub use engine::{PoseEngine, PoseError, DEFAULT_AXIS_LENGTH};
pub use pattern::Pattern;
