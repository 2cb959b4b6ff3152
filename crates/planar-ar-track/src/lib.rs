//! The detect/track pipeline for a generic rectangular target: contour
//! rectangle detection while searching, sparse Lucas-Kanade flow once
//! locked on, with full re-detection on loss.

mod detect;
mod machine;

pub use detect::{detect_rectangle, order_points};
pub use machine::{DetectTrackMachine, TrackState};
