use image::{GrayImage, RgbImage};
use log::{debug, info};
use nalgebra::Point2;

use planar_ar_vision::{to_gray, LucasKanade};

use crate::detect::detect_rectangle;

/// Observable machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Detecting,
    Tracking,
}

enum Inner {
    Detecting,
    /// Lock on a target: the four ordered corners and the reference frame
    /// the next flow step starts from.
    Tracking {
        corners: [Point2<f64>; 4],
        prev: GrayImage,
    },
}

/// Two-state driver over the rectangle detector and the sparse flow
/// tracker.
///
/// DETECTING runs the contour-based rectangle finder every frame until it
/// produces four ordered corners. TRACKING carries them forward with
/// Lucas-Kanade flow; any lost corner (fewer than 4 good points) drops the
/// lock and detection starts over on the next frame. The reference frame
/// is replaced after every successful flow step.
pub struct DetectTrackMachine {
    flow: LucasKanade,
    inner: Inner,
}

impl Default for DetectTrackMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectTrackMachine {
    pub fn new() -> Self {
        Self {
            flow: LucasKanade::default(),
            inner: Inner::Detecting,
        }
    }

    pub fn state(&self) -> TrackState {
        match self.inner {
            Inner::Detecting => TrackState::Detecting,
            Inner::Tracking { .. } => TrackState::Tracking,
        }
    }

    /// The currently held corners, present exactly while TRACKING.
    pub fn corners(&self) -> Option<&[Point2<f64>; 4]> {
        match &self.inner {
            Inner::Detecting => None,
            Inner::Tracking { corners, .. } => Some(corners),
        }
    }

    /// Advance the machine by one frame; returns the target corners when
    /// the frame yields a lock (fresh or carried forward), `None` otherwise.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Option<[Point2<f64>; 4]> {
        match &mut self.inner {
            Inner::Detecting => {
                let Some(corners) = detect_rectangle(frame) else {
                    debug!("target not detected");
                    return None;
                };
                info!("target acquired, switching to tracking");
                self.inner = Inner::Tracking {
                    corners,
                    prev: to_gray(frame),
                };
                Some(corners)
            }
            Inner::Tracking { corners, prev } => {
                let gray = to_gray(frame);
                let tracked = self.flow.track_points(prev, &gray, corners.as_slice());
                let good = tracked.iter().filter(|(_, ok)| *ok).count();

                if good < 4 {
                    info!("track lost ({good}/4 good points), re-detecting");
                    self.inner = Inner::Detecting;
                    return None;
                }

                for (c, (p, _)) in corners.iter_mut().zip(&tracked) {
                    *c = *p;
                }
                *prev = gray;
                Some(*corners)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(rect: bool) -> RgbImage {
        let mut img = RgbImage::from_pixel(320, 240, Rgb([0, 0, 0]));
        if rect {
            for y in 60..180 {
                for x in 80..240 {
                    img.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
        }
        img
    }

    #[test]
    fn appears_then_occluded_scenario() {
        let mut machine = DetectTrackMachine::new();

        // Frames 0..=9: empty scene, nothing to lock on.
        for i in 0..10 {
            let out = machine.process_frame(&frame(false));
            assert!(out.is_none(), "frame {i} should not detect");
            assert_eq!(machine.state(), TrackState::Detecting);
            assert!(machine.corners().is_none());
        }

        // Frame 10: the rectangle appears.
        let corners = machine
            .process_frame(&frame(true))
            .expect("lock on frame 10");
        assert_eq!(machine.state(), TrackState::Tracking);
        assert!((corners[0].x - 80.0).abs() < 6.0);

        // Frames 11..=29: static target stays tracked.
        for i in 11..30 {
            let out = machine.process_frame(&frame(true));
            assert!(out.is_some(), "frame {i} should stay tracked");
            assert_eq!(machine.state(), TrackState::Tracking);
            assert_eq!(machine.corners().map(|c| c.len()), Some(4));
        }

        // Frame 30: occlusion. Flow fails, lock is dropped immediately.
        assert!(machine.process_frame(&frame(false)).is_none());
        assert_eq!(machine.state(), TrackState::Detecting);
        assert!(machine.corners().is_none());
    }

    #[test]
    fn reacquires_after_loss() {
        let mut machine = DetectTrackMachine::new();
        assert!(machine.process_frame(&frame(true)).is_some());
        assert!(machine.process_frame(&frame(false)).is_none());
        assert_eq!(machine.state(), TrackState::Detecting);

        // The very next frame with a target locks again.
        assert!(machine.process_frame(&frame(true)).is_some());
        assert_eq!(machine.state(), TrackState::Tracking);
    }
}
