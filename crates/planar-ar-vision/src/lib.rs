//! Image-processing primitives backing the planar-AR pipeline.
//!
//! This crate is the workspace's "vision toolkit": grayscale helpers,
//! Gaussian smoothing, Canny edges, contour analysis, a chessboard corner
//! finder with sub-pixel refinement, pyramidal Lucas-Kanade sparse flow,
//! and the wireframe/overlay rasterizer. Everything operates on the
//! `image` crate's buffers; geometry uses `nalgebra` points.

mod blur;
mod canny;
mod chessboard;
mod contours;
mod draw;
mod flow;
mod gray;
mod subpix;

pub use blur::gaussian_blur;
pub use canny::canny;
pub use chessboard::find_chessboard_corners;
pub use contours::{
    approx_poly_dp, contour_area, contour_perimeter, find_contours, is_convex, min_area_rect_size,
    to_points2, Contour,
};
pub use draw::{draw_circle_filled, draw_line, draw_marker_quad, draw_point_grid, Color};
pub use flow::LucasKanade;
pub use gray::{downscale, to_gray};
pub use subpix::refine_corners_subpix;
