//! Shared plumbing for the planar-AR binaries: the file-based frame source
//! and the CLI error type.

mod frames;

pub use frames::{list_frames, load_rgb, write_frame};

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("failed to read frame directory {path}: {source}")]
    FrameDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no frames found in {path}")]
    NoFrames { path: String },

    #[error("failed to decode frame {path}: {source}")]
    FrameDecode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
