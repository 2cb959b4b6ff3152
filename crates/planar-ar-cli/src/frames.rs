use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::CliError;

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Enumerate the frame files of a directory in name order.
///
/// The frame sequence stands in for the camera: files sort by name, so
/// zero-padded numbering gives capture order.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    let entries = fs::read_dir(dir).map_err(|source| CliError::FrameDir {
        path: dir.display().to_string(),
        source,
    })?;

    let mut frames: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    frames.sort();

    if frames.is_empty() {
        return Err(CliError::NoFrames {
            path: dir.display().to_string(),
        });
    }
    Ok(frames)
}

pub fn load_rgb(path: &Path) -> Result<RgbImage, CliError> {
    let img = image::open(path).map_err(|source| CliError::FrameDecode {
        path: path.display().to_string(),
        source,
    })?;
    Ok(img.into_rgb8())
}

/// Write one annotated frame as `frame_<index>.png` under `dir`.
pub fn write_frame(dir: &Path, index: usize, frame: &RgbImage) -> Result<(), CliError> {
    let path = dir.join(format!("frame_{index:05}.png"));
    frame.save(&path).map_err(|source| CliError::Output {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn frames_are_listed_in_name_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let img = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        for name in ["frame_00002.png", "frame_00000.png", "frame_00001.png"] {
            img.save(dir.path().join(name)).expect("save");
        }
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let frames = list_frames(dir.path()).expect("list");
        let names: Vec<String> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["frame_00000.png", "frame_00001.png", "frame_00002.png"]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            list_frames(dir.path()),
            Err(CliError::NoFrames { .. })
        ));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        assert!(matches!(
            list_frames(&missing),
            Err(CliError::FrameDir { .. })
        ));
    }
}
