//! On-disk intrinsics document.
//!
//! A key-value matrix document with the fixed keys `CameraMatrix` (3x3),
//! `DistortionCoefficients` (5x1) and `ReprojectionError` (scalar, written
//! by calibration, optional on read). Serialized as JSON; the backend is an
//! implementation detail of this crate.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CameraIntrinsics, Distortion};

#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("failed to open intrinsics document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed intrinsics document: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct IntrinsicsDocument {
    #[serde(rename = "CameraMatrix")]
    camera_matrix: [[f64; 3]; 3],
    #[serde(rename = "DistortionCoefficients")]
    distortion_coefficients: [f64; 5],
    #[serde(rename = "ReprojectionError", skip_serializing_if = "Option::is_none")]
    reprojection_error: Option<f64>,
}

/// Write intrinsics, distortion, and the fit's reprojection error.
pub fn save_intrinsics(
    path: &Path,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
    reprojection_error: f64,
) -> Result<(), PersistError> {
    let k = intrinsics.matrix();
    let doc = IntrinsicsDocument {
        camera_matrix: [
            [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
            [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
            [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
        ],
        distortion_coefficients: distortion.coeffs(),
        reprojection_error: Some(reprojection_error),
    };

    let file = File::create(path).map_err(|source| PersistError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), &doc)?;
    Ok(())
}

/// Read intrinsics and distortion back; the reprojection error key is
/// ignored if present.
pub fn load_intrinsics(path: &Path) -> Result<(CameraIntrinsics, Distortion), PersistError> {
    let file = File::open(path).map_err(|source| PersistError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let doc: IntrinsicsDocument = serde_json::from_reader(BufReader::new(file))?;

    let m = doc.camera_matrix;
    let intrinsics = CameraIntrinsics::new(m[0][0], m[1][1], m[0][2], m[1][2]);
    let distortion = Distortion::from_coeffs(doc.distortion_coefficients);
    Ok((intrinsics, distortion))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_is_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("intrinsics.json");

        let k = CameraIntrinsics::new(812.375, 812.375, 331.25, 243.5);
        let d = Distortion::from_coeffs([-0.21, 0.07, 1.5e-3, -2.5e-4, 0.011]);
        save_intrinsics(&path, &k, &d, 0.42).expect("save");

        let (k2, d2) = load_intrinsics(&path).expect("load");
        assert_eq!(k, k2);
        assert_eq!(d, d2);
    }

    #[test]
    fn missing_file_reports_io_failure() {
        let err = load_intrinsics(Path::new("/nonexistent/intrinsics.json")).unwrap_err();
        assert!(matches!(err, PersistError::Io { .. }));
    }
}
