use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use nalgebra::Point3;
use thiserror::Error;

/// Loaded wireframe geometry: a vertex list and triangle indices into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub vertices: Vec<Point3<f64>>,
    pub faces: Vec<[usize; 3]>,
}

#[derive(Debug, Error)]
pub enum ObjError {
    #[error("failed to read OBJ file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no usable geometry in {path}")]
    NoGeometry { path: PathBuf },
}

fn parse_vertex(line_no: usize, rest: &str) -> Option<Point3<f64>> {
    let mut it = rest.split_whitespace();
    let coords: Option<(f64, f64, f64)> = (|| {
        let x = it.next()?.parse().ok()?;
        let y = it.next()?.parse().ok()?;
        let z = it.next()?.parse().ok()?;
        Some((x, y, z))
    })();
    match coords {
        // Trailing tokens (e.g. vertex color) are ignored.
        Some((x, y, z)) => Some(Point3::new(x, y, z)),
        None => {
            warn!("obj: line {line_no}: malformed vertex record, skipped");
            None
        }
    }
}

/// Parses one face record into 0-based vertex indices.
///
/// Tokens may be `i`, `i/t`, `i/t/n` or `i//n`; only the vertex index is
/// used. Indices are 1-based in the file.
fn parse_face(line_no: usize, rest: &str, vertex_count: usize) -> Option<Vec<usize>> {
    let mut indices = Vec::new();
    for token in rest.split_whitespace() {
        let first = token.split('/').next().unwrap_or("");
        let idx: i64 = match first.parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("obj: line {line_no}: bad face index {first:?}, face skipped");
                return None;
            }
        };
        if idx < 1 || idx as usize > vertex_count {
            warn!("obj: line {line_no}: face index {idx} out of range, face skipped");
            return None;
        }
        indices.push(idx as usize - 1);
    }
    Some(indices)
}

/// Load a Wavefront OBJ subset: `v` and `f` records only.
///
/// Malformed lines are logged and skipped; loading continues. Quads are
/// fan-split into two triangles. The load fails only when the file cannot
/// be read or yields no vertices or no faces at all.
pub fn load_obj(path: impl AsRef<Path>) -> Result<Model, ObjError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ObjError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut vertices: Vec<Point3<f64>> = Vec::new();
    let mut faces: Vec<[usize; 3]> = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        if let Some(rest) = line.strip_prefix("v ") {
            if let Some(v) = parse_vertex(line_no, rest) {
                vertices.push(v);
            }
        } else if let Some(rest) = line.strip_prefix("f ") {
            let Some(idx) = parse_face(line_no, rest, vertices.len()) else {
                continue;
            };
            match idx.len() {
                3 => faces.push([idx[0], idx[1], idx[2]]),
                4 => {
                    faces.push([idx[0], idx[1], idx[2]]);
                    faces.push([idx[0], idx[2], idx[3]]);
                }
                n => {
                    warn!("obj: line {line_no}: {n}-gon face not supported, skipped");
                }
            }
        }
        // Normals, texture coordinates, groups and comments are ignored.
    }

    if vertices.is_empty() || faces.is_empty() {
        return Err(ObjError::NoGeometry {
            path: path.to_path_buf(),
        });
    }
    Ok(Model { vertices, faces })
}
