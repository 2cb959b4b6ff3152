//! Wireframe model handling: a Wavefront OBJ subset loader and the
//! placement transform that scales the model and lifts it off the target
//! plane.

mod obj;
mod transform;

pub use obj::{load_obj, Model, ObjError};
pub use transform::adjust;
