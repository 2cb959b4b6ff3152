use nalgebra::Point3;

/// Scale the model uniformly, then lift it along Z.
///
/// The Z offset keeps the model above the target plane `z = 0`, so the
/// wireframe does not intersect the target drawing. Mutates in place,
/// preserving vertex order.
pub fn adjust(vertices: &mut [Point3<f64>], scale: f64, z_offset: f64) {
    for v in vertices.iter_mut() {
        v.x *= scale;
        v.y *= scale;
        v.z = v.z * scale + z_offset;
    }
}
