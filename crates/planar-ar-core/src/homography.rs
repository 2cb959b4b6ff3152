use nalgebra::{DMatrix, Matrix3, Point2};

use crate::GeometryError;

fn hartley_normalization(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // Translate to centroid, scale so the mean distance is sqrt(2).
    let n = pts.len() as f64;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in pts {
        cx += p.x;
        cy += p.y;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in pts {
        let dx = p.x - cx;
        let dy = p.y - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);

    let out = pts
        .iter()
        .map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    (out, t)
}

/// Estimate H such that `dst ~ H * src` via the normalized DLT.
///
/// Correspondences are by index; at least 4 pairs are required. The result
/// is scaled so `H[2,2] = 1`.
pub fn estimate_homography(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
) -> Result<Matrix3<f64>, GeometryError> {
    if src.len() != dst.len() || src.len() < 4 {
        return Err(GeometryError::UnderdeterminedHomography);
    }

    let (s, ts) = hartley_normalization(src);
    let (d, td) = hartley_normalization(dst);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for k in 0..n {
        let x = s[k].x;
        let y = s[k].y;
        let u = d[k].x;
        let v = d[k].y;

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Solve Ah = 0: right singular vector with the smallest singular value.
    let svd = a.svd(true, true);
    let vt = svd
        .v_t
        .ok_or(GeometryError::Degenerate("SVD failed in homography DLT"))?;
    let h = vt.row(vt.nrows() - 1);
    let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    // Denormalize: H = Td^-1 * Hn * Ts
    let td_inv = td
        .try_inverse()
        .ok_or(GeometryError::Degenerate("normalization not invertible"))?;
    let mut out = td_inv * hn * ts;

    if out[(2, 2)].abs() < 1e-12 {
        return Err(GeometryError::Degenerate("H[2,2] vanished"));
    }
    out /= out[(2, 2)];
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn apply(h: &Matrix3<f64>, p: Point2<f64>) -> Point2<f64> {
        let v = h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    #[test]
    fn recovers_ground_truth_from_exact_points() {
        let truth = Matrix3::new(
            0.8, 0.05, 120.0, //
            -0.02, 1.1, 80.0, //
            0.0009, -0.0004, 1.0,
        );

        let src: Vec<Point2<f64>> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Point2::new(x as f64 * 40.0, y as f64 * 50.0)))
            .collect();
        let dst: Vec<Point2<f64>> = src.iter().map(|&p| apply(&truth, p)).collect();

        let h = estimate_homography(&src, &dst).expect("estimate");
        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(60.0, 40.0),
            Point2::new(80.0, 100.0),
        ] {
            let a = apply(&h, p);
            let b = apply(&truth, p);
            assert!((a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6);
        }
    }

    #[test]
    fn mismatched_or_short_inputs_fail() {
        let four = [Point2::new(0.0, 0.0); 4];
        let three = [Point2::new(1.0, 1.0); 3];
        assert!(estimate_homography(&four, &three).is_err());
        assert!(estimate_homography(&three, &three).is_err());
    }
}
