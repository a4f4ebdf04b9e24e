//! Zhang's closed-form intrinsics from three or more plane homographies.

use super::{null_vector, GeometryError};
use crate::camera::Intrinsics;
use nalgebra::{DMatrix, Matrix3};

/// Row `v_ij` of Zhang's constraint matrix built from homography columns `i` and `j`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 6] {
    let hi = h.column(i);
    let hj = h.column(j);
    [
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ]
}

/// Estimates zero-skew intrinsics from plane homographies.
///
/// The image of the absolute conic `B = K^-T K^-1` is solved from the
/// orthonormality of the first two rotation columns; the skew term is
/// discarded from the returned intrinsics.
pub fn intrinsics_from_homographies(
    homographies: &[Matrix3<f64>],
) -> Result<Intrinsics, GeometryError> {
    if homographies.len() < 3 {
        return Err(GeometryError::NotEnoughViews {
            needed: 3,
            got: homographies.len(),
        });
    }

    let mut v = DMatrix::<f64>::zeros(2 * homographies.len(), 6);
    for (k, h) in homographies.iter().enumerate() {
        let h = h / h.norm();
        let v12 = v_ij(&h, 0, 1);
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        for c in 0..6 {
            v[(2 * k, c)] = v12[c];
            v[(2 * k + 1, c)] = v11[c] - v22[c];
        }
    }

    let b = null_vector(&v)?;
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    if denom.abs() <= f64::EPSILON * b11.abs().max(1.0) || b11.abs() <= f64::EPSILON {
        return Err(GeometryError::Degenerate(
            "conic is singular, views lack rotational diversity".to_string(),
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let alpha_sq = lambda / b11;
    let beta_sq = lambda * b11 / denom;
    if !(alpha_sq > 0.0 && beta_sq > 0.0) {
        return Err(GeometryError::Degenerate(
            "negative focal length squared".to_string(),
        ));
    }

    let alpha = alpha_sq.sqrt();
    let beta = beta_sq.sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Ok(Intrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    fn homography(k: &Matrix3<f64>, r: &Rotation3<f64>, t: &Vector3<f64>) -> Matrix3<f64> {
        let mut rt = Matrix3::zeros();
        rt.set_column(0, &r.matrix().column(0));
        rt.set_column(1, &r.matrix().column(1));
        rt.set_column(2, t);
        let h = k * rt;
        h / h[(2, 2)]
    }

    #[test]
    fn test_recovers_intrinsics_from_synthetic_views() {
        let truth = Intrinsics {
            fx: 800.0,
            fy: 780.0,
            cx: 320.0,
            cy: 240.0,
        };
        let k = truth.camera_matrix();
        let views = [
            (Rotation3::from_euler_angles(0.3, 0.1, 0.0), Vector3::new(-0.1, -0.1, 1.0)),
            (Rotation3::from_euler_angles(-0.2, 0.35, 0.1), Vector3::new(-0.05, -0.12, 1.2)),
            (Rotation3::from_euler_angles(0.1, -0.3, -0.2), Vector3::new(-0.12, -0.08, 0.9)),
            (Rotation3::from_euler_angles(-0.35, -0.15, 0.3), Vector3::new(-0.1, -0.05, 1.1)),
        ];
        let hs: Vec<_> = views.iter().map(|(r, t)| homography(&k, r, t)).collect();

        let est = intrinsics_from_homographies(&hs).unwrap();
        assert_relative_eq!(est.fx, truth.fx, max_relative = 1e-6);
        assert_relative_eq!(est.fy, truth.fy, max_relative = 1e-6);
        assert_relative_eq!(est.cx, truth.cx, max_relative = 1e-6);
        assert_relative_eq!(est.cy, truth.cy, max_relative = 1e-6);
    }

    #[test]
    fn test_needs_three_views() {
        let h = Matrix3::identity();
        assert_eq!(
            intrinsics_from_homographies(&[h, h]),
            Err(GeometryError::NotEnoughViews { needed: 3, got: 2 })
        );
    }
}
