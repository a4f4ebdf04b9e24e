//! Target pose from a plane homography and known intrinsics.

use super::{project_to_so3, GeometryError};
use nalgebra::{Isometry3, Matrix3, Translation3, UnitQuaternion};

/// Decomposes `H = K [r1 r2 t]` into a rigid transform target → camera.
///
/// The sign ambiguity of `H` is resolved by keeping the target in front of
/// the camera.
pub fn planar_pose_from_homography(
    k: &Matrix3<f64>,
    h: &Matrix3<f64>,
) -> Result<Isometry3<f64>, GeometryError> {
    let k_inv = k
        .try_inverse()
        .ok_or_else(|| GeometryError::Degenerate("camera matrix is singular".to_string()))?;

    let a1 = k_inv * h.column(0);
    let a2 = k_inv * h.column(1);
    let a3 = k_inv * h.column(2);

    let norm = 0.5 * (a1.norm() + a2.norm());
    if norm <= f64::EPSILON {
        return Err(GeometryError::Degenerate(
            "homography has vanishing rotation columns".to_string(),
        ));
    }
    let mut lambda = 1.0 / norm;
    if a3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = a1 * lambda;
    let r2 = a2 * lambda;
    let r3 = r1.cross(&r2);
    let rotation = project_to_so3(&Matrix3::from_columns(&[r1, r2, r3]))?;

    Ok(Isometry3::from_parts(
        Translation3::from(a3 * lambda),
        UnitQuaternion::from_rotation_matrix(&rotation),
    ))
}
