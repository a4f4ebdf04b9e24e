//! Closed-form geometry used to initialise the nonlinear solvers: plane
//! homographies, Zhang's intrinsics, planar pose recovery and rotation helpers.

use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, RealField, Rotation3, Translation3, UnitQuaternion,
    Vector3,
};
use std::cmp::Ordering;

pub mod homography;
pub mod planar_pose;
pub mod zhang;

pub use homography::find_homography;
pub use planar_pose::planar_pose_from_homography;
pub use zhang::intrinsics_from_homographies;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("need at least {needed} point correspondences, got {got}")]
    NotEnoughPoints { needed: usize, got: usize },
    #[error("need at least {needed} views, got {got}")]
    NotEnoughViews { needed: usize, got: usize },
    #[error("degenerate configuration: {0}")]
    Degenerate(String),
    #[error("svd failed")]
    SvdFailed,
}

/// Right singular vector of the smallest singular value, i.e. the least
/// squares solution of `A x = 0` with `|x| = 1`.
pub fn null_vector(a: &DMatrix<f64>) -> Result<DVector<f64>, GeometryError> {
    // A thin SVD of a wide matrix drops the null space, pad to square.
    let a = if a.nrows() < a.ncols() {
        let mut padded = DMatrix::zeros(a.ncols(), a.ncols());
        padded.view_mut((0, 0), (a.nrows(), a.ncols())).copy_from(a);
        padded
    } else {
        a.clone()
    };

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(GeometryError::SvdFailed)?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
        .ok_or(GeometryError::SvdFailed)?;

    Ok(v_t.row(min_idx).transpose())
}

/// Closest rotation to `m` in the Frobenius sense.
pub fn project_to_so3(m: &Matrix3<f64>) -> Result<Rotation3<f64>, GeometryError> {
    let svd = m.svd(true, true);
    let u = svd.u.ok_or(GeometryError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(GeometryError::SvdFailed)?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }
    Ok(Rotation3::from_matrix_unchecked(r))
}

/// Chordal L2 mean of a set of rotations.
pub fn mean_rotation(rotations: &[Rotation3<f64>]) -> Result<Rotation3<f64>, GeometryError> {
    if rotations.is_empty() {
        return Err(GeometryError::NotEnoughViews { needed: 1, got: 0 });
    }
    let sum = rotations
        .iter()
        .fold(Matrix3::zeros(), |acc, r| acc + r.matrix());
    project_to_so3(&sum)
}

/// Cross-product matrix `[v]x`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y, //
        v.z, 0.0, -v.x, //
        -v.y, v.x, 0.0,
    )
}

/// Rigid transform from a Rodrigues rotation vector and a translation.
pub fn isometry_from_rvec(rvec: &Vector3<f64>, tvec: &Vector3<f64>) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::from(*tvec),
        UnitQuaternion::from_scaled_axis(*rvec),
    )
}

/// Rodrigues rotation vector of a rigid transform's rotation part.
pub fn rvec_from_isometry(iso: &Isometry3<f64>) -> Vector3<f64> {
    iso.rotation.scaled_axis()
}

/// Rotates `p` by the Rodrigues vector `rvec`; generic for automatic differentiation.
pub fn rotate_rodrigues<T: RealField>(rvec: &Vector3<T>, p: &Vector3<T>) -> Vector3<T> {
    let theta2 = rvec.dot(rvec);
    if theta2 > T::from_f64(1e-16).unwrap() {
        let theta = theta2.sqrt();
        let axis = rvec / theta.clone();
        let (sin, cos) = theta.sin_cos();
        let axis_dot_p = axis.dot(p);
        p * cos.clone() + axis.cross(p) * sin + axis * (axis_dot_p * (T::one() - cos))
    } else {
        p + rvec.cross(p)
    }
}
