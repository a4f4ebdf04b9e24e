//! Hand-eye calibration (`AX = XB`) with the Tsai-Lenz formulation.

use super::SolverError;
use crate::geometry::{null_vector, GeometryError};
use log::debug;
use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Matrix4, Quaternion, Translation3, UnitQuaternion,
    Vector3,
};

/// Pose pairs rotating less than this are dropped from the rotation solve.
pub const DEFAULT_MIN_ROTATION_DEG: f64 = 1.0;

/// Relative motion between two samples in both chains.
#[derive(Debug, Clone, Copy)]
struct MotionPair {
    a: Isometry3<f64>,
    b: Isometry3<f64>,
}

/// Quaternion with a non-negative scalar part.
fn canonical(q: UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    if q.w < 0.0 {
        UnitQuaternion::new_unchecked(-q.into_inner())
    } else {
        q
    }
}

/// `L(q)` with `q * p = L(q) p` for `p = [w, x, y, z]`.
fn quat_left(q: &UnitQuaternion<f64>) -> Matrix4<f64> {
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);
    Matrix4::new(
        w, -x, -y, -z, //
        x, w, -z, y, //
        y, z, w, -x, //
        z, -y, x, w,
    )
}

/// `R(q)` with `p * q = R(q) p` for `p = [w, x, y, z]`.
fn quat_right(q: &UnitQuaternion<f64>) -> Matrix4<f64> {
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);
    Matrix4::new(
        w, -x, -y, -z, //
        x, w, z, -y, //
        y, -z, w, x, //
        z, y, -x, w,
    )
}

/// Builds every motion pair with enough rotation in both chains.
///
/// With `G_i` the gripper pose in the base and `C_i` the target → camera
/// transform, the target is fixed in the base so `G_i X C_i` is constant and
/// `A = G_i^-1 G_j`, `B = C_i C_j^-1` satisfy `A X = X B`.
fn motion_pairs(
    gripper_poses: &[Isometry3<f64>],
    target_poses: &[Isometry3<f64>],
    min_rotation_deg: f64,
) -> Vec<MotionPair> {
    let min_angle = min_rotation_deg.to_radians();
    let mut pairs = Vec::new();
    for i in 0..gripper_poses.len() {
        for j in (i + 1)..gripper_poses.len() {
            let a = gripper_poses[i].inverse() * gripper_poses[j];
            let b = target_poses[i] * target_poses[j].inverse();
            if a.rotation.angle().min(b.rotation.angle()) < min_angle {
                debug!("skipping hand-eye pair ({i}, {j}): rotation too small");
                continue;
            }
            pairs.push(MotionPair { a, b });
        }
    }
    pairs
}

fn solve_rotation(pairs: &[MotionPair]) -> Result<UnitQuaternion<f64>, SolverError> {
    let mut m = DMatrix::<f64>::zeros(4 * pairs.len(), 4);
    for (idx, pair) in pairs.iter().enumerate() {
        let qa = canonical(pair.a.rotation);
        let qb = canonical(pair.b.rotation);
        m.view_mut((4 * idx, 0), (4, 4))
            .copy_from(&(quat_left(&qa) - quat_right(&qb)));
    }
    let q = null_vector(&m)?;
    let q = Quaternion::new(q[0], q[1], q[2], q[3]);
    if q.norm() <= f64::EPSILON {
        return Err(
            GeometryError::Degenerate("hand-eye rotation is undetermined".to_string()).into(),
        );
    }
    Ok(UnitQuaternion::from_quaternion(q))
}

/// Least squares `(R_A - I) t_X = R_X t_B - t_A` over all pairs.
fn solve_translation(
    pairs: &[MotionPair],
    rotation: &UnitQuaternion<f64>,
) -> Result<Vector3<f64>, SolverError> {
    let mut c = DMatrix::<f64>::zeros(3 * pairs.len(), 3);
    let mut w = DVector::<f64>::zeros(3 * pairs.len());
    let r_x = rotation.to_rotation_matrix();
    for (idx, pair) in pairs.iter().enumerate() {
        let r_a = pair.a.rotation.to_rotation_matrix();
        c.view_mut((3 * idx, 0), (3, 3))
            .copy_from(&(r_a.matrix() - Matrix3::identity()));
        w.rows_mut(3 * idx, 3)
            .copy_from(&(r_x * pair.b.translation.vector - pair.a.translation.vector));
    }
    let svd = c.svd(true, true);
    let t = svd
        .solve(&w, 1e-12)
        .map_err(|e| SolverError::OptimizationFailed(format!("hand-eye translation: {e}")))?;
    Ok(Vector3::new(t[0], t[1], t[2]))
}

/// Camera pose in the gripper frame from paired gripper and target poses.
pub fn tsai_lenz(
    gripper_poses: &[Isometry3<f64>],
    target_poses: &[Isometry3<f64>],
    min_rotation_deg: f64,
) -> Result<Isometry3<f64>, SolverError> {
    if gripper_poses.len() != target_poses.len() {
        return Err(SolverError::InvalidInput(format!(
            "{} gripper poses but {} target poses",
            gripper_poses.len(),
            target_poses.len()
        )));
    }
    if gripper_poses.len() < 3 {
        return Err(GeometryError::NotEnoughViews {
            needed: 3,
            got: gripper_poses.len(),
        }
        .into());
    }

    let pairs = motion_pairs(gripper_poses, target_poses, min_rotation_deg);
    if pairs.len() < 2 {
        return Err(GeometryError::Degenerate(
            "need at least two pose pairs with distinct rotations".to_string(),
        )
        .into());
    }
    debug!("hand-eye solve over {} motion pairs", pairs.len());

    let rotation = solve_rotation(&pairs)?;
    let translation = solve_translation(&pairs, &rotation)?;
    Ok(Isometry3::from_parts(Translation3::from(translation), rotation))
}
