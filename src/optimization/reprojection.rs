//! Reprojection residuals shared by the mono and stereo refinements.

use crate::camera::{CameraModel, Intrinsics};
use crate::geometry::{isometry_from_rvec, rotate_rodrigues, rvec_from_isometry};
use nalgebra::{DVector, Isometry3, Point3, RealField, Vector2, Vector3};
use tiny_solver::factors::Factor;

/// Pose parameter block `[rx, ry, rz, tx, ty, tz]` to a rigid transform.
pub fn pose_from_params(params: &DVector<f64>) -> Isometry3<f64> {
    isometry_from_rvec(
        &Vector3::new(params[0], params[1], params[2]),
        &Vector3::new(params[3], params[4], params[5]),
    )
}

pub fn pose_to_params(pose: &Isometry3<f64>) -> DVector<f64> {
    let r = rvec_from_isometry(pose);
    let t = pose.translation.vector;
    DVector::from_vec(vec![r.x, r.y, r.z, t.x, t.y, t.z])
}

/// Applies a `[rvec, t]` parameter block to `p`.
pub fn transform_point<T: RealField>(pose: &DVector<T>, p: &Vector3<T>) -> Vector3<T> {
    let rvec = Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
    let t = Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());
    rotate_rodrigues(&rvec, p) + t
}

/// Lifts an `f64` point into the solver's scalar type.
pub fn lift<T: RealField>(p: &Vector3<f64>) -> Vector3<T> {
    Vector3::new(
        T::from_f64(p.x).unwrap(),
        T::from_f64(p.y).unwrap(),
        T::from_f64(p.z).unwrap(),
    )
}

/// Intrinsics and distortion held constant during a refinement.
#[derive(Debug, Clone)]
pub struct FixedCamera {
    pub intrinsics: [f64; 4],
    pub distortion: Vec<f64>,
}

impl FixedCamera {
    pub fn new(intrinsics: &Intrinsics, distortion: &[f64]) -> Self {
        FixedCamera {
            intrinsics: intrinsics.to_array(),
            distortion: distortion.to_vec(),
        }
    }

    pub fn lifted<T: RealField>(&self) -> ([T; 4], Vec<T>) {
        let intrinsics = self.intrinsics.map(|v| T::from_f64(v).unwrap());
        let distortion = self
            .distortion
            .iter()
            .map(|&v| T::from_f64(v).unwrap())
            .collect();
        (intrinsics, distortion)
    }
}

/// Residual between observed pixels and target points projected through a
/// sample pose.
///
/// Parameter blocks are `[intrinsics, distortion, pose]`. With an aspect
/// ratio set, the intrinsics block is `[f, cx, cy]` and `fy = f * ratio`,
/// otherwise it is `[fx, fy, cx, cy]`. With a fixed camera the only block is
/// `[pose]`.
#[derive(Debug, Clone)]
pub struct ReprojectionCost {
    model: CameraModel,
    points3d: Vec<Vector3<f64>>,
    points2d: Vec<Vector2<f64>>,
    aspect_ratio: Option<f64>,
    fixed_camera: Option<FixedCamera>,
}

impl ReprojectionCost {
    pub fn new(
        model: CameraModel,
        points3d: &[Vector3<f64>],
        points2d: &[Vector2<f64>],
        aspect_ratio: Option<f64>,
    ) -> Self {
        ReprojectionCost {
            model,
            points3d: points3d.to_vec(),
            points2d: points2d.to_vec(),
            aspect_ratio,
            fixed_camera: None,
        }
    }

    /// Refines only the pose, with the camera held at `camera`.
    pub fn with_fixed_camera(mut self, camera: FixedCamera) -> Self {
        self.fixed_camera = Some(camera);
        self
    }

    pub fn num_residuals(&self) -> usize {
        self.points2d.len() * 2
    }
}

/// Expands an intrinsics parameter block into `[fx, fy, cx, cy]`.
pub fn expand_intrinsics<T: RealField>(params: &DVector<T>, aspect_ratio: Option<f64>) -> [T; 4] {
    match aspect_ratio {
        Some(ratio) => [
            params[0].clone(),
            params[0].clone() * T::from_f64(ratio).unwrap(),
            params[1].clone(),
            params[2].clone(),
        ],
        None => [
            params[0].clone(),
            params[1].clone(),
            params[2].clone(),
            params[3].clone(),
        ],
    }
}

impl<T: RealField> Factor<T> for ReprojectionCost {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let (intrinsics, distortion, pose) = match &self.fixed_camera {
            Some(camera) => {
                let (intrinsics, distortion) = camera.lifted::<T>();
                (intrinsics, distortion, &params[0])
            }
            None => (
                expand_intrinsics(&params[0], self.aspect_ratio),
                params[1].as_slice().to_vec(),
                &params[2],
            ),
        };

        let mut residuals = DVector::zeros(self.num_residuals());
        for (i, (p3d, p2d)) in self.points3d.iter().zip(&self.points2d).enumerate() {
            let pc = transform_point(pose, &lift(p3d));
            let projected = self.model.project(&intrinsics, &distortion, &pc);
            residuals[i * 2] = projected.x.clone() - T::from_f64(p2d.x).unwrap();
            residuals[i * 2 + 1] = projected.y.clone() - T::from_f64(p2d.y).unwrap();
        }
        residuals
    }
}

/// Squared pixel distances between observations and projections.
pub fn squared_errors(
    model: CameraModel,
    intrinsics: &Intrinsics,
    distortion: &[f64],
    pose: &Isometry3<f64>,
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
) -> Vec<f64> {
    let intr = intrinsics.to_array();
    points3d
        .iter()
        .zip(points2d)
        .map(|(p3d, p2d)| {
            let pc = pose.transform_point(&Point3::from(*p3d)).coords;
            let projected = model.project(&intr, distortion, &pc);
            (projected - p2d).norm_squared()
        })
        .collect()
}

/// Root mean square of per-point reprojection distances.
pub fn rms(squared: &[f64]) -> f64 {
    if squared.is_empty() {
        return 0.0;
    }
    (squared.iter().sum::<f64>() / squared.len() as f64).sqrt()
}
