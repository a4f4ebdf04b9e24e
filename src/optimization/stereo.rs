//! Relative pose of a stereo rig with known intrinsics.

use super::mono::estimate_pose;
use super::reprojection::{
    lift, pose_from_params, pose_to_params, rms, squared_errors, transform_point, FixedCamera,
    ReprojectionCost,
};
use super::{optimizer_options, SolverError, StereoSolution, StereoSolveInput};
use crate::camera::CameraModel;
use crate::geometry::{mean_rotation, skew};
use crate::result::IntrinsicParameters;
use crate::sample::MonoSample;

use log::{debug, info};
use nalgebra::{
    DVector, Isometry3, Matrix3, RealField, Translation3, UnitQuaternion, Vector2, Vector3,
};
use std::collections::HashMap;
use tiny_solver::factors::Factor;
use tiny_solver::{LevenbergMarquardtOptimizer, Optimizer as TinySolverOptimizer};

const RELATIVE: &str = "left_to_right";

fn left_pose_key(i: usize) -> String {
    format!("left_pose_{i}")
}

/// Right-camera residual of a target seen through the left pose and the
/// left → right transform. Parameter blocks are `[left_pose, left_to_right]`.
#[derive(Debug, Clone)]
struct RightReprojectionCost {
    model: CameraModel,
    camera: FixedCamera,
    points3d: Vec<Vector3<f64>>,
    points2d: Vec<Vector2<f64>>,
}

impl<T: RealField> Factor<T> for RightReprojectionCost {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let (intrinsics, distortion) = self.camera.lifted::<T>();
        let mut residuals = DVector::zeros(self.points2d.len() * 2);
        for (i, (p3d, p2d)) in self.points3d.iter().zip(&self.points2d).enumerate() {
            let left = transform_point(&params[0], &lift(p3d));
            let right = transform_point(&params[1], &left);
            let projected = self.model.project(&intrinsics, &distortion, &right);
            residuals[i * 2] = projected.x.clone() - T::from_f64(p2d.x).unwrap();
            residuals[i * 2 + 1] = projected.y.clone() - T::from_f64(p2d.y).unwrap();
        }
        residuals
    }
}

/// Essential matrix `[t]x R` for `x_r = R x_l + t`.
pub fn essential_matrix(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix3<f64> {
    skew(translation) * rotation
}

/// Fundamental matrix `K_r^-T E K_l^-1`, scaled so that `F[(2, 2)] == 1`
/// when that entry is not vanishing, otherwise to unit Frobenius norm.
pub fn fundamental_matrix(
    k_left: &Matrix3<f64>,
    k_right: &Matrix3<f64>,
    essential: &Matrix3<f64>,
) -> Result<Matrix3<f64>, SolverError> {
    let singular = || SolverError::InvalidInput("camera matrix is singular".to_string());
    let kl_inv = k_left.try_inverse().ok_or_else(singular)?;
    let kr_inv = k_right.try_inverse().ok_or_else(singular)?;
    let f = kr_inv.transpose() * essential * kl_inv;
    let scale = if f[(2, 2)].abs() > 1e-12 { f[(2, 2)] } else { f.norm() };
    if scale == 0.0 {
        return Err(SolverError::OptimizationFailed("fundamental matrix vanished".to_string()));
    }
    Ok(f / scale)
}

fn mono_view(pixels: &[Vector2<f64>], world: &[Vector3<f64>]) -> Result<MonoSample, SolverError> {
    MonoSample::new(pixels.to_vec(), world.to_vec())
        .map_err(|e| SolverError::InvalidInput(e.to_string()))
}

/// Estimates the left → right transform from paired samples.
///
/// Each pair gets per-camera target poses; the chordal mean of their relative
/// poses seeds a joint refinement of the relative pose and the left poses.
pub fn calibrate_stereo(input: &StereoSolveInput<'_>) -> Result<StereoSolution, SolverError> {
    if input.pairs.is_empty() {
        return Err(SolverError::InvalidInput("no paired samples".to_string()));
    }
    let left_cam: &IntrinsicParameters = input.left;
    let right_cam: &IntrinsicParameters = input.right;
    let (left_intr, right_intr) = (left_cam.intrinsics(), right_cam.intrinsics());

    let mut views = Vec::with_capacity(input.pairs.len());
    for pair in input.pairs {
        let (Some(left_px), Some(right_px)) = (pair.left_pixel_points(), pair.right_pixel_points())
        else {
            return Err(SolverError::InvalidInput(
                "stereo solve needs samples seen by both cameras".to_string(),
            ));
        };
        let left = mono_view(left_px, pair.world_points())?;
        let right = mono_view(right_px, pair.world_points())?;
        let left_pose = estimate_pose(
            left_cam.camera_model,
            &left_intr,
            &left_cam.distortion,
            &left,
            &input.options,
        )?;
        let right_pose = estimate_pose(
            right_cam.camera_model,
            &right_intr,
            &right_cam.distortion,
            &right,
            &input.options,
        )?;
        views.push((left, right, left_pose, right_pose));
    }

    let relatives: Vec<Isometry3<f64>> = views
        .iter()
        .map(|(_, _, left_pose, right_pose)| right_pose * left_pose.inverse())
        .collect();
    let rotation = mean_rotation(
        &relatives
            .iter()
            .map(|r| r.rotation.to_rotation_matrix())
            .collect::<Vec<_>>(),
    )?;
    let translation = relatives
        .iter()
        .fold(Vector3::zeros(), |acc, r| acc + r.translation.vector)
        / relatives.len() as f64;
    let initial_relative = Isometry3::from_parts(
        Translation3::from(translation),
        UnitQuaternion::from_rotation_matrix(&rotation),
    );
    debug!("Initial left to right transform {initial_relative}");

    let left_camera = FixedCamera::new(&left_intr, &left_cam.distortion);
    let right_camera = FixedCamera::new(&right_intr, &right_cam.distortion);

    let mut problem = tiny_solver::Problem::new();
    let mut initial_values = HashMap::new();
    initial_values.insert(RELATIVE.to_string(), pose_to_params(&initial_relative));

    for (i, (left, right, left_pose, _)) in views.iter().enumerate() {
        let key = left_pose_key(i);
        let left_cost = ReprojectionCost::new(
            left_cam.camera_model,
            left.world_points(),
            left.pixel_points(),
            None,
        )
        .with_fixed_camera(left_camera.clone());
        problem.add_residual_block(
            left_cost.num_residuals(),
            &[key.as_str()],
            Box::new(left_cost),
            None,
        );

        let right_cost = RightReprojectionCost {
            model: right_cam.camera_model,
            camera: right_camera.clone(),
            points3d: right.world_points().to_vec(),
            points2d: right.pixel_points().to_vec(),
        };
        problem.add_residual_block(
            right.len() * 2,
            &[key.as_str(), RELATIVE],
            Box::new(right_cost),
            None,
        );
        initial_values.insert(key, pose_to_params(left_pose));
    }

    info!(
        "Starting stereo refinement over {} pairs with tiny-solver Levenberg-Marquardt...",
        views.len()
    );
    let optimizer = LevenbergMarquardtOptimizer::default();
    let result = optimizer
        .optimize(
            &problem,
            &initial_values,
            Some(optimizer_options(&input.options)),
        )
        .ok_or_else(|| {
            SolverError::OptimizationFailed("stereo refinement did not converge".to_string())
        })?;

    let missing =
        |name: &str| SolverError::OptimizationFailed(format!("solver returned no '{name}'"));
    let relative = result
        .get(RELATIVE)
        .map(pose_from_params)
        .ok_or_else(|| missing(RELATIVE))?;

    let mut squared = Vec::new();
    for (i, (left, right, _, _)) in views.iter().enumerate() {
        let key = left_pose_key(i);
        let left_pose = result
            .get(&key)
            .map(pose_from_params)
            .ok_or_else(|| missing(&key))?;
        let right_pose = relative * left_pose;
        squared.extend(squared_errors(
            left_cam.camera_model,
            &left_intr,
            &left_cam.distortion,
            &left_pose,
            left.world_points(),
            left.pixel_points(),
        ));
        squared.extend(squared_errors(
            right_cam.camera_model,
            &right_intr,
            &right_cam.distortion,
            &right_pose,
            right.world_points(),
            right.pixel_points(),
        ));
    }
    let rms_error = rms(&squared);
    info!("Stereo refinement finished, rms reprojection error {rms_error:.4} px");

    let rotation = *relative.rotation.to_rotation_matrix().matrix();
    let translation = relative.translation.vector;
    let essential = essential_matrix(&rotation, &translation);
    let fundamental = fundamental_matrix(
        &left_cam.camera_matrix,
        &right_cam.camera_matrix,
        &essential,
    )?;

    Ok(StereoSolution {
        rotation,
        translation,
        essential,
        fundamental,
        rms_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Intrinsics, Resolution};
    use crate::geometry::isometry_from_rvec;
    use crate::optimization::SolverOptions;
    use crate::sample::StereoSample;
    use crate::test_utils::{standard_poses, synthetic_view, test_pattern};
    use approx::assert_relative_eq;

    fn params(intrinsics: Intrinsics) -> IntrinsicParameters {
        IntrinsicParameters {
            camera_model: CameraModel::Pinhole,
            resolution: Resolution::new(640, 480),
            camera_matrix: intrinsics.camera_matrix(),
            distortion: vec![0.0; 5],
        }
    }

    #[test]
    fn test_recovers_baseline_and_epipolar_constraint() {
        let left_intr = Intrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        };
        let right_intr = Intrinsics {
            fx: 510.0,
            fy: 505.0,
            cx: 315.0,
            cy: 245.0,
        };
        let left_to_right = isometry_from_rvec(
            &Vector3::new(0.0, 0.02, 0.0),
            &Vector3::new(-0.06, 0.0, 0.0),
        );

        let pattern = test_pattern();
        let pairs: Vec<StereoSample> = standard_poses()
            .iter()
            .map(|pose| {
                let left =
                    synthetic_view(CameraModel::Pinhole, &left_intr, &[0.0; 5], &pattern, pose);
                let right = synthetic_view(
                    CameraModel::Pinhole,
                    &right_intr,
                    &[0.0; 5],
                    &pattern,
                    &(left_to_right * pose),
                );
                StereoSample::new(
                    Some(left.pixel_points().to_vec()),
                    Some(right.pixel_points().to_vec()),
                    pattern.world_points(),
                )
                .unwrap()
            })
            .collect();

        let (left, right) = (params(left_intr), params(right_intr));
        let input = StereoSolveInput {
            left: &left,
            right: &right,
            pairs: &pairs,
            options: SolverOptions::default(),
        };
        let solution = calibrate_stereo(&input).unwrap();

        assert_relative_eq!(
            solution.translation,
            left_to_right.translation.vector,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            solution.rotation,
            *left_to_right.rotation.to_rotation_matrix().matrix(),
            epsilon = 1e-6
        );
        assert_relative_eq!(solution.fundamental[(2, 2)], 1.0, epsilon = 1e-12);
        assert!(solution.rms_error < 1e-4);

        // x_r^T F x_l = 0 for every correspondence
        let pair = &pairs[0];
        let left_points = pair.left_pixel_points().unwrap();
        for (l, r) in left_points.iter().zip(pair.right_pixel_points().unwrap()) {
            let epipolar_line = solution.fundamental * Vector3::new(l.x, l.y, 1.0);
            let residual = Vector3::new(r.x, r.y, 1.0).dot(&epipolar_line);
            assert!(residual.abs() < 1e-4);
        }
    }

    #[test]
    fn test_rejects_unpaired_samples() {
        let world = test_pattern().world_points();
        let pixels = vec![Vector2::new(1.0, 1.0); world.len()];
        let only_left = StereoSample::new(Some(pixels), None, world).unwrap();
        let cam = params(Intrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        });
        let pairs = [only_left];
        let input = StereoSolveInput {
            left: &cam,
            right: &cam,
            pairs: &pairs,
            options: SolverOptions::default(),
        };
        assert!(matches!(
            calibrate_stereo(&input),
            Err(SolverError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_essential_matrix_of_pure_translation() {
        let e = essential_matrix(&Matrix3::identity(), &Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(e, skew(&Vector3::new(1.0, 0.0, 0.0)));
    }
}
