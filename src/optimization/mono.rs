//! Single camera calibration: linear initialisation and joint refinement of
//! intrinsics, distortion and per-sample target poses.

use super::reprojection::{
    pose_from_params, pose_to_params, rms, squared_errors, FixedCamera, ReprojectionCost,
};
use super::{optimizer_options, MonoSolution, MonoSolveInput, SolverError, SolverOptions};
use crate::camera::validation::{validate_distortion, validate_intrinsics};
use crate::camera::{CameraModel, Intrinsics};
use crate::geometry::{find_homography, intrinsics_from_homographies, planar_pose_from_homography};
use crate::sample::MonoSample;

use log::{debug, info};
use nalgebra::{DVector, Isometry3, Matrix3, Vector2};
use std::collections::HashMap;
use tiny_solver::{LevenbergMarquardtOptimizer, Optimizer as TinySolverOptimizer};

const INTRINSICS: &str = "intrinsics";
const DISTORTION: &str = "distortion";

fn pose_key(i: usize) -> String {
    format!("pose_{i}")
}

fn homography_of(sample: &MonoSample) -> Result<Matrix3<f64>, SolverError> {
    let world: Vec<Vector2<f64>> = sample.world_points().iter().map(|p| p.xy()).collect();
    Ok(find_homography(&world, sample.pixel_points())?)
}

/// Initial target poses for a camera matrix, one per homography.
fn initial_poses(
    k: &Matrix3<f64>,
    homographies: &[Matrix3<f64>],
) -> Result<Vec<Isometry3<f64>>, SolverError> {
    homographies
        .iter()
        .map(|h| planar_pose_from_homography(k, h).map_err(SolverError::from))
        .collect()
}

fn total_rms(
    model: CameraModel,
    intrinsics: &Intrinsics,
    distortion: &[f64],
    poses: &[Isometry3<f64>],
    samples: &[MonoSample],
) -> f64 {
    let squared: Vec<f64> = samples
        .iter()
        .zip(poses)
        .flat_map(|(s, pose)| {
            squared_errors(
                model,
                intrinsics,
                distortion,
                pose,
                s.world_points(),
                s.pixel_points(),
            )
        })
        .collect();
    rms(&squared)
}

fn check_input(input: &MonoSolveInput<'_>) -> Result<(), SolverError> {
    if input.samples.is_empty() {
        return Err(SolverError::InvalidInput("no samples to calibrate from".to_string()));
    }
    if let Some(s) = input.samples.iter().find(|s| s.len() < 4) {
        return Err(SolverError::InvalidInput(format!(
            "every sample needs at least 4 points, got {}",
            s.len()
        )));
    }
    let expected = input.camera_model.distortion_len();
    if input.initial_distortion.len() != expected {
        return Err(SolverError::InvalidInput(format!(
            "{} expects {expected} distortion coefficients, got {}",
            input.camera_model,
            input.initial_distortion.len()
        )));
    }
    let max_k = input.camera_model.max_radial_coefficients();
    if input.options.k_coefficients == 0 || input.options.k_coefficients > max_k {
        return Err(SolverError::InvalidInput(format!(
            "{} supports 1 to {max_k} radial coefficients, got {}",
            input.camera_model, input.options.k_coefficients
        )));
    }
    validate_intrinsics(&Intrinsics::from_camera_matrix(&input.initial_camera_matrix))?;
    validate_distortion(&input.initial_distortion)?;
    Ok(())
}

/// Applies the fixed principal point and aspect ratio of `guess` to a candidate.
fn constrain(candidate: Intrinsics, guess: &Intrinsics, options: &SolverOptions) -> Intrinsics {
    let mut out = candidate;
    if options.fix_principal_point {
        out.cx = guess.cx;
        out.cy = guess.cy;
    }
    if options.fix_aspect_ratio {
        out.fy = out.fx * guess.fy / guess.fx;
    }
    out
}

/// Calibrates one camera from planar target samples.
///
/// The supplied camera matrix and Zhang's closed-form estimate are both
/// tried as starting points; the one with the lower initial reprojection
/// error seeds the Levenberg-Marquardt refinement.
pub fn calibrate_camera(input: &MonoSolveInput<'_>) -> Result<MonoSolution, SolverError> {
    check_input(input)?;
    let model = input.camera_model;
    let options = &input.options;
    let guess = Intrinsics::from_camera_matrix(&input.initial_camera_matrix);

    let homographies = input
        .samples
        .iter()
        .map(homography_of)
        .collect::<Result<Vec<_>, _>>()?;

    let mut distortion = input.initial_distortion.clone();
    for idx in model.frozen_distortion_indices(options.k_coefficients) {
        distortion[idx] = 0.0;
    }

    let mut candidates = vec![guess];
    match intrinsics_from_homographies(&homographies) {
        Ok(zhang) => candidates.push(constrain(zhang, &guess, options)),
        Err(e) => debug!("Closed-form intrinsics unavailable, using the supplied guess: {e}"),
    }

    let mut best: Option<(f64, Intrinsics, Vec<Isometry3<f64>>)> = None;
    for candidate in candidates {
        if validate_intrinsics(&candidate).is_err() {
            continue;
        }
        let poses = match initial_poses(&candidate.camera_matrix(), &homographies) {
            Ok(poses) => poses,
            Err(e) => {
                debug!("Skipping initial intrinsics {candidate:?}: {e}");
                continue;
            }
        };
        let error = total_rms(model, &candidate, &distortion, &poses, input.samples);
        if best.as_ref().map_or(true, |(e, _, _)| error < *e) {
            best = Some((error, candidate, poses));
        }
    }
    let (initial_rms, intrinsics, poses) = best.ok_or_else(|| {
        SolverError::OptimizationFailed("no usable initial estimate".to_string())
    })?;
    debug!("Initial intrinsics {intrinsics:?}, rms {initial_rms:.4} px");

    let aspect_ratio = options.fix_aspect_ratio.then(|| guess.fy / guess.fx);
    let intrinsics_params = match aspect_ratio {
        Some(_) => DVector::from_vec(vec![intrinsics.fx, intrinsics.cx, intrinsics.cy]),
        None => DVector::from_row_slice(&intrinsics.to_array()),
    };

    let mut problem = tiny_solver::Problem::new();
    let mut initial_values = HashMap::new();
    initial_values.insert(INTRINSICS.to_string(), intrinsics_params);
    initial_values.insert(
        DISTORTION.to_string(),
        DVector::from_vec(distortion.clone()),
    );

    for (i, (sample, pose)) in input.samples.iter().zip(&poses).enumerate() {
        let key = pose_key(i);
        let cost = ReprojectionCost::new(
            model,
            sample.world_points(),
            sample.pixel_points(),
            aspect_ratio,
        );
        problem.add_residual_block(
            cost.num_residuals(),
            &[INTRINSICS, DISTORTION, key.as_str()],
            Box::new(cost),
            None,
        );
        initial_values.insert(key, pose_to_params(pose));
    }

    if options.fix_principal_point {
        let (cx_idx, cy_idx) = if aspect_ratio.is_some() { (1, 2) } else { (2, 3) };
        problem.fix_variable(INTRINSICS, cx_idx);
        problem.fix_variable(INTRINSICS, cy_idx);
    }
    for idx in model.frozen_distortion_indices(options.k_coefficients) {
        problem.fix_variable(DISTORTION, idx);
    }

    info!(
        "Starting {} calibration over {} samples with tiny-solver Levenberg-Marquardt...",
        model,
        input.samples.len()
    );
    let optimizer = LevenbergMarquardtOptimizer::default();
    let result = optimizer
        .optimize(&problem, &initial_values, Some(optimizer_options(options)))
        .ok_or_else(|| {
            SolverError::OptimizationFailed("Levenberg-Marquardt did not converge".to_string())
        })?;

    let missing =
        |name: &str| SolverError::OptimizationFailed(format!("solver returned no '{name}'"));
    let params = result.get(INTRINSICS).ok_or_else(|| missing(INTRINSICS))?;
    let intrinsics = match aspect_ratio {
        Some(ratio) => Intrinsics {
            fx: params[0],
            fy: params[0] * ratio,
            cx: params[1],
            cy: params[2],
        },
        None => Intrinsics {
            fx: params[0],
            fy: params[1],
            cx: params[2],
            cy: params[3],
        },
    };
    let distortion: Vec<f64> = result
        .get(DISTORTION)
        .ok_or_else(|| missing(DISTORTION))?
        .iter()
        .copied()
        .collect();
    let poses = (0..input.samples.len())
        .map(|i| {
            let key = pose_key(i);
            result
                .get(&key)
                .map(pose_from_params)
                .ok_or_else(|| missing(&key))
        })
        .collect::<Result<Vec<_>, _>>()?;

    validate_intrinsics(&intrinsics)?;
    validate_distortion(&distortion)?;

    let rms_error = total_rms(model, &intrinsics, &distortion, &poses, input.samples);
    info!("Optimization finished, rms reprojection error {rms_error:.4} px");

    Ok(MonoSolution {
        camera_matrix: intrinsics.camera_matrix(),
        distortion,
        rotations: poses.iter().map(|p| p.rotation.scaled_axis()).collect(),
        translations: poses.iter().map(|p| p.translation.vector).collect(),
        rms_error,
    })
}

/// Target pose of one sample seen by a camera with known intrinsics.
pub fn estimate_pose(
    model: CameraModel,
    intrinsics: &Intrinsics,
    distortion: &[f64],
    sample: &MonoSample,
    options: &SolverOptions,
) -> Result<Isometry3<f64>, SolverError> {
    let h = homography_of(sample)?;
    let initial = planar_pose_from_homography(&intrinsics.camera_matrix(), &h)?;

    let mut problem = tiny_solver::Problem::new();
    let cost = ReprojectionCost::new(model, sample.world_points(), sample.pixel_points(), None)
        .with_fixed_camera(FixedCamera::new(intrinsics, distortion));
    problem.add_residual_block(cost.num_residuals(), &["pose"], Box::new(cost), None);

    let mut initial_values = HashMap::new();
    initial_values.insert("pose".to_string(), pose_to_params(&initial));

    let optimizer = LevenbergMarquardtOptimizer::default();
    let result = optimizer
        .optimize(&problem, &initial_values, Some(optimizer_options(options)))
        .ok_or_else(|| {
            SolverError::OptimizationFailed("pose refinement did not converge".to_string())
        })?;
    result
        .get("pose")
        .map(pose_from_params)
        .ok_or_else(|| SolverError::OptimizationFailed("solver returned no 'pose'".to_string()))
}
