//! The `optimization` module provides the solver seam used by the calibrators
//! and its default implementation.
//!
//! [`GeometricSolver`] is the interface every calibrator drives: a monocular
//! intrinsic solve, a stereo extrinsic solve with fixed intrinsics, and a
//! hand-eye solve. [`LevenbergMarquardtSolver`] implements it with closed-form
//! initialisation followed by `tiny_solver` Levenberg-Marquardt refinement.
//!
//! The refinement follows the usual two steps:
//! 1. A linear estimation (homographies, Zhang, planar poses, Tsai-Lenz).
//! 2. A non-linear optimisation of all parameters against reprojection error.

use crate::camera::{CameraModel, CameraModelError, Resolution};
use crate::geometry::GeometryError;
use crate::result::IntrinsicParameters;
use crate::sample::{MonoSample, StereoSample};
use nalgebra::{Isometry3, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

pub mod hand_eye;
pub mod mono;
pub mod reprojection;
pub mod stereo;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Invalid solver input: {0}")]
    InvalidInput(String),
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
    #[error("Camera model error: {0}")]
    CameraModel(#[from] CameraModelError),
    #[error("Optimization failed: {0}")]
    OptimizationFailed(String),
}

/// Flags controlling which parameters the solver may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Number of radial distortion terms to estimate; the rest stay zero.
    pub k_coefficients: usize,
    pub fix_principal_point: bool,
    /// Keep `fx / fy` at the ratio of the initial camera matrix.
    pub fix_aspect_ratio: bool,
    pub max_iterations: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            k_coefficients: 2,
            fix_principal_point: false,
            fix_aspect_ratio: false,
            max_iterations: 100,
        }
    }
}

/// Everything needed to calibrate one camera.
#[derive(Debug, Clone)]
pub struct MonoSolveInput<'a> {
    pub camera_model: CameraModel,
    pub resolution: Resolution,
    pub samples: &'a [MonoSample],
    pub initial_camera_matrix: Matrix3<f64>,
    pub initial_distortion: Vec<f64>,
    pub options: SolverOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonoSolution {
    pub camera_matrix: Matrix3<f64>,
    pub distortion: Vec<f64>,
    /// Target → camera rotation of every sample as a Rodrigues vector.
    pub rotations: Vec<Vector3<f64>>,
    pub translations: Vec<Vector3<f64>>,
    pub rms_error: f64,
}

/// Paired observations of a stereo rig with both intrinsics already known.
#[derive(Debug, Clone)]
pub struct StereoSolveInput<'a> {
    pub left: &'a IntrinsicParameters,
    pub right: &'a IntrinsicParameters,
    /// Only samples seen by both cameras.
    pub pairs: &'a [StereoSample],
    pub options: SolverOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StereoSolution {
    /// Rotation from left camera coordinates to right camera coordinates.
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
    pub rms_error: f64,
}

/// The geometric back end consumed by the calibrators.
pub trait GeometricSolver {
    /// Estimates camera matrix, distortion and per-sample target poses.
    fn solve(&self, input: &MonoSolveInput<'_>) -> Result<MonoSolution, SolverError>;

    /// Estimates the relative pose between two calibrated cameras.
    fn solve_stereo(&self, input: &StereoSolveInput<'_>) -> Result<StereoSolution, SolverError>;

    /// Solves `AX = XB` for the camera pose in the gripper frame.
    ///
    /// # Arguments
    ///
    /// * `gripper_poses` - Gripper poses in the robot base frame, one per sample.
    /// * `target_poses` - Target → camera transforms for the same samples.
    fn solve_hand_eye(
        &self,
        gripper_poses: &[Isometry3<f64>],
        target_poses: &[Isometry3<f64>],
    ) -> Result<Isometry3<f64>, SolverError>;
}

/// Default [`GeometricSolver`]: closed-form initialisation refined with
/// `tiny_solver` Levenberg-Marquardt.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardtSolver {
    /// Minimum relative rotation, in degrees, for a pose pair to enter the hand-eye solve.
    pub min_hand_eye_rotation_deg: Option<f64>,
}

impl GeometricSolver for LevenbergMarquardtSolver {
    fn solve(&self, input: &MonoSolveInput<'_>) -> Result<MonoSolution, SolverError> {
        mono::calibrate_camera(input)
    }

    fn solve_stereo(&self, input: &StereoSolveInput<'_>) -> Result<StereoSolution, SolverError> {
        stereo::calibrate_stereo(input)
    }

    fn solve_hand_eye(
        &self,
        gripper_poses: &[Isometry3<f64>],
        target_poses: &[Isometry3<f64>],
    ) -> Result<Isometry3<f64>, SolverError> {
        let min_angle = self
            .min_hand_eye_rotation_deg
            .unwrap_or(hand_eye::DEFAULT_MIN_ROTATION_DEG);
        hand_eye::tsai_lenz(gripper_poses, target_poses, min_angle)
    }
}

pub(crate) fn optimizer_options(options: &SolverOptions) -> tiny_solver::OptimizerOptions {
    tiny_solver::OptimizerOptions {
        max_iteration: options.max_iterations,
        verbosity_level: 0,
        ..Default::default()
    }
}
