//! Calibration outputs and their text serialization.

use crate::camera::{CameraModel, Intrinsics, Resolution};
use nalgebra::{DMatrix, Isometry3, Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-fatal conditions attached to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationWarning {
    /// Calibration was forced before the sample distribution was good.
    InsufficientDistribution,
}

impl fmt::Display for CalibrationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationWarning::InsufficientDistribution => {
                write!(f, "calibrated with an insufficient sample distribution")
            }
        }
    }
}

/// Camera matrix and distortion of one lens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicParameters {
    pub camera_model: CameraModel,
    pub resolution: Resolution,
    pub camera_matrix: Matrix3<f64>,
    pub distortion: Vec<f64>,
}

impl IntrinsicParameters {
    pub fn intrinsics(&self) -> Intrinsics {
        Intrinsics::from_camera_matrix(&self.camera_matrix)
    }

    /// Monocular projection matrix `[K | 0]`.
    pub fn projection_matrix(&self) -> DMatrix<f64> {
        let mut p = DMatrix::zeros(3, 4);
        p.view_mut((0, 0), (3, 3)).copy_from(&self.camera_matrix);
        p
    }
}

/// Formats a matrix as comma separated rows, continuation rows indented to
/// line up after `  data: [`.
fn format_matrix(m: &DMatrix<f64>, precision: usize) -> String {
    let rows: Vec<String> = m
        .row_iter()
        .map(|row| {
            row.iter()
                // adding 0.0 turns -0.0 into 0.0
                .map(|v| format!("{:.*}", precision, v + 0.0))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect();
    format!("[{}]", rows.join(",\n         "))
}

impl fmt::Display for IntrinsicParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let k = DMatrix::from_iterator(3, 3, self.camera_matrix.iter().copied());
        let r = DMatrix::<f64>::identity(3, 3);
        let distortion = self
            .distortion
            .iter()
            .map(|d| format!("{:8.6}", d + 0.0))
            .collect::<Vec<_>>()
            .join(", ");

        writeln!(f, "camera_matrix:")?;
        writeln!(f, "  rows: 3")?;
        writeln!(f, "  cols: 3")?;
        writeln!(f, "  data: {}", format_matrix(&k, 5))?;
        writeln!(
            f,
            "distortion_model: {}",
            self.camera_model.distortion_model_name()
        )?;
        writeln!(f, "distortion_coefficients:")?;
        writeln!(f, "  rows: 1")?;
        writeln!(f, "  cols: {}", self.distortion.len())?;
        writeln!(f, "  data: [{distortion}]")?;
        writeln!(f, "rectification_matrix:")?;
        writeln!(f, "  rows: 3")?;
        writeln!(f, "  cols: 3")?;
        writeln!(f, "  data: {}", format_matrix(&r, 8))?;
        writeln!(f, "projection_matrix:")?;
        writeln!(f, "  rows: 3")?;
        writeln!(f, "  cols: 4")?;
        writeln!(f, "  data: {}", format_matrix(&self.projection_matrix(), 5))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonoCalibration {
    pub intrinsics: IntrinsicParameters,
    /// Per-sample target → camera rotations as Rodrigues vectors.
    pub rotations: Vec<Vector3<f64>>,
    pub translations: Vec<Vector3<f64>>,
    pub rms_error: f64,
    pub warnings: Vec<CalibrationWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoCalibration {
    pub left: MonoCalibration,
    pub right: MonoCalibration,
    /// Rotation taking left camera coordinates to right camera coordinates.
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
    pub rms_error: f64,
    pub warnings: Vec<CalibrationWarning>,
}

impl StereoCalibration {
    /// Extrinsics in the same plain-text layout as the intrinsics.
    pub fn extrinsics_text(&self) -> String {
        let to_dyn = |m: &Matrix3<f64>| DMatrix::from_iterator(3, 3, m.iter().copied());
        let t = DMatrix::from_iterator(3, 1, self.translation.iter().copied());
        let block = |name: &str, rows: usize, cols: usize, m: &DMatrix<f64>| {
            format!(
                "{name}:\n  rows: {rows}\n  cols: {cols}\n  data: {}\n",
                format_matrix(m, 8)
            )
        };
        [
            block("rotation", 3, 3, &to_dyn(&self.rotation)),
            block("translation", 3, 1, &t),
            block("essential_matrix", 3, 3, &to_dyn(&self.essential)),
            block("fundamental_matrix", 3, 3, &to_dyn(&self.fundamental)),
            format!("rms_error: {:.8}\n", self.rms_error),
        ]
        .concat()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandEyeCalibration {
    pub camera: MonoCalibration,
    /// Camera pose expressed in the gripper frame.
    pub gripper_to_camera: Isometry3<f64>,
    pub warnings: Vec<CalibrationWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationResult {
    Mono(MonoCalibration),
    Stereo(StereoCalibration),
    HandEye(HandEyeCalibration),
}

impl CalibrationResult {
    pub fn warnings(&self) -> &[CalibrationWarning] {
        match self {
            CalibrationResult::Mono(r) => &r.warnings,
            CalibrationResult::Stereo(r) => &r.warnings,
            CalibrationResult::HandEye(r) => &r.warnings,
        }
    }

    pub fn rms_error(&self) -> f64 {
        match self {
            CalibrationResult::Mono(r) => r.rms_error,
            CalibrationResult::Stereo(r) => r.rms_error,
            CalibrationResult::HandEye(r) => r.camera.rms_error,
        }
    }

    /// Intrinsics of the (left) camera.
    pub fn primary_intrinsics(&self) -> &IntrinsicParameters {
        match self {
            CalibrationResult::Mono(r) => &r.intrinsics,
            CalibrationResult::Stereo(r) => &r.left.intrinsics,
            CalibrationResult::HandEye(r) => &r.camera.intrinsics,
        }
    }
}
