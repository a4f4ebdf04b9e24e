use crate::camera::CameraModelError;
use crate::geometry::isometry_from_rvec;
use crate::result::MonoCalibration;
use crate::sample::MonoSample;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Ensure the output directory exists
pub fn ensure_output_dir<P: AsRef<Path>>(output_dir: P) -> Result<(), UtilError> {
    let output_dir = output_dir.as_ref();
    if !output_dir.exists() {
        fs::create_dir_all(output_dir).map_err(|e| {
            UtilError::InvalidParams(format!("Failed to create output directory: {e}"))
        })?;
    }
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum UtilError {
    #[error("Numerical error in computation: {0}")]
    NumericalError(String),
    #[error("Zero projection points")]
    ZeroProjectionPoints,
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

/// Reprojection error statistics of a calibration over the samples it was computed from.
///
/// # Arguments
///
/// * `calibration` - Intrinsics and per-sample target poses.
/// * `samples` - The samples, in the order the poses were estimated.
///
/// # Returns
///
/// * `Result<ProjectionError, UtilError>` - Error statistics in pixels
pub fn compute_reprojection_error(
    calibration: &MonoCalibration,
    samples: &[MonoSample],
) -> Result<ProjectionError, UtilError> {
    if calibration.rotations.len() != samples.len() {
        return Err(UtilError::InvalidParams(format!(
            "{} poses for {} samples",
            calibration.rotations.len(),
            samples.len()
        )));
    }

    let model = calibration.intrinsics.camera_model;
    let intrinsics = calibration.intrinsics.intrinsics();
    let distortion = &calibration.intrinsics.distortion;
    let mut errors = vec![];
    for ((sample, rvec), tvec) in samples
        .iter()
        .zip(&calibration.rotations)
        .zip(&calibration.translations)
    {
        let pose = isometry_from_rvec(rvec, tvec);
        for (world, pixel) in sample.world_points().iter().zip(sample.pixel_points()) {
            let point3d = pose * nalgebra::Point3::from(*world);
            if let Ok(projected) = model.project_checked(&intrinsics, distortion, &point3d.coords) {
                errors.push((projected - pixel).norm());
            }
        }
    }

    if errors.is_empty() {
        return Err(UtilError::ZeroProjectionPoints);
    }

    let n = errors.len() as f64;
    let mean = errors.iter().sum::<f64>() / n;
    let variance: f64 = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let rmse = (errors.iter().map(|x| x.powi(2)).sum::<f64>() / n).sqrt();

    let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let mut sorted_errors = errors;
    sorted_errors.sort_by(|a, b| a.total_cmp(b));
    let median = if sorted_errors.len() % 2 == 0 {
        let mid = sorted_errors.len() / 2;
        (sorted_errors[mid - 1] + sorted_errors[mid]) / 2.0
    } else {
        sorted_errors[sorted_errors.len() / 2]
    };

    Ok(ProjectionError {
        rmse,
        min,
        max,
        mean,
        stddev,
        median,
    })
}

#[derive(Debug, Serialize)]
struct CorrespondenceRecord {
    sample: usize,
    x3d: f64,
    y3d: f64,
    z3d: f64,
    x2d: f64,
    y2d: f64,
}

/// Export point correspondences of every sample to a CSV file
///
/// # Arguments
///
/// * `samples` - Samples whose correspondences are written, one row per point
/// * `path` - Destination CSV file
pub fn export_point_correspondences<P: AsRef<Path>>(
    samples: &[MonoSample],
    path: P,
) -> Result<(), UtilError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        ensure_output_dir(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    let mut total = 0;
    for (index, sample) in samples.iter().enumerate() {
        for (world, pixel) in sample.world_points().iter().zip(sample.pixel_points()) {
            writer.serialize(CorrespondenceRecord {
                sample: index,
                x3d: world.x,
                y3d: world.y,
                z3d: world.z,
                x2d: pixel.x,
                y2d: pixel.y,
            })?;
            total += 1;
        }
    }
    writer.flush()?;

    info!(
        "Exported {total} point correspondences to {}",
        path.display()
    );
    Ok(())
}

impl From<CameraModelError> for UtilError {
    fn from(err: CameraModelError) -> Self {
        UtilError::NumericalError(err.to_string())
    }
}
