//! Camera intrinsics, image resolution and the two lens models the
//! calibrator can estimate.
//!
//! The projection functions are generic over [`nalgebra::RealField`] so the
//! same code drives both plain `f64` evaluation (reprojection statistics) and
//! the automatic differentiation used by the `tiny_solver` cost functions.

use nalgebra::{Matrix3, RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod kannala_brandt;
pub mod pinhole;

/// Focal lengths and principal point in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    /// Reads `fx`, `fy`, `cx`, `cy` out of a 3×3 camera matrix.
    pub fn from_camera_matrix(k: &Matrix3<f64>) -> Self {
        Intrinsics {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    /// Builds the zero-skew camera matrix `K`.
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.fx, self.fy, self.cx, self.cy]
    }
}

/// Image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Resolution { width, height }
    }

    /// Initial camera matrix used before any calibration exists: principal
    /// point at the image centre, focal length equal to the larger image side.
    pub fn initial_camera_matrix(&self) -> Matrix3<f64> {
        let focal = self.width.max(self.height) as f64;
        Intrinsics {
            fx: focal,
            fy: focal,
            cx: self.width as f64 / 2.0,
            cy: self.height as f64 / 2.0,
        }
        .camera_matrix()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraModelError {
    #[error("z is close to zero, point is at camera center")]
    PointAtCameraCenter,
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("Principal point must be finite")]
    PrincipalPointMustBeFinite,
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
}

/// Lens model the solver fits.
///
/// `Pinhole` uses the plumb-bob (Brown-Conrady) distortion `[k1, k2, p1, p2, k3]`,
/// `Fisheye` the equidistant Kannala-Brandt polynomial `[k1, k2, k3, k4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraModel {
    Pinhole,
    Fisheye,
}

impl CameraModel {
    /// Name written to the `distortion_model` field of the text output.
    pub fn distortion_model_name(&self) -> &'static str {
        match self {
            CameraModel::Pinhole => "plumb_bob",
            CameraModel::Fisheye => "equidistant",
        }
    }

    /// Length of the distortion vector for this model.
    pub fn distortion_len(&self) -> usize {
        match self {
            CameraModel::Pinhole => 5,
            CameraModel::Fisheye => 4,
        }
    }

    /// Indices of the radial terms inside the distortion vector, lowest order first.
    pub fn radial_indices(&self) -> &'static [usize] {
        match self {
            CameraModel::Pinhole => &[0, 1, 4],
            CameraModel::Fisheye => &[0, 1, 2, 3],
        }
    }

    pub fn max_radial_coefficients(&self) -> usize {
        self.radial_indices().len()
    }

    /// Distortion indices that stay fixed at zero when only `k` radial terms are estimated.
    pub fn frozen_distortion_indices(&self, k: usize) -> Vec<usize> {
        self.radial_indices().iter().skip(k).copied().collect()
    }

    /// Projects a point in camera coordinates to pixels.
    ///
    /// `intrinsics` is `[fx, fy, cx, cy]`; `distortion` is interpreted per model
    /// and missing trailing coefficients count as zero.
    pub fn project<T: RealField>(
        &self,
        intrinsics: &[T],
        distortion: &[T],
        point: &Vector3<T>,
    ) -> Vector2<T> {
        match self {
            CameraModel::Pinhole => pinhole::project(intrinsics, distortion, point),
            CameraModel::Fisheye => kannala_brandt::project(intrinsics, distortion, point),
        }
    }

    /// `f64` projection that rejects points behind or at the camera centre.
    pub fn project_checked(
        &self,
        intrinsics: &Intrinsics,
        distortion: &[f64],
        point: &Vector3<f64>,
    ) -> Result<Vector2<f64>, CameraModelError> {
        if point.z < f64::EPSILON.sqrt() {
            return Err(CameraModelError::PointAtCameraCenter);
        }
        Ok(self.project(&intrinsics.to_array(), distortion, point))
    }
}

impl fmt::Display for CameraModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraModel::Pinhole => write!(f, "pinhole"),
            CameraModel::Fisheye => write!(f, "fisheye"),
        }
    }
}

impl FromStr for CameraModel {
    type Err = CameraModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pinhole" => Ok(CameraModel::Pinhole),
            "fisheye" => Ok(CameraModel::Fisheye),
            other => Err(CameraModelError::InvalidParams(format!(
                "unknown camera model '{other}', expected pinhole or fisheye"
            ))),
        }
    }
}

/// Reads coefficient `i`, treating absent trailing entries as zero.
pub(crate) fn coefficient<T: RealField>(values: &[T], i: usize) -> T {
    values.get(i).cloned().unwrap_or_else(T::zero)
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), CameraModelError> {
        if !(intrinsics.fx > 0.0 && intrinsics.fy > 0.0)
            || !intrinsics.fx.is_finite()
            || !intrinsics.fy.is_finite()
        {
            return Err(CameraModelError::FocalLengthMustBePositive);
        }
        if !intrinsics.cx.is_finite() || !intrinsics.cy.is_finite() {
            return Err(CameraModelError::PrincipalPointMustBeFinite);
        }
        Ok(())
    }

    pub fn validate_distortion(distortion: &[f64]) -> Result<(), CameraModelError> {
        if distortion.iter().any(|d| !d.is_finite()) {
            return Err(CameraModelError::InvalidParams(
                "distortion coefficients must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_initial_camera_matrix_is_centred() {
        let k = Resolution::new(640, 480).initial_camera_matrix();
        assert_relative_eq!(k[(0, 0)], 640.0);
        assert_relative_eq!(k[(1, 1)], 640.0);
        assert_relative_eq!(k[(0, 2)], 320.0);
        assert_relative_eq!(k[(1, 2)], 240.0);
        assert_relative_eq!(k[(2, 2)], 1.0);
    }

    #[test]
    fn test_frozen_indices_follow_radial_order() {
        assert_eq!(CameraModel::Pinhole.frozen_distortion_indices(2), vec![4]);
        assert_eq!(
            CameraModel::Pinhole.frozen_distortion_indices(3),
            Vec::<usize>::new()
        );
        assert_eq!(
            CameraModel::Fisheye.frozen_distortion_indices(1),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_camera_model_parse() {
        assert_eq!(
            "Pinhole".parse::<CameraModel>().unwrap(),
            CameraModel::Pinhole
        );
        assert_eq!(
            "fisheye".parse::<CameraModel>().unwrap(),
            CameraModel::Fisheye
        );
        assert!("ucm".parse::<CameraModel>().is_err());
    }

    #[test]
    fn test_validate_intrinsics() {
        let good = Intrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        };
        assert!(validation::validate_intrinsics(&good).is_ok());
        let bad = Intrinsics { fx: -1.0, ..good };
        assert_eq!(
            validation::validate_intrinsics(&bad),
            Err(CameraModelError::FocalLengthMustBePositive)
        );
        let nan = Intrinsics {
            cx: f64::NAN,
            ..good
        };
        assert_eq!(
            validation::validate_intrinsics(&nan),
            Err(CameraModelError::PrincipalPointMustBeFinite)
        );
    }

    #[test]
    fn test_project_checked_rejects_camera_center() {
        let intr = Intrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        };
        let result =
            CameraModel::Pinhole.project_checked(&intr, &[0.0; 5], &Vector3::new(1.0, 1.0, 0.0));
        assert_eq!(result, Err(CameraModelError::PointAtCameraCenter));
    }
}
