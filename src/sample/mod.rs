//! Observations of a calibration target.
//!
//! A sample pairs the ordered pixel points reported by a detector with the
//! known target points of the pattern it was detected on. Samples are
//! immutable once built.

use crate::pattern::Pattern;
use nalgebra::{Isometry3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("sample has no points")]
    Empty,
    #[error("{pixels} image points but {world} target points")]
    LengthMismatch { pixels: usize, world: usize },
    #[error("stereo sample has neither a left nor a right image")]
    NoImage,
    #[error("sample contains non-finite coordinates")]
    NonFinite,
    #[error("expected a {expected} sample, got a {got} sample")]
    WrongKind {
        expected: &'static str,
        got: &'static str,
    },
}

/// Single-camera observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonoSample {
    pixel_points: Vec<Vector2<f64>>,
    world_points: Vec<Vector3<f64>>,
}

impl MonoSample {
    pub fn new(
        pixel_points: Vec<Vector2<f64>>,
        world_points: Vec<Vector3<f64>>,
    ) -> Result<Self, SampleError> {
        let sample = MonoSample {
            pixel_points,
            world_points,
        };
        sample.validate()?;
        Ok(sample)
    }

    /// Pairs detected pixels with the pattern layout.
    pub fn from_detection(
        pattern: &Pattern,
        pixel_points: Vec<Vector2<f64>>,
    ) -> Result<Self, SampleError> {
        MonoSample::new(pixel_points, pattern.world_points())
    }

    /// Checks the invariants again; needed for samples that were deserialized.
    pub fn validate(&self) -> Result<(), SampleError> {
        check_points(&self.pixel_points, &self.world_points)?;
        if !self.world_points.iter().flatten().all(|v| v.is_finite()) {
            return Err(SampleError::NonFinite);
        }
        Ok(())
    }

    pub fn pixel_points(&self) -> &[Vector2<f64>] {
        &self.pixel_points
    }

    pub fn world_points(&self) -> &[Vector3<f64>] {
        &self.world_points
    }

    pub fn len(&self) -> usize {
        self.pixel_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_points.is_empty()
    }

    /// The image quadrilateral spanned by the target's extremal corners.
    pub fn outline(&self) -> Quadrilateral {
        Quadrilateral::from_extremal_corners(&self.pixel_points, &self.world_points)
    }
}

fn check_points(pixels: &[Vector2<f64>], world: &[Vector3<f64>]) -> Result<(), SampleError> {
    if pixels.len() != world.len() {
        return Err(SampleError::LengthMismatch {
            pixels: pixels.len(),
            world: world.len(),
        });
    }
    if pixels.is_empty() {
        return Err(SampleError::Empty);
    }
    if pixels.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return Err(SampleError::NonFinite);
    }
    Ok(())
}

/// Observation from a stereo rig; either side may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoSample {
    left_pixel_points: Option<Vec<Vector2<f64>>>,
    right_pixel_points: Option<Vec<Vector2<f64>>>,
    world_points: Vec<Vector3<f64>>,
}

impl StereoSample {
    pub fn new(
        left_pixel_points: Option<Vec<Vector2<f64>>>,
        right_pixel_points: Option<Vec<Vector2<f64>>>,
        world_points: Vec<Vector3<f64>>,
    ) -> Result<Self, SampleError> {
        let sample = StereoSample {
            left_pixel_points,
            right_pixel_points,
            world_points,
        };
        sample.validate()?;
        Ok(sample)
    }

    pub fn validate(&self) -> Result<(), SampleError> {
        if self.left_pixel_points.is_none() && self.right_pixel_points.is_none() {
            return Err(SampleError::NoImage);
        }
        for side in [&self.left_pixel_points, &self.right_pixel_points]
            .into_iter()
            .flatten()
        {
            check_points(side, &self.world_points)?;
        }
        if !self.world_points.iter().flatten().all(|v| v.is_finite()) {
            return Err(SampleError::NonFinite);
        }
        Ok(())
    }

    pub fn is_paired(&self) -> bool {
        self.left_pixel_points.is_some() && self.right_pixel_points.is_some()
    }

    pub fn world_points(&self) -> &[Vector3<f64>] {
        &self.world_points
    }

    pub fn left_pixel_points(&self) -> Option<&[Vector2<f64>]> {
        self.left_pixel_points.as_deref()
    }

    pub fn right_pixel_points(&self) -> Option<&[Vector2<f64>]> {
        self.right_pixel_points.as_deref()
    }

    pub fn left(&self) -> Option<MonoSample> {
        self.left_pixel_points.as_ref().map(|pixels| MonoSample {
            pixel_points: pixels.clone(),
            world_points: self.world_points.clone(),
        })
    }

    pub fn right(&self) -> Option<MonoSample> {
        self.right_pixel_points.as_ref().map(|pixels| MonoSample {
            pixel_points: pixels.clone(),
            world_points: self.world_points.clone(),
        })
    }
}

/// Image observation plus the externally tracked base → gripper pose at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandEyeSample {
    pub sample: MonoSample,
    pub pose: Isometry3<f64>,
}

impl HandEyeSample {
    pub fn new(sample: MonoSample, pose: Isometry3<f64>) -> Self {
        HandEyeSample { sample, pose }
    }

    pub fn validate(&self) -> Result<(), SampleError> {
        self.sample.validate()?;
        let t = &self.pose.translation.vector;
        let q = self.pose.rotation.coords;
        if !(t.iter().all(|v| v.is_finite()) && q.iter().all(|v| v.is_finite())) {
            return Err(SampleError::NonFinite);
        }
        Ok(())
    }
}

/// Any sample a calibrator can be offered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sample {
    Mono(MonoSample),
    Stereo(StereoSample),
    HandEye(HandEyeSample),
}

impl Sample {
    pub fn kind(&self) -> &'static str {
        match self {
            Sample::Mono(_) => "mono",
            Sample::Stereo(_) => "stereo",
            Sample::HandEye(_) => "hand_eye",
        }
    }

    pub fn validate(&self) -> Result<(), SampleError> {
        match self {
            Sample::Mono(s) => s.validate(),
            Sample::Stereo(s) => s.validate(),
            Sample::HandEye(s) => s.validate(),
        }
    }
}

impl From<MonoSample> for Sample {
    fn from(sample: MonoSample) -> Self {
        Sample::Mono(sample)
    }
}

impl From<StereoSample> for Sample {
    fn from(sample: StereoSample) -> Self {
        Sample::Stereo(sample)
    }
}

impl From<HandEyeSample> for Sample {
    fn from(sample: HandEyeSample) -> Self {
        Sample::HandEye(sample)
    }
}

/// Pixel images of the four extremal target corners, in the order
/// top-left, top-right, bottom-right, bottom-left of the target frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrilateral {
    pub corners: [Vector2<f64>; 4],
}

impl Quadrilateral {
    /// Extremal corners are the target points minimising/maximising `x + y`
    /// and `x - y` in target coordinates.
    pub fn from_extremal_corners(pixels: &[Vector2<f64>], world: &[Vector3<f64>]) -> Self {
        let pick = |key: &dyn Fn(&Vector3<f64>) -> f64, maximise: bool| -> Vector2<f64> {
            let mut best = 0;
            for (i, p) in world.iter().enumerate() {
                let better = if maximise {
                    key(p) > key(&world[best])
                } else {
                    key(p) < key(&world[best])
                };
                if better {
                    best = i;
                }
            }
            pixels.get(best).copied().unwrap_or_else(Vector2::zeros)
        };

        let sum = |p: &Vector3<f64>| p.x + p.y;
        let diff = |p: &Vector3<f64>| p.x - p.y;
        Quadrilateral {
            corners: [
                pick(&sum, false),
                pick(&diff, true),
                pick(&sum, true),
                pick(&diff, false),
            ],
        }
    }

    /// Shoelace area in square pixels.
    pub fn area(&self) -> f64 {
        let c = &self.corners;
        let twice: f64 = (0..4)
            .map(|i| {
                let a = c[i];
                let b = c[(i + 1) % 4];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice.abs() / 2.0
    }

    /// Apparent size of the target in pixels, `sqrt(area)`.
    pub fn apparent_scale(&self) -> f64 {
        self.area().sqrt()
    }

    /// Mean deviation of the interior angles from 90 degrees.
    pub fn skew_angle(&self) -> f64 {
        let c = &self.corners;
        let total: f64 = (0..4)
            .map(|i| {
                let prev = c[(i + 3) % 4] - c[i];
                let next = c[(i + 1) % 4] - c[i];
                let norms = prev.norm() * next.norm();
                if norms <= f64::EPSILON {
                    return 0.0;
                }
                let cos = (prev.dot(&next) / norms).clamp(-1.0, 1.0);
                (90.0 - cos.acos().to_degrees()).abs()
            })
            .sum();
        total / 4.0
    }
}
