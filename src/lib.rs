//! Camera Calibration Library
//!
//! Collects 2D/3D correspondences from a calibration target, decides when the
//! collected samples cover the image and the range of target distances and
//! tilts well enough, and then calibrates:
//! - a single camera (pinhole with plumb_bob distortion, or fisheye with
//!   equidistant distortion)
//! - a stereo pair, including the relative pose and epipolar matrices
//! - a camera mounted on a robot gripper (hand-eye)
//!
//! The default solver initialises with closed-form estimates and refines them
//! with the tiny-solver Levenberg-Marquardt optimizer.

pub mod calibrator;
pub mod camera;
pub mod config;
pub mod detections;
pub mod distribution;
pub mod geometry;
pub mod optimization;
pub mod pattern;
pub mod result;
pub mod sample;
pub mod session;
pub mod util;

// Re-export commonly used types
pub use calibrator::{
    CalibrationError, Calibrator, CalibratorState, HandEyeCalibrator, MonoCalibrator,
    RemovalError, SharedCalibrator, StereoCalibrator,
};
pub use camera::{CameraModel, CameraModelError, Intrinsics, Resolution};
pub use config::{CalibrationConfig, CalibrationMode, ConfigurationError};
pub use distribution::{DistributionStats, DistributionThresholds, DistributionTracker};
pub use optimization::{GeometricSolver, LevenbergMarquardtSolver, SolverError, SolverOptions};
pub use pattern::{Pattern, PatternDetector, PatternType};
pub use result::{CalibrationResult, CalibrationWarning, IntrinsicParameters};
pub use sample::{HandEyeSample, MonoSample, Sample, SampleError, StereoSample};
pub use session::{CalibrationSession, SessionCommand, SessionEvent};
