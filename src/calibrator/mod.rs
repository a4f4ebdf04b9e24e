//! The `calibrator` module owns accepted samples and drives the solver.
//!
//! Three variants share one contract ([`Calibrator`]):
//!
//! - [`MonoCalibrator`]: one image stream, intrinsics only.
//! - [`StereoCalibrator`]: two owned mono calibrators plus the paired samples
//!   used for the relative pose.
//! - [`HandEyeCalibrator`]: one mono calibrator plus the external pose
//!   recorded with each sample.
//!
//! Every mutation recomputes the cached readiness flag and discards any
//! previous result. A failed solve leaves the previous result in place.

use crate::config::{CalibrationConfig, CalibrationMode, ConfigurationError};
use crate::distribution::DistributionStats;
use crate::optimization::{GeometricSolver, SolverError, SolverOptions};
use crate::result::CalibrationResult;
use crate::sample::{MonoSample, Sample, SampleError};

use log::warn;
use std::fmt;

pub mod hand_eye;
pub mod mono;
pub mod shared;
pub mod stereo;

pub use hand_eye::HandEyeCalibrator;
pub use mono::MonoCalibrator;
pub use shared::SharedCalibrator;
pub use stereo::StereoCalibrator;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("No samples to remove")]
pub struct RemovalError;

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("Sample rejected: {0}")]
    SampleRejected(#[from] SampleError),
    #[error("Calibration not ready: the sample distribution is insufficient")]
    NotReady,
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Removal(#[from] RemovalError),
    #[error("Calibrator is busy calibrating")]
    Busy,
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Where a calibrator is in its collect/calibrate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibratorState {
    Collecting,
    Ready,
    Calibrated,
}

impl fmt::Display for CalibratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibratorState::Collecting => "collecting",
            CalibratorState::Ready => "ready",
            CalibratorState::Calibrated => "calibrated",
        };
        write!(f, "{name}")
    }
}

/// A calibrator of any mode, dispatched by variant.
#[derive(Debug, Clone)]
pub enum Calibrator {
    Mono(MonoCalibrator),
    Stereo(StereoCalibrator),
    HandEye(HandEyeCalibrator),
}

impl Calibrator {
    /// Builds an empty calibrator for the configured mode.
    pub fn from_config(config: &CalibrationConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let options = SolverOptions {
            k_coefficients: config.k_coefficients,
            fix_principal_point: config.fix_principal_point,
            fix_aspect_ratio: config.fix_aspect_ratio,
            max_iterations: config.max_iterations,
        };
        let camera = |model| {
            MonoCalibrator::new(
                model,
                config.resolution,
                config.thresholds.clone(),
                options.clone(),
            )
        };
        Ok(match config.mode {
            CalibrationMode::Intrinsic => Calibrator::Mono(camera(config.camera_model)?),
            CalibrationMode::Stereo => Calibrator::Stereo(StereoCalibrator::new(
                camera(config.camera_model)?,
                camera(config.right_model())?,
                config.min_paired_samples,
                config.approximate,
            )),
            CalibrationMode::HandEye => Calibrator::HandEye(HandEyeCalibrator::new(
                camera(config.camera_model)?,
                config.min_hand_eye_samples,
            )),
        })
    }

    pub fn mode(&self) -> CalibrationMode {
        match self {
            Calibrator::Mono(_) => CalibrationMode::Intrinsic,
            Calibrator::Stereo(_) => CalibrationMode::Stereo,
            Calibrator::HandEye(_) => CalibrationMode::HandEye,
        }
    }

    /// Offers a sample; a sample of the wrong kind for this mode is rejected.
    pub fn maybe_add_sample(&mut self, sample: Sample) -> bool {
        match (self, sample) {
            (Calibrator::Mono(c), Sample::Mono(s)) => c.maybe_add_sample(s),
            (Calibrator::Stereo(c), Sample::Stereo(s)) => c.maybe_add_sample(s),
            (Calibrator::HandEye(c), Sample::HandEye(s)) => c.maybe_add_sample(s),
            (calibrator, sample) => {
                warn!(
                    "Sample rejected: {} sample offered to a {} calibrator",
                    sample.kind(),
                    calibrator.mode()
                );
                false
            }
        }
    }

    pub fn distribution_is_good(&self) -> bool {
        match self {
            Calibrator::Mono(c) => c.distribution_is_good(),
            Calibrator::Stereo(c) => c.distribution_is_good(),
            Calibrator::HandEye(c) => c.distribution_is_good(),
        }
    }

    pub fn remove_most_recent_sample(&mut self) -> Result<(), RemovalError> {
        match self {
            Calibrator::Mono(c) => c.remove_most_recent_sample(),
            Calibrator::Stereo(c) => c.remove_most_recent_sample(),
            Calibrator::HandEye(c) => c.remove_most_recent_sample(),
        }
    }

    /// Runs the solver when ready, or unconditionally with `force`.
    ///
    /// A forced run over an insufficient distribution carries
    /// [`crate::result::CalibrationWarning::InsufficientDistribution`].
    pub fn calibrate<S: GeometricSolver + ?Sized>(
        &mut self,
        solver: &S,
        force: bool,
    ) -> Result<CalibrationResult, CalibrationError> {
        Ok(match self {
            Calibrator::Mono(c) => CalibrationResult::Mono(c.calibrate(solver, force)?),
            Calibrator::Stereo(c) => CalibrationResult::Stereo(c.calibrate(solver, force)?),
            Calibrator::HandEye(c) => CalibrationResult::HandEye(c.calibrate(solver, force)?),
        })
    }

    pub fn last_result(&self) -> Option<CalibrationResult> {
        match self {
            Calibrator::Mono(c) => c.last_result().cloned().map(CalibrationResult::Mono),
            Calibrator::Stereo(c) => c.last_result().cloned().map(CalibrationResult::Stereo),
            Calibrator::HandEye(c) => c.last_result().cloned().map(CalibrationResult::HandEye),
        }
    }

    pub fn state(&self) -> CalibratorState {
        let calibrated = match self {
            Calibrator::Mono(c) => c.last_result().is_some(),
            Calibrator::Stereo(c) => c.last_result().is_some(),
            Calibrator::HandEye(c) => c.last_result().is_some(),
        };
        if calibrated {
            CalibratorState::Calibrated
        } else if self.distribution_is_good() {
            CalibratorState::Ready
        } else {
            CalibratorState::Collecting
        }
    }

    /// Number of accepted samples, counting a stereo frame once.
    pub fn sample_count(&self) -> usize {
        match self {
            Calibrator::Mono(c) => c.samples().len(),
            Calibrator::Stereo(c) => c.sample_count(),
            Calibrator::HandEye(c) => c.sample_count(),
        }
    }

    /// Coverage of the samples that gate the final solve.
    pub fn stats(&self) -> DistributionStats {
        match self {
            Calibrator::Mono(c) => c.stats(),
            Calibrator::Stereo(c) => c.stats(),
            Calibrator::HandEye(c) => c.camera().stats(),
        }
    }

    /// Samples of the primary (left) camera.
    pub fn primary_samples(&self) -> &[MonoSample] {
        match self {
            Calibrator::Mono(c) => c.samples(),
            Calibrator::Stereo(c) => c.left().samples(),
            Calibrator::HandEye(c) => c.camera().samples(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::camera::{CameraModel, Resolution};
    use crate::distribution::DistributionThresholds;
    use crate::optimization::{MonoSolution, MonoSolveInput, StereoSolution, StereoSolveInput};
    use crate::result::CalibrationWarning;
    use crate::sample::{HandEyeSample, StereoSample};
    use crate::test_utils::{rectangle_sample, trapezoid_sample};
    use nalgebra::{Isometry3, Matrix3, Vector3};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Solver returning canned values and counting its calls.
    #[derive(Default)]
    pub(crate) struct MockSolver {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl MockSolver {
        pub fn failing() -> Self {
            MockSolver {
                fail: true,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn count(&self) -> Result<(), SolverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SolverError::OptimizationFailed("did not converge".to_string()));
            }
            Ok(())
        }
    }

    impl GeometricSolver for MockSolver {
        fn solve(&self, input: &MonoSolveInput<'_>) -> Result<MonoSolution, SolverError> {
            self.count()?;
            let n = input.samples.len();
            Ok(MonoSolution {
                camera_matrix: input.initial_camera_matrix,
                distortion: input.initial_distortion.clone(),
                rotations: vec![Vector3::new(0.1, 0.0, 0.0); n],
                translations: vec![Vector3::new(0.0, 0.0, 1.0); n],
                rms_error: 0.25,
            })
        }

        fn solve_stereo(
            &self,
            _input: &StereoSolveInput<'_>,
        ) -> Result<StereoSolution, SolverError> {
            self.count()?;
            Ok(StereoSolution {
                rotation: Matrix3::identity(),
                translation: Vector3::new(-0.06, 0.0, 0.0),
                essential: Matrix3::zeros(),
                fundamental: Matrix3::zeros(),
                rms_error: 0.5,
            })
        }

        fn solve_hand_eye(
            &self,
            gripper_poses: &[Isometry3<f64>],
            target_poses: &[Isometry3<f64>],
        ) -> Result<Isometry3<f64>, SolverError> {
            self.count()?;
            assert_eq!(gripper_poses.len(), target_poses.len());
            Ok(Isometry3::translation(0.0, 0.0, 0.1))
        }
    }

    pub(crate) fn mono() -> MonoCalibrator {
        MonoCalibrator::new(
            CameraModel::Pinhole,
            Resolution::new(640, 480),
            DistributionThresholds::default(),
            SolverOptions::default(),
        )
        .unwrap()
    }

    /// Ten samples that meet every default threshold once all are added;
    /// the first nine hold 486 points.
    pub(crate) fn diverse_samples() -> Vec<MonoSample> {
        let mut samples = Vec::new();
        samples.extend((0..4).map(|_| rectangle_sample(10.0, 10.0, 630.0, 470.0)));
        samples.extend((0..3).map(|_| rectangle_sample(100.0, 80.0, 540.0, 400.0)));
        samples.extend((0..3).map(|_| trapezoid_sample()));
        samples
    }

    fn ready_mono() -> Calibrator {
        let mut calibrator = Calibrator::Mono(mono());
        for sample in diverse_samples() {
            assert!(calibrator.maybe_add_sample(sample.into()));
        }
        calibrator
    }

    fn paired(sample: &MonoSample) -> StereoSample {
        StereoSample::new(
            Some(sample.pixel_points().to_vec()),
            Some(sample.pixel_points().to_vec()),
            sample.world_points().to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn test_tenth_sample_makes_distribution_good() {
        let mut calibrator = Calibrator::Mono(mono());
        let samples = diverse_samples();
        for sample in &samples[..9] {
            assert!(calibrator.maybe_add_sample(sample.clone().into()));
        }
        assert_eq!(calibrator.stats().total_points, 486);
        assert!(!calibrator.distribution_is_good());
        assert_eq!(calibrator.state(), CalibratorState::Collecting);

        assert!(calibrator.maybe_add_sample(samples[9].clone().into()));
        assert_eq!(calibrator.stats().total_points, 540);
        assert!(calibrator.distribution_is_good());
        assert!(calibrator.distribution_is_good());
        assert_eq!(calibrator.state(), CalibratorState::Ready);
    }

    #[test]
    fn test_invalid_sample_is_rejected_without_mutation() {
        let mut calibrator = Calibrator::Mono(mono());
        let json = r#"{"pixel_points":[[1.0,1.0],[2.0,2.0]],"world_points":[[0.0,0.0,0.0]]}"#;
        let mismatched: MonoSample = serde_json::from_str(json).unwrap();
        assert!(!calibrator.maybe_add_sample(mismatched.into()));
        assert_eq!(calibrator.sample_count(), 0);
        assert_eq!(calibrator.stats().total_points, 0);
    }

    #[test]
    fn test_wrong_sample_kind_is_rejected() {
        let mut calibrator = Calibrator::Mono(mono());
        let sample = paired(&trapezoid_sample());
        assert!(!calibrator.maybe_add_sample(sample.into()));
        assert_eq!(calibrator.sample_count(), 0);
    }

    #[test]
    fn test_redundant_sample_is_skipped_once_ready() {
        let mut calibrator = ready_mono();
        assert!(!calibrator.maybe_add_sample(rectangle_sample(10.0, 10.0, 630.0, 470.0).into()));
        assert_eq!(calibrator.sample_count(), 10);
        // A much smaller board extends the scale range.
        assert!(calibrator.maybe_add_sample(rectangle_sample(280.0, 200.0, 360.0, 280.0).into()));
        assert_eq!(calibrator.sample_count(), 11);
    }

    #[test]
    fn test_unforced_calibrate_when_not_ready_calls_no_solver() {
        let solver = MockSolver::default();
        let mut calibrator = Calibrator::Mono(mono());
        calibrator.maybe_add_sample(trapezoid_sample().into());
        let result = calibrator.calibrate(&solver, false);
        assert!(matches!(result, Err(CalibrationError::NotReady)));
        assert_eq!(solver.calls(), 0);
        assert!(calibrator.last_result().is_none());
    }

    #[test]
    fn test_forced_calibrate_carries_warning() {
        let solver = MockSolver::default();
        let mut calibrator = Calibrator::Mono(mono());
        calibrator.maybe_add_sample(trapezoid_sample().into());
        let result = calibrator.calibrate(&solver, true).unwrap();
        assert_eq!(solver.calls(), 1);
        assert_eq!(
            result.warnings(),
            &[CalibrationWarning::InsufficientDistribution]
        );
        assert_eq!(calibrator.state(), CalibratorState::Calibrated);
    }

    #[test]
    fn test_ready_calibrate_stores_result_without_warning() {
        let solver = MockSolver::default();
        let mut calibrator = ready_mono();
        let first = calibrator.calibrate(&solver, false).unwrap();
        assert!(first.warnings().is_empty());
        assert_eq!(calibrator.last_result(), Some(first.clone()));

        let second = calibrator.calibrate(&solver, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(solver.calls(), 2);
    }

    #[test]
    fn test_mutation_invalidates_result() {
        let solver = MockSolver::default();
        let mut calibrator = ready_mono();
        calibrator.calibrate(&solver, false).unwrap();
        calibrator.remove_most_recent_sample().unwrap();
        assert!(calibrator.last_result().is_none());
        assert_eq!(calibrator.state(), CalibratorState::Collecting);

        calibrator.maybe_add_sample(trapezoid_sample().into());
        assert_eq!(calibrator.state(), CalibratorState::Ready);
        calibrator.calibrate(&solver, false).unwrap();
        calibrator.maybe_add_sample(rectangle_sample(280.0, 200.0, 360.0, 280.0).into());
        assert!(calibrator.last_result().is_none());
    }

    #[test]
    fn test_solver_failure_keeps_previous_result() {
        let mut calibrator = ready_mono();
        let previous = calibrator.calibrate(&MockSolver::default(), false).unwrap();
        let failing = MockSolver::failing();
        let result = calibrator.calibrate(&failing, false);
        assert!(matches!(result, Err(CalibrationError::Solver(_))));
        assert_eq!(failing.calls(), 1);
        assert_eq!(calibrator.last_result(), Some(previous));
    }

    #[test]
    fn test_remove_from_empty_calibrator_fails() {
        let mut calibrator = Calibrator::Mono(mono());
        assert_eq!(calibrator.remove_most_recent_sample(), Err(RemovalError));
        assert_eq!(calibrator.state(), CalibratorState::Collecting);
    }

    #[test]
    fn test_stereo_routes_single_sided_samples() {
        let mut stereo = StereoCalibrator::new(mono(), mono(), 5, 0.0);
        let samples = diverse_samples();
        for sample in &samples[..5] {
            assert!(stereo.maybe_add_sample(paired(sample)));
        }
        let left_only = StereoSample::new(
            Some(samples[5].pixel_points().to_vec()),
            None,
            samples[5].world_points().to_vec(),
        )
        .unwrap();
        assert!(stereo.maybe_add_sample(left_only));

        assert_eq!(stereo.left().samples().len(), 6);
        assert_eq!(stereo.right().samples().len(), 5);
        assert_eq!(stereo.pairs().len(), 5);
        assert_eq!(stereo.sample_count(), 6);
        assert_eq!(stereo.left().stats().total_points, 6 * 54);
        assert_eq!(stereo.right().stats().total_points, 5 * 54);

        stereo.remove_most_recent_sample().unwrap();
        assert_eq!(stereo.left().samples().len(), 5);
        assert_eq!(stereo.right().samples().len(), 5);
        assert_eq!(stereo.pairs().len(), 5);
    }

    #[test]
    fn test_stereo_ready_needs_both_cameras_and_pairs() {
        let mut stereo = StereoCalibrator::new(mono(), mono(), 11, 0.0);
        for sample in diverse_samples() {
            stereo.maybe_add_sample(paired(&sample));
        }
        assert!(stereo.left().distribution_is_good());
        assert!(stereo.right().distribution_is_good());
        assert!(!stereo.distribution_is_good());

        let mut stereo = StereoCalibrator::new(mono(), mono(), 5, 0.0);
        for sample in diverse_samples() {
            stereo.maybe_add_sample(paired(&sample));
        }
        assert!(stereo.distribution_is_good());
    }

    #[test]
    fn test_stereo_calibrate_solves_each_camera_then_extrinsics() {
        let solver = MockSolver::default();
        let mut calibrator = Calibrator::Stereo(StereoCalibrator::new(mono(), mono(), 5, 0.0));
        for sample in diverse_samples() {
            calibrator.maybe_add_sample(paired(&sample).into());
        }
        let result = calibrator.calibrate(&solver, false).unwrap();
        assert_eq!(solver.calls(), 3);
        match result {
            CalibrationResult::Stereo(stereo) => {
                assert_eq!(stereo.translation, Vector3::new(-0.06, 0.0, 0.0));
                assert_eq!(stereo.left.rotations.len(), 10);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_stereo_failure_does_not_commit_intrinsics() {
        struct StereoFails(MockSolver);
        impl GeometricSolver for StereoFails {
            fn solve(&self, input: &MonoSolveInput<'_>) -> Result<MonoSolution, SolverError> {
                self.0.solve(input)
            }
            fn solve_stereo(
                &self,
                _: &StereoSolveInput<'_>,
            ) -> Result<StereoSolution, SolverError> {
                Err(SolverError::InvalidInput("degenerate pairs".to_string()))
            }
            fn solve_hand_eye(
                &self,
                g: &[Isometry3<f64>],
                t: &[Isometry3<f64>],
            ) -> Result<Isometry3<f64>, SolverError> {
                self.0.solve_hand_eye(g, t)
            }
        }

        let mut stereo = StereoCalibrator::new(mono(), mono(), 5, 0.0);
        for sample in diverse_samples() {
            stereo.maybe_add_sample(paired(&sample));
        }
        let result = stereo.calibrate(&StereoFails(MockSolver::default()), false);
        assert!(result.is_err());
        assert!(stereo.last_result().is_none());
        assert!(stereo.left().last_result().is_none());
        assert!(stereo.right().last_result().is_none());
    }

    #[test]
    fn test_hand_eye_pairs_poses_with_samples() {
        let solver = MockSolver::default();
        let mut calibrator = Calibrator::HandEye(HandEyeCalibrator::new(mono(), 3));
        for (i, sample) in diverse_samples().into_iter().enumerate() {
            let pose = Isometry3::translation(0.1 * i as f64, 0.0, 0.5);
            assert!(calibrator.maybe_add_sample(HandEyeSample::new(sample, pose).into()));
        }
        assert!(calibrator.distribution_is_good());
        let result = calibrator.calibrate(&solver, false).unwrap();
        assert_eq!(solver.calls(), 2);
        match result {
            CalibrationResult::HandEye(hand_eye) => {
                assert_eq!(
                    hand_eye.gripper_to_camera,
                    Isometry3::translation(0.0, 0.0, 0.1)
                );
                assert_eq!(hand_eye.camera.rotations.len(), 10);
            }
            other => panic!("unexpected result {other:?}"),
        }

        if let Calibrator::HandEye(c) = &mut calibrator {
            c.remove_most_recent_sample().unwrap();
            assert_eq!(c.poses().len(), 9);
            assert_eq!(c.camera().samples().len(), 9);
        }
    }

    #[test]
    fn test_from_config_builds_requested_mode() {
        let config = CalibrationConfig {
            mode: CalibrationMode::Stereo,
            right_camera_model: Some(CameraModel::Fisheye),
            ..Default::default()
        };
        let calibrator = Calibrator::from_config(&config).unwrap();
        assert_eq!(calibrator.mode(), CalibrationMode::Stereo);
        if let Calibrator::Stereo(c) = &calibrator {
            assert_eq!(c.left().camera_model(), CameraModel::Pinhole);
            assert_eq!(c.right().camera_model(), CameraModel::Fisheye);
        }

        let bad = CalibrationConfig {
            k_coefficients: 4,
            ..Default::default()
        };
        assert!(Calibrator::from_config(&bad).is_err());
    }

    #[test]
    fn test_stereo_keeps_pair_when_left_view_is_redundant() {
        let mut stereo = StereoCalibrator::new(mono(), mono(), 5, 0.0);
        for sample in diverse_samples() {
            assert!(stereo.maybe_add_sample(paired(&sample)));
        }
        assert!(stereo.distribution_is_good());

        let redundant = rectangle_sample(10.0, 10.0, 630.0, 470.0);
        let small = rectangle_sample(200.0, 200.0, 300.0, 300.0);
        let pair = StereoSample::new(
            Some(redundant.pixel_points().to_vec()),
            Some(small.pixel_points().to_vec()),
            redundant.world_points().to_vec(),
        )
        .unwrap();
        assert!(stereo.maybe_add_sample(pair));
        assert_eq!(stereo.left().samples().len(), 10);
        assert_eq!(stereo.right().samples().len(), 11);
        assert_eq!(stereo.pairs().len(), 11);

        stereo.remove_most_recent_sample().unwrap();
        assert_eq!(stereo.left().samples().len(), 10);
        assert_eq!(stereo.right().samples().len(), 10);
        assert_eq!(stereo.pairs().len(), 10);
    }

    #[test]
    fn test_stereo_keeps_pair_redundant_for_both_cameras() {
        let mut stereo = StereoCalibrator::new(mono(), mono(), 5, 0.0);
        for sample in diverse_samples() {
            stereo.maybe_add_sample(paired(&sample));
        }
        assert!(stereo.maybe_add_sample(paired(&rectangle_sample(10.0, 10.0, 630.0, 470.0))));
        assert_eq!(stereo.left().samples().len(), 10);
        assert_eq!(stereo.right().samples().len(), 10);
        assert_eq!(stereo.pairs().len(), 11);
        assert_eq!(stereo.sample_count(), 11);
    }

    #[test]
    fn test_empty_distribution_grid_is_rejected_at_construction() {
        let thresholds = DistributionThresholds {
            grid_rows: 0,
            ..Default::default()
        };
        let camera = MonoCalibrator::new(
            CameraModel::Pinhole,
            Resolution::new(640, 480),
            thresholds.clone(),
            SolverOptions::default(),
        );
        assert!(matches!(camera, Err(ConfigurationError::Invalid(_))));

        let config = CalibrationConfig {
            thresholds,
            ..Default::default()
        };
        assert!(Calibrator::from_config(&config).is_err());
    }

    #[test]
    fn test_hand_eye_needs_minimum_pose_count() {
        let solver = MockSolver::default();
        let mut calibrator = Calibrator::HandEye(HandEyeCalibrator::new(mono(), 11));
        for (i, sample) in diverse_samples().into_iter().enumerate() {
            let pose = Isometry3::translation(0.1 * i as f64, 0.0, 0.5);
            assert!(calibrator.maybe_add_sample(HandEyeSample::new(sample, pose).into()));
        }
        if let Calibrator::HandEye(c) = &calibrator {
            assert!(c.camera().distribution_is_good());
            assert_eq!(c.poses().len(), 10);
        }
        assert!(!calibrator.distribution_is_good());
        assert!(matches!(
            calibrator.calibrate(&solver, false),
            Err(CalibrationError::NotReady)
        ));
        assert_eq!(solver.calls(), 0);

        // Coverage is already good, but the extra pose is still wanted.
        let repeat = HandEyeSample::new(
            rectangle_sample(10.0, 10.0, 630.0, 470.0),
            Isometry3::translation(0.0, 0.2, 0.5),
        );
        assert!(calibrator.maybe_add_sample(repeat.into()));
        assert!(calibrator.distribution_is_good());
        assert!(calibrator.calibrate(&solver, false).is_ok());
        assert_eq!(solver.calls(), 2);
    }
}
