use super::mono::{Admission, MonoCalibrator};
use super::{CalibrationError, RemovalError};
use crate::geometry::isometry_from_rvec;
use crate::optimization::GeometricSolver;
use crate::result::{CalibrationWarning, HandEyeCalibration};
use crate::sample::HandEyeSample;

use log::{debug, info, warn};
use nalgebra::Isometry3;

/// One camera plus the gripper pose recorded with each of its samples.
#[derive(Debug, Clone)]
pub struct HandEyeCalibrator {
    camera: MonoCalibrator,
    /// Gripper poses in the robot base frame, 1:1 with the camera's samples.
    poses: Vec<Isometry3<f64>>,
    min_hand_eye_samples: usize,
    ready: bool,
    last_result: Option<HandEyeCalibration>,
}

impl HandEyeCalibrator {
    pub fn new(camera: MonoCalibrator, min_hand_eye_samples: usize) -> Self {
        HandEyeCalibrator {
            camera,
            poses: Vec::new(),
            min_hand_eye_samples,
            ready: false,
            last_result: None,
        }
    }

    pub fn camera(&self) -> &MonoCalibrator {
        &self.camera
    }

    pub fn poses(&self) -> &[Isometry3<f64>] {
        &self.poses
    }

    pub fn last_result(&self) -> Option<&HandEyeCalibration> {
        self.last_result.as_ref()
    }

    fn recompute_ready(&mut self) {
        self.ready =
            self.camera.distribution_is_good() && self.poses.len() >= self.min_hand_eye_samples;
    }

    pub fn maybe_add_sample(&mut self, sample: HandEyeSample) -> bool {
        if let Err(e) = sample.validate() {
            warn!("Hand-eye sample rejected: {e}");
            return false;
        }
        let HandEyeSample { sample, pose } = sample;
        // Short of poses, every valid sample is still wanted.
        match self.camera.admit_gated(sample, self.ready) {
            Ok(Admission::Accepted) => {
                self.poses.push(pose);
                self.recompute_ready();
                self.last_result = None;
                true
            }
            Ok(Admission::Redundant) => {
                debug!("Hand-eye sample does not improve coverage, skipped");
                false
            }
            Err(e) => {
                warn!("Hand-eye sample rejected: {e}");
                false
            }
        }
    }

    pub fn distribution_is_good(&self) -> bool {
        self.ready
    }

    pub fn remove_most_recent_sample(&mut self) -> Result<(), RemovalError> {
        self.camera.remove_most_recent_sample()?;
        self.poses.pop();
        self.recompute_ready();
        self.last_result = None;
        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        self.poses.len()
    }

    pub fn calibrate<S: GeometricSolver + ?Sized>(
        &mut self,
        solver: &S,
        force: bool,
    ) -> Result<HandEyeCalibration, CalibrationError> {
        if !self.ready && !force {
            return Err(CalibrationError::NotReady);
        }
        let mut warnings = Vec::new();
        if !self.ready {
            warn!("Forcing hand-eye calibration with an insufficient sample distribution");
            warnings.push(CalibrationWarning::InsufficientDistribution);
        }

        let mut mono = self.camera.clone();
        let camera = mono.calibrate(solver, force)?;
        let target_poses: Vec<Isometry3<f64>> = camera
            .rotations
            .iter()
            .zip(&camera.translations)
            .map(|(r, t)| isometry_from_rvec(r, t))
            .collect();

        info!("Solving hand-eye transform from {} poses", self.poses.len());
        let gripper_to_camera = solver.solve_hand_eye(&self.poses, &target_poses)?;
        self.camera = mono;

        let result = HandEyeCalibration {
            camera,
            gripper_to_camera,
            warnings,
        };
        self.last_result = Some(result.clone());
        Ok(result)
    }
}
