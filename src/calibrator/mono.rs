use super::{CalibrationError, RemovalError};
use crate::camera::{CameraModel, Resolution};
use crate::config::ConfigurationError;
use crate::distribution::{DistributionStats, DistributionThresholds, DistributionTracker};
use crate::optimization::{GeometricSolver, MonoSolveInput, SolverOptions};
use crate::result::{CalibrationWarning, IntrinsicParameters, MonoCalibration};
use crate::sample::{MonoSample, SampleError};

use log::{debug, info, warn};
use nalgebra::Matrix3;

/// Outcome of offering a valid sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Accepted,
    Redundant,
}

/// Collects samples from one image stream and calibrates its intrinsics.
#[derive(Debug, Clone)]
pub struct MonoCalibrator {
    camera_model: CameraModel,
    resolution: Resolution,
    options: SolverOptions,
    samples: Vec<MonoSample>,
    tracker: DistributionTracker,
    ready: bool,
    last_result: Option<MonoCalibration>,
    /// Most recent successful intrinsics, kept across sample changes as the next starting point.
    seed: Option<IntrinsicParameters>,
}

impl MonoCalibrator {
    pub fn new(
        camera_model: CameraModel,
        resolution: Resolution,
        thresholds: DistributionThresholds,
        options: SolverOptions,
    ) -> Result<Self, ConfigurationError> {
        Ok(MonoCalibrator {
            camera_model,
            resolution,
            options,
            samples: Vec::new(),
            tracker: DistributionTracker::new(thresholds, resolution)?,
            ready: false,
            last_result: None,
            seed: None,
        })
    }

    pub fn camera_model(&self) -> CameraModel {
        self.camera_model
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn thresholds(&self) -> &DistributionThresholds {
        self.tracker.thresholds()
    }

    pub(crate) fn tracker(&self) -> &DistributionTracker {
        &self.tracker
    }

    pub fn samples(&self) -> &[MonoSample] {
        &self.samples
    }

    pub fn stats(&self) -> DistributionStats {
        self.tracker.stats()
    }

    pub fn last_result(&self) -> Option<&MonoCalibration> {
        self.last_result.as_ref()
    }

    pub(crate) fn admit(&mut self, sample: MonoSample) -> Result<Admission, SampleError> {
        let gate = self.ready;
        self.admit_gated(sample, gate)
    }

    /// Like [`Self::admit`], but coverage gating follows `gate` instead of this
    /// camera's own readiness.
    pub(crate) fn admit_gated(
        &mut self,
        sample: MonoSample,
        gate: bool,
    ) -> Result<Admission, SampleError> {
        sample.validate()?;
        let footprint = self.tracker.footprint(&sample);
        if gate && !self.tracker.would_improve(&footprint) {
            return Ok(Admission::Redundant);
        }
        self.tracker.record_footprint(footprint);
        self.samples.push(sample);
        self.ready = self.tracker.is_ready();
        self.last_result = None;
        debug!(
            "Sample {} accepted, {} points total, ready: {}",
            self.samples.len(),
            self.tracker.total_points(),
            self.ready
        );
        Ok(Admission::Accepted)
    }

    /// Adds a sample when it is valid and, once the distribution is good,
    /// only when it improves coverage.
    pub fn maybe_add_sample(&mut self, sample: MonoSample) -> bool {
        match self.admit(sample) {
            Ok(Admission::Accepted) => true,
            Ok(Admission::Redundant) => {
                debug!("Sample does not improve coverage, skipped");
                false
            }
            Err(e) => {
                warn!("Sample rejected: {e}");
                false
            }
        }
    }

    pub fn distribution_is_good(&self) -> bool {
        self.ready
    }

    pub fn remove_most_recent_sample(&mut self) -> Result<(), RemovalError> {
        self.samples.pop().ok_or(RemovalError)?;
        self.tracker.unrecord_last();
        self.ready = self.tracker.is_ready();
        self.last_result = None;
        Ok(())
    }

    fn initial_guess(&self) -> (Matrix3<f64>, Vec<f64>) {
        match &self.seed {
            Some(seed) if seed.camera_model == self.camera_model => {
                (seed.camera_matrix, seed.distortion.clone())
            }
            _ => (
                self.resolution.initial_camera_matrix(),
                vec![0.0; self.camera_model.distortion_len()],
            ),
        }
    }

    pub fn calibrate<S: GeometricSolver + ?Sized>(
        &mut self,
        solver: &S,
        force: bool,
    ) -> Result<MonoCalibration, CalibrationError> {
        if !self.ready && !force {
            return Err(CalibrationError::NotReady);
        }
        let mut warnings = Vec::new();
        if !self.ready {
            warn!("Forcing calibration with an insufficient sample distribution");
            warnings.push(CalibrationWarning::InsufficientDistribution);
        }

        let (initial_camera_matrix, initial_distortion) = self.initial_guess();
        let input = MonoSolveInput {
            camera_model: self.camera_model,
            resolution: self.resolution,
            samples: &self.samples,
            initial_camera_matrix,
            initial_distortion,
            options: self.options.clone(),
        };
        info!(
            "Calibrating {} camera from {} samples",
            self.camera_model,
            self.samples.len()
        );
        let solution = solver.solve(&input)?;

        let intrinsics = IntrinsicParameters {
            camera_model: self.camera_model,
            resolution: self.resolution,
            camera_matrix: solution.camera_matrix,
            distortion: solution.distortion,
        };
        let result = MonoCalibration {
            intrinsics: intrinsics.clone(),
            rotations: solution.rotations,
            translations: solution.translations,
            rms_error: solution.rms_error,
            warnings,
        };
        self.seed = Some(intrinsics);
        self.last_result = Some(result.clone());
        Ok(result)
    }
}
