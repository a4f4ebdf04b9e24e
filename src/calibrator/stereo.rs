use super::mono::{Admission, MonoCalibrator};
use super::{CalibrationError, RemovalError};
use crate::distribution::{DistributionStats, DistributionTracker};
use crate::optimization::{GeometricSolver, StereoSolveInput};
use crate::result::{CalibrationWarning, StereoCalibration};
use crate::sample::{MonoSample, SampleError, StereoSample};

use log::{debug, info, warn};

/// Which parts of the calibrator one accepted sample touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Insertion {
    left: bool,
    right: bool,
    paired: bool,
}

/// Two cameras calibrated independently plus their relative pose.
///
/// Samples seen by one camera only still improve that camera's intrinsics;
/// samples seen by both also enter the paired set used for the extrinsics.
#[derive(Debug, Clone)]
pub struct StereoCalibrator {
    left: MonoCalibrator,
    right: MonoCalibrator,
    pairs: Vec<StereoSample>,
    /// Coverage of the paired samples, measured on the left image.
    paired_tracker: DistributionTracker,
    history: Vec<Insertion>,
    min_paired_samples: usize,
    /// Maximum capture time difference for pairing frames, in seconds.
    approximate: f64,
    ready: bool,
    last_result: Option<StereoCalibration>,
}

impl StereoCalibrator {
    pub fn new(
        left: MonoCalibrator,
        right: MonoCalibrator,
        min_paired_samples: usize,
        approximate: f64,
    ) -> Self {
        let paired_tracker = left.tracker().cleared();
        StereoCalibrator {
            left,
            right,
            pairs: Vec::new(),
            paired_tracker,
            history: Vec::new(),
            min_paired_samples,
            approximate,
            ready: false,
            last_result: None,
        }
    }

    pub fn left(&self) -> &MonoCalibrator {
        &self.left
    }

    pub fn right(&self) -> &MonoCalibrator {
        &self.right
    }

    pub fn pairs(&self) -> &[StereoSample] {
        &self.pairs
    }

    pub fn approximate(&self) -> f64 {
        self.approximate
    }

    pub fn last_result(&self) -> Option<&StereoCalibration> {
        self.last_result.as_ref()
    }

    pub fn stats(&self) -> DistributionStats {
        self.paired_tracker.stats()
    }

    fn recompute_ready(&mut self) {
        self.ready = self.left.distribution_is_good()
            && self.right.distribution_is_good()
            && self.pairs.len() >= self.min_paired_samples;
    }

    /// Every valid paired sample is kept, even when neither camera needs its view.
    fn admit_pair(&mut self, sample: &StereoSample, left: &MonoSample) {
        self.paired_tracker.record(left);
        self.pairs.push(sample.clone());
    }

    fn admit(&mut self, sample: StereoSample) -> Result<Insertion, SampleError> {
        sample.validate()?;
        let mut insertion = Insertion::default();
        let left = sample.left();
        if let Some(left) = &left {
            insertion.left = self.left.admit(left.clone())? == Admission::Accepted;
        }
        if let Some(right) = sample.right() {
            insertion.right = self.right.admit(right)? == Admission::Accepted;
        }
        if let (true, Some(left)) = (sample.is_paired(), &left) {
            self.admit_pair(&sample, left);
            insertion.paired = true;
        }
        Ok(insertion)
    }

    /// Routes each side of the sample to its camera, which keeps it only if it
    /// helps that camera, and always keeps paired samples for the extrinsic
    /// solve. Returns whether any part was kept.
    pub fn maybe_add_sample(&mut self, sample: StereoSample) -> bool {
        match self.admit(sample) {
            Ok(insertion) if insertion == Insertion::default() => {
                debug!("Single-sided sample does not improve coverage, skipped");
                false
            }
            Ok(insertion) => {
                self.history.push(insertion);
                self.recompute_ready();
                self.last_result = None;
                debug!(
                    "Stereo sample accepted (left: {}, right: {}, paired: {}), {} pairs",
                    insertion.left,
                    insertion.right,
                    insertion.paired,
                    self.pairs.len()
                );
                true
            }
            Err(e) => {
                warn!("Stereo sample rejected: {e}");
                false
            }
        }
    }

    pub fn distribution_is_good(&self) -> bool {
        self.ready
    }

    /// Undoes exactly the parts touched by the most recent accepted sample.
    pub fn remove_most_recent_sample(&mut self) -> Result<(), RemovalError> {
        let insertion = self.history.pop().ok_or(RemovalError)?;
        if insertion.left {
            self.left.remove_most_recent_sample()?;
        }
        if insertion.right {
            self.right.remove_most_recent_sample()?;
        }
        if insertion.paired {
            self.pairs.pop();
            self.paired_tracker.unrecord_last();
        }
        self.recompute_ready();
        self.last_result = None;
        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    pub fn calibrate<S: GeometricSolver + ?Sized>(
        &mut self,
        solver: &S,
        force: bool,
    ) -> Result<StereoCalibration, CalibrationError> {
        if !self.ready && !force {
            return Err(CalibrationError::NotReady);
        }
        let mut warnings = Vec::new();
        if !self.ready {
            warn!("Forcing stereo calibration with an insufficient sample distribution");
            warnings.push(CalibrationWarning::InsufficientDistribution);
        }

        // Sub-calibrators are committed only once the extrinsic solve succeeds.
        let mut left_camera = self.left.clone();
        let mut right_camera = self.right.clone();
        let left = left_camera.calibrate(solver, force)?;
        let right = right_camera.calibrate(solver, force)?;

        info!(
            "Calibrating stereo extrinsics from {} pairs",
            self.pairs.len()
        );
        let input = StereoSolveInput {
            left: &left.intrinsics,
            right: &right.intrinsics,
            pairs: &self.pairs,
            options: self.left.options().clone(),
        };
        let solution = solver.solve_stereo(&input)?;
        self.left = left_camera;
        self.right = right_camera;

        let result = StereoCalibration {
            left,
            right,
            rotation: solution.rotation,
            translation: solution.translation,
            essential: solution.essential,
            fundamental: solution.fundamental,
            rms_error: solution.rms_error,
            warnings,
        };
        self.last_result = Some(result.clone());
        Ok(result)
    }
}
