//! Interactive calibration session.
//!
//! A [`CalibrationSession`] sits between a capture loop and a [`Calibrator`]:
//! it turns detections into samples, collects them automatically or on
//! request, and persists samples and results on save.

use crate::calibrator::{CalibrationError, Calibrator};
use crate::detections::{DetectionError, DetectionFrame};
use crate::optimization::{GeometricSolver, LevenbergMarquardtSolver};
use crate::pattern::{Pattern, PatternDetector};
use crate::result::CalibrationResult;
use crate::sample::{HandEyeSample, MonoSample, Sample, StereoSample};
use crate::util::{
    compute_reprojection_error, ensure_output_dir, export_point_correspondences, UtilError,
};

use log::{debug, info, warn};
use nalgebra::{Isometry3, Vector2};
use std::fs;
use std::path::{Path, PathBuf};

pub const SAMPLES_FILE: &str = "samples.json";
pub const CORRESPONDENCES_FILE: &str = "correspondences.csv";
pub const CALIBRATION_FILE: &str = "calibration.yaml";
pub const RESULT_FILE: &str = "result.json";

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Util(#[from] UtilError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
}

/// Keyboard commands of the capture window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    ToggleAutoCollect,
    CollectSample,
    Calibrate,
    ForceCalibrate,
    Save,
    RemoveLast,
    Quit,
}

impl SessionCommand {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'a' => Some(SessionCommand::ToggleAutoCollect),
            ' ' => Some(SessionCommand::CollectSample),
            'c' => Some(SessionCommand::Calibrate),
            'f' => Some(SessionCommand::ForceCalibrate),
            's' => Some(SessionCommand::Save),
            'r' => Some(SessionCommand::RemoveLast),
            'q' | '\u{1b}' => Some(SessionCommand::Quit),
            _ => None,
        }
    }

    pub fn instructions() -> &'static str {
        "[a] toggle auto-collect\n\
         [c] calibrate and save the data and results\n\
         [f] force calibration and save the data and results\n\
         [q] or [esc] save data then quit\n\
         [r] remove most recent sample\n\
         [s] save raw data (and results if available)\n\
         [spacebar] collect sample (if auto-collect is off)"
    }
}

/// What handling a command did.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    AutoCollect(bool),
    SampleAdded(bool),
    /// Space was pressed with auto-collect on.
    AutoCollectActive,
    NoPendingSample,
    Calibrated(Box<CalibrationResult>),
    Saved(PathBuf),
    Removed,
    Quit(PathBuf),
}

pub struct CalibrationSession<S = LevenbergMarquardtSolver> {
    calibrator: Calibrator,
    solver: S,
    patterns: Vec<Pattern>,
    auto_collect: bool,
    /// Samples of the latest observed frame, waiting for a manual collect.
    pending: Vec<Sample>,
    /// Accepted samples in insertion order.
    accepted: Vec<Sample>,
    output_dir: PathBuf,
}

impl<S: GeometricSolver> CalibrationSession<S> {
    pub fn new<P: AsRef<Path>>(
        calibrator: Calibrator,
        solver: S,
        patterns: Vec<Pattern>,
        output_dir: P,
    ) -> Self {
        CalibrationSession {
            calibrator,
            solver,
            patterns,
            auto_collect: true,
            pending: Vec::new(),
            accepted: Vec::new(),
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn auto_collect(&self) -> bool {
        self.auto_collect
    }

    pub fn accepted_samples(&self) -> &[Sample] {
        &self.accepted
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn add(&mut self, sample: Sample) -> bool {
        let accepted = self.calibrator.maybe_add_sample(sample.clone());
        if accepted {
            self.accepted.push(sample);
            info!(
                "Collected sample {} ({}, ready: {})",
                self.accepted.len(),
                self.calibrator.state(),
                self.calibrator.distribution_is_good()
            );
        }
        accepted
    }

    /// Offers a sample from the capture loop. Under auto-collect it is added
    /// right away; otherwise it waits for [`SessionCommand::CollectSample`].
    pub fn observe(&mut self, sample: Sample) -> bool {
        self.observe_all(vec![sample])
    }

    /// All samples of one frame; a manual collect takes them together.
    fn observe_all(&mut self, samples: Vec<Sample>) -> bool {
        if self.auto_collect {
            let mut any = false;
            for sample in samples {
                any |= self.add(sample);
            }
            any
        } else {
            self.pending = samples;
            false
        }
    }

    /// Runs `detector` for every pattern and returns the first hit.
    fn detect<I, D: PatternDetector<I>>(&self, detector: &D, image: &I) -> Option<MonoSample> {
        self.patterns.iter().find_map(|pattern| {
            let pixels = detector.detect(image, pattern)?;
            MonoSample::from_detection(pattern, pixels)
                .map_err(|e| warn!("Discarding detection of {}: {e}", pattern.pattern_type()))
                .ok()
        })
    }

    /// Detects a pattern in a single image and observes the sample.
    pub fn observe_frame<I, D: PatternDetector<I>>(&mut self, detector: &D, image: &I) -> bool {
        match self.detect(detector, image) {
            Some(sample) => self.observe(sample.into()),
            None => false,
        }
    }

    /// Single image plus the gripper pose at capture time.
    pub fn observe_hand_eye_frame<I, D: PatternDetector<I>>(
        &mut self,
        detector: &D,
        image: &I,
        pose: Isometry3<f64>,
    ) -> bool {
        match self.detect(detector, image) {
            Some(sample) => self.observe(HandEyeSample::new(sample, pose).into()),
            None => false,
        }
    }

    /// Stereo pair; either image may be missing. Both sides must show the same pattern.
    pub fn observe_stereo_frame<I, D: PatternDetector<I>>(
        &mut self,
        detector: &D,
        left: Option<&I>,
        right: Option<&I>,
    ) -> bool {
        let detection = self.patterns.iter().find_map(|pattern| {
            let find = |image: Option<&I>| -> Option<Vec<Vector2<f64>>> {
                image.and_then(|image| detector.detect(image, pattern))
            };
            let (l, r) = (find(left), find(right));
            if l.is_none() && r.is_none() {
                return None;
            }
            StereoSample::new(l, r, pattern.world_points())
                .map_err(|e| debug!("Discarding stereo detection: {e}"))
                .ok()
        });
        match detection {
            Some(sample) => self.observe(sample.into()),
            None => false,
        }
    }

    /// Observes every sample a recorded detection produces.
    pub fn observe_detection(
        &mut self,
        index: usize,
        frame: &DetectionFrame,
    ) -> Result<bool, SessionError> {
        let approximate = match &self.calibrator {
            Calibrator::Stereo(c) => c.approximate(),
            _ => 0.0,
        };
        let samples = frame.to_samples(index, self.calibrator.mode(), &self.patterns, approximate)?;
        Ok(self.observe_all(samples))
    }

    /// Calibrates, logs reprojection statistics and saves everything.
    pub fn calibrate(&mut self, force: bool) -> Result<CalibrationResult, SessionError> {
        let result = self.calibrator.calibrate(&self.solver, force)?;
        for warning in result.warnings() {
            warn!("{warning}");
        }
        let camera = match &result {
            CalibrationResult::Mono(r) => r,
            CalibrationResult::Stereo(r) => &r.left,
            CalibrationResult::HandEye(r) => &r.camera,
        };
        match compute_reprojection_error(camera, self.calibrator.primary_samples()) {
            Ok(stats) => info!("RMS error {:.4} px, {stats:?}", result.rms_error()),
            Err(e) => warn!("Could not compute reprojection statistics: {e}"),
        }
        self.save()?;
        Ok(result)
    }

    pub fn remove_most_recent_sample(&mut self) -> Result<(), SessionError> {
        self.calibrator
            .remove_most_recent_sample()
            .map_err(CalibrationError::from)?;
        self.accepted.pop();
        info!("Removed most recent sample, {} left", self.accepted.len());
        Ok(())
    }

    /// Writes the accepted samples, their correspondences and, when
    /// available, the calibration result.
    pub fn save(&self) -> Result<PathBuf, SessionError> {
        let dir = &self.output_dir;
        ensure_output_dir(dir)?;

        fs::write(
            dir.join(SAMPLES_FILE),
            serde_json::to_string_pretty(&self.accepted).map_err(UtilError::from)?,
        )
        .map_err(UtilError::from)?;
        export_point_correspondences(
            self.calibrator.primary_samples(),
            dir.join(CORRESPONDENCES_FILE),
        )?;

        if let Some(result) = self.calibrator.last_result() {
            self.write_result(&result)?;
        }
        info!("Saved session to {}", dir.display());
        Ok(dir.clone())
    }

    fn write_result(&self, result: &CalibrationResult) -> Result<(), UtilError> {
        let dir = &self.output_dir;
        match result {
            CalibrationResult::Mono(r) => {
                fs::write(dir.join(CALIBRATION_FILE), r.intrinsics.to_string())?;
            }
            CalibrationResult::Stereo(r) => {
                fs::write(dir.join("left.yaml"), r.left.intrinsics.to_string())?;
                fs::write(dir.join("right.yaml"), r.right.intrinsics.to_string())?;
                fs::write(dir.join("extrinsics.yaml"), r.extrinsics_text())?;
            }
            CalibrationResult::HandEye(r) => {
                fs::write(dir.join(CALIBRATION_FILE), r.camera.intrinsics.to_string())?;
            }
        }
        fs::write(dir.join(RESULT_FILE), serde_json::to_string_pretty(result)?)?;
        Ok(())
    }

    pub fn handle(&mut self, command: SessionCommand) -> Result<SessionEvent, SessionError> {
        match command {
            SessionCommand::ToggleAutoCollect => {
                self.auto_collect = !self.auto_collect;
                info!(
                    "Auto-collect {}",
                    if self.auto_collect { "on" } else { "off" }
                );
                Ok(SessionEvent::AutoCollect(self.auto_collect))
            }
            SessionCommand::CollectSample => {
                if self.auto_collect {
                    info!("Auto-collect is on, press [a] to turn it off to collect manually");
                    return Ok(SessionEvent::AutoCollectActive);
                }
                let pending = std::mem::take(&mut self.pending);
                if pending.is_empty() {
                    return Ok(SessionEvent::NoPendingSample);
                }
                let mut any = false;
                for sample in pending {
                    any |= self.add(sample);
                }
                Ok(SessionEvent::SampleAdded(any))
            }
            SessionCommand::Calibrate => {
                Ok(SessionEvent::Calibrated(Box::new(self.calibrate(false)?)))
            }
            SessionCommand::ForceCalibrate => {
                Ok(SessionEvent::Calibrated(Box::new(self.calibrate(true)?)))
            }
            SessionCommand::Save => Ok(SessionEvent::Saved(self.save()?)),
            SessionCommand::RemoveLast => {
                self.remove_most_recent_sample()?;
                Ok(SessionEvent::Removed)
            }
            SessionCommand::Quit => Ok(SessionEvent::Quit(self.save()?)),
        }
    }
}
