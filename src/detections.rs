//! Pattern detections recorded by an external detector, stored as JSON.
//!
//! A log holds the image size and one entry per captured frame. Mono and
//! hand-eye frames use `left` as the only image.

use crate::camera::Resolution;
use crate::config::CalibrationMode;
use crate::pattern::Pattern;
use crate::sample::{HandEyeSample, MonoSample, Sample, SampleError, StereoSample};

use nalgebra::{Isometry3, Vector2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum DetectionError {
    #[error("Frame {frame}: pattern index {pattern} out of range ({count} patterns)")]
    UnknownPattern {
        frame: usize,
        pattern: usize,
        count: usize,
    },
    #[error("Frame {frame}: hand-eye frames need a pose")]
    MissingPose { frame: usize },
    #[error("Frame {frame}: {mode} frames need left image points")]
    MissingPoints { frame: usize, mode: CalibrationMode },
    #[error("Frame {frame}: {source}")]
    Sample { frame: usize, source: SampleError },
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Detected points of one captured frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    /// Index into the configured patterns.
    #[serde(default)]
    pub pattern: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Vec<Vector2<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Vec<Vector2<f64>>>,
    /// Capture times in seconds, used to pair unsynchronised stereo frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_stamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_stamp: Option<f64>,
    /// Gripper pose in the robot base frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Isometry3<f64>>,
}

impl DetectionFrame {
    /// Whether both sides were captured within `approximate` seconds.
    /// Frames without stamps are taken as synchronised.
    pub fn is_synchronised(&self, approximate: f64) -> bool {
        match (self.left_stamp, self.right_stamp) {
            (Some(l), Some(r)) => (l - r).abs() <= approximate,
            _ => true,
        }
    }

    /// Builds the samples this frame contributes in `mode`.
    ///
    /// Stereo frames whose sides are further apart in time than
    /// `approximate` are split into two single-sided samples.
    pub fn to_samples(
        &self,
        index: usize,
        mode: CalibrationMode,
        patterns: &[Pattern],
        approximate: f64,
    ) -> Result<Vec<Sample>, DetectionError> {
        let pattern = patterns
            .get(self.pattern)
            .ok_or(DetectionError::UnknownPattern {
                frame: index,
                pattern: self.pattern,
                count: patterns.len(),
            })?;
        let sample_err = |source| DetectionError::Sample {
            frame: index,
            source,
        };
        let mono = || -> Result<MonoSample, DetectionError> {
            let pixels = self
                .left
                .clone()
                .ok_or(DetectionError::MissingPoints { frame: index, mode })?;
            MonoSample::from_detection(pattern, pixels).map_err(sample_err)
        };

        match mode {
            CalibrationMode::Intrinsic => Ok(vec![mono()?.into()]),
            CalibrationMode::HandEye => {
                let pose = self.pose.ok_or(DetectionError::MissingPose { frame: index })?;
                Ok(vec![HandEyeSample::new(mono()?, pose).into()])
            }
            CalibrationMode::Stereo => {
                let world = pattern.world_points();
                let stereo = |left, right| {
                    StereoSample::new(left, right, world.clone())
                        .map(Sample::from)
                        .map_err(sample_err)
                };
                if self.is_synchronised(approximate) {
                    return Ok(vec![stereo(self.left.clone(), self.right.clone())?]);
                }
                let mut samples = Vec::new();
                if self.left.is_some() {
                    samples.push(stereo(self.left.clone(), None)?);
                }
                if self.right.is_some() {
                    samples.push(stereo(None, self.right.clone())?);
                }
                Ok(samples)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionLog {
    pub resolution: Resolution,
    pub frames: Vec<DetectionFrame>,
}

impl DetectionLog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DetectionError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DetectionError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternType;

    fn patterns() -> Vec<Pattern> {
        vec![
            Pattern::new(PatternType::Chessboard, 2, 3, 0.1).unwrap(),
            Pattern::new(PatternType::AcirclesGrid, 2, 2, 0.05).unwrap(),
        ]
    }

    fn points(n: usize) -> Vec<Vector2<f64>> {
        (0..n).map(|i| Vector2::new(10.0 * i as f64, 5.0)).collect()
    }

    #[test]
    fn test_mono_frame_uses_selected_pattern() {
        let frame = DetectionFrame {
            pattern: 1,
            left: Some(points(4)),
            ..Default::default()
        };
        let samples = frame
            .to_samples(0, CalibrationMode::Intrinsic, &patterns(), 0.0)
            .unwrap();
        match &samples[..] {
            [Sample::Mono(sample)] => {
                assert_eq!(sample.world_points(), &patterns()[1].world_points()[..])
            }
            other => panic!("unexpected samples {other:?}"),
        }
    }

    #[test]
    fn test_unknown_pattern_and_missing_pose_are_reported() {
        let frame = DetectionFrame {
            pattern: 5,
            left: Some(points(6)),
            ..Default::default()
        };
        assert!(matches!(
            frame.to_samples(3, CalibrationMode::Intrinsic, &patterns(), 0.0),
            Err(DetectionError::UnknownPattern {
                frame: 3,
                pattern: 5,
                count: 2,
            })
        ));

        let frame = DetectionFrame {
            left: Some(points(6)),
            ..Default::default()
        };
        assert!(matches!(
            frame.to_samples(0, CalibrationMode::HandEye, &patterns(), 0.0),
            Err(DetectionError::MissingPose { frame: 0 })
        ));
    }

    #[test]
    fn test_wrong_point_count_is_a_sample_error() {
        let frame = DetectionFrame {
            left: Some(points(5)),
            ..Default::default()
        };
        assert!(matches!(
            frame.to_samples(0, CalibrationMode::Intrinsic, &patterns(), 0.0),
            Err(DetectionError::Sample { .. })
        ));
    }

    #[test]
    fn test_stereo_frames_split_when_out_of_sync() {
        let frame = DetectionFrame {
            left: Some(points(6)),
            right: Some(points(6)),
            left_stamp: Some(10.0),
            right_stamp: Some(10.2),
            ..Default::default()
        };
        let paired = frame
            .to_samples(0, CalibrationMode::Stereo, &patterns(), 0.5)
            .unwrap();
        assert_eq!(paired.len(), 1);
        assert!(matches!(&paired[0], Sample::Stereo(s) if s.is_paired()));

        let split = frame
            .to_samples(0, CalibrationMode::Stereo, &patterns(), 0.1)
            .unwrap();
        assert_eq!(split.len(), 2);
        for sample in &split {
            assert!(matches!(sample, Sample::Stereo(s) if !s.is_paired()));
        }
    }

    #[test]
    fn test_log_round_trips_through_json_file() {
        let log = DetectionLog {
            resolution: Resolution::new(640, 480),
            frames: vec![DetectionFrame {
                left: Some(points(6)),
                pose: Some(Isometry3::translation(0.1, 0.2, 0.3)),
                ..Default::default()
            }],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.json");
        log.save(&path).unwrap();
        assert_eq!(DetectionLog::load(&path).unwrap(), log);
    }
}
