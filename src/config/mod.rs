//! Calibration configuration loaded from YAML and overlaid by the command line.

use crate::camera::{CameraModel, Resolution};
use crate::distribution::DistributionThresholds;
use crate::pattern::{Pattern, PatternType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Incomplete pattern parameters: {0}")]
    IncompletePattern(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Unsupported number of k coefficients {k} for {model} (max {max})")]
    UnsupportedCoefficientCount {
        model: CameraModel,
        k: usize,
        max: usize,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// What the calibrator estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    #[default]
    Intrinsic,
    Stereo,
    HandEye,
}

impl fmt::Display for CalibrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationMode::Intrinsic => write!(f, "intrinsic"),
            CalibrationMode::Stereo => write!(f, "stereo"),
            CalibrationMode::HandEye => write!(f, "hand_eye"),
        }
    }
}

impl FromStr for CalibrationMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "intrinsic" => Ok(CalibrationMode::Intrinsic),
            "stereo" => Ok(CalibrationMode::Stereo),
            "hand_eye" | "handeye" => Ok(CalibrationMode::HandEye),
            other => Err(ConfigurationError::Invalid(format!(
                "unknown calibration mode '{other}', expected intrinsic, stereo or hand_eye"
            ))),
        }
    }
}

/// One `--pattern/--rows/--columns/--square-size-mm` group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub pattern_type: PatternType,
    pub rows: usize,
    pub columns: usize,
    /// Spacing between neighbouring points in millimetres.
    pub square_size: f64,
}

impl PatternConfig {
    pub fn build(&self) -> Result<Pattern, ConfigurationError> {
        Pattern::new(self.pattern_type, self.rows, self.columns, self.square_size)
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            pattern_type: PatternType::Chessboard,
            rows: 6,
            columns: 9,
            square_size: 25.0,
        }
    }
}

fn default_patterns() -> Vec<PatternConfig> {
    vec![PatternConfig::default()]
}

fn default_k_coefficients() -> usize {
    2
}

fn default_resolution() -> Resolution {
    Resolution::new(640, 480)
}

fn default_min_paired_samples() -> usize {
    5
}

fn default_min_hand_eye_samples() -> usize {
    3
}

fn default_max_iterations() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub mode: CalibrationMode,
    #[serde(default = "default_camera_model")]
    pub camera_model: CameraModel,
    /// Model of the right camera in stereo mode; defaults to `camera_model`.
    #[serde(default)]
    pub right_camera_model: Option<CameraModel>,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<PatternConfig>,
    /// Number of radial distortion coefficients to estimate.
    #[serde(default = "default_k_coefficients")]
    pub k_coefficients: usize,
    #[serde(default)]
    pub fix_principal_point: bool,
    #[serde(default)]
    pub fix_aspect_ratio: bool,
    /// Maximum timestamp difference, in seconds, for pairing stereo frames.
    #[serde(default)]
    pub approximate: f64,
    #[serde(default = "default_resolution")]
    pub resolution: Resolution,
    #[serde(default)]
    pub thresholds: DistributionThresholds,
    #[serde(default = "default_min_paired_samples")]
    pub min_paired_samples: usize,
    #[serde(default = "default_min_hand_eye_samples")]
    pub min_hand_eye_samples: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_camera_model() -> CameraModel {
    CameraModel::Pinhole
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            mode: CalibrationMode::default(),
            camera_model: default_camera_model(),
            right_camera_model: None,
            patterns: default_patterns(),
            k_coefficients: default_k_coefficients(),
            fix_principal_point: false,
            fix_aspect_ratio: false,
            approximate: 0.0,
            resolution: default_resolution(),
            thresholds: DistributionThresholds::default(),
            min_paired_samples: default_min_paired_samples(),
            min_hand_eye_samples: default_min_hand_eye_samples(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl CalibrationConfig {
    /// Loads and validates a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let contents = fs::read_to_string(path)?;
        let config: CalibrationConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigurationError> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    pub fn right_model(&self) -> CameraModel {
        self.right_camera_model.unwrap_or(self.camera_model)
    }

    /// Builds every configured pattern, failing on the first invalid one.
    pub fn build_patterns(&self) -> Result<Vec<Pattern>, ConfigurationError> {
        self.patterns.iter().map(PatternConfig::build).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.patterns.is_empty() {
            return Err(ConfigurationError::InvalidPattern(
                "at least one pattern is required".to_string(),
            ));
        }
        self.build_patterns()?;

        let mut models = vec![self.camera_model];
        if self.mode == CalibrationMode::Stereo {
            models.push(self.right_model());
        } else if self.right_camera_model.is_some() {
            return Err(ConfigurationError::Invalid(
                "right camera model is only valid in stereo mode".to_string(),
            ));
        }
        for model in models {
            let max = model.max_radial_coefficients();
            if self.k_coefficients == 0 || self.k_coefficients > max {
                return Err(ConfigurationError::UnsupportedCoefficientCount {
                    model,
                    k: self.k_coefficients,
                    max,
                });
            }
        }

        if self.mode != CalibrationMode::Stereo && self.approximate != 0.0 {
            return Err(ConfigurationError::Invalid(
                "approximate pairing is only valid in stereo mode".to_string(),
            ));
        }
        if !(self.approximate >= 0.0) {
            return Err(ConfigurationError::Invalid(
                "approximate must be non-negative".to_string(),
            ));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(ConfigurationError::Invalid(
                "image size must be non-zero".to_string(),
            ));
        }
        self.thresholds.validate()?;
        if self.max_iterations == 0 {
            return Err(ConfigurationError::Invalid(
                "max_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
