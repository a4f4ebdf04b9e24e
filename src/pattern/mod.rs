//! Calibration targets and the detector seam.

use crate::config::ConfigurationError;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Chessboard,
    #[serde(rename = "acircles")]
    AcirclesGrid,
    RadonCheckerboard,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternType::Chessboard => write!(f, "chessboard"),
            PatternType::AcirclesGrid => write!(f, "acircles"),
            PatternType::RadonCheckerboard => write!(f, "radon_checkerboard"),
        }
    }
}

impl FromStr for PatternType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chessboard" => Ok(PatternType::Chessboard),
            "acircles" | "acircles_grid" => Ok(PatternType::AcirclesGrid),
            "radon_checkerboard" | "radon" => Ok(PatternType::RadonCheckerboard),
            other => Err(ConfigurationError::InvalidPattern(format!(
                "unknown pattern type '{other}'"
            ))),
        }
    }
}

/// A planar target with a known point layout on `z = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pattern_type: PatternType,
    rows: usize,
    columns: usize,
    square_size: f64,
}

impl Pattern {
    /// # Arguments
    ///
    /// * `rows`, `columns` - Number of interior corners (or circles), both at least 2.
    /// * `square_size` - Spacing between neighbouring points, strictly positive.
    pub fn new(
        pattern_type: PatternType,
        rows: usize,
        columns: usize,
        square_size: f64,
    ) -> Result<Self, ConfigurationError> {
        if rows < 2 || columns < 2 {
            return Err(ConfigurationError::InvalidPattern(format!(
                "{pattern_type} needs at least 2x2 points, got {rows}x{columns}"
            )));
        }
        if !(square_size > 0.0) || !square_size.is_finite() {
            return Err(ConfigurationError::InvalidPattern(format!(
                "square size must be positive, got {square_size}"
            )));
        }
        Ok(Pattern {
            pattern_type,
            rows,
            columns,
            square_size,
        })
    }

    pub fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn square_size(&self) -> f64 {
        self.square_size
    }

    pub fn point_count(&self) -> usize {
        self.rows * self.columns
    }

    /// Target points in row-major order.
    pub fn world_points(&self) -> Vec<Vector3<f64>> {
        let s = self.square_size;
        let mut points = Vec::with_capacity(self.point_count());
        for r in 0..self.rows {
            for c in 0..self.columns {
                let x = match self.pattern_type {
                    PatternType::Chessboard | PatternType::RadonCheckerboard => c as f64 * s,
                    PatternType::AcirclesGrid => (2 * c + r % 2) as f64 * s,
                };
                points.push(Vector3::new(x, r as f64 * s, 0.0));
            }
        }
        points
    }
}

/// Finds a pattern in an image.
///
/// Returns the ordered image points when the whole pattern is found, in the
/// same order as [`Pattern::world_points`].
pub trait PatternDetector<I> {
    fn detect(&self, image: &I, pattern: &Pattern) -> Option<Vec<Vector2<f64>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_chessboard_layout_is_row_major() {
        let pattern = Pattern::new(PatternType::Chessboard, 2, 3, 0.1).unwrap();
        let pts = pattern.world_points();
        assert_eq!(pts.len(), 6);
        assert_relative_eq!(pts[1], Vector3::new(0.1, 0.0, 0.0));
        assert_relative_eq!(pts[3], Vector3::new(0.0, 0.1, 0.0));
        assert_relative_eq!(pts[5], Vector3::new(0.2, 0.1, 0.0));
    }

    #[test]
    fn test_asymmetric_circles_offset_odd_rows() {
        let pattern = Pattern::new(PatternType::AcirclesGrid, 2, 2, 1.0).unwrap();
        let pts = pattern.world_points();
        assert_relative_eq!(pts[0], Vector3::new(0.0, 0.0, 0.0));
        assert_relative_eq!(pts[1], Vector3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(pts[2], Vector3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(pts[3], Vector3::new(3.0, 1.0, 0.0));
    }

    #[test]
    fn test_rejects_invalid_dimensions() {
        assert!(Pattern::new(PatternType::Chessboard, 1, 5, 1.0).is_err());
        assert!(Pattern::new(PatternType::Chessboard, 5, 5, 0.0).is_err());
        assert!(Pattern::new(PatternType::Chessboard, 5, 5, f64::NAN).is_err());
    }

    #[test]
    fn test_pattern_type_parse() {
        assert_eq!(
            "acircles".parse::<PatternType>().unwrap(),
            PatternType::AcirclesGrid
        );
        assert_eq!(
            "radon_checkerboard".parse::<PatternType>().unwrap(),
            PatternType::RadonCheckerboard
        );
        assert!("aruco".parse::<PatternType>().is_err());
    }
}
