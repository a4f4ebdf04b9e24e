//! Coverage statistics deciding when enough diverse samples were collected.
//!
//! The tracker keeps a 2D histogram of image points over a coarse grid, the
//! running total of points, and the ranges of apparent target scale and skew.
//! Every recorded sample leaves a [`SampleFootprint`] so the most recent one
//! can be undone exactly.

use crate::camera::Resolution;
use crate::config::ConfigurationError;
use crate::sample::MonoSample;
use serde::{Deserialize, Serialize};

fn default_min_total_points() -> usize {
    500
}

fn default_min_per_bin() -> usize {
    3
}

fn default_min_scale_range_px() -> f64 {
    100.0
}

fn default_min_skew_range_deg() -> f64 {
    10.0
}

fn default_grid() -> usize {
    3
}

/// Readiness thresholds and histogram shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionThresholds {
    #[serde(default = "default_min_total_points")]
    pub min_total_points: usize,
    #[serde(default = "default_min_per_bin")]
    pub min_per_bin: usize,
    #[serde(default = "default_min_scale_range_px")]
    pub min_scale_range_px: f64,
    #[serde(default = "default_min_skew_range_deg")]
    pub min_skew_range_deg: f64,
    #[serde(default = "default_grid")]
    pub grid_rows: usize,
    #[serde(default = "default_grid")]
    pub grid_cols: usize,
}

impl Default for DistributionThresholds {
    fn default() -> Self {
        DistributionThresholds {
            min_total_points: default_min_total_points(),
            min_per_bin: default_min_per_bin(),
            min_scale_range_px: default_min_scale_range_px(),
            min_skew_range_deg: default_min_skew_range_deg(),
            grid_rows: default_grid(),
            grid_cols: default_grid(),
        }
    }
}

impl DistributionThresholds {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.grid_rows == 0 || self.grid_cols == 0 {
            return Err(ConfigurationError::Invalid(
                "distribution grid must have at least one bin".to_string(),
            ));
        }
        if !(self.min_scale_range_px >= 0.0 && self.min_skew_range_deg >= 0.0) {
            return Err(ConfigurationError::Invalid(
                "distribution ranges must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// What one sample contributed to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFootprint {
    /// Points per bin, row-major over the grid.
    pub bins: Vec<usize>,
    pub point_count: usize,
    /// Apparent target size in pixels.
    pub scale: f64,
    /// Mean corner deviation from a right angle, in degrees.
    pub skew: f64,
}

/// Snapshot of the tracker for display and logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub bins: Vec<usize>,
    pub grid_rows: usize,
    pub grid_cols: usize,
    pub total_points: usize,
    pub sample_count: usize,
    pub scale_range: Option<(f64, f64)>,
    pub skew_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct DistributionTracker {
    thresholds: DistributionThresholds,
    resolution: Resolution,
    bins: Vec<usize>,
    total_points: usize,
    footprints: Vec<SampleFootprint>,
    scale_range: Option<(f64, f64)>,
    skew_range: Option<(f64, f64)>,
}

fn widen(range: Option<(f64, f64)>, value: f64) -> Option<(f64, f64)> {
    match range {
        Some((lo, hi)) => Some((lo.min(value), hi.max(value))),
        None => Some((value, value)),
    }
}

fn span(range: Option<(f64, f64)>) -> f64 {
    range.map_or(0.0, |(lo, hi)| hi - lo)
}

impl DistributionTracker {
    pub fn new(
        thresholds: DistributionThresholds,
        resolution: Resolution,
    ) -> Result<Self, ConfigurationError> {
        thresholds.validate()?;
        let bin_count = thresholds.grid_rows * thresholds.grid_cols;
        Ok(DistributionTracker {
            thresholds,
            resolution,
            bins: vec![0; bin_count],
            total_points: 0,
            footprints: Vec::new(),
            scale_range: None,
            skew_range: None,
        })
    }

    /// An empty tracker with the same thresholds and image size.
    pub fn cleared(&self) -> Self {
        DistributionTracker {
            thresholds: self.thresholds.clone(),
            resolution: self.resolution,
            bins: vec![0; self.bins.len()],
            total_points: 0,
            footprints: Vec::new(),
            scale_range: None,
            skew_range: None,
        }
    }

    pub fn thresholds(&self) -> &DistributionThresholds {
        &self.thresholds
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Histogram bin of a pixel; points outside the image land in the nearest edge bin.
    fn bin_index(&self, x: f64, y: f64) -> usize {
        let cols = self.thresholds.grid_cols;
        let rows = self.thresholds.grid_rows;
        let to_cell = |v: f64, extent: u32, cells: usize| -> usize {
            let cell = (v / extent as f64 * cells as f64).floor();
            if cell.is_nan() || cell < 0.0 {
                0
            } else {
                (cell as usize).min(cells - 1)
            }
        };
        to_cell(y, self.resolution.height, rows) * cols + to_cell(x, self.resolution.width, cols)
    }

    /// Computes what `sample` would contribute without recording it.
    pub fn footprint(&self, sample: &MonoSample) -> SampleFootprint {
        let mut bins = vec![0; self.bins.len()];
        for p in sample.pixel_points() {
            bins[self.bin_index(p.x, p.y)] += 1;
        }
        let outline = sample.outline();
        SampleFootprint {
            bins,
            point_count: sample.len(),
            scale: outline.apparent_scale(),
            skew: outline.skew_angle(),
        }
    }

    pub fn record(&mut self, sample: &MonoSample) {
        let footprint = self.footprint(sample);
        self.record_footprint(footprint);
    }

    pub fn record_footprint(&mut self, footprint: SampleFootprint) {
        self.total_points += footprint.point_count;
        for (bin, added) in self.bins.iter_mut().zip(&footprint.bins) {
            *bin += added;
        }
        self.scale_range = widen(self.scale_range, footprint.scale);
        self.skew_range = widen(self.skew_range, footprint.skew);
        self.footprints.push(footprint);
    }

    /// Undoes the most recent record. Extrema are rebuilt from the remaining
    /// footprints so no removed sample keeps defining a range.
    pub fn unrecord_last(&mut self) -> Option<SampleFootprint> {
        let footprint = self.footprints.pop()?;
        self.total_points -= footprint.point_count;
        for (bin, removed) in self.bins.iter_mut().zip(&footprint.bins) {
            *bin -= removed;
        }
        self.scale_range = self.footprints.iter().fold(None, |r, f| widen(r, f.scale));
        self.skew_range = self.footprints.iter().fold(None, |r, f| widen(r, f.skew));
        Some(footprint)
    }

    pub fn sample_count(&self) -> usize {
        self.footprints.len()
    }

    pub fn total_points(&self) -> usize {
        self.total_points
    }

    pub fn scale_range(&self) -> Option<(f64, f64)> {
        self.scale_range
    }

    pub fn skew_range(&self) -> Option<(f64, f64)> {
        self.skew_range
    }

    pub fn is_ready(&self) -> bool {
        let t = &self.thresholds;
        if self.total_points < t.min_total_points {
            return false;
        }
        if self.bins.iter().any(|&count| count < t.min_per_bin) {
            return false;
        }
        // Ranges are meaningless for a single sample.
        if self.footprints.len() >= 2 {
            if span(self.scale_range) < t.min_scale_range_px {
                return false;
            }
            if span(self.skew_range) < t.min_skew_range_deg {
                return false;
            }
        }
        true
    }

    /// True when the footprint fills an under-populated bin or widens a range.
    pub fn would_improve(&self, footprint: &SampleFootprint) -> bool {
        let fills_bin = self
            .bins
            .iter()
            .zip(&footprint.bins)
            .any(|(&have, &add)| add > 0 && have < self.thresholds.min_per_bin);
        let extends = |range: Option<(f64, f64)>, value: f64| match range {
            Some((lo, hi)) => value < lo || value > hi,
            None => true,
        };
        fills_bin
            || extends(self.scale_range, footprint.scale)
            || extends(self.skew_range, footprint.skew)
    }

    pub fn stats(&self) -> DistributionStats {
        DistributionStats {
            bins: self.bins.clone(),
            grid_rows: self.thresholds.grid_rows,
            grid_cols: self.thresholds.grid_cols,
            total_points: self.total_points,
            sample_count: self.footprints.len(),
            scale_range: self.scale_range,
            skew_range: self.skew_range,
        }
    }
}
