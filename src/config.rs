//! Analysis configuration and TOML file support.
//!
//! Every option has a default except `resolution`, which is instrument
//! specific and must be supplied either in the file or on the command line:
//!
//! ```toml
//! # analysis.toml
//! [analysis]
//! resolution = 32.392
//! tolerance = 0.02
//! smoothing_window = 11
//! smoothing_polyorder = 3
//! smoothing_mode = "smooth"          # or "second_derivative"
//! height_threshold = { relative = 0.1 }
//! min_peak_separation = 5
//! top_n_peaks = 10
//! position_offset = 32
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::mobility::DEFAULT_POSITION_OFFSET;
use crate::analysis::peaks::{HeightThreshold, SmoothingMode};
use crate::error::{ImsError, Result};

/// Default K0 match window.
pub const DEFAULT_TOLERANCE: f64 = 0.02;

/// Root structure of an `analysis.toml` file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Recognised options of the analysis core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Absolute K0 difference accepted as a library match.
    pub tolerance: f64,
    /// Savitzky-Golay window length (odd).
    pub smoothing_window: usize,
    /// Savitzky-Golay polynomial order.
    pub smoothing_polyorder: usize,
    pub smoothing_mode: SmoothingMode,
    pub height_threshold: HeightThreshold,
    /// Minimum index distance between two reported peaks.
    pub min_peak_separation: usize,
    pub top_n_peaks: usize,
    /// Drift-time scale factor in microseconds per index. No default.
    pub resolution: Option<f64>,
    /// Index bias before the physical drift region begins.
    pub position_offset: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            smoothing_window: 11,
            smoothing_polyorder: 3,
            smoothing_mode: SmoothingMode::default(),
            height_threshold: HeightThreshold::default(),
            min_peak_separation: 5,
            top_n_peaks: 10,
            resolution: None,
            position_offset: DEFAULT_POSITION_OFFSET,
        }
    }
}

impl AnalysisConfig {
    /// Check every option for internal consistency.
    pub fn validate(&self) -> Result<()> {
        self.resolution()?;

        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ImsError::invalid_config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.smoothing_window % 2 == 0 {
            return Err(ImsError::invalid_config(format!(
                "smoothing_window must be odd, got {}",
                self.smoothing_window
            )));
        }
        if self.smoothing_window < self.smoothing_polyorder + 2 {
            return Err(ImsError::invalid_config(format!(
                "smoothing_window {} is too small for polynomial order {}",
                self.smoothing_window, self.smoothing_polyorder
            )));
        }
        if self.smoothing_mode == SmoothingMode::SecondDerivative && self.smoothing_polyorder < 2 {
            return Err(ImsError::invalid_config(
                "second-derivative smoothing needs smoothing_polyorder >= 2",
            ));
        }
        if self.top_n_peaks == 0 {
            return Err(ImsError::invalid_config("top_n_peaks must be at least 1"));
        }
        self.height_threshold.validate()?;
        Ok(())
    }

    /// The configured resolution, rejecting a missing or non-physical value.
    pub fn resolution(&self) -> Result<f64> {
        match self.resolution {
            None => Err(ImsError::invalid_config(
                "resolution is instrument specific and must be supplied",
            )),
            Some(r) if !r.is_finite() || r <= 0.0 => Err(ImsError::invalid_config(format!(
                "resolution must be a positive number, got {r}"
            ))),
            Some(r) => Ok(r),
        }
    }
}
