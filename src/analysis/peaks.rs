//! Peak extraction from a single intensity trace.
//!
//! # Algorithm
//!
//! 1. Savitzky-Golay smoothing (window 11, order 3 by default). In
//!    [`SmoothingMode::SecondDerivative`] the negated second derivative is
//!    used instead, turning curvature maxima into peaks.
//! 2. Local maxima of the smoothed signal (flat tops report the middle
//!    sample; the first and last samples are never peaks).
//! 3. Height floor, absolute or relative to the largest smoothed value.
//! 4. Separation filter: working from the highest peak down, any peak
//!    closer than `min_separation` indices to an already kept peak is removed.
//! 5. Rank by height descending, lower index first on ties, keep the top N.

use serde::{Deserialize, Serialize};

use super::decode::Trace;
use super::smoothing::SavitzkyGolay;
use crate::config::AnalysisConfig;
use crate::error::{ImsError, Result};

/// Which smoothed signal peaks are detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    /// Amplitude-preserving smoothing; heights are smoothed intensities.
    #[default]
    Smooth,
    /// Negated smoothed second derivative; emphasises narrow and shoulder
    /// peaks. Heights are in intensity per index².
    SecondDerivative,
}

/// Minimum height a local maximum needs to count as a peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightThreshold {
    /// Fixed floor in smoothed-signal units.
    Absolute(f64),
    /// Fraction of the largest smoothed value.
    Relative(f64),
}

impl Default for HeightThreshold {
    fn default() -> Self {
        HeightThreshold::Relative(0.1)
    }
}

impl HeightThreshold {
    pub fn validate(&self) -> Result<()> {
        match *self {
            HeightThreshold::Absolute(h) if !h.is_finite() => Err(ImsError::invalid_config(
                format!("absolute height threshold must be finite, got {h}"),
            )),
            HeightThreshold::Relative(f) if !f.is_finite() || f < 0.0 => Err(
                ImsError::invalid_config(format!("relative height threshold must be >= 0, got {f}")),
            ),
            _ => Ok(()),
        }
    }

    fn floor(&self, signal: &[f64]) -> f64 {
        match *self {
            HeightThreshold::Absolute(h) => h,
            HeightThreshold::Relative(f) => {
                signal.iter().copied().fold(f64::NEG_INFINITY, f64::max) * f
            }
        }
    }
}

/// A detected peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    /// Position in the trace.
    pub index: usize,
    /// Smoothed signal value at `index`.
    pub height: f64,
    /// Height above the higher of the two surrounding valleys.
    pub prominence: f64,
}

/// Peak extraction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakParams {
    pub window: usize,
    pub polyorder: usize,
    pub mode: SmoothingMode,
    pub threshold: HeightThreshold,
    pub min_separation: usize,
    pub top_n: usize,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

impl From<&AnalysisConfig> for PeakParams {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            window: config.smoothing_window,
            polyorder: config.smoothing_polyorder,
            mode: config.smoothing_mode,
            threshold: config.height_threshold,
            min_separation: config.min_peak_separation,
            top_n: config.top_n_peaks,
        }
    }
}

/// Smooths traces and returns their most prominent peaks.
#[derive(Debug, Clone)]
pub struct PeakExtractor {
    params: PeakParams,
    filter: SavitzkyGolay,
}

impl PeakExtractor {
    pub fn new(params: PeakParams) -> Result<Self> {
        params.threshold.validate()?;
        let deriv = match params.mode {
            SmoothingMode::Smooth => 0,
            SmoothingMode::SecondDerivative => 2,
        };
        let filter = SavitzkyGolay::new(params.window, params.polyorder, deriv)?;
        Ok(Self { params, filter })
    }

    /// The signal peaks are detected on.
    pub fn smooth(&self, trace: &Trace) -> Result<Vec<f64>> {
        let mut signal = self.filter.apply(trace.samples())?;
        if self.params.mode == SmoothingMode::SecondDerivative {
            signal.iter_mut().for_each(|v| *v = -*v);
        }
        Ok(signal)
    }

    /// Up to `top_n` peaks, highest first.
    pub fn extract(&self, trace: &Trace) -> Result<Vec<Peak>> {
        let signal = self.smooth(trace)?;

        let floor = self.params.threshold.floor(&signal);
        let candidates: Vec<usize> = local_maxima(&signal)
            .into_iter()
            .filter(|&i| signal[i] >= floor)
            .collect();

        let mut peaks: Vec<Peak> = select_by_separation(&signal, candidates, self.params.min_separation)
            .into_iter()
            .map(|index| Peak {
                index,
                height: signal[index],
                prominence: prominence(&signal, index),
            })
            .collect();

        peaks.sort_by(rank);
        peaks.truncate(self.params.top_n);
        Ok(peaks)
    }
}

/// Height descending, then index ascending.
fn rank(a: &Peak, b: &Peak) -> std::cmp::Ordering {
    b.height.total_cmp(&a.height).then(a.index.cmp(&b.index))
}

/// Indices of local maxima in ascending order. A plateau counts once, at
/// its middle sample (rounded down).
#[allow(clippy::float_cmp)]
fn local_maxima(data: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    let n = data.len();
    if n < 3 {
        return maxima;
    }

    let mut i = 1;
    while i < n - 1 {
        if data[i - 1] < data[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && data[ahead] == data[i] {
                ahead += 1;
            }
            if data[ahead] < data[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

/// Drop peaks that sit closer than `distance` to a higher peak. Returns the
/// survivors in ascending index order.
fn select_by_separation(signal: &[f64], peaks: Vec<usize>, distance: usize) -> Vec<usize> {
    if distance <= 1 || peaks.len() < 2 {
        return peaks;
    }

    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| {
        signal[peaks[b]]
            .total_cmp(&signal[peaks[a]])
            .then(peaks[a].cmp(&peaks[b]))
    });

    let mut keep = vec![true; peaks.len()];
    for &i in &order {
        if !keep[i] {
            continue;
        }
        for j in (0..i).rev() {
            if peaks[i] - peaks[j] >= distance {
                break;
            }
            keep[j] = false;
        }
        for j in i + 1..peaks.len() {
            if peaks[j] - peaks[i] >= distance {
                break;
            }
            keep[j] = false;
        }
    }

    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect()
}

/// Height above the higher of the lowest points reached on either side
/// before the signal climbs above the peak (or the trace ends).
fn prominence(signal: &[f64], index: usize) -> f64 {
    let height = signal[index];

    let mut left_min = height;
    for &v in signal[..index].iter().rev() {
        if v > height {
            break;
        }
        left_min = left_min.min(v);
    }

    let mut right_min = height;
    for &v in &signal[index + 1..] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    height - left_min.max(right_min)
}
