use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Errors raised by the analysis core.
///
/// `Decode`, `InvalidTrace` and `InvalidParameter` are per-record conditions:
/// the pipeline turns them into diagnostics and keeps going. The remaining
/// variants are fatal for a batch.
#[derive(Debug, Error)]
pub enum ImsError {
    /// The serialized trace payload is not a well-formed numeric list.
    #[error("malformed trace payload: {0}")]
    Decode(String),

    /// The trace is shorter than the smoothing window.
    #[error("trace has {len} samples, smoothing window needs {window}")]
    InvalidTrace { len: usize, window: usize },

    /// A physical parameter would make the K0 computation divide by zero
    /// or produce a non-finite value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The analysis configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The substance library is missing, unreadable or empty.
    #[error("substance library: {0}")]
    Library(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ImsError>;

impl ImsError {
    pub fn decode<S: Into<String>>(message: S) -> Self {
        ImsError::Decode(message.into())
    }

    pub fn invalid_parameter<S: Into<String>>(message: S) -> Self {
        ImsError::InvalidParameter(message.into())
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        ImsError::InvalidConfig(message.into())
    }
}

// ---------------------------------------------------------------------------
// Diagnostics – non-fatal, per-record skips
// ---------------------------------------------------------------------------

/// Where in the analysis a record (or one polarity of it) was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decode,
    Reconcile,
    PeakExtraction,
    Mobility,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decode => "decode",
            Stage::Reconcile => "reconcile",
            Stage::PeakExtraction => "peak extraction",
            Stage::Mobility => "mobility",
        };
        f.write_str(name)
    }
}

/// A record that was skipped, and why. Surfaced to the caller instead of
/// aborting the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Position of the record in the input sequence.
    pub record: usize,
    pub measurement_time: String,
    pub stage: Stage,
    pub reason: String,
}

impl Diagnostic {
    pub fn new<S: Into<String>>(record: usize, measurement_time: &str, stage: Stage, reason: S) -> Self {
        Self {
            record,
            measurement_time: measurement_time.to_string(),
            stage,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record {} ({}) skipped at {}: {}",
            self.record, self.measurement_time, self.stage, self.reason
        )
    }
}
