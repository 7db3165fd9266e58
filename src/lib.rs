//! Ion-mobility spectrometry analysis.
//!
//! Raw measurement records (one serialized trace per polarity plus drift-tube
//! conditions) are reconciled into records carrying both polarities, peak
//! picked, converted to reduced mobilities (K0) and matched against a
//! substance library.
//!
//! ```text
//! loader ──► reconcile ──► PeakExtractor ──► MobilityCalculator ──► matcher
//!                                                                     │
//!                                      report ◄── BatchReport ◄───────┘
//! ```

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod report;

pub use analysis::decode::Trace;
pub use analysis::matcher::{MatchResult, SlotMatch};
pub use analysis::peaks::{HeightThreshold, Peak, SmoothingMode};
pub use config::{AnalysisConfig, ConfigFile};
pub use data::model::{DriftConditions, LibraryEntry, Polarity, RawMeasurementRecord, ReconciledRecord};
pub use error::{Diagnostic, ImsError, Result, Stage};
pub use pipeline::{AnalysisPipeline, BatchReport, PolarityAnalysis, RecordAnalysis};
