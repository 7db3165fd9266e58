//! End-to-end analysis of a batch of raw measurement records.
//!
//! Reconciliation is sequential. Once complete records exist, each one is
//! analysed independently (peaks → K0 → library match per polarity), so with
//! the `parallel` feature that stage runs on the rayon pool. Output keeps
//! input order either way.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::decode::Trace;
use crate::analysis::matcher::{self, MatchResult};
use crate::analysis::mobility::{Environment, MobilityCalculator, MobilityConstants};
use crate::analysis::peaks::{Peak, PeakExtractor, PeakParams};
use crate::config::AnalysisConfig;
use crate::data::loader::LoadedRecords;
use crate::data::model::{DriftConditions, LibraryEntry, Polarity, RawMeasurementRecord, ReconciledRecord};
use crate::data::reconcile::{Reconciliation, reconcile};
use crate::error::{Diagnostic, ImsError, Result, Stage};

// ---------------------------------------------------------------------------
// Results handed to presentation
// ---------------------------------------------------------------------------

/// Peaks and K0 values of one polarity of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolarityAnalysis {
    pub trace: Trace,
    /// Highest first.
    pub peaks: Vec<Peak>,
    /// Parallel to `peaks`. Empty when the drift conditions were unusable.
    pub k0_values: Vec<f64>,
}

/// Everything derived from one reconciled record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordAnalysis {
    pub measurement_time: String,
    pub positive_source: usize,
    pub negative_source: usize,
    pub conditions: DriftConditions,
    pub positive: PolarityAnalysis,
    pub negative: PolarityAnalysis,
    pub substances: Vec<MatchResult>,
}

impl RecordAnalysis {
    pub fn polarity(&self, polarity: Polarity) -> &PolarityAnalysis {
        match polarity {
            Polarity::Positive => &self.positive,
            Polarity::Negative => &self.negative,
        }
    }
}

/// Result of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub analyses: Vec<RecordAnalysis>,
    /// Skipped records and polarities, in input order.
    pub diagnostics: Vec<Diagnostic>,
}

impl BatchReport {
    /// Records analysed with both polarities.
    pub fn complete_spectra(&self) -> usize {
        self.analyses.len()
    }

    /// Identified substances summed over all records.
    pub fn total_matches(&self) -> usize {
        self.analyses.iter().map(|a| a.substances.len()).sum()
    }
}

/// Analysis of a single reconciled record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// `None` when the record had to be skipped.
    pub analysis: Option<RecordAnalysis>,
    pub diagnostics: Vec<Diagnostic>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Configured analysis stages plus the substance library.
#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    extractor: PeakExtractor,
    calculator: MobilityCalculator,
    library: Vec<LibraryEntry>,
}

impl AnalysisPipeline {
    /// Fails on an invalid configuration or an empty library.
    pub fn new(config: AnalysisConfig, library: Vec<LibraryEntry>) -> Result<Self> {
        config.validate()?;
        if library.is_empty() {
            return Err(ImsError::Library(
                "library is empty, identification needs at least one entry".into(),
            ));
        }

        let extractor = PeakExtractor::new(PeakParams::from(&config))?;
        let constants = MobilityConstants {
            position_offset: config.position_offset,
            ..MobilityConstants::default()
        };
        let calculator = MobilityCalculator::new(config.resolution()?, constants)?;

        Ok(Self {
            config,
            extractor,
            calculator,
            library,
        })
    }

    pub fn library(&self) -> &[LibraryEntry] {
        &self.library
    }

    /// Reconcile and analyse a time-ordered batch. Per-record problems end
    /// up in `diagnostics`; they never abort the batch.
    pub fn run(&self, records: &[RawMeasurementRecord]) -> BatchReport {
        let Reconciliation {
            records: reconciled,
            mut diagnostics,
        } = reconcile(records);

        let mut analyses = Vec::with_capacity(reconciled.len());
        for outcome in self.analyze_all(&reconciled) {
            diagnostics.extend(outcome.diagnostics);
            analyses.extend(outcome.analysis);
        }
        diagnostics.sort_by_key(|d| d.record);

        let report = BatchReport {
            analyses,
            diagnostics,
        };
        log::info!(
            "analysed {} complete spectra, {} substance matches, {} diagnostics",
            report.complete_spectra(),
            report.total_matches(),
            report.diagnostics.len()
        );
        report
    }

    /// Like `run`, but record indices in the report refer to storage rows,
    /// and rows the loader could not parse are reported as decode failures.
    pub fn run_loaded(&self, loaded: &LoadedRecords) -> BatchReport {
        let mut report = self.run(&loaded.records);
        for analysis in &mut report.analyses {
            analysis.positive_source = loaded.storage_row(analysis.positive_source);
            analysis.negative_source = loaded.storage_row(analysis.negative_source);
        }
        for diag in &mut report.diagnostics {
            diag.record = loaded.storage_row(diag.record);
        }
        report.diagnostics.extend(loaded.skipped.iter().cloned());
        report.diagnostics.sort_by_key(|d| d.record);
        report
    }

    #[cfg(feature = "parallel")]
    fn analyze_all(&self, records: &[ReconciledRecord]) -> Vec<RecordOutcome> {
        records.par_iter().map(|r| self.analyze_record(r)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn analyze_all(&self, records: &[ReconciledRecord]) -> Vec<RecordOutcome> {
        records.iter().map(|r| self.analyze_record(r)).collect()
    }

    /// Peaks, K0 values and library matches of one record.
    pub fn analyze_record(&self, record: &ReconciledRecord) -> RecordOutcome {
        log::debug!("processing measurement {}", record.measurement_time());
        let mut diagnostics = Vec::new();

        let positive = self.analyze_polarity(record, Polarity::Positive, &mut diagnostics);
        let negative = self.analyze_polarity(record, Polarity::Negative, &mut diagnostics);
        let (Some(positive), Some(negative)) = (positive, negative) else {
            return RecordOutcome {
                analysis: None,
                diagnostics,
            };
        };

        let substances = matcher::identify(
            &positive.k0_values,
            &negative.k0_values,
            &self.library,
            self.config.tolerance,
        );

        RecordOutcome {
            analysis: Some(RecordAnalysis {
                measurement_time: record.measurement_time().to_string(),
                positive_source: record.positive_source(),
                negative_source: record.negative_source(),
                conditions: *record.conditions(),
                positive,
                negative,
                substances,
            }),
            diagnostics,
        }
    }

    /// `None` when the trace cannot be peak-extracted, which skips the
    /// record. Unusable drift conditions only empty this polarity's K0 list.
    fn analyze_polarity(
        &self,
        record: &ReconciledRecord,
        polarity: Polarity,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<PolarityAnalysis> {
        let mut report = |stage: Stage, e: ImsError| {
            let diag = Diagnostic::new(
                record.positive_source(),
                record.measurement_time(),
                stage,
                format!("{polarity} spectrum: {e}"),
            );
            log::warn!("{diag}");
            diagnostics.push(diag);
        };

        let trace = record.trace(polarity);
        let peaks = match self.extractor.extract(trace) {
            Ok(peaks) => peaks,
            Err(e) => {
                report(Stage::PeakExtraction, e);
                return None;
            }
        };

        let env = Environment::for_polarity(record.conditions(), polarity);
        let k0_values = match self.calculator.compute(&peaks, &env) {
            Ok(values) => values,
            Err(e) => {
                report(Stage::Mobility, e);
                Vec::new()
            }
        };

        Some(PolarityAnalysis {
            trace: trace.clone(),
            peaks,
            k0_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::decode::encode;

    fn gaussian(len: usize, center: f64, amplitude: f64) -> Trace {
        Trace::new(
            (0..len)
                .map(|i| amplitude * (-0.5 * ((i as f64 - center) / 4.0).powi(2)).exp())
                .collect(),
        )
    }

    fn conditions() -> DriftConditions {
        DriftConditions {
            temperature_c: 45.0,
            pressure_kpa: 1002.0,
            positive_voltage: 2500.0,
            negative_voltage: 2500.0,
            tube_length: 7.0,
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            resolution: Some(32.392),
            ..AnalysisConfig::default()
        }
    }

    fn record(time: &str, positive: &Trace, negative: &Trace, conditions: DriftConditions) -> RawMeasurementRecord {
        RawMeasurementRecord {
            measurement_time: time.to_string(),
            positive_spectrum: encode(positive),
            negative_spectrum: encode(negative),
            conditions,
        }
    }

    fn library_entry(name: &str, pos: f64, neg: f64) -> LibraryEntry {
        LibraryEntry {
            name: name.to_string(),
            k0_pos: [pos, 0.0, 0.0],
            k0_neg: [neg, 0.0, 0.0],
        }
    }

    #[test]
    fn empty_library_is_fatal() {
        let err = AnalysisPipeline::new(config(), Vec::new()).unwrap_err();
        assert!(matches!(err, ImsError::Library(_)));
    }

    #[test]
    fn missing_resolution_is_fatal() {
        let err = AnalysisPipeline::new(AnalysisConfig::default(), vec![library_entry("X", 1.0, 0.0)]).unwrap_err();
        assert!(matches!(err, ImsError::InvalidConfig(_)));
    }

    #[test]
    fn short_trace_skips_record_but_not_batch() {
        let pipeline = AnalysisPipeline::new(config(), vec![library_entry("X", 1.0, 0.0)]).unwrap();
        let short = Trace::new(vec![0.0, 1.0, 0.0]);
        let full = gaussian(300, 120.0, 100.0);
        let records = [
            record("t1", &short, &full, conditions()),
            record("t2", &full, &full, conditions()),
        ];
        let report = pipeline.run(&records);
        assert_eq!(report.complete_spectra(), 1);
        assert_eq!(report.analyses[0].measurement_time, "t2");
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].stage, Stage::PeakExtraction);
        assert_eq!(report.diagnostics[0].record, 0);
    }

    #[test]
    fn zero_negative_voltage_keeps_positive_polarity() {
        let pipeline = AnalysisPipeline::new(config(), vec![library_entry("X", 1.0, 0.0)]).unwrap();
        let trace = gaussian(300, 120.0, 100.0);
        let bad = DriftConditions {
            negative_voltage: 0.0,
            ..conditions()
        };
        let report = pipeline.run(&[record("t1", &trace, &trace, bad)]);
        assert_eq!(report.complete_spectra(), 1);
        let analysis = &report.analyses[0];
        assert_eq!(analysis.positive.k0_values.len(), analysis.positive.peaks.len());
        assert!(!analysis.positive.k0_values.is_empty());
        assert!(analysis.negative.k0_values.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].stage, Stage::Mobility);
    }

    #[test]
    fn identifies_substance_on_merged_record() {
        let positive = gaussian(400, 150.0, 200.0);
        let negative = gaussian(400, 220.0, 80.0);
        let zero = Trace::new(vec![0.0; 400]);

        let calc = MobilityCalculator::new(32.392, MobilityConstants::default()).unwrap();
        let pos_k0 = calc.k0_at(150, &Environment::for_polarity(&conditions(), Polarity::Positive)).unwrap();
        let neg_k0 = calc.k0_at(220, &Environment::for_polarity(&conditions(), Polarity::Negative)).unwrap();

        let library = vec![
            library_entry("Other", pos_k0 + 0.5, 0.0),
            library_entry("Target", pos_k0, neg_k0),
        ];
        let pipeline = AnalysisPipeline::new(config(), library).unwrap();

        let records = [
            record("t1", &positive, &zero, conditions()),
            record("t2", &zero, &negative, conditions()),
        ];
        let report = pipeline.run(&records);

        assert_eq!(report.complete_spectra(), 1);
        assert_eq!(report.total_matches(), 1);
        let analysis = &report.analyses[0];
        assert_eq!((analysis.positive_source, analysis.negative_source), (0, 1));
        assert_eq!(analysis.positive.peaks[0].index, 150);
        assert_eq!(analysis.negative.peaks[0].index, 220);
        assert_eq!(analysis.substances[0].name, "Target");
        assert_eq!(analysis.substances[0].positive[0].slot, "k0_pos_1");
    }
}
