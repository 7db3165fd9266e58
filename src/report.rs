//! Human-readable and JSON renderings of a [`BatchReport`].

use std::io::Write;

use crate::analysis::matcher::SlotMatch;
use crate::data::model::Polarity;
use crate::error::Result;
use crate::pipeline::{BatchReport, RecordAnalysis};

const RULE_WIDTH: usize = 50;

/// Per-record peaks, K0 values and identified substances, followed by the
/// batch totals and any skipped records.
pub fn write_summary<W: Write>(report: &BatchReport, mut out: W) -> Result<()> {
    let total = report.analyses.len();
    for (i, analysis) in report.analyses.iter().enumerate() {
        writeln!(
            out,
            "Processing Measurement Time: {} (Entry {}/{})",
            analysis.measurement_time,
            i + 1,
            total
        )?;
        if analysis.positive_source != analysis.negative_source {
            writeln!(
                out,
                "Merged from records {} (positive) and {} (negative)",
                analysis.positive_source, analysis.negative_source
            )?;
        }
        for polarity in Polarity::BOTH {
            write_polarity(&mut out, analysis, polarity)?;
        }
        write_substances(&mut out, analysis)?;
        writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    }

    if !report.diagnostics.is_empty() {
        writeln!(out, "\nSkipped records:")?;
        for diag in &report.diagnostics {
            writeln!(out, "- {diag}")?;
        }
    }

    writeln!(
        out,
        "\nFound {} complete spectra (with both positive and negative data)",
        report.complete_spectra()
    )?;
    writeln!(out, "Total matches found: {}", report.total_matches())?;
    Ok(())
}

fn write_polarity<W: Write>(out: &mut W, analysis: &RecordAnalysis, polarity: Polarity) -> Result<()> {
    let result = analysis.polarity(polarity);
    let indices: Vec<usize> = result.peaks.iter().map(|p| p.index).collect();
    writeln!(out, "{} spectrum:", capitalize(&polarity.to_string()))?;
    writeln!(out, "  Top peaks: {indices:?}")?;
    writeln!(out, "  K0 values: {}", format_values(&result.k0_values))?;
    Ok(())
}

fn write_substances<W: Write>(out: &mut W, analysis: &RecordAnalysis) -> Result<()> {
    if analysis.substances.is_empty() {
        writeln!(out, "No substances identified in this spectrum.")?;
        return Ok(());
    }
    writeln!(out, "Identified substances:")?;
    for substance in &analysis.substances {
        writeln!(out, "- {}", substance.name)?;
        write_slot_matches(out, "Positive", &substance.positive)?;
        write_slot_matches(out, "Negative", &substance.negative)?;
    }
    Ok(())
}

fn write_slot_matches<W: Write>(out: &mut W, label: &str, matches: &[SlotMatch]) -> Result<()> {
    if matches.is_empty() {
        return Ok(());
    }
    writeln!(out, "  {label} spectrum matches:")?;
    for m in matches {
        writeln!(
            out,
            "    {} library value: {:.3}, measured: {:.3}",
            m.slot, m.reference, m.measured
        )?;
    }
    Ok(())
}

fn format_values(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.3}")).collect();
    format!("[{}]", parts.join(", "))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The full report as pretty-printed JSON.
pub fn write_json<W: Write>(report: &BatchReport, out: W) -> Result<()> {
    serde_json::to_writer_pretty(out, report)?;
    Ok(())
}
