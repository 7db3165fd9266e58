use crate::analysis::decode::{self, Trace};
use crate::error::{Diagnostic, Result, Stage};

use super::model::{RawMeasurementRecord, ReconciledRecord};

// ---------------------------------------------------------------------------
// Per-record classification
// ---------------------------------------------------------------------------

/// Which polarities a raw record actually captured.
#[derive(Debug, Clone, PartialEq)]
enum Spectra {
    Complete { positive: Trace, negative: Trace },
    PositiveOnly(Trace),
    NegativeOnly(Trace),
    Empty,
}

impl Spectra {
    fn decode(record: &RawMeasurementRecord) -> Result<Self> {
        let positive = decode::decode(&record.positive_spectrum)?;
        let negative = decode::decode(&record.negative_spectrum)?;
        Ok(match (positive.is_blank(), negative.is_blank()) {
            (false, false) => Spectra::Complete { positive, negative },
            (false, true) => Spectra::PositiveOnly(positive),
            (true, false) => Spectra::NegativeOnly(negative),
            (true, true) => Spectra::Empty,
        })
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Reconciled records plus the reasons every other input record was dropped.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub records: Vec<ReconciledRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Merge a time-ordered sequence of raw records into records carrying both
/// polarities.
///
/// Single forward pass:
/// * complete records are emitted as they are;
/// * a positive-only record pairs with the nearest following negative-only
///   record, looking past empty, complete and undecodable records. The
///   lookahead gives up at the next positive-only record, so a negative-only
///   record always pairs with the closest unresolved positive-only record
///   before it. The partner is consumed; the records in between are still
///   visited by the cursor;
/// * negative-only records reached by the cursor have no partner left and
///   are dropped, as are empty and undecodable records.
///
/// Output order follows the records that supplied the positive trace.
pub fn reconcile(raw: &[RawMeasurementRecord]) -> Reconciliation {
    let mut diagnostics = Vec::new();

    let mut classified: Vec<Option<Spectra>> = raw
        .iter()
        .enumerate()
        .map(|(i, record)| match Spectra::decode(record) {
            Ok(spectra) => Some(spectra),
            Err(e) => {
                let diag = Diagnostic::new(i, &record.measurement_time, Stage::Decode, e.to_string());
                log::warn!("{diag}");
                diagnostics.push(diag);
                None
            }
        })
        .collect();

    let mut records = Vec::new();

    for cursor in 0..classified.len() {
        let current = &raw[cursor];
        let drop_reason = |reason: &str| Diagnostic::new(cursor, &current.measurement_time, Stage::Reconcile, reason);

        match classified[cursor].take() {
            Some(Spectra::Complete { positive, negative }) => {
                records.push(ReconciledRecord::new(
                    current.measurement_time.clone(),
                    positive,
                    negative,
                    current.conditions,
                    cursor,
                    cursor,
                ));
            }
            Some(Spectra::PositiveOnly(positive)) => match take_partner(&mut classified, cursor) {
                Some((partner, negative)) => {
                    log::debug!(
                        "pairing positive record {cursor} with negative record {partner} ({})",
                        current.measurement_time
                    );
                    records.push(ReconciledRecord::new(
                        current.measurement_time.clone(),
                        positive,
                        negative,
                        current.conditions,
                        cursor,
                        partner,
                    ));
                }
                None => diagnostics.push(drop_reason("positive-only record has no negative-only partner")),
            },
            Some(Spectra::NegativeOnly(_)) => diagnostics.push(drop_reason(
                "negative-only record has no unresolved positive-only record before it",
            )),
            Some(Spectra::Empty) => diagnostics.push(drop_reason("both spectra are empty")),
            // undecodable (reported above) or consumed as a partner
            None => {}
        }
    }

    log::info!(
        "reconciled {} raw records into {} complete records ({} dropped)",
        raw.len(),
        records.len(),
        diagnostics.len()
    );

    Reconciliation {
        records,
        diagnostics,
    }
}

/// Find the negative-only partner of the positive-only record at `from` and
/// take it out of `classified`.
fn take_partner(classified: &mut [Option<Spectra>], from: usize) -> Option<(usize, Trace)> {
    for (offset, slot) in classified[from + 1..].iter_mut().enumerate() {
        match slot {
            Some(Spectra::NegativeOnly(_)) => {
                if let Some(Spectra::NegativeOnly(negative)) = slot.take() {
                    return Some((from + 1 + offset, negative));
                }
            }
            Some(Spectra::PositiveOnly(_)) => return None,
            Some(Spectra::Complete { .. }) | Some(Spectra::Empty) | None => {}
        }
    }
    None
}
