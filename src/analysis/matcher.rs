use serde::Serialize;

use crate::data::model::{LibraryEntry, Polarity};

// ---------------------------------------------------------------------------
// Match results
// ---------------------------------------------------------------------------

/// One library slot satisfied by a measured K0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotMatch {
    /// Library column name, e.g. `k0_pos_2`.
    pub slot: &'static str,
    pub measured: f64,
    pub reference: f64,
}

/// A substance whose K0 signature is fully matched on at least one polarity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub name: String,
    pub positive: Vec<SlotMatch>,
    pub negative: Vec<SlotMatch>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Compare measured K0 values against every library entry.
///
/// Each non-zero reference slot takes the first measured value (in the
/// order given) within `tolerance` of it that no earlier slot has claimed.
/// An entry is identified when every required slot of at least one polarity
/// is matched and that polarity has at least one required slot. Results
/// follow library order.
pub fn identify(
    positive_k0s: &[f64],
    negative_k0s: &[f64],
    library: &[LibraryEntry],
    tolerance: f64,
) -> Vec<MatchResult> {
    library
        .iter()
        .filter_map(|entry| match_entry(entry, positive_k0s, negative_k0s, tolerance))
        .collect()
}

/// Match a single entry, `None` when it is not identified.
pub fn match_entry(
    entry: &LibraryEntry,
    positive_k0s: &[f64],
    negative_k0s: &[f64],
    tolerance: f64,
) -> Option<MatchResult> {
    let positive = match_slots(entry, Polarity::Positive, positive_k0s, tolerance);
    let negative = match_slots(entry, Polarity::Negative, negative_k0s, tolerance);

    let fully_matched = |polarity: Polarity, matches: &[SlotMatch]| {
        let required = entry.required_slots(polarity);
        required > 0 && matches.len() == required
    };

    if fully_matched(Polarity::Positive, &positive) || fully_matched(Polarity::Negative, &negative) {
        log::debug!(
            "identified {} ({} positive, {} negative slot matches)",
            entry.name,
            positive.len(),
            negative.len()
        );
        Some(MatchResult {
            name: entry.name.clone(),
            positive,
            negative,
        })
    } else {
        None
    }
}

/// Each slot takes the first measured value within tolerance that no
/// earlier slot has claimed.
fn match_slots(
    entry: &LibraryEntry,
    polarity: Polarity,
    measured: &[f64],
    tolerance: f64,
) -> Vec<SlotMatch> {
    let mut used = vec![false; measured.len()];
    entry
        .reference_slots(polarity)
        .filter_map(|(slot, reference)| {
            let i = measured
                .iter()
                .enumerate()
                .position(|(i, &k0)| !used[i] && (k0 - reference).abs() <= tolerance)?;
            used[i] = true;
            Some(SlotMatch {
                slot,
                measured: measured[i],
                reference,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, pos: [f64; 3], neg: [f64; 3]) -> LibraryEntry {
        LibraryEntry {
            name: name.to_string(),
            k0_pos: pos,
            k0_neg: neg,
        }
    }

    #[test]
    fn partial_positive_match_is_not_identified() {
        let library = [entry("A", [1.00, 1.00, 0.0], [0.0; 3])];
        assert!(identify(&[1.005], &[], &library, 0.02).is_empty());
    }

    #[test]
    fn full_positive_match_is_identified() {
        let library = [entry("A", [1.00, 1.00, 0.0], [0.0; 3])];
        let found = identify(&[1.005, 1.01], &[], &library, 0.02);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "A");
        // a measured value fills at most one slot
        let measured: Vec<f64> = found[0].positive.iter().map(|m| m.measured).collect();
        assert_eq!(measured, vec![1.005, 1.01]);
        assert_eq!(found[0].positive[0].slot, "k0_pos_1");
        assert_eq!(found[0].positive[1].slot, "k0_pos_2");
    }

    #[test]
    fn first_value_in_scan_order_wins() {
        let library = [entry("A", [1.50, 0.0, 0.0], [0.0; 3])];
        let found = identify(&[1.515, 1.50, 1.49], &[], &library, 0.02);
        assert_eq!(found[0].positive[0].measured, 1.515);
    }

    #[test]
    fn claimed_value_is_not_reused() {
        let library = [entry("F", [1.30, 1.31, 0.0], [0.0; 3])];
        // 1.305 is within tolerance of both slots but can only fill one
        assert!(identify(&[1.305, 2.0], &[], &library, 0.02).is_empty());
        let found = identify(&[1.305, 1.312], &[], &library, 0.02);
        let measured: Vec<f64> = found[0].positive.iter().map(|m| m.measured).collect();
        assert_eq!(measured, vec![1.305, 1.312]);
    }

    #[test]
    fn one_full_polarity_is_enough() {
        let library = [entry("B", [1.2, 1.4, 0.0], [1.8, 0.0, 0.0])];
        let found = identify(&[1.2], &[1.81], &library, 0.02);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].positive.len(), 1);
        assert_eq!(found[0].negative.len(), 1);
    }

    #[test]
    fn polarity_without_references_never_identifies() {
        let library = [entry("C", [0.0; 3], [2.0, 0.0, 0.0])];
        // no negative values measured; the empty positive signature must not count
        assert!(identify(&[1.0, 2.0], &[], &library, 0.02).is_empty());
    }

    #[test]
    fn entry_without_references_never_matches() {
        let library = [entry("D", [0.0; 3], [0.0; 3])];
        assert!(identify(&[1.0], &[1.0], &library, 10.0).is_empty());
    }

    #[test]
    fn tolerance_is_inclusive() {
        let library = [entry("E", [1.25, 0.0, 0.0], [0.0; 3])];
        assert_eq!(identify(&[1.5], &[], &library, 0.25).len(), 1);
        assert!(identify(&[1.5], &[], &library, 0.24).is_empty());
    }

    #[test]
    fn results_follow_library_order() {
        let library = [
            entry("Z", [1.1, 0.0, 0.0], [0.0; 3]),
            entry("Q", [0.0; 3], [0.0; 3]),
            entry("A", [0.0; 3], [1.9, 0.0, 0.0]),
        ];
        let found = identify(&[1.1], &[1.9], &library, 0.02);
        let names: Vec<&str> = found.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Z", "A"]);
    }
}
