use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::decode::Trace;

// ---------------------------------------------------------------------------
// Polarity
// ---------------------------------------------------------------------------

/// Ion mode of a spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub const BOTH: [Polarity; 2] = [Polarity::Positive, Polarity::Negative];
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Positive => write!(f, "positive"),
            Polarity::Negative => write!(f, "negative"),
        }
    }
}

// ---------------------------------------------------------------------------
// DriftConditions – environmental state of the drift tube
// ---------------------------------------------------------------------------

/// Drift-tube state recorded alongside a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriftConditions {
    /// Drift-tube temperature in °C.
    pub temperature_c: f64,
    /// Pressure in kPa.
    pub pressure_kpa: f64,
    pub positive_voltage: f64,
    pub negative_voltage: f64,
    /// Drift-tube length.
    pub tube_length: f64,
}

impl DriftConditions {
    pub fn voltage(&self, polarity: Polarity) -> f64 {
        match polarity {
            Polarity::Positive => self.positive_voltage,
            Polarity::Negative => self.negative_voltage,
        }
    }
}

// ---------------------------------------------------------------------------
// RawMeasurementRecord – one row as read from storage
// ---------------------------------------------------------------------------

/// One sampled instant. Either spectrum may be all-zero ("not captured").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMeasurementRecord {
    /// Ordering key, kept as the text the instrument wrote.
    pub measurement_time: String,
    /// Serialized positive-polarity trace.
    pub positive_spectrum: String,
    /// Serialized negative-polarity trace.
    pub negative_spectrum: String,
    pub conditions: DriftConditions,
}

// ---------------------------------------------------------------------------
// ReconciledRecord – both polarities present
// ---------------------------------------------------------------------------

/// A measurement carrying a non-empty trace for both polarities.
///
/// Only the reconciler builds these. Drift conditions always come from the
/// record that supplied the positive trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRecord {
    measurement_time: String,
    positive: Trace,
    negative: Trace,
    conditions: DriftConditions,
    positive_source: usize,
    negative_source: usize,
}

impl ReconciledRecord {
    pub(crate) fn new(
        measurement_time: String,
        positive: Trace,
        negative: Trace,
        conditions: DriftConditions,
        positive_source: usize,
        negative_source: usize,
    ) -> Self {
        debug_assert!(!positive.is_blank() && !negative.is_blank());
        Self {
            measurement_time,
            positive,
            negative,
            conditions,
            positive_source,
            negative_source,
        }
    }

    pub fn measurement_time(&self) -> &str {
        &self.measurement_time
    }

    pub fn trace(&self, polarity: Polarity) -> &Trace {
        match polarity {
            Polarity::Positive => &self.positive,
            Polarity::Negative => &self.negative,
        }
    }

    pub fn conditions(&self) -> &DriftConditions {
        &self.conditions
    }

    /// Input position of the record that supplied the positive trace.
    pub fn positive_source(&self) -> usize {
        self.positive_source
    }

    /// Input position of the record that supplied the negative trace.
    pub fn negative_source(&self) -> usize {
        self.negative_source
    }

    /// Whether both traces came from the same input record.
    pub fn is_merged(&self) -> bool {
        self.positive_source != self.negative_source
    }
}

// ---------------------------------------------------------------------------
// LibraryEntry – reference substance
// ---------------------------------------------------------------------------

const POSITIVE_SLOTS: [&str; 3] = ["k0_pos_1", "k0_pos_2", "k0_pos_3"];
const NEGATIVE_SLOTS: [&str; 3] = ["k0_neg_1", "k0_neg_2", "k0_neg_3"];

/// A known substance with up to three reference K0 values per polarity.
/// A reference value of 0 marks an unused slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    pub k0_pos: [f64; 3],
    pub k0_neg: [f64; 3],
}

impl LibraryEntry {
    /// `(slot name, reference K0)` for every slot in use.
    pub fn reference_slots(
        &self,
        polarity: Polarity,
    ) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        let (names, values) = match polarity {
            Polarity::Positive => (&POSITIVE_SLOTS, &self.k0_pos),
            Polarity::Negative => (&NEGATIVE_SLOTS, &self.k0_neg),
        };
        names
            .iter()
            .zip(values.iter())
            .filter(|&(_, &v)| v > 0.0)
            .map(|(&name, &v)| (name, v))
    }

    /// Number of slots that must be matched for a full match of `polarity`.
    pub fn required_slots(&self, polarity: Polarity) -> usize {
        self.reference_slots(polarity).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_slots_are_not_required() {
        let entry = LibraryEntry {
            name: "HCl".into(),
            k0_pos: [0.0, 0.0, 0.0],
            k0_neg: [2.1, 0.0, 1.7],
        };
        assert_eq!(entry.required_slots(Polarity::Positive), 0);
        assert_eq!(entry.required_slots(Polarity::Negative), 2);
        let slots: Vec<_> = entry.reference_slots(Polarity::Negative).collect();
        assert_eq!(slots, vec![("k0_neg_1", 2.1), ("k0_neg_3", 1.7)]);
    }

    #[test]
    fn voltage_per_polarity() {
        let conditions = DriftConditions {
            positive_voltage: 2500.0,
            negative_voltage: 2400.0,
            ..DriftConditions::default()
        };
        assert_eq!(conditions.voltage(Polarity::Positive), 2500.0);
        assert_eq!(conditions.voltage(Polarity::Negative), 2400.0);
    }
}
