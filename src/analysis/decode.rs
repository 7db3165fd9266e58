use std::fmt::Write as _;

use serde::Serialize;

use crate::error::{ImsError, Result};

// ---------------------------------------------------------------------------
// Trace – one decoded intensity-vs-drift-position signal
// ---------------------------------------------------------------------------

/// Intensity samples of one polarity, indexed by drift-position bin.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Trace(Vec<f64>);

impl Trace {
    pub fn new(samples: Vec<f64>) -> Self {
        Trace(samples)
    }

    pub fn samples(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A trace is blank ("not captured") when every sample is exactly zero.
    /// A zero-length trace is blank as well.
    #[allow(clippy::float_cmp)]
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }
}

impl From<Vec<f64>> for Trace {
    fn from(samples: Vec<f64>) -> Self {
        Trace(samples)
    }
}

// ---------------------------------------------------------------------------
// Wire format:  [0.0, 1.2, 3.4]
// ---------------------------------------------------------------------------

/// Parse a serialized trace.
///
/// The payload is a comma-separated list of decimal numbers, optionally
/// enclosed in `[` `]`. A Python bytes-literal wrapper (`b'[...]'`) and
/// surrounding quotes, as found in raw database exports, are stripped too.
pub fn decode(raw: &str) -> Result<Trace> {
    let body = strip_wrappers(raw);
    if body.trim().is_empty() {
        return Ok(Trace::default());
    }

    body.split(',')
        .enumerate()
        .map(|(i, tok)| {
            let tok = tok.trim();
            let value: f64 = tok
                .parse()
                .map_err(|_| ImsError::decode(format!("sample {i}: '{tok}' is not a number")))?;
            if !value.is_finite() {
                return Err(ImsError::decode(format!("sample {i}: '{tok}' is not finite")));
            }
            Ok(value)
        })
        .collect::<Result<Vec<f64>>>()
        .map(Trace)
}

/// Serialize a trace into the bracketed wire format.
pub fn encode(trace: &Trace) -> String {
    let mut out = String::with_capacity(trace.len() * 8 + 2);
    out.push('[');
    for (i, v) in trace.samples().iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        // `{:?}` is the shortest representation that parses back exactly
        let _ = write!(out, "{v:?}");
    }
    out.push(']');
    out
}

fn strip_wrappers(raw: &str) -> &str {
    let mut s = raw.trim();

    for prefix in ["b'", "b\""] {
        if let Some(rest) = s.strip_prefix(prefix) {
            let quote = &prefix[1..];
            s = rest.strip_suffix(quote).unwrap_or(rest).trim();
            break;
        }
    }
    for quote in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            s = inner.trim();
            break;
        }
    }
    if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        s = inner;
    }
    s
}
