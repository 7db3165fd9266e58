//! Analysis layer: from a decoded trace to identified substances.
//!
//! ```text
//!  serialized trace ─ decode ─▶ Trace ─ peaks ─▶ Vec<Peak>
//!                                                  │
//!                                               mobility
//!                                                  ▼
//!                       Vec<MatchResult> ◀─ matcher ─ Vec<K0>
//! ```
//!
//! Every stage is a pure function of its inputs.

pub mod decode;
pub mod matcher;
pub mod mobility;
pub mod peaks;
pub mod smoothing;
