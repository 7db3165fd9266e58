/// Data layer: record types, storage access, and polarity reconciliation.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse rows → Vec<RawMeasurementRecord>, Vec<LibraryEntry>
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ reconcile  │  pair positive-only / negative-only rows
///   └───────────┘
///        │
///        ▼
///   Vec<ReconciledRecord>  both polarities present
/// ```

pub mod loader;
pub mod model;
pub mod reconcile;
