use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeBinaryArray, StringArray,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;

use super::model::{DriftConditions, LibraryEntry, RawMeasurementRecord};
use crate::error::{Diagnostic, Stage};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Measurement records as read from storage, plus the rows that could not
/// be turned into records.
#[derive(Debug, Clone, Default)]
pub struct LoadedRecords {
    /// Parsed records in storage order.
    pub records: Vec<RawMeasurementRecord>,
    /// Storage row of each entry in `records`.
    pub rows: Vec<usize>,
    /// One `Stage::Decode` diagnostic per skipped row, indexed by storage row.
    pub skipped: Vec<Diagnostic>,
}

impl LoadedRecords {
    /// Every record parsed; storage rows equal positions.
    fn complete(records: Vec<RawMeasurementRecord>) -> Self {
        Self {
            rows: (0..records.len()).collect(),
            records,
            skipped: Vec::new(),
        }
    }

    /// Storage row of the record at `position` in `records`.
    pub fn storage_row(&self, position: usize) -> usize {
        self.rows.get(position).copied().unwrap_or(position)
    }
}

/// Load raw measurement records. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – the instrument export, one row per measurement
/// * `.json`    – `[{ "measurement_time": ..., "pos_spectrum": "[...]", ... }, ...]`
/// * `.parquet` – same column names, spectra as Utf8 or Binary columns
///
/// Records are returned in storage order.
pub fn load_records(path: &Path) -> Result<LoadedRecords> {
    let loaded = match extension(path).as_str() {
        "csv" => load_records_csv(path)?,
        "json" => LoadedRecords::complete(load_records_json(path)?),
        "parquet" | "pq" => LoadedRecords::complete(load_records_parquet(path)?),
        other => bail!("Unsupported measurement file extension: .{other}"),
    };
    log::info!(
        "loaded {} measurement records from {} ({} rows skipped)",
        loaded.records.len(),
        path.display(),
        loaded.skipped.len()
    );
    Ok(loaded)
}

/// Load the substance library from `.csv` or `.json`.
pub fn load_library(path: &Path) -> Result<Vec<LibraryEntry>> {
    let rows: Vec<LibraryRow> = match extension(path).as_str() {
        "csv" => {
            let mut reader = csv::Reader::from_path(path).context("opening library CSV")?;
            reader
                .deserialize()
                .enumerate()
                .map(|(i, row)| row.with_context(|| format!("library CSV row {i}")))
                .collect::<Result<_>>()?
        }
        "json" => {
            let text = std::fs::read_to_string(path).context("reading library JSON")?;
            serde_json::from_str(&text).context("parsing library JSON")?
        }
        other => bail!("Unsupported library file extension: .{other}"),
    };
    let entries: Vec<LibraryEntry> = rows.into_iter().map(LibraryEntry::from).collect();
    log::info!("loaded {} library entries from {}", entries.len(), path.display());
    Ok(entries)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Row layouts shared by CSV and JSON
// ---------------------------------------------------------------------------

/// One measurement row. Extra columns (`channel_1..8`, `dilution`,
/// `press_offset`, ...) are ignored.
#[derive(Debug, Deserialize)]
struct MeasurementRow {
    measurement_time: String,
    pos_spectrum: String,
    neg_spectrum: String,
    temperature_drift_tube: f64,
    pressure: f64,
    pos_voltage: f64,
    neg_voltage: f64,
    tube_length: f64,
}

impl From<MeasurementRow> for RawMeasurementRecord {
    fn from(row: MeasurementRow) -> Self {
        RawMeasurementRecord {
            measurement_time: row.measurement_time,
            positive_spectrum: row.pos_spectrum,
            negative_spectrum: row.neg_spectrum,
            conditions: DriftConditions {
                temperature_c: row.temperature_drift_tube,
                pressure_kpa: row.pressure,
                positive_voltage: row.pos_voltage,
                negative_voltage: row.neg_voltage,
                tube_length: row.tube_length,
            },
        }
    }
}

/// One library row. Blank or missing slots mean "not used".
#[derive(Debug, Deserialize)]
struct LibraryRow {
    substance_name: String,
    #[serde(default)]
    k0_pos_1: Option<f64>,
    #[serde(default)]
    k0_pos_2: Option<f64>,
    #[serde(default)]
    k0_pos_3: Option<f64>,
    #[serde(default)]
    k0_neg_1: Option<f64>,
    #[serde(default)]
    k0_neg_2: Option<f64>,
    #[serde(default)]
    k0_neg_3: Option<f64>,
}

impl From<LibraryRow> for LibraryEntry {
    fn from(row: LibraryRow) -> Self {
        let slot = |v: Option<f64>| v.unwrap_or(0.0);
        LibraryEntry {
            name: row.substance_name,
            k0_pos: [slot(row.k0_pos_1), slot(row.k0_pos_2), slot(row.k0_pos_3)],
            k0_neg: [slot(row.k0_neg_1), slot(row.k0_neg_2), slot(row.k0_neg_3)],
        }
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, spectra quoted as
/// `"[0.0, 1.2, ...]"`. Rows whose numeric columns do not parse are
/// skipped and reported in `LoadedRecords::skipped`; the rest of the file
/// is still used.
fn load_records_csv(path: &Path) -> Result<LoadedRecords> {
    let mut reader = csv::Reader::from_path(path).context("opening measurement CSV")?;
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let mut time_column = None;
    for required in ["measurement_time", "pos_spectrum", "neg_spectrum"] {
        match headers.iter().position(|h| h == required) {
            Some(i) if required == "measurement_time" => time_column = Some(i),
            Some(_) => {}
            None => bail!("CSV missing '{required}' column"),
        }
    }

    let mut loaded = LoadedRecords::default();
    for (row_no, result) in reader.records().enumerate() {
        let raw = result.with_context(|| format!("CSV row {row_no}"))?;
        match raw.deserialize::<MeasurementRow>(Some(&headers)) {
            Ok(row) => {
                loaded.records.push(row.into());
                loaded.rows.push(row_no);
            }
            Err(e) => {
                let time = time_column.and_then(|i| raw.get(i)).unwrap_or("");
                let diag = Diagnostic::new(row_no, time, Stage::Decode, format!("unreadable CSV row: {e}"));
                log::warn!("{diag}");
                loaded.skipped.push(diag);
            }
        }
    }
    Ok(loaded)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON, the layout of `df.to_json(orient='records')`.
fn load_records_json(path: &Path) -> Result<Vec<RawMeasurementRecord>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let rows: Vec<MeasurementRow> = serde_json::from_str(&text).context("parsing JSON")?;
    Ok(rows.into_iter().map(RawMeasurementRecord::from).collect())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet measurement table.
///
/// Numeric columns may be Float64, Float32, Int64 or Int32; spectrum
/// columns Utf8, LargeUtf8, Binary or LargeBinary (BLOB exports).
fn load_records_parquet(path: &Path) -> Result<Vec<RawMeasurementRecord>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut records = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        records.extend(records_from_batch(&batch)?);
    }
    Ok(records)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow::anyhow!("Parquet file missing '{name}' column"))?;
    Ok(batch.column(idx))
}

fn records_from_batch(batch: &RecordBatch) -> Result<Vec<RawMeasurementRecord>> {
    let time = column(batch, "measurement_time")?;
    let pos = column(batch, "pos_spectrum")?;
    let neg = column(batch, "neg_spectrum")?;
    let temperature = column(batch, "temperature_drift_tube")?;
    let pressure = column(batch, "pressure")?;
    let pos_voltage = column(batch, "pos_voltage")?;
    let neg_voltage = column(batch, "neg_voltage")?;
    let tube_length = column(batch, "tube_length")?;

    (0..batch.num_rows())
        .map(|row| {
            let number = |col: &ArrayRef, name: &str| {
                extract_f64(col, row).with_context(|| format!("Row {row}: failed to read '{name}'"))
            };
            let text = |col: &ArrayRef, name: &str| {
                extract_text(col, row).with_context(|| format!("Row {row}: failed to read '{name}'"))
            };
            Ok(RawMeasurementRecord {
                measurement_time: text(time, "measurement_time")?,
                positive_spectrum: text(pos, "pos_spectrum")?,
                negative_spectrum: text(neg, "neg_spectrum")?,
                conditions: DriftConditions {
                    temperature_c: number(temperature, "temperature_drift_tube")?,
                    pressure_kpa: number(pressure, "pressure")?,
                    positive_voltage: number(pos_voltage, "pos_voltage")?,
                    negative_voltage: number(neg_voltage, "neg_voltage")?,
                    tube_length: number(tube_length, "tube_length")?,
                },
            })
        })
        .collect()
}

// -- Parquet / Arrow helpers --

/// Extract a number from a numeric column at the given row.
fn extract_f64(col: &ArrayRef, row: usize) -> Result<f64> {
    if col.is_null(row) {
        bail!("null value in numeric column");
    }
    let value = match col.data_type() {
        DataType::Float64 => col.as_any().downcast_ref::<Float64Array>().map(|a| a.value(row)),
        DataType::Float32 => col.as_any().downcast_ref::<Float32Array>().map(|a| a.value(row) as f64),
        DataType::Int64 => col.as_any().downcast_ref::<Int64Array>().map(|a| a.value(row) as f64),
        DataType::Int32 => col.as_any().downcast_ref::<Int32Array>().map(|a| a.value(row) as f64),
        other => bail!("Expected a numeric column, got {other:?}"),
    };
    value.context("column does not match its declared type")
}

/// Extract text from a string or binary column at the given row.
fn extract_text(col: &ArrayRef, row: usize) -> Result<String> {
    if col.is_null(row) {
        bail!("null value in text column");
    }
    let bytes = match col.data_type() {
        DataType::Utf8 => {
            let arr = col
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected StringArray")?;
            return Ok(arr.value(row).to_string());
        }
        DataType::LargeUtf8 => return Ok(col.as_string::<i64>().value(row).to_string()),
        DataType::Binary => col
            .as_any()
            .downcast_ref::<BinaryArray>()
            .context("expected BinaryArray")?
            .value(row),
        DataType::LargeBinary => col
            .as_any()
            .downcast_ref::<LargeBinaryArray>()
            .context("expected LargeBinaryArray")?
            .value(row),
        other => bail!("Expected a string or binary column, got {other:?}"),
    };
    String::from_utf8(bytes.to_vec()).context("binary column is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use arrow::datatypes::{Field, Schema};
    use parquet::arrow::ArrowWriter;
    use tempfile::tempdir;

    const HEADER: &str = "measurement_time,channel_1,dilution,temperature_drift_tube,pressure,\
pos_voltage,neg_voltage,tube_length,press_offset,pos_spectrum,neg_spectrum";

    #[test]
    fn csv_export_with_extra_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("measurements.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "2024-03-01 10:00:00,1.0,0.5,45.0,101.3,2500,2400,7.0,0.1,\"[0.0, 3.0, 0.0]\",\"[0.0, 0.0, 0.0]\"").unwrap();
        writeln!(file, "2024-03-01 10:00:01,1.0,0.5,not-a-number,101.3,2500,2400,7.0,0.1,\"[0.0]\",\"[0.0]\"").unwrap();
        writeln!(file, "2024-03-01 10:00:02,1.0,0.5,45.5,101.2,2500,2400,7.0,0.1,\"[0.0, 0.0, 0.0]\",\"[0.0, 4.0, 0.0]\"").unwrap();
        drop(file);

        let loaded = load_records(&path).unwrap();
        let records = &loaded.records;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].measurement_time, "2024-03-01 10:00:00");
        assert_eq!(records[0].positive_spectrum, "[0.0, 3.0, 0.0]");
        assert_eq!(records[0].conditions.negative_voltage, 2400.0);
        assert_eq!(records[1].conditions.temperature_c, 45.5);

        // the unreadable row is reported at its storage position
        assert_eq!(loaded.rows, vec![0, 2]);
        assert_eq!(loaded.storage_row(1), 2);
        assert_eq!(loaded.skipped.len(), 1);
        assert_eq!(loaded.skipped[0].record, 1);
        assert_eq!(loaded.skipped[0].measurement_time, "2024-03-01 10:00:01");
        assert_eq!(loaded.skipped[0].stage, Stage::Decode);
    }

    #[test]
    fn csv_without_spectra_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "measurement_time,pressure\nt1,1.0\n").unwrap();
        assert!(load_records(&path).is_err());
    }

    #[test]
    fn json_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("measurements.json");
        std::fs::write(
            &path,
            r#"[{"measurement_time": "t1", "pos_spectrum": "[1.0, 2.0]", "neg_spectrum": "[0.0, 0.0]",
                 "temperature_drift_tube": 40, "pressure": 100.5, "pos_voltage": 3000,
                 "neg_voltage": 3000, "tube_length": 6.5, "dilution": 1}]"#,
        )
        .unwrap();
        let loaded = load_records(&path).unwrap();
        let records = &loaded.records;
        assert_eq!(records.len(), 1);
        assert_eq!(loaded.rows, vec![0]);
        assert_eq!(records[0].conditions.tube_length, 6.5);
        assert_eq!(records[0].conditions.temperature_c, 40.0);
    }

    #[test]
    fn parquet_with_binary_spectra() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("measurements.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("measurement_time", DataType::Utf8, false),
            Field::new("pos_spectrum", DataType::Binary, false),
            Field::new("neg_spectrum", DataType::Utf8, false),
            Field::new("temperature_drift_tube", DataType::Float64, false),
            Field::new("pressure", DataType::Float32, false),
            Field::new("pos_voltage", DataType::Int64, false),
            Field::new("neg_voltage", DataType::Int32, false),
            Field::new("tube_length", DataType::Float64, false),
        ]));
        let pos: Vec<&[u8]> = vec![&b"[0.0, 5.0, 0.0]"[..], &b"[0.0, 0.0, 0.0]"[..]];
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["t1", "t2"])),
                Arc::new(BinaryArray::from(pos)),
                Arc::new(StringArray::from(vec!["[0.0, 0.0, 0.0]", "[0.0, 6.0, 0.0]"])),
                Arc::new(Float64Array::from(vec![41.0, 42.0])),
                Arc::new(Float32Array::from(vec![100.5f32, 100.25])),
                Arc::new(Int64Array::from(vec![2500, 2500])),
                Arc::new(Int32Array::from(vec![2400, 2400])),
                Arc::new(Float64Array::from(vec![7.0, 7.0])),
            ],
        )
        .unwrap();
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let loaded = load_records(&path).unwrap();
        let records = &loaded.records;
        assert_eq!(records.len(), 2);
        assert!(loaded.skipped.is_empty());
        assert_eq!(records[0].positive_spectrum, "[0.0, 5.0, 0.0]");
        assert_eq!(records[1].negative_spectrum, "[0.0, 6.0, 0.0]");
        assert_eq!(records[1].conditions.pressure_kpa, 100.25);
        assert_eq!(records[1].conditions.negative_voltage, 2400.0);
    }

    #[test]
    fn library_csv_with_blank_slots() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.csv");
        std::fs::write(
            &path,
            "substance_name,k0_pos_1,k0_pos_2,k0_pos_3,k0_neg_1,k0_neg_2,k0_neg_3\n\
             HCl,,,,2.15,,\n\
             Acetone,1.82,2.05,0,,,\n",
        )
        .unwrap();
        let library = load_library(&path).unwrap();
        assert_eq!(library.len(), 2);
        assert_eq!(library[0].name, "HCl");
        assert_eq!(library[0].k0_neg, [2.15, 0.0, 0.0]);
        assert_eq!(library[1].k0_pos, [1.82, 2.05, 0.0]);
    }

    #[test]
    fn library_json_with_missing_slots() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.json");
        std::fs::write(&path, r#"[{"substance_name": "NH3", "k0_pos_1": 2.3}]"#).unwrap();
        let library = load_library(&path).unwrap();
        assert_eq!(library[0].k0_pos, [2.3, 0.0, 0.0]);
        assert_eq!(library[0].k0_neg, [0.0; 3]);
    }

    #[test]
    fn unsupported_extension() {
        assert!(load_records(Path::new("data.xlsx")).is_err());
        assert!(load_library(Path::new("library.txt")).is_err());
    }
}
