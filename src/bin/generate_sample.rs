//! Writes a synthetic measurement batch and a matching substance library.
//!
//! Records alternate between complete, positive-only, negative-only and empty
//! captures, so the output exercises reconciliation as well as
//! identification.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use ims_analyzer::analysis::decode::{Trace, encode};
use ims_analyzer::analysis::mobility::{Environment, MobilityCalculator, MobilityConstants};
use ims_analyzer::{AnalysisConfig, ConfigFile, DriftConditions, Polarity};

const TRACE_LEN: usize = 600;
const RESOLUTION: f64 = 32.392;
const RECORDS: usize = 24;
const REACTANT_ION_INDEX: f64 = 100.0;

#[derive(Parser, Debug)]
#[command(name = "generate-sample")]
#[command(about = "Write a synthetic IMS measurement batch, library and config")]
struct Args {
    /// Directory receiving the generated files
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
}

/// Synthetic substance: drift indices of its ion peaks per polarity.
struct Substance {
    name: &'static str,
    positive: &'static [usize],
    negative: &'static [usize],
}

const SUBSTANCES: [Substance; 4] = [
    Substance { name: "Acetone", positive: &[180], negative: &[] },
    Substance { name: "Ethanol", positive: &[150, 300], negative: &[] },
    Substance { name: "Toluene", positive: &[230], negative: &[160] },
    Substance { name: "Hydrogen chloride", positive: &[], negative: &[260] },
];

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Baseline, noise, the reactant ion peak and one gaussian per drift index.
fn generate_trace(indices: &[usize], amplitude: f64, rng: &mut SimpleRng) -> Trace {
    let samples = (0..TRACE_LEN)
        .map(|i| {
            let x = i as f64;
            let signal: f64 = indices
                .iter()
                .map(|&mu| gaussian(x, mu as f64, 4.0, amplitude))
                .sum::<f64>()
                + gaussian(x, REACTANT_ION_INDEX, 5.0, 120.0);
            let value = 5.0 + signal + rng.gauss(0.0, 0.3);
            (value * 1000.0).round() / 1000.0
        })
        .collect();
    Trace::new(samples)
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Column layout of the instrument export.
#[derive(Serialize)]
struct MeasurementRow {
    measurement_time: String,
    temperature_drift_tube: f64,
    pressure: f64,
    pos_voltage: f64,
    neg_voltage: f64,
    tube_length: f64,
    pos_spectrum: String,
    neg_spectrum: String,
}

#[derive(Serialize)]
struct LibraryRow {
    substance_name: &'static str,
    k0_pos_1: Option<f64>,
    k0_pos_2: Option<f64>,
    k0_pos_3: Option<f64>,
    k0_neg_1: Option<f64>,
    k0_neg_2: Option<f64>,
    k0_neg_3: Option<f64>,
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

fn generate_rows(rng: &mut SimpleRng) -> Vec<MeasurementRow> {
    let zero = encode(&Trace::new(vec![0.0; TRACE_LEN]));
    let conditions = conditions();

    (0..RECORDS)
        .map(|i| {
            let substance = &SUBSTANCES[(i / 4) % SUBSTANCES.len()];
            let amplitude = 150.0 + 10.0 * i as f64;
            // both / positive-only / negative-only / neither
            let (capture_pos, capture_neg) = match i % 4 {
                0 => (true, true),
                1 => (true, false),
                2 => (false, true),
                _ => (false, false),
            };
            let pos_spectrum = if capture_pos {
                encode(&generate_trace(substance.positive, amplitude, rng))
            } else {
                zero.clone()
            };
            let neg_spectrum = if capture_neg {
                encode(&generate_trace(substance.negative, amplitude, rng))
            } else {
                zero.clone()
            };
            MeasurementRow {
                measurement_time: format!("2024-03-01 10:{:02}:{:02}", i / 60, i % 60),
                temperature_drift_tube: conditions.temperature_c,
                pressure: conditions.pressure_kpa,
                pos_voltage: conditions.positive_voltage,
                neg_voltage: conditions.negative_voltage,
                tube_length: conditions.tube_length,
                pos_spectrum,
                neg_spectrum,
            }
        })
        .collect()
}

fn library_rows() -> Result<Vec<LibraryRow>> {
    let calculator = MobilityCalculator::new(RESOLUTION, MobilityConstants::default())?;
    let k0s = |indices: &[usize], polarity: Polarity| -> Result<[Option<f64>; 3]> {
        let env = Environment::for_polarity(&conditions(), polarity);
        let mut slots = [None; 3];
        for (slot, &index) in slots.iter_mut().zip(indices) {
            let k0 = calculator.k0_at(index, &env)?;
            *slot = Some((k0 * 1000.0).round() / 1000.0);
        }
        Ok(slots)
    };

    SUBSTANCES
        .iter()
        .map(|s| -> Result<LibraryRow> {
            let [k0_pos_1, k0_pos_2, k0_pos_3] = k0s(s.positive, Polarity::Positive)?;
            let [k0_neg_1, k0_neg_2, k0_neg_3] = k0s(s.negative, Polarity::Negative)?;
            Ok(LibraryRow {
                substance_name: s.name,
                k0_pos_1,
                k0_pos_2,
                k0_pos_3,
                k0_neg_1,
                k0_neg_2,
                k0_neg_3,
            })
        })
        .collect()
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(path: &Path, rows: &[MeasurementRow]) -> Result<()> {
    let text = |f: fn(&MeasurementRow) -> &str| StringArray::from(rows.iter().map(f).collect::<Vec<_>>());
    let number = |f: fn(&MeasurementRow) -> f64| Float64Array::from(rows.iter().map(f).collect::<Vec<_>>());

    let schema = Arc::new(Schema::new(vec![
        Field::new("measurement_time", DataType::Utf8, false),
        Field::new("temperature_drift_tube", DataType::Float64, false),
        Field::new("pressure", DataType::Float64, false),
        Field::new("pos_voltage", DataType::Float64, false),
        Field::new("neg_voltage", DataType::Float64, false),
        Field::new("tube_length", DataType::Float64, false),
        Field::new("pos_spectrum", DataType::Utf8, false),
        Field::new("neg_spectrum", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(text(|r| r.measurement_time.as_str())),
            Arc::new(number(|r| r.temperature_drift_tube)),
            Arc::new(number(|r| r.pressure)),
            Arc::new(number(|r| r.pos_voltage)),
            Arc::new(number(|r| r.neg_voltage)),
            Arc::new(number(|r| r.tube_length)),
            Arc::new(text(|r| r.pos_spectrum.as_str())),
            Arc::new(text(|r| r.neg_spectrum.as_str())),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    std::fs::create_dir_all(&args.out_dir)?;
    let mut rng = SimpleRng::new(42);

    let rows = generate_rows(&mut rng);
    let measurements_csv = args.out_dir.join("sample_measurements.csv");
    let measurements_parquet = args.out_dir.join("sample_measurements.parquet");
    write_csv(&measurements_csv, &rows)?;
    write_parquet(&measurements_parquet, &rows)?;

    let library_csv = args.out_dir.join("sample_library.csv");
    write_csv(&library_csv, &library_rows()?)?;

    let config_path = args.out_dir.join("analysis.toml");
    let config = ConfigFile {
        analysis: AnalysisConfig {
            resolution: Some(RESOLUTION),
            ..AnalysisConfig::default()
        },
    };
    std::fs::write(&config_path, toml::to_string(&config)?)?;

    println!(
        "Wrote {RECORDS} records ({TRACE_LEN} samples per trace) to {} and {}",
        measurements_csv.display(),
        measurements_parquet.display()
    );
    println!("Wrote {} substances to {}", SUBSTANCES.len(), library_csv.display());
    println!(
        "Run: ims-analyzer --records {} --library {} --config {}",
        measurements_parquet.display(),
        library_csv.display(),
        config_path.display()
    );
    Ok(())
}
