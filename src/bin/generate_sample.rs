use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Builder, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use parquet::arrow::ArrowWriter;

use xlab_iv::data::timestamp::format_timestamp;

/// Single-diode cell: dark diode current minus photocurrent plus shunt leak.
fn diode_current(v: f64, photocurrent: f64) -> f64 {
    const SATURATION: f64 = 1e-9;
    const THERMAL: f64 = 0.03;
    const SHUNT: f64 = 500.0;
    SATURATION * ((v / THERMAL).exp() - 1.0) - photocurrent + v / SHUNT
}

/// Forward then reverse sweep, -0.2 V to 0.8 V and back.
fn sweep_voltages() -> Vec<f64> {
    let up = (0..=100).map(|k| -0.2 + 0.01 * k as f64);
    let down = (0..100).rev().map(|k| -0.2 + 0.01 * k as f64);
    up.chain(down).collect()
}

struct Sweep {
    label: String,
    datetime: NaiveDateTime,
    voltage: Vec<f64>,
    current: Vec<f64>,
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

/// Twelve illuminated sweeps with a slowly decaying photocurrent, plus one
/// dark sweep without a Voc in the middle of the campaign.
fn campaign(start: NaiveDateTime, rng: &mut SimpleRng) -> Vec<Sweep> {
    let voltage = sweep_voltages();
    let mut sweeps = Vec::new();

    for step in 0..12u32 {
        let datetime = start + Duration::hours(4 * i64::from(step));
        let photocurrent = 0.020 * (-(f64::from(step)) / 40.0).exp();
        let current = voltage
            .iter()
            .map(|&v| diode_current(v, photocurrent) + rng.gauss(0.0, 2e-6))
            .collect();
        sweeps.push(Sweep {
            label: format!("IV_{}", format_timestamp(datetime)),
            datetime,
            voltage: voltage.clone(),
            current,
        });

        if step == 5 {
            let datetime = datetime + Duration::minutes(30);
            let dark_voltage: Vec<f64> = (0..=50).map(|k| -0.5 + 0.01 * k as f64).collect();
            let dark_current = dark_voltage
                .iter()
                .map(|&v| -0.01 + v * 0.001 + rng.gauss(0.0, 1e-6))
                .collect();
            sweeps.push(Sweep {
                label: format!("IV_{}", format_timestamp(datetime)),
                datetime,
                voltage: dark_voltage,
                current: dark_current,
            });
        }
    }
    sweeps
}

fn write_csv(dir: &Path, sweep: &Sweep) -> Result<()> {
    let mut text = String::from("Voltage (V);Current (A)\n");
    for (v, i) in sweep.voltage.iter().zip(&sweep.current) {
        writeln!(text, "{v:.4};{i:.9e}")?;
    }
    let path = dir.join(format!("{}.csv", sweep.label));
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
}

fn list_array(rows: impl Iterator<Item = Vec<f64>>) -> arrow::array::ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        builder.values().append_slice(&row);
        builder.append(true);
    }
    builder.finish()
}

fn write_parquet(path: &Path, sweeps: &[Sweep]) -> Result<()> {
    let voltage = list_array(sweeps.iter().map(|s| s.voltage.clone()));
    let current = list_array(sweeps.iter().map(|s| s.current.clone()));
    let labels = StringArray::from(sweeps.iter().map(|s| s.label.as_str()).collect::<Vec<_>>());
    let datetimes = StringArray::from(
        sweeps
            .iter()
            .map(|s| s.datetime.format("%Y-%m-%d_%H_%M_%S").to_string())
            .collect::<Vec<_>>(),
    );

    let item = Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("voltage", DataType::List(item.clone()), false),
        Field::new("current", DataType::List(item), false),
        Field::new("label", DataType::Utf8, false),
        Field::new("datetime", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(voltage),
            Arc::new(current),
            Arc::new(labels),
            Arc::new(datetimes),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing writer")?;
    Ok(())
}

fn main() -> Result<()> {
    let out_dir = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "sample_campaign".to_string()),
    );
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let start = NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .context("invalid campaign start")?;
    let mut rng = SimpleRng::new(42);
    let sweeps = campaign(start, &mut rng);

    for sweep in &sweeps {
        write_csv(&out_dir, sweep)?;
    }
    let parquet_path = out_dir.join("campaign.parquet");
    write_parquet(&parquet_path, &sweeps)?;

    println!(
        "Wrote {} sweeps to {} (CSV per sweep and {}); start the analysis at {}",
        sweeps.len(),
        out_dir.display(),
        parquet_path.display(),
        start.format("%Y-%m-%d_%H_%M_%S")
    );
    Ok(())
}
