use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, Float32Array, Float64Array, LargeListArray, ListArray, StringArray,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{DeviceKind, LbicImage, PdsData, RawCurve, ScatterData, PDS_COLUMNS};
use super::timestamp::parse_timestamp;
use crate::config::TimestampFormat;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load one IV sweep. Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.txt` / `.dat` – two columns, voltage then current
/// * `.json`                  – `{ "voltage": [...], "current": [...], "label"?, "datetime"? }`
///
/// The label defaults to the file stem and the acquisition time is read from
/// the file name.
pub fn load_curve(path: &Path, format: &TimestampFormat) -> Result<RawCurve> {
    let (label, datetime) = identity_from_path(path, format);
    match extension(path).as_str() {
        "csv" | "txt" | "dat" => {
            let (voltage, current) = read_two_columns(path)?;
            RawCurve::new(label, voltage, current, datetime)
                .with_context(|| format!("building curve from {}", path.display()))
        }
        "json" => {
            let text = std::fs::read_to_string(path).context("reading JSON file")?;
            let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;
            let obj = root.as_object().context("Expected top-level JSON object")?;
            json_to_curve(obj, 0, label, datetime, format)
        }
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Load a file holding a whole series of sweeps, in file order.
///
/// * `.json`    – `[{ "label": ..., "voltage": [...], "current": [...], "datetime"?: ... }, ...]`
/// * `.parquet` – list columns `voltage` and `current`, string `label`,
///   optional string `datetime`
pub fn load_series_file(path: &Path, format: &TimestampFormat) -> Result<Vec<RawCurve>> {
    match extension(path).as_str() {
        "parquet" | "pq" => load_series_parquet(path, format),
        "json" => load_series_json(path, format),
        other => bail!("Unsupported series file extension: .{other}"),
    }
}

/// Load every sweep a file holds: one for curve files, all rows for series
/// files. A JSON file is a series when its top level is an array.
pub fn load_curves(path: &Path, format: &TimestampFormat) -> Result<Vec<RawCurve>> {
    match extension(path).as_str() {
        "parquet" | "pq" => load_series_parquet(path, format),
        "json" => {
            let text = std::fs::read_to_string(path).context("reading JSON file")?;
            let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;
            if root.is_array() {
                load_series_json(path, format)
            } else {
                load_curve(path, format).map(|curve| vec![curve])
            }
        }
        _ => load_curve(path, format).map(|curve| vec![curve]),
    }
}

/// Load an x/y trace from a two-column text file.
pub fn load_scatter(path: &Path, kind: DeviceKind, format: &TimestampFormat) -> Result<ScatterData> {
    let (label, datetime) = identity_from_path(path, format);
    let (x, y) = read_two_columns(path)?;
    ScatterData::new(kind, label, x, y, datetime)
        .with_context(|| format!("building {kind} trace from {}", path.display()))
}

/// Load an LBIC current map.
///
/// The first row holds the x positions after one leading corner cell; every
/// following row is a y position followed by one current per x position.
/// Rows whose currents are all zero are dropped together with their y
/// position.
pub fn load_lbic(path: &Path, format: &TimestampFormat) -> Result<LbicImage> {
    let (label, datetime) = identity_from_path(path, format);
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let delimiter = sniff_delimiter(&text);
    let mut records = delimited_reader(&text, delimiter).into_records();

    let header = records
        .next()
        .with_context(|| format!("{}: empty LBIC file", path.display()))??;
    let x_axis = header
        .iter()
        .skip(1)
        .filter(|f| !f.is_empty())
        .map(|f| parse_number(f, delimiter).with_context(|| format!("x position '{f}'")))
        .collect::<Result<Vec<_>>>()?;

    let mut y_axis = Vec::new();
    let mut current = Vec::new();
    let mut dropped = 0usize;
    for (row_no, record) in records.enumerate() {
        let record = record.with_context(|| format!("{} row {}", path.display(), row_no + 1))?;
        let mut values = record
            .iter()
            .filter(|f| !f.is_empty())
            .map(|f| {
                parse_number(f, delimiter)
                    .with_context(|| format!("row {}: '{f}' is not a number", row_no + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        if values.is_empty() {
            continue;
        }
        let y = values.remove(0);
        if values.iter().all(|v| *v == 0.0) {
            dropped += 1;
            continue;
        }
        y_axis.push(y);
        current.push(values);
    }
    if dropped > 0 {
        log::debug!("{}: dropped {dropped} all-zero rows", path.display());
    }

    LbicImage::new(label, x_axis, y_axis, current, datetime)
        .with_context(|| format!("building LBIC map from {}", path.display()))
}

/// Lines of free-form header preceding the data in a PDS file.
const PDS_HEADER_LINES: usize = 10;

/// Load a PDS record: a fixed header, then one row per sample with the
/// columns in [`PDS_COLUMNS`] order.
pub fn load_pds(path: &Path, format: &TimestampFormat) -> Result<PdsData> {
    let (label, datetime) = identity_from_path(path, format);
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let body = text
        .lines()
        .skip(PDS_HEADER_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    let delimiter = sniff_delimiter(&body);

    let mut columns = vec![Vec::new(); PDS_COLUMNS.len()];
    for (row_no, record) in delimited_reader(&body, delimiter).records().enumerate() {
        let line = PDS_HEADER_LINES + row_no + 1;
        let record = record.with_context(|| format!("{} line {line}", path.display()))?;
        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < PDS_COLUMNS.len() {
            bail!(
                "{} line {line}: expected {} columns, found {}",
                path.display(),
                PDS_COLUMNS.len(),
                fields.len()
            );
        }
        for (column, field) in columns.iter_mut().zip(&fields) {
            let value = parse_number(field, delimiter)
                .with_context(|| format!("{} line {line}: '{field}' is not a number", path.display()))?;
            column.push(value);
        }
    }

    PdsData::new(label, columns, datetime)
        .with_context(|| format!("building PDS record from {}", path.display()))
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn identity_from_path(
    path: &Path,
    format: &TimestampFormat,
) -> (String, Option<chrono::NaiveDateTime>) {
    let label = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let datetime = path
        .file_name()
        .and_then(|s| s.to_str())
        .and_then(|name| parse_timestamp(name, format));
    (label, datetime)
}

// ---------------------------------------------------------------------------
// Two-column text loader
// ---------------------------------------------------------------------------

/// Pick the delimiter from the first non-empty line: `;`, tab, `,`, else
/// whitespace.
fn sniff_delimiter(text: &str) -> u8 {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    for candidate in [b';', b'\t', b','] {
        if line.as_bytes().contains(&candidate) {
            return candidate;
        }
    }
    b' '
}

/// Read the first two numeric fields of every row.
///
/// Rows with fewer than two fields or non-numeric fields (headers, comments)
/// are skipped. Unless the delimiter is a comma, a decimal comma is accepted.
fn read_two_columns(path: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let delimiter = sniff_delimiter(&text);

    let mut reader = delimited_reader(&text, delimiter);

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut skipped = 0usize;

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("{} row {row_no}", path.display()))?;
        let mut fields = record.iter().filter(|f| !f.is_empty());
        let (Some(x), Some(y)) = (fields.next(), fields.next()) else {
            skipped += 1;
            continue;
        };
        match (parse_number(x, delimiter), parse_number(y, delimiter)) {
            (Some(x), Some(y)) => {
                xs.push(x);
                ys.push(y);
            }
            _ => skipped += 1,
        }
    }

    if xs.is_empty() {
        bail!("{}: no numeric rows found", path.display());
    }
    if skipped > 0 {
        log::debug!("{}: skipped {skipped} non-numeric rows", path.display());
    }
    Ok((xs, ys))
}

fn delimited_reader(text: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes())
}

fn parse_number(field: &str, delimiter: u8) -> Option<f64> {
    if delimiter == b',' {
        field.parse().ok()
    } else {
        field.replace(',', ".").parse().ok()
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

fn load_series_json(path: &Path, format: &TimestampFormat) -> Result<Vec<RawCurve>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    records
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let obj = rec
                .as_object()
                .with_context(|| format!("Row {i} is not a JSON object"))?;
            json_to_curve(obj, i, format!("curve {i}"), None, format)
        })
        .collect()
}

/// `label` and `datetime` keys override the fallbacks when present.
fn json_to_curve(
    obj: &serde_json::Map<String, JsonValue>,
    row: usize,
    fallback_label: String,
    fallback_datetime: Option<chrono::NaiveDateTime>,
    format: &TimestampFormat,
) -> Result<RawCurve> {
    let voltage = json_array_to_f64(obj.get("voltage"), row, "voltage")?;
    let current = json_array_to_f64(obj.get("current"), row, "current")?;
    let label = obj
        .get("label")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or(fallback_label);
    let datetime = obj
        .get("datetime")
        .and_then(|v| v.as_str())
        .and_then(|s| parse_timestamp(s, format))
        .or(fallback_datetime);

    RawCurve::new(label, voltage, current, datetime).with_context(|| format!("Row {row}"))
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// One row per sweep. Works with files written by Pandas, Polars or
/// `generate_sample`.
fn load_series_parquet(path: &Path, format: &TimestampFormat) -> Result<Vec<RawCurve>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut curves = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let v_idx = schema
            .index_of("voltage")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'voltage' column"))?;
        let i_idx = schema
            .index_of("current")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'current' column"))?;
        let label_col = schema.index_of("label").ok().map(|i| batch.column(i));
        let datetime_col = schema.index_of("datetime").ok().map(|i| batch.column(i));

        for row in 0..batch.num_rows() {
            let n = curves.len();
            let voltage = extract_f64_list(batch.column(v_idx), row)
                .with_context(|| format!("Row {n}: failed to read 'voltage'"))?;
            let current = extract_f64_list(batch.column(i_idx), row)
                .with_context(|| format!("Row {n}: failed to read 'current'"))?;
            let label = label_col
                .and_then(|col| extract_string(col, row))
                .unwrap_or_else(|| format!("curve {n}"));
            let datetime = datetime_col
                .and_then(|col| extract_string(col, row))
                .and_then(|s| parse_timestamp(&s, format));

            curves.push(
                RawCurve::new(label, voltage, current, datetime)
                    .with_context(|| format!("Row {n}"))?,
            );
        }
    }

    Ok(curves)
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

fn extract_string(col: &Arc<dyn Array>, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    match col.data_type() {
        DataType::Utf8 => col
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|s| s.value(row).to_string()),
        DataType::LargeUtf8 => Some(col.as_string::<i64>().value(row).to_string()),
        _ => None,
    }
}
