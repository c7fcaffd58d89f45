use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::ObservableError;

// ---------------------------------------------------------------------------
// ObservableValue – the payload half of an observable
// ---------------------------------------------------------------------------

/// A dynamically-shaped observable payload.
///
/// Per-curve observables are scalars, series, text or timestamps. A stability
/// series aggregates them into `Series` (all members scalar) or `List`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ObservableValue {
    Scalar(f64),
    Series(Vec<f64>),
    Text(String),
    Timestamp(NaiveDateTime),
    /// Named bundle with stable keys, e.g. the IV `parameters` export.
    Record(BTreeMap<String, ObservableValue>),
    List(Vec<ObservableValue>),
    Null,
}

impl fmt::Display for ObservableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservableValue::Scalar(v) => write!(f, "{v:.6}"),
            ObservableValue::Series(v) => write!(f, "[{} values]", v.len()),
            ObservableValue::Text(s) => write!(f, "{s}"),
            ObservableValue::Timestamp(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            ObservableValue::Record(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{}", parts.join(", "))
            }
            ObservableValue::List(v) => write!(f, "[{} entries]", v.len()),
            ObservableValue::Null => write!(f, "<null>"),
        }
    }
}

impl ObservableValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ObservableValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&[f64]> {
        match self {
            ObservableValue::Series(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            ObservableValue::Timestamp(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Collapse per-member values into one sequence: `Series` when every
    /// member is a scalar, `List` otherwise. Empty input yields an empty
    /// `Series`.
    pub fn collect_members(values: Vec<ObservableValue>) -> ObservableValue {
        if values.iter().all(|v| v.as_f64().is_some()) {
            ObservableValue::Series(values.iter().filter_map(|v| v.as_f64()).collect())
        } else {
            ObservableValue::List(values)
        }
    }
}

// ---------------------------------------------------------------------------
// Observable – payload plus display unit
// ---------------------------------------------------------------------------

/// A value paired with its display unit. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observable {
    pub units: Option<String>,
    pub value: ObservableValue,
}

impl Observable {
    pub fn new(units: Option<&str>, value: ObservableValue) -> Self {
        Self {
            units: units.map(str::to_string),
            value,
        }
    }

    pub fn scalar(units: &str, value: f64) -> Self {
        Self::new(Some(units), ObservableValue::Scalar(value))
    }

    pub fn series(units: &str, values: Vec<f64>) -> Self {
        Self::new(Some(units), ObservableValue::Series(values))
    }
}

// ---------------------------------------------------------------------------
// RawStore – the file-reading collaborator seen by a processor
// ---------------------------------------------------------------------------

/// Named raw arrays/scalars of one measurement file, plus their units.
pub trait RawStore {
    fn label(&self) -> &str;

    /// Acquisition time, when the source carried one.
    fn datetime(&self) -> Option<NaiveDateTime>;

    fn allowed_observable_names(&self) -> &'static [&'static str];

    /// Return a raw field verbatim. Names outside
    /// [`RawStore::allowed_observable_names`] fail with `UnknownObservable`.
    fn get_data(&self, name: &str) -> Result<Observable, ObservableError>;

    fn get_units(&self, name: &str) -> Result<Option<String>, ObservableError> {
        Ok(self.get_data(name)?.units)
    }

    fn has_observable(&self, name: &str) -> bool {
        self.allowed_observable_names().contains(&name)
    }
}

fn datetime_value(dt: Option<NaiveDateTime>) -> ObservableValue {
    dt.map(ObservableValue::Timestamp)
        .unwrap_or(ObservableValue::Null)
}

// ---------------------------------------------------------------------------
// RawCurve – one IV sweep
// ---------------------------------------------------------------------------

pub const VOLTAGE_UNITS: &str = "Voltage (V)";
pub const CURRENT_UNITS: &str = "Current (A)";

const IV_FIELDS: &[&str] = &["label", "voltage", "current", "datetime"];

/// One bidirectional current–voltage sweep, in acquisition order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCurve {
    pub label: String,
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
    pub datetime: Option<NaiveDateTime>,
}

impl RawCurve {
    /// Build a curve, rejecting voltage/current arrays of different length.
    pub fn new(
        label: impl Into<String>,
        voltage: Vec<f64>,
        current: Vec<f64>,
        datetime: Option<NaiveDateTime>,
    ) -> Result<Self, ObservableError> {
        if voltage.len() != current.len() {
            return Err(ObservableError::LengthMismatch {
                expected: voltage.len(),
                actual: current.len(),
            });
        }
        Ok(Self {
            label: label.into(),
            voltage,
            current,
            datetime,
        })
    }

    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }
}

impl RawStore for RawCurve {
    fn label(&self) -> &str {
        &self.label
    }

    fn datetime(&self) -> Option<NaiveDateTime> {
        self.datetime
    }

    fn allowed_observable_names(&self) -> &'static [&'static str] {
        IV_FIELDS
    }

    fn get_data(&self, name: &str) -> Result<Observable, ObservableError> {
        match name {
            "label" => Ok(Observable::new(None, ObservableValue::Text(self.label.clone()))),
            "voltage" => Ok(Observable::series(VOLTAGE_UNITS, self.voltage.clone())),
            "current" => Ok(Observable::series(CURRENT_UNITS, self.current.clone())),
            "datetime" => Ok(Observable::new(None, datetime_value(self.datetime))),
            other => Err(ObservableError::UnknownObservable(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ScatterData – single x/y trace from the other instruments
// ---------------------------------------------------------------------------

/// Device families that produce a plain x/y trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Absorbance,
    Fluorescence,
    Generic,
}

impl DeviceKind {
    /// Raw names of the (independent, dependent) axes.
    pub fn axis_names(self) -> (&'static str, &'static str) {
        match self {
            DeviceKind::Absorbance => ("wavelength", "absorbance"),
            DeviceKind::Fluorescence => ("wavelength", "fluorescence"),
            DeviceKind::Generic => ("independent", "dependent"),
        }
    }

    pub fn axis_units(self) -> (&'static str, &'static str) {
        match self {
            DeviceKind::Absorbance => ("Wavelength (nm)", "Absorbance (a.u.)"),
            DeviceKind::Fluorescence => ("Wavelength (nm)", "Fluorescence (a.u.)"),
            DeviceKind::Generic => ("Independent (a.u.)", "Dependent (a.u.)"),
        }
    }

    fn fields(self) -> &'static [&'static str] {
        match self {
            DeviceKind::Absorbance => &["label", "wavelength", "absorbance", "datetime"],
            DeviceKind::Fluorescence => &["label", "wavelength", "fluorescence", "datetime"],
            DeviceKind::Generic => &["label", "independent", "dependent", "datetime"],
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Absorbance => "absorbance",
            DeviceKind::Fluorescence => "fluorescence",
            DeviceKind::Generic => "generic",
        };
        write!(f, "{name}")
    }
}

/// One x/y trace (absorbance spectrum, fluorescence spectrum, generic data).
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterData {
    pub kind: DeviceKind,
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub datetime: Option<NaiveDateTime>,
}

impl ScatterData {
    pub fn new(
        kind: DeviceKind,
        label: impl Into<String>,
        x: Vec<f64>,
        y: Vec<f64>,
        datetime: Option<NaiveDateTime>,
    ) -> Result<Self, ObservableError> {
        if x.len() != y.len() {
            return Err(ObservableError::LengthMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }
        Ok(Self {
            kind,
            label: label.into(),
            x,
            y,
            datetime,
        })
    }
}

impl RawStore for ScatterData {
    fn label(&self) -> &str {
        &self.label
    }

    fn datetime(&self) -> Option<NaiveDateTime> {
        self.datetime
    }

    fn allowed_observable_names(&self) -> &'static [&'static str] {
        self.kind.fields()
    }

    fn get_data(&self, name: &str) -> Result<Observable, ObservableError> {
        let (x_name, y_name) = self.kind.axis_names();
        let (x_units, y_units) = self.kind.axis_units();
        match name {
            "label" => Ok(Observable::new(None, ObservableValue::Text(self.label.clone()))),
            "datetime" => Ok(Observable::new(None, datetime_value(self.datetime))),
            n if n == x_name => Ok(Observable::series(x_units, self.x.clone())),
            n if n == y_name => Ok(Observable::series(y_units, self.y.clone())),
            other => Err(ObservableError::UnknownObservable(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// LbicImage – light-beam induced current map
// ---------------------------------------------------------------------------

pub const X_POSITION_UNITS: &str = "X-Position (mm)";
pub const Y_POSITION_UNITS: &str = "Y-Position (mm)";

const LBIC_FIELDS: &[&str] = &["label", "x_axis", "y_axis", "current"];

/// A scanned current map: one row of `current` per `y_axis` position, one
/// column per `x_axis` position.
#[derive(Debug, Clone, PartialEq)]
pub struct LbicImage {
    pub label: String,
    pub x_axis: Vec<f64>,
    pub y_axis: Vec<f64>,
    pub current: Vec<Vec<f64>>,
    pub datetime: Option<NaiveDateTime>,
}

impl LbicImage {
    /// Build a map, rejecting a grid that does not match its axes.
    pub fn new(
        label: impl Into<String>,
        x_axis: Vec<f64>,
        y_axis: Vec<f64>,
        current: Vec<Vec<f64>>,
        datetime: Option<NaiveDateTime>,
    ) -> Result<Self, ObservableError> {
        if current.len() != y_axis.len() {
            return Err(ObservableError::LengthMismatch {
                expected: y_axis.len(),
                actual: current.len(),
            });
        }
        if let Some(row) = current.iter().find(|row| row.len() != x_axis.len()) {
            return Err(ObservableError::LengthMismatch {
                expected: x_axis.len(),
                actual: row.len(),
            });
        }
        Ok(Self {
            label: label.into(),
            x_axis,
            y_axis,
            current,
            datetime,
        })
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.y_axis.len(), self.x_axis.len())
    }
}

impl RawStore for LbicImage {
    fn label(&self) -> &str {
        &self.label
    }

    fn datetime(&self) -> Option<NaiveDateTime> {
        self.datetime
    }

    fn allowed_observable_names(&self) -> &'static [&'static str] {
        LBIC_FIELDS
    }

    fn get_data(&self, name: &str) -> Result<Observable, ObservableError> {
        match name {
            "label" => Ok(Observable::new(None, ObservableValue::Text(self.label.clone()))),
            "x_axis" => Ok(Observable::series(X_POSITION_UNITS, self.x_axis.clone())),
            "y_axis" => Ok(Observable::series(Y_POSITION_UNITS, self.y_axis.clone())),
            "current" => Ok(Observable::new(
                Some(CURRENT_UNITS),
                ObservableValue::List(
                    self.current
                        .iter()
                        .map(|row| ObservableValue::Series(row.clone()))
                        .collect(),
                ),
            )),
            other => Err(ObservableError::UnknownObservable(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PdsData – photothermal deflection spectroscopy lock-in record
// ---------------------------------------------------------------------------

/// Column order of a PDS data file.
pub const PDS_COLUMNS: &[&str] = &[
    "time",
    "energy",
    "wavelength",
    "b_sig",
    "b_sig_err",
    "b_deg",
    "b_deg_error",
    "a_sig",
    "a_sig_err",
    "a_deg",
    "a_deg_error",
];

const PDS_FIELDS: &[&str] = &[
    "label",
    "time",
    "energy",
    "wavelength",
    "b_sig",
    "b_sig_err",
    "b_deg",
    "b_deg_error",
    "a_sig",
    "a_sig_err",
    "a_deg",
    "a_deg_error",
];

/// Two-detector lock-in readings, one sample per row of the source file.
/// Detector `a` is the reference and `b` the sample channel. Columns carry
/// no units.
#[derive(Debug, Clone, PartialEq)]
pub struct PdsData {
    pub label: String,
    columns: Vec<Vec<f64>>,
    pub datetime: Option<NaiveDateTime>,
}

impl PdsData {
    /// `columns` follow [`PDS_COLUMNS`] and must all have the same length.
    pub fn new(
        label: impl Into<String>,
        columns: Vec<Vec<f64>>,
        datetime: Option<NaiveDateTime>,
    ) -> Result<Self, ObservableError> {
        if columns.len() != PDS_COLUMNS.len() {
            return Err(ObservableError::LengthMismatch {
                expected: PDS_COLUMNS.len(),
                actual: columns.len(),
            });
        }
        let rows = columns[0].len();
        if let Some(col) = columns.iter().find(|c| c.len() != rows) {
            return Err(ObservableError::LengthMismatch {
                expected: rows,
                actual: col.len(),
            });
        }
        Ok(Self {
            label: label.into(),
            columns,
            datetime,
        })
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        PDS_COLUMNS
            .iter()
            .position(|c| *c == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn len(&self) -> usize {
        self.columns[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RawStore for PdsData {
    fn label(&self) -> &str {
        &self.label
    }

    fn datetime(&self) -> Option<NaiveDateTime> {
        self.datetime
    }

    fn allowed_observable_names(&self) -> &'static [&'static str] {
        PDS_FIELDS
    }

    fn get_data(&self, name: &str) -> Result<Observable, ObservableError> {
        if name == "label" {
            return Ok(Observable::new(None, ObservableValue::Text(self.label.clone())));
        }
        self.column(name)
            .map(|values| Observable::new(None, ObservableValue::Series(values.to_vec())))
            .ok_or_else(|| ObservableError::UnknownObservable(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_curve_rejects_mismatched_lengths() {
        let err = RawCurve::new("c", vec![0.0, 1.0], vec![0.0], None).unwrap_err();
        assert_eq!(
            err,
            ObservableError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn raw_curve_exposes_fields_with_units() {
        let curve = RawCurve::new("cell", vec![0.0, 0.5], vec![-1.0, 0.2], None).unwrap();
        let voltage = curve.get_data("voltage").unwrap();
        assert_eq!(voltage.units.as_deref(), Some(VOLTAGE_UNITS));
        assert_eq!(voltage.value.as_series(), Some(&[0.0, 0.5][..]));
        assert_eq!(curve.get_units("current").unwrap().as_deref(), Some(CURRENT_UNITS));
        assert_eq!(curve.get_data("datetime").unwrap().value, ObservableValue::Null);
        assert!(matches!(
            curve.get_data("power"),
            Err(ObservableError::UnknownObservable(_))
        ));
    }

    #[test]
    fn scatter_fields_follow_device_kind() {
        let data = ScatterData::new(
            DeviceKind::Absorbance,
            "dye",
            vec![400.0, 500.0],
            vec![0.1, 0.9],
            None,
        )
        .unwrap();
        assert!(data.has_observable("absorbance"));
        assert!(!data.has_observable("fluorescence"));
        assert_eq!(
            data.get_units("wavelength").unwrap().as_deref(),
            Some("Wavelength (nm)")
        );
    }

    #[test]
    fn collect_members_prefers_series() {
        let v = ObservableValue::collect_members(vec![
            ObservableValue::Scalar(1.0),
            ObservableValue::Scalar(2.0),
        ]);
        assert_eq!(v, ObservableValue::Series(vec![1.0, 2.0]));

        let v = ObservableValue::collect_members(vec![ObservableValue::Text("a".into())]);
        assert!(matches!(v, ObservableValue::List(_)));
    }

    #[test]
    fn lbic_grid_must_match_axes() {
        let err = LbicImage::new("map", vec![0.0, 1.0], vec![0.0], vec![vec![1.0]], None)
            .unwrap_err();
        assert_eq!(
            err,
            ObservableError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert!(LbicImage::new("map", vec![0.0], vec![0.0, 1.0], vec![vec![1.0]], None).is_err());
    }

    #[test]
    fn lbic_exposes_axes_and_current_rows() {
        let map = LbicImage::new(
            "map",
            vec![0.0, 0.5, 1.0],
            vec![0.0, 0.5],
            vec![vec![1e-6, 2e-6, 3e-6], vec![4e-6, 5e-6, 6e-6]],
            None,
        )
        .unwrap();
        assert_eq!(map.shape(), (2, 3));
        assert_eq!(map.get_units("x_axis").unwrap().as_deref(), Some(X_POSITION_UNITS));
        assert_eq!(map.get_units("y_axis").unwrap().as_deref(), Some(Y_POSITION_UNITS));
        let current = map.get_data("current").unwrap();
        assert_eq!(current.units.as_deref(), Some(CURRENT_UNITS));
        let ObservableValue::List(rows) = current.value else {
            panic!("expected rows");
        };
        assert_eq!(rows[1], ObservableValue::Series(vec![4e-6, 5e-6, 6e-6]));
        assert!(!map.has_observable("datetime"));
    }

    #[test]
    fn pds_columns_by_name() {
        let columns: Vec<Vec<f64>> = (0..PDS_COLUMNS.len()).map(|i| vec![i as f64; 3]).collect();
        let pds = PdsData::new("pds", columns, None).unwrap();
        assert_eq!(pds.len(), 3);
        assert_eq!(pds.column("a_sig"), Some(&[7.0, 7.0, 7.0][..]));
        assert_eq!(pds.get_data("b_sig").unwrap().value, ObservableValue::Series(vec![3.0; 3]));
        assert_eq!(pds.get_units("b_sig").unwrap(), None);
        assert!(matches!(
            pds.get_data("signal"),
            Err(ObservableError::UnknownObservable(_))
        ));

        let mut ragged: Vec<Vec<f64>> = vec![vec![0.0; 3]; PDS_COLUMNS.len()];
        ragged[4].pop();
        assert!(PdsData::new("pds", ragged, None).is_err());
        assert!(PdsData::new("pds", vec![vec![0.0]], None).is_err());
    }
}
