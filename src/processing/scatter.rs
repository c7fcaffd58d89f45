use crate::data::model::{Observable, ScatterData};
use crate::error::ObservableError;
use crate::processing::processor::{Derivation, ObservableProcessor};

pub type ScatterProcessor = ObservableProcessor<ScatterObservable>;

/// Derived quantities shared by absorbance, fluorescence and generic traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScatterObservable {
    /// Dependent axis min–max scaled to [0, 1].
    Normalized,
    /// Independent value at the highest dependent sample.
    PeakPosition,
    /// Highest dependent sample.
    PeakValue,
}

impl Derivation for ScatterObservable {
    type Source = ScatterData;
    type Settings = ();

    const ALL: &'static [Self] = &[
        ScatterObservable::Normalized,
        ScatterObservable::PeakPosition,
        ScatterObservable::PeakValue,
    ];

    fn name(self) -> &'static str {
        match self {
            ScatterObservable::Normalized => "normalized",
            ScatterObservable::PeakPosition => "peak_position",
            ScatterObservable::PeakValue => "peak_value",
        }
    }

    fn derive(self, p: &ScatterProcessor) -> Result<Observable, ObservableError> {
        let data = p.raw();
        let (x_units, y_units) = data.kind.axis_units();
        match self {
            ScatterObservable::Normalized => {
                let min = data.y.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = data.y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let range = max - min;
                let scaled = if range.abs() < f64::EPSILON {
                    vec![0.0; data.y.len()]
                } else {
                    data.y.iter().map(|&yi| (yi - min) / range).collect()
                };
                Ok(Observable::series("Normalized (a.u.)", scaled))
            }
            ScatterObservable::PeakPosition => {
                let index = peak_index(data)?;
                Ok(Observable::scalar(x_units, data.x[index]))
            }
            ScatterObservable::PeakValue => {
                let index = peak_index(data)?;
                Ok(Observable::scalar(y_units, data.y[index]))
            }
        }
    }
}

fn peak_index(data: &ScatterData) -> Result<usize, ObservableError> {
    data.y
        .iter()
        .enumerate()
        .filter(|(_, y)| !y.is_nan())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .ok_or_else(|| ObservableError::NotComputable(format!("'{}' has no samples", data.label)))
}
