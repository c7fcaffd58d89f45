use crate::data::model::{Observable, ObservableValue, PdsData};
use crate::error::ObservableError;
use crate::processing::processor::{Derivation, ObservableProcessor};

pub type PdsProcessor = ObservableProcessor<PdsObservable>;

/// Derived PDS quantities. Both are unitless, like the raw columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PdsObservable {
    /// Sample channel over reference channel, `b_sig / a_sig`.
    Signal,
    /// Signal error from the relative errors of both channels.
    SignalError,
}

impl Derivation for PdsObservable {
    type Source = PdsData;
    type Settings = ();

    const ALL: &'static [Self] = &[PdsObservable::Signal, PdsObservable::SignalError];

    fn name(self) -> &'static str {
        match self {
            PdsObservable::Signal => "signal",
            PdsObservable::SignalError => "signal_error",
        }
    }

    fn derive(self, p: &PdsProcessor) -> Result<Observable, ObservableError> {
        match self {
            PdsObservable::Signal => {
                let a = nonzero_channel(p, "a_sig")?;
                let b = p.raw_series("b_sig")?;
                let signal = b.iter().zip(&a).map(|(b, a)| b / a).collect();
                Ok(Observable::new(None, ObservableValue::Series(signal)))
            }
            PdsObservable::SignalError => {
                let signal = p.series(PdsObservable::Signal)?;
                let a = nonzero_channel(p, "a_sig")?;
                let b = nonzero_channel(p, "b_sig")?;
                let a_err = p.raw_series("a_sig_err")?;
                let b_err = p.raw_series("b_sig_err")?;
                let error = (0..signal.len())
                    .map(|k| signal[k] * (b_err[k] / b[k] + a_err[k] / a[k]))
                    .collect();
                Ok(Observable::new(None, ObservableValue::Series(error)))
            }
        }
    }
}

/// A channel used as a divisor; any zero sample makes the quotient undefined.
fn nonzero_channel(p: &PdsProcessor, name: &str) -> Result<Vec<f64>, ObservableError> {
    let values = p.raw_series(name)?;
    if let Some(k) = values.iter().position(|v| *v == 0.0) {
        return Err(ObservableError::NotComputable(format!(
            "'{}': {name} is zero at sample {k}",
            p.label()
        )));
    }
    Ok(values)
}
