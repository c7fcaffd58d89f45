use thiserror::Error;

// ---------------------------------------------------------------------------
// CurveError – failures of the pure curve-analysis algorithms
// ---------------------------------------------------------------------------

/// Errors raised by the functions in [`crate::processing::iv_calc`].
///
/// These know nothing about observables. The processor translates them into
/// [`ObservableError`] at the call site, so the same crossing search can be
/// reported as a missing Isc or a missing Voc.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurveError {
    #[error("no negative-to-positive zero crossing in the scanned range")]
    CrossingNotFound,
    #[error("sweep reverses direction {reversals} times, at most one reversal is allowed")]
    NotMonotonic { reversals: usize },
    #[error("length mismatch: expected {expected} samples, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("no bracketing pair around {value}")]
    NoBracket { value: f64 },
    #[error("degenerate slope: both samples share the same abscissa")]
    DegenerateSlope,
}

// ---------------------------------------------------------------------------
// ObservableError – failures of the processor / aggregator protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservableError {
    #[error("unknown observable '{0}'")]
    UnknownObservable(String),
    #[error("short-circuit current could not be determined")]
    IscNotFound,
    #[error("open-circuit voltage could not be determined: {0}")]
    VocNotFound(String),
    #[error("observable not computable: {0}")]
    NotComputable(String),
    #[error("sweep reverses direction {reversals} times, at most one reversal is allowed")]
    NotMonotonic { reversals: usize },
    #[error("length mismatch: expected {expected} samples, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("observable '{name}' does not hold a {expected}")]
    WrongShape { name: String, expected: &'static str },
}

impl ObservableError {
    /// Whether the failure is a property of one curve's data (dark sweep,
    /// noise, empty power quadrant) rather than a configuration or data-format
    /// problem. Only these are turned into exclusions by a stability series.
    pub fn is_curve_specific(&self) -> bool {
        matches!(
            self,
            ObservableError::IscNotFound
                | ObservableError::VocNotFound(_)
                | ObservableError::NotComputable(_)
        )
    }
}

impl From<CurveError> for ObservableError {
    fn from(value: CurveError) -> Self {
        match value {
            CurveError::NotMonotonic { reversals } => ObservableError::NotMonotonic { reversals },
            CurveError::LengthMismatch { expected, actual } => {
                ObservableError::LengthMismatch { expected, actual }
            }
            other => ObservableError::NotComputable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_specific_classification() {
        assert!(ObservableError::IscNotFound.is_curve_specific());
        assert!(ObservableError::VocNotFound("negative".into()).is_curve_specific());
        assert!(ObservableError::NotComputable("empty".into()).is_curve_specific());
        assert!(!ObservableError::UnknownObservable("x".into()).is_curve_specific());
        assert!(!ObservableError::NotMonotonic { reversals: 2 }.is_curve_specific());
        assert!(!ObservableError::LengthMismatch { expected: 3, actual: 2 }.is_curve_specific());
    }

    #[test]
    fn data_format_errors_keep_their_kind() {
        let err: ObservableError = CurveError::NotMonotonic { reversals: 3 }.into();
        assert_eq!(err, ObservableError::NotMonotonic { reversals: 3 });

        let err: ObservableError = CurveError::DegenerateSlope.into();
        assert!(err.is_curve_specific());
    }
}
