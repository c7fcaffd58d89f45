use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::data::model::{Observable, ObservableValue};
use crate::error::ObservableError;
use crate::processing::processor::{Derivation, ObservableProcessor, ObservableSource};

/// Series-level observable: hours between the campaign start and each curve.
pub const ELAPSED_TIME: &str = "elapsed_time";
pub const ELAPSED_TIME_UNITS: &str = "Elapsed time (hrs)";

/// A member removed by [`StabilitySeries::validate_observables`].
#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    pub label: String,
    pub reason: ObservableError,
}

// ---------------------------------------------------------------------------
// StabilitySeries
// ---------------------------------------------------------------------------

/// Repeated measurements of one cell, in acquisition order.
///
/// Members are never reordered; validation only removes them. Aggregated
/// observables are memoized until the next validation that removes members.
pub struct StabilitySeries<K: Derivation> {
    members: Vec<ObservableProcessor<K>>,
    start_time: NaiveDateTime,
    cache: RefCell<HashMap<String, Arc<Observable>>>,
}

impl<K: Derivation> StabilitySeries<K> {
    pub fn new(members: Vec<ObservableProcessor<K>>, start_time: NaiveDateTime) -> Self {
        Self {
            members,
            start_time,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Wrap raw measurements, all sharing the same derivation settings.
    pub fn from_sources(
        sources: Vec<K::Source>,
        settings: K::Settings,
        start_time: NaiveDateTime,
    ) -> Self {
        let members = sources
            .into_iter()
            .map(|raw| ObservableProcessor::with_settings(raw, settings.clone()))
            .collect();
        Self::new(members, start_time)
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    pub fn members(&self) -> &[ObservableProcessor<K>] {
        &self.members
    }

    pub fn labels(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.label()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn is_known(&self, name: &str) -> bool {
        name == ELAPSED_TIME
            || K::from_name(name).is_some()
            || self.members.iter().any(|m| m.supports(name))
    }

    /// Force `names` on every member and drop those whose data cannot supply
    /// them. Returns the dropped members with the reason, in series order.
    ///
    /// Only curve-specific failures (missing Isc/Voc, uncomputable derivation)
    /// lead to exclusion. Unknown names and malformed sweeps are returned as
    /// errors and leave the series untouched.
    pub fn validate_observables(&mut self, names: &[&str]) -> Result<Vec<Exclusion>, ObservableError> {
        if let Some(unknown) = names.iter().find(|n| !self.is_known(n)) {
            return Err(ObservableError::UnknownObservable(unknown.to_string()));
        }
        let needs_time = names.contains(&ELAPSED_TIME);
        let per_curve: Vec<&str> = names.iter().copied().filter(|n| *n != ELAPSED_TIME).collect();

        let mut verdicts = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let mut verdict = member.validate(&per_curve);
            if verdict.is_ok() && needs_time && member.datetime().is_none() {
                verdict = Err(missing_timestamp(member.label()));
            }
            match verdict {
                Ok(()) => verdicts.push(None),
                Err(e) if e.is_curve_specific() => verdicts.push(Some(e)),
                Err(e) => return Err(e),
            }
        }

        let mut excluded = Vec::new();
        let mut kept = Vec::with_capacity(self.members.len());
        for (member, verdict) in std::mem::take(&mut self.members).into_iter().zip(verdicts) {
            match verdict {
                None => kept.push(member),
                Some(reason) => {
                    log::warn!("excluding '{}': {reason}", member.label());
                    excluded.push(Exclusion {
                        label: member.label().to_string(),
                        reason,
                    });
                }
            }
        }
        self.members = kept;

        if !excluded.is_empty() {
            self.cache.borrow_mut().clear();
        }
        log::info!(
            "validated {:?}: {} kept, {} excluded",
            names,
            self.members.len(),
            excluded.len()
        );
        Ok(excluded)
    }

    /// Aggregate `name` across the remaining members, in order.
    pub fn get(&self, name: &str) -> Result<Arc<Observable>, ObservableError> {
        let cached = self.cache.borrow().get(name).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }
        if !self.is_known(name) {
            return Err(ObservableError::UnknownObservable(name.to_string()));
        }

        let observable = if name == ELAPSED_TIME {
            Observable::series(ELAPSED_TIME_UNITS, self.get_elapsed_hours()?)
        } else {
            let mut units = None;
            let mut values = Vec::with_capacity(self.members.len());
            for member in &self.members {
                let obs = member.get(name)?;
                units = units.or_else(|| obs.units.clone());
                values.push(obs.value.clone());
            }
            Observable {
                units,
                value: ObservableValue::collect_members(values),
            }
        };

        let observable = Arc::new(observable);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Arc::clone(&observable));
        Ok(observable)
    }

    /// Hours from the campaign start to each remaining member.
    pub fn get_elapsed_hours(&self) -> Result<Vec<f64>, ObservableError> {
        self.members
            .iter()
            .map(|member| {
                let dt = member
                    .datetime()
                    .ok_or_else(|| missing_timestamp(member.label()))?;
                Ok((dt - self.start_time).num_milliseconds() as f64 / 3_600_000.0)
            })
            .collect()
    }
}

fn missing_timestamp(label: &str) -> ObservableError {
    ObservableError::NotComputable(format!("'{label}' has no acquisition timestamp"))
}

impl<K: Derivation> ObservableSource for StabilitySeries<K> {
    fn get_data(&self, name: &str) -> Result<ObservableValue, ObservableError> {
        Ok(self.get(name)?.value.clone())
    }

    fn get_units(&self, name: &str) -> Result<Option<String>, ObservableError> {
        Ok(self.get(name)?.units.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::data::model::RawCurve;
    use crate::processing::iv::tests::{dark_curve, illuminated_curve};
    use crate::processing::iv::{IvObservable, IvSettings};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn stamped(mut curve: RawCurve, hours: i64) -> RawCurve {
        curve.datetime = Some(start() + Duration::hours(hours));
        curve
    }

    /// Five curves, the third one dark.
    fn campaign() -> StabilitySeries<IvObservable> {
        let curves = vec![
            stamped(illuminated_curve("t0", 0.020), 0),
            stamped(illuminated_curve("t1", 0.019), 1),
            stamped(dark_curve("t2-dark"), 2),
            stamped(illuminated_curve("t3", 0.018), 3),
            stamped(illuminated_curve("t4", 0.017), 5),
        ];
        StabilitySeries::from_sources(curves, IvSettings::default(), start())
    }

    #[test]
    fn dark_member_is_excluded_and_order_kept() {
        let mut series = campaign();
        let excluded = series.validate_observables(&["voc", "isc"]).unwrap();
        let labels: Vec<&str> = excluded.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["t2-dark"]);
        assert!(excluded[0].reason.is_curve_specific());

        assert_eq!(series.labels(), vec!["t0", "t1", "t3", "t4"]);
        let isc = series.get("isc").unwrap();
        let values = isc.value.as_series().unwrap();
        assert_eq!(values.len(), 4);
        let expected = [0.020, 0.019, 0.018, 0.017];
        for (got, want) in values.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{got} vs {want}");
        }
        assert_eq!(series.get("voc").unwrap().value.as_series().unwrap().len(), 4);
        assert_eq!(series.get_units("isc").unwrap().as_deref(), Some("Current (A)"));
    }

    #[test]
    fn length_invariant_after_validation() {
        let mut series = campaign();
        let n = series.len();
        let excluded = series.validate_observables(&["isc"]).unwrap();
        let isc = series.get_data("isc").unwrap();
        assert_eq!(isc.as_series().unwrap().len(), n - excluded.len());
    }

    #[test]
    fn elapsed_hours_relative_to_start() {
        let mut series = campaign();
        series.validate_observables(&["voc"]).unwrap();
        assert_eq!(series.get_elapsed_hours().unwrap(), vec![0.0, 1.0, 3.0, 5.0]);
        let elapsed = series.get(ELAPSED_TIME).unwrap();
        assert_eq!(elapsed.units.as_deref(), Some(ELAPSED_TIME_UNITS));
    }

    #[test]
    fn missing_timestamp_is_a_curve_failure() {
        let curves = vec![
            stamped(illuminated_curve("a", 0.02), 1),
            illuminated_curve("b", 0.02),
        ];
        let mut series =
            StabilitySeries::<IvObservable>::from_sources(curves, IvSettings::default(), start());
        assert!(series.get_elapsed_hours().is_err());
        let excluded = series.validate_observables(&[ELAPSED_TIME, "isc"]).unwrap();
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].label, "b");
        assert_eq!(series.get_elapsed_hours().unwrap(), vec![1.0]);
    }

    #[test]
    fn unknown_name_is_not_swallowed() {
        let mut series = campaign();
        assert_eq!(
            series.validate_observables(&["efficiency"]).unwrap_err(),
            ObservableError::UnknownObservable("efficiency".into())
        );
        assert_eq!(series.len(), 5);
        assert!(matches!(
            series.get("efficiency"),
            Err(ObservableError::UnknownObservable(_))
        ));
    }

    #[test]
    fn malformed_sweep_propagates_without_exclusion() {
        let zigzag = RawCurve::new(
            "zigzag",
            vec![0.0, 0.5, 0.0, 0.5],
            vec![-1.0, 0.5, -1.0, 0.5],
            None,
        )
        .unwrap();
        let curves = vec![illuminated_curve("ok", 0.02), zigzag];
        let mut series =
            StabilitySeries::<IvObservable>::from_sources(curves, IvSettings::default(), start());
        assert!(matches!(
            series.validate_observables(&["isc"]),
            Err(ObservableError::NotMonotonic { .. })
        ));
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn get_before_validation_surfaces_curve_error() {
        let series = campaign();
        assert!(matches!(
            series.get("voc"),
            Err(ObservableError::VocNotFound(_))
        ));
    }

    #[test]
    fn aggregation_is_memoized_and_reset_by_exclusion() {
        let mut series = campaign();
        let labels_before = series.get("label").unwrap();
        assert!(Arc::ptr_eq(&labels_before, &series.get("label").unwrap()));
        assert!(matches!(labels_before.value, ObservableValue::List(ref v) if v.len() == 5));

        series.validate_observables(&["voc"]).unwrap();
        let labels_after = series.get("label").unwrap();
        assert!(matches!(labels_after.value, ObservableValue::List(ref v) if v.len() == 4));
    }

    #[test]
    fn parameters_aggregate_as_list() {
        let mut series = campaign();
        series
            .validate_observables(crate::processing::iv::CELL_PARAMETERS)
            .unwrap();
        let params = series.get_data("parameters").unwrap();
        let ObservableValue::List(records) = params else {
            panic!("expected list, got {params:?}");
        };
        assert_eq!(records.len(), 4);
        assert!(records
            .iter()
            .all(|r| matches!(r, ObservableValue::Record(_))));
    }
}
