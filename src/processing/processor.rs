use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::data::model::{Observable, ObservableValue, RawStore};
use crate::error::ObservableError;

// ---------------------------------------------------------------------------
// Derivation registry
// ---------------------------------------------------------------------------

/// A closed set of derived observables for one device type.
///
/// Each variant is mapped to a pure function of the processor: it may ask the
/// processor for raw data or for other derived observables, never for
/// anything outside it. The registry is fixed at compile time, so an unknown
/// name is rejected before any computation starts.
pub trait Derivation: Copy + Eq + Hash + fmt::Debug + 'static {
    type Source: RawStore;
    type Settings: Clone + Default;

    /// Every registered variant.
    const ALL: &'static [Self];

    fn name(self) -> &'static str;

    fn derive(self, processor: &ObservableProcessor<Self>) -> Result<Observable, ObservableError>;

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

// ---------------------------------------------------------------------------
// Uniform read contract for plotting / export consumers
// ---------------------------------------------------------------------------

/// Read access shared by a single curve and a whole series. A consumer sees a
/// scalar from the former and a sequence from the latter.
pub trait ObservableSource {
    fn get_data(&self, name: &str) -> Result<ObservableValue, ObservableError>;
    fn get_units(&self, name: &str) -> Result<Option<String>, ObservableError>;
}

// ---------------------------------------------------------------------------
// ObservableProcessor
// ---------------------------------------------------------------------------

/// Wraps one raw measurement and resolves observables lazily.
///
/// Raw names are delegated to the store on every call. Derived names are
/// computed on first request and kept for the processor's lifetime; failures
/// are not cached.
pub struct ObservableProcessor<K: Derivation> {
    raw: K::Source,
    settings: K::Settings,
    cache: RefCell<HashMap<K, Arc<Observable>>>,
}

impl<K: Derivation> ObservableProcessor<K> {
    pub fn new(raw: K::Source) -> Self {
        Self::with_settings(raw, K::Settings::default())
    }

    pub fn with_settings(raw: K::Source, settings: K::Settings) -> Self {
        Self {
            raw,
            settings,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn raw(&self) -> &K::Source {
        &self.raw
    }

    pub fn settings(&self) -> &K::Settings {
        &self.settings
    }

    pub fn label(&self) -> &str {
        self.raw.label()
    }

    pub fn datetime(&self) -> Option<NaiveDateTime> {
        self.raw.datetime()
    }

    /// Raw names first, then every derived name.
    pub fn observable_names(&self) -> Vec<&'static str> {
        let mut names = self.raw.allowed_observable_names().to_vec();
        names.extend(K::ALL.iter().map(|kind| kind.name()));
        names
    }

    /// Whether `name` is resolvable here, without computing anything.
    pub fn supports(&self, name: &str) -> bool {
        self.raw.has_observable(name) || K::from_name(name).is_some()
    }

    /// Resolve an observable by name.
    pub fn get(&self, name: &str) -> Result<Arc<Observable>, ObservableError> {
        if self.raw.has_observable(name) {
            return Ok(Arc::new(self.raw.get_data(name)?));
        }
        let kind =
            K::from_name(name).ok_or_else(|| ObservableError::UnknownObservable(name.to_string()))?;
        self.get_derived(kind)
    }

    /// Resolve a derived observable, computing and memoizing it on first use.
    pub fn get_derived(&self, kind: K) -> Result<Arc<Observable>, ObservableError> {
        let cached = self.cache.borrow().get(&kind).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let computed = Arc::new(kind.derive(self)?);
        log::debug!("computed '{}' for '{}'", kind.name(), self.label());
        self.cache
            .borrow_mut()
            .entry(kind)
            .or_insert_with(|| Arc::clone(&computed));
        Ok(computed)
    }

    /// Unit of `name`. Computes the observable first if it is not cached yet.
    pub fn units(&self, name: &str) -> Result<Option<String>, ObservableError> {
        Ok(self.get(name)?.units.clone())
    }

    /// Force every listed observable; the first failure is returned as is.
    pub fn validate(&self, names: &[&str]) -> Result<(), ObservableError> {
        for name in names {
            self.get(name)?;
        }
        Ok(())
    }

    pub fn is_cached(&self, kind: K) -> bool {
        self.cache.borrow().contains_key(&kind)
    }

    // -- typed accessors used by derivations --

    pub fn raw_series(&self, name: &str) -> Result<Vec<f64>, ObservableError> {
        let observable = self.raw.get_data(name)?;
        match observable.value {
            ObservableValue::Series(values) => Ok(values),
            _ => Err(wrong_shape(name, "series")),
        }
    }

    pub fn series(&self, kind: K) -> Result<Vec<f64>, ObservableError> {
        self.get_derived(kind)?
            .value
            .as_series()
            .map(<[f64]>::to_vec)
            .ok_or_else(|| wrong_shape(kind.name(), "series"))
    }

    pub fn scalar(&self, kind: K) -> Result<f64, ObservableError> {
        self.get_derived(kind)?
            .value
            .as_f64()
            .ok_or_else(|| wrong_shape(kind.name(), "scalar"))
    }
}

fn wrong_shape(name: &str, expected: &'static str) -> ObservableError {
    ObservableError::WrongShape {
        name: name.to_string(),
        expected,
    }
}

impl<K: Derivation> ObservableSource for ObservableProcessor<K> {
    fn get_data(&self, name: &str) -> Result<ObservableValue, ObservableError> {
        Ok(self.get(name)?.value.clone())
    }

    fn get_units(&self, name: &str) -> Result<Option<String>, ObservableError> {
        self.units(name)
    }
}

impl<K: Derivation> fmt::Debug for ObservableProcessor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached: Vec<&'static str> = self.cache.borrow().keys().map(|k| k.name()).collect();
        f.debug_struct("ObservableProcessor")
            .field("label", &self.label())
            .field("cached", &cached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::data::model::{DeviceKind, ScatterData};

    thread_local! {
        static DOUBLE_CALLS: Cell<usize> = const { Cell::new(0) };
    }

    /// Minimal registry with a dependency chain and a failing member.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Toy {
        Doubled,
        Sum,
        Broken,
        DependsOnBroken,
    }

    impl Derivation for Toy {
        type Source = ScatterData;
        type Settings = ();

        const ALL: &'static [Self] = &[Toy::Doubled, Toy::Sum, Toy::Broken, Toy::DependsOnBroken];

        fn name(self) -> &'static str {
            match self {
                Toy::Doubled => "doubled",
                Toy::Sum => "sum",
                Toy::Broken => "broken",
                Toy::DependsOnBroken => "depends_on_broken",
            }
        }

        fn derive(self, p: &ObservableProcessor<Self>) -> Result<Observable, ObservableError> {
            match self {
                Toy::Doubled => {
                    DOUBLE_CALLS.with(|c| c.set(c.get() + 1));
                    let y = p.raw_series("dependent")?;
                    Ok(Observable::series("twice", y.iter().map(|v| 2.0 * v).collect()))
                }
                Toy::Sum => Ok(Observable::scalar("sum", p.series(Toy::Doubled)?.iter().sum())),
                Toy::Broken => Err(ObservableError::NotComputable("always".into())),
                Toy::DependsOnBroken => Ok(Observable::scalar("x", p.scalar(Toy::Broken)?)),
            }
        }
    }

    fn processor() -> ObservableProcessor<Toy> {
        let data = ScatterData::new(
            DeviceKind::Generic,
            "toy",
            vec![0.0, 1.0, 2.0],
            vec![1.0, 2.0, 3.0],
            None,
        )
        .unwrap();
        ObservableProcessor::new(data)
    }

    #[test]
    fn raw_names_are_delegated() {
        let p = processor();
        let obs = p.get("dependent").unwrap();
        assert_eq!(obs.value, ObservableValue::Series(vec![1.0, 2.0, 3.0]));
        assert_eq!(p.units("independent").unwrap().as_deref(), Some("Independent (a.u.)"));
    }

    #[test]
    fn derived_values_are_memoized() {
        let p = processor();
        DOUBLE_CALLS.with(|c| c.set(0));
        let first = p.get("doubled").unwrap();
        let second = p.get("doubled").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let sum = p.get("sum").unwrap();
        assert_eq!(sum.value, ObservableValue::Scalar(12.0));
        assert_eq!(DOUBLE_CALLS.with(Cell::get), 1);
        assert!(p.is_cached(Toy::Sum));
    }

    #[test]
    fn units_trigger_computation() {
        let p = processor();
        assert!(!p.is_cached(Toy::Doubled));
        assert_eq!(p.units("doubled").unwrap().as_deref(), Some("twice"));
        assert!(p.is_cached(Toy::Doubled));
    }

    #[test]
    fn unknown_name_is_rejected() {
        let p = processor();
        assert_eq!(
            p.get("nonsense").unwrap_err(),
            ObservableError::UnknownObservable("nonsense".into())
        );
        assert!(!p.supports("nonsense"));
        assert!(p.supports("sum"));
        assert!(p.supports("label"));
    }

    #[test]
    fn failures_propagate_and_are_not_cached() {
        let p = processor();
        let err = p.get("depends_on_broken").unwrap_err();
        assert!(matches!(err, ObservableError::NotComputable(_)));
        assert!(!p.is_cached(Toy::Broken));
        assert!(!p.is_cached(Toy::DependsOnBroken));
        assert!(p.validate(&["doubled", "broken"]).is_err());
        assert!(p.validate(&["doubled", "sum"]).is_ok());
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let p = processor();
        assert!(matches!(
            p.series(Toy::Sum),
            Err(ObservableError::WrongShape { .. })
        ));
    }

    #[test]
    fn names_cover_raw_and_derived() {
        let p = processor();
        let names = p.observable_names();
        assert!(names.contains(&"label"));
        assert!(names.contains(&"depends_on_broken"));
    }
}
