/// Observable computation on top of the raw stores.
///
/// ```text
///   RawStore ──► ObservableProcessor<K> ──► StabilitySeries<K>
///                  │ memoized derivations      │ per-member aggregation
///                  ▼                            ▼
///        iv / pds / scatter / lbic registries  elapsed_time, exclusions
/// ```

pub mod iv;
pub mod iv_calc;
pub mod lbic;
pub mod pds;
pub mod processor;
pub mod scatter;
pub mod stability;

pub use iv::{IvObservable, IvProcessor, IvSettings, CELL_PARAMETERS};
pub use lbic::{LbicObservable, LbicProcessor};
pub use pds::{PdsObservable, PdsProcessor};
pub use processor::{Derivation, ObservableProcessor, ObservableSource};
pub use scatter::{ScatterObservable, ScatterProcessor};
pub use stability::{Exclusion, StabilitySeries, ELAPSED_TIME};
