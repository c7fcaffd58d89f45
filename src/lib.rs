//! Solar-cell IV analysis: lazily derived observables per sweep and their
//! aggregation across a stability campaign.

pub mod config;
pub mod data;
pub mod error;
pub mod processing;
pub mod worker;

pub use config::EngineConfig;
pub use data::model::{Observable, ObservableValue, RawCurve, RawStore};
pub use error::{CurveError, ObservableError};
