/// Data layer: raw measurement types and file loading.
///
/// Architecture:
/// ```text
///  .csv / .txt / .dat / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RawCurve / ScatterData / LbicImage / PdsData
///   └──────────┘
///        │          file name ──► timestamp ──► datetime
///        ▼
///   ┌──────────┐
///   │  model    │  RawStore: raw observables by name
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod timestamp;
