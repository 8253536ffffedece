/// Data layer: trace types, loading, and sample filtering.
///
/// Architecture:
/// ```text
///  .csv (;-delimited) / .json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse rows → Trace, reject malformed rows
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  Trace    │  wavelength_nm / intensity_db, index-aligned
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  wavelength window, reference subtraction, dB mask
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod filter;
