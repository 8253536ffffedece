//! Polarization-mode dispersion from interferometric optical spectra.
//!
//! A captured trace (wavelength vs. intensity in dB) is reduced to a fringe
//! count with a hysteresis extrema scan whose threshold is chosen per trace,
//! and the count is converted to a differential group delay (ps) and a PMD
//! coefficient (ps/√km) with the ITU fringe-counting formula.
//!
//! ```no_run
//! use fringe_pmd::{load_trace, Pipeline, PipelineConfig, RowPolicy};
//!
//! let trace = load_trace(std::path::Path::new("spectrum_01.csv"), RowPolicy::Abort)?;
//! let config = PipelineConfig { fiber_length_km: 0.06, ..Default::default() };
//! let out = Pipeline::new(config)?.run(&trace)?;
//! println!("{} extrema, {:.4} ps", out.result.n_extrema, out.result.delta_t_ps);
//! # Ok::<(), fringe_pmd::PmdError>(())
//! ```

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;

pub use analysis::{Pipeline, PipelineOutput};
pub use config::PipelineConfig;
pub use data::loader::{load_trace, RowPolicy};
pub use data::model::{CountingMode, PmdResult, Trace, Warning};
pub use error::{PmdError, Result};
