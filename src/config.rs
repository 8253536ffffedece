//! Analysis configuration.
//!
//! Every tunable of the pipeline lives in [`PipelineConfig`]. Only the
//! physical constants (`c0`, `K`) are fixed in code. A config can be read
//! from a JSON file where missing fields take their defaults:
//!
//! ```json
//! { "fiber_length_km": 0.06, "mode": "peaks-only", "use_scan": false }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::delta::{DeltaSelector, ScanRange};
use crate::analysis::noise::DEFAULT_TAIL_FRACTION;
use crate::analysis::smoothing::SmoothingConfig;
use crate::data::model::CountingMode;
use crate::error::{PmdError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Restrict detection to samples within `threshold_db` of the trace peak.
    pub use_mask: bool,
    pub threshold_db: f64,

    /// Plateau scan (true) or noise-based delta only (false).
    pub use_scan: bool,
    pub scan_min: f64,
    pub scan_max: f64,
    pub scan_steps: usize,

    /// Noise-based delta: `max(floor_db, k_sigma · σ)`.
    pub k_sigma: f64,
    pub floor_db: f64,
    /// Share of lowest samples the noise estimate looks at.
    pub tail_fraction: f64,

    pub mode: CountingMode,

    /// Sweep bounds in nm; `None` takes the trace's first/last wavelength.
    pub lambda_min_nm: Option<f64>,
    pub lambda_max_nm: Option<f64>,
    pub fiber_length_km: f64,

    /// Savitzky–Golay pre-smoothing, off when `None`.
    pub smoothing: Option<SmoothingConfig>,

    /// Drop samples at or below this wavelength (capture artifacts).
    pub min_wavelength_nm: Option<f64>,
    pub max_wavelength_nm: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            use_mask: false,
            threshold_db: 20.0,
            use_scan: true,
            scan_min: 0.05,
            scan_max: 5.0,
            scan_steps: 120,
            k_sigma: 3.0,
            floor_db: 0.05,
            tail_fraction: DEFAULT_TAIL_FRACTION,
            mode: CountingMode::PeaksAndValleys,
            lambda_min_nm: None,
            lambda_max_nm: None,
            fiber_length_km: 0.01,
            smoothing: None,
            min_wavelength_nm: None,
            max_wavelength_nm: None,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let config: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        config.validate()?;
        Ok(config)
    }

    /// The scan range, when the plateau scan is enabled.
    pub fn scan_range(&self) -> Option<ScanRange> {
        self.use_scan.then_some(ScanRange {
            min: self.scan_min,
            max: self.scan_max,
            steps: self.scan_steps,
        })
    }

    pub fn delta_selector(&self) -> DeltaSelector {
        DeltaSelector {
            k_sigma: self.k_sigma,
            floor_db: self.floor_db,
            tail_fraction: self.tail_fraction,
            scan: self.scan_range(),
            mode: self.mode,
        }
    }

    /// Check every numeric field; the first offending one is reported.
    pub fn validate(&self) -> Result<()> {
        if self.use_mask && (!self.threshold_db.is_finite() || self.threshold_db < 0.0) {
            return Err(PmdError::invalid(
                "threshold_db",
                self.threshold_db,
                "must be finite and >= 0",
            ));
        }
        if !self.tail_fraction.is_finite()
            || self.tail_fraction <= 0.0
            || self.tail_fraction > 1.0
        {
            return Err(PmdError::invalid(
                "tail_fraction",
                self.tail_fraction,
                "must lie in (0, 1]",
            ));
        }
        self.delta_selector().validate()?;

        for (name, value) in [
            ("lambda_min_nm", self.lambda_min_nm),
            ("lambda_max_nm", self.lambda_max_nm),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(PmdError::invalid(name, v, "must be finite and > 0"));
                }
            }
        }
        if let (Some(lo), Some(hi)) = (self.lambda_min_nm, self.lambda_max_nm) {
            if hi <= lo {
                return Err(PmdError::invalid(
                    "lambda_max_nm",
                    hi,
                    "must be greater than lambda_min_nm",
                ));
            }
        }
        if !self.fiber_length_km.is_finite() || self.fiber_length_km <= 0.0 {
            return Err(PmdError::invalid(
                "fiber_length_km",
                self.fiber_length_km,
                "must be finite and > 0",
            ));
        }
        if let (Some(lo), Some(hi)) = (self.min_wavelength_nm, self.max_wavelength_nm) {
            if hi <= lo {
                return Err(PmdError::invalid(
                    "max_wavelength_nm",
                    hi,
                    "must be greater than min_wavelength_nm",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scan_range().unwrap().steps, 120);
        assert_eq!(config.delta_selector().k_sigma, 3.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"mode": "peaks-only", "fiber_length_km": 0.06}"#).unwrap();
        assert_eq!(config.mode, CountingMode::PeaksOnly);
        assert_eq!(config.fiber_length_km, 0.06);
        assert_eq!(config.floor_db, 0.05);
        assert!(config.use_scan);
    }

    #[test]
    fn smoothing_block_fills_missing_fields() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"smoothing": {"poly_order": 2}}"#).unwrap();
        assert_eq!(
            config.smoothing,
            Some(SmoothingConfig {
                window: 11,
                poly_order: 2
            })
        );
    }

    #[test]
    fn no_scan_means_noise_policy() {
        let config = PipelineConfig {
            use_scan: false,
            ..Default::default()
        };
        assert!(config.delta_selector().scan.is_none());
    }

    #[test]
    fn validation_names_the_offending_field() {
        let cases: Vec<(PipelineConfig, &str)> = vec![
            (
                PipelineConfig {
                    fiber_length_km: 0.0,
                    ..Default::default()
                },
                "fiber_length_km",
            ),
            (
                PipelineConfig {
                    lambda_min_nm: Some(1600.0),
                    lambda_max_nm: Some(1600.0),
                    ..Default::default()
                },
                "lambda_max_nm",
            ),
            (
                PipelineConfig {
                    use_mask: true,
                    threshold_db: -3.0,
                    ..Default::default()
                },
                "threshold_db",
            ),
            (
                PipelineConfig {
                    scan_steps: 0,
                    ..Default::default()
                },
                "scan_steps",
            ),
            (
                PipelineConfig {
                    k_sigma: -1.0,
                    ..Default::default()
                },
                "k_sigma",
            ),
        ];
        for (config, field) in cases {
            match config.validate() {
                Err(PmdError::InvalidParameter { name, .. }) => assert_eq!(name, field),
                other => panic!("expected {field} to be rejected, got {other:?}"),
            }
        }
    }
}
