use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PmdError, Result};

// ---------------------------------------------------------------------------
// Trace – one captured spectrum
// ---------------------------------------------------------------------------

/// A single optical-spectrum trace: index-aligned wavelength and intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Wavelength axis in nm, increasing along the sweep.
    pub wavelength_nm: Vec<f64>,
    /// Intensity in dB / dBm – same length as `wavelength_nm`.
    pub intensity_db: Vec<f64>,
    /// Where the trace came from (file name), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Trace {
    /// Minimum number of samples for a usable trace.
    pub const MIN_SAMPLES: usize = 2;

    /// Build a trace, checking length equality and the sample minimum.
    pub fn new(wavelength_nm: Vec<f64>, intensity_db: Vec<f64>) -> Result<Self> {
        let trace = Trace {
            wavelength_nm,
            intensity_db,
            label: None,
        };
        trace.check()?;
        Ok(trace)
    }

    /// Attach a source label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Re-check the invariants (used after deserializing).
    pub fn check(&self) -> Result<()> {
        if self.wavelength_nm.len() != self.intensity_db.len() {
            return Err(PmdError::LengthMismatch {
                expected: self.wavelength_nm.len(),
                actual: self.intensity_db.len(),
            });
        }
        if self.len() < Self::MIN_SAMPLES {
            return Err(PmdError::InsufficientData {
                needed: Self::MIN_SAMPLES,
                got: self.len(),
            });
        }
        Ok(())
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.wavelength_nm.len()
    }

    /// Whether the trace has no samples.
    pub fn is_empty(&self) -> bool {
        self.wavelength_nm.is_empty()
    }

    /// First and last wavelength of the sweep, if any.
    pub fn sweep_span(&self) -> Option<(f64, f64)> {
        Some((*self.wavelength_nm.first()?, *self.wavelength_nm.last()?))
    }

    /// Human-readable name for log lines.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or("<trace>")
    }
}

// ---------------------------------------------------------------------------
// Counting convention
// ---------------------------------------------------------------------------

/// Which extrema are counted as fringes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CountingMode {
    /// Peaks and valleys both count; the formula halves the count.
    #[default]
    PeaksAndValleys,
    /// Only peaks count, one per fringe period.
    PeaksOnly,
}

impl fmt::Display for CountingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountingMode::PeaksAndValleys => write!(f, "peaks+valleys"),
            CountingMode::PeaksOnly => write!(f, "peaks only"),
        }
    }
}

// ---------------------------------------------------------------------------
// Extrema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremumKind {
    Peak,
    Valley,
}

/// A committed extremum of the hysteresis scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extremum {
    /// Position on the x axis (wavelength in nm).
    pub position: f64,
    /// Intensity at that position.
    pub value: f64,
    pub kind: ExtremumKind,
}

/// Output of one detector pass. `minima` is empty in peaks-only mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extrema {
    pub maxima: Vec<Extremum>,
    pub minima: Vec<Extremum>,
}

impl Extrema {
    /// Number of extrema that count as fringes under `mode`.
    pub fn count(&self, mode: CountingMode) -> usize {
        match mode {
            CountingMode::PeaksAndValleys => self.maxima.len() + self.minima.len(),
            CountingMode::PeaksOnly => self.maxima.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Delta scan records
// ---------------------------------------------------------------------------

/// One sample of a delta scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaCandidate {
    pub delta: f64,
    pub count: usize,
}

/// A maximal run of scan candidates sharing the same non-zero count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plateau {
    /// Index of the first candidate of the run in the scan table.
    pub start_index: usize,
    pub start_delta: f64,
    pub end_delta: f64,
    pub length: usize,
    pub count: usize,
}

impl Plateau {
    /// Index of the run's midpoint candidate.
    pub fn midpoint_index(&self) -> usize {
        self.start_index + self.length / 2
    }
}

// ---------------------------------------------------------------------------
// Results and diagnostics
// ---------------------------------------------------------------------------

/// Fringe count and the PMD figures derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PmdResult {
    pub n_extrema: usize,
    /// Differential group delay in ps.
    pub delta_t_ps: f64,
    /// PMD coefficient in ps/√km.
    pub d_pmd_ps_per_sqrt_km: f64,
    /// Hysteresis delta the count was taken with, in dB.
    pub delta_db_used: f64,
}

/// Non-fatal conditions reported alongside a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The delta search ended without a single counted extremum.
    NoExtremaFound { delta_db: f64 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NoExtremaFound { delta_db } => {
                write!(f, "no extrema found (delta {delta_db:.4} dB)")
            }
        }
    }
}
