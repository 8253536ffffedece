use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use super::delta::DeltaSelection;
use super::extrema::ExtremaDetector;
use super::pmd;
use super::smoothing::SavitzkyGolay;
use crate::config::PipelineConfig;
use crate::data::filter::{mask_trace, wavelength_window};
use crate::data::model::{Extremum, PmdResult, Trace, Warning};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Pipeline output
// ---------------------------------------------------------------------------

/// Everything one pipeline run produced for a trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub result: PmdResult,
    pub selection: DeltaSelection,
    pub peaks: Vec<Extremum>,
    /// Empty when counting peaks only.
    pub valleys: Vec<Extremum>,
    /// Samples left after windowing and masking.
    pub samples_used: usize,
    /// Sweep bounds the formula was evaluated with.
    pub lambda_min_nm: f64,
    pub lambda_max_nm: f64,
    pub warnings: Vec<Warning>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Trace → PMD estimate.
///
/// ```text
///  Trace ─▶ window ─▶ smooth? ─▶ mask? ─▶ delta ─▶ extrema ─▶ PMD
/// ```
///
/// Holds only the validated configuration, so one instance can serve any
/// number of traces from any number of threads.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    smoother: Option<SavitzkyGolay>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let smoother = config.smoothing.map(SavitzkyGolay::new).transpose()?;
        Ok(Self { config, smoother })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyse one trace.
    pub fn run(&self, trace: &Trace) -> Result<PipelineOutput> {
        trace.check()?;
        let cfg = &self.config;
        let name = trace.display_name();

        let windowed = if cfg.min_wavelength_nm.is_some() || cfg.max_wavelength_nm.is_some() {
            wavelength_window(trace, cfg.min_wavelength_nm, cfg.max_wavelength_nm)?
        } else {
            trace.clone()
        };

        // Sweep bounds come from the config or, failing that, the unmasked trace.
        let (first_nm, last_nm) = windowed.sweep_span().unwrap_or((f64::NAN, f64::NAN));
        let lambda_min_nm = cfg.lambda_min_nm.unwrap_or(first_nm);
        let lambda_max_nm = cfg.lambda_max_nm.unwrap_or(last_nm);

        let smoothed = match &self.smoother {
            Some(sg) => Trace {
                intensity_db: sg.smooth(&windowed.intensity_db),
                ..windowed
            },
            None => windowed,
        };

        let working = if cfg.use_mask {
            let masked = mask_trace(&smoothed, cfg.threshold_db)?;
            debug!(
                "{name}: {} dB mask kept {}/{} samples",
                cfg.threshold_db,
                masked.len(),
                smoothed.len()
            );
            masked
        } else {
            smoothed
        };

        let selection = self.config.delta_selector().select(&working.intensity_db)?;
        let detector = ExtremaDetector::new(selection.delta_used, cfg.mode)?;
        let extrema = detector.detect(&working.intensity_db, &working.wavelength_nm)?;
        let n_count = extrema.count(cfg.mode);

        let mut result = pmd::compute(
            n_count,
            lambda_min_nm,
            lambda_max_nm,
            cfg.fiber_length_km,
            cfg.mode,
        )?;
        result.delta_db_used = selection.delta_used;

        debug!(
            "{name}: {n_count} extrema ({}) at delta {:.4} dB -> {:.5} ps",
            cfg.mode, selection.delta_used, result.delta_t_ps
        );

        Ok(PipelineOutput {
            label: trace.label.clone(),
            result,
            warnings: selection.warnings.clone(),
            selection,
            peaks: extrema.maxima,
            valleys: extrema.minima,
            samples_used: working.len(),
            lambda_min_nm,
            lambda_max_nm,
        })
    }

    /// Analyse many traces in parallel. A failed trace only fills its own slot.
    pub fn run_batch(&self, traces: &[Trace]) -> Vec<Result<PipelineOutput>> {
        traces.par_iter().map(|trace| self.run(trace)).collect()
    }
}
