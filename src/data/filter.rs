use super::model::Trace;
use crate::error::{PmdError, Result};

// ---------------------------------------------------------------------------
// Threshold mask: keep samples within `threshold_db` of the trace maximum
// ---------------------------------------------------------------------------

/// Keep only samples with `intensity ≥ max(intensity) − threshold_db`.
///
/// The output is an order-preserving subsequence. A negative or non-finite
/// threshold, or an input without finite intensities, yields empty output;
/// callers decide whether that is fatal.
pub fn threshold_mask(
    wavelength_nm: &[f64],
    intensity_db: &[f64],
    threshold_db: f64,
) -> Result<(Vec<f64>, Vec<f64>)> {
    if wavelength_nm.len() != intensity_db.len() {
        return Err(PmdError::LengthMismatch {
            expected: wavelength_nm.len(),
            actual: intensity_db.len(),
        });
    }
    if !threshold_db.is_finite() || threshold_db < 0.0 {
        return Ok((Vec::new(), Vec::new()));
    }

    let max = intensity_db
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Ok((Vec::new(), Vec::new()));
    }

    let floor = max - threshold_db;
    Ok(wavelength_nm
        .iter()
        .zip(intensity_db)
        .filter(|(_, &y)| y >= floor)
        .map(|(&x, &y)| (x, y))
        .unzip())
}

/// [`threshold_mask`] applied to a whole trace.
///
/// Returns [`PmdError::NoUsableData`] when fewer than two samples survive.
pub fn mask_trace(trace: &Trace, threshold_db: f64) -> Result<Trace> {
    let (wavelength_nm, intensity_db) =
        threshold_mask(&trace.wavelength_nm, &trace.intensity_db, threshold_db)?;
    rebuild(trace, wavelength_nm, intensity_db, || {
        format!(
            "threshold mask of {threshold_db} dB left fewer than {} samples",
            Trace::MIN_SAMPLES
        )
    })
}

// ---------------------------------------------------------------------------
// Wavelength window: drop capture artifacts outside the sweep
// ---------------------------------------------------------------------------

/// Keep samples with `min_nm < wavelength` and, if given, `wavelength ≤ max_nm`.
///
/// The capture step occasionally writes instrument header values (such as a
/// point count) into the wavelength column; a lower cutoff removes them.
pub fn wavelength_window(trace: &Trace, min_nm: Option<f64>, max_nm: Option<f64>) -> Result<Trace> {
    let lo = min_nm.unwrap_or(f64::NEG_INFINITY);
    let hi = max_nm.unwrap_or(f64::INFINITY);
    if lo.is_nan() || hi.is_nan() || hi <= lo {
        return Err(PmdError::invalid(
            "max_wavelength_nm",
            hi,
            "wavelength window must have max > min",
        ));
    }

    let (wavelength_nm, intensity_db): (Vec<f64>, Vec<f64>) = trace
        .wavelength_nm
        .iter()
        .zip(&trace.intensity_db)
        .filter(|(&x, _)| x > lo && x <= hi)
        .map(|(&x, &y)| (x, y))
        .unzip();

    rebuild(trace, wavelength_nm, intensity_db, || {
        format!("wavelength window ({lo}, {hi}] nm left too few samples")
    })
}

// ---------------------------------------------------------------------------
// Reference subtraction
// ---------------------------------------------------------------------------

/// Subtract a reference trace from a measurement, sample by sample.
///
/// Each measurement sample is paired with the reference sample nearest in
/// wavelength (the lower one on an exact tie), so traces with slightly
/// different point counts still align. The reference must be sorted by
/// wavelength.
pub fn subtract_reference(measurement: &Trace, reference: &Trace) -> Result<Trace> {
    if reference.is_empty() {
        return Err(PmdError::NoUsableData("reference trace is empty".into()));
    }

    let ref_x = &reference.wavelength_nm;
    let intensity_db = measurement
        .wavelength_nm
        .iter()
        .zip(&measurement.intensity_db)
        .map(|(&x, &y)| y - reference.intensity_db[nearest_index(ref_x, x)])
        .collect();

    let mut diff = Trace {
        wavelength_nm: measurement.wavelength_nm.clone(),
        intensity_db,
        label: measurement.label.clone(),
    };
    diff.check()?;
    if let Some(label) = diff.label.take() {
        diff.label = Some(format!("{label} - reference"));
    }
    Ok(diff)
}

/// Index of the element of sorted `xs` closest to `x`. `xs` must be non-empty.
fn nearest_index(xs: &[f64], x: f64) -> usize {
    let upper = xs.partition_point(|&v| v < x);
    if upper == 0 {
        return 0;
    }
    if upper == xs.len() {
        return xs.len() - 1;
    }
    let lower = upper - 1;
    if (x - xs[lower]) <= (xs[upper] - x) {
        lower
    } else {
        upper
    }
}

fn rebuild(
    source: &Trace,
    wavelength_nm: Vec<f64>,
    intensity_db: Vec<f64>,
    why: impl FnOnce() -> String,
) -> Result<Trace> {
    if wavelength_nm.len() < Trace::MIN_SAMPLES {
        return Err(PmdError::NoUsableData(why()));
    }
    Ok(Trace {
        wavelength_nm,
        intensity_db,
        label: source.label.clone(),
    })
}
