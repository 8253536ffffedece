//! Noise-floor estimate from the low-intensity tail of a trace.

use crate::error::{PmdError, Result};

/// Fraction of lowest samples used when no other value is configured.
pub const DEFAULT_TAIL_FRACTION: f64 = 0.3;

/// Standard deviation of the lowest `tail_fraction` of the samples.
///
/// Low-intensity samples are dominated by noise rather than fringe
/// modulation, so their spread approximates the ripple level. The tail holds
/// `max(1, floor(tail_fraction · n))` samples and the statistic uses the
/// population divisor. Non-finite samples are ignored; a tail with fewer
/// than two samples has zero spread.
pub fn estimate(intensity_db: &[f64], tail_fraction: f64) -> Result<f64> {
    if !tail_fraction.is_finite() || tail_fraction <= 0.0 || tail_fraction > 1.0 {
        return Err(PmdError::invalid(
            "tail_fraction",
            tail_fraction,
            "must lie in (0, 1]",
        ));
    }

    let mut sorted: Vec<f64> = intensity_db.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return Ok(0.0);
    }
    sorted.sort_by(f64::total_cmp);

    let take = ((tail_fraction * sorted.len() as f64).floor() as usize).max(1);
    let tail = &sorted[..take.min(sorted.len())];
    if tail.len() < 2 {
        return Ok(0.0);
    }

    let n = tail.len() as f64;
    let mean = tail.iter().sum::<f64>() / n;
    let var = tail.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Ok(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_only_the_lowest_samples() {
        // Lowest 30% of 10 samples: -50, -48, -46.
        let y = [-10.0, -50.0, -12.0, -48.0, -11.0, -46.0, -9.0, -13.0, -14.0, -15.0];
        let sigma = estimate(&y, 0.3).unwrap();
        let expected = (8.0f64 / 3.0).sqrt();
        assert!((sigma - expected).abs() < 1e-12, "sigma = {sigma}");
    }

    #[test]
    fn flat_trace_has_zero_noise() {
        assert_eq!(estimate(&[-30.0; 40], 0.3).unwrap(), 0.0);
    }

    #[test]
    fn single_sample_tail_is_zero() {
        // floor(0.3 * 3) = 0 → clamped to one sample.
        assert_eq!(estimate(&[-1.0, -5.0, 3.0], 0.3).unwrap(), 0.0);
        assert_eq!(estimate(&[], 0.3).unwrap(), 0.0);
    }

    #[test]
    fn ignores_non_finite_samples() {
        let sigma = estimate(&[f64::NAN, -2.0, -4.0, f64::NEG_INFINITY], 1.0).unwrap();
        assert!((sigma - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_fraction() {
        assert!(estimate(&[1.0, 2.0], 0.0).is_err());
        assert!(estimate(&[1.0, 2.0], 1.5).is_err());
        assert!(estimate(&[1.0, 2.0], f64::NAN).is_err());
    }
}
