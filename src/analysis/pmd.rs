//! Fringe count → differential group delay and PMD coefficient.
//!
//! ITU fringe-counting formula with the strong mode-coupling factor:
//!
//! ```text
//! peaks + valleys:  Δt = K · N / (2·c0) · λmax·λmin / (λmax − λmin)
//! peaks only:       Δt = K · N / c0     · λmax·λmin / (λmax − λmin)
//! D_PMD = Δt / √L
//! ```

use crate::data::model::{CountingMode, PmdResult};
use crate::error::{PmdError, Result};

/// Speed of light in vacuum, m/s.
pub const C0: f64 = 299_792_458.0;
/// Mode-coupling factor for strongly coupled fibers.
pub const K_STRONG_COUPLING: f64 = 0.805;

const NM_TO_M: f64 = 1e-9;
const S_TO_PS: f64 = 1e12;

/// Convert an extrema count over the sweep `[lambda_min_nm, lambda_max_nm]`
/// into Δt_PMD (ps) and D_PMD (ps/√km) for a fiber of `fiber_length_km`.
///
/// `delta_db_used` is left at zero; the pipeline fills it in.
pub fn compute(
    n_count: usize,
    lambda_min_nm: f64,
    lambda_max_nm: f64,
    fiber_length_km: f64,
    mode: CountingMode,
) -> Result<PmdResult> {
    if !lambda_min_nm.is_finite() || lambda_min_nm <= 0.0 {
        return Err(PmdError::invalid(
            "lambda_min_nm",
            lambda_min_nm,
            "must be finite and > 0",
        ));
    }
    if !lambda_max_nm.is_finite() {
        return Err(PmdError::invalid("lambda_max_nm", lambda_max_nm, "must be finite"));
    }
    if lambda_max_nm == lambda_min_nm {
        return Err(PmdError::invalid(
            "lambda_max_nm",
            lambda_max_nm,
            "equals lambda_min_nm; zero sweep span divides by zero",
        ));
    }
    if lambda_max_nm < lambda_min_nm {
        return Err(PmdError::invalid(
            "lambda_max_nm",
            lambda_max_nm,
            "must be greater than lambda_min_nm",
        ));
    }
    if !fiber_length_km.is_finite() || fiber_length_km <= 0.0 {
        return Err(PmdError::invalid(
            "fiber_length_km",
            fiber_length_km,
            "must be finite and > 0",
        ));
    }

    let lam_min = lambda_min_nm * NM_TO_M;
    let lam_max = lambda_max_nm * NM_TO_M;
    let n = n_count as f64;

    let fringes_per_c0 = match mode {
        CountingMode::PeaksAndValleys => n / (2.0 * C0),
        CountingMode::PeaksOnly => n / C0,
    };
    let delta_t_s = K_STRONG_COUPLING * fringes_per_c0 * (lam_max * lam_min) / (lam_max - lam_min);
    let delta_t_ps = delta_t_s * S_TO_PS;

    Ok(PmdResult {
        n_extrema: n_count,
        delta_t_ps,
        d_pmd_ps_per_sqrt_km: delta_t_ps / fiber_length_km.sqrt(),
        delta_db_used: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * b.abs().max(1.0)
    }

    #[test]
    fn peaks_and_valleys_closed_form() {
        let r = compute(10, 1580.0, 1710.0, 0.01, CountingMode::PeaksAndValleys).unwrap();
        let expected =
            0.805 * (10.0 / (2.0 * 2.997_924_58e8)) * (1.710e-6 * 1.580e-6) / 1.30e-7 * 1e12;
        assert!(close(r.delta_t_ps, expected), "{} vs {expected}", r.delta_t_ps);
        // ≈ 0.279 ps over a 10 m fiber → ≈ 2.79 ps/√km.
        assert!((r.delta_t_ps - 0.2790).abs() < 1e-3);
        assert!(close(r.d_pmd_ps_per_sqrt_km, r.delta_t_ps / 0.1));
        assert_eq!(r.n_extrema, 10);
    }

    #[test]
    fn peaks_only_doubles_the_per_count_delay() {
        let both = compute(7, 1580.0, 1650.0, 0.02, CountingMode::PeaksAndValleys).unwrap();
        let peaks = compute(7, 1580.0, 1650.0, 0.02, CountingMode::PeaksOnly).unwrap();
        assert!(close(peaks.delta_t_ps, 2.0 * both.delta_t_ps));
    }

    #[test]
    fn zero_count_gives_zero_delay() {
        let r = compute(0, 1580.0, 1710.0, 1.0, CountingMode::PeaksOnly).unwrap();
        assert_eq!(r.delta_t_ps, 0.0);
        assert_eq!(r.d_pmd_ps_per_sqrt_km, 0.0);
    }

    #[test]
    fn zero_span_is_an_error() {
        let err = compute(10, 1600.0, 1600.0, 1.0, CountingMode::PeaksAndValleys).unwrap_err();
        assert!(matches!(
            err,
            PmdError::InvalidParameter {
                name: "lambda_max_nm",
                ..
            }
        ));
    }

    #[test]
    fn inverted_span_is_an_error() {
        assert!(compute(10, 1710.0, 1580.0, 1.0, CountingMode::PeaksOnly).is_err());
    }

    #[test]
    fn fiber_length_must_be_positive() {
        for len in [0.0, -0.5, f64::NAN] {
            let err = compute(3, 1580.0, 1710.0, len, CountingMode::PeaksOnly).unwrap_err();
            assert!(matches!(
                err,
                PmdError::InvalidParameter {
                    name: "fiber_length_km",
                    ..
                }
            ));
        }
    }
}
