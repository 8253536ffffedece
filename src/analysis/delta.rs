//! Choosing the hysteresis delta for a trace.
//!
//! Two policies feed the same fallback:
//!
//! 1. noise based: `max(floor_db, k_sigma · σ_noise)`;
//! 2. plateau scan: evaluate evenly spaced deltas, take the midpoint of the
//!    longest run of equal non-zero counts (first run wins a tie), or the
//!    noise-based delta when every count is zero.
//!
//! If the chosen delta still counts nothing, ten descending probes down to
//! `max(0.01, chosen / 10)` are tried before giving up with a warning.

use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;

use super::extrema::ExtremaDetector;
use super::noise;
use crate::data::model::{CountingMode, DeltaCandidate, Plateau, Warning};
use crate::error::{PmdError, Result};

/// Lowest delta the zero-count fallback will probe, in dB.
pub const FALLBACK_MIN_DELTA_DB: f64 = 0.01;
/// Number of probes in the zero-count fallback.
pub const FALLBACK_STEPS: usize = 10;

/// Delta range evaluated by the plateau scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanRange {
    pub min: f64,
    pub max: f64,
    pub steps: usize,
}

impl ScanRange {
    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || self.min <= 0.0 {
            return Err(PmdError::invalid("scan_min", self.min, "must be finite and > 0"));
        }
        if !self.max.is_finite() || self.max < self.min {
            return Err(PmdError::invalid("scan_max", self.max, "must be finite and >= scan_min"));
        }
        if self.steps == 0 {
            return Err(PmdError::invalid("scan_steps", 0.0, "must be at least 1"));
        }
        Ok(())
    }

    /// The evenly spaced deltas of the scan, ascending.
    pub fn deltas(&self) -> Vec<f64> {
        linspace(self.min, self.max, self.steps)
    }
}

/// How the selector arrived at its delta.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaSelection {
    /// Delta to count extrema with, in dB.
    pub delta_used: f64,
    /// Noise-based estimate, `max(floor_db, k_sigma · σ)`.
    pub initial_guess: f64,
    pub noise_sigma: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_table: Option<Vec<DeltaCandidate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plateau: Option<Plateau>,
    /// Whether the zero-count fallback replaced the first choice.
    pub fallback_applied: bool,
    pub warnings: Vec<Warning>,
}

/// Picks the operating delta for one trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaSelector {
    pub k_sigma: f64,
    pub floor_db: f64,
    pub tail_fraction: f64,
    /// `None` selects the noise-based policy.
    pub scan: Option<ScanRange>,
    pub mode: CountingMode,
}

impl DeltaSelector {
    pub fn validate(&self) -> Result<()> {
        if !self.k_sigma.is_finite() || self.k_sigma <= 0.0 {
            return Err(PmdError::invalid("k_sigma", self.k_sigma, "must be finite and > 0"));
        }
        if !self.floor_db.is_finite() || self.floor_db <= 0.0 {
            return Err(PmdError::invalid("floor_db", self.floor_db, "must be finite and > 0"));
        }
        if let Some(scan) = &self.scan {
            scan.validate()?;
        }
        Ok(())
    }

    /// Choose a delta for `intensity_db`.
    pub fn select(&self, intensity_db: &[f64]) -> Result<DeltaSelection> {
        self.validate()?;

        let noise_sigma = noise::estimate(intensity_db, self.tail_fraction)?;
        let initial_guess = self.floor_db.max(self.k_sigma * noise_sigma);
        debug!("noise sigma {noise_sigma:.4} dB, initial delta {initial_guess:.4} dB");

        let (chosen, scan_table, plateau) = match &self.scan {
            Some(range) => {
                let table = scan_table(intensity_db, range, self.mode)?;
                let plateau = longest_plateau(&table);
                let chosen = match &plateau {
                    Some(p) => {
                        debug!(
                            "plateau of {} candidates at count {} ({:.4}..{:.4} dB)",
                            p.length, p.count, p.start_delta, p.end_delta
                        );
                        table[p.midpoint_index()].delta
                    }
                    None => {
                        debug!("scan found no non-zero plateau, using noise-based delta");
                        initial_guess
                    }
                };
                (chosen, Some(table), plateau)
            }
            None => (initial_guess, None, None),
        };

        let mut selection = DeltaSelection {
            delta_used: chosen,
            initial_guess,
            noise_sigma,
            scan_table,
            plateau,
            fallback_applied: false,
            warnings: Vec::new(),
        };

        if ExtremaDetector::new(chosen, self.mode)?.count(intensity_db) == 0 {
            match zero_count_fallback(intensity_db, chosen, self.mode)? {
                Some(delta) => {
                    debug!("delta {chosen:.4} dB counted nothing, lowered to {delta:.4} dB");
                    selection.delta_used = delta;
                    selection.fallback_applied = true;
                }
                None => {
                    warn!("no extrema found down to delta {chosen:.4} dB / 10");
                    selection
                        .warnings
                        .push(Warning::NoExtremaFound { delta_db: chosen });
                }
            }
        }

        Ok(selection)
    }
}

/// Count extrema at every delta of `range`. Deltas are evaluated in
/// parallel; the table is ordered by ascending delta.
pub fn scan_table(
    intensity_db: &[f64],
    range: &ScanRange,
    mode: CountingMode,
) -> Result<Vec<DeltaCandidate>> {
    range.validate()?;
    range
        .deltas()
        .into_par_iter()
        .map(|delta| -> Result<DeltaCandidate> {
            let detector = ExtremaDetector::new(delta, mode)?;
            Ok(DeltaCandidate {
                delta,
                count: detector.count(intensity_db),
            })
        })
        .collect()
}

/// Longest run of consecutive candidates with the same non-zero count.
///
/// Ties keep the first run in table order.
pub fn longest_plateau(candidates: &[DeltaCandidate]) -> Option<Plateau> {
    let mut best: Option<Plateau> = None;
    let mut start = 0;

    for i in 1..=candidates.len() {
        if i < candidates.len() && candidates[i].count == candidates[start].count {
            continue;
        }
        let length = i - start;
        let count = candidates[start].count;
        if count > 0 && best.map_or(true, |b| length > b.length) {
            best = Some(Plateau {
                start_index: start,
                start_delta: candidates[start].delta,
                end_delta: candidates[i - 1].delta,
                length,
                count,
            });
        }
        start = i;
    }
    best
}

/// Probe from `chosen` down to `max(0.01, chosen / 10)` in ten steps and
/// return the first delta that counts at least one extremum.
pub fn zero_count_fallback(
    intensity_db: &[f64],
    chosen: f64,
    mode: CountingMode,
) -> Result<Option<f64>> {
    let lowest = FALLBACK_MIN_DELTA_DB.max(chosen / 10.0);
    for delta in linspace(chosen, lowest, FALLBACK_STEPS) {
        if ExtremaDetector::new(delta, mode)?.count(intensity_db) > 0 {
            return Ok(Some(delta));
        }
    }
    Ok(None)
}

/// `steps` evenly spaced values from `start` to `end`, both included.
/// A single step yields `start`.
pub fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (steps - 1) as f64;
            (0..steps)
                .map(|i| {
                    if i == steps - 1 {
                        end
                    } else {
                        start + i as f64 * step
                    }
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(counts: &[usize], range: &ScanRange) -> Vec<DeltaCandidate> {
        range
            .deltas()
            .into_iter()
            .zip(counts)
            .map(|(delta, &count)| DeltaCandidate { delta, count })
            .collect()
    }

    fn selector(scan: Option<ScanRange>) -> DeltaSelector {
        DeltaSelector {
            k_sigma: 3.0,
            floor_db: 0.05,
            tail_fraction: 0.3,
            scan,
            mode: CountingMode::PeaksAndValleys,
        }
    }

    /// Sinusoidal fringes of `amplitude_db` peak-to-peak, `periods` of them.
    fn fringes(periods: usize, samples_per_period: usize, amplitude_db: f64) -> Vec<f64> {
        let n = periods * samples_per_period;
        (0..n)
            .map(|i| {
                let phase = i as f64 / samples_per_period as f64 * std::f64::consts::TAU;
                -20.0 + 0.5 * amplitude_db * phase.cos()
            })
            .collect()
    }

    #[test]
    fn linspace_includes_both_ends() {
        let xs = linspace(0.05, 5.0, 10);
        assert_eq!(xs.len(), 10);
        assert_eq!(xs[0], 0.05);
        assert_eq!(xs[9], 5.0);
        assert!((xs[1] - 0.6).abs() < 1e-12);
        assert_eq!(linspace(2.0, 9.0, 1), vec![2.0]);
        let down = linspace(1.0, 0.1, 10);
        assert!(down.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn equal_length_plateaus_keep_the_first() {
        let range = ScanRange {
            min: 0.05,
            max: 5.0,
            steps: 10,
        };
        let candidates = table(&[3, 3, 3, 1, 1, 0, 0, 2, 2, 2], &range);
        let plateau = longest_plateau(&candidates).unwrap();
        assert_eq!(plateau.start_index, 0);
        assert_eq!(plateau.length, 3);
        assert_eq!(plateau.count, 3);
        assert_eq!(candidates[plateau.midpoint_index()].delta, candidates[1].delta);
    }

    #[test]
    fn longer_later_plateau_wins() {
        let range = ScanRange {
            min: 0.1,
            max: 1.0,
            steps: 10,
        };
        let candidates = table(&[4, 4, 2, 2, 2, 2, 1, 0, 0, 0], &range);
        let plateau = longest_plateau(&candidates).unwrap();
        assert_eq!((plateau.start_index, plateau.length, plateau.count), (2, 4, 2));
        assert_eq!(plateau.midpoint_index(), 4);
        assert_eq!(plateau.end_delta, candidates[5].delta);
    }

    #[test]
    fn zero_runs_are_never_plateaus() {
        let range = ScanRange {
            min: 0.1,
            max: 1.0,
            steps: 5,
        };
        assert_eq!(longest_plateau(&table(&[0, 0, 0, 0, 0], &range)), None);
        assert_eq!(longest_plateau(&[]), None);
    }

    #[test]
    fn scan_table_is_ordered_and_non_increasing() {
        let y = fringes(8, 40, 6.0);
        let range = ScanRange {
            min: 0.05,
            max: 10.0,
            steps: 60,
        };
        let candidates = scan_table(&y, &range, CountingMode::PeaksAndValleys).unwrap();
        assert_eq!(candidates.len(), 60);
        assert!(candidates.windows(2).all(|w| w[0].delta < w[1].delta));
        assert!(candidates.windows(2).all(|w| w[1].count <= w[0].count));
        // Clean 6 dB fringes: every delta below the swing sees the same count.
        assert_eq!(candidates[0].count, candidates[30].count);
        assert_eq!(candidates[59].count, 0);
    }

    #[test]
    fn scan_picks_delta_inside_the_stable_range() {
        let y = fringes(10, 50, 8.0);
        let sel = selector(Some(ScanRange {
            min: 0.05,
            max: 5.0,
            steps: 100,
        }))
        .select(&y)
        .unwrap();
        let plateau = sel.plateau.unwrap();
        assert_eq!(plateau.length, 100);
        assert!(sel.delta_used > 0.05 && sel.delta_used < 5.0);
        assert!(!sel.fallback_applied);
        assert!(sel.warnings.is_empty());
        assert_eq!(sel.scan_table.unwrap().len(), 100);
    }

    #[test]
    fn noise_policy_respects_floor() {
        let y = fringes(5, 40, 3.0);
        let sel = selector(None).select(&y).unwrap();
        assert!(sel.scan_table.is_none());
        assert!(sel.initial_guess >= 0.05);
        assert_eq!(sel.delta_used, sel.initial_guess);
    }

    #[test]
    fn fallback_lowers_delta_until_something_counts() {
        let y = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let mut sel = selector(None);
        sel.floor_db = 1.5;
        let out = sel.select(&y).unwrap();
        assert_eq!(out.initial_guess, 1.5);
        assert!(out.fallback_applied);
        assert!((out.delta_used - 0.9).abs() < 1e-9, "delta {}", out.delta_used);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn flat_trace_warns_instead_of_failing() {
        let y = [-30.0; 64];
        let sel = selector(Some(ScanRange {
            min: 0.05,
            max: 5.0,
            steps: 20,
        }))
        .select(&y)
        .unwrap();
        assert!(sel.plateau.is_none());
        assert_eq!(sel.delta_used, 0.05);
        assert_eq!(sel.warnings, vec![Warning::NoExtremaFound { delta_db: 0.05 }]);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let y = fringes(2, 10, 3.0);
        let mut sel = selector(None);
        sel.floor_db = 0.0;
        assert!(matches!(
            sel.select(&y),
            Err(PmdError::InvalidParameter { name: "floor_db", .. })
        ));

        let bad_scan = selector(Some(ScanRange {
            min: 1.0,
            max: 0.5,
            steps: 10,
        }));
        assert!(matches!(
            bad_scan.select(&y),
            Err(PmdError::InvalidParameter { name: "scan_max", .. })
        ));

        let no_steps = ScanRange {
            min: 0.1,
            max: 0.5,
            steps: 0,
        };
        assert!(no_steps.validate().is_err());
    }
}
