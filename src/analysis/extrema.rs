//! Hysteresis extrema detection (Billauer's `peakdet`).
//!
//! The scan is a two-state machine folded over the samples:
//!
//! ```text
//!            value < mx - delta  (commit peak at mxpos)
//!   TrackMax ───────────────────────────────────────▶ TrackMin
//!      ▲                                                 │
//!      └─────────────────────────────────────────────────┘
//!            value > mn + delta  (commit valley at mnpos)
//! ```
//!
//! The running maximum and minimum are updated on every sample, whatever the
//! state. A swing still open when the samples run out is never committed.

use crate::data::model::{CountingMode, Extrema, Extremum, ExtremumKind};
use crate::error::{PmdError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    TrackMax,
    TrackMin,
}

/// Per-step scan state. Each step consumes the old state and returns a new one.
#[derive(Debug, Clone, Copy)]
struct ScanState {
    phase: Phase,
    mx: f64,
    mxpos: f64,
    mn: f64,
    mnpos: f64,
}

impl ScanState {
    fn initial() -> Self {
        ScanState {
            phase: Phase::TrackMax,
            mx: f64::NEG_INFINITY,
            mxpos: f64::NAN,
            mn: f64::INFINITY,
            mnpos: f64::NAN,
        }
    }

    fn step(self, value: f64, pos: f64, delta: f64) -> (ScanState, Option<Extremum>) {
        let (mx, mxpos) = if value > self.mx {
            (value, pos)
        } else {
            (self.mx, self.mxpos)
        };
        let (mn, mnpos) = if value < self.mn {
            (value, pos)
        } else {
            (self.mn, self.mnpos)
        };

        match self.phase {
            Phase::TrackMax if value < mx - delta => (
                ScanState {
                    phase: Phase::TrackMin,
                    mx,
                    mxpos,
                    mn: value,
                    mnpos: pos,
                },
                Some(Extremum {
                    position: mxpos,
                    value: mx,
                    kind: ExtremumKind::Peak,
                }),
            ),
            Phase::TrackMin if value > mn + delta => (
                ScanState {
                    phase: Phase::TrackMax,
                    mx: value,
                    mxpos: pos,
                    mn,
                    mnpos,
                },
                Some(Extremum {
                    position: mnpos,
                    value: mn,
                    kind: ExtremumKind::Valley,
                }),
            ),
            phase => (
                ScanState {
                    phase,
                    mx,
                    mxpos,
                    mn,
                    mnpos,
                },
                None,
            ),
        }
    }
}

/// Hysteresis detector with a fixed delta and counting mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtremaDetector {
    delta: f64,
    mode: CountingMode,
}

impl ExtremaDetector {
    /// `delta` must be finite and strictly positive.
    pub fn new(delta: f64, mode: CountingMode) -> Result<Self> {
        if !delta.is_finite() || delta <= 0.0 {
            return Err(PmdError::invalid("delta", delta, "must be finite and > 0"));
        }
        Ok(ExtremaDetector { delta, mode })
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn mode(&self) -> CountingMode {
        self.mode
    }

    /// Run the scan and collect the committed extrema.
    ///
    /// `positions` labels each sample (wavelengths, usually) and must have
    /// the same length as `values`. Minima are dropped in peaks-only mode.
    pub fn detect(&self, values: &[f64], positions: &[f64]) -> Result<Extrema> {
        if values.len() != positions.len() {
            return Err(PmdError::LengthMismatch {
                expected: values.len(),
                actual: positions.len(),
            });
        }

        let keep_minima = self.mode == CountingMode::PeaksAndValleys;
        let (_, extrema) = values.iter().zip(positions).fold(
            (ScanState::initial(), Extrema::default()),
            |(state, mut acc), (&value, &pos)| {
                let (next, committed) = state.step(value, pos, self.delta);
                match committed {
                    Some(e) if e.kind == ExtremumKind::Peak => acc.maxima.push(e),
                    Some(e) if keep_minima => acc.minima.push(e),
                    _ => {}
                }
                (next, acc)
            },
        );
        Ok(extrema)
    }

    /// Number of extrema [`detect`](Self::detect) would count, without
    /// collecting them.
    pub fn count(&self, values: &[f64]) -> usize {
        let (_, n) = values.iter().enumerate().fold(
            (ScanState::initial(), 0usize),
            |(state, n), (i, &value)| {
                let (next, committed) = state.step(value, i as f64, self.delta);
                let counted = match committed {
                    Some(e) => {
                        e.kind == ExtremumKind::Peak || self.mode == CountingMode::PeaksAndValleys
                    }
                    None => false,
                };
                (next, n + usize::from(counted))
            },
        );
        n
    }
}

/// One-shot detection: `ExtremaDetector::new(delta, mode)?.detect(values, positions)`.
pub fn detect(
    values: &[f64],
    delta: f64,
    positions: &[f64],
    mode: CountingMode,
) -> Result<Extrema> {
    ExtremaDetector::new(delta, mode)?.detect(values, positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(position: f64, value: f64) -> Extremum {
        Extremum {
            position,
            value,
            kind: ExtremumKind::Peak,
        }
    }

    fn valley(position: f64, value: f64) -> Extremum {
        Extremum {
            position,
            value,
            kind: ExtremumKind::Valley,
        }
    }

    /// Deterministic pseudo-random traces (LCG) for property checks.
    fn random_trace(seed: u64, len: usize) -> Vec<f64> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((x >> 11) as f64 / (1u64 << 53) as f64) * 20.0 - 10.0
            })
            .collect()
    }

    #[test]
    fn alternating_trace_drops_trailing_swing() {
        let wl = [1580.0, 1581.0, 1582.0, 1583.0, 1584.0];
        let y = [-20.0, -10.0, -20.0, -10.0, -20.0];
        let ext = detect(&y, 5.0, &wl, CountingMode::PeaksAndValleys).unwrap();
        assert_eq!(ext.maxima, vec![peak(1581.0, -10.0), peak(1583.0, -10.0)]);
        // The valley at 1584 is never confirmed by a rise.
        assert_eq!(ext.minima, vec![valley(1582.0, -20.0)]);
    }

    #[test]
    fn peaks_only_keeps_no_minima() {
        let wl = [1580.0, 1581.0, 1582.0, 1583.0, 1584.0];
        let y = [-20.0, -10.0, -20.0, -10.0, -20.0];
        let ext = detect(&y, 5.0, &wl, CountingMode::PeaksOnly).unwrap();
        assert_eq!(ext.maxima.len(), 2);
        assert!(ext.minima.is_empty());
    }

    #[test]
    fn count_matches_detect() {
        for seed in 1..20 {
            let y = random_trace(seed, 200);
            let x: Vec<f64> = (0..y.len()).map(|i| i as f64).collect();
            for mode in [CountingMode::PeaksAndValleys, CountingMode::PeaksOnly] {
                let det = ExtremaDetector::new(1.5, mode).unwrap();
                assert_eq!(det.count(&y), det.detect(&y, &x).unwrap().count(mode));
            }
        }
    }

    #[test]
    fn flat_trace_has_no_extrema() {
        let y = [-12.5; 50];
        let x: Vec<f64> = (0..50).map(f64::from).collect();
        for delta in [0.01, 0.5, 10.0] {
            let ext = detect(&y, delta, &x, CountingMode::PeaksAndValleys).unwrap();
            assert!(ext.maxima.is_empty() && ext.minima.is_empty());
        }
    }

    #[test]
    fn swings_smaller_than_delta_are_ignored() {
        let y = [0.0, 1.0, 0.0, 1.0, 0.0];
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ext = detect(&y, 1.0, &x, CountingMode::PeaksAndValleys).unwrap();
        // Falls must exceed delta strictly.
        assert!(ext.maxima.is_empty());
    }

    #[test]
    fn rejects_non_positive_or_non_finite_delta() {
        for delta in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = ExtremaDetector::new(delta, CountingMode::PeaksOnly).unwrap_err();
            assert!(matches!(err, PmdError::InvalidParameter { name: "delta", .. }));
        }
    }

    #[test]
    fn rejects_position_length_mismatch() {
        let err = detect(&[1.0, 2.0, 3.0], 0.5, &[1.0, 2.0], CountingMode::PeaksOnly).unwrap_err();
        assert!(matches!(
            err,
            PmdError::LengthMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn committed_extrema_alternate_and_respect_delta() {
        for seed in 1..50 {
            let y = random_trace(seed, 120);
            let x: Vec<f64> = (0..y.len()).map(|i| i as f64).collect();
            let delta = 0.5 + (seed % 7) as f64;
            let ext = detect(&y, delta, &x, CountingMode::PeaksAndValleys).unwrap();

            let (maxima, minima) = (&ext.maxima, &ext.minima);
            assert!(maxima.len() == minima.len() || maxima.len() == minima.len() + 1);
            for (i, mn) in minima.iter().enumerate() {
                let mx = &maxima[i];
                assert!(mx.position < mn.position);
                assert!(mn.value <= mx.value - delta, "seed {seed}: {mx:?} -> {mn:?}");
                if let Some(next) = maxima.get(i + 1) {
                    assert!(mn.position < next.position);
                    assert!(next.value >= mn.value + delta, "seed {seed}: {mn:?} -> {next:?}");
                }
            }
        }
    }

    #[test]
    fn larger_delta_never_increases_count() {
        for seed in 1..30 {
            let y = random_trace(seed, 80);
            for mode in [CountingMode::PeaksAndValleys, CountingMode::PeaksOnly] {
                let counts: Vec<usize> = (1..=100)
                    .map(|k| ExtremaDetector::new(k as f64 * 0.1, mode).unwrap().count(&y))
                    .collect();
                for pair in counts.windows(2) {
                    assert!(pair[1] <= pair[0], "seed {seed}: counts {counts:?}");
                }
            }
        }
    }

    #[test]
    fn output_is_deterministic() {
        let y = random_trace(7, 300);
        let x: Vec<f64> = (0..y.len()).map(|i| 1500.0 + i as f64 * 0.1).collect();
        let a = detect(&y, 2.0, &x, CountingMode::PeaksAndValleys).unwrap();
        let b = detect(&y, 2.0, &x, CountingMode::PeaksAndValleys).unwrap();
        assert_eq!(a, b);
    }
}
