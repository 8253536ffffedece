//! Optional Savitzky–Golay pre-smoothing of the intensity trace.
//!
//! Fits a polynomial of order `p` over a sliding window of `2m+1` samples
//! and keeps the fitted centre value. Fringe positions and depths survive
//! far better than with a moving average. The first and last `m` samples
//! take the value of the polynomial fitted over the first (last) full
//! window, evaluated at their own offset.

use serde::{Deserialize, Serialize};

use crate::error::{PmdError, Result};

/// Window and polynomial order of the smoothing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Window length in samples; odd, at least 3.
    pub window: usize,
    pub poly_order: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: 11,
            poly_order: 3,
        }
    }
}

/// Savitzky–Golay smoother with precomputed convolution weights.
///
/// `rows[k]` evaluates the window's fitted polynomial at offset `k − m`
/// from the window centre; row `m` is the classic centre filter.
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    half_width: usize,
    rows: Vec<Vec<f64>>,
}

impl SavitzkyGolay {
    pub fn new(config: SmoothingConfig) -> Result<Self> {
        let SmoothingConfig { window, poly_order } = config;
        if window < 3 || window % 2 == 0 {
            return Err(PmdError::invalid(
                "smoothing.window",
                window as f64,
                "must be odd and at least 3",
            ));
        }
        if poly_order >= window {
            return Err(PmdError::invalid(
                "smoothing.poly_order",
                poly_order as f64,
                "must be smaller than the window",
            ));
        }
        let half_width = window / 2;
        let m = half_width as i64;
        let xs: Vec<f64> = (-m..=m).map(|x| x as f64).collect();
        let inverse = normal_inverse(&xs, poly_order)?;
        let rows = xs.iter().map(|&t| fit_weights(&inverse, &xs, t)).collect();
        Ok(Self { half_width, rows })
    }

    pub fn window(&self) -> usize {
        2 * self.half_width + 1
    }

    /// Centre weights, applied away from the edges.
    pub fn weights(&self) -> &[f64] {
        &self.rows[self.half_width]
    }

    /// Smooth `data`; the output has the same length. Inputs shorter than
    /// the window are returned unchanged.
    pub fn smooth(&self, data: &[f64]) -> Vec<f64> {
        let n = data.len();
        let window = self.window();
        if n < window {
            return data.to_vec();
        }
        (0..n)
            .map(|i| {
                let start = i.saturating_sub(self.half_width).min(n - window);
                self.rows[i - start]
                    .iter()
                    .zip(&data[start..start + window])
                    .map(|(w, y)| w * y)
                    .sum::<f64>()
            })
            .collect()
    }
}

/// `(JᵀJ)⁻¹` for `J[i][k] = xᵢᵏ`, `k ≤ poly_order`, by Gauss-Jordan elimination.
fn normal_inverse(xs: &[f64], poly_order: usize) -> Result<Vec<Vec<f64>>> {
    let p = poly_order + 1;

    // Augmented [JᵀJ | I]; JᵀJ[r][c] = Σ x^(r+c).
    let mut aug = vec![vec![0.0; 2 * p]; p];
    for (r, row) in aug.iter_mut().enumerate() {
        for c in 0..p {
            row[c] = xs.iter().map(|x| x.powi((r + c) as i32)).sum();
        }
        row[p + r] = 1.0;
    }

    for col in 0..p {
        let pivot_row = (col..p)
            .max_by(|&a, &b| aug[a][col].abs().total_cmp(&aug[b][col].abs()))
            .unwrap_or(col);
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        if pivot.abs() < 1e-12 {
            return Err(PmdError::invalid(
                "smoothing.poly_order",
                poly_order as f64,
                "normal equations are singular",
            ));
        }
        for v in aug[col].iter_mut() {
            *v /= pivot;
        }
        let pivot_vals = aug[col].clone();
        for (r, row) in aug.iter_mut().enumerate() {
            if r == col {
                continue;
            }
            let factor = row[col];
            for (v, pv) in row.iter_mut().zip(&pivot_vals) {
                *v -= factor * pv;
            }
        }
    }

    Ok(aug.into_iter().map(|row| row[p..].to_vec()).collect())
}

/// Weights `wᵢ` such that `Σ wᵢ·yᵢ` is the least-squares polynomial at `t`.
///
/// `wᵢ = Σ_k tᵏ · Σ_j inv[k][j] · xᵢʲ`.
fn fit_weights(inverse: &[Vec<f64>], xs: &[f64], t: f64) -> Vec<f64> {
    xs.iter()
        .map(|&x| {
            inverse
                .iter()
                .enumerate()
                .map(|(k, inv_row)| {
                    let basis: f64 = inv_row
                        .iter()
                        .enumerate()
                        .map(|(j, a)| a * x.powi(j as i32))
                        .sum();
                    t.powi(k as i32) * basis
                })
                .sum::<f64>()
        })
        .collect()
}
