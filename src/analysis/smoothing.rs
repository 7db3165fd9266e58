//! Savitzky-Golay smoothing.
//!
//! A polynomial of order `polyorder` is least-squares fitted to each window
//! of `window` samples and evaluated (or differentiated) at the window
//! centre. The first and last `window / 2` samples have no centred window;
//! for those the polynomial fitted to the first (last) full window is
//! evaluated at the edge position, which is what `scipy.signal.savgol_filter`
//! does with `mode="interp"`.

use crate::error::{ImsError, Result};

/// Precomputed Savitzky-Golay filter.
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    window: usize,
    /// `kernels[k]` are the sample weights producing the output for the
    /// `k`-th position of a window (`k = window / 2` is the centre).
    kernels: Vec<Vec<f64>>,
}

impl SavitzkyGolay {
    /// Build a filter. `deriv = 0` smooths, `deriv = 2` yields the smoothed
    /// second derivative (per index unit squared).
    pub fn new(window: usize, polyorder: usize, deriv: usize) -> Result<Self> {
        if window % 2 == 0 || window <= polyorder {
            return Err(ImsError::invalid_config(format!(
                "Savitzky-Golay window {window} must be odd and larger than order {polyorder}"
            )));
        }
        if deriv > polyorder {
            return Err(ImsError::invalid_config(format!(
                "derivative {deriv} exceeds polynomial order {polyorder}"
            )));
        }

        let fit = least_squares_operator(window, polyorder).ok_or_else(|| {
            ImsError::invalid_config(format!(
                "singular Savitzky-Golay system for window {window}, order {polyorder}"
            ))
        })?;

        let half = (window / 2) as f64;
        let kernels = (0..window)
            .map(|k| {
                let t = k as f64 - half;
                (0..window)
                    .map(|j| {
                        (deriv..=polyorder)
                            .map(|p| falling_factorial(p, deriv) * t.powi((p - deriv) as i32) * fit[p][j])
                            .sum()
                    })
                    .collect()
            })
            .collect();

        Ok(Self { window, kernels })
    }

    /// Filter `data`. Fails with `InvalidTrace` when the input is shorter
    /// than the window.
    pub fn apply(&self, data: &[f64]) -> Result<Vec<f64>> {
        let n = data.len();
        if n < self.window {
            return Err(ImsError::InvalidTrace {
                len: n,
                window: self.window,
            });
        }

        let half = self.window / 2;
        let last_start = n - self.window;
        let out = (0..n)
            .map(|i| {
                let start = i.saturating_sub(half).min(last_start);
                let kernel = &self.kernels[i - start];
                kernel
                    .iter()
                    .zip(&data[start..start + self.window])
                    .map(|(w, v)| w * v)
                    .sum()
            })
            .collect();
        Ok(out)
    }
}

/// `p! / (p - d)!`
fn falling_factorial(p: usize, d: usize) -> f64 {
    ((p - d + 1)..=p).map(|v| v as f64).product()
}

/// Returns `(AᵀA)⁻¹Aᵀ` for the Vandermonde matrix `A` of the offsets
/// `-window/2 ..= window/2`. Row `p` holds the weights yielding the `p`-th
/// polynomial coefficient.
fn least_squares_operator(window: usize, polyorder: usize) -> Option<Vec<Vec<f64>>> {
    let half = (window / 2) as f64;
    let terms = polyorder + 1;
    let offsets: Vec<f64> = (0..window).map(|j| j as f64 - half).collect();

    let mut normal = vec![vec![0.0; terms]; terms];
    for (r, row) in normal.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = offsets.iter().map(|x| x.powi((r + c) as i32)).sum();
        }
    }
    let rhs: Vec<Vec<f64>> = (0..terms)
        .map(|p| offsets.iter().map(|x| x.powi(p as i32)).collect())
        .collect();

    solve(normal, rhs)
}

/// Gauss-Jordan elimination with partial pivoting for `M · X = B`, where
/// `B` has several right-hand-side columns. Returns `None` for a singular `M`.
fn solve(mut m: Vec<Vec<f64>>, mut b: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let n = m.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&x, &y| m[x][col].abs().total_cmp(&m[y][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        b.swap(col, pivot);

        let diag = m[col][col];
        m[col].iter_mut().for_each(|v| *v /= diag);
        b[col].iter_mut().for_each(|v| *v /= diag);

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                m[row][k] -= factor * m[col][k];
            }
            for k in 0..b[row].len() {
                b[row][k] -= factor * b[col][k];
            }
        }
    }
    Some(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!((x - y).abs() < tol, "index {i}: {x} vs {y}");
        }
    }

    #[test]
    fn classic_5_point_quadratic_coefficients() {
        // textbook weights: (-3, 12, 17, 12, -3) / 35
        let sg = SavitzkyGolay::new(5, 2, 0).unwrap();
        let expected: Vec<f64> = [-3.0, 12.0, 17.0, 12.0, -3.0].iter().map(|v| v / 35.0).collect();
        assert_close(&sg.kernels[2], &expected, 1e-12);
    }

    #[test]
    fn cubic_is_reproduced_including_edges() {
        let data: Vec<f64> = (0..30)
            .map(|i| {
                let x = i as f64;
                0.01 * x * x * x - 0.4 * x * x + 2.0 * x + 5.0
            })
            .collect();
        let sg = SavitzkyGolay::new(11, 3, 0).unwrap();
        let smoothed = sg.apply(&data).unwrap();
        assert_close(&smoothed, &data, 1e-8);
    }

    #[test]
    fn second_derivative_of_parabola() {
        let data: Vec<f64> = (0..25).map(|i| 3.0 * (i as f64).powi(2) - i as f64).collect();
        let sg = SavitzkyGolay::new(11, 3, 2).unwrap();
        let d2 = sg.apply(&data).unwrap();
        assert_close(&d2, &vec![6.0; 25], 1e-8);
    }

    #[test]
    fn constant_signal_is_unchanged() {
        let data = vec![4.2; 40];
        let smoothed = SavitzkyGolay::new(11, 3, 0).unwrap().apply(&data).unwrap();
        assert_close(&smoothed, &data, 1e-10);
    }

    #[test]
    fn short_input_is_rejected() {
        let sg = SavitzkyGolay::new(11, 3, 0).unwrap();
        assert!(matches!(
            sg.apply(&[1.0; 10]),
            Err(ImsError::InvalidTrace { len: 10, window: 11 })
        ));
        assert!(sg.apply(&[1.0; 11]).is_ok());
    }

    #[test]
    fn invalid_geometry() {
        assert!(SavitzkyGolay::new(10, 3, 0).is_err());
        assert!(SavitzkyGolay::new(3, 3, 0).is_err());
        assert!(SavitzkyGolay::new(11, 1, 2).is_err());
    }
}
