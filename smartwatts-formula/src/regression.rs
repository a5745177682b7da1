//! Non-negative, elastic-net-style linear regression.
//!
//! `sklearn.linear_model.ElasticNet(positive=True)` is what the original
//! Python formula fits (see `original_source/smartwatts/rx_formula.py`); no
//! crate in this ecosystem's pack offers the same thing, so this is a small
//! in-house cyclic coordinate descent solver with a non-negativity
//! projection after each coordinate update, operating on `ndarray` vectors.
//! Per spec.md §9, any non-negative least-squares solver satisfies the
//! contract — coefficients are required to come out non-negative and the
//! intercept is conditionally fitted by the caller (`PowerModel::fit`), not
//! by this module.

use ndarray::{Array1, Array2};

/// A fitted (or fitted-to-zero) regression: non-negative coefficients plus
/// an intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct Fit {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
}

/// Coordinate-descent solver for `argmin_w,b 0.5*||y - Xw - b||^2 +
/// l2_penalty/2 * ||w||^2` subject to `w >= 0`.
#[derive(Debug, Clone, Copy)]
pub struct NonNegativeElasticNet {
    /// Ridge-style shrinkage applied to every coefficient. Keeps the solver
    /// well-conditioned when a column of `x` is constant or near-duplicate.
    pub l2_penalty: f64,
    pub max_iterations: usize,
    /// Coordinate descent stops early once no coefficient moves by more
    /// than this amount in a full pass.
    pub tolerance: f64,
}

impl Default for NonNegativeElasticNet {
    fn default() -> Self {
        NonNegativeElasticNet {
            l2_penalty: 1e-6,
            max_iterations: 1_000,
            tolerance: 1e-8,
        }
    }
}

impl NonNegativeElasticNet {
    /// Fits `w` (and, if `fit_intercept`, `b`) to `x`/`y`. `x` has one row
    /// per sample and one column per feature; `y` has one entry per sample.
    /// When `fit_intercept` is false, the intercept is forced to zero, as
    /// required by `PowerModel::fit` (spec.md §4.3: the intercept is only
    /// fitted once the history buffer is at capacity).
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, fit_intercept: bool) -> Fit {
        let (n_samples, n_features) = x.dim();
        let mut coefficients = Array1::<f64>::zeros(n_features);
        let mut intercept = 0.0;

        if n_samples == 0 || n_features == 0 {
            return Fit { coefficients, intercept };
        }

        let column_norms_sq: Vec<f64> = (0..n_features).map(|j| x.column(j).iter().map(|v| v * v).sum::<f64>()).collect();

        for _ in 0..self.max_iterations {
            let mut max_delta: f64 = 0.0;

            if fit_intercept {
                let predicted = x.dot(&coefficients);
                let new_intercept = (&y - &predicted).sum() / n_samples as f64;
                max_delta = max_delta.max((new_intercept - intercept).abs());
                intercept = new_intercept;
            }

            for j in 0..n_features {
                if column_norms_sq[j] == 0.0 {
                    continue;
                }
                let predicted_without_j = x.dot(&coefficients) - &x.column(j) * coefficients[j];
                let residual_without_j = &y - &predicted_without_j - intercept;
                let numerator: f64 = x.column(j).iter().zip(residual_without_j.iter()).map(|(xij, r)| xij * r).sum();
                let updated = (numerator / (column_norms_sq[j] + self.l2_penalty)).max(0.0);
                max_delta = max_delta.max((updated - coefficients[j]).abs());
                coefficients[j] = updated;
            }

            if max_delta < self.tolerance {
                break;
            }
        }

        Fit { coefficients, intercept }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn recovers_known_non_negative_coefficients_without_intercept() {
        // y = 2*x0 + 3*x1, no intercept
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 1.0], [1.0, 2.0]];
        let y = array![2.0, 3.0, 5.0, 7.0, 8.0];
        let solver = NonNegativeElasticNet {
            l2_penalty: 0.0,
            ..Default::default()
        };
        let fit = solver.fit(&x, &y, false);
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-3, "{:?}", fit.coefficients);
        assert!((fit.coefficients[1] - 3.0).abs() < 1e-3, "{:?}", fit.coefficients);
        assert_eq!(fit.intercept, 0.0);
    }

    #[test]
    fn recovers_intercept_when_requested() {
        // y = 10 + 1*x0
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = array![10.0, 11.0, 12.0, 13.0, 14.0];
        let solver = NonNegativeElasticNet {
            l2_penalty: 0.0,
            ..Default::default()
        };
        let fit = solver.fit(&x, &y, true);
        assert!((fit.intercept - 10.0).abs() < 1e-2, "{:?}", fit);
        assert!((fit.coefficients[0] - 1.0).abs() < 1e-2, "{:?}", fit);
    }

    #[test]
    fn coefficients_never_go_negative() {
        // y trends downward with x0, an unconstrained fit would want a negative coefficient
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![10.0, 8.0, 6.0, 4.0];
        let solver = NonNegativeElasticNet::default();
        let fit = solver.fit(&x, &y, true);
        assert!(fit.coefficients[0] >= 0.0, "{:?}", fit);
    }

    #[test]
    fn empty_history_yields_zero_fit() {
        let x = Array2::<f64>::zeros((0, 2));
        let y = Array1::<f64>::zeros(0);
        let fit = NonNegativeElasticNet::default().fit(&x, &y, true);
        assert_eq!(fit.coefficients, array![0.0, 0.0]);
        assert_eq!(fit.intercept, 0.0);
    }
}
