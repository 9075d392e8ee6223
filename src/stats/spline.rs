//! Seasonal Model Module
//! Least-squares fit of monthly counts on a natural cubic spline basis.
//!
//! The basis has `SPLINE_DF` functions plus an intercept. Interior knots sit
//! at evenly spaced quantiles of the month keys and the boundary knots at
//! their range. Keys are rescaled to [0, 1] before the basis is built; the
//! spline space is invariant under that affine map, so only conditioning
//! changes.

use crate::stats::aggregate::MonthCount;
use crate::stats::calculator::StatsCalculator;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use thiserror::Error;

/// Degrees of freedom of the spline expansion (intercept excluded).
pub const SPLINE_DF: usize = 5;

const SVD_EPS: f64 = 1e-12;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Month label {0:?} is not of the form \"YYYY - MM\"")]
    InvalidLabel(String),
    #[error("{points} distinct month keys; at least {required} are needed for the spline fit")]
    TooFewPoints { points: usize, required: usize },
    #[error("Least-squares solve failed: {0}")]
    Solve(&'static str),
}

/// "2006 - 03" -> 200603. The month must be 01..=12.
pub fn numeric_key(label: &str) -> Result<u32, ModelError> {
    let invalid = || ModelError::InvalidLabel(label.to_string());
    let digits: String = label.split(" - ").collect();
    if digits.len() != 6 {
        return Err(invalid());
    }
    let key = digits.parse::<u32>().map_err(|_| invalid())?;
    if !(1..=12).contains(&(key % 100)) {
        return Err(invalid());
    }
    Ok(key)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedPoint {
    pub label: String,
    pub key: u32,
    pub observed: f64,
    pub fitted: f64,
}

/// In-sample fit: one prediction per observed month key.
#[derive(Debug, Clone, Serialize)]
pub struct SeasonalFit {
    pub df: usize,
    /// Boundary and interior knots, in month-key units.
    pub knots: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub points: Vec<FittedPoint>,
    pub r_squared: f64,
}

/// Natural cubic spline basis over a fixed knot sequence (ascending,
/// boundary knots first and last). Evaluates to the intercept, the linear
/// term and `knots.len() - 2` truncated-power terms constrained to be linear
/// beyond the boundary knots.
#[derive(Debug, Clone)]
pub struct NaturalSplineBasis {
    knots: Vec<f64>,
}

impl NaturalSplineBasis {
    pub fn new(knots: Vec<f64>) -> Self {
        Self { knots }
    }

    /// Knots for `df` degrees of freedom: range plus `df - 1` interior
    /// quantiles. `sorted` must be ascending.
    pub fn from_data(sorted: &[f64], df: usize) -> Self {
        let interior = df - 1;
        let mut knots = Vec::with_capacity(df + 1);
        knots.push(sorted[0]);
        for i in 1..=interior {
            let p = 100.0 * i as f64 / (interior + 1) as f64;
            knots.push(StatsCalculator::percentile(sorted, p));
        }
        knots.push(sorted[sorted.len() - 1]);
        Self::new(knots)
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Number of columns, intercept included.
    pub fn width(&self) -> usize {
        self.knots.len()
    }

    fn d(&self, k: usize, x: f64) -> f64 {
        let last = self.knots[self.knots.len() - 1];
        let cube = |v: f64| v.max(0.0).powi(3);
        (cube(x - self.knots[k]) - cube(x - last)) / (last - self.knots[k])
    }

    pub fn row(&self, x: f64) -> Vec<f64> {
        let k_count = self.knots.len();
        let mut row = Vec::with_capacity(k_count);
        row.push(1.0);
        row.push(x);
        let d_last = self.d(k_count - 2, x);
        for k in 0..k_count - 2 {
            row.push(self.d(k, x) - d_last);
        }
        row
    }

    pub fn design_matrix(&self, xs: &[f64]) -> DMatrix<f64> {
        let width = self.width();
        let mut matrix = DMatrix::zeros(xs.len(), width);
        for (i, &x) in xs.iter().enumerate() {
            for (j, value) in self.row(x).into_iter().enumerate() {
                matrix[(i, j)] = value;
            }
        }
        matrix
    }
}

/// Fits the seasonal spline over a window of month buckets.
pub struct SeasonalModel;

impl SeasonalModel {
    pub fn fit(window: &[MonthCount]) -> Result<SeasonalFit, ModelError> {
        let required = SPLINE_DF + 1;

        let mut keyed: Vec<(u32, &MonthCount)> = window
            .iter()
            .map(|m| Ok((numeric_key(&m.label)?, m)))
            .collect::<Result<_, ModelError>>()?;
        keyed.sort_by_key(|(key, _)| *key);

        let mut distinct: Vec<f64> = keyed.iter().map(|(key, _)| f64::from(*key)).collect();
        distinct.dedup();
        if distinct.len() < required {
            return Err(ModelError::TooFewPoints {
                points: distinct.len(),
                required,
            });
        }

        let lo = distinct[0];
        let span = distinct[distinct.len() - 1] - lo;
        let scale = |key: f64| (key - lo) / span;

        let scaled_distinct: Vec<f64> = distinct.iter().map(|&k| scale(k)).collect();
        let basis = NaturalSplineBasis::from_data(&scaled_distinct, SPLINE_DF);

        let xs: Vec<f64> = keyed.iter().map(|(key, _)| scale(f64::from(*key))).collect();
        let ys: Vec<f64> = keyed.iter().map(|(_, m)| f64::from(m.count)).collect();

        let design = basis.design_matrix(&xs);
        let target = DVector::from_vec(ys.clone());
        let coefficients = design
            .clone()
            .svd(true, true)
            .solve(&target, SVD_EPS)
            .map_err(ModelError::Solve)?;
        let fitted = &design * &coefficients;

        let points: Vec<FittedPoint> = keyed
            .iter()
            .zip(fitted.iter())
            .map(|((key, m), &value)| FittedPoint {
                label: m.label.clone(),
                key: *key,
                observed: f64::from(m.count),
                fitted: value,
            })
            .collect();
        let fitted_values: Vec<f64> = points.iter().map(|p| p.fitted).collect();
        let r_squared = StatsCalculator::r_squared(&ys, &fitted_values);

        log::info!(
            "Seasonal spline fit over {} months, R^2 = {r_squared:.3}",
            points.len()
        );

        Ok(SeasonalFit {
            df: SPLINE_DF,
            knots: basis.knots().iter().map(|t| lo + t * span).collect(),
            coefficients: coefficients.iter().copied().collect(),
            points,
            r_squared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::aggregate::month_label;

    fn months(first_year: i32, years: i32, count: impl Fn(usize) -> u32) -> Vec<MonthCount> {
        (0..years)
            .flat_map(|y| (1..=12).map(move |m| (first_year + y, m)))
            .enumerate()
            .map(|(i, (year, month))| MonthCount {
                label: month_label(year, month),
                year,
                count: count(i),
            })
            .collect()
    }

    #[test]
    fn strips_label_separator() {
        assert_eq!(numeric_key("2006 - 03").unwrap(), 200603);
        assert_eq!(numeric_key("2007 - 12").unwrap(), 200712);
        assert!(numeric_key("2006-3").is_err());
        assert!(numeric_key("abcd - ef").is_err());
    }

    #[test]
    fn rejects_out_of_range_months() {
        assert!(matches!(numeric_key("2006 - 00"), Err(ModelError::InvalidLabel(_))));
        assert!(matches!(numeric_key("2006 - 13"), Err(ModelError::InvalidLabel(_))));
        assert_eq!(numeric_key("2006 - 01").unwrap(), 200601);
    }

    #[test]
    fn one_prediction_per_observed_month() {
        let window = months(2006, 2, |i| 100 + (i as u32 % 12) * 7);
        let fit = SeasonalModel::fit(&window).unwrap();

        assert_eq!(fit.points.len(), window.len());
        assert_eq!(fit.df, 5);
        assert_eq!(fit.knots.len(), 6);
        assert_eq!(fit.coefficients.len(), 6);
        for (point, month) in fit.points.iter().zip(&window) {
            assert_eq!(point.label, month.label);
        }
        assert!(fit.r_squared >= 0.0 && fit.r_squared <= 1.0 + 1e-9);
    }

    #[test]
    fn knots_span_the_key_range() {
        let window = months(2006, 2, |i| i as u32);
        let fit = SeasonalModel::fit(&window).unwrap();
        assert!((fit.knots[0] - 200601.0).abs() < 1e-6);
        assert!((fit.knots[5] - 200712.0).abs() < 1e-6);
        assert!(fit.knots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn linear_counts_are_reproduced_exactly() {
        let window: Vec<MonthCount> = months(2006, 2, |_| 0)
            .into_iter()
            .map(|mut m| {
                let key = numeric_key(&m.label).unwrap();
                m.count = key - 200_000;
                m
            })
            .collect();
        let fit = SeasonalModel::fit(&window).unwrap();
        for point in &fit.points {
            assert!((point.fitted - point.observed).abs() < 1e-6, "{point:?}");
        }
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn residuals_sum_to_zero() {
        let seasonal = [120, 95, 140, 160, 210, 230, 250, 240, 190, 150, 130, 110];
        let window = months(2006, 2, |i| seasonal[i % 12]);
        let fit = SeasonalModel::fit(&window).unwrap();
        let residual: f64 = fit.points.iter().map(|p| p.observed - p.fitted).sum();
        assert!(residual.abs() < 1e-6);
    }

    #[test]
    fn too_few_months_is_an_error() {
        let window = months(2006, 1, |i| i as u32)
            .into_iter()
            .take(5)
            .collect::<Vec<_>>();
        assert!(matches!(
            SeasonalModel::fit(&window),
            Err(ModelError::TooFewPoints { points: 5, required: 6 })
        ));
    }

    #[test]
    fn basis_is_linear_beyond_boundary() {
        let basis = NaturalSplineBasis::new(vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0]);
        let a = basis.row(1.5);
        let b = basis.row(2.0);
        let c = basis.row(2.5);
        for j in 0..basis.width() {
            let second_difference = a[j] - 2.0 * b[j] + c[j];
            assert!(second_difference.abs() < 1e-9, "column {j}");
        }
    }
}
