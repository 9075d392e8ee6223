//! Statistics Calculator Module
//! Quantiles, correlation and goodness of fit used by the report.

use crate::data::Borough;
use crate::stats::aggregate::JoinedTable;
use serde::Serialize;
use statrs::statistics::Statistics;

/// Fewer paired years than this give no correlation.
pub const MIN_CORRELATION_PAIRS: usize = 3;

/// Pearson correlation between a borough's normalized rate and unemployment.
#[derive(Debug, Clone, Serialize)]
pub struct BoroughCorrelation {
    pub borough: Borough,
    pub pairs: usize,
    pub pearson_r: Option<f64>,
}

/// Handles statistical calculations over report tables.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Type-7 quantile of ascending `sorted_values`, `p` in percent: linear
    /// interpolation between the order statistics around rank `p/100 * (n-1)`.
    /// Spline interior knots are placed with it, so knots always fall inside
    /// the observed key range.
    pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
        let (first, last) = match (sorted_values.first(), sorted_values.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return f64::NAN,
        };
        let rank = (p / 100.0) * (sorted_values.len() - 1) as f64;
        if rank <= 0.0 {
            return first;
        }
        let below = rank.floor() as usize;
        match sorted_values.get(below + 1) {
            Some(&above) => {
                let weight = rank - below as f64;
                sorted_values[below] + (above - sorted_values[below]) * weight
            }
            None => last,
        }
    }

    /// Sample Pearson correlation. `None` for fewer than
    /// `MIN_CORRELATION_PAIRS` points or when either side is constant.
    pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
        if x.len() != y.len() || x.len() < MIN_CORRELATION_PAIRS {
            return None;
        }
        let sx = x.std_dev();
        let sy = y.std_dev();
        if sx == 0.0 || sy == 0.0 || sx.is_nan() || sy.is_nan() {
            return None;
        }
        Some(x.covariance(y) / (sx * sy))
    }

    /// Coefficient of determination of `fitted` against `observed`.
    pub fn r_squared(observed: &[f64], fitted: &[f64]) -> f64 {
        let mean = observed.mean();
        let ss_tot: f64 = observed.iter().map(|y| (y - mean).powi(2)).sum();
        let ss_res: f64 = observed
            .iter()
            .zip(fitted)
            .map(|(y, f)| (y - f).powi(2))
            .sum();
        if ss_tot == 0.0 {
            return if ss_res == 0.0 { 1.0 } else { f64::NAN };
        }
        1.0 - ss_res / ss_tot
    }

    /// Per-borough correlation over the years where both the rate and the
    /// unemployment figure are present.
    pub fn unemployment_correlations(joined: &JoinedTable) -> Vec<BoroughCorrelation> {
        joined
            .boroughs
            .iter()
            .map(|&borough| {
                let (rates, unemployment): (Vec<f64>, Vec<f64>) = joined
                    .rows
                    .iter()
                    .filter_map(|row| Some((*row.rates.get(&borough)?, row.unemployment?)))
                    .unzip();
                BoroughCorrelation {
                    borough,
                    pairs: rates.len(),
                    pearson_r: Self::pearson(&rates, &unemployment),
                }
            })
            .collect()
    }
}
