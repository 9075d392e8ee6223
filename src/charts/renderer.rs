//! Static Chart Renderer
//! Draws the report charts as PNG files with plotters.
//!
//! Charts:
//! 1. Raw incidents per borough per year (one line per borough)
//! 2. Incidents per million residents with unemployment x100 overlaid
//! 3. Density of recent incidents on a 0.01 degree grid
//! 4. Incidents per month over the full range
//! 5. Observed vs spline-fitted monthly counts for the training window

use crate::stats::aggregate::GEO_BIN_WIDTH;
use crate::stats::{
    numeric_key, BoroughYearMatrix, GeoDensity, JoinedTable, MonthCount, SeasonalFit,
};
use plotters::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 700;
const FONT: &str = "sans-serif";

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Failed to render {path}: {reason}")]
    Render { path: PathBuf, reason: String },
    #[error("Nothing to plot for {0}")]
    NoData(&'static str),
}

/// One named polyline.
#[derive(Debug, Clone)]
pub struct ChartSeries {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

/// Writes chart images into a directory.
pub struct StaticChartRenderer {
    out_dir: PathBuf,
}

impl StaticChartRenderer {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
        }
    }

    /// One series per borough, years on the x axis. Missing cells are skipped.
    pub fn borough_series<T: Copy + Into<f64>>(
        matrix: &BoroughYearMatrix<T>,
    ) -> Vec<ChartSeries> {
        matrix
            .boroughs
            .iter()
            .map(|&borough| ChartSeries {
                name: borough.label().to_string(),
                points: matrix
                    .rows
                    .iter()
                    .filter_map(|row| {
                        let value = *row.values.get(&borough)?;
                        Some((f64::from(row.year), value.into()))
                    })
                    .collect(),
            })
            .collect()
    }

    /// "2006 - 03" -> 2006.1666...
    pub fn fractional_year(label: &str) -> Option<f64> {
        let key = numeric_key(label).ok()?;
        Some(f64::from(key / 100) + f64::from(key % 100 - 1) / 12.0)
    }

    pub fn borough_year_raw(&self, raw: &BoroughYearMatrix<u32>) -> Result<PathBuf, ChartError> {
        let series = Self::borough_series(raw);
        self.line_chart(
            "borough_year_raw.png",
            "Shooting incidents per year by borough",
            ("Year", "Incidents"),
            &series,
        )
    }

    pub fn borough_year_unemployment(&self, joined: &JoinedTable) -> Result<PathBuf, ChartError> {
        let mut series: Vec<ChartSeries> = joined
            .boroughs
            .iter()
            .map(|&borough| ChartSeries {
                name: borough.label().to_string(),
                points: joined
                    .rows
                    .iter()
                    .filter_map(|row| Some((f64::from(row.year), *row.rates.get(&borough)?)))
                    .collect(),
            })
            .collect();
        series.push(ChartSeries {
            name: "Unemployment % x100 (display scale)".to_string(),
            points: joined
                .rows
                .iter()
                .filter_map(|row| Some((f64::from(row.year), row.unemployment_display?)))
                .collect(),
        });
        self.line_chart(
            "borough_year_unemployment.png",
            "Incidents per million residents vs. peak unemployment",
            ("Year", "Per million / unemployment x100"),
            &series,
        )
    }

    pub fn month_counts(&self, counts: &[MonthCount]) -> Result<PathBuf, ChartError> {
        let series = ChartSeries {
            name: "Incidents".to_string(),
            points: counts
                .iter()
                .filter_map(|m| Some((Self::fractional_year(&m.label)?, f64::from(m.count))))
                .collect(),
        };
        self.line_chart(
            "month_counts.png",
            "Shooting incidents per month",
            ("Year", "Incidents"),
            &[series],
        )
    }

    pub fn seasonal_fit(&self, fit: &SeasonalFit) -> Result<PathBuf, ChartError> {
        let name = "seasonal_fit.png";
        let path = self.out_dir.join(name);
        let observed: Vec<(f64, f64)> = fit
            .points
            .iter()
            .filter_map(|p| Some((Self::fractional_year(&p.label)?, p.observed)))
            .collect();
        let fitted: Vec<(f64, f64)> = fit
            .points
            .iter()
            .filter_map(|p| Some((Self::fractional_year(&p.label)?, p.fitted)))
            .collect();
        if observed.is_empty() {
            return Err(ChartError::NoData(name));
        }
        let (x_range, y_range) = bounds(observed.iter().chain(&fitted));
        let fail = |e: &dyn std::fmt::Display| render_error(&path, e);

        let root = BitMapBackend::new(&path, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| fail(&e))?;
        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("Monthly incidents with natural spline fit (df = {})", fit.df),
                (FONT, 24),
            )
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)
            .map_err(|e| fail(&e))?;
        chart
            .configure_mesh()
            .x_desc("Year")
            .y_desc("Incidents")
            .draw()
            .map_err(|e| fail(&e))?;

        chart
            .draw_series(observed.iter().map(|&p| Circle::new(p, 3, BLUE.filled())))
            .map_err(|e| fail(&e))?
            .label("Observed")
            .legend(|(x, y)| Circle::new((x + 10, y), 3, BLUE.filled()));
        chart
            .draw_series(LineSeries::new(fitted, RED.stroke_width(2)))
            .map_err(|e| fail(&e))?
            .label(format!("Fitted (R^2 = {:.3})", fit.r_squared))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(|e| fail(&e))?;
        root.present().map_err(|e| fail(&e))?;
        Ok(path.clone())
    }

    pub fn geo_density(&self, density: &GeoDensity) -> Result<PathBuf, ChartError> {
        let name = "geo_density.png";
        let path = self.out_dir.join(name);
        let max_count = density.bins.iter().map(|b| b.count).max().unwrap_or(0);
        if max_count == 0 {
            return Err(ChartError::NoData(name));
        }
        let corners: Vec<(f64, f64)> = density
            .bins
            .iter()
            .flat_map(|b| {
                let (x, y) = b.origin();
                [(x, y), (x + GEO_BIN_WIDTH, y + GEO_BIN_WIDTH)]
            })
            .collect();
        let (x_range, y_range) = tight_bounds(&corners);
        let fail = |e: &dyn std::fmt::Display| render_error(&path, e);

        let root = BitMapBackend::new(&path, (HEIGHT + 100, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| fail(&e))?;
        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("Shooting density since {}", density.min_year),
                (FONT, 24),
            )
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)
            .map_err(|e| fail(&e))?;
        chart
            .configure_mesh()
            .x_desc("Longitude")
            .y_desc("Latitude")
            .draw()
            .map_err(|e| fail(&e))?;

        chart
            .draw_series(density.bins.iter().map(|b| {
                let (x, y) = b.origin();
                let shade = f64::from(b.count) / f64::from(max_count);
                Rectangle::new(
                    [(x, y), (x + GEO_BIN_WIDTH, y + GEO_BIN_WIDTH)],
                    HSLColor(0.66 * (1.0 - shade), 0.9, 0.5).filled(),
                )
            }))
            .map_err(|e| fail(&e))?;
        root.present().map_err(|e| fail(&e))?;
        Ok(path.clone())
    }

    fn line_chart(
        &self,
        name: &'static str,
        title: &str,
        (x_desc, y_desc): (&str, &str),
        series: &[ChartSeries],
    ) -> Result<PathBuf, ChartError> {
        let path = self.out_dir.join(name);
        if series.iter().all(|s| s.points.is_empty()) {
            return Err(ChartError::NoData(name));
        }
        let (x_range, y_range) = bounds(series.iter().flat_map(|s| s.points.iter()));
        let fail = |e: &dyn std::fmt::Display| render_error(&path, e);

        let root = BitMapBackend::new(&path, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| fail(&e))?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, (FONT, 24))
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)
            .map_err(|e| fail(&e))?;
        chart
            .configure_mesh()
            .x_desc(x_desc)
            .y_desc(y_desc)
            .draw()
            .map_err(|e| fail(&e))?;

        for (idx, s) in series.iter().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            chart
                .draw_series(LineSeries::new(s.points.iter().copied(), color.stroke_width(2)))
                .map_err(|e| fail(&e))?
                .label(s.name.as_str())
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                });
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(|e| fail(&e))?;
        root.present().map_err(|e| fail(&e))?;
        Ok(path.clone())
    }
}

fn render_error(path: &Path, e: &dyn std::fmt::Display) -> ChartError {
    ChartError::Render {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Axis ranges with 5% headroom; the y axis starts at zero for non-negative data.
fn bounds<'a>(points: impl Iterator<Item = &'a (f64, f64)>) -> (Range<f64>, Range<f64>) {
    let mut x = (f64::INFINITY, f64::NEG_INFINITY);
    let mut y = (f64::INFINITY, f64::NEG_INFINITY);
    for &(px, py) in points {
        x = (x.0.min(px), x.1.max(px));
        y = (y.0.min(py), y.1.max(py));
    }
    if x.0 > x.1 {
        return (0.0..1.0, 0.0..1.0);
    }
    let y_lo = if y.0 >= 0.0 { 0.0 } else { y.0 * 1.05 };
    (pad(x.0, x.1, 0.0), pad(y_lo, y.1 * 1.05, 0.0))
}

fn tight_bounds(points: &[(f64, f64)]) -> (Range<f64>, Range<f64>) {
    let x_lo = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let x_hi = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let y_lo = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let y_hi = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    (
        pad(x_lo, x_hi, GEO_BIN_WIDTH),
        pad(y_lo, y_hi, GEO_BIN_WIDTH),
    )
}

fn pad(lo: f64, hi: f64, margin: f64) -> Range<f64> {
    if hi - lo <= f64::EPSILON {
        return (lo - 1.0)..(hi + 1.0);
    }
    (lo - margin)..(hi + margin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Borough;
    use crate::stats::aggregate::BoroughYearRow;
    use std::collections::BTreeMap;

    #[test]
    fn fractional_year_from_label() {
        assert_eq!(StaticChartRenderer::fractional_year("2006 - 01"), Some(2006.0));
        let july = StaticChartRenderer::fractional_year("2007 - 07").unwrap();
        assert!((july - 2007.5).abs() < 1e-12);
        assert_eq!(StaticChartRenderer::fractional_year("July 2007"), None);
        assert_eq!(StaticChartRenderer::fractional_year("2007 - 00"), None);
    }

    #[test]
    fn borough_series_skip_missing_years() {
        let matrix = BoroughYearMatrix {
            boroughs: vec![Borough::Bronx, Borough::Queens],
            rows: vec![
                BoroughYearRow {
                    year: 2006,
                    values: BTreeMap::from([(Borough::Bronx, 2u32), (Borough::Queens, 1)]),
                },
                BoroughYearRow {
                    year: 2007,
                    values: BTreeMap::from([(Borough::Bronx, 4u32)]),
                },
            ],
        };
        let series = StaticChartRenderer::borough_series(&matrix);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].points, vec![(2006.0, 2.0), (2007.0, 4.0)]);
        assert_eq!(series[1].points, vec![(2006.0, 1.0)]);
    }

    #[test]
    fn bounds_start_at_zero_for_counts() {
        let points = [(2006.0, 10.0), (2010.0, 40.0)];
        let (x, y) = bounds(points.iter());
        assert_eq!(x, 2006.0..2010.0);
        assert_eq!(y.start, 0.0);
        assert!((y.end - 42.0).abs() < 1e-9);
    }

    #[test]
    fn empty_chart_is_reported() {
        let renderer = StaticChartRenderer::new(&std::env::temp_dir());
        assert!(matches!(
            renderer.month_counts(&[]),
            Err(ChartError::NoData("month_counts.png"))
        ));
    }
}
