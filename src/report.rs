//! Report Module
//! Runs the pipeline over the raw sources and writes every data product.
//!
//! Exports go to one directory: a CSV per table, `report.json` with all
//! products, and the chart PNGs when rendering is enabled.

use crate::charts::{ChartError, StaticChartRenderer};
use crate::config::ReportConfig;
use crate::data::{
    IncidentRecord, IncidentTidier, MaxUnemploymentByYear, RawSources, TidyError,
    UnemploymentError, UnemploymentTidier,
};
use crate::stats::{
    month_frame, AggregateError, Aggregator, BoroughCorrelation, BoroughYearMatrix, GeoDensity,
    JoinedTable, ModelError, MonthCount, SeasonalFit, SeasonalModel, StatsCalculator,
};
use polars::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Tidy(#[from] TidyError),
    #[error(transparent)]
    Unemployment(#[from] UnemploymentError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Every data product of one run.
#[derive(Debug, Serialize)]
pub struct Report {
    #[serde(skip)]
    pub incidents: Vec<IncidentRecord>,
    pub incident_count: usize,
    pub borough_year_raw: BoroughYearMatrix<u32>,
    pub borough_year_normalized: BoroughYearMatrix<f64>,
    pub unemployment_max_by_year: MaxUnemploymentByYear,
    pub borough_year_unemployment: JoinedTable,
    pub correlations: Vec<BoroughCorrelation>,
    pub geo_density: GeoDensity,
    pub month_counts: Vec<MonthCount>,
    pub training_months: Vec<MonthCount>,
    pub seasonal_fit: SeasonalFit,
}

impl Report {
    /// Single forward pass: tidy, aggregate, join, model.
    pub fn build(raw: &RawSources, config: &ReportConfig) -> Result<Self, ReportError> {
        let incidents = IncidentTidier::tidy(&raw.incidents)?;
        let unemployment = UnemploymentTidier::tidy(
            &raw.unemployment_lines,
            &config.metro_area,
            config.unemployment_years,
        )?;
        let unemployment_max_by_year = UnemploymentTidier::max_by_year(&unemployment);
        if unemployment_max_by_year.is_empty() {
            log::warn!("No unemployment rows for {}", config.metro_area);
        } else {
            log::info!("Peak unemployment for {} years", unemployment_max_by_year.len());
        }

        let borough_year_raw = Aggregator::borough_year_counts(&incidents);
        let borough_year_normalized =
            Aggregator::normalize(&borough_year_raw, &config.populations)?;
        let borough_year_unemployment =
            Aggregator::join_unemployment(&borough_year_normalized, &unemployment_max_by_year);
        let correlations = StatsCalculator::unemployment_correlations(&borough_year_unemployment);

        let geo_density = Aggregator::geo_density(&incidents, config.geo_min_year);

        let month_counts = Aggregator::month_counts(&incidents);
        let training_months = Aggregator::training_window(&month_counts, config.training_end_year)?;
        let seasonal_fit = SeasonalModel::fit(&training_months)?;

        Ok(Self {
            incident_count: incidents.len(),
            incidents,
            borough_year_raw,
            borough_year_normalized,
            unemployment_max_by_year,
            borough_year_unemployment,
            correlations,
            geo_density,
            month_counts,
            training_months,
            seasonal_fit,
        })
    }

    pub fn seasonal_frame(&self) -> Result<DataFrame, ReportError> {
        let points = &self.seasonal_fit.points;
        let labels: Vec<&str> = points.iter().map(|p| p.label.as_str()).collect();
        let keys: Vec<u32> = points.iter().map(|p| p.key).collect();
        let observed: Vec<f64> = points.iter().map(|p| p.observed).collect();
        let fitted: Vec<f64> = points.iter().map(|p| p.fitted).collect();
        Ok(DataFrame::new(vec![
            Column::new("year_month".into(), labels),
            Column::new("key".into(), keys),
            Column::new("observed".into(), observed),
            Column::new("fitted".into(), fitted),
        ])?)
    }

    /// Named tables in export order.
    pub fn tables(&self) -> Result<Vec<(&'static str, DataFrame)>, ReportError> {
        Ok(vec![
            ("borough_year_raw", self.borough_year_raw.to_dataframe()?),
            (
                "borough_year_normalized",
                self.borough_year_normalized.to_dataframe()?,
            ),
            (
                "unemployment_max_by_year",
                self.unemployment_max_by_year.to_dataframe()?,
            ),
            (
                "borough_year_unemployment",
                self.borough_year_unemployment.to_dataframe()?,
            ),
            ("geo_bins", self.geo_density.to_dataframe()?),
            ("month_counts", month_frame(&self.month_counts)?),
            ("month_counts_training", month_frame(&self.training_months)?),
            ("seasonal_fit", self.seasonal_frame()?),
        ])
    }

    pub fn print_summary(&self) -> Result<(), ReportError> {
        let tidied = IncidentTidier::to_dataframe(&self.incidents)?;
        println!("Tidied incidents: {}\n{}", self.incident_count, tidied.head(Some(10)));
        for (name, df) in self.tables()? {
            println!("\n== {name} ==\n{df}");
        }

        println!("\n== correlation with peak unemployment ==");
        for c in &self.correlations {
            match c.pearson_r {
                Some(r) => println!(
                    "{:<14} r = {r:>6.3} over {} years",
                    c.borough.label(),
                    c.pairs
                ),
                None => println!(
                    "{:<14} n/a ({} paired years)",
                    c.borough.label(),
                    c.pairs
                ),
            }
        }
        println!(
            "\nSeasonal fit: {} months, R^2 = {:.3}",
            self.seasonal_fit.points.len(),
            self.seasonal_fit.r_squared
        );
        println!("Note: unemployment_x100 is a display scale for shared chart axes, not a rate.");
        Ok(())
    }

    /// Write CSV tables and `report.json` into `dir`.
    pub fn export(&self, dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        for (name, mut df) in self.tables()? {
            let path = dir.join(format!("{name}.csv"));
            let mut file = File::create(&path)?;
            CsvWriter::new(&mut file)
                .include_header(true)
                .finish(&mut df)?;
            written.push(path);
        }

        let json_path = dir.join("report.json");
        let writer = BufWriter::new(File::create(&json_path)?);
        serde_json::to_writer_pretty(writer, self)?;
        written.push(json_path);

        log::info!("Exported {} files to {}", written.len(), dir.display());
        Ok(written)
    }

    /// Render every chart into `dir`. A chart with nothing to plot is skipped.
    pub fn render_charts(&self, dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
        fs::create_dir_all(dir)?;
        let renderer = StaticChartRenderer::new(dir);
        let results = [
            renderer.borough_year_raw(&self.borough_year_raw),
            renderer.borough_year_unemployment(&self.borough_year_unemployment),
            renderer.geo_density(&self.geo_density),
            renderer.month_counts(&self.month_counts),
            renderer.seasonal_fit(&self.seasonal_fit),
        ];

        let mut written = Vec::new();
        for result in results {
            match result {
                Ok(path) => written.push(path),
                Err(ChartError::NoData(name)) => log::warn!("Skipping {name}: no data"),
                Err(e) => return Err(e.into()),
            }
        }
        log::info!("Rendered {} charts", written.len());
        Ok(written)
    }
}
