//! Aggregation Module
//! Borough-year matrices, the unemployment join, geo bins and month buckets.

use crate::config::PopulationTable;
use crate::data::{Borough, IncidentRecord, MaxUnemploymentByYear};
use polars::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Normalized rates are incidents per million residents.
pub const RATE_SCALE: f64 = 1_000_000.0;

/// Unemployment is multiplied by this before charting so it shares an axis
/// with per-million incident rates. Display only; carries no statistical
/// meaning.
pub const UNEMPLOYMENT_DISPLAY_SCALE: f64 = 100.0;

/// Side of one density cell, in degrees of longitude and latitude.
pub const GEO_BIN_WIDTH: f64 = 0.01;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("No population configured for {0}")]
    MissingPopulation(Borough),
    #[error("No incidents before {end_year}; the training window is empty")]
    EmptyWindow { end_year: i32 },
}

/// One year of a borough matrix. Boroughs with no incidents that year are
/// absent from `values`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoroughYearRow<T> {
    pub year: i32,
    pub values: BTreeMap<Borough, T>,
}

/// Year x borough table, ascending by year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoroughYearMatrix<T> {
    /// Boroughs seen anywhere in the source, one column each.
    pub boroughs: Vec<Borough>,
    pub rows: Vec<BoroughYearRow<T>>,
}

impl<T: Copy> BoroughYearMatrix<T> {
    #[cfg(test)]
    pub fn get(&self, year: i32, borough: Borough) -> Option<T> {
        self.rows
            .iter()
            .find(|row| row.year == year)
            .and_then(|row| row.values.get(&borough).copied())
    }

    pub fn years(&self) -> Vec<i32> {
        self.rows.iter().map(|row| row.year).collect()
    }

    pub fn column(&self, borough: Borough) -> Vec<Option<T>> {
        self.rows
            .iter()
            .map(|row| row.values.get(&borough).copied())
            .collect()
    }
}

impl<T: Copy> BoroughYearMatrix<T>
where
    Series: NamedFrom<Vec<Option<T>>, [Option<T>]>,
{
    pub fn to_dataframe(&self) -> Result<DataFrame, AggregateError> {
        let mut columns = vec![Column::new::<Vec<i32>, [i32]>("year".into(), self.years())];
        for &borough in &self.boroughs {
            columns.push(Column::new(borough.label().into(), self.column(borough)));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Normalized matrix row with the year's unemployment attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRow {
    pub year: i32,
    pub rates: BTreeMap<Borough, f64>,
    /// `None` when the unemployment table has no row for this year.
    pub unemployment: Option<f64>,
    /// `unemployment * UNEMPLOYMENT_DISPLAY_SCALE`, for charting only.
    pub unemployment_display: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedTable {
    pub boroughs: Vec<Borough>,
    pub rows: Vec<JoinedRow>,
}

impl JoinedTable {
    pub fn to_dataframe(&self) -> Result<DataFrame, AggregateError> {
        let years: Vec<i32> = self.rows.iter().map(|r| r.year).collect();
        let mut columns = vec![Column::new("year".into(), years)];
        for &borough in &self.boroughs {
            let rates: Vec<Option<f64>> = self
                .rows
                .iter()
                .map(|r| r.rates.get(&borough).copied())
                .collect();
            columns.push(Column::new(borough.label().into(), rates));
        }
        let unemployment: Vec<Option<f64>> = self.rows.iter().map(|r| r.unemployment).collect();
        let display: Vec<Option<f64>> = self
            .rows
            .iter()
            .map(|r| r.unemployment_display)
            .collect();
        columns.push(Column::new("unemployment".into(), unemployment));
        columns.push(Column::new("unemployment_x100".into(), display));
        Ok(DataFrame::new(columns)?)
    }
}

/// Snap distance for coordinates that sit on a cell edge but divide to just
/// under the integer (40.58 / 0.01 = 4057.9999999999995).
const BIN_EDGE_EPS: f64 = 1e-9;

/// `floor(coordinate / GEO_BIN_WIDTH)`, with cell edges counted in the cell
/// they open.
fn bin_index(coordinate: f64) -> i64 {
    let scaled = coordinate / GEO_BIN_WIDTH;
    let nearest = scaled.round();
    if (scaled - nearest).abs() < BIN_EDGE_EPS {
        nearest as i64
    } else {
        scaled.floor() as i64
    }
}

/// Incident count in one `GEO_BIN_WIDTH` square, indexed by `bin_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeoBin {
    pub lon_bin: i64,
    pub lat_bin: i64,
    pub count: u32,
}

impl GeoBin {
    /// South-west corner of the cell as (longitude, latitude).
    pub fn origin(&self) -> (f64, f64) {
        (
            self.lon_bin as f64 * GEO_BIN_WIDTH,
            self.lat_bin as f64 * GEO_BIN_WIDTH,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoDensity {
    pub min_year: i32,
    pub bins: Vec<GeoBin>,
    /// Incidents in range that had no coordinates.
    pub skipped: usize,
}

impl GeoDensity {
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|b| u64::from(b.count)).sum()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, AggregateError> {
        let (lons, lats): (Vec<f64>, Vec<f64>) = self.bins.iter().map(GeoBin::origin).unzip();
        let counts: Vec<u32> = self.bins.iter().map(|b| b.count).collect();
        Ok(DataFrame::new(vec![
            Column::new("lon_min".into(), lons),
            Column::new("lat_min".into(), lats),
            Column::new("count".into(), counts),
        ])?)
    }
}

/// Incidents in one calendar month, labelled "YYYY - MM".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    pub label: String,
    pub year: i32,
    pub count: u32,
}

pub fn month_label(year: i32, month: u32) -> String {
    format!("{year} - {month:02}")
}

pub fn month_frame(counts: &[MonthCount]) -> Result<DataFrame, AggregateError> {
    let labels: Vec<&str> = counts.iter().map(|m| m.label.as_str()).collect();
    let values: Vec<u32> = counts.iter().map(|m| m.count).collect();
    Ok(DataFrame::new(vec![
        Column::new("year_month".into(), labels),
        Column::new("count".into(), values),
    ])?)
}

/// Group-and-count reshapes over tidied incidents.
pub struct Aggregator;

impl Aggregator {
    /// Count incidents per (year, borough), then widen to one row per year.
    pub fn borough_year_counts(records: &[IncidentRecord]) -> BoroughYearMatrix<u32> {
        let mut counts: BTreeMap<i32, BTreeMap<Borough, u32>> = BTreeMap::new();
        let mut boroughs: BTreeSet<Borough> = BTreeSet::new();

        for record in records {
            *counts
                .entry(record.year())
                .or_default()
                .entry(record.borough)
                .or_insert(0) += 1;
            boroughs.insert(record.borough);
        }

        let matrix = BoroughYearMatrix {
            boroughs: boroughs.into_iter().collect(),
            rows: counts
                .into_iter()
                .map(|(year, values)| BoroughYearRow { year, values })
                .collect(),
        };
        log::info!(
            "Borough-year matrix: {} years x {} boroughs",
            matrix.rows.len(),
            matrix.boroughs.len()
        );
        matrix
    }

    /// Scale each count to incidents per million residents of its borough.
    pub fn normalize(
        raw: &BoroughYearMatrix<u32>,
        populations: &PopulationTable,
    ) -> Result<BoroughYearMatrix<f64>, AggregateError> {
        let mut factors: BTreeMap<Borough, f64> = BTreeMap::new();
        for &borough in &raw.boroughs {
            let population = populations
                .get(borough)
                .ok_or(AggregateError::MissingPopulation(borough))?;
            factors.insert(borough, population as f64);
        }

        let rows = raw
            .rows
            .iter()
            .map(|row| BoroughYearRow {
                year: row.year,
                values: row
                    .values
                    .iter()
                    .map(|(b, &count)| (*b, f64::from(count) / factors[b] * RATE_SCALE))
                    .collect(),
            })
            .collect();

        Ok(BoroughYearMatrix {
            boroughs: raw.boroughs.clone(),
            rows,
        })
    }

    /// Left join on year: every matrix year is kept exactly once.
    pub fn join_unemployment(
        normalized: &BoroughYearMatrix<f64>,
        unemployment: &MaxUnemploymentByYear,
    ) -> JoinedTable {
        let rows: Vec<JoinedRow> = normalized
            .rows
            .iter()
            .map(|row| {
                let rate = unemployment.get(row.year);
                JoinedRow {
                    year: row.year,
                    rates: row.values.clone(),
                    unemployment: rate,
                    unemployment_display: rate.map(|r| r * UNEMPLOYMENT_DISPLAY_SCALE),
                }
            })
            .collect();

        let gaps = rows.iter().filter(|r| r.unemployment.is_none()).count();
        if gaps > 0 {
            log::debug!("{gaps} incident years have no unemployment figure");
        }

        JoinedTable {
            boroughs: normalized.boroughs.clone(),
            rows,
        }
    }

    /// Bin (longitude, latitude) of incidents from `min_year` on.
    pub fn geo_density(records: &[IncidentRecord], min_year: i32) -> GeoDensity {
        let mut cells: BTreeMap<(i64, i64), u32> = BTreeMap::new();
        let mut skipped = 0usize;

        for record in records.iter().filter(|r| r.year() >= min_year) {
            let Some((lon, lat)) = record.coordinates() else {
                skipped += 1;
                continue;
            };
            let key = (bin_index(lon), bin_index(lat));
            *cells.entry(key).or_insert(0) += 1;
        }

        if skipped > 0 {
            log::debug!("Geo density: {skipped} incidents without coordinates");
        }

        GeoDensity {
            min_year,
            bins: cells
                .into_iter()
                .map(|((lon_bin, lat_bin), count)| GeoBin {
                    lon_bin,
                    lat_bin,
                    count,
                })
                .collect(),
            skipped,
        }
    }

    /// Incidents per "YYYY - MM" label, in label order (which is
    /// chronological thanks to the zero-padded month).
    pub fn month_counts(records: &[IncidentRecord]) -> Vec<MonthCount> {
        let mut counts: BTreeMap<String, (i32, u32)> = BTreeMap::new();
        for record in records {
            counts
                .entry(month_label(record.year(), record.month()))
                .or_insert((record.year(), 0))
                .1 += 1;
        }
        counts
            .into_iter()
            .map(|(label, (year, count))| MonthCount { label, year, count })
            .collect()
    }

    /// Month buckets with year strictly before `end_year`.
    pub fn training_window(
        counts: &[MonthCount],
        end_year: i32,
    ) -> Result<Vec<MonthCount>, AggregateError> {
        let window: Vec<MonthCount> = counts
            .iter()
            .filter(|m| m.year < end_year)
            .cloned()
            .collect();
        if window.is_empty() {
            log::warn!("Training window before {end_year} has no month buckets");
            return Err(AggregateError::EmptyWindow { end_year });
        }
        Ok(window)
    }
}
