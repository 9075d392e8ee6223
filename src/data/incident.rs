//! Incident Tidy Module
//! Types the raw incident export: dates, times, borough and coordinates.

use chrono::{Datelike, NaiveDate, NaiveTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const OCCUR_DATE_COL: &str = "OCCUR_DATE";
pub const OCCUR_TIME_COL: &str = "OCCUR_TIME";
pub const BORO_COL: &str = "BORO";
pub const LATITUDE_COL: &str = "Latitude";
pub const LONGITUDE_COL: &str = "Longitude";
/// "POINT (lon lat)" string duplicating the two coordinate columns.
pub const LON_LAT_COL: &str = "Lon_Lat";

const DATE_FORMAT: &str = "%m/%d/%Y";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Row numbers in errors are 1-based data rows (header excluded).
#[derive(Error, Debug)]
pub enum TidyError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Row {row}: invalid occurrence date {value:?} (expected MM/DD/YYYY)")]
    InvalidDate { row: usize, value: String },
    #[error("Row {row}: invalid occurrence time {value:?} (expected HH:MM:SS)")]
    InvalidTime { row: usize, value: String },
    #[error("Row {row}: unknown borough {value:?}")]
    UnknownBorough { row: usize, value: String },
    #[error("Row {row}: invalid {field} {value:?}")]
    InvalidCoordinate {
        row: usize,
        field: &'static str,
        value: String,
    },
}

/// The five NYC boroughs, in the dataset's label spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Borough {
    #[serde(rename = "BRONX")]
    Bronx,
    #[serde(rename = "BROOKLYN")]
    Brooklyn,
    #[serde(rename = "MANHATTAN")]
    Manhattan,
    #[serde(rename = "QUEENS")]
    Queens,
    #[serde(rename = "STATEN ISLAND")]
    StatenIsland,
}

impl Borough {
    pub const ALL: [Borough; 5] = [
        Borough::Bronx,
        Borough::Brooklyn,
        Borough::Manhattan,
        Borough::Queens,
        Borough::StatenIsland,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Borough::Bronx => "BRONX",
            Borough::Brooklyn => "BROOKLYN",
            Borough::Manhattan => "MANHATTAN",
            Borough::Queens => "QUEENS",
            Borough::StatenIsland => "STATEN ISLAND",
        }
    }

    pub fn from_label(label: &str) -> Option<Borough> {
        Self::ALL
            .into_iter()
            .find(|b| b.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Borough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One shooting incident, typed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentRecord {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub borough: Borough,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl IncidentRecord {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.longitude?, self.latitude?))
    }
}

/// Normalizes the raw incident table.
pub struct IncidentTidier;

impl IncidentTidier {
    /// Drop the combined coordinate column when the export carries it.
    pub fn drop_combined_coordinates(raw: &DataFrame) -> Result<DataFrame, TidyError> {
        if raw.column(LON_LAT_COL).is_ok() {
            Ok(raw.drop(LON_LAT_COL)?)
        } else {
            Ok(raw.clone())
        }
    }

    /// Type every row of the raw export. The output has exactly one record per
    /// input row; the first unparseable date, time, borough or coordinate
    /// fails the whole table.
    pub fn tidy(raw: &DataFrame) -> Result<Vec<IncidentRecord>, TidyError> {
        let df = Self::drop_combined_coordinates(raw)?;

        let dates = df.column(OCCUR_DATE_COL)?.str()?;
        let times = df.column(OCCUR_TIME_COL)?.str()?;
        let boroughs = df.column(BORO_COL)?.str()?;
        let latitudes = df.column(LATITUDE_COL)?.str()?;
        let longitudes = df.column(LONGITUDE_COL)?.str()?;

        let mut records = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let row = i + 1;
            records.push(IncidentRecord {
                date: parse_date(row, dates.get(i))?,
                time: parse_time(row, times.get(i))?,
                borough: parse_borough(row, boroughs.get(i))?,
                latitude: parse_coordinate(row, LATITUDE_COL, latitudes.get(i))?,
                longitude: parse_coordinate(row, LONGITUDE_COL, longitudes.get(i))?,
            });
        }

        log::info!("Tidied {} incident records", records.len());
        Ok(records)
    }

    /// Typed table view of tidied incidents, with the derived year.
    pub fn to_dataframe(records: &[IncidentRecord]) -> Result<DataFrame, TidyError> {
        let dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        let times: Vec<NaiveTime> = records.iter().map(|r| r.time).collect();
        let years: Vec<i32> = records.iter().map(IncidentRecord::year).collect();
        let boroughs: Vec<&str> = records.iter().map(|r| r.borough.label()).collect();
        let latitudes: Vec<Option<f64>> = records.iter().map(|r| r.latitude).collect();
        let longitudes: Vec<Option<f64>> = records.iter().map(|r| r.longitude).collect();

        let df = DataFrame::new(vec![
            Column::new(OCCUR_DATE_COL.into(), dates),
            Column::new(OCCUR_TIME_COL.into(), times),
            Column::new("year".into(), years),
            Column::new(BORO_COL.into(), boroughs),
            Column::new(LATITUDE_COL.into(), latitudes),
            Column::new(LONGITUDE_COL.into(), longitudes),
        ])?;
        Ok(df)
    }
}

fn parse_date(row: usize, value: Option<&str>) -> Result<NaiveDate, TidyError> {
    let text = value.unwrap_or_default().trim();
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| TidyError::InvalidDate {
        row,
        value: text.to_string(),
    })
}

fn parse_time(row: usize, value: Option<&str>) -> Result<NaiveTime, TidyError> {
    let text = value.unwrap_or_default().trim();
    NaiveTime::parse_from_str(text, TIME_FORMAT).map_err(|_| TidyError::InvalidTime {
        row,
        value: text.to_string(),
    })
}

fn parse_borough(row: usize, value: Option<&str>) -> Result<Borough, TidyError> {
    let text = value.unwrap_or_default();
    Borough::from_label(text).ok_or_else(|| TidyError::UnknownBorough {
        row,
        value: text.to_string(),
    })
}

/// Empty means "not recorded" and becomes `None`; anything else must be a number.
fn parse_coordinate(
    row: usize,
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<f64>, TidyError> {
    let text = value.unwrap_or_default().trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| TidyError::InvalidCoordinate {
            row,
            field,
            value: text.to_string(),
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn raw_frame(rows: &[[&str; 5]]) -> DataFrame {
        let column = |idx: usize| -> Vec<&str> { rows.iter().map(|r| r[idx]).collect() };
        let lon_lat: Vec<String> = rows
            .iter()
            .map(|r| format!("POINT ({} {})", r[4], r[3]))
            .collect();
        DataFrame::new(vec![
            Column::new(OCCUR_DATE_COL.into(), column(0)),
            Column::new(OCCUR_TIME_COL.into(), column(1)),
            Column::new(BORO_COL.into(), column(2)),
            Column::new(LATITUDE_COL.into(), column(3)),
            Column::new(LONGITUDE_COL.into(), column(4)),
            Column::new(LON_LAT_COL.into(), lon_lat),
        ])
        .unwrap()
    }

    pub(crate) fn record(date: &str, borough: Borough, lat: f64, lon: f64) -> IncidentRecord {
        IncidentRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            borough,
            latitude: Some(lat),
            longitude: Some(lon),
        }
    }

    #[test]
    fn tidies_valid_rows() {
        let raw = raw_frame(&[
            ["01/15/2006", "23:05:00", "BRONX", "40.8448", "-73.8648"],
            ["12/31/2020", "00:00:01", "STATEN ISLAND", "40.5795", "-74.1502"],
        ]);
        let records = IncidentTidier::tidy(&raw).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2006, 1, 15).unwrap());
        assert_eq!(records[0].time, NaiveTime::from_hms_opt(23, 5, 0).unwrap());
        assert_eq!(records[0].year(), 2006);
        assert_eq!(records[1].borough, Borough::StatenIsland);
        assert_eq!(records[1].year(), records[1].date.year());
    }

    #[test]
    fn drops_combined_coordinate_column() {
        let raw = raw_frame(&[["01/15/2006", "23:05:00", "BRONX", "40.8", "-73.8"]]);
        let df = IncidentTidier::drop_combined_coordinates(&raw).unwrap();
        assert!(df.column(LON_LAT_COL).is_err());
        assert_eq!(df.width(), raw.width() - 1);
        assert_eq!(df.height(), raw.height());
    }

    #[test]
    fn empty_coordinates_become_none() {
        let raw = raw_frame(&[["01/15/2006", "23:05:00", "QUEENS", "", ""]]);
        let records = IncidentTidier::tidy(&raw).unwrap();
        assert_eq!(records[0].latitude, None);
        assert_eq!(records[0].coordinates(), None);
    }

    #[test]
    fn invalid_date_fails_with_row() {
        let raw = raw_frame(&[
            ["01/15/2006", "23:05:00", "BRONX", "", ""],
            ["2006-01-16", "23:05:00", "BRONX", "", ""],
        ]);
        match IncidentTidier::tidy(&raw) {
            Err(TidyError::InvalidDate { row, value }) => {
                assert_eq!(row, 2);
                assert_eq!(value, "2006-01-16");
            }
            other => panic!("expected InvalidDate, got {other:?}"),
        }
    }

    #[test]
    fn invalid_time_fails() {
        let raw = raw_frame(&[["01/15/2006", "25:61", "BRONX", "", ""]]);
        assert!(matches!(
            IncidentTidier::tidy(&raw),
            Err(TidyError::InvalidTime { row: 1, .. })
        ));
    }

    #[test]
    fn unknown_borough_fails() {
        let raw = raw_frame(&[["01/15/2006", "10:00:00", "NEWARK", "", ""]]);
        assert!(matches!(
            IncidentTidier::tidy(&raw),
            Err(TidyError::UnknownBorough { .. })
        ));
    }

    #[test]
    fn malformed_coordinate_fails() {
        let raw = raw_frame(&[["01/15/2006", "10:00:00", "BRONX", "north", "-73.8"]]);
        assert!(matches!(
            IncidentTidier::tidy(&raw),
            Err(TidyError::InvalidCoordinate {
                field: LATITUDE_COL,
                ..
            })
        ));
    }

    #[test]
    fn borough_labels_round_trip() {
        for borough in Borough::ALL {
            assert_eq!(Borough::from_label(borough.label()), Some(borough));
        }
        assert_eq!(Borough::from_label("staten island"), Some(Borough::StatenIsland));
    }

    #[test]
    fn typed_frame_has_one_row_per_record() {
        let records = vec![
            record("2006-01-15", Borough::Bronx, 40.8, -73.8),
            record("2007-03-02", Borough::Queens, 40.7, -73.8),
        ];
        let df = IncidentTidier::to_dataframe(&records).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("year").unwrap().i32().unwrap().get(1), Some(2007));
    }
}
