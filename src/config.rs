//! Report Configuration Module
//! Source locations, population table and year windows for a report run.

use crate::data::{Borough, SourceLocation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// NYPD Shooting Incident Data (Historic), CSV export.
pub const DEFAULT_INCIDENT_SOURCE: &str =
    "https://data.cityofnewyork.us/api/views/833y-fsy8/rows.csv?accessType=DOWNLOAD";

/// BLS LAUS metropolitan area table (fixed-width text).
pub const DEFAULT_UNEMPLOYMENT_SOURCE: &str = "https://www.bls.gov/web/metro/ssamatab1.txt";

pub const DEFAULT_METRO_AREA: &str = "New York-Newark-Jersey City";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Population for {0} must be positive")]
    NonPositivePopulation(Borough),
    #[error("Year window {first}..={last} is empty")]
    EmptyYearWindow { first: i32, last: i32 },
}

/// Borough population figures used to turn raw counts into rates.
///
/// The defaults are the 2010 census snapshot. Applying one year's figure to
/// every year assumes flat population, which biases rates for boroughs that
/// grew or shrank over the period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PopulationTable(BTreeMap<Borough, u64>);

impl Default for PopulationTable {
    fn default() -> Self {
        Self::census_2010()
    }
}

impl PopulationTable {
    pub fn census_2010() -> Self {
        Self(BTreeMap::from([
            (Borough::Bronx, 1_385_108),
            (Borough::Brooklyn, 2_504_700),
            (Borough::Manhattan, 1_585_873),
            (Borough::Queens, 2_230_722),
            (Borough::StatenIsland, 468_730),
        ]))
    }

    pub fn get(&self, borough: Borough) -> Option<u64> {
        self.0.get(&borough).copied()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.0.iter().find(|(_, &pop)| pop == 0) {
            Some((&borough, _)) => Err(ConfigError::NonPositivePopulation(borough)),
            None => Ok(()),
        }
    }
}

/// Settings for a single report run. Every field has a default, so `{}` is a
/// valid config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub incident_source: SourceLocation,
    pub unemployment_source: SourceLocation,
    pub output_dir: PathBuf,
    pub populations: PopulationTable,
    pub metro_area: String,
    /// Inclusive range of unemployment years kept.
    pub unemployment_years: (i32, i32),
    /// Incidents from this year on feed the density view.
    pub geo_min_year: i32,
    /// Months strictly before this year form the seasonal training window.
    pub training_end_year: i32,
    pub render_charts: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            incident_source: SourceLocation::parse(DEFAULT_INCIDENT_SOURCE),
            unemployment_source: SourceLocation::parse(DEFAULT_UNEMPLOYMENT_SOURCE),
            output_dir: PathBuf::from("report"),
            populations: PopulationTable::default(),
            metro_area: DEFAULT_METRO_AREA.to_string(),
            unemployment_years: (2006, 2020),
            geo_min_year: 2020,
            training_end_year: 2008,
            render_charts: true,
        }
    }
}

impl ReportConfig {
    /// Load a JSON config file; missing fields fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.populations.validate()?;
        let (first, last) = self.unemployment_years;
        if first > last {
            return Err(ConfigError::EmptyYearWindow { first, last });
        }
        Ok(())
    }
}
