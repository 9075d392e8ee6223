//! Raw Source Loader Module
//! Fetches the incident export and the unemployment table as raw text.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use thiserror::Error;

/// Lines at the top of the unemployment table before the first data row.
pub const UNEMPLOYMENT_HEADER_LINES: usize = 5;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Source unavailable ({location}): {reason}")]
    SourceUnavailable { location: String, reason: String },
    #[error("Failed to parse CSV: {0}")]
    CsvError(#[from] PolarsError),
}

/// Where a raw dataset lives: a remote HTTP(S) endpoint or a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceLocation {
    Url(String),
    Path(PathBuf),
}

impl SourceLocation {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            SourceLocation::Url(raw.to_string())
        } else {
            SourceLocation::Path(PathBuf::from(raw))
        }
    }
}

impl From<String> for SourceLocation {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<SourceLocation> for String {
    fn from(location: SourceLocation) -> Self {
        location.to_string()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Url(url) => f.write_str(url),
            SourceLocation::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Both raw datasets, untyped.
pub struct RawSources {
    /// Incident export with every column read as text.
    pub incidents: DataFrame,
    /// Unemployment table lines with the header block removed.
    pub unemployment_lines: Vec<String>,
}

/// Read the whole source into memory. No retries: a failure aborts the run.
pub fn fetch_bytes(location: &SourceLocation) -> Result<Vec<u8>, LoaderError> {
    let unavailable = |reason: String| LoaderError::SourceUnavailable {
        location: location.to_string(),
        reason,
    };

    match location {
        SourceLocation::Path(path) => fs::read(path).map_err(|e| unavailable(e.to_string())),
        SourceLocation::Url(url) => {
            let response = reqwest::blocking::get(url)
                .and_then(|r| r.error_for_status())
                .map_err(|e| unavailable(e.to_string()))?;
            let body = response.bytes().map_err(|e| unavailable(e.to_string()))?;
            Ok(body.to_vec())
        }
    }
}

/// Parse delimited incident text into a DataFrame, keeping every field as a
/// string so that typing happens in one place (the tidy step).
pub fn read_incident_csv(bytes: Vec<u8>) -> Result<DataFrame, LoaderError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

/// Split the unemployment table into lines, dropping the header block.
pub fn read_fixed_width_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .skip(UNEMPLOYMENT_HEADER_LINES)
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

/// Fetch and parse both sources. They are independent, so they load
/// concurrently.
pub fn load_sources(
    incident_source: &SourceLocation,
    unemployment_source: &SourceLocation,
) -> Result<RawSources, LoaderError> {
    let (incidents, unemployment) = rayon::join(
        || fetch_bytes(incident_source).and_then(read_incident_csv),
        || fetch_bytes(unemployment_source).map(|bytes| read_fixed_width_lines(&bytes)),
    );
    let incidents = incidents?;
    let unemployment_lines = unemployment?;

    log::info!(
        "Loaded {} incident rows from {incident_source}",
        incidents.height()
    );
    log::info!(
        "Loaded {} unemployment lines from {unemployment_source}",
        unemployment_lines.len()
    );

    Ok(RawSources {
        incidents,
        unemployment_lines,
    })
}
