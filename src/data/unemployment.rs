//! Unemployment Tidy Module
//! Slices the fixed-width BLS metro table and reduces it to one rate per year.

use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use super::loader::UNEMPLOYMENT_HEADER_LINES;

// Column layout of the BLS LAUS metro table (ssamatab1.txt). Offsets are in
// characters. They are a contract with the upstream file: if BLS changes a
// column width, retained lines fail `LineTooShort` or a numeric parse instead
// of being silently misread.
pub const LABEL_END: usize = 105;
pub const YEAR_START: usize = 105;
pub const YEAR_END: usize = 113;
pub const MONTH_START: usize = 113;
pub const MONTH_END: usize = 120;
/// Labor force, employment and unemployment counts sit between `MONTH_END`
/// and here; they are skipped.
pub const RATE_START: usize = 172;

/// Line numbers in errors count from the top of the file.
#[derive(Error, Debug)]
pub enum UnemploymentError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Line {line}: {len} characters, need at least {min} for the fixed-width layout")]
    LineTooShort { line: usize, len: usize, min: usize },
    #[error("Line {line}: invalid year {value:?}")]
    InvalidYear { line: usize, value: String },
    #[error("Line {line}: invalid unemployment rate {value:?}")]
    InvalidRate { line: usize, value: String },
}

/// One metro-area/month observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnemploymentRecord {
    pub area: String,
    pub year: i32,
    pub month: String,
    /// Percent, e.g. 9.8.
    pub rate: f64,
}

/// Highest monthly unemployment rate observed in each year.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MaxUnemploymentByYear(BTreeMap<i32, f64>);

impl MaxUnemploymentByYear {
    pub fn get(&self, year: i32) -> Option<f64> {
        self.0.get(&year).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ascending by year.
    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.0.iter().map(|(&year, &rate)| (year, rate))
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, UnemploymentError> {
        let (years, rates): (Vec<i32>, Vec<f64>) = self.iter().unzip();
        let df = DataFrame::new(vec![
            Column::new("year".into(), years),
            Column::new("max_rate".into(), rates),
        ])?;
        Ok(df)
    }
}

/// Parses and filters the unemployment table.
pub struct UnemploymentTidier;

impl UnemploymentTidier {
    /// Slice one retained line into its positional fields.
    pub fn parse_line(line_no: usize, line: &str) -> Result<UnemploymentRecord, UnemploymentError> {
        let len = line.chars().count();
        if len <= RATE_START {
            return Err(UnemploymentError::LineTooShort {
                line: line_no,
                len,
                min: RATE_START + 1,
            });
        }

        let area = slice_chars(line, 0, LABEL_END).trim().to_string();
        let year_text = slice_chars(line, YEAR_START, YEAR_END).trim();
        let month = slice_chars(line, MONTH_START, MONTH_END).trim().to_string();
        let rate_text = slice_chars(line, RATE_START, len).trim();

        let year = year_text
            .parse::<i32>()
            .map_err(|_| UnemploymentError::InvalidYear {
                line: line_no,
                value: year_text.to_string(),
            })?;
        let rate = rate_text
            .parse::<f64>()
            .map_err(|_| UnemploymentError::InvalidRate {
                line: line_no,
                value: rate_text.to_string(),
            })?;

        Ok(UnemploymentRecord {
            area,
            year,
            month,
            rate,
        })
    }

    /// Keep lines for `metro_area`, parse them, and keep years inside
    /// `first_year..=last_year`. Lines for other areas are never parsed.
    pub fn tidy(
        lines: &[String],
        metro_area: &str,
        (first_year, last_year): (i32, i32),
    ) -> Result<Vec<UnemploymentRecord>, UnemploymentError> {
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (idx, line) in lines.iter().enumerate() {
            if !line.contains(metro_area) {
                skipped += 1;
                continue;
            }
            let line_no = idx + UNEMPLOYMENT_HEADER_LINES + 1;
            let record = Self::parse_line(line_no, line)?;
            if (first_year..=last_year).contains(&record.year) {
                records.push(record);
            }
        }

        log::debug!("Skipped {skipped} unemployment lines outside {metro_area}");
        log::info!(
            "Kept {} unemployment rows for {metro_area}, {first_year}-{last_year}",
            records.len()
        );
        Ok(records)
    }

    /// Maximum rate per year. Years without rows are absent, not zero.
    pub fn max_by_year(records: &[UnemploymentRecord]) -> MaxUnemploymentByYear {
        let mut by_year: BTreeMap<i32, f64> = BTreeMap::new();
        for record in records {
            by_year
                .entry(record.year)
                .and_modify(|max| *max = max.max(record.rate))
                .or_insert(record.rate);
        }
        MaxUnemploymentByYear(by_year)
    }
}

fn slice_chars(line: &str, start: usize, end: usize) -> &str {
    let byte_at = |n: usize| {
        line.char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(line.len())
    };
    &line[byte_at(start)..byte_at(end)]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const NYC: &str = "New York-Newark-Jersey City, NY-NJ-PA Metropolitan Statistical Area";

    pub(crate) fn bls_line(area: &str, year: i32, month: &str, rate: &str) -> String {
        let label = format!("MT3635620000000     36     35620     {area}");
        format!(
            "{label:<105}{year:<8}{month:<7}{:<52}{rate:>5}",
            "   9,876,543   9,000,000     876,543"
        )
    }

    #[test]
    fn slices_fixed_width_fields() {
        let line = bls_line(NYC, 2009, "Mar", "9.1");
        let record = UnemploymentTidier::parse_line(6, &line).unwrap();
        assert_eq!(record.year, 2009);
        assert_eq!(record.month, "Mar");
        assert!((record.rate - 9.1).abs() < 1e-12);
        assert!(record.area.contains("New York-Newark-Jersey City"));
    }

    #[test]
    fn max_per_year_is_the_largest_rate() {
        let lines: Vec<String> = ["9.1", "9.8", "9.3"]
            .iter()
            .zip(["Jan", "Feb", "Mar"])
            .map(|(rate, month)| bls_line(NYC, 2009, month, rate))
            .collect();
        let records = UnemploymentTidier::tidy(&lines, "New York-Newark-Jersey City", (2006, 2020))
            .unwrap();
        let max = UnemploymentTidier::max_by_year(&records);

        assert_eq!(max.len(), 1);
        assert!((max.get(2009).unwrap() - 9.8).abs() < 1e-12);
        for record in &records {
            assert!(max.get(record.year).unwrap() >= record.rate);
        }
        assert!(records.iter().any(|r| r.rate == max.get(2009).unwrap()));
    }

    #[test]
    fn max_compares_numerically() {
        let lines = vec![
            bls_line(NYC, 2010, "Jan", "9.8"),
            bls_line(NYC, 2010, "Feb", "10.1"),
        ];
        let records = UnemploymentTidier::tidy(&lines, "New York-Newark-Jersey City", (2006, 2020))
            .unwrap();
        let max = UnemploymentTidier::max_by_year(&records);
        assert!((max.get(2010).unwrap() - 10.1).abs() < 1e-12);
    }

    #[test]
    fn filters_area_and_year_window() {
        let lines = vec![
            bls_line(NYC, 2005, "Dec", "5.0"),
            bls_line(NYC, 2006, "Jan", "5.1"),
            bls_line("Albany-Schenectady-Troy, NY", 2007, "Jan", "4.0"),
            bls_line(NYC, 2020, "Dec", "11.4"),
            bls_line(NYC, 2021, "Jan", "11.0"),
        ];
        let records = UnemploymentTidier::tidy(&lines, "New York-Newark-Jersey City", (2006, 2020))
            .unwrap();
        let years: Vec<i32> = records.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2006, 2020]);

        let max = UnemploymentTidier::max_by_year(&records);
        assert_eq!(max.get(2007), None);
        let ordered: Vec<i32> = max.iter().map(|(y, _)| y).collect();
        assert_eq!(ordered, vec![2006, 2020]);
    }

    #[test]
    fn short_matching_line_fails_loudly() {
        let lines = vec![format!("{NYC}   2009  Mar  9.1")];
        assert!(matches!(
            UnemploymentTidier::tidy(&lines, "New York-Newark-Jersey City", (2006, 2020)),
            Err(UnemploymentError::LineTooShort { line: 6, .. })
        ));
    }

    #[test]
    fn short_non_matching_line_is_ignored() {
        let lines = vec!["footnote: (p) preliminary".to_string()];
        let records = UnemploymentTidier::tidy(&lines, "New York-Newark-Jersey City", (2006, 2020))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn invalid_year_fails() {
        let line = bls_line(NYC, 2009, "Mar", "9.1").replacen("2009", "20x9", 1);
        assert!(matches!(
            UnemploymentTidier::parse_line(7, &line),
            Err(UnemploymentError::InvalidYear { line: 7, .. })
        ));
    }

    #[test]
    fn invalid_rate_fails() {
        let line = bls_line(NYC, 2009, "Mar", "n/a");
        assert!(matches!(
            UnemploymentTidier::parse_line(8, &line),
            Err(UnemploymentError::InvalidRate { line: 8, .. })
        ));
    }

    #[test]
    fn max_frame_is_sorted_by_year() {
        let records = vec![
            UnemploymentRecord {
                area: NYC.to_string(),
                year: 2012,
                month: "Jan".to_string(),
                rate: 9.9,
            },
            UnemploymentRecord {
                area: NYC.to_string(),
                year: 2008,
                month: "Jan".to_string(),
                rate: 5.2,
            },
        ];
        let df = UnemploymentTidier::max_by_year(&records).to_dataframe().unwrap();
        let years = df.column("year").unwrap().i32().unwrap();
        assert_eq!(years.get(0), Some(2008));
        assert_eq!(years.get(1), Some(2012));
    }
}
