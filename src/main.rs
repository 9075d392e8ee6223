//! Shooting Trends - NYC shooting incident analysis report
//!
//! Loads the NYPD shooting incident export and the BLS metro unemployment
//! table, builds borough/year and monthly aggregates, fits a seasonal spline
//! and writes tables, JSON and charts.

mod charts;
mod config;
mod data;
mod report;
mod stats;

use anyhow::{Context, Result};
use clap::Parser;
use config::ReportConfig;
use data::SourceLocation;
use report::Report;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shooting_trends", version, about)]
struct Cli {
    /// JSON config file; fields left out keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Incident CSV, as a URL or a file path.
    #[arg(long)]
    incidents: Option<String>,

    /// Unemployment fixed-width table, as a URL or a file path.
    #[arg(long)]
    unemployment: Option<String>,

    /// Directory for tables, JSON and charts.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Skip PNG chart rendering.
    #[arg(long)]
    no_charts: bool,
}

impl Cli {
    fn into_config(self) -> Result<ReportConfig> {
        let mut config = match &self.config {
            Some(path) => ReportConfig::from_file(path)?,
            None => ReportConfig::default(),
        };
        if let Some(raw) = self.incidents {
            config.incident_source = SourceLocation::parse(&raw);
        }
        if let Some(raw) = self.unemployment {
            config.unemployment_source = SourceLocation::parse(&raw);
        }
        if let Some(dir) = self.output {
            config.output_dir = dir;
        }
        if self.no_charts {
            config.render_charts = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config()?;

    let raw = data::load_sources(&config.incident_source, &config.unemployment_source)
        .context("loading sources")?;
    let report = Report::build(&raw, &config).context("building report")?;

    report.print_summary()?;
    report
        .export(&config.output_dir)
        .with_context(|| format!("exporting to {}", config.output_dir.display()))?;
    if config.render_charts {
        report
            .render_charts(&config.output_dir)
            .context("rendering charts")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::write_config;

    const FILE_CONFIG: &str = r#"{ "incident_source": "file/incidents.csv",
        "unemployment_source": "file/ssamatab1.txt", "output_dir": "file_out",
        "render_charts": true, "training_end_year": 2010 }"#;

    #[test]
    fn defaults_without_flags() {
        let config = Cli::try_parse_from(["shooting_trends"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("report"));
        assert!(config.render_charts);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let path = write_config("shooting_trends_cli_file", "report.json", FILE_CONFIG);
        let config = Cli::try_parse_from(["shooting_trends", "--config", path.to_str().unwrap()])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(
            config.incident_source,
            SourceLocation::Path(PathBuf::from("file/incidents.csv"))
        );
        assert_eq!(config.output_dir, PathBuf::from("file_out"));
        assert_eq!(config.training_end_year, 2010);
    }

    #[test]
    fn flags_override_config_file() {
        let path = write_config("shooting_trends_cli_flags", "report.json", FILE_CONFIG);
        let config = Cli::try_parse_from([
            "shooting_trends",
            "--config",
            path.to_str().unwrap(),
            "--incidents",
            "https://example.org/incidents.csv",
            "--output",
            "cli_out",
            "--no-charts",
        ])
        .unwrap()
        .into_config()
        .unwrap();

        assert_eq!(
            config.incident_source,
            SourceLocation::Url("https://example.org/incidents.csv".to_string())
        );
        assert_eq!(config.output_dir, PathBuf::from("cli_out"));
        assert!(!config.render_charts);
        // Not given on the command line, so the file's values stand.
        assert_eq!(
            config.unemployment_source,
            SourceLocation::Path(PathBuf::from("file/ssamatab1.txt"))
        );
        assert_eq!(config.training_end_year, 2010);
    }

    #[test]
    fn unreadable_config_fails() {
        let missing = std::env::temp_dir()
            .join("shooting_trends_cli_missing")
            .join("absent.json");
        let cli = Cli::try_parse_from(["shooting_trends", "--config", missing.to_str().unwrap()])
            .unwrap();
        assert!(cli.into_config().is_err());
    }
}
