//! Stats module - aggregation, correlation and the seasonal spline

pub mod aggregate;
mod calculator;
mod spline;

pub use aggregate::{
    month_frame, AggregateError, Aggregator, BoroughYearMatrix, GeoDensity, JoinedTable,
    MonthCount,
};
pub use calculator::{BoroughCorrelation, StatsCalculator};
pub use spline::{numeric_key, ModelError, SeasonalFit, SeasonalModel};
