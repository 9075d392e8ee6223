//! Data module - source loading and tidying

mod incident;
mod loader;
mod unemployment;

pub use incident::{Borough, IncidentRecord, IncidentTidier, TidyError};
pub use loader::{load_sources, RawSources, SourceLocation};
pub use unemployment::{MaxUnemploymentByYear, UnemploymentError, UnemploymentTidier};

#[cfg(test)]
pub(crate) use incident::tests::record as test_record;
#[cfg(test)]
pub(crate) use unemployment::tests::bls_line as test_bls_line;
#[cfg(test)]
pub(crate) use unemployment::UnemploymentRecord;
