//! Data module - source fetching, CSV loading, merging and metrics for the
//! country-level and US state-level datasets

mod handler;
mod loader;
mod metrics;
mod normalize;
mod processor;
mod reference;
mod source;
mod table;

pub use handler::{
    CovidDataHandler, RefreshError, RefreshReport, SourceReport, StateRefreshReport,
};
pub use loader::{column_specs, normalize_header, ColumnSpec, DataLoader, LoadError, SourceTable};
pub use metrics::{compute_series, growth_rate, mortality_rate, ratio, DailyCount, DerivedMetrics};
pub use normalize::{normalize_name, CountryNameNormalizer};
pub use processor::{
    DataProcessor, MergeSummary, MergedRecord, MergedStateRecord, StateMergeSummary,
};
pub use reference::{
    continent_exception, pad_fips, parse_date, CaseRecord, Continent, CountryCode,
    CountryCodeTable, RegionEntry, RegionTable, StateCode, StateCodeTable, StateRecord,
    BUILTIN_STATE_CODES,
};
pub use source::{
    FetchError, FetchedSource, Provenance, SourceFetcher, SourceKind, SourceLocation,
    DATE_PLACEHOLDER,
};
pub use table::{
    CountryTable, StateTable, TableError, COLUMNS, DATE_FORMAT, EXPORT_FILE_NAME, STATE_COLUMNS,
    STATE_EXPORT_FILE_NAME,
};
