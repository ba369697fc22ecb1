//! CSV Data Loader Module
//! Parses source CSVs with Polars and maps their headers onto the fixed
//! column sets each source kind must provide.

use crate::data::source::SourceKind;
use polars::prelude::*;
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to parse {kind} CSV: {error}")]
    Csv {
        kind: SourceKind,
        #[source]
        error: PolarsError,
    },
    #[error("{kind} is missing required columns {missing:?} (found {found:?})")]
    MissingColumns {
        kind: SourceKind,
        missing: Vec<String>,
        found: Vec<String>,
    },
    #[error("{kind} contains no data rows")]
    Empty { kind: SourceKind },
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

/// A canonical column and the header spellings accepted for it.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

const fn required(name: &'static str, aliases: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        name,
        aliases,
        required: true,
    }
}

const fn optional(name: &'static str, aliases: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        name,
        aliases,
        required: false,
    }
}

const WORLD_CASES_COLUMNS: &[ColumnSpec] = &[
    required("date_rep", &["daterep", "date"]),
    required("cases", &["new_cases"]),
    required("deaths", &["new_deaths"]),
    required(
        "country",
        &["countriesandterritories", "countries_and_territories", "location"],
    ),
    optional("alpha_2_code", &["geoid", "geo_id"]),
    optional(
        "alpha_3_code",
        &["countryterritorycode", "country_territory_code", "iso_code"],
    ),
    optional(
        "population",
        &["population_2018", "popdata2018", "popdata2019", "popdata2020"],
    ),
    optional("continent", &["continentexp", "ecdc_continent"]),
];

const COUNTRY_CODE_COLUMNS: &[ColumnSpec] = &[
    required("country_name", &["country", "name", "english_short_name"]),
    required("alpha_2_code", &["alpha_2", "alpha2"]),
    required("alpha_3_code", &["alpha_3", "alpha3"]),
    optional("population", &[]),
];

const REGION_COLUMNS: &[ColumnSpec] = &[
    required("country", &["country_or_area", "country_name", "name"]),
    required("continent", &["region"]),
    optional("iso_alpha3_code", &["alpha_3_code", "alpha_3", "iso_alpha3"]),
    optional("region_1", &["sub_region"]),
    optional("region_2", &["intermediate_region"]),
];

// counts are cumulative in this source
const USA_STATE_COLUMNS: &[ColumnSpec] = &[
    required("date", &["date_rep"]),
    required("state", &["state_name"]),
    required("fips", &["state_fips"]),
    required("cum_cases", &["cases"]),
    required("cum_deaths", &["deaths"]),
];

const STATE_CODE_COLUMNS: &[ColumnSpec] = &[
    required("name", &["state", "state_name"]),
    required("alpha_code", &["postal_code", "postal", "abbreviation"]),
    required("fips", &["fips_code", "state_fips"]),
];

/// Canonical column set for a source kind.
pub fn column_specs(kind: SourceKind) -> &'static [ColumnSpec] {
    match kind {
        SourceKind::WorldCases => WORLD_CASES_COLUMNS,
        SourceKind::CountryCodes => COUNTRY_CODE_COLUMNS,
        SourceKind::Regions => REGION_COLUMNS,
        SourceKind::UsaStates => USA_STATE_COLUMNS,
        SourceKind::StateCodes => STATE_CODE_COLUMNS,
    }
}

/// Normalize a raw CSV header: drop footnote markers (`Country name[5]`),
/// trim, lower-case, and turn spaces and hyphens into underscores.
pub fn normalize_header(raw: &str) -> String {
    let base = raw.trim_start_matches('\u{feff}');
    let base = base.split('[').next().unwrap_or(base);
    base.trim()
        .trim_matches('"')
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// A parsed source with its headers resolved to canonical names.
#[derive(Debug, Clone)]
pub struct SourceTable {
    kind: SourceKind,
    df: DataFrame,
    columns: HashMap<&'static str, String>,
}

impl SourceTable {
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn has_column(&self, canonical: &str) -> bool {
        self.columns.contains_key(canonical)
    }

    /// Trimmed string values of a canonical column. Empty cells are `None`;
    /// an absent optional column yields all `None`.
    pub fn strings(&self, canonical: &str) -> Result<Vec<Option<String>>, LoadError> {
        let Some(actual) = self.columns.get(canonical) else {
            return Ok(vec![None; self.df.height()]);
        };

        let as_str = self.df.column(actual)?.cast(&DataType::String)?;
        let ca = as_str.str()?;
        Ok(ca
            .into_iter()
            .map(|v| {
                v.map(|s| s.trim().trim_matches('"').trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .collect())
    }

    /// Numeric values of a canonical column; unparseable cells are `None`.
    pub fn floats(&self, canonical: &str) -> Result<Vec<Option<f64>>, LoadError> {
        let Some(actual) = self.columns.get(canonical) else {
            return Ok(vec![None; self.df.height()]);
        };

        let column = self.df.column(actual)?;
        let values = if column.dtype() == &DataType::String {
            // thousands separators ("1,234") keep Polars from inferring a number
            column
                .str()?
                .into_iter()
                .map(|v| v.and_then(|s| s.trim().replace(',', "").parse::<f64>().ok()))
                .collect()
        } else {
            let as_f64 = column.cast(&DataType::Float64)?;
            as_f64.f64()?.into_iter().collect()
        };
        Ok(values)
    }
}

/// Handles CSV parsing and header validation with Polars.
pub struct DataLoader;

impl DataLoader {
    /// Parse CSV bytes and validate them against the kind's column set.
    pub fn load_bytes(kind: SourceKind, bytes: Vec<u8>) -> Result<SourceTable, LoadError> {
        let options = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(10000))
            .with_ignore_errors(true);

        let df = options
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .map_err(|error| LoadError::Csv { kind, error })?;

        Self::from_dataframe(kind, df)
    }

    /// Resolve the headers of an already parsed frame.
    pub fn from_dataframe(kind: SourceKind, df: DataFrame) -> Result<SourceTable, LoadError> {
        let found: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut columns = HashMap::new();
        let mut missing = Vec::new();

        for spec in column_specs(kind) {
            // first header matching the canonical name or one of its aliases
            let actual = found.iter().find(|header| {
                let normalized = normalize_header(header);
                normalized == spec.name || spec.aliases.contains(&normalized.as_str())
            });

            match actual {
                Some(actual) => {
                    columns.insert(spec.name, actual.clone());
                }
                None if spec.required => missing.push(spec.name.to_string()),
                None => debug!(source = %kind, column = spec.name, "optional column absent"),
            }
        }

        if !missing.is_empty() {
            return Err(LoadError::MissingColumns {
                kind,
                missing,
                found,
            });
        }

        if df.height() == 0 {
            return Err(LoadError::Empty { kind });
        }

        debug!(source = %kind, rows = df.height(), columns = ?columns, "source loaded");

        Ok(SourceTable { kind, df, columns })
    }

    /// Get list of column names from a parsed source.
    pub fn get_columns(table: &SourceTable) -> Vec<String> {
        table
            .df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}
