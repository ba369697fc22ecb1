//! Country Table Module
//! The merged country-level and US state-level datasets as Polars
//! DataFrames, plus CSV export.

use crate::data::processor::{DataProcessor, MergedRecord, MergedStateRecord};
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// File name used when the merged table is exported.
pub const EXPORT_FILE_NAME: &str = "covid19_ecdc_country_data.csv";

/// File name used when the merged state table is exported.
pub const STATE_EXPORT_FILE_NAME: &str = "covid19_nyt_usa_state_data.csv";

/// Date format of the `date_rep` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Column order of the merged table.
pub const COLUMNS: [&str; 18] = [
    "date_rep",
    "country",
    "alpha_2_code",
    "alpha_3_code",
    "continent",
    "region_1",
    "region_2",
    "population",
    "cases",
    "deaths",
    "cum_cases",
    "cum_deaths",
    "mortality_rate",
    "fraction_infected",
    "fraction_deaths",
    "infections_growth_rate",
    "deaths_growth_rate",
    "iso_matched",
];

/// Column order of the merged state table.
pub const STATE_COLUMNS: [&str; 11] = [
    "date",
    "state",
    "fips",
    "alpha_code",
    "cases",
    "deaths",
    "cum_cases",
    "cum_deaths",
    "mortality_rate",
    "infections_growth_rate",
    "deaths_growth_rate",
];

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

/// Merged country-level data for one refresh.
#[derive(Debug, Clone)]
pub struct CountryTable {
    df: DataFrame,
    as_at: NaiveDate,
    latest_date: Option<NaiveDate>,
    countries: usize,
    unmatched: Vec<String>,
}

impl CountryTable {
    /// Materialize merged rows as a DataFrame.
    pub fn from_records(
        records: &[MergedRecord],
        as_at: NaiveDate,
        unmatched: Vec<String>,
    ) -> Result<Self, TableError> {
        let df = DataFrame::new(vec![
            Column::new(
                "date_rep".into(),
                records
                    .iter()
                    .map(|r| r.date.format(DATE_FORMAT).to_string())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "country".into(),
                records.iter().map(|r| r.country.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "alpha_2_code".into(),
                records.iter().map(|r| r.alpha_2_code.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "alpha_3_code".into(),
                records.iter().map(|r| r.alpha_3_code.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "continent".into(),
                records.iter().map(|r| r.continent.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "region_1".into(),
                records.iter().map(|r| r.region_1.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "region_2".into(),
                records.iter().map(|r| r.region_2.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "population".into(),
                records.iter().map(|r| r.population).collect::<Vec<_>>(),
            ),
            Column::new(
                "cases".into(),
                records.iter().map(|r| r.cases).collect::<Vec<_>>(),
            ),
            Column::new(
                "deaths".into(),
                records.iter().map(|r| r.deaths).collect::<Vec<_>>(),
            ),
            Column::new(
                "cum_cases".into(),
                records.iter().map(|r| r.metrics.cum_cases).collect::<Vec<_>>(),
            ),
            Column::new(
                "cum_deaths".into(),
                records.iter().map(|r| r.metrics.cum_deaths).collect::<Vec<_>>(),
            ),
            Column::new(
                "mortality_rate".into(),
                records.iter().map(|r| r.metrics.mortality_rate).collect::<Vec<_>>(),
            ),
            Column::new(
                "fraction_infected".into(),
                records.iter().map(|r| r.metrics.fraction_infected).collect::<Vec<_>>(),
            ),
            Column::new(
                "fraction_deaths".into(),
                records.iter().map(|r| r.metrics.fraction_deaths).collect::<Vec<_>>(),
            ),
            Column::new(
                "infections_growth_rate".into(),
                records
                    .iter()
                    .map(|r| r.metrics.infections_growth_rate)
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "deaths_growth_rate".into(),
                records
                    .iter()
                    .map(|r| r.metrics.deaths_growth_rate)
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "iso_matched".into(),
                records.iter().map(|r| r.iso_matched).collect::<Vec<_>>(),
            ),
        ])?;

        Ok(Self {
            df,
            as_at,
            latest_date: records.iter().map(|r| r.date).max(),
            countries: DataProcessor::get_countries(records).len(),
            unmatched,
        })
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    /// Date the refresh targeted.
    pub fn as_at(&self) -> NaiveDate {
        self.as_at
    }

    /// Most recent date present in the data.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.latest_date
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn country_count(&self) -> usize {
        self.countries
    }

    /// Countries kept without an ISO match.
    pub fn unmatched(&self) -> &[String] {
        &self.unmatched
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), TableError> {
        write_frame(&self.df, writer)
    }

    /// Write the table to `path`, creating parent directories.
    pub fn write_csv_file(&self, path: &Path) -> Result<(), TableError> {
        write_frame_file(&self.df, path)?;
        info!(path = %path.display(), rows = self.height(), "country table exported");
        Ok(())
    }
}

/// Merged US state-level data for one refresh.
#[derive(Debug, Clone)]
pub struct StateTable {
    df: DataFrame,
    as_at: NaiveDate,
    latest_date: Option<NaiveDate>,
}

impl StateTable {
    pub fn from_records(records: &[MergedStateRecord], as_at: NaiveDate) -> Result<Self, TableError> {
        let df = DataFrame::new(vec![
            Column::new(
                "date".into(),
                records
                    .iter()
                    .map(|r| r.date.format(DATE_FORMAT).to_string())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "state".into(),
                records.iter().map(|r| r.state.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "fips".into(),
                records.iter().map(|r| r.fips.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "alpha_code".into(),
                records.iter().map(|r| r.alpha_code.clone()).collect::<Vec<_>>(),
            ),
            Column::new("cases".into(), records.iter().map(|r| r.cases).collect::<Vec<_>>()),
            Column::new("deaths".into(), records.iter().map(|r| r.deaths).collect::<Vec<_>>()),
            Column::new(
                "cum_cases".into(),
                records.iter().map(|r| r.metrics.cum_cases).collect::<Vec<_>>(),
            ),
            Column::new(
                "cum_deaths".into(),
                records.iter().map(|r| r.metrics.cum_deaths).collect::<Vec<_>>(),
            ),
            Column::new(
                "mortality_rate".into(),
                records.iter().map(|r| r.metrics.mortality_rate).collect::<Vec<_>>(),
            ),
            Column::new(
                "infections_growth_rate".into(),
                records
                    .iter()
                    .map(|r| r.metrics.infections_growth_rate)
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "deaths_growth_rate".into(),
                records
                    .iter()
                    .map(|r| r.metrics.deaths_growth_rate)
                    .collect::<Vec<_>>(),
            ),
        ])?;

        Ok(Self {
            df,
            as_at,
            latest_date: records.iter().map(|r| r.date).max(),
        })
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn as_at(&self) -> NaiveDate {
        self.as_at
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.latest_date
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), TableError> {
        write_frame(&self.df, writer)
    }

    pub fn write_csv_file(&self, path: &Path) -> Result<(), TableError> {
        write_frame_file(&self.df, path)?;
        info!(path = %path.display(), rows = self.height(), "state table exported");
        Ok(())
    }
}

fn write_frame<W: Write>(df: &DataFrame, writer: W) -> Result<(), TableError> {
    let mut df = df.clone();
    CsvWriter::new(writer).include_header(true).finish(&mut df)?;
    Ok(())
}

fn write_frame_file(df: &DataFrame, path: &Path) -> Result<(), TableError> {
    let io_err = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = File::create(path).map_err(io_err)?;
    write_frame(df, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::metrics::DerivedMetrics;

    fn row(day: u32, country: &str, cases: i64, cum_cases: i64) -> MergedRecord {
        MergedRecord {
            date: NaiveDate::from_ymd_opt(2020, 3, day).unwrap(),
            country: country.to_string(),
            alpha_2_code: Some("IT".to_string()),
            alpha_3_code: Some("ITA".to_string()),
            continent: Some("Europe".to_string()),
            region_1: None,
            region_2: None,
            population: Some(1000.0),
            cases,
            deaths: 0,
            metrics: DerivedMetrics {
                cum_cases,
                mortality_rate: Some(0.0),
                ..Default::default()
            },
            iso_matched: true,
        }
    }

    fn sample() -> CountryTable {
        let as_at = NaiveDate::from_ymd_opt(2020, 3, 10).unwrap();
        CountryTable::from_records(
            &[row(1, "Italy", 3, 3), row(2, "Italy", 2, 5)],
            as_at,
            vec!["Atlantis".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn builds_frame_with_fixed_columns() {
        let table = sample();
        let names: Vec<String> = table
            .dataframe()
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(names, COLUMNS.to_vec());
        assert_eq!(table.height(), 2);
        assert_eq!(table.country_count(), 1);
        assert_eq!(table.latest_date(), NaiveDate::from_ymd_opt(2020, 3, 2));
        assert_eq!(table.unmatched(), &["Atlantis".to_string()]);

        let cum = table.dataframe().column("cum_cases").unwrap().i64().unwrap();
        assert_eq!(cum.into_iter().collect::<Vec<_>>(), vec![Some(3), Some(5)]);
        let growth = table.dataframe().column("infections_growth_rate").unwrap();
        assert_eq!(growth.null_count(), 2);
    }

    #[test]
    fn exports_csv_with_header() {
        let table = sample();
        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next(), Some(COLUMNS.join(",").as_str()));
        assert!(lines.next().unwrap().starts_with("2020-03-01,Italy,IT,ITA,Europe"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn exports_to_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(EXPORT_FILE_NAME);
        sample().write_csv_file(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("cum_cases"));
    }

    #[test]
    fn state_table_keeps_padded_fips_as_text() {
        let record = MergedStateRecord {
            date: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
            state: "Alabama".to_string(),
            fips: "01".to_string(),
            alpha_code: Some("AL".to_string()),
            cases: 2,
            deaths: 0,
            metrics: DerivedMetrics {
                cum_cases: 2,
                ..Default::default()
            },
        };
        let table =
            StateTable::from_records(&[record], NaiveDate::from_ymd_opt(2020, 3, 2).unwrap()).unwrap();

        let names: Vec<String> = table
            .dataframe()
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, STATE_COLUMNS.to_vec());

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().nth(1), Some("2020-03-01,Alabama,01,AL,2,0,2,0,,,"));
    }
}
