//! Configuration Module
//! Dashboard settings loaded from a TOML file. Every field has a default so an
//! empty file (or no file at all) is a valid configuration.

use crate::charts::ChartRequest;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Daily worldwide case distribution published by the ECDC.
pub const DEFAULT_WORLD_CASES_URL: &str =
    "https://opendata.ecdc.europa.eu/covid19/casedistribution/csv";

/// ISO 3166 codes with UN M49 regions, used for both reference tables.
pub const DEFAULT_REFERENCE_URL: &str =
    "https://raw.githubusercontent.com/lukes/ISO-3166-Countries-with-Regional-Codes/master/all/all.csv";

/// Cumulative US state-level counts published by the New York Times.
pub const DEFAULT_USA_STATES_URL: &str =
    "https://raw.githubusercontent.com/nytimes/covid-19-data/master/us-states.csv";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level dashboard configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    /// Directory holding dated copies of downloaded sources.
    pub cache_dir: PathBuf,
    /// Fixed as-at date. `None` means "today" at every refresh.
    pub as_at_date: Option<NaiveDate>,
    pub sources: SourcesConfig,
    pub fetch: FetchConfig,
    pub refresh: RefreshConfig,
    /// Extra country name aliases, `variant = canonical`.
    pub aliases: BTreeMap<String, String>,
    /// Charts written by the polling loop after each refresh.
    pub charts: Vec<ChartRequest>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data"),
            as_at_date: None,
            sources: SourcesConfig::default(),
            fetch: FetchConfig::default(),
            refresh: RefreshConfig::default(),
            aliases: BTreeMap::new(),
            charts: vec![ChartRequest::default()],
        }
    }
}

/// Locations of the input tables. Each is an `http(s)://` URL or a local
/// path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    /// May contain a `{date}` placeholder (formatted `%Y-%m-%d`).
    pub world_cases: String,
    pub country_codes: String,
    pub regions: String,
    /// US state-level counts, for example [`DEFAULT_USA_STATES_URL`].
    /// `None` skips the state dataset.
    pub usa_states: Option<String>,
    /// US state names, postal codes and FIPS codes. `None` uses the table
    /// compiled into the crate.
    pub state_codes: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            world_cases: DEFAULT_WORLD_CASES_URL.to_string(),
            country_codes: DEFAULT_REFERENCE_URL.to_string(),
            regions: DEFAULT_REFERENCE_URL.to_string(),
            usa_states: None,
            state_codes: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Number of dates tried for a `{date}` URL before giving up.
    pub max_consecutive_dates: u32,
    /// Walk to earlier dates (true) or later dates (false).
    pub walk_back: bool,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_consecutive_dates: 5,
            walk_back: true,
            timeout_secs: 30,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    pub output_dir: PathBuf,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl DashboardConfig {
    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.max_consecutive_dates == 0 {
            return Err(ConfigError::Invalid(
                "fetch.max_consecutive_dates must be at least 1".to_string(),
            ));
        }
        if self.refresh.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh.interval_secs must be at least 1".to_string(),
            ));
        }
        let optional = [
            ("usa_states", self.sources.usa_states.as_ref()),
            ("state_codes", self.sources.state_codes.as_ref()),
        ];
        for (name, location) in [
            ("world_cases", Some(&self.sources.world_cases)),
            ("country_codes", Some(&self.sources.country_codes)),
            ("regions", Some(&self.sources.regions)),
        ]
        .into_iter()
        .chain(optional)
        .filter_map(|(name, location)| location.map(|l| (name, l)))
        {
            if location.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("sources.{name} is empty")));
            }
        }
        for request in &self.charts {
            request
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("chart {}: {}", request.kind, e)))?;
        }
        Ok(())
    }

    /// The as-at date for a refresh happening now.
    pub fn effective_as_at_date(&self) -> NaiveDate {
        self.as_at_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::{ChartKind, Metric, Scope};
    use crate::data::{Continent, SourceKind, SourceLocation};

    #[test]
    fn empty_file_gives_defaults() {
        let config: DashboardConfig = toml::from_str("").unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("data"));
        assert_eq!(config.sources.world_cases, DEFAULT_WORLD_CASES_URL);
        assert_eq!(config.sources.regions, DEFAULT_REFERENCE_URL);
        assert!(config.sources.usa_states.is_none());
        assert!(config.sources.state_codes.is_none());
        assert_eq!(config.fetch.max_consecutive_dates, 5);
        assert!(config.fetch.walk_back);
        assert_eq!(config.refresh.interval(), Duration::from_secs(86_400));
        assert_eq!(config.charts.len(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn parses_full_config() {
        let text = r#"
            cache_dir = "/tmp/covid"
            as_at_date = "2020-04-20"

            [sources]
            world_cases = "https://example.org/cases-{date}.csv"
            country_codes = "ref/iso.csv"
            regions = "ref/regions.csv"

            [fetch]
            max_consecutive_dates = 3
            walk_back = false

            [refresh]
            interval_secs = 3600
            output_dir = "out"

            [aliases]
            "Bolivia" = "Bolivia (Plurinational State of)"

            [[charts]]
            kind = "bar"
            scope = "europe"
            metric = "cum_deaths"
            top_n = 10
        "#;
        let config: DashboardConfig = toml::from_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.as_at_date,
            NaiveDate::from_ymd_opt(2020, 4, 20)
        );
        assert_eq!(config.fetch.max_consecutive_dates, 3);
        assert!(!config.fetch.walk_back);
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.aliases.len(), 1);
        let chart = &config.charts[0];
        assert_eq!(chart.kind, ChartKind::Bar);
        assert_eq!(chart.scope, Scope::Continent(Continent::Europe));
        assert_eq!(chart.metric, Metric::CumDeaths);
        assert_eq!(chart.options.top_n, Some(10));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(toml::from_str::<DashboardConfig>("cache = \"x\"").is_err());

        let mut config = DashboardConfig::default();
        config.fetch.max_consecutive_dates = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn example_config_sources_resolve() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        let config = DashboardConfig::from_file(&dir.join("dashboard.example.toml")).unwrap();
        assert_eq!(config.sources.usa_states.as_deref(), Some(DEFAULT_USA_STATES_URL));

        let mut locations = vec![
            (SourceKind::WorldCases, config.sources.world_cases.clone()),
            (SourceKind::CountryCodes, config.sources.country_codes.clone()),
            (SourceKind::Regions, config.sources.regions.clone()),
        ];
        locations.extend(config.sources.usa_states.clone().map(|l| (SourceKind::UsaStates, l)));
        locations.extend(config.sources.state_codes.clone().map(|l| (SourceKind::StateCodes, l)));
        assert_eq!(locations.len(), 5);

        for (kind, location) in locations {
            match SourceLocation::parse(kind, &location).unwrap() {
                SourceLocation::Remote(url) => assert!(url.starts_with("https://"), "{kind}: {url}"),
                SourceLocation::Local(path) => {
                    assert!(dir.join(&path).is_file(), "{kind}: {} not shipped", path.display())
                }
            }
        }

        // the built-in defaults need nothing on disk
        let defaults = DashboardConfig::default();
        for location in [&defaults.sources.country_codes, &defaults.sources.regions] {
            assert!(matches!(
                SourceLocation::parse(SourceKind::Regions, location).unwrap(),
                SourceLocation::Remote(_)
            ));
        }
    }

    #[test]
    fn rejects_invalid_chart_combination() {
        let text = r#"
            [[charts]]
            kind = "scatter"
            metric = "cum_cases"
            log_scale = true
        "#;
        let config: DashboardConfig = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }
}
