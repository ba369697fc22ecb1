//! Data Handler Module
//! Owns the current country and US state tables and rebuilds them from their
//! sources.

use crate::config::DashboardConfig;
use crate::data::loader::{DataLoader, LoadError, SourceTable};
use crate::data::normalize::CountryNameNormalizer;
use crate::data::processor::DataProcessor;
use crate::data::reference::{
    CaseRecord, CountryCodeTable, RegionTable, StateCodeTable, StateRecord, BUILTIN_STATE_CODES,
};
use crate::data::source::{FetchError, FetchedSource, Provenance, SourceFetcher, SourceKind};
use crate::data::table::{CountryTable, StateTable, TableError};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Data fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Data validation failed: {0}")]
    Validation(#[from] LoadError),
    #[error("Failed to build country table: {0}")]
    Table(#[from] TableError),
}

/// Where one source came from during a refresh.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub kind: SourceKind,
    pub provenance: Provenance,
}

/// Summary of a successful refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub as_at: NaiveDate,
    pub latest_date: Option<NaiveDate>,
    pub sources: Vec<SourceReport>,
    pub rows: usize,
    pub countries: usize,
    pub unmatched: Vec<String>,
    pub duplicates: usize,
    pub padded_dates: usize,
    /// Country code entries rejected for malformed alpha-3 codes.
    pub dropped_codes: Vec<String>,
}

impl RefreshReport {
    /// True when any source was served from an older cache file.
    pub fn used_fallback(&self) -> bool {
        self.sources.iter().any(|s| s.provenance.is_fallback())
    }
}

/// Summary of a successful state-level refresh.
#[derive(Debug, Clone, Serialize)]
pub struct StateRefreshReport {
    pub as_at: NaiveDate,
    pub latest_date: Option<NaiveDate>,
    pub sources: Vec<SourceReport>,
    pub rows: usize,
    pub states: usize,
    pub unmatched: Vec<String>,
    /// States added with zero counts because the data never reports them.
    pub added: Vec<String>,
    pub padded_dates: usize,
    pub revisions: usize,
}

impl StateRefreshReport {
    pub fn used_fallback(&self) -> bool {
        self.sources.iter().any(|s| s.provenance.is_fallback())
    }
}

pub struct CovidDataHandler {
    config: DashboardConfig,
    fetcher: SourceFetcher,
    normalizer: CountryNameNormalizer,
    table: Option<CountryTable>,
    state_table: Option<StateTable>,
}

impl CovidDataHandler {
    pub fn new(config: DashboardConfig) -> Result<Self, FetchError> {
        let fetcher = SourceFetcher::new(config.cache_dir.clone(), &config.fetch)?;
        let normalizer = CountryNameNormalizer::with_aliases(&config.aliases);
        Ok(Self {
            config,
            fetcher,
            normalizer,
            table: None,
            state_table: None,
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Table of the last successful refresh.
    pub fn table(&self) -> Option<&CountryTable> {
        self.table.as_ref()
    }

    /// State table of the last successful state refresh.
    pub fn state_table(&self) -> Option<&StateTable> {
        self.state_table.as_ref()
    }

    fn location(&self, kind: SourceKind) -> Option<&str> {
        let sources = &self.config.sources;
        match kind {
            SourceKind::WorldCases => Some(&sources.world_cases),
            SourceKind::CountryCodes => Some(&sources.country_codes),
            SourceKind::Regions => Some(&sources.regions),
            SourceKind::UsaStates => sources.usa_states.as_deref(),
            SourceKind::StateCodes => sources.state_codes.as_deref(),
        }
    }

    fn load(
        &self,
        kind: SourceKind,
        as_at: NaiveDate,
        force: bool,
        sources: &mut Vec<SourceReport>,
    ) -> Result<SourceTable, RefreshError> {
        let fetched = match (self.location(kind), kind) {
            (Some(location), _) => self.fetcher.fetch(kind, location, as_at, force)?,
            (None, SourceKind::StateCodes) => FetchedSource {
                kind,
                bytes: BUILTIN_STATE_CODES.as_bytes().to_vec(),
                provenance: Provenance::Builtin,
            },
            (None, _) => {
                return Err(FetchError::InvalidLocation {
                    kind,
                    location: String::new(),
                }
                .into())
            }
        };
        if let Provenance::Fallback { path, reason } = &fetched.provenance {
            warn!(source = %kind, path = %path.display(), %reason, "using cached fallback");
        }
        let table = DataLoader::load_bytes(kind, fetched.bytes)?;
        sources.push(SourceReport {
            kind,
            provenance: fetched.provenance,
        });
        Ok(table)
    }

    /// Fetch, validate and merge all sources, then swap in the new table.
    ///
    /// On any error the previous table stays in place.
    pub fn refresh(&mut self, force: bool) -> Result<RefreshReport, RefreshError> {
        let as_at = self.config.effective_as_at_date();
        info!(%as_at, force, "refreshing COVID-19 data");

        let mut sources = Vec::with_capacity(3);
        let world = self.load(SourceKind::WorldCases, as_at, force, &mut sources)?;
        let codes = self.load(SourceKind::CountryCodes, as_at, force, &mut sources)?;
        let regions = self.load(SourceKind::Regions, as_at, force, &mut sources)?;

        let records = CaseRecord::from_table(&world)?;
        if records.is_empty() {
            return Err(LoadError::Empty {
                kind: SourceKind::WorldCases,
            }
            .into());
        }
        let codes = CountryCodeTable::from_table(&codes, &self.normalizer)?;
        let regions = RegionTable::from_table(&regions, &self.normalizer)?;
        if codes.is_empty() {
            return Err(LoadError::Empty {
                kind: SourceKind::CountryCodes,
            }
            .into());
        }

        let (rows, summary) =
            DataProcessor::merge_country_level(&records, &codes, &regions, &self.normalizer, true);
        let table = CountryTable::from_records(&rows, as_at, summary.unmatched.clone())?;

        let report = RefreshReport {
            as_at,
            latest_date: table.latest_date(),
            sources,
            rows: table.height(),
            countries: summary.countries,
            unmatched: summary.unmatched,
            duplicates: summary.duplicates,
            padded_dates: summary.padded_dates,
            dropped_codes: codes.dropped().to_vec(),
        };

        info!(
            rows = report.rows,
            countries = report.countries,
            latest = ?report.latest_date,
            "refresh complete"
        );
        self.table = Some(table);
        Ok(report)
    }
}

impl CovidDataHandler {
    /// Fetch and merge the US state-level sources, then swap in the new
    /// state table. `Ok(None)` when no state source is configured.
    ///
    /// On any error the previous state table stays in place.
    pub fn refresh_states(&mut self, force: bool) -> Result<Option<StateRefreshReport>, RefreshError> {
        if self.config.sources.usa_states.is_none() {
            return Ok(None);
        }
        let as_at = self.config.effective_as_at_date();
        info!(%as_at, force, "refreshing US state data");

        let mut sources = Vec::with_capacity(2);
        let states = self.load(SourceKind::UsaStates, as_at, force, &mut sources)?;
        let codes = self.load(SourceKind::StateCodes, as_at, force, &mut sources)?;

        let records = StateRecord::from_table(&states)?;
        if records.is_empty() {
            return Err(LoadError::Empty {
                kind: SourceKind::UsaStates,
            }
            .into());
        }
        let codes = StateCodeTable::from_table(&codes)?;

        let (rows, summary) = DataProcessor::merge_state_level(&records, &codes);
        let table = StateTable::from_records(&rows, as_at)?;

        let report = StateRefreshReport {
            as_at,
            latest_date: table.latest_date(),
            sources,
            rows: table.height(),
            states: summary.states,
            unmatched: summary.unmatched,
            added: summary.added,
            padded_dates: summary.padded_dates,
            revisions: summary.revisions,
        };

        info!(
            rows = report.rows,
            states = report.states,
            latest = ?report.latest_date,
            "state refresh complete"
        );
        self.state_table = Some(table);
        Ok(Some(report))
    }
}
