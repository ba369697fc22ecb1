//! Source Fetching Module
//! Retrieves source CSVs from HTTP or the local filesystem and keeps dated
//! copies of downloads in a cache directory used as a fallback.

use crate::config::FetchConfig;
use chrono::{Duration, NaiveDate};
use reqwest::blocking::Client;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Placeholder replaced by the requested date in dated source URLs.
pub const DATE_PLACEHOLDER: &str = "{date}";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid source location for {kind}: {location}")]
    InvalidLocation { kind: SourceKind, location: String },
    #[error("HTTP request for {url} failed: {error}")]
    Http {
        url: String,
        #[source]
        error: reqwest::Error,
    },
    #[error("{url} answered {status} for every date from {first} over {attempts} attempt(s)")]
    Unavailable {
        url: String,
        status: u16,
        first: NaiveDate,
        attempts: u32,
    },
    #[error("Failed to read {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("{kind} could not be fetched and no cached copy exists: {reason}")]
    NoFallback { kind: SourceKind, reason: String },
}

/// Inputs of the country-level and US state-level datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    WorldCases,
    CountryCodes,
    Regions,
    /// Cumulative counts per US state and date.
    UsaStates,
    StateCodes,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::WorldCases,
        SourceKind::CountryCodes,
        SourceKind::Regions,
        SourceKind::UsaStates,
        SourceKind::StateCodes,
    ];

    /// Suffix of cache file names, `{YYYYMMDD}_{stem}.csv`.
    pub fn cache_stem(self) -> &'static str {
        match self {
            SourceKind::WorldCases => "ecdc_data",
            SourceKind::CountryCodes => "iso_country_codes",
            SourceKind::Regions => "regions_continents",
            SourceKind::UsaStates => "usa_state_data",
            SourceKind::StateCodes => "usa_state_codes",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::WorldCases => "world case data",
            SourceKind::CountryCodes => "ISO country codes",
            SourceKind::Regions => "regions & continents",
            SourceKind::UsaStates => "US state case data",
            SourceKind::StateCodes => "US state codes",
        };
        f.write_str(name)
    }
}

/// Where a source lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Remote(String),
    Local(PathBuf),
}

impl SourceLocation {
    pub fn parse(kind: SourceKind, raw: &str) -> Result<Self, FetchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FetchError::InvalidLocation {
                kind,
                location: raw.to_string(),
            });
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Ok(SourceLocation::Remote(raw.to_string()))
        } else {
            let path = raw.strip_prefix("file://").unwrap_or(raw);
            Ok(SourceLocation::Local(PathBuf::from(path)))
        }
    }
}

/// How the bytes of a source were obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum Provenance {
    /// Freshly downloaded; `date` is the date substituted into a dated URL.
    Downloaded { url: String, date: Option<NaiveDate> },
    /// Today's cache file, no request made.
    Cached { path: PathBuf },
    /// Download failed, an older cache file was used instead.
    Fallback { path: PathBuf, reason: String },
    Local { path: PathBuf },
    /// Table compiled into the crate.
    Builtin,
}

impl Provenance {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Provenance::Fallback { .. })
    }
}

/// Raw source content plus where it came from.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub kind: SourceKind,
    pub bytes: Vec<u8>,
    pub provenance: Provenance,
}

/// Fetches sources and maintains the download cache.
pub struct SourceFetcher {
    client: Client,
    cache_dir: PathBuf,
    max_consecutive_dates: u32,
    walk_back: bool,
}

impl SourceFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>, config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|error| FetchError::Http {
                url: String::new(),
                error,
            })?;

        Ok(Self {
            client,
            cache_dir: cache_dir.into(),
            max_consecutive_dates: config.max_consecutive_dates.max(1),
            walk_back: config.walk_back,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache file for a source on a given as-at date.
    pub fn cache_path(&self, kind: SourceKind, as_at: NaiveDate) -> PathBuf {
        self.cache_dir
            .join(format!("{}_{}.csv", as_at.format("%Y%m%d"), kind.cache_stem()))
    }

    /// Load one source.
    ///
    /// Remote sources read today's cache file when present (unless `force`),
    /// otherwise download and refresh the cache. A failed download falls back
    /// to the newest cache file of the source.
    pub fn fetch(
        &self,
        kind: SourceKind,
        location: &str,
        as_at: NaiveDate,
        force: bool,
    ) -> Result<FetchedSource, FetchError> {
        let url = match SourceLocation::parse(kind, location)? {
            SourceLocation::Local(path) => {
                debug!(source = %kind, path = %path.display(), "reading local source");
                let bytes = read_file(&path)?;
                return Ok(FetchedSource {
                    kind,
                    bytes,
                    provenance: Provenance::Local { path },
                });
            }
            SourceLocation::Remote(url) => url,
        };

        let today = self.cache_path(kind, as_at);
        if !force && today.is_file() {
            info!(source = %kind, path = %today.display(), "reading from cache");
            let bytes = read_file(&today)?;
            return Ok(FetchedSource {
                kind,
                bytes,
                provenance: Provenance::Cached { path: today },
            });
        }

        match self.download(&url, as_at) {
            Ok((bytes, date)) => {
                if let Err(e) = self.store(kind, as_at, &bytes) {
                    warn!(source = %kind, error = %e, "failed to write cache file");
                }
                info!(source = %kind, bytes = bytes.len(), "downloaded");
                Ok(FetchedSource {
                    kind,
                    bytes,
                    provenance: Provenance::Downloaded { url, date },
                })
            }
            Err(err) => {
                warn!(source = %kind, error = %err, "download failed, looking for cached copy");
                let reason = err.to_string();
                match self.latest_cached(kind) {
                    Some(path) => {
                        warn!(source = %kind, path = %path.display(), "using cached copy");
                        let bytes = read_file(&path)?;
                        Ok(FetchedSource {
                            kind,
                            bytes,
                            provenance: Provenance::Fallback { path, reason },
                        })
                    }
                    None => Err(FetchError::NoFallback { kind, reason }),
                }
            }
        }
    }

    /// GET `url`, substituting and walking dates when it holds [`DATE_PLACEHOLDER`].
    fn download(&self, url: &str, as_at: NaiveDate) -> Result<(Vec<u8>, Option<NaiveDate>), FetchError> {
        if !url.contains(DATE_PLACEHOLDER) {
            return match self.get(url)? {
                Ok(bytes) => Ok((bytes, None)),
                Err(status) => Err(FetchError::Unavailable {
                    url: url.to_string(),
                    status,
                    first: as_at,
                    attempts: 1,
                }),
            };
        }

        let step = if self.walk_back {
            Duration::days(-1)
        } else {
            Duration::days(1)
        };

        let mut date = as_at;
        let mut last_status = 0;
        for attempt in 1..=self.max_consecutive_dates {
            let dated = dated_url(url, date);
            match self.get(&dated)? {
                Ok(bytes) => return Ok((bytes, Some(date))),
                Err(status) => {
                    warn!(url = %dated, status, attempt, "file retrieval failed");
                    last_status = status;
                }
            }
            date += step;
        }

        Err(FetchError::Unavailable {
            url: url.to_string(),
            status: last_status,
            first: as_at,
            attempts: self.max_consecutive_dates,
        })
    }

    /// Transport errors are `Err`; a non-success status is `Ok(Err(status))`.
    fn get(&self, url: &str) -> Result<Result<Vec<u8>, u16>, FetchError> {
        debug!(url, "GET");
        let resp = self.client.get(url).send().map_err(|error| FetchError::Http {
            url: url.to_string(),
            error,
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Ok(Err(status.as_u16()));
        }

        let bytes = resp.bytes().map_err(|error| FetchError::Http {
            url: url.to_string(),
            error,
        })?;
        Ok(Ok(bytes.to_vec()))
    }

    /// Write today's cache file and delete older copies of the same source.
    fn store(&self, kind: SourceKind, as_at: NaiveDate, bytes: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_path(kind, as_at);
        fs::write(&path, bytes)?;

        for old in self.cached_files(kind) {
            if old != path {
                debug!(path = %old.display(), "removing stale cache file");
                fs::remove_file(&old)?;
            }
        }
        Ok(())
    }

    /// Cache files of a source, oldest first.
    fn cached_files(&self, kind: SourceKind) -> Vec<PathBuf> {
        let suffix = format!("_{}.csv", kind.cache_stem());
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(&suffix) && is_dated_name(n))
            })
            .collect();
        // YYYYMMDD prefixes sort chronologically
        files.sort();
        files
    }

    pub fn latest_cached(&self, kind: SourceKind) -> Option<PathBuf> {
        self.cached_files(kind).pop()
    }
}

fn is_dated_name(name: &str) -> bool {
    name.len() > 9 && name.as_bytes()[..8].iter().all(u8::is_ascii_digit) && name.as_bytes()[8] == b'_'
}

fn dated_url(url: &str, date: NaiveDate) -> String {
    url.replace(DATE_PLACEHOLDER, &date.format("%Y-%m-%d").to_string())
}

fn read_file(path: &Path) -> Result<Vec<u8>, FetchError> {
    fs::read(path).map_err(|error| FetchError::Io {
        path: path.to_path_buf(),
        error,
    })
}
