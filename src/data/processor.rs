//! Data Processor Module
//! Joins daily case records with the ISO and region references into one
//! row per country per date and attaches the derived metrics. The US state
//! series are completed the same way from cumulative counts.

use crate::data::metrics::{compute_series, DailyCount, DerivedMetrics};
use crate::data::normalize::{normalize_name, CountryNameNormalizer};
use crate::data::reference::{
    continent_exception, CaseRecord, Continent, CountryCodeTable, RegionTable, StateCodeTable,
    StateRecord,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// One row of the merged country-level table.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub date: NaiveDate,
    pub country: String,
    pub alpha_2_code: Option<String>,
    pub alpha_3_code: Option<String>,
    pub continent: Option<String>,
    pub region_1: Option<String>,
    pub region_2: Option<String>,
    pub population: Option<f64>,
    pub cases: i64,
    pub deaths: i64,
    pub metrics: DerivedMetrics,
    pub iso_matched: bool,
}

/// Outcome of a merge besides the rows themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeSummary {
    pub countries: usize,
    /// Display names of countries with no ISO match.
    pub unmatched: Vec<String>,
    /// `(country, date)` pairs reported more than once and summed.
    pub duplicates: usize,
    /// Dates added with zero counts to complete country series.
    pub padded_dates: usize,
}

/// One row of the merged US state-level table.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedStateRecord {
    pub date: NaiveDate,
    pub state: String,
    pub fips: String,
    pub alpha_code: Option<String>,
    pub cases: i64,
    pub deaths: i64,
    pub metrics: DerivedMetrics,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateMergeSummary {
    pub states: usize,
    /// States whose FIPS code is not in the code table.
    pub unmatched: Vec<String>,
    /// Code table states absent from the data, added with zero counts.
    pub added: Vec<String>,
    pub padded_dates: usize,
    /// Cumulative values reported below an earlier value and held there.
    pub revisions: usize,
}

/// Country identity used to group case rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum CountryKey {
    Iso(String),
    Name(String),
}

/// Everything known about one country while merging.
#[derive(Debug, Default)]
struct CountryAccumulator {
    /// Source spellings and how many rows used each.
    names: BTreeMap<String, usize>,
    iso_name: Option<String>,
    alpha_2_code: Option<String>,
    alpha_3_code: Option<String>,
    population: Option<f64>,
    source_population: Option<f64>,
    source_continent: Option<String>,
    iso_matched: bool,
    canonical: String,
    daily: BTreeMap<NaiveDate, DailyCount>,
    reported: BTreeSet<NaiveDate>,
}

impl CountryAccumulator {
    /// Most frequent source spelling. Ties go to the spelling of the ISO
    /// name, then to the alphabetically first.
    fn display_name(&self) -> String {
        let matches_iso =
            |name: &str| self.iso_name.as_deref() == Some(normalize_name(name).as_str());
        let mut best: Option<(&String, usize, bool)> = None;
        for (name, &count) in &self.names {
            let iso = matches_iso(name);
            let better = match best {
                None => true,
                Some((_, best_count, best_iso)) => (count, iso) > (best_count, best_iso),
            };
            if better {
                best = Some((name, count, iso));
            }
        }
        best.map(|(name, _, _)| name.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct StateAccumulator {
    names: BTreeMap<String, usize>,
    reported: BTreeMap<NaiveDate, (Option<i64>, Option<i64>)>,
}

/// Handles the merge of the sources.
pub struct DataProcessor;

impl DataProcessor {
    /// Build the country-level dataset.
    ///
    /// Rows are matched to the ISO table by normalized name, then by the
    /// record's own alpha-3 code. Unmatched countries are kept and flagged.
    /// When `fill_dates` is set every country spans the full date range, with
    /// zero counts on the dates it did not report.
    pub fn merge_country_level(
        records: &[CaseRecord],
        codes: &CountryCodeTable,
        regions: &RegionTable,
        normalizer: &CountryNameNormalizer,
        fill_dates: bool,
    ) -> (Vec<MergedRecord>, MergeSummary) {
        let mut summary = MergeSummary::default();
        let mut countries: BTreeMap<CountryKey, CountryAccumulator> = BTreeMap::new();

        for record in records {
            let display = record.country.replace('_', " ").trim().to_string();
            let canonical = normalizer.canonical(&record.country);
            let iso = codes.by_canonical_name(&canonical).or_else(|| {
                record
                    .alpha_3_code
                    .as_deref()
                    .and_then(|code| codes.by_alpha_3(code))
            });

            let key = match iso {
                Some(code) => CountryKey::Iso(code.alpha_3_code.clone()),
                None => CountryKey::Name(canonical.clone()),
            };

            let acc = countries.entry(key).or_insert_with(|| {
                let mut acc = CountryAccumulator {
                    canonical: canonical.clone(),
                    ..Default::default()
                };
                if let Some(code) = iso {
                    acc.iso_matched = true;
                    acc.iso_name = Some(normalize_name(&code.name));
                    acc.alpha_2_code = Some(code.alpha_2_code.clone()).filter(|c| !c.is_empty());
                    acc.alpha_3_code = Some(code.alpha_3_code.clone());
                    acc.population = code.population;
                }
                acc
            });

            *acc.names.entry(display).or_default() += 1;
            if acc.source_population.is_none() {
                acc.source_population = record.population;
            }
            if acc.source_continent.is_none() {
                acc.source_continent = record.continent.clone();
            }
            if acc.iso_matched && acc.alpha_2_code.is_none() {
                acc.alpha_2_code = record.alpha_2_code.clone();
            }

            if !acc.reported.insert(record.date) {
                summary.duplicates += 1;
            }
            let day = acc.daily.entry(record.date).or_default();
            day.cases += record.cases;
            day.deaths += record.deaths;
        }

        if summary.duplicates > 0 {
            warn!(
                duplicates = summary.duplicates,
                "duplicate country/date rows were summed"
            );
        }

        let date_range = Self::date_range(&countries);
        let mut rows = Vec::new();

        for acc in countries.values_mut() {
            let country = acc.display_name();

            if fill_dates {
                if let Some((first, last)) = date_range {
                    for date in first.iter_days().take_while(|d| *d <= last) {
                        if !acc.daily.contains_key(&date) {
                            acc.daily.insert(date, DailyCount::default());
                            summary.padded_dates += 1;
                        }
                    }
                }
            }

            // population only counts for countries matched to the reference
            let population = if acc.iso_matched {
                acc.population.or(acc.source_population)
            } else {
                summary.unmatched.push(country.clone());
                None
            };

            let region = regions.lookup(acc.alpha_3_code.as_deref(), &acc.canonical);
            let continent = continent_exception(&normalize_name(&country))
                .or_else(|| continent_exception(&acc.canonical))
                .or_else(|| region.and_then(|r| r.continent))
                .or_else(|| {
                    acc.source_continent
                        .as_deref()
                        .and_then(|label| Continent::classify(label, &[]))
                })
                .map(|c| c.label().to_string());

            let daily: Vec<DailyCount> = acc.daily.values().copied().collect();
            let metrics = compute_series(&daily, population);

            for ((date, day), metrics) in acc.daily.iter().zip(metrics) {
                rows.push(MergedRecord {
                    date: *date,
                    country: country.clone(),
                    alpha_2_code: acc.alpha_2_code.clone(),
                    alpha_3_code: acc.alpha_3_code.clone(),
                    continent: continent.clone(),
                    region_1: region.and_then(|r| r.region_1.clone()),
                    region_2: region.and_then(|r| r.region_2.clone()),
                    population,
                    cases: day.cases,
                    deaths: day.deaths,
                    metrics,
                    iso_matched: acc.iso_matched,
                });
            }
        }

        // country name, then identity, then date
        rows.sort_by(|a, b| {
            a.country
                .cmp(&b.country)
                .then_with(|| a.alpha_3_code.cmp(&b.alpha_3_code))
                .then_with(|| a.date.cmp(&b.date))
        });

        summary.countries = countries.len();
        summary.unmatched.sort();
        if !summary.unmatched.is_empty() {
            warn!(unmatched = ?summary.unmatched, "countries without ISO match");
        }
        if summary.padded_dates > 0 {
            debug!(padded = summary.padded_dates, "filled missing dates");
        }
        info!(
            rows = rows.len(),
            countries = summary.countries,
            "country-level dataset merged"
        );

        (rows, summary)
    }

    /// Build the US state-level dataset from cumulative counts.
    ///
    /// Every state spans the full date range of the data. A date without a
    /// report repeats the previous cumulative value, and a cumulative value
    /// below an earlier one is held at the earlier value, so daily counts are
    /// never negative. States of `codes` missing from the data are added with
    /// zero counts.
    pub fn merge_state_level(
        records: &[StateRecord],
        codes: &StateCodeTable,
    ) -> (Vec<MergedStateRecord>, StateMergeSummary) {
        let mut summary = StateMergeSummary::default();
        let mut states: BTreeMap<String, StateAccumulator> = BTreeMap::new();

        for record in records {
            let acc = states.entry(record.fips.clone()).or_default();
            *acc.names.entry(record.state.clone()).or_default() += 1;
            // a repeated (state, date) keeps the larger of each count
            let entry = acc.reported.entry(record.date).or_insert((None, None));
            entry.0 = entry.0.max(record.cum_cases);
            entry.1 = entry.1.max(record.cum_deaths);
        }

        let first = records.iter().map(|r| r.date).min();
        let last = records.iter().map(|r| r.date).max();
        let (Some(first), Some(last)) = (first, last) else {
            return (Vec::new(), summary);
        };

        for code in codes.iter() {
            if !states.contains_key(&code.fips) {
                summary.added.push(code.name.clone());
                states.insert(code.fips.clone(), StateAccumulator::default());
            }
        }

        let mut rows = Vec::new();
        for (fips, acc) in &states {
            let code = codes.by_fips(fips);
            let state = match code {
                Some(code) => code.name.clone(),
                None => {
                    let name = acc
                        .names
                        .iter()
                        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                        .map(|(name, _)| name.clone())
                        .unwrap_or_else(|| fips.clone());
                    summary.unmatched.push(name.clone());
                    name
                }
            };

            let mut cum = (0i64, 0i64);
            let mut daily = Vec::new();
            let mut dates = Vec::new();
            for date in first.iter_days().take_while(|d| *d <= last) {
                let (cases, deaths) = match acc.reported.get(&date) {
                    Some(reported) => *reported,
                    None => {
                        summary.padded_dates += 1;
                        (None, None)
                    }
                };
                let mut advance = |previous: i64, reported: Option<i64>| match reported {
                    Some(value) if value < previous => {
                        summary.revisions += 1;
                        previous
                    }
                    Some(value) => value,
                    None => previous,
                };
                let next = (advance(cum.0, cases), advance(cum.1, deaths));
                daily.push(DailyCount {
                    cases: next.0 - cum.0,
                    deaths: next.1 - cum.1,
                });
                dates.push(date);
                cum = next;
            }

            let metrics = compute_series(&daily, None);
            for ((date, day), metrics) in dates.into_iter().zip(daily).zip(metrics) {
                rows.push(MergedStateRecord {
                    date,
                    state: state.clone(),
                    fips: fips.clone(),
                    alpha_code: code.map(|c| c.alpha_code.clone()),
                    cases: day.cases,
                    deaths: day.deaths,
                    metrics,
                });
            }
        }

        rows.sort_by(|a, b| {
            a.state
                .cmp(&b.state)
                .then_with(|| a.fips.cmp(&b.fips))
                .then_with(|| a.date.cmp(&b.date))
        });

        summary.states = states.len();
        summary.unmatched.sort();
        if !summary.unmatched.is_empty() {
            warn!(unmatched = ?summary.unmatched, "states without a FIPS match");
        }
        if summary.revisions > 0 {
            debug!(revisions = summary.revisions, "held cumulative values revised downwards");
        }
        info!(
            rows = rows.len(),
            states = summary.states,
            added = summary.added.len(),
            "state-level dataset merged"
        );

        (rows, summary)
    }

    fn date_range(
        countries: &BTreeMap<CountryKey, CountryAccumulator>,
    ) -> Option<(NaiveDate, NaiveDate)> {
        let first = countries
            .values()
            .filter_map(|acc| acc.daily.keys().next())
            .min()?;
        let last = countries
            .values()
            .filter_map(|acc| acc.daily.keys().next_back())
            .max()?;
        Some((*first, *last))
    }

    /// Unique continents present in merged rows, sorted.
    pub fn get_continents(rows: &[MergedRecord]) -> Vec<String> {
        rows.iter()
            .filter_map(|r| r.continent.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Unique countries present in merged rows, sorted.
    pub fn get_countries(rows: &[MergedRecord]) -> Vec<String> {
        rows.iter()
            .map(|r| r.country.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
