//! Reference Tables Module
//! Typed views over the sources: daily case records, ISO country codes, the
//! continent/region classification and the US state tables.

use crate::data::loader::{LoadError, SourceTable};
use crate::data::normalize::CountryNameNormalizer;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Date formats accepted in the `date_rep` column.
const DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%Y-%m-%d", "%Y/%m/%d"];

/// Continent overrides for territories the region table misclassifies or
/// omits, keyed by normalized country name.
const CONTINENT_EXCEPTIONS: [(&str, Continent); 3] = [
    ("kosovo", Continent::Europe),
    ("taiwan", Continent::Asia),
    ("bonaire", Continent::SouthAmerica),
];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // "2020-03-01 00:00:00" style timestamps keep only the date
    let raw = raw.split_whitespace().next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Continents a scope can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Continent {
    Africa,
    Asia,
    Europe,
    #[serde(rename = "North America")]
    NorthAmerica,
    #[serde(rename = "South America")]
    SouthAmerica,
    Oceania,
}

impl Continent {
    pub const ALL: [Continent; 6] = [
        Continent::Africa,
        Continent::Asia,
        Continent::Europe,
        Continent::NorthAmerica,
        Continent::SouthAmerica,
        Continent::Oceania,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Continent::Africa => "Africa",
            Continent::Asia => "Asia",
            Continent::Europe => "Europe",
            Continent::NorthAmerica => "North America",
            Continent::SouthAmerica => "South America",
            Continent::Oceania => "Oceania",
        }
    }

    /// Classify a continent label, using sub-region labels to split the
    /// Americas.
    pub fn classify(label: &str, sub_regions: &[Option<&str>]) -> Option<Continent> {
        if let Ok(continent) = label.parse() {
            return Some(continent);
        }

        let label = label.trim().to_lowercase();
        if label != "america" && label != "americas" {
            return None;
        }

        let subs: Vec<String> = sub_regions
            .iter()
            .flatten()
            .map(|s| s.trim().to_lowercase())
            .collect();
        if subs.iter().any(|s| s.contains("south america")) {
            Some(Continent::SouthAmerica)
        } else if subs.iter().any(|s| {
            s.contains("northern america")
                || s.contains("north america")
                || s.contains("central america")
                || s.contains("caribbean")
        }) {
            Some(Continent::NorthAmerica)
        } else {
            None
        }
    }
}

impl fmt::Display for Continent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Continent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace(['_', '-'], " ");
        match key.as_str() {
            "africa" => Ok(Continent::Africa),
            "asia" => Ok(Continent::Asia),
            "europe" => Ok(Continent::Europe),
            "north america" => Ok(Continent::NorthAmerica),
            "south america" => Ok(Continent::SouthAmerica),
            "oceania" | "australia" => Ok(Continent::Oceania),
            _ => Err(format!("unknown continent '{s}'")),
        }
    }
}

/// One row of the worldwide daily counts.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub date: NaiveDate,
    pub country: String,
    pub cases: i64,
    pub deaths: i64,
    pub alpha_2_code: Option<String>,
    pub alpha_3_code: Option<String>,
    pub population: Option<f64>,
    pub continent: Option<String>,
}

impl CaseRecord {
    /// Extract typed records, skipping rows without a usable date or country.
    pub fn from_table(table: &SourceTable) -> Result<Vec<CaseRecord>, LoadError> {
        let dates = table.strings("date_rep")?;
        let countries = table.strings("country")?;
        let cases = table.floats("cases")?;
        let deaths = table.floats("deaths")?;
        let alpha_2 = table.strings("alpha_2_code")?;
        let alpha_3 = table.strings("alpha_3_code")?;
        let population = table.floats("population")?;
        let continent = table.strings("continent")?;

        let mut records = Vec::with_capacity(table.height());
        let mut skipped = 0usize;

        for i in 0..table.height() {
            let date = dates[i].as_deref().and_then(parse_date);
            let (Some(date), Some(country)) = (date, countries[i].clone()) else {
                skipped += 1;
                continue;
            };

            records.push(CaseRecord {
                date,
                country,
                cases: count(cases[i]),
                deaths: count(deaths[i]),
                alpha_2_code: alpha_2[i].clone(),
                alpha_3_code: alpha_3[i].clone().map(|c| c.to_uppercase()),
                population: population[i].filter(|p| p.is_finite() && *p > 0.0),
                continent: continent[i].clone(),
            });
        }

        if skipped > 0 {
            warn!(skipped, "skipped case rows without a valid date or country");
        }
        debug!(records = records.len(), "case records extracted");
        Ok(records)
    }
}

fn count(value: Option<f64>) -> i64 {
    value
        .filter(|v| v.is_finite())
        .map(|v| v.round() as i64)
        .unwrap_or(0)
}

/// One ISO 3166 entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryCode {
    pub name: String,
    pub alpha_2_code: String,
    pub alpha_3_code: String,
    pub population: Option<f64>,
}

/// ISO codes indexed by canonical name and by alpha-3.
#[derive(Debug, Clone, Default)]
pub struct CountryCodeTable {
    entries: Vec<CountryCode>,
    by_name: HashMap<String, usize>,
    by_alpha_3: HashMap<String, usize>,
    dropped: Vec<String>,
}

impl CountryCodeTable {
    pub fn from_table(
        table: &SourceTable,
        normalizer: &CountryNameNormalizer,
    ) -> Result<Self, LoadError> {
        let names = table.strings("country_name")?;
        let alpha_2 = table.strings("alpha_2_code")?;
        let alpha_3 = table.strings("alpha_3_code")?;
        let population = table.floats("population")?;

        let entries = (0..table.height()).filter_map(|i| {
            Some(CountryCode {
                name: names[i].clone()?,
                alpha_2_code: alpha_2[i].clone().unwrap_or_default().to_uppercase(),
                alpha_3_code: alpha_3[i].clone()?.to_uppercase(),
                population: population[i].filter(|p| p.is_finite() && *p > 0.0),
            })
        });

        Ok(Self::from_entries(entries, normalizer))
    }

    /// Index entries, dropping those whose alpha-3 code is not three
    /// characters long.
    pub fn from_entries<I>(entries: I, normalizer: &CountryNameNormalizer) -> Self
    where
        I: IntoIterator<Item = CountryCode>,
    {
        let mut table = Self::default();

        for entry in entries {
            if entry.alpha_3_code.chars().count() != 3 {
                table.dropped.push(entry.name);
                continue;
            }
            let idx = table.entries.len();
            table
                .by_name
                .entry(normalizer.canonical(&entry.name))
                .or_insert(idx);
            table.by_alpha_3.entry(entry.alpha_3_code.clone()).or_insert(idx);
            table.entries.push(entry);
        }

        if !table.dropped.is_empty() {
            debug!(dropped = ?table.dropped, "dropped ISO entries with invalid alpha-3 codes");
        }
        table
    }

    pub fn by_canonical_name(&self, canonical: &str) -> Option<&CountryCode> {
        self.by_name.get(canonical).map(|&i| &self.entries[i])
    }

    pub fn by_alpha_3(&self, code: &str) -> Option<&CountryCode> {
        self.by_alpha_3
            .get(&code.to_uppercase())
            .map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of entries rejected for malformed codes.
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }
}

/// One row of the continent/region classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionEntry {
    pub country: String,
    pub alpha_3_code: Option<String>,
    pub continent: Option<Continent>,
    pub region_1: Option<String>,
    pub region_2: Option<String>,
}

/// Region entries indexed by alpha-3 and canonical name.
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    entries: Vec<RegionEntry>,
    by_alpha_3: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl RegionTable {
    pub fn from_table(
        table: &SourceTable,
        normalizer: &CountryNameNormalizer,
    ) -> Result<Self, LoadError> {
        let countries = table.strings("country")?;
        let continents = table.strings("continent")?;
        let alpha_3 = table.strings("iso_alpha3_code")?;
        let region_1 = table.strings("region_1")?;
        let region_2 = table.strings("region_2")?;

        let mut unclassified = 0usize;
        let entries: Vec<RegionEntry> = (0..table.height())
            .filter_map(|i| {
                let country = countries[i].clone()?;
                let continent = continents[i].as_deref().and_then(|label| {
                    Continent::classify(label, &[region_1[i].as_deref(), region_2[i].as_deref()])
                });
                if continent.is_none() {
                    unclassified += 1;
                }
                Some(RegionEntry {
                    country,
                    alpha_3_code: alpha_3[i].clone().map(|c| c.to_uppercase()),
                    continent,
                    region_1: region_1[i].clone(),
                    region_2: region_2[i].clone(),
                })
            })
            .collect();

        if unclassified > 0 {
            debug!(unclassified, "region rows without a recognised continent");
        }
        Ok(Self::from_entries(entries, normalizer))
    }

    pub fn from_entries<I>(entries: I, normalizer: &CountryNameNormalizer) -> Self
    where
        I: IntoIterator<Item = RegionEntry>,
    {
        let mut table = Self::default();
        for entry in entries {
            let idx = table.entries.len();
            if let Some(code) = &entry.alpha_3_code {
                table.by_alpha_3.entry(code.clone()).or_insert(idx);
            }
            table
                .by_name
                .entry(normalizer.canonical(&entry.country))
                .or_insert(idx);
            table.entries.push(entry);
        }
        table
    }

    /// Region entry by alpha-3 first, canonical name second.
    pub fn lookup(&self, alpha_3: Option<&str>, canonical: &str) -> Option<&RegionEntry> {
        alpha_3
            .and_then(|code| self.by_alpha_3.get(&code.to_uppercase()))
            .or_else(|| self.by_name.get(canonical))
            .map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// US state names, postal codes and FIPS codes shipped with the crate.
pub const BUILTIN_STATE_CODES: &str = include_str!("../../reference/us_state_codes.csv");

/// Two-digit state FIPS code from `"6"`, `"06"` or `"6.0"`.
pub fn pad_fips(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let number = match raw.parse::<u32>() {
        Ok(n) => n,
        Err(_) => {
            let f = raw.parse::<f64>().ok().filter(|f| f.fract() == 0.0 && *f >= 0.0)?;
            f as u32
        }
    };
    (number < 100).then(|| format!("{number:02}"))
}

/// One row of the state-level source. Counts are cumulative; missing
/// counts are filled from earlier dates during the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub date: NaiveDate,
    pub state: String,
    pub fips: String,
    pub cum_cases: Option<i64>,
    pub cum_deaths: Option<i64>,
}

impl StateRecord {
    /// Rows without a date, state or FIPS code are skipped.
    pub fn from_table(table: &SourceTable) -> Result<Vec<StateRecord>, LoadError> {
        let dates = table.strings("date")?;
        let states = table.strings("state")?;
        let fips = table.strings("fips")?;
        let cases = table.floats("cum_cases")?;
        let deaths = table.floats("cum_deaths")?;
        let count = |v: Option<f64>| v.filter(|v| v.is_finite()).map(|v| v.max(0.0) as i64);

        let mut skipped = 0usize;
        let mut records = Vec::with_capacity(table.height());
        for i in 0..table.height() {
            let date = dates[i].as_deref().and_then(parse_date);
            let code = fips[i].as_deref().and_then(pad_fips);
            let (Some(date), Some(state), Some(code)) = (date, states[i].clone(), code) else {
                skipped += 1;
                continue;
            };
            records.push(StateRecord {
                date,
                state,
                fips: code,
                cum_cases: count(cases[i]),
                cum_deaths: count(deaths[i]),
            });
        }

        if skipped > 0 {
            warn!(skipped, "state rows without date, state or FIPS code were skipped");
        }
        Ok(records)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateCode {
    pub name: String,
    pub alpha_code: String,
    pub fips: String,
}

/// State codes indexed by FIPS code.
#[derive(Debug, Clone, Default)]
pub struct StateCodeTable {
    by_fips: BTreeMap<String, StateCode>,
}

impl StateCodeTable {
    pub fn from_table(table: &SourceTable) -> Result<Self, LoadError> {
        let names = table.strings("name")?;
        let codes = table.strings("alpha_code")?;
        let fips = table.strings("fips")?;

        let entries = (0..table.height()).filter_map(|i| {
            Some(StateCode {
                name: names[i].clone()?,
                alpha_code: codes[i].clone()?.to_uppercase(),
                fips: pad_fips(fips[i].as_deref()?)?,
            })
        });
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = StateCode>,
    {
        let mut table = Self::default();
        for entry in entries {
            table.by_fips.entry(entry.fips.clone()).or_insert(entry);
        }
        table
    }

    pub fn by_fips(&self, fips: &str) -> Option<&StateCode> {
        self.by_fips.get(fips)
    }

    /// Entries in FIPS order.
    pub fn iter(&self) -> impl Iterator<Item = &StateCode> {
        self.by_fips.values()
    }

    pub fn len(&self) -> usize {
        self.by_fips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fips.is_empty()
    }
}

/// Continent forced for a country regardless of the region table.
pub fn continent_exception(normalized_name: &str) -> Option<Continent> {
    CONTINENT_EXCEPTIONS
        .iter()
        .find(|(prefix, _)| normalized_name.starts_with(prefix))
        .map(|(_, continent)| *continent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::DataLoader;
    use crate::data::source::SourceKind;

    #[test]
    fn parses_supported_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2020, 3, 14);
        assert_eq!(parse_date("14/03/2020"), expected);
        assert_eq!(parse_date("2020-03-14"), expected);
        assert_eq!(parse_date("2020-03-14 00:00:00"), expected);
        assert_eq!(parse_date("March 14"), None);
    }

    #[test]
    fn classifies_continents() {
        assert_eq!(Continent::classify("Europe", &[]), Some(Continent::Europe));
        assert_eq!(
            Continent::classify("Americas", &[Some("Latin America and the Caribbean"), Some("South America")]),
            Some(Continent::SouthAmerica)
        );
        assert_eq!(
            Continent::classify("Americas", &[Some("Northern America"), None]),
            Some(Continent::NorthAmerica)
        );
        assert_eq!(Continent::classify("America", &[]), None);
        assert_eq!(Continent::classify("Other", &[]), None);
        assert_eq!("north_america".parse::<Continent>(), Ok(Continent::NorthAmerica));
    }

    #[test]
    fn extracts_case_records() {
        let csv = "dateRep,cases,deaths,countriesAndTerritories,countryterritoryCode,popData2019\n\
                   14/12/2020,746,6,Afghanistan,afg,38041757\n\
                   not-a-date,1,1,Afghanistan,AFG,38041757\n\
                   13/12/2020,,9,Afghanistan,AFG,\n";
        let table = DataLoader::load_bytes(SourceKind::WorldCases, csv.as_bytes().to_vec()).unwrap();
        let records = CaseRecord::from_table(&table).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].alpha_3_code.as_deref(), Some("AFG"));
        assert_eq!(records[0].cases, 746);
        assert_eq!(records[1].cases, 0);
        assert_eq!(records[1].deaths, 9);
        assert_eq!(records[1].population, None);
    }

    #[test]
    fn country_codes_drop_malformed_alpha_3() {
        let normalizer = CountryNameNormalizer::new();
        let csv = "Country name[5],Alpha-2 code,Alpha-3 code\n\
                   United States of America,US,USA\n\
                   Sovereign base areas,XX,See note\n";
        let table = DataLoader::load_bytes(SourceKind::CountryCodes, csv.as_bytes().to_vec()).unwrap();
        let codes = CountryCodeTable::from_table(&table, &normalizer).unwrap();

        assert_eq!(codes.len(), 1);
        assert_eq!(codes.dropped(), &["Sovereign base areas".to_string()]);
        let usa = codes
            .by_canonical_name(&normalizer.canonical("US"))
            .unwrap();
        assert_eq!(usa.alpha_2_code, "US");
        assert_eq!(codes.by_alpha_3("usa").map(|c| c.name.as_str()), Some("United States of America"));
    }

    #[test]
    fn region_lookup_prefers_alpha_3() {
        let normalizer = CountryNameNormalizer::new();
        let csv = "No,Country or Area,ISO-alpha3 Code,Region 1,Region 2,Continent\n\
                   1,Brazil,BRA,South America,Latin America and the Caribbean,Americas\n\
                   2,Canada,CAN,Northern America,,Americas\n\
                   3,France,FRA,Western Europe,,Europe\n";
        let table = DataLoader::load_bytes(SourceKind::Regions, csv.as_bytes().to_vec()).unwrap();
        let regions = RegionTable::from_table(&table, &normalizer).unwrap();

        assert_eq!(regions.len(), 3);
        let brazil = regions.lookup(Some("BRA"), "nothing").unwrap();
        assert_eq!(brazil.continent, Some(Continent::SouthAmerica));
        let canada = regions.lookup(None, &normalizer.canonical("Canada")).unwrap();
        assert_eq!(canada.continent, Some(Continent::NorthAmerica));
        assert_eq!(canada.region_1.as_deref(), Some("Northern America"));
        assert!(regions.lookup(Some("XXX"), "atlantis").is_none());
    }

    #[test]
    fn reads_iso_table_with_un_regions() {
        let normalizer = CountryNameNormalizer::new();
        let csv = "name,alpha-2,alpha-3,country-code,iso_3166-2,region,sub-region,intermediate-region,region-code,sub-region-code,intermediate-region-code\n\
                   Antarctica,AQ,ATA,010,ISO 3166-2:AQ,,,,,,\n\
                   Brazil,BR,BRA,076,ISO 3166-2:BR,Americas,Latin America and the Caribbean,South America,019,419,005\n\
                   \"Korea, Republic of\",KR,KOR,410,ISO 3166-2:KR,Asia,Eastern Asia,,142,030,\n\
                   Mexico,MX,MEX,484,ISO 3166-2:MX,Americas,Latin America and the Caribbean,Central America,019,419,013\n";

        let codes = DataLoader::load_bytes(SourceKind::CountryCodes, csv.as_bytes().to_vec()).unwrap();
        let codes = CountryCodeTable::from_table(&codes, &normalizer).unwrap();
        assert_eq!(codes.len(), 4);
        let korea = codes
            .by_canonical_name(&normalizer.canonical("South_Korea"))
            .unwrap();
        assert_eq!(korea.alpha_3_code, "KOR");

        let regions = DataLoader::load_bytes(SourceKind::Regions, csv.as_bytes().to_vec()).unwrap();
        let regions = RegionTable::from_table(&regions, &normalizer).unwrap();
        assert_eq!(regions.lookup(Some("BRA"), "").unwrap().continent, Some(Continent::SouthAmerica));
        assert_eq!(regions.lookup(Some("MEX"), "").unwrap().continent, Some(Continent::NorthAmerica));
        assert_eq!(regions.lookup(Some("KOR"), "").unwrap().continent, Some(Continent::Asia));
        assert_eq!(regions.lookup(Some("ATA"), "").unwrap().continent, None);
    }

    #[test]
    fn pads_state_fips_codes() {
        assert_eq!(pad_fips("6").as_deref(), Some("06"));
        assert_eq!(pad_fips("06").as_deref(), Some("06"));
        assert_eq!(pad_fips("72.0").as_deref(), Some("72"));
        assert_eq!(pad_fips("36061"), None);
        assert_eq!(pad_fips("n/a"), None);
    }

    #[test]
    fn extracts_state_records() {
        let csv = "date,state,fips,cases,deaths\n\
                   2020-03-01,Washington,53,11,1\n\
                   2020-03-02,Washington,53,,\n\
                   2020-03-02,Nowhere,,4,0\n";
        let table = DataLoader::load_bytes(SourceKind::UsaStates, csv.as_bytes().to_vec()).unwrap();
        let records = StateRecord::from_table(&table).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fips, "53");
        assert_eq!(records[0].cum_cases, Some(11));
        assert_eq!(records[1].cum_cases, None);
    }

    #[test]
    fn builtin_state_codes_cover_states_and_territories() {
        let table =
            DataLoader::load_bytes(SourceKind::StateCodes, BUILTIN_STATE_CODES.as_bytes().to_vec())
                .unwrap();
        let codes = StateCodeTable::from_table(&table).unwrap();

        assert_eq!(codes.len(), 56);
        assert_eq!(codes.by_fips("06").map(|c| c.alpha_code.as_str()), Some("CA"));
        assert_eq!(codes.by_fips("72").map(|c| c.name.as_str()), Some("Puerto Rico"));
        assert_eq!(codes.iter().next().map(|c| c.fips.as_str()), Some("01"));
    }

    #[test]
    fn continent_exceptions_match_name_prefixes() {
        assert_eq!(continent_exception("kosovo"), Some(Continent::Europe));
        assert_eq!(
            continent_exception("bonaire sint eustatius and saba"),
            Some(Continent::SouthAmerica)
        );
        assert_eq!(continent_exception("france"), None);
    }
}
