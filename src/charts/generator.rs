//! Chart Generator Module
//! Turns the country table into animated chart configurations, one frame
//! per date.

use crate::charts::output::{
    group_color, Axis, ChartSpec, ColorScale, DataPoint, Encoding, FacetEncoding, Frame,
    GroupColor, SizeEncoding, SEQUENTIAL_SCHEME, SIZE_MAX_PX,
};
use crate::charts::scale::{generate_scale, scale_lower_limit, scale_upper_limit};
use crate::charts::selection::{ChartKind, ChartRequest, Metric, Scope, SizeMetric};
use crate::data::{growth_rate, mortality_rate, ratio, CountryTable, DATE_FORMAT};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Selected scope not supported ({value}). Please select from: {allowed}")]
    UnknownScope { value: String, allowed: String },
    #[error("Selected metric not supported ({value}). Please select from: {allowed}")]
    UnknownMetric { value: String, allowed: String },
    #[error("Selected chart type not supported ({value}). Please select from: {allowed}")]
    UnknownKind { value: String, allowed: String },
    #[error("Selected {option} not supported ({value}). Please select from: {allowed}")]
    UnknownOption {
        option: &'static str,
        value: String,
        allowed: String,
    },
    #[error("Option {option} is not supported for {kind} charts")]
    UnsupportedCombination {
        kind: ChartKind,
        option: &'static str,
    },
    #[error("Invalid {option}: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },
    #[error("No data to chart for {metric} in scope {scope}")]
    NoData { scope: Scope, metric: Metric },
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

/// One table row with every metric as a float.
#[derive(Debug, Clone)]
struct ChartRow {
    date: NaiveDate,
    country: String,
    alpha_3_code: Option<String>,
    continent: Option<String>,
    population: Option<f64>,
    values: [Option<f64>; 9],
}

impl ChartRow {
    fn value(&self, metric: Metric) -> Option<f64> {
        self.values[metric as usize]
    }

    fn size(&self, size: SizeMetric) -> Option<f64> {
        match size {
            SizeMetric::Population => self.population,
            SizeMetric::Metric(metric) => self.value(metric),
        }
    }
}

/// Summed components of one bar group on one date.
#[derive(Debug, Clone, Copy, Default)]
struct GroupTotals {
    cases: f64,
    deaths: f64,
    cum_cases: f64,
    cum_deaths: f64,
    population: f64,
    // cumulative counts of the members that report a population
    pop_cum_cases: f64,
    pop_cum_deaths: f64,
}

impl GroupTotals {
    fn add(&mut self, row: &ChartRow) {
        let cum_cases = row.value(Metric::CumCases).unwrap_or(0.0);
        let cum_deaths = row.value(Metric::CumDeaths).unwrap_or(0.0);
        self.cases += row.value(Metric::Cases).unwrap_or(0.0);
        self.deaths += row.value(Metric::Deaths).unwrap_or(0.0);
        self.cum_cases += cum_cases;
        self.cum_deaths += cum_deaths;
        if let Some(population) = row.population.filter(|p| *p > 0.0) {
            self.population += population;
            self.pop_cum_cases += cum_cases;
            self.pop_cum_deaths += cum_deaths;
        }
    }

    /// Group metric recomputed from the sums; ratios are ratios of sums.
    fn value(&self, metric: Metric, previous: Option<&GroupTotals>) -> Option<f64> {
        match metric {
            Metric::Cases => Some(self.cases),
            Metric::Deaths => Some(self.deaths),
            Metric::CumCases => Some(self.cum_cases),
            Metric::CumDeaths => Some(self.cum_deaths),
            Metric::MortalityRate => mortality_rate(self.cum_deaths, self.cum_cases),
            Metric::FractionInfected => ratio(self.pop_cum_cases, self.population),
            Metric::FractionDeaths => ratio(self.pop_cum_deaths, self.population),
            Metric::InfectionsGrowthRate => {
                previous.and_then(|p| growth_rate(p.cum_cases, self.cum_cases))
            }
            Metric::DeathsGrowthRate => {
                previous.and_then(|p| growth_rate(p.cum_deaths, self.cum_deaths))
            }
        }
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn string_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn float_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Keep rows from the first date where `value` is positive. Empty when no
/// row ever is.
fn fit_dates<'a, F>(rows: Vec<&'a ChartRow>, value: F, enabled: bool) -> Vec<&'a ChartRow>
where
    F: Fn(&ChartRow) -> Option<f64>,
{
    if !enabled {
        return rows;
    }
    let first = rows
        .iter()
        .filter(|r| value(*r).is_some_and(|v| v > 0.0))
        .map(|r| r.date)
        .min();
    match first {
        Some(first) => rows.into_iter().filter(|r| r.date >= first).collect(),
        None => Vec::new(),
    }
}

/// Builds chart configurations from a country table.
pub struct ChartGenerator<'a> {
    table: &'a CountryTable,
}

impl<'a> ChartGenerator<'a> {
    pub fn new(table: &'a CountryTable) -> Self {
        Self { table }
    }

    /// Parse a textual selection and generate the chart.
    pub fn generate_from_str(
        &self,
        kind: &str,
        scope: &str,
        metric: &str,
    ) -> Result<ChartSpec, ChartError> {
        self.generate(&ChartRequest::parse(kind, scope, metric)?)
    }

    pub fn generate(&self, request: &ChartRequest) -> Result<ChartSpec, ChartError> {
        request.validate()?;
        info!(
            kind = %request.kind,
            scope = %request.scope,
            metric = %request.metric,
            "generating chart"
        );

        let no_data = || ChartError::NoData {
            scope: request.scope,
            metric: request.metric,
        };

        let rows = self.select_rows(request.scope)?;
        if rows.is_empty() {
            return Err(no_data());
        }

        let spec = match request.kind {
            ChartKind::Choropleth | ChartKind::ScatterGeo => Self::map_chart(request, &rows),
            ChartKind::Bar => Self::bar_chart(request, &rows),
            ChartKind::Scatter => Self::scatter_chart(request, &rows),
        }
        .ok_or_else(no_data)?;

        debug!(
            frames = spec.frames.len(),
            points = spec.point_count(),
            "chart generated"
        );
        Ok(spec)
    }

    /// Rows of the table within the scope.
    fn select_rows(&self, scope: Scope) -> Result<Vec<ChartRow>, ChartError> {
        let df = match scope {
            Scope::World => self.table.dataframe().clone(),
            Scope::Continent(continent) => self
                .table
                .dataframe()
                .clone()
                .lazy()
                .filter(col("continent").eq(lit(continent.label())))
                .collect()?,
        };

        let dates = string_column(&df, "date_rep")?;
        let countries = string_column(&df, "country")?;
        let alpha_3 = string_column(&df, "alpha_3_code")?;
        let continents = string_column(&df, "continent")?;
        let population = float_column(&df, "population")?;
        let metrics = Metric::ALL
            .iter()
            .map(|m| float_column(&df, m.column()))
            .collect::<PolarsResult<Vec<_>>>()?;

        let rows = (0..df.height())
            .filter_map(|i| {
                let date = dates[i]
                    .as_deref()
                    .and_then(|d| NaiveDate::parse_from_str(d, DATE_FORMAT).ok())?;
                Some(ChartRow {
                    date,
                    country: countries[i].clone()?,
                    alpha_3_code: alpha_3[i].clone(),
                    continent: continents[i].clone(),
                    population: population[i],
                    values: std::array::from_fn(|m| metrics[m][i]),
                })
            })
            .collect();
        Ok(rows)
    }

    fn map_chart(request: &ChartRequest, rows: &[ChartRow]) -> Option<ChartSpec> {
        let metric = request.metric;
        let located: Vec<&ChartRow> = rows.iter().filter(|r| r.alpha_3_code.is_some()).collect();
        if located.len() < rows.len() {
            debug!(skipped = rows.len() - located.len(), "rows without alpha-3 code left off the map");
        }
        let rows = fit_dates(located, |r| r.value(metric), request.options.fit_dates);
        if rows.is_empty() {
            return None;
        }

        let mut frames: BTreeMap<NaiveDate, Vec<DataPoint>> = BTreeMap::new();
        for row in &rows {
            let value = row.value(metric);
            let size = match request.kind {
                ChartKind::ScatterGeo => value.map(|v| v.max(0.0)),
                _ => None,
            };
            frames.entry(row.date).or_default().push(DataPoint {
                label: row.country.clone(),
                location: row.alpha_3_code.clone(),
                group: row.continent.clone(),
                value,
                y: None,
                size,
            });
        }

        let values: Vec<f64> = rows.iter().filter_map(|r| r.value(metric)).collect();
        let mut encoding = Encoding::default();
        match request.kind {
            ChartKind::Choropleth => {
                let range = if request.options.log_scale {
                    let positive: Vec<f64> = values.iter().copied().filter(|v| *v > 0.0).collect();
                    let min = positive.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = positive.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    if positive.is_empty() {
                        return None;
                    }
                    [scale_lower_limit(min), scale_upper_limit(max)]
                } else {
                    let min = values.iter().copied().fold(0.0, f64::min);
                    let max = values.iter().copied().fold(0.0, f64::max);
                    [min, max]
                };
                encoding.color = Some(ColorScale {
                    field: metric.column().to_string(),
                    label: capitalize(metric.label()),
                    range,
                    log: request.options.log_scale,
                    scheme: SEQUENTIAL_SCHEME.to_string(),
                });
            }
            _ => {
                encoding.size = Some(SizeEncoding {
                    field: metric.column().to_string(),
                    max_px: SIZE_MAX_PX,
                });
            }
        }

        Some(ChartSpec {
            kind: request.kind,
            scope: request.scope,
            metric,
            title: format!("Covid-19 {} by country", metric.label()),
            encoding,
            frames: frames
                .into_iter()
                .map(|(date, points)| Frame { date, points })
                .collect(),
        })
    }

    fn bar_chart(request: &ChartRequest, rows: &[ChartRow]) -> Option<ChartSpec> {
        let metric = request.metric;
        let by_continent = request.scope == Scope::World;

        let mut totals: BTreeMap<String, BTreeMap<NaiveDate, GroupTotals>> = BTreeMap::new();
        let mut locations: BTreeMap<String, Option<String>> = BTreeMap::new();
        for row in rows {
            let group = if by_continent {
                row.continent.clone()
            } else {
                Some(row.country.clone())
            };
            let Some(group) = group else { continue };
            if !by_continent {
                locations.insert(group.clone(), row.alpha_3_code.clone());
            }
            totals
                .entry(group)
                .or_default()
                .entry(row.date)
                .or_default()
                .add(row);
        }

        let series: BTreeMap<String, BTreeMap<NaiveDate, Option<f64>>> = totals
            .iter()
            .map(|(group, days)| {
                let mut previous: Option<&GroupTotals> = None;
                let values = days
                    .iter()
                    .map(|(date, day)| {
                        let value = day.value(metric, previous);
                        previous = Some(day);
                        (*date, value)
                    })
                    .collect();
                (group.clone(), values)
            })
            .collect();

        // cumulative metrics compare on the latest date, the rest on their peak
        let latest = rows.iter().map(|r| r.date).max()?;
        let mut checks: Vec<(String, f64)> = series
            .iter()
            .map(|(group, values)| {
                let check = if metric.is_cumulative() {
                    values.get(&latest).copied().flatten()
                } else {
                    values.values().flatten().copied().reduce(f64::max)
                };
                (group.clone(), check.unwrap_or(f64::NEG_INFINITY))
            })
            .collect();

        if let Some(cutoff) = request.options.x_cutoff {
            checks.retain(|(_, check)| *check >= cutoff);
        }
        if let Some(top_n) = request.options.top_n {
            if checks.len() > top_n {
                checks.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                checks.truncate(top_n);
            }
        }
        if checks.is_empty() {
            return None;
        }

        let kept: BTreeSet<&str> = checks.iter().map(|(g, _)| g.as_str()).collect();
        let first = if request.options.fit_dates {
            series
                .iter()
                .filter(|(group, _)| kept.contains(group.as_str()))
                .flat_map(|(_, values)| values.iter())
                .filter(|(_, v)| v.is_some_and(|v| v > 0.0))
                .map(|(date, _)| *date)
                .min()?
        } else {
            NaiveDate::MIN
        };

        let mut frames: BTreeMap<NaiveDate, Vec<DataPoint>> = BTreeMap::new();
        for (group, values) in series.iter().filter(|(g, _)| kept.contains(g.as_str())) {
            for (date, value) in values.range(first..) {
                frames.entry(*date).or_default().push(DataPoint {
                    label: group.clone(),
                    location: locations.get(group).cloned().flatten(),
                    group: None,
                    value: *value,
                    y: None,
                    size: None,
                });
            }
        }

        let mut scale_values: Vec<f64> = checks.iter().map(|(_, c)| *c).collect();
        scale_values.push(0.0);
        let (lower, upper) = generate_scale(&scale_values)?;

        let unit = if by_continent { "continent" } else { "country" };
        Some(ChartSpec {
            kind: request.kind,
            scope: request.scope,
            metric,
            title: format!("Covid-19 {} by {}", metric.label(), unit),
            encoding: Encoding {
                x: Some(Axis {
                    field: metric.column().to_string(),
                    label: capitalize(metric.label()),
                    range: [lower, upper],
                }),
                groups: kept
                    .iter()
                    .enumerate()
                    .map(|(i, name)| GroupColor {
                        name: name.to_string(),
                        color: group_color(i).to_string(),
                    })
                    .collect(),
                ..Encoding::default()
            },
            frames: frames
                .into_iter()
                .map(|(date, points)| Frame { date, points })
                .collect(),
        })
    }

    fn scatter_chart(request: &ChartRequest, rows: &[ChartRow]) -> Option<ChartSpec> {
        let x_metric = request.metric;
        let y_metric = request.options.y_metric.unwrap_or(Metric::MortalityRate);
        let size = request.options.size.unwrap_or(SizeMetric::Population);

        let placed: Vec<&ChartRow> = rows
            .iter()
            .filter(|r| {
                r.size(size).is_some() && r.value(x_metric).is_some() && r.value(y_metric).is_some()
            })
            .collect();
        let rows = fit_dates(placed, |r| r.value(x_metric), request.options.fit_dates);
        if rows.is_empty() {
            return None;
        }

        let axis = |metric: Metric| {
            let max = rows
                .iter()
                .filter_map(|r| r.value(metric))
                .fold(f64::NEG_INFINITY, f64::max);
            let upper = scale_upper_limit(max);
            Axis {
                field: metric.column().to_string(),
                label: capitalize(metric.label()),
                range: [-0.1 * upper, upper],
            }
        };

        let mut frames: BTreeMap<NaiveDate, Vec<DataPoint>> = BTreeMap::new();
        for row in &rows {
            frames.entry(row.date).or_default().push(DataPoint {
                label: row.country.clone(),
                location: row.alpha_3_code.clone(),
                group: row.continent.clone(),
                value: row.value(x_metric),
                y: row.value(y_metric),
                size: row.size(size).map(|s| s.max(0.0)),
            });
        }

        let continents: BTreeSet<&str> = rows.iter().filter_map(|r| r.continent.as_deref()).collect();

        Some(ChartSpec {
            kind: request.kind,
            scope: request.scope,
            metric: x_metric,
            title: format!(
                "Covid-19 {} vs {} by continent & country",
                x_metric.label(),
                y_metric.label()
            ),
            encoding: Encoding {
                x: Some(axis(x_metric)),
                y: Some(axis(y_metric)),
                size: Some(SizeEncoding {
                    field: size.column().to_string(),
                    max_px: SIZE_MAX_PX,
                }),
                facet: request.options.facet.map(|direction| FacetEncoding {
                    field: "continent".to_string(),
                    direction,
                }),
                groups: continents
                    .iter()
                    .enumerate()
                    .map(|(i, name)| GroupColor {
                        name: name.to_string(),
                        color: group_color(i).to_string(),
                    })
                    .collect(),
                ..Encoding::default()
            },
            frames: frames
                .into_iter()
                .map(|(date, points)| Frame { date, points })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::{Facet, PALETTE};
    use crate::data::{
        CaseRecord, Continent, CountryCode, CountryCodeTable, CountryNameNormalizer,
        DataProcessor, RegionEntry, RegionTable,
    };

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, day).unwrap()
    }

    /// Italy and France in Europe, Brazil in South America, three dates.
    fn table() -> CountryTable {
        let normalizer = CountryNameNormalizer::new();
        let countries = [
            ("Italy", "IT", "ITA", 1000.0, Continent::Europe, [0, 10, 5], [0, 1, 0]),
            ("France", "FR", "FRA", 2000.0, Continent::Europe, [0, 0, 20], [0, 0, 2]),
            ("Brazil", "BR", "BRA", 4000.0, Continent::SouthAmerica, [4, 0, 0], [0, 0, 1]),
        ];

        let mut records = Vec::new();
        for (name, _, a3, _, _, cases, deaths) in &countries {
            for day in 0..3 {
                records.push(CaseRecord {
                    date: date(day as u32 + 1),
                    country: name.to_string(),
                    cases: cases[day],
                    deaths: deaths[day],
                    alpha_2_code: None,
                    alpha_3_code: Some(a3.to_string()),
                    population: None,
                    continent: None,
                });
            }
        }

        let codes = CountryCodeTable::from_entries(
            countries.iter().map(|(name, a2, a3, pop, ..)| CountryCode {
                name: name.to_string(),
                alpha_2_code: a2.to_string(),
                alpha_3_code: a3.to_string(),
                population: Some(*pop),
            }),
            &normalizer,
        );
        let regions = RegionTable::from_entries(
            countries.iter().map(|(name, _, a3, _, continent, ..)| RegionEntry {
                country: name.to_string(),
                alpha_3_code: Some(a3.to_string()),
                continent: Some(*continent),
                region_1: None,
                region_2: None,
            }),
            &normalizer,
        );

        let (rows, summary) =
            DataProcessor::merge_country_level(&records, &codes, &regions, &normalizer, true);
        CountryTable::from_records(&rows, date(3), summary.unmatched).unwrap()
    }

    fn request(kind: ChartKind, scope: Scope, metric: Metric) -> ChartRequest {
        ChartRequest::new(kind, scope, metric)
    }

    fn frame_values(spec: &ChartSpec, frame: usize) -> Vec<(String, Option<f64>)> {
        spec.frames[frame]
            .points
            .iter()
            .map(|p| (p.label.clone(), p.value))
            .collect()
    }

    #[test]
    fn world_choropleth_has_a_frame_per_date() {
        let table = table();
        let spec = ChartGenerator::new(&table)
            .generate_from_str("choropleth", "world", "cum_cases")
            .unwrap();

        assert_eq!(spec.title, "Covid-19 cumulative cases by country");
        assert_eq!(spec.dates(), vec![date(1), date(2), date(3)]);
        assert_eq!(
            frame_values(&spec, 2),
            vec![
                ("Brazil".to_string(), Some(4.0)),
                ("France".to_string(), Some(20.0)),
                ("Italy".to_string(), Some(15.0)),
            ]
        );
        assert_eq!(spec.frames[0].points[0].location.as_deref(), Some("BRA"));

        let color = spec.encoding.color.as_ref().unwrap();
        assert_eq!(color.range, [0.0, 20.0]);
        assert_eq!(color.label, "Cumulative cases");
        assert!(!color.log);
    }

    #[test]
    fn continent_scope_filters_and_fits_dates() {
        let table = table();
        let generator = ChartGenerator::new(&table);
        let europe = Scope::Continent(Continent::Europe);

        let spec = generator
            .generate(&request(ChartKind::Choropleth, europe, Metric::CumCases))
            .unwrap();
        // nothing positive in Europe on the first date
        assert_eq!(spec.dates(), vec![date(2), date(3)]);
        assert!(spec
            .frames
            .iter()
            .flat_map(|f| &f.points)
            .all(|p| p.group.as_deref() == Some("Europe")));

        let mut unfitted = request(ChartKind::Choropleth, europe, Metric::CumCases);
        unfitted.options.fit_dates = false;
        assert_eq!(generator.generate(&unfitted).unwrap().frames.len(), 3);
    }

    #[test]
    fn log_scale_uses_nice_positive_bounds() {
        let table = table();
        let mut req = request(ChartKind::Choropleth, Scope::World, Metric::CumCases);
        req.options.log_scale = true;
        let spec = ChartGenerator::new(&table).generate(&req).unwrap();

        let color = spec.encoding.color.unwrap();
        assert!(color.log);
        assert_eq!(color.range, [4.0, 25.0]);
    }

    #[test]
    fn scatter_geo_sizes_markers_by_metric() {
        let table = table();
        let spec = ChartGenerator::new(&table)
            .generate(&request(ChartKind::ScatterGeo, Scope::World, Metric::Cases))
            .unwrap();

        assert_eq!(spec.encoding.size.as_ref().unwrap().max_px, SIZE_MAX_PX);
        assert!(spec.encoding.color.is_none());
        let brazil = &spec.frames[0].points[0];
        assert_eq!(brazil.size, Some(4.0));
    }

    #[test]
    fn world_bars_group_by_continent_with_ratios_of_sums() {
        let table = table();
        let generator = ChartGenerator::new(&table);

        let spec = generator
            .generate(&request(ChartKind::Bar, Scope::World, Metric::CumCases))
            .unwrap();
        assert_eq!(spec.title, "Covid-19 cumulative cases by continent");
        assert_eq!(
            frame_values(&spec, 2),
            vec![
                ("Europe".to_string(), Some(35.0)),
                ("South America".to_string(), Some(4.0)),
            ]
        );
        assert_eq!(spec.encoding.x.as_ref().unwrap().range, [0.0, 37.5]);
        assert_eq!(spec.encoding.groups.len(), 2);

        let mortality = generator
            .generate(&request(ChartKind::Bar, Scope::World, Metric::MortalityRate))
            .unwrap();
        let last = mortality.frames.last().unwrap();
        let europe = last.points.iter().find(|p| p.label == "Europe").unwrap();
        assert!(close(europe.value.unwrap(), 3.0 / 35.0));

        let infected = generator
            .generate(&request(ChartKind::Bar, Scope::World, Metric::FractionInfected))
            .unwrap();
        let last = infected.frames.last().unwrap();
        let europe = last.points.iter().find(|p| p.label == "Europe").unwrap();
        assert!(close(europe.value.unwrap(), 35.0 / 3000.0));
    }

    #[test]
    fn bar_cutoff_and_top_n_trim_groups() {
        let table = table();
        let generator = ChartGenerator::new(&table);

        let mut cutoff = request(ChartKind::Bar, Scope::World, Metric::CumCases);
        cutoff.options.x_cutoff = Some(10.0);
        let spec = generator.generate(&cutoff).unwrap();
        assert!(spec
            .frames
            .iter()
            .all(|f| f.points.iter().all(|p| p.label == "Europe")));

        // cumulative: latest value decides, France 20 beats Italy 15
        let mut top = request(
            ChartKind::Bar,
            Scope::Continent(Continent::Europe),
            Metric::CumCases,
        );
        top.options.top_n = Some(1);
        let spec = generator.generate(&top).unwrap();
        assert_eq!(spec.title, "Covid-19 cumulative cases by country");
        assert_eq!(frame_values(&spec, 0), vec![("France".to_string(), Some(20.0))]);
        assert_eq!(spec.frames[0].points[0].location.as_deref(), Some("FRA"));

        // daily: the peak decides
        top.metric = Metric::Deaths;
        let spec = generator.generate(&top).unwrap();
        assert!(spec.frames.iter().all(|f| f.points[0].label == "France"));

        let mut none_left = request(ChartKind::Bar, Scope::World, Metric::CumCases);
        none_left.options.x_cutoff = Some(1_000.0);
        assert!(matches!(
            generator.generate(&none_left),
            Err(ChartError::NoData { .. })
        ));
    }

    #[test]
    fn scatter_plots_metric_pairs_by_continent() {
        let table = table();
        let mut req = request(ChartKind::Scatter, Scope::World, Metric::CumCases);
        req.options.y_metric = Some(Metric::CumDeaths);
        req.options.facet = Some(Facet::Col);
        let spec = ChartGenerator::new(&table).generate(&req).unwrap();

        assert_eq!(
            spec.title,
            "Covid-19 cumulative cases vs cumulative deaths by continent & country"
        );
        let x = spec.encoding.x.as_ref().unwrap();
        assert!(close(x.range[0], -2.5) && close(x.range[1], 25.0));
        let y = spec.encoding.y.as_ref().unwrap();
        assert!(close(y.range[1], 2.5));
        assert_eq!(spec.encoding.size.as_ref().unwrap().field, "population");
        assert_eq!(spec.encoding.facet.as_ref().unwrap().direction, Facet::Col);

        let names: Vec<&str> = spec.encoding.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Europe", "South America"]);
        let italy = spec.frames[2].points.iter().find(|p| p.label == "Italy").unwrap();
        assert_eq!((italy.value, italy.y, italy.size), (Some(15.0), Some(1.0), Some(1000.0)));
    }

    #[test]
    fn default_scatter_drops_points_without_mortality() {
        let table = table();
        let spec = ChartGenerator::new(&table)
            .generate(&request(ChartKind::Scatter, Scope::World, Metric::CumCases))
            .unwrap();

        // France has no cases before the last date
        assert!(spec.frames[0].points.iter().all(|p| p.label == "Brazil"));
        assert!(spec
            .frames
            .iter()
            .flat_map(|f| &f.points)
            .all(|p| p.y.is_some_and(|m| (0.0..=1.0).contains(&m))));
    }

    #[test]
    fn empty_or_invalid_selections_are_errors() {
        let table = table();
        let generator = ChartGenerator::new(&table);

        let oceania = request(
            ChartKind::Choropleth,
            Scope::Continent(Continent::Oceania),
            Metric::Cases,
        );
        assert!(matches!(
            generator.generate(&oceania),
            Err(ChartError::NoData { .. })
        ));

        let mut bad = request(ChartKind::Scatter, Scope::World, Metric::Cases);
        bad.options.top_n = Some(3);
        assert!(matches!(
            generator.generate(&bad),
            Err(ChartError::UnsupportedCombination { option: "top_n", .. })
        ));

        assert!(matches!(
            generator.generate_from_str("choropleth", "mars", "cases"),
            Err(ChartError::UnknownScope { .. })
        ));
    }

    #[test]
    fn serializes_to_json() {
        let table = table();
        let spec = ChartGenerator::new(&table)
            .generate(&request(ChartKind::Bar, Scope::World, Metric::Cases))
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&spec.to_json().unwrap()).unwrap();

        assert_eq!(json["kind"], "bar");
        assert_eq!(json["scope"], "world");
        assert_eq!(json["metric"], "cases");
        assert_eq!(json["frames"][0]["date"], "2020-03-01");
        assert_eq!(json["encoding"]["groups"][0]["color"], PALETTE[0]);
    }
}
