//! Chart Selection Module
//! Scope, metric and chart kind choices plus the per-kind options.

use crate::charts::ChartError;
use crate::data::Continent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Geographic scope of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    #[default]
    World,
    Continent(Continent),
}

impl Scope {
    pub fn all() -> Vec<Scope> {
        std::iter::once(Scope::World)
            .chain(Continent::ALL.into_iter().map(Scope::Continent))
            .collect()
    }

    pub fn name(self) -> String {
        match self {
            Scope::World => "world".to_string(),
            Scope::Continent(c) => c.label().to_lowercase(),
        }
    }

    fn allowed() -> String {
        Self::all()
            .into_iter()
            .map(Scope::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Scope {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("world") {
            return Ok(Scope::World);
        }
        s.parse::<Continent>()
            .map(Scope::Continent)
            .map_err(|_| ChartError::UnknownScope {
                value: s.to_string(),
                allowed: Self::allowed(),
            })
    }
}

impl TryFrom<String> for Scope {
    type Error = ChartError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.name()
    }
}

/// Metric columns of the country table a chart can plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Metric {
    Cases,
    Deaths,
    #[default]
    CumCases,
    CumDeaths,
    MortalityRate,
    FractionInfected,
    FractionDeaths,
    InfectionsGrowthRate,
    DeathsGrowthRate,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Cases,
        Metric::Deaths,
        Metric::CumCases,
        Metric::CumDeaths,
        Metric::MortalityRate,
        Metric::FractionInfected,
        Metric::FractionDeaths,
        Metric::InfectionsGrowthRate,
        Metric::DeathsGrowthRate,
    ];

    /// Column holding the metric in the country table.
    pub fn column(self) -> &'static str {
        match self {
            Metric::Cases => "cases",
            Metric::Deaths => "deaths",
            Metric::CumCases => "cum_cases",
            Metric::CumDeaths => "cum_deaths",
            Metric::MortalityRate => "mortality_rate",
            Metric::FractionInfected => "fraction_infected",
            Metric::FractionDeaths => "fraction_deaths",
            Metric::InfectionsGrowthRate => "infections_growth_rate",
            Metric::DeathsGrowthRate => "deaths_growth_rate",
        }
    }

    /// Human readable label used in titles and legends.
    pub fn label(self) -> &'static str {
        match self {
            Metric::Cases => "new cases",
            Metric::Deaths => "new deaths",
            Metric::CumCases => "cumulative cases",
            Metric::CumDeaths => "cumulative deaths",
            Metric::MortalityRate => "mortality rate",
            Metric::FractionInfected => "% of pop. infected",
            Metric::FractionDeaths => "% of pop. dead",
            Metric::InfectionsGrowthRate => "infections growth rate",
            Metric::DeathsGrowthRate => "deaths growth rate",
        }
    }

    pub fn is_cumulative(self) -> bool {
        matches!(self, Metric::CumCases | Metric::CumDeaths)
    }

    fn allowed() -> String {
        Self::ALL
            .iter()
            .map(|m| m.column())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Metric {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.column() == key)
            .ok_or_else(|| ChartError::UnknownMetric {
                value: s.to_string(),
                allowed: Self::allowed(),
            })
    }
}

impl TryFrom<String> for Metric {
    type Error = ChartError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Metric> for String {
    fn from(metric: Metric) -> Self {
        metric.column().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChartKind {
    #[default]
    Choropleth,
    ScatterGeo,
    Bar,
    Scatter,
}

impl ChartKind {
    pub const ALL: [ChartKind; 4] = [
        ChartKind::Choropleth,
        ChartKind::ScatterGeo,
        ChartKind::Bar,
        ChartKind::Scatter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChartKind::Choropleth => "choropleth",
            ChartKind::ScatterGeo => "scatter_geo",
            ChartKind::Bar => "bar",
            ChartKind::Scatter => "scatter",
        }
    }

    pub fn is_map(self) -> bool {
        matches!(self, ChartKind::Choropleth | ChartKind::ScatterGeo)
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChartKind {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.name() == key)
            .ok_or_else(|| ChartError::UnknownKind {
                value: s.to_string(),
                allowed: Self::ALL.map(ChartKind::name).join(", "),
            })
    }
}

impl TryFrom<String> for ChartKind {
    type Error = ChartError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChartKind> for String {
    fn from(kind: ChartKind) -> Self {
        kind.name().to_string()
    }
}

/// What sizes the markers of a scatter plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SizeMetric {
    Population,
    Metric(Metric),
}

impl SizeMetric {
    pub fn column(self) -> &'static str {
        match self {
            SizeMetric::Population => "population",
            SizeMetric::Metric(m) => m.column(),
        }
    }
}

impl FromStr for SizeMetric {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "population" | "population_2018" => Ok(SizeMetric::Population),
            _ => s.parse().map(SizeMetric::Metric).map_err(|_| ChartError::UnknownOption {
                option: "size",
                value: s.to_string(),
                allowed: format!("population, {}", Metric::allowed()),
            }),
        }
    }
}

impl TryFrom<String> for SizeMetric {
    type Error = ChartError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SizeMetric> for String {
    fn from(size: SizeMetric) -> Self {
        size.column().to_string()
    }
}

/// Direction scatter plot subplots are laid out in, one per continent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    #[serde(alias = "column")]
    Col,
    Row,
}

/// Options refining a chart; each applies to specific chart kinds only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOptions {
    /// Drop dates before the metric first becomes positive.
    pub fit_dates: bool,
    /// Logarithmic color scale (choropleth).
    pub log_scale: bool,
    /// Hide bar groups whose value falls below this (bar).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_cutoff: Option<f64>,
    /// Keep the N largest bar groups (bar).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    /// Y axis metric, `mortality_rate` when unset (scatter).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_metric: Option<Metric>,
    /// Marker size, population when unset (scatter).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeMetric>,
    /// One subplot per continent (scatter, world scope).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet: Option<Facet>,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            fit_dates: true,
            log_scale: false,
            x_cutoff: None,
            top_n: None,
            y_metric: None,
            size: None,
            facet: None,
        }
    }
}

/// A full chart selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartRequest {
    pub kind: ChartKind,
    pub scope: Scope,
    pub metric: Metric,
    #[serde(flatten)]
    pub options: ChartOptions,
}

impl ChartRequest {
    pub fn new(kind: ChartKind, scope: Scope, metric: Metric) -> Self {
        Self {
            kind,
            scope,
            metric,
            options: ChartOptions::default(),
        }
    }

    /// Parse a selection from its textual form, case-insensitively.
    pub fn parse(kind: &str, scope: &str, metric: &str) -> Result<Self, ChartError> {
        Ok(Self::new(kind.parse()?, scope.parse()?, metric.parse()?))
    }

    pub fn with_options(mut self, options: ChartOptions) -> Self {
        self.options = options;
        self
    }

    /// Reject options the chart kind does not accept.
    pub fn validate(&self) -> Result<(), ChartError> {
        let opts = &self.options;
        let unsupported = |option: &'static str| ChartError::UnsupportedCombination {
            kind: self.kind,
            option,
        };

        if opts.log_scale && self.kind != ChartKind::Choropleth {
            return Err(unsupported("log_scale"));
        }
        if self.kind != ChartKind::Bar {
            if opts.x_cutoff.is_some() {
                return Err(unsupported("x_cutoff"));
            }
            if opts.top_n.is_some() {
                return Err(unsupported("top_n"));
            }
        }
        if self.kind != ChartKind::Scatter {
            if opts.y_metric.is_some() {
                return Err(unsupported("y_metric"));
            }
            if opts.size.is_some() {
                return Err(unsupported("size"));
            }
            if opts.facet.is_some() {
                return Err(unsupported("facet"));
            }
        }
        if opts.top_n == Some(0) {
            return Err(ChartError::InvalidOption {
                option: "top_n",
                reason: "must be at least 1".to_string(),
            });
        }
        if opts.x_cutoff.is_some_and(|c| !c.is_finite()) {
            return Err(ChartError::InvalidOption {
                option: "x_cutoff",
                reason: "must be a finite number".to_string(),
            });
        }
        if opts.facet.is_some() && self.scope != Scope::World {
            return Err(ChartError::InvalidOption {
                option: "facet",
                reason: format!("faceting by continent needs the world scope, not {}", self.scope),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        let request = ChartRequest::parse("Scatter_Geo", "North America", "CUM_DEATHS").unwrap();
        assert_eq!(request.kind, ChartKind::ScatterGeo);
        assert_eq!(request.scope, Scope::Continent(Continent::NorthAmerica));
        assert_eq!(request.metric, Metric::CumDeaths);
        assert_eq!("oceania".parse::<Scope>().unwrap().name(), "oceania");
    }

    #[test]
    fn unknown_values_list_the_accepted_ones() {
        let err = "antarctica".parse::<Scope>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("antarctica"));
        assert!(msg.contains("world, africa, asia, europe, north america, south america, oceania"));

        let msg = "r0".parse::<Metric>().unwrap_err().to_string();
        assert!(msg.contains("deaths_growth_rate"));

        let msg = "pie".parse::<ChartKind>().unwrap_err().to_string();
        assert!(msg.contains("choropleth, scatter_geo, bar, scatter"));
    }

    #[test]
    fn options_must_match_the_chart_kind() {
        let mut bar = ChartRequest::new(ChartKind::Bar, Scope::World, Metric::Cases);
        bar.options.top_n = Some(5);
        bar.options.x_cutoff = Some(100.0);
        bar.validate().unwrap();

        bar.options.log_scale = true;
        assert!(matches!(
            bar.validate(),
            Err(ChartError::UnsupportedCombination { option: "log_scale", .. })
        ));

        let mut map = ChartRequest::new(ChartKind::Choropleth, Scope::World, Metric::Cases);
        map.options.top_n = Some(3);
        assert!(map.validate().is_err());

        let mut scatter = ChartRequest::new(
            ChartKind::Scatter,
            Scope::Continent(Continent::Asia),
            Metric::CumCases,
        );
        scatter.options.size = Some(SizeMetric::Population);
        scatter.validate().unwrap();
        scatter.options.facet = Some(Facet::Col);
        assert!(matches!(
            scatter.validate(),
            Err(ChartError::InvalidOption { option: "facet", .. })
        ));
    }

    #[test]
    fn deserializes_flattened_options() {
        let request: ChartRequest = serde_json::from_str(
            r#"{"kind":"scatter","metric":"cum_cases","y_metric":"cum_deaths","size":"population_2018","facet":"row"}"#,
        )
        .unwrap();

        assert_eq!(request.scope, Scope::World);
        assert_eq!(request.options.y_metric, Some(Metric::CumDeaths));
        assert_eq!(request.options.size, Some(SizeMetric::Population));
        assert_eq!(request.options.facet, Some(Facet::Row));
        assert!(request.options.fit_dates);
        request.validate().unwrap();

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "scatter");
        assert_eq!(json["size"], "population");
    }
}
