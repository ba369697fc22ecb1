//! Derived Metrics Module
//! Per-country cumulative totals, ratios and day-over-day growth rates.

/// New cases and deaths reported for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DailyCount {
    pub cases: i64,
    pub deaths: i64,
}

/// Metrics derived for one date of a country series.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivedMetrics {
    pub cum_cases: i64,
    pub cum_deaths: i64,
    pub mortality_rate: Option<f64>,
    pub fraction_infected: Option<f64>,
    pub fraction_deaths: Option<f64>,
    pub infections_growth_rate: Option<f64>,
    pub deaths_growth_rate: Option<f64>,
}

/// `numerator / denominator`, null when the denominator is not positive.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 && numerator.is_finite() && denominator.is_finite() {
        Some(numerator / denominator)
    } else {
        None
    }
}

/// `(current - previous) / previous`, null when `previous` is zero.
pub fn growth_rate(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        let rate = (current - previous) / previous;
        rate.is_finite().then_some(rate)
    }
}

/// Deaths over cases, null outside `[0, 1]`.
pub fn mortality_rate(cum_deaths: f64, cum_cases: f64) -> Option<f64> {
    ratio(cum_deaths, cum_cases).filter(|rate| (0.0..=1.0).contains(rate))
}

/// Compute metrics for a country series ordered by date ascending.
///
/// Negative daily values (retroactive corrections) contribute nothing to the
/// cumulative totals, which are therefore non-decreasing. Population based
/// fractions are null when `population` is unknown or not positive.
pub fn compute_series(daily: &[DailyCount], population: Option<f64>) -> Vec<DerivedMetrics> {
    let population = population.filter(|p| p.is_finite() && *p > 0.0);
    let mut out = Vec::with_capacity(daily.len());
    let mut cum_cases = 0i64;
    let mut cum_deaths = 0i64;
    let mut previous: Option<(i64, i64)> = None;

    for day in daily {
        cum_cases += day.cases.max(0);
        cum_deaths += day.deaths.max(0);

        let (infections_growth_rate, deaths_growth_rate) = match previous {
            Some((prev_cases, prev_deaths)) => (
                growth_rate(prev_cases as f64, cum_cases as f64),
                growth_rate(prev_deaths as f64, cum_deaths as f64),
            ),
            None => (None, None),
        };

        out.push(DerivedMetrics {
            cum_cases,
            cum_deaths,
            mortality_rate: mortality_rate(cum_deaths as f64, cum_cases as f64),
            fraction_infected: population.and_then(|p| ratio(cum_cases as f64, p)),
            fraction_deaths: population.and_then(|p| ratio(cum_deaths as f64, p)),
            infections_growth_rate,
            deaths_growth_rate,
        });
        previous = Some((cum_cases, cum_deaths));
    }

    out
}
