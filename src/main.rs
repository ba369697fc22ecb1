//! covid-dashboard - refreshes COVID-19 country data on a schedule and writes
//! the merged CSV plus the configured chart specifications, and the US
//! state-level CSV when a state source is configured.

use anyhow::{Context, Result};
use clap::Parser;
use covid_dashboard::charts::{ChartGenerator, ChartRequest};
use covid_dashboard::config::DashboardConfig;
use covid_dashboard::data::{
    CountryTable, CovidDataHandler, RefreshReport, EXPORT_FILE_NAME, STATE_EXPORT_FILE_NAME,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "COVID-19 country data refresh and chart generation"
)]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long, env = "COVID_DASHBOARD_CONFIG")]
    config: Option<PathBuf>,
    /// Refresh once and exit instead of polling.
    #[arg(long)]
    once: bool,
    /// Ignore today's cache files on the first refresh.
    #[arg(long)]
    force: bool,
    /// Overrides `refresh.output_dir`.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let mut config = DashboardConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(dir) = args.output_dir {
        config.refresh.output_dir = dir;
    }

    let output_dir = config.refresh.output_dir.clone();
    let interval = config.refresh.interval();
    let charts = config.charts.clone();
    let mut handler = CovidDataHandler::new(config).context("Failed to create data handler")?;
    info!(output = %output_dir.display(), charts = charts.len(), "startup");

    let mut force = args.force;
    loop {
        match run_cycle(&mut handler, &charts, &output_dir, force) {
            Ok(()) => {}
            Err(e) if args.once => return Err(e),
            Err(e) => error!("refresh cycle failed: {e:#}"),
        }
        if args.once {
            break;
        }
        force = false;
        info!(secs = interval.as_secs(), "next refresh scheduled");
        thread::sleep(interval);
    }

    Ok(())
}

fn run_cycle(
    handler: &mut CovidDataHandler,
    charts: &[ChartRequest],
    output_dir: &Path,
    force: bool,
) -> Result<()> {
    let report = handler.refresh(force).context("Data refresh failed")?;
    if report.used_fallback() {
        warn!("some sources were served from an older cache file");
    }
    let table = handler
        .table()
        .context("No country table after a successful refresh")?;

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    table.write_csv_file(&output_dir.join(EXPORT_FILE_NAME))?;
    write_report(&report, output_dir)?;
    write_charts(table, charts, output_dir)?;

    // state data is secondary: its failures never fail the cycle
    if let Err(e) = run_state_cycle(handler, output_dir, force) {
        warn!("state refresh failed: {e:#}");
    }
    Ok(())
}

fn run_state_cycle(handler: &mut CovidDataHandler, output_dir: &Path, force: bool) -> Result<()> {
    let Some(report) = handler
        .refresh_states(force)
        .context("State data refresh failed")?
    else {
        debug!("no US state source configured");
        return Ok(());
    };
    if report.used_fallback() {
        warn!("some state sources were served from an older cache file");
    }
    let table = handler
        .state_table()
        .context("No state table after a successful refresh")?;
    table.write_csv_file(&output_dir.join(STATE_EXPORT_FILE_NAME))?;
    write_json(&report, &output_dir.join("state_refresh_report.json"))
}

fn write_report(report: &RefreshReport, output_dir: &Path) -> Result<()> {
    write_json(report, &output_dir.join("refresh_report.json"))
}

fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// One JSON file per configured chart. A chart that cannot be built is
/// logged and skipped.
fn write_charts(table: &CountryTable, charts: &[ChartRequest], output_dir: &Path) -> Result<()> {
    let generator = ChartGenerator::new(table);

    for (i, request) in charts.iter().enumerate() {
        let name = format!(
            "chart_{:02}_{}_{}_{}.json",
            i + 1,
            request.kind,
            request.scope.name().replace(' ', "_"),
            request.metric
        );
        match generator.generate(request) {
            Ok(spec) => {
                let path = output_dir.join(&name);
                fs::write(&path, spec.to_json()?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(chart = %name, frames = spec.frames.len(), "chart written");
            }
            Err(e) => warn!(chart = %name, "chart skipped: {e}"),
        }
    }
    Ok(())
}
