//! Incident Timeline Binary
//!
//! Runs the timeline pipeline over captured backend responses:
//! - incidents: processed incident intervals, optionally as chart rows
//! - alerts: processed alert intervals, optionally as chart rows
//! - table: alerts grouped by component
//! - watch: periodic table refresh until interrupted
//! - config: effective configuration

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use incident_timeline_core::{
    records::{Alert, ChartRow, GroupedAlert, Incident, TimeWindow},
    series::RawSeries,
    TimelineConfig,
};
use incident_timeline_ingestion::prelude::*;
use incident_timeline_pipeline::prelude::*;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Incident timeline CLI arguments
#[derive(Debug, Parser)]
#[clap(name = "timeline", version, about = "Reconstruct incident and alert timelines")]
struct Cli {
    /// Configuration file path (defaults apply when omitted)
    #[clap(short, long, env = "TIMELINE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "TIMELINE_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "TIMELINE_LOG_JSON", global = true)]
    log_json: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

/// Inputs shared by the processing subcommands
#[derive(Debug, Clone, Args)]
struct InputArgs {
    /// Incident series payload (JSON)
    #[clap(long)]
    incidents: PathBuf,

    /// Alert series payload (JSON)
    #[clap(long)]
    alerts: Option<PathBuf>,

    /// Evaluation time, RFC 3339 or epoch milliseconds (default: now)
    #[clap(long)]
    now: Option<String>,

    /// Visible window in days (overrides configuration)
    #[clap(long)]
    days: Option<u32>,

    /// Output as JSON
    #[clap(long)]
    json: bool,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Print processed incidents
    Incidents {
        #[clap(flatten)]
        input: InputArgs,

        /// Print chart rows instead of intervals
        #[clap(long)]
        chart: bool,
    },
    /// Print processed alerts
    Alerts {
        #[clap(flatten)]
        input: InputArgs,

        /// Print chart rows instead of intervals
        #[clap(long)]
        chart: bool,
    },
    /// Print alerts grouped by component
    Table {
        #[clap(flatten)]
        input: InputArgs,
    },
    /// Refresh the alerts table periodically until interrupted
    Watch {
        #[clap(flatten)]
        input: InputArgs,

        /// Refresh interval in seconds
        #[clap(long, default_value = "30")]
        interval: u64,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    info!("Starting incident-timeline v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Incidents { input, chart } => {
            let config = load_config(&cli, input.days)?;
            run_incidents_command(config, input, *chart).await
        }
        Commands::Alerts { input, chart } => {
            let config = load_config(&cli, input.days)?;
            run_alerts_command(config, input, *chart).await
        }
        Commands::Table { input } => {
            let config = load_config(&cli, input.days)?;
            run_table_command(config, input).await
        }
        Commands::Watch { input, interval } => {
            let config = load_config(&cli, input.days)?;
            run_watch_command(config, input.clone(), *interval).await
        }
        Commands::Config => {
            let config = load_config(&cli, None)?;
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

/// Load configuration from file (if given), then environment, then flags
fn load_config(cli: &Cli, days: Option<u32>) -> Result<TimelineConfig> {
    let config = match &cli.config {
        Some(path) => TimelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TimelineConfig::default(),
    };
    let mut config = config
        .apply_env_overrides()
        .context("Invalid environment override")?;

    if let Some(days) = days {
        config.window_days = days;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        window_days = config.window_days,
        gap_threshold_secs = config.gap_threshold_secs,
        "Configuration loaded"
    );
    Ok(config)
}

/// Parse `--now`: epoch milliseconds or RFC 3339
fn parse_now(value: Option<&str>) -> Result<DateTime<Utc>> {
    let Some(value) = value else {
        return Ok(Utc::now());
    };

    if let Ok(ms) = value.trim().parse::<i64>() {
        return DateTime::from_timestamp_millis(ms)
            .with_context(|| format!("Timestamp out of range: {}", value));
    }

    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid --now value: {}", value))
}

/// Read one payload file across the window, a day at a time
async fn fetch_series(path: &Path, window: &TimeWindow) -> Result<Vec<RawSeries>> {
    let source = FileSource::new(path);
    fetch_chunked(&source, window)
        .await
        .with_context(|| format!("Failed to read series from {}", path.display()))
}

/// Fetch both inputs and run one refresh cycle
async fn refresh(
    pipeline: &TimelinePipeline,
    input: &InputArgs,
    now: DateTime<Utc>,
) -> Result<TimelineSnapshot> {
    let window = pipeline.window(now);
    let incidents = fetch_series(&input.incidents, &window).await?;
    let alerts = match &input.alerts {
        Some(path) => fetch_series(path, &window).await?,
        None => Vec::new(),
    };
    Ok(pipeline.run(incidents, alerts, now))
}

/// Run the incidents subcommand
async fn run_incidents_command(config: TimelineConfig, input: &InputArgs, chart: bool) -> Result<()> {
    let pipeline = TimelinePipeline::new(config);
    let snapshot = refresh(&pipeline, input, parse_now(input.now.as_deref())?).await?;

    match (chart, input.json) {
        (true, true) => println!("{}", serde_json::to_string_pretty(&snapshot.incident_chart)?),
        (true, false) => print_chart(&snapshot.incident_chart),
        (false, true) => println!("{}", serde_json::to_string_pretty(&snapshot.incidents)?),
        (false, false) => print_incidents(&snapshot.incidents),
    }
    Ok(())
}

/// Run the alerts subcommand
async fn run_alerts_command(config: TimelineConfig, input: &InputArgs, chart: bool) -> Result<()> {
    if input.alerts.is_none() {
        bail!("--alerts is required for the alerts command");
    }

    let pipeline = TimelinePipeline::new(config);
    let snapshot = refresh(&pipeline, input, parse_now(input.now.as_deref())?).await?;

    match (chart, input.json) {
        (true, true) => println!("{}", serde_json::to_string_pretty(&snapshot.alert_chart)?),
        (true, false) => print_chart(&snapshot.alert_chart),
        (false, true) => println!("{}", serde_json::to_string_pretty(&snapshot.alerts)?),
        (false, false) => print_alerts(&snapshot.alerts),
    }
    Ok(())
}

/// Run the table subcommand
async fn run_table_command(config: TimelineConfig, input: &InputArgs) -> Result<()> {
    if input.alerts.is_none() {
        bail!("--alerts is required for the table command");
    }

    let pipeline = TimelinePipeline::new(config);
    let snapshot = refresh(&pipeline, input, parse_now(input.now.as_deref())?).await?;

    if input.json {
        println!("{}", serde_json::to_string_pretty(&snapshot.table)?);
    } else {
        print_table(&snapshot.table);
    }
    Ok(())
}

/// Run the watch subcommand.
///
/// Each tick supersedes the previous refresh if it is still running, so a
/// slow read never prints over a newer one.
async fn run_watch_command(config: TimelineConfig, input: InputArgs, interval: u64) -> Result<()> {
    if input.alerts.is_none() {
        bail!("--alerts is required for the watch command");
    }
    if interval == 0 {
        bail!("--interval must be greater than 0");
    }

    info!(interval_secs = interval, "Watching alerts table");
    watch_table(config, input, interval, shutdown_signal()).await
}

/// Refresh the table every `interval` seconds until `shutdown` completes
async fn watch_table<S>(config: TimelineConfig, input: InputArgs, interval: u64, shutdown: S) -> Result<()>
where
    S: std::future::Future<Output = ()>,
{
    let pipeline = Arc::new(TimelinePipeline::new(config));
    let registry = Arc::new(RefreshRegistry::new());
    let input = Arc::new(input);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval));

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let ticket = registry.begin("table");
                let task = tokio::spawn({
                    let pipeline = pipeline.clone();
                    let registry = registry.clone();
                    let input = input.clone();
                    let ticket = ticket.clone();
                    async move {
                        match refresh(&pipeline, &input, Utc::now()).await {
                            Ok(snapshot) => {
                                if let Some(snapshot) = registry.accept(&ticket, snapshot) {
                                    print_table(&snapshot.table);
                                }
                            }
                            Err(e) => error!(error = %e, "Refresh failed"),
                        }
                    }
                });
                registry.attach(&ticket, task);
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    registry.clear();
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down..."); },
        _ = terminate => { info!("Received SIGTERM, shutting down..."); },
    }
}

/// Render epoch seconds for humans
fn format_secs(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn print_incidents(incidents: &[Incident]) {
    println!(
        "{:<4} {:<24} {:<14} {:<10} {:<20} {:<20} {:<9}",
        "X", "GROUP", "COMPONENT", "SEVERITY", "START", "END", "STATE"
    );
    for incident in incidents {
        let state = match (incident.silenced, incident.resolved) {
            (true, _) => "silenced",
            (false, true) => "resolved",
            (false, false) => "firing",
        };
        println!(
            "{:<4} {:<24} {:<14} {:<10} {:<20} {:<20} {:<9}",
            incident.x,
            incident.group_id,
            incident.component,
            incident.src_severity,
            incident.start().map(format_secs).unwrap_or_default(),
            incident.values.last().map(|s| format_secs(s.timestamp)).unwrap_or_default(),
            state,
        );
    }
}

fn print_alerts(alerts: &[Alert]) {
    println!(
        "{:<4} {:<32} {:<14} {:<10} {:<20} {:<20} {:<9}",
        "X", "ALERT", "COMPONENT", "SEVERITY", "START", "END", "STATE"
    );
    for alert in alerts {
        println!(
            "{:<4} {:<32} {:<14} {:<10} {:<20} {:<20} {:<9}",
            alert.x,
            alert.alertname,
            alert.component,
            alert.severity,
            format_secs(alert.alerts_start_firing),
            format_secs(alert.alerts_end_firing),
            alert.state(),
        );
    }
}

fn print_table(rows: &[GroupedAlert]) {
    println!(
        "{:<16} {:<9} {:>8} {:>8} {:>8}",
        "COMPONENT", "STATE", "CRITICAL", "WARNING", "INFO"
    );
    for row in rows {
        println!(
            "{:<16} {:<9} {:>8} {:>8} {:>8}",
            row.component,
            row.alertstate.to_string(),
            row.critical,
            row.warning,
            row.info
        );
    }
}

fn print_chart(rows: &[ChartRow]) {
    for row in rows {
        println!("{} (x={})", row.name, row.x);
        for span in &row.spans {
            let label = if span.nodata {
                "nodata".to_string()
            } else {
                span.severity
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            };
            println!(
                "  {} .. {}  {}",
                span.y0.format("%Y-%m-%d %H:%M:%S%.3f"),
                span.y.format("%Y-%m-%d %H:%M:%S%.3f"),
                label
            );
        }
    }
}

/// Initialize logging based on CLI arguments.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .context("Invalid log level")?;

    if cli.log_json {
        // JSON structured logging
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    } else {
        // Human-readable logging
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    }

    info!("Logging initialized at level: {}", log_level);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_now_epoch_millis() {
        let now = parse_now(Some("2100000")).unwrap();
        assert_eq!(now.timestamp_millis(), 2_100_000);
    }

    #[test]
    fn test_parse_now_rfc3339() {
        let now = parse_now(Some("2024-03-01T12:00:00+02:00")).unwrap();
        assert_eq!(now.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_parse_now_invalid() {
        assert!(parse_now(Some("yesterday")).is_err());
    }

    #[test]
    fn test_cli_parses_table_command() {
        let cli = Cli::try_parse_from([
            "timeline",
            "--log-level",
            "debug",
            "table",
            "--incidents",
            "incidents.json",
            "--alerts",
            "alerts.json",
            "--days",
            "3",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Table { input } => {
                assert_eq!(input.days, Some(3));
                assert!(input.json);
                assert_eq!(input.alerts, Some(PathBuf::from("alerts.json")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_watch_stops_when_shutdown_fires_between_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let input = InputArgs {
            incidents: dir.path().join("incidents.json"),
            alerts: Some(dir.path().join("alerts.json")),
            now: None,
            days: None,
            json: false,
        };

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(());
        });
        let shutdown = async move {
            let _ = rx.await;
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            watch_table(TimelineConfig::default(), input, 3600, shutdown),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
    }
}
