mod aggregate;
mod config;
mod error;
mod filter;
mod parser;
mod pipeline;
mod plot;
mod report;
mod signals;
mod source;

use clap::Parser;
use config::{A2rpsConfig, Overrides};
use error::AppError;
use filter::DateRange;
use source::{FollowReader, InputSpec, LineSource};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const EXAMPLES: &str = "\
Examples:
  # Analyze the default log file
  a2rps

  # Follow a log file in real time
  a2rps -f /var/log/apache2/access.log

  # Write a plot to a2rps.svg (or --plot=out.svg)
  a2rps --plot /var/log/apache2/access.log

  # Read from stdin and filter by date
  zcat /var/log/apache2/*access.log* | a2rps - --fromdate 2025-11-01

  # Analyze specific requests
  zcat /var/log/apache2/*access.log* | grep wp-login | a2rps - --fromdate 2025-11-01";

/// Apache Requests Per Second: count requests per second in Apache access
/// logs, print or plot them, or follow a live log.
#[derive(Parser, Debug)]
#[command(name = "a2rps", version, about, after_help = EXAMPLES)]
pub struct Cli {
    /// Apache log file to analyze, `-` for stdin (default: from config,
    /// /var/log/apache2/access.log)
    #[arg(value_name = "LOGFILE")]
    logfile: Option<String>,

    /// Follow the log file in real time (like tail -f)
    #[arg(short, long)]
    follow: bool,

    /// Write an SVG plot instead of the text table (default path from config)
    #[arg(long, value_name = "PATH", num_args = 0..=1, require_equals = true)]
    plot: Option<Option<PathBuf>>,

    /// Only count requests on or after this date (YYYY-MM-DD)
    #[arg(long, value_name = "YYYY-MM-DD")]
    fromdate: Option<String>,

    /// Only count requests on or before this date (YYYY-MM-DD)
    #[arg(long, value_name = "YYYY-MM-DD")]
    todate: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Config file path
    #[arg(short, long, default_value = "a2rps.toml")]
    config: PathBuf,

    /// Follow-mode poll interval in milliseconds (overrides config)
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// Extra logging (line accounting, follow progress)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "run failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), AppError> {
    // Bad date flags fail before any input is touched.
    let range = DateRange::parse(cli.fromdate.as_deref(), cli.todate.as_deref())?;
    if !range.is_unbounded() {
        tracing::info!(from = ?range.from, to = ?range.to, "date filter active");
    }

    let mut config = A2rpsConfig::load(&cli.config)?;
    let plot_path = config.apply(&Overrides {
        log_file: cli.logfile.clone(),
        poll_interval_ms: cli.poll_interval_ms,
        plot: cli.plot.clone(),
    });
    let input = InputSpec::from_arg(&config.input.log_file);
    tracing::debug!(%input, follow = cli.follow, ?range, "resolved settings");

    if cli.follow {
        match input {
            InputSpec::Stdin => Err(AppError::FollowStdin),
            InputSpec::File(path) => {
                follow_mode(&path, range, &config, plot_path.as_deref(), cli.json).await
            }
        }
    } else {
        batch_mode(&input, range, &config, plot_path.as_deref(), cli.json).await
    }
}

async fn batch_mode(
    input: &InputSpec,
    range: DateRange,
    config: &A2rpsConfig,
    plot_path: Option<&Path>,
    json: bool,
) -> Result<(), AppError> {
    let mut source = LineSource::open(input).await?;
    let outcome = pipeline::run_batch(&mut source, range).await?;

    let mut out = std::io::stdout().lock();
    if json {
        report::write_json(&mut out, &outcome.buckets, &outcome.summary, &outcome.stats)?;
        out.flush()?;
        if let Some(path) = plot_path {
            write_plot(&mut std::io::stderr(), path, &outcome.buckets, config)?;
        }
        return Ok(());
    }
    match plot_path {
        Some(path) => write_plot(&mut out, path, &outcome.buckets, config)?,
        None => report::write_text(&mut out, &outcome.buckets, &outcome.summary)?,
    }
    out.flush()?;
    Ok(())
}

async fn follow_mode(
    path: &Path,
    range: DateRange,
    config: &A2rpsConfig,
    plot_path: Option<&Path>,
    json: bool,
) -> Result<(), AppError> {
    let mut reader = FollowReader::open(
        path,
        config.follow.poll_interval(),
        config.follow.replay_existing,
    )
    .await?;
    tracing::info!(path = %reader.path().display(), "following log file");

    let mut status = status_writer(json);
    report::write_follow_banner(&mut status)?;
    let mut sink = report::ConsoleSink::new(status);
    let outcome =
        pipeline::run_follow(&mut reader, range, &mut sink, signals::shutdown_signal()).await?;
    let mut status = sink.into_inner();
    report::write_follow_stopped(&mut status)?;

    let mut out = std::io::stdout().lock();
    if json {
        report::write_json(&mut out, &outcome.buckets, &outcome.summary, &outcome.stats)?;
    } else if outcome.buckets.is_empty() {
        writeln!(out, "No data to display")?;
    } else {
        report::write_summary(&mut out, &outcome.summary)?;
    }
    out.flush()?;
    if let Some(path) = plot_path {
        write_plot(&mut status, path, &outcome.buckets, config)?;
    }
    status.flush()?;
    Ok(())
}

/// Where human-readable progress goes. With `--json`, stdout carries only the
/// JSON document, so banners, live lines and plot notices move to stderr.
fn status_writer(json: bool) -> Box<dyn Write> {
    if json {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    }
}

fn write_plot<W: Write>(
    out: &mut W,
    path: &Path,
    buckets: &[aggregate::Bucket],
    config: &A2rpsConfig,
) -> Result<(), AppError> {
    if buckets.is_empty() {
        writeln!(out, "No data to plot")?;
        return Ok(());
    }
    plot::write_plot(path, buckets, &config.plot)?;
    writeln!(out, "Plot written to {}", path.display())?;
    Ok(())
}
