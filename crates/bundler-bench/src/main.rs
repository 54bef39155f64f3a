//! Build tool benchmark binary
//!
//! Runs the configured tools against a front-end project and prints the
//! averaged startup, HMR and build times.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bundler_bench::config::Config;
use bundler_bench::reporter::{OutputFormat, Reporter};
use bundler_bench::runner::BenchmarkRunner;

#[derive(Parser, Debug)]
#[command(name = "bundler-bench")]
#[command(
    version,
    about = "Measure dev server startup, HMR and production build times of front-end build tools"
)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Front-end project directory (overrides the configuration)
    #[arg(short, long)]
    project_dir: Option<PathBuf>,

    /// Number of full passes over all tools (overrides the configuration)
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..))]
    repetitions: Option<u32>,

    /// Only run tools whose name contains one of these strings (case-insensitive)
    #[arg(short, long = "tool")]
    tools: Vec<String>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Chrome or Chromium executable
    #[arg(long)]
    browser: Option<PathBuf>,

    /// Output format for stdout
    #[arg(short, long, value_enum, default_value = "console")]
    format: Format,

    /// Also write the full JSON report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the averages as chart data to this file
    #[arg(long)]
    chart: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Console,
    Json,
    JsonPretty,
    Chart,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Console => OutputFormat::Console,
            Format::Json => OutputFormat::Json,
            Format::JsonPretty => OutputFormat::JsonPretty,
            Format::Chart => OutputFormat::Chart,
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(dir) = &args.project_dir {
        config.benchmark.project_dir = dir.clone();
    }
    if let Some(repetitions) = args.repetitions {
        config.benchmark.repetitions = repetitions;
    }
    if args.headful {
        config.browser.headless = false;
    }
    if let Some(browser) = &args.browser {
        config.browser.executable = Some(browser.clone());
    }

    Ok(config)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    let filters: Vec<String> = args.tools.iter().map(|t| t.to_lowercase()).collect();
    let tools: Vec<_> = config
        .descriptors()
        .into_iter()
        .filter(|tool| {
            filters.is_empty() || {
                let name = tool.name.to_lowercase();
                filters.iter().any(|f| name.contains(f))
            }
        })
        .collect();

    if tools.is_empty() {
        anyhow::bail!("No tool matches {:?}", args.tools);
    }

    info!("Project: {}", config.benchmark.project_dir.display());

    let runner = BenchmarkRunner::new(config)
        .await
        .context("Failed to launch browser")?;
    let report = runner.run(&tools).await;
    runner.shutdown().await?;

    Reporter::new(args.format.into()).report(&report)?;

    if let Some(path) = &args.output {
        Reporter::new(OutputFormat::JsonPretty).write_to_file(&report, path)?;
        info!("Report written to {}", path.display());
    }
    if let Some(path) = &args.chart {
        Reporter::new(OutputFormat::Chart).write_to_file(&report, path)?;
        info!("Chart data written to {}", path.display());
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logs go to stderr so stdout stays parseable for JSON output
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
