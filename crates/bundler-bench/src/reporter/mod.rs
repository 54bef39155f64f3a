//! Benchmark result reporting
//!
//! This module formats a finished [`BenchmarkReport`] for people and for
//! other programs.
//!
//! # Output Formats
//!
//! - **Console**: table of per-tool averages plus the failed runs
//! - **JSON**: the complete report, including every repetition's raw values
//! - **Chart**: only the integer averages keyed by tool and metric
//!
//! # Example
//!
//! ```no_run
//! use bundler_bench::reporter::{Reporter, OutputFormat};
//! use bundler_bench::runner::BenchmarkReport;
//!
//! # fn example(report: BenchmarkReport) -> anyhow::Result<()> {
//! Reporter::new(OutputFormat::Console).report(&report)?;
//!
//! Reporter::new(OutputFormat::Chart)
//!     .write_to_file(&report, "chart-data.json")?;
//! # Ok(())
//! # }
//! ```

mod console;
mod json;

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::runner::BenchmarkReport;

pub use console::ConsoleReporter;
pub use json::JsonReporter;

/// Output format for benchmark results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Console,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Averages only, as pretty-printed JSON
    Chart,
}

/// Reporter for benchmark results
pub struct Reporter {
    format: OutputFormat,
}

impl Reporter {
    /// Create a new reporter with the specified output format
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Report results to stdout
    pub fn report(&self, report: &BenchmarkReport) -> Result<()> {
        let output = self.format_results(report)?;
        print!("{}", output);
        io::stdout().flush()?;
        Ok(())
    }

    /// Write results to a file
    pub fn write_to_file<P: AsRef<Path>>(&self, report: &BenchmarkReport, path: P) -> Result<()> {
        let path = path.as_ref();
        let output = self.format_results(report)?;
        fs::write(path, output)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    /// Format results as a string
    pub fn format_results(&self, report: &BenchmarkReport) -> Result<String> {
        match self.format {
            OutputFormat::Console => ConsoleReporter::format(report),
            OutputFormat::Json => JsonReporter::format(report, false),
            OutputFormat::JsonPretty => JsonReporter::format(report, true),
            OutputFormat::Chart => JsonReporter::format_chart(report),
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(OutputFormat::default())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aggregate::{Aggregator, Metric, RunResult, ToolFailure, ToolMetrics};
    use crate::runner::Phase;

    pub(crate) fn sample_report() -> BenchmarkReport {
        let mut metrics = ToolMetrics::new();
        for (metric, value) in [
            (Metric::Startup, 1250.0),
            (Metric::ServerStartTime, 234.0),
            (Metric::OnLoadTime, 1016.0),
            (Metric::RootHmr, 41.0),
            (Metric::LeafHmr, 37.0),
            (Metric::BuildTime, 1500.0),
        ] {
            metrics.set(metric, value);
        }

        let mut run = RunResult::new();
        run.record("Farm 1.3.0", metrics);
        run.fail(ToolFailure {
            tool: "Webpack 5.91.0 (swc)".to_string(),
            phase: Phase::ServerStarting,
            message: "`npm run start:webpack` exited with code 1 before reporting a duration"
                .to_string(),
            repetition: 1,
        });

        let mut aggregator = Aggregator::new();
        aggregator.merge(&run);

        BenchmarkReport {
            suite_name: "Build tool benchmark".to_string(),
            started_at: "2024-01-01T00:00:00Z".to_string(),
            total_duration_ms: 5000,
            runs: vec![run],
            aggregate: aggregator.finish(),
        }
    }

    #[test]
    fn test_reporter_json_format() {
        let report = sample_report();
        let output = Reporter::new(OutputFormat::Json)
            .format_results(&report)
            .unwrap();

        assert!(output.contains("Build tool benchmark"));
        assert!(output.contains("Farm 1.3.0"));
    }

    #[test]
    fn test_reporter_console_format() {
        let report = sample_report();
        let output = Reporter::new(OutputFormat::Console)
            .format_results(&report)
            .unwrap();

        assert!(output.contains("Build tool benchmark"));
        assert!(output.contains("Farm 1.3.0"));
        assert!(output.contains("ServerStarting"));
    }

    #[test]
    fn test_write_to_file() {
        let report = sample_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.json");

        Reporter::new(OutputFormat::Chart)
            .write_to_file(&report, &path)
            .unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"buildTime\": 1500"));
    }

    #[test]
    fn test_default_format() {
        let reporter = Reporter::default();
        assert_eq!(reporter.format, OutputFormat::Console);
    }
}
