//! JSON reporter for benchmark results

use crate::runner::BenchmarkReport;
use anyhow::Result;

/// JSON format reporter
pub struct JsonReporter;

impl JsonReporter {
    /// Format the full report as JSON
    ///
    /// # Arguments
    ///
    /// * `report` - The benchmark report to format
    /// * `pretty` - Whether to pretty-print the JSON
    pub fn format(report: &BenchmarkReport, pretty: bool) -> Result<String> {
        let output = if pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };
        Ok(output)
    }

    /// Format only the averages: `{ "<tool>": { "<metric>": ms, ... }, ... }`
    pub fn format_chart(report: &BenchmarkReport) -> Result<String> {
        let mut output = serde_json::to_string_pretty(&report.aggregate.chart_data())?;
        output.push('\n');
        Ok(output)
    }
}
