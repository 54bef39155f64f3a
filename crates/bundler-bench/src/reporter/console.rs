//! Console reporter for benchmark results
//!
//! One row per tool, one column per metric, values are floor averages in
//! milliseconds. Tools without a completed run are listed under the failures.

use anyhow::Result;
use std::fmt::Write;

use crate::aggregate::{Metric, ToolAggregate};
use crate::runner::BenchmarkReport;

/// Console format reporter
pub struct ConsoleReporter;

impl ConsoleReporter {
    /// Format benchmark results for console output
    pub fn format(report: &BenchmarkReport) -> Result<String> {
        let mut output = String::new();
        let aggregate = &report.aggregate;

        writeln!(output)?;
        writeln!(output, "Suite:        {}", report.suite_name)?;
        writeln!(output, "Started:      {}", report.started_at)?;
        writeln!(output, "Duration:     {}ms", report.total_duration_ms)?;
        writeln!(output, "Repetitions:  {}", aggregate.repetitions)?;
        writeln!(output)?;

        if aggregate.tools.is_empty() {
            writeln!(output, "No tool completed a run.")?;
        } else {
            Self::format_table(&mut output, &aggregate.tools)?;
        }

        if !aggregate.failures.is_empty() {
            writeln!(output)?;
            writeln!(output, "Failures:")?;
            for failure in &aggregate.failures {
                writeln!(
                    output,
                    "  ✗ {} (run {}, {}): {}",
                    failure.tool, failure.repetition, failure.phase, failure.message
                )?;
            }
        }

        writeln!(output)?;
        Ok(output)
    }

    fn format_table(output: &mut String, tools: &[ToolAggregate]) -> Result<()> {
        let name_width = tools
            .iter()
            .map(|t| t.name.chars().count())
            .chain(std::iter::once("Tool".len()))
            .max()
            .unwrap_or(4);
        let widths: Vec<usize> = Metric::ALL.iter().map(|m| m.label().len()).collect();

        let separator = {
            let mut line = format!("├{}", "─".repeat(name_width + 2));
            for w in &widths {
                line.push('┼');
                line.push_str(&"─".repeat(w + 2));
            }
            line.push('┤');
            line
        };

        write!(output, "│ {:<name_width$} ", "Tool")?;
        for metric in Metric::ALL {
            write!(output, "│ {} ", metric.label())?;
        }
        writeln!(output, "│")?;
        writeln!(output, "{}", separator)?;

        for tool in tools {
            write!(output, "│ {:<name_width$} ", tool.name)?;
            for (metric, width) in Metric::ALL.iter().zip(&widths) {
                let value = tool
                    .average_ms(*metric)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".to_string());
                write!(output, "│ {:>width$} ", value, width = width)?;
            }
            writeln!(output, "│")?;
        }

        Ok(())
    }
}
