//! Per-repetition results and their aggregation
//!
//! Each repetition produces a [`RunResult`]; an [`Aggregator`] folds them
//! into per-tool, per-metric sums and turns those into floor averages.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::runner::Phase;

/// The six measurements taken for every tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    /// Server ready time plus page load time
    Startup,
    /// Ready duration printed by the dev server
    ServerStartTime,
    /// Navigation start to the page's load event
    OnLoadTime,
    /// Root file edit to the page logging the root marker
    RootHmr,
    /// Leaf file edit to the harness receiving the leaf marker
    LeafHmr,
    /// Duration printed by the production build
    BuildTime,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Startup,
        Metric::ServerStartTime,
        Metric::OnLoadTime,
        Metric::RootHmr,
        Metric::LeafHmr,
        Metric::BuildTime,
    ];

    /// Column heading used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Startup => "startup(serverStartTime + onLoadTime)",
            Metric::ServerStartTime => "serverStartTime",
            Metric::OnLoadTime => "onLoadTime",
            Metric::RootHmr => "rootHmr",
            Metric::LeafHmr => "leafHmr",
            Metric::BuildTime => "buildTime",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metric values for one tool in one repetition, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolMetrics {
    values: BTreeMap<Metric, f64>,
}

impl ToolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, metric: Metric, ms: f64) {
        self.values.insert(metric, ms);
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    /// All six metrics are present
    pub fn is_complete(&self) -> bool {
        Metric::ALL.iter().all(|m| self.values.contains_key(m))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.values.iter().map(|(m, v)| (*m, *v))
    }
}

/// A tool run that was aborted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    /// Display name of the tool
    pub tool: String,
    /// Phase that was active when the run failed
    pub phase: Phase,
    /// Error description
    pub message: String,
    /// Repetition index, starting at 1
    pub repetition: u32,
}

/// Everything measured during one pass over all tools
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    /// Completed tool runs, in execution order
    pub tools: Vec<(String, ToolMetrics)>,
    /// Aborted tool runs
    pub failures: Vec<ToolFailure>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tool: impl Into<String>, metrics: ToolMetrics) {
        self.tools.push((tool.into(), metrics));
    }

    pub fn fail(&mut self, failure: ToolFailure) {
        self.failures.push(failure);
    }

    pub fn get(&self, tool: &str) -> Option<&ToolMetrics> {
        self.tools
            .iter()
            .find(|(name, _)| name == tool)
            .map(|(_, metrics)| metrics)
    }
}

/// Sum and sample count for one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAccumulator {
    pub sum: f64,
    pub count: u32,
}

impl MetricAccumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// `floor(sum / count)`, or `None` without samples
    pub fn average_ms(&self) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        Some((self.sum / self.count as f64).floor() as u64)
    }
}

/// Accumulates [`RunResult`]s across repetitions
///
/// Only complete tool runs are merged. A tool that failed in some
/// repetitions is averaged over the repetitions it completed; a tool that
/// never completed has no averages and shows up only in the failures.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    order: Vec<String>,
    sums: BTreeMap<String, BTreeMap<Metric, MetricAccumulator>>,
    failures: Vec<ToolFailure>,
    repetitions: u32,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one repetition into the running sums
    pub fn merge(&mut self, run: &RunResult) {
        self.repetitions += 1;

        for (tool, metrics) in &run.tools {
            if !metrics.is_complete() {
                tracing::warn!("Skipping incomplete results for {}", tool);
                continue;
            }
            if !self.sums.contains_key(tool) {
                self.order.push(tool.clone());
            }
            let sums = self.sums.entry(tool.clone()).or_default();
            for (metric, value) in metrics.iter() {
                sums.entry(metric).or_default().add(value);
            }
        }

        self.failures.extend(run.failures.iter().cloned());
    }

    /// Compute the averages
    pub fn finish(&self) -> AggregateResult {
        let tools = self
            .order
            .iter()
            .map(|name| {
                let metrics = self.sums[name]
                    .iter()
                    .map(|(metric, acc)| (*metric, *acc))
                    .collect();
                ToolAggregate {
                    name: name.clone(),
                    metrics,
                }
            })
            .collect();

        AggregateResult {
            repetitions: self.repetitions,
            tools,
            failures: self.failures.clone(),
        }
    }
}

/// Accumulated metrics for one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolAggregate {
    pub name: String,
    pub metrics: BTreeMap<Metric, MetricAccumulator>,
}

impl ToolAggregate {
    pub fn average_ms(&self, metric: Metric) -> Option<u64> {
        self.metrics.get(&metric).and_then(|acc| acc.average_ms())
    }
}

/// Final averages over all repetitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Number of repetitions merged
    pub repetitions: u32,
    /// Per tool, in first-completed order
    pub tools: Vec<ToolAggregate>,
    /// Every aborted tool run
    pub failures: Vec<ToolFailure>,
}

impl AggregateResult {
    pub fn tool(&self, name: &str) -> Option<&ToolAggregate> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Integer averages keyed by tool then metric, the shape chart renderers consume
    pub fn chart_data(&self) -> ChartData {
        let entries = self
            .tools
            .iter()
            .map(|tool| {
                let averages = tool
                    .metrics
                    .iter()
                    .filter_map(|(metric, acc)| acc.average_ms().map(|avg| (*metric, avg)))
                    .collect();
                (tool.name.clone(), averages)
            })
            .collect();
        ChartData { entries }
    }
}

/// Per-tool averages in run order
///
/// Serializes as a JSON object whose keys keep the order the tools ran in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartData {
    entries: Vec<(String, BTreeMap<Metric, u64>)>,
}

impl ChartData {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tools(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, tool: &str) -> Option<&BTreeMap<Metric, u64>> {
        self.entries
            .iter()
            .find(|(name, _)| name == tool)
            .map(|(_, averages)| averages)
    }
}

impl Serialize for ChartData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (tool, averages) in &self.entries {
            map.serialize_entry(tool, averages)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(values: [f64; 6]) -> ToolMetrics {
        let mut metrics = ToolMetrics::new();
        for (metric, value) in Metric::ALL.iter().zip(values) {
            metrics.set(*metric, value);
        }
        metrics
    }

    fn run_with(tool: &str, metrics: ToolMetrics) -> RunResult {
        let mut run = RunResult::new();
        run.record(tool, metrics);
        run
    }

    #[test]
    fn test_single_repetition_is_identity() {
        let mut agg = Aggregator::new();
        agg.merge(&run_with("Vite", complete([700.0, 500.0, 200.0, 30.0, 25.0, 1500.0])));

        let result = agg.finish();
        let vite = result.tool("Vite").unwrap();
        assert_eq!(vite.average_ms(Metric::Startup), Some(700));
        assert_eq!(vite.average_ms(Metric::ServerStartTime), Some(500));
        assert_eq!(vite.average_ms(Metric::OnLoadTime), Some(200));
        assert_eq!(vite.average_ms(Metric::RootHmr), Some(30));
        assert_eq!(vite.average_ms(Metric::LeafHmr), Some(25));
        assert_eq!(vite.average_ms(Metric::BuildTime), Some(1500));
    }

    #[test]
    fn test_identical_repetitions_average_to_same_value() {
        let metrics = complete([710.0, 510.0, 200.0, 31.0, 26.0, 1499.0]);
        let mut agg = Aggregator::new();
        for _ in 0..5 {
            agg.merge(&run_with("Farm", metrics.clone()));
        }

        let result = agg.finish();
        assert_eq!(result.repetitions, 5);
        let farm = result.tool("Farm").unwrap();
        for metric in Metric::ALL {
            assert_eq!(
                farm.average_ms(metric),
                metrics.get(metric).map(|v| v as u64)
            );
        }
    }

    #[test]
    fn test_build_time_average() {
        let mut agg = Aggregator::new();
        agg.merge(&run_with("Rsbuild", complete([1.0, 1.0, 1.0, 1.0, 1.0, 100.0])));
        agg.merge(&run_with("Rsbuild", complete([1.0, 1.0, 1.0, 1.0, 1.0, 200.0])));

        let result = agg.finish();
        assert_eq!(
            result.tool("Rsbuild").unwrap().average_ms(Metric::BuildTime),
            Some(150)
        );
    }

    #[test]
    fn test_average_floors() {
        let mut agg = Aggregator::new();
        agg.merge(&run_with("Webpack", complete([1.0, 1.0, 1.0, 1.0, 1.0, 100.0])));
        agg.merge(&run_with("Webpack", complete([1.0, 1.0, 1.0, 1.0, 2.0, 101.0])));

        let result = agg.finish();
        let webpack = result.tool("Webpack").unwrap();
        assert_eq!(webpack.average_ms(Metric::BuildTime), Some(100));
        assert_eq!(webpack.average_ms(Metric::LeafHmr), Some(1));
    }

    #[test]
    fn test_incomplete_runs_are_excluded() {
        let mut partial = ToolMetrics::new();
        partial.set(Metric::BuildTime, 10_000.0);

        let mut agg = Aggregator::new();
        agg.merge(&run_with("Vite", complete([1.0, 1.0, 1.0, 1.0, 1.0, 100.0])));
        agg.merge(&run_with("Vite", partial));

        let result = agg.finish();
        assert_eq!(result.repetitions, 2);
        let acc = result.tool("Vite").unwrap().metrics[&Metric::BuildTime];
        assert_eq!(acc.count, 1);
        assert_eq!(acc.average_ms(), Some(100));
    }

    #[test]
    fn test_failed_tool_has_no_averages() {
        let mut run = RunResult::new();
        run.fail(ToolFailure {
            tool: "Farm".to_string(),
            phase: Phase::ServerStarting,
            message: "exited with code 1".to_string(),
            repetition: 1,
        });

        let mut agg = Aggregator::new();
        agg.merge(&run);

        let result = agg.finish();
        assert!(result.tool("Farm").is_none());
        assert_eq!(result.failures.len(), 1);
        assert!(result.chart_data().is_empty());
    }

    #[test]
    fn test_tool_order_is_preserved() {
        let mut run = RunResult::new();
        run.record("Webpack", complete([1.0; 6]));
        run.record("Farm", complete([1.0; 6]));

        let mut agg = Aggregator::new();
        agg.merge(&run);

        let names: Vec<_> = agg.finish().tools.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Webpack", "Farm"]);
    }

    #[test]
    fn test_chart_data_keeps_run_order() {
        let mut run = RunResult::new();
        run.record("Webpack 5.91.0", complete([4.0; 6]));
        run.record("Farm 1.3.0", complete([1.0; 6]));
        run.record("Vite 5.2.0", complete([3.0; 6]));

        let mut agg = Aggregator::new();
        agg.merge(&run);
        let chart = agg.finish().chart_data();

        let tools: Vec<_> = chart.tools().collect();
        assert_eq!(tools, vec!["Webpack 5.91.0", "Farm 1.3.0", "Vite 5.2.0"]);
        assert_eq!(chart.get("Farm 1.3.0").unwrap()[&Metric::BuildTime], 1);

        let json = serde_json::to_string(&chart).unwrap();
        let webpack = json.find("Webpack").unwrap();
        let farm = json.find("Farm").unwrap();
        let vite = json.find("Vite").unwrap();
        assert!(webpack < farm && farm < vite, "{}", json);
    }

    #[test]
    fn test_chart_data_keys() {
        let mut agg = Aggregator::new();
        agg.merge(&run_with("Vite", complete([700.0, 500.0, 200.0, 30.0, 25.0, 1500.0])));

        let json = serde_json::to_string(&agg.finish().chart_data()).unwrap();
        assert!(json.contains("\"Vite\""));
        assert!(json.contains("\"serverStartTime\":500"));
        assert!(json.contains("\"buildTime\":1500"));
    }
}
