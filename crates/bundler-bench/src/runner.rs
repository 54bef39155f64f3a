//! Benchmark execution orchestration
//!
//! This module drives every configured build tool through one fixed
//! lifecycle per repetition and collects the six metrics of each run.
//!
//! # Lifecycle
//!
//! ```text
//! Idle → ServerStarting → ServerReady → PageLoading → PageLoaded
//!      → HmrTriggeringRoot → HmrTriggeringLeaf → HmrAwaiting → HmrComplete
//!      → ServerStopping → Cooldown → Building → BuildComplete → Done
//! ```
//!
//! Tools run strictly one after another: they share the project directory,
//! the probe files and often the port range. A failure in any phase aborts
//! that tool's run for the current repetition, the tool is cleaned up, and
//! the next tool starts.
//!
//! # Example
//!
//! ```no_run
//! use bundler_bench::{Config, runner::BenchmarkRunner};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_file("bench.toml")?;
//! let tools = config.descriptors();
//! let runner = BenchmarkRunner::new(config).await?;
//! let report = runner.run(&tools).await;
//!
//! for tool in &report.aggregate.tools {
//!     println!("{}: {:?}", tool.name, tool.average_ms(bundler_bench::Metric::RootHmr));
//! }
//! runner.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::aggregate::{AggregateResult, Aggregator, Metric, RunResult, ToolFailure, ToolMetrics};
use crate::browser::{BrowserDriver, ToolPage};
use crate::config::Config;
use crate::error::Result;
use crate::hmr::{epoch_millis, restore_all, HmrTarget, InstrumentedFile};
use crate::process::ToolProcess;
use crate::tool::BuildToolDescriptor;

/// Lifecycle phase of a single tool run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    ServerStarting,
    ServerReady,
    PageLoading,
    PageLoaded,
    HmrTriggeringRoot,
    HmrTriggeringLeaf,
    HmrAwaiting,
    HmrComplete,
    ServerStopping,
    Cooldown,
    Building,
    BuildComplete,
    Done,
}

impl Phase {
    /// The phase that follows this one; `None` after [`Phase::Done`]
    pub fn next(self) -> Option<Phase> {
        use Phase::*;
        let next = match self {
            Idle => ServerStarting,
            ServerStarting => ServerReady,
            ServerReady => PageLoading,
            PageLoading => PageLoaded,
            PageLoaded => HmrTriggeringRoot,
            HmrTriggeringRoot => HmrTriggeringLeaf,
            HmrTriggeringLeaf => HmrAwaiting,
            HmrAwaiting => HmrComplete,
            HmrComplete => ServerStopping,
            ServerStopping => Cooldown,
            Cooldown => Building,
            Building => BuildComplete,
            BuildComplete => Done,
            Done => return None,
        };
        Some(next)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks the active phase of one tool run and logs each transition
#[derive(Debug)]
pub struct PhaseTracker {
    tool: String,
    phase: Phase,
    entered: Instant,
}

impl PhaseTracker {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            phase: Phase::Idle,
            entered: Instant::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to the next phase
    ///
    /// Phases only ever advance in lifecycle order; anything else is a bug in
    /// the caller.
    pub fn advance(&mut self, to: Phase) {
        debug_assert_eq!(
            self.phase.next(),
            Some(to),
            "illegal transition {} -> {}",
            self.phase,
            to
        );
        debug!(
            tool = %self.tool,
            "{} -> {} after {}ms",
            self.phase,
            to,
            self.entered.elapsed().as_millis()
        );
        self.phase = to;
        self.entered = Instant::now();
    }
}

/// Results from a complete benchmark session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Name of the benchmark suite
    pub suite_name: String,
    /// Timestamp when the session started
    pub started_at: String,
    /// Total duration of the session
    pub total_duration_ms: u64,
    /// Raw measurements of every repetition
    pub runs: Vec<RunResult>,
    /// Averages over all repetitions
    pub aggregate: AggregateResult,
}

impl BenchmarkReport {
    /// Every tool run succeeded in every repetition
    pub fn passed(&self) -> bool {
        self.aggregate.failures.is_empty()
    }
}

/// The benchmark runner
///
/// Owns the browser for the whole session; call [`shutdown`](Self::shutdown)
/// when done.
pub struct BenchmarkRunner {
    config: Config,
    browser: BrowserDriver,
}

impl BenchmarkRunner {
    /// Launch the browser and prepare a runner for `config`
    pub async fn new(config: Config) -> Result<Self> {
        let browser = BrowserDriver::launch(&config.browser).await?;
        Ok(Self { config, browser })
    }

    /// Run all repetitions over `tools`
    ///
    /// Individual tool failures never abort the session; they are recorded
    /// in the report instead.
    #[instrument(skip(self, tools), fields(suite = %self.config.benchmark.name))]
    pub async fn run(&self, tools: &[BuildToolDescriptor]) -> BenchmarkReport {
        let start_time = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();
        let repetitions = self.config.benchmark.repetitions;

        info!("Running benchmark {} times", repetitions);
        info!(
            "Tools: {}",
            tools
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut aggregator = Aggregator::new();
        let mut runs = Vec::with_capacity(repetitions as usize);

        for repetition in 1..=repetitions {
            info!("Running repetition {}/{}", repetition, repetitions);
            let run = self.run_repetition(tools, repetition).await;
            aggregator.merge(&run);
            runs.push(run);
        }

        let aggregate = aggregator.finish();
        let report = BenchmarkReport {
            suite_name: self.config.benchmark.name.clone(),
            started_at,
            total_duration_ms: start_time.elapsed().as_millis() as u64,
            runs,
            aggregate,
        };

        if report.passed() {
            info!(
                "Benchmark '{}' completed in {}ms",
                report.suite_name, report.total_duration_ms
            );
        } else {
            warn!(
                "Benchmark '{}' completed with {} failed tool runs",
                report.suite_name,
                report.aggregate.failures.len()
            );
        }

        report
    }

    /// One pass over all tools
    async fn run_repetition(&self, tools: &[BuildToolDescriptor], repetition: u32) -> RunResult {
        let mut run = RunResult::new();

        for tool in tools {
            let mut tracker = PhaseTracker::new(&tool.name);
            match self.run_tool(tool, &mut tracker).await {
                Ok(metrics) => run.record(&tool.name, metrics),
                Err(e) => {
                    let phase = e.phase().unwrap_or(tracker.phase());
                    error!(tool = %tool.name, "Run failed in {}: {}", phase, e);
                    run.fail(ToolFailure {
                        tool: tool.name.clone(),
                        phase,
                        message: e.to_string(),
                        repetition,
                    });
                }
            }
            tokio::time::sleep(self.config.hmr.cooldown).await;
        }

        run
    }

    /// Full lifecycle for one tool
    ///
    /// The dev server is torn down on every exit path before this returns.
    #[instrument(skip(self, tracker), fields(tool = %tool.name))]
    async fn run_tool(
        &self,
        tool: &BuildToolDescriptor,
        tracker: &mut PhaseTracker,
    ) -> Result<ToolMetrics> {
        let mut process = ToolProcess::new(tool.clone(), &self.config.benchmark.project_dir)
            .with_stop_grace(self.config.timeouts.stop_grace);

        let result = self.measure(tool, &mut process, tracker).await;

        // No-op when the server was already stopped on the success path
        if let Err(e) = process.stop_server().await {
            warn!("Failed to stop dev server: {}", e);
        }

        result
    }

    async fn measure(
        &self,
        tool: &BuildToolDescriptor,
        process: &mut ToolProcess,
        tracker: &mut PhaseTracker,
    ) -> Result<ToolMetrics> {
        let timeouts = &self.config.timeouts;
        let mut metrics = ToolMetrics::new();

        tracker.advance(Phase::ServerStarting);
        info!("Starting dev server: {}", tool.start);
        let server_ms = process.start_server(timeouts.server_ready).await?;
        tracker.advance(Phase::ServerReady);

        let mut page = self.browser.open_page().await?;
        let probed = self
            .probe_page(tool, &mut page, tracker, server_ms, &mut metrics)
            .await;
        if let Err(e) = page.close().await {
            warn!("Failed to close page: {}", e);
        }
        probed?;

        tracker.advance(Phase::ServerStopping);
        process.stop_server().await?;

        tracker.advance(Phase::Cooldown);
        tokio::time::sleep(self.config.hmr.cooldown).await;

        tracker.advance(Phase::Building);
        let build_ms = process
            .build(timeouts.build, self.config.benchmark.build_completion)
            .await?;
        metrics.set(Metric::BuildTime, build_ms);
        info!("{} build time: {}ms", tool.name, build_ms);
        tracker.advance(Phase::BuildComplete);

        tracker.advance(Phase::Done);
        Ok(metrics)
    }

    /// Page load and HMR probes against the running dev server
    async fn probe_page(
        &self,
        tool: &BuildToolDescriptor,
        page: &mut ToolPage,
        tracker: &mut PhaseTracker,
        server_ms: f64,
        metrics: &mut ToolMetrics,
    ) -> Result<()> {
        let timeouts = &self.config.timeouts;
        let settle = self.config.hmr.settle_delay;

        tracker.advance(Phase::PageLoading);
        let latch = page.watch_hmr().await?;
        let url = tool.url();
        info!("Navigating to {}", url);
        let load_ms = page.navigate(&url, timeouts.navigation).await?;

        metrics.set(Metric::ServerStartTime, server_ms);
        metrics.set(Metric::OnLoadTime, load_ms);
        metrics.set(Metric::Startup, server_ms + load_ms);
        info!(
            "{} startup time: {}ms (server {}ms + load {}ms)",
            tool.name,
            server_ms + load_ms,
            server_ms,
            load_ms
        );
        tracker.advance(Phase::PageLoaded);

        tokio::time::sleep(settle).await;

        tracker.advance(Phase::HmrTriggeringRoot);
        let mut root = InstrumentedFile::snapshot(self.config.root_file())?;
        root.append(&HmrTarget::Root.instrumentation())?;
        let root_started = epoch_millis();
        debug!("Edited {}", root.path().display());
        tokio::time::sleep(settle).await;

        tracker.advance(Phase::HmrTriggeringLeaf);
        let mut leaf = InstrumentedFile::snapshot(self.config.leaf_file())?;
        leaf.append(&HmrTarget::Leaf.instrumentation())?;
        let leaf_started = epoch_millis();
        debug!("Edited {}", leaf.path().display());

        tracker.advance(Phase::HmrAwaiting);
        let observed = latch.wait(Instant::now(), timeouts.hmr).await;
        let restored = restore_all(&mut [&mut root, &mut leaf]);
        let observed = observed?;
        restored?;

        let root_hmr = (observed.root - root_started) as f64;
        let leaf_hmr = (observed.leaf - leaf_started) as f64;
        metrics.set(Metric::RootHmr, root_hmr);
        metrics.set(Metric::LeafHmr, leaf_hmr);
        info!("{} root HMR time: {}ms", tool.name, root_hmr);
        info!("{} leaf HMR time: {}ms", tool.name, leaf_hmr);
        tracker.advance(Phase::HmrComplete);

        Ok(())
    }

    /// Close the browser
    pub async fn shutdown(self) -> Result<()> {
        self.browser.shutdown().await
    }
}
