//! Benchmark harness for JavaScript build tools
//!
//! This crate measures how fast front-end build tools (Farm, Rsbuild, Vite,
//! Webpack) start a dev server, serve the first page, apply hot module
//! replacement, and produce a production build. All tools run against the
//! same project, one after another, and the results are averaged over
//! several repetitions.
//!
//! # Metrics
//!
//! - **serverStartTime**: the duration the dev server prints when ready
//! - **onLoadTime**: navigation start to the page's load event
//! - **startup**: the sum of the two above
//! - **rootHmr / leafHmr**: edit of a top-level / deeply nested component
//!   until the browser runs the updated code
//! - **buildTime**: the duration the production build prints
//!
//! # Example
//!
//! ```no_run
//! use bundler_bench::{Config, runner::BenchmarkRunner, reporter::{Reporter, OutputFormat}};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_file("bench.toml")?;
//! let tools = config.descriptors();
//!
//! let runner = BenchmarkRunner::new(config).await?;
//! let report = runner.run(&tools).await;
//! runner.shutdown().await?;
//!
//! Reporter::new(OutputFormat::Console).report(&report)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Every section is optional:
//!
//! ```toml
//! [benchmark]
//! project_dir = "../examples/react"
//! package_manager = "pnpm"
//! repetitions = 5
//!
//! [hmr]
//! root_file = "src/comps/triangle.jsx"
//! leaf_file = "src/comps/triangle_1_1_2_1_2_2_1.jsx"
//!
//! [timeouts]
//! hmr = 10000
//!
//! [[tools]]
//! name = "Vite"
//! kind = "vite"
//! start_script = "start:vite"
//! build_script = "build:vite"
//! variant = "(swc)"
//! ```

pub mod aggregate;
pub mod browser;
pub mod config;
pub mod error;
pub mod hmr;
pub mod pattern;
pub mod process;
pub mod reporter;
pub mod runner;
pub mod tool;

// Re-export main types for convenience
pub use aggregate::{AggregateResult, Aggregator, ChartData, Metric, RunResult, ToolMetrics};
pub use config::Config;
pub use error::{BenchError, Result};
pub use reporter::{OutputFormat, Reporter};
pub use runner::{BenchmarkReport, BenchmarkRunner, Phase};
pub use tool::{BuildToolDescriptor, BuildToolKind};
