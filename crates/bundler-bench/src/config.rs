//! Configuration parsing for benchmark runs
//!
//! This module provides TOML-based configuration for the benchmark session:
//! where the front-end project lives, which tools to run, the HMR probe
//! files, and the deadlines applied to every phase. Every section is
//! optional; an empty file benchmarks the built-in tool set.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::tool::{BuildToolDescriptor, BuildToolKind, CommandSpec};

/// Main configuration structure loaded from TOML files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session-wide settings
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    /// HMR probe files and delays
    #[serde(default)]
    pub hmr: HmrConfig,
    /// Per-phase deadlines
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Browser launch options
    #[serde(default)]
    pub browser: BrowserOptions,
    /// Tools to benchmark, in order. Empty means the built-in set.
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// this schema.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use bundler_bench::config::Config;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = Config::from_file("bench.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Example
    ///
    /// ```
    /// use bundler_bench::config::Config;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = Config::parse(r#"
    ///     [benchmark]
    ///     repetitions = 5
    ///
    ///     [[tools]]
    ///     name = "Vite"
    ///     kind = "vite"
    ///     start_script = "start:vite"
    ///     build_script = "build:vite"
    /// "#)?;
    /// assert_eq!(config.benchmark.repetitions, 5);
    /// # Ok(())
    /// # }
    /// ```
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(s).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.benchmark.repetitions == 0 {
            anyhow::bail!("benchmark.repetitions must be at least 1");
        }
        if self.benchmark.package_manager.trim().is_empty() {
            anyhow::bail!("benchmark.package_manager must not be empty");
        }
        if self.hmr.root_file == self.hmr.leaf_file {
            anyhow::bail!(
                "hmr.root_file and hmr.leaf_file must differ (both are {})",
                self.hmr.root_file.display()
            );
        }
        Ok(())
    }

    /// Absolute path of the root HMR probe file
    pub fn root_file(&self) -> PathBuf {
        self.benchmark.project_dir.join(&self.hmr.root_file)
    }

    /// Absolute path of the leaf HMR probe file
    pub fn leaf_file(&self) -> PathBuf {
        self.benchmark.project_dir.join(&self.hmr.leaf_file)
    }

    /// Resolve the configured tools into descriptors
    ///
    /// Display names get the version of the tool's npm package appended when
    /// the project's `package.json` lists it in `devDependencies`.
    pub fn descriptors(&self) -> Vec<BuildToolDescriptor> {
        let versions = PackageVersions::load(&self.benchmark.project_dir);
        let tools = if self.tools.is_empty() {
            default_tools()
        } else {
            self.tools.clone()
        };

        tools
            .iter()
            .map(|tool| tool.descriptor(&self.benchmark.package_manager, &versions))
            .collect()
    }
}

/// Session-wide benchmark settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Name shown in reports
    #[serde(default = "default_name")]
    pub name: String,
    /// Front-end project containing `package.json`, `node_modules` and the probe files
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    /// Program used as `<package_manager> run <script>` (default: npm)
    #[serde(default = "default_package_manager")]
    pub package_manager: String,
    /// Full passes over all tools (default: 3)
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    /// What ends the build phase
    #[serde(default)]
    pub build_completion: BuildCompletion,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            project_dir: default_project_dir(),
            package_manager: default_package_manager(),
            repetitions: default_repetitions(),
            build_completion: BuildCompletion::default(),
        }
    }
}

fn default_name() -> String {
    "Build tool benchmark".to_string()
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_package_manager() -> String {
    "npm".to_string()
}

fn default_repetitions() -> u32 {
    3
}

/// When a production build counts as finished
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildCompletion {
    /// As soon as the build summary line is printed. The build process may
    /// still be running (writing assets, flushing logs) when the next phase
    /// starts.
    #[default]
    OnMatch,
    /// After the summary line is printed and the build process has exited
    OnExit,
}

/// HMR probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HmrConfig {
    /// File at the top of the component tree, relative to `project_dir`
    #[serde(default = "default_root_file")]
    pub root_file: PathBuf,
    /// Deeply nested file, relative to `project_dir`
    #[serde(default = "default_leaf_file")]
    pub leaf_file: PathBuf,
    /// Delay before each file edit (default: 1000ms)
    #[serde(default = "default_settle_delay", with = "duration_ms")]
    pub settle_delay: Duration,
    /// Pause after stopping the server and after the build (default: 500ms)
    #[serde(default = "default_cooldown", with = "duration_ms")]
    pub cooldown: Duration,
}

impl Default for HmrConfig {
    fn default() -> Self {
        Self {
            root_file: default_root_file(),
            leaf_file: default_leaf_file(),
            settle_delay: default_settle_delay(),
            cooldown: default_cooldown(),
        }
    }
}

fn default_root_file() -> PathBuf {
    PathBuf::from("src/comps/triangle.jsx")
}

fn default_leaf_file() -> PathBuf {
    PathBuf::from("src/comps/triangle_1_1_2_1_2_2_1.jsx")
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_cooldown() -> Duration {
    Duration::from_millis(500)
}

/// Deadlines for phases that wait on an external signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Dev server "ready" line (default: 60s)
    #[serde(default = "default_server_ready", with = "duration_ms")]
    pub server_ready: Duration,
    /// Page navigation and load event (default: 60s)
    #[serde(default = "default_navigation", with = "duration_ms")]
    pub navigation: Duration,
    /// Both HMR signals after the leaf edit (default: 30s)
    #[serde(default = "default_hmr", with = "duration_ms")]
    pub hmr: Duration,
    /// Production build summary line (default: 120s)
    #[serde(default = "default_build", with = "duration_ms")]
    pub build: Duration,
    /// Time between SIGTERM and SIGKILL when stopping a server (default: 2s)
    #[serde(default = "default_stop_grace", with = "duration_ms")]
    pub stop_grace: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            server_ready: default_server_ready(),
            navigation: default_navigation(),
            hmr: default_hmr(),
            build: default_build(),
            stop_grace: default_stop_grace(),
        }
    }
}

fn default_server_ready() -> Duration {
    Duration::from_secs(60)
}

fn default_navigation() -> Duration {
    Duration::from_secs(60)
}

fn default_hmr() -> Duration {
    Duration::from_secs(30)
}

fn default_build() -> Duration {
    Duration::from_secs(120)
}

fn default_stop_grace() -> Duration {
    Duration::from_secs(2)
}

/// Browser launch options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserOptions {
    /// Run without a visible window (default: true)
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Chrome/Chromium binary; auto-detected when absent
    #[serde(default)]
    pub executable: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            executable: None,
        }
    }
}

fn default_headless() -> bool {
    true
}

/// One tool variant as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Display name, without version
    pub name: String,
    /// Output format family
    pub kind: BuildToolKind,
    /// Dev server port; defaults to the kind's usual port
    #[serde(default)]
    pub port: Option<u16>,
    /// package.json script starting the dev server
    pub start_script: String,
    /// package.json script running the production build
    pub build_script: String,
    /// Label the variant as a warm "(Hot)" run
    #[serde(default)]
    pub hot: bool,
    /// Suffix inserted after the version, e.g. "(swc)"
    #[serde(default)]
    pub variant: Option<String>,
    /// npm package whose version is appended to the name; defaults to the kind's package
    #[serde(default)]
    pub version_package: Option<String>,
}

impl ToolConfig {
    fn new(name: &str, kind: BuildToolKind, start: &str, build: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            port: None,
            start_script: start.to_string(),
            build_script: build.to_string(),
            hot: false,
            variant: None,
            version_package: None,
        }
    }

    fn variant(mut self, variant: &str) -> Self {
        self.variant = Some(variant.to_string());
        self
    }

    fn hot(mut self) -> Self {
        self.hot = true;
        self
    }

    /// Build the immutable descriptor used by the runner
    pub fn descriptor(
        &self,
        package_manager: &str,
        versions: &PackageVersions,
    ) -> BuildToolDescriptor {
        let package = self
            .version_package
            .as_deref()
            .unwrap_or_else(|| self.kind.version_package());

        let mut name = self.name.clone();
        if let Some(version) = versions.get(package) {
            name.push(' ');
            name.push_str(version);
        }
        if let Some(variant) = &self.variant {
            name.push(' ');
            name.push_str(variant);
        }
        if self.hot {
            name.push_str(if self.variant.is_some() { "(Hot)" } else { " (Hot)" });
        }

        BuildToolDescriptor {
            name,
            kind: self.kind,
            port: self.port.unwrap_or_else(|| self.kind.default_port()),
            start: CommandSpec::package_script(package_manager, &self.start_script),
            build: CommandSpec::package_script(package_manager, &self.build_script),
            hot: self.hot,
        }
    }
}

/// The tool set benchmarked when the configuration lists none
pub fn default_tools() -> Vec<ToolConfig> {
    use BuildToolKind::*;

    let base = [
        ToolConfig::new("Farm", Farm, "start:farm", "build:farm"),
        ToolConfig::new("Rsbuild", Rsbuild, "start:rsbuild", "build:rsbuild"),
        ToolConfig::new("Vite", Vite, "start:vite", "build:vite").variant("(swc)"),
        ToolConfig::new("Vite", Vite, "start:vite:babel", "build:vite").variant("(babel)"),
        ToolConfig::new("Webpack", Webpack, "start:webpack", "build:webpack").variant("(swc)"),
        ToolConfig::new("Webpack", Webpack, "start:webpack:babel", "build:webpack")
            .variant("(babel)"),
    ];

    base.into_iter()
        .flat_map(|tool| {
            let hot = tool.clone().hot();
            [tool, hot]
        })
        .collect()
}

/// Versions declared in the project's `package.json` `devDependencies`
#[derive(Debug, Clone, Default)]
pub struct PackageVersions {
    versions: HashMap<String, String>,
}

#[derive(Deserialize)]
struct PackageJson {
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: HashMap<String, String>,
}

impl PackageVersions {
    /// Read `<project_dir>/package.json`; a missing or malformed file yields no versions
    pub fn load(project_dir: &Path) -> Self {
        let path = project_dir.join("package.json");
        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                debug!("No package.json at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> serde_json::Result<Self> {
        let package: PackageJson = serde_json::from_str(content)?;
        let versions = package
            .dev_dependencies
            .into_iter()
            .map(|(name, range)| {
                let version = range.trim_start_matches(['^', '~']).to_string();
                (name, version)
            })
            .collect();
        Ok(Self { versions })
    }

    pub fn get(&self, package: &str) -> Option<&str> {
        self.versions.get(package).map(String::as_str)
    }
}

/// Serde module for serializing/deserializing Duration as milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.benchmark.repetitions, 3);
        assert_eq!(config.benchmark.package_manager, "npm");
        assert_eq!(config.benchmark.build_completion, BuildCompletion::OnMatch);
        assert_eq!(config.hmr.settle_delay, Duration::from_millis(1000));
        assert_eq!(config.hmr.cooldown, Duration::from_millis(500));
        assert_eq!(config.timeouts.navigation, Duration::from_secs(60));
        assert!(config.browser.headless);
        assert!(config.tools.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [benchmark]
            name = "Nightly"
            project_dir = "/work/app"
            package_manager = "pnpm"
            repetitions = 5
            build_completion = "on_exit"

            [hmr]
            root_file = "src/App.jsx"
            leaf_file = "src/deep/Leaf.jsx"
            settle_delay = 250
            cooldown = 100

            [timeouts]
            server_ready = 10000
            navigation = 15000
            hmr = 5000
            build = 30000
            stop_grace = 500

            [browser]
            headless = false
            executable = "/usr/bin/chromium"

            [[tools]]
            name = "Vite"
            kind = "vite"
            port = 3000
            start_script = "dev"
            build_script = "build"
            hot = true
        "#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.benchmark.name, "Nightly");
        assert_eq!(config.benchmark.repetitions, 5);
        assert_eq!(config.benchmark.build_completion, BuildCompletion::OnExit);
        assert_eq!(config.hmr.settle_delay, Duration::from_millis(250));
        assert_eq!(config.timeouts.hmr, Duration::from_millis(5000));
        assert_eq!(config.timeouts.stop_grace, Duration::from_millis(500));
        assert!(!config.browser.headless);
        assert_eq!(
            config.root_file(),
            PathBuf::from("/work/app/src/App.jsx")
        );

        let tools = config.descriptors();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].port, 3000);
        assert_eq!(tools[0].name, "Vite (Hot)");
        assert_eq!(tools[0].start.to_string(), "pnpm run dev");
        assert!(tools[0].hot);
    }

    #[test]
    fn test_identical_probe_files_rejected() {
        let err = Config::parse(
            "[hmr]\nroot_file = \"src/App.jsx\"\nleaf_file = \"src/App.jsx\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_zero_repetitions_rejected() {
        let err = Config::parse("[benchmark]\nrepetitions = 0\n").unwrap_err();
        assert!(err.to_string().contains("repetitions"));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let toml = r#"
            [[tools]]
            name = "Parcel"
            kind = "parcel"
            start_script = "start"
            build_script = "build"
        "#;
        assert!(Config::parse(toml).is_err());
    }

    #[test]
    fn test_default_tools_pair_cold_and_hot() {
        let tools = default_tools();
        assert_eq!(tools.len(), 12);
        for pair in tools.chunks(2) {
            assert!(!pair[0].hot);
            assert!(pair[1].hot);
            assert_eq!(pair[0].start_script, pair[1].start_script);
        }
    }

    #[test]
    fn test_descriptor_names_with_versions() {
        let versions = PackageVersions::parse(
            r#"{ "devDependencies": { "@farmfe/core": "^1.3.0", "vite": "~5.2.0" } }"#,
        )
        .unwrap();
        let tools: Vec<_> = default_tools()
            .iter()
            .map(|t| t.descriptor("npm", &versions))
            .collect();

        assert_eq!(tools[0].name, "Farm 1.3.0");
        assert_eq!(tools[1].name, "Farm 1.3.0 (Hot)");
        assert_eq!(tools[2].name, "Rsbuild");
        assert_eq!(tools[4].name, "Vite 5.2.0 (swc)");
        assert_eq!(tools[5].name, "Vite 5.2.0 (swc)(Hot)");
        assert_eq!(tools[6].start.to_string(), "npm run start:vite:babel");
        assert_eq!(tools[8].port, 8081);
    }

    #[test]
    fn test_configured_variant_label() {
        let config = Config::parse(
            r#"
            [[tools]]
            name = "Vite"
            kind = "vite"
            start_script = "start:vite"
            build_script = "build:vite"
            variant = "(swc)"
            "#,
        )
        .unwrap();
        let versions = PackageVersions::parse(r#"{ "devDependencies": { "vite": "^5.2.0" } }"#)
            .unwrap();

        let vite = config.tools[0].descriptor("pnpm", &versions);
        assert_eq!(vite.name, "Vite 5.2.0 (swc)");
    }

    #[test]
    fn test_package_versions_without_dev_dependencies() {
        let versions = PackageVersions::parse(r#"{ "name": "app" }"#).unwrap();
        assert_eq!(versions.get("vite"), None);
    }

    #[test]
    fn test_demo_config_parses() {
        let config = Config::parse(include_str!("../demos/bench.toml")).unwrap();
        assert_eq!(config.benchmark.repetitions, 5);
        assert_eq!(config.benchmark.build_completion, BuildCompletion::OnExit);
        assert_eq!(config.tools.len(), 3);
        assert!(config.tools[1].hot);
        assert_eq!(config.tools[2].port, Some(5173));
    }
}
