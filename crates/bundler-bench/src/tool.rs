//! Build tool descriptors
//!
//! Each benchmarked tool is described by an immutable [`BuildToolDescriptor`].
//! The output format of a tool is captured by the closed [`BuildToolKind`]
//! enum, so the patterns used to detect "server ready" and "build finished"
//! are chosen by exhaustive dispatch rather than configured as free-form
//! regular expressions.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::pattern::DurationPattern;

lazy_static! {
    static ref FARM_READY: DurationPattern = compile(r"Ready\s*in\s*(.+?)(m?s)");
    static ref FARM_BUILD: DurationPattern = compile(r"completed\s*in\s*(.+?)(m?s)");
    static ref RSBUILD_ANY: DurationPattern = compile(r"in\s*(.+?)(m?s)");
    static ref VITE_READY: DurationPattern = compile(r"ready\s*in\s*(.+?)(m?s)");
    static ref VITE_BUILD: DurationPattern = compile(r"built\s*in\s*(.+?)(m?s)");
    static ref WEBPACK_ANY: DurationPattern = compile(r"compiled\s+.+\sin\s*(.+?)(m?s)");
}

fn compile(source: &str) -> DurationPattern {
    DurationPattern::new(Regex::new(source).unwrap())
}

/// The supported families of build tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildToolKind {
    Farm,
    Rsbuild,
    Vite,
    Webpack,
}

impl BuildToolKind {
    /// Pattern matching the dev server's "ready" line
    pub fn ready_pattern(&self) -> &'static DurationPattern {
        match self {
            BuildToolKind::Farm => &FARM_READY,
            BuildToolKind::Rsbuild => &RSBUILD_ANY,
            BuildToolKind::Vite => &VITE_READY,
            BuildToolKind::Webpack => &WEBPACK_ANY,
        }
    }

    /// Pattern matching the production build's summary line
    pub fn build_pattern(&self) -> &'static DurationPattern {
        match self {
            BuildToolKind::Farm => &FARM_BUILD,
            BuildToolKind::Rsbuild => &RSBUILD_ANY,
            BuildToolKind::Vite => &VITE_BUILD,
            BuildToolKind::Webpack => &WEBPACK_ANY,
        }
    }

    /// Dev server port used when the configuration does not override it
    pub fn default_port(&self) -> u16 {
        match self {
            BuildToolKind::Farm => 9000,
            BuildToolKind::Rsbuild => 6532,
            BuildToolKind::Vite => 5173,
            BuildToolKind::Webpack => 8081,
        }
    }

    /// npm package whose version is shown next to the tool name
    pub fn version_package(&self) -> &'static str {
        match self {
            BuildToolKind::Farm => "@farmfe/core",
            BuildToolKind::Rsbuild => "@rsbuild/core",
            BuildToolKind::Vite => "vite",
            BuildToolKind::Webpack => "webpack",
        }
    }
}

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `<package_manager> run <script>`
    pub fn package_script(package_manager: &str, script: &str) -> Self {
        Self::new(package_manager, ["run", script])
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Static description of one benchmarked tool variant
///
/// Cold and "(Hot)" variants of the same tool share their commands; only the
/// display name and the `hot` flag differ. A hot variant runs right after its
/// cold sibling, so it starts against whatever caches the cold run left.
#[derive(Debug, Clone)]
pub struct BuildToolDescriptor {
    pub name: String,
    pub kind: BuildToolKind,
    pub port: u16,
    pub start: CommandSpec,
    pub build: CommandSpec,
    pub hot: bool,
}

impl BuildToolDescriptor {
    pub fn ready_pattern(&self) -> &'static DurationPattern {
        self.kind.ready_pattern()
    }

    pub fn build_pattern(&self) -> &'static DurationPattern {
        self.kind.build_pattern()
    }

    /// URL the dev server serves the app on
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_patterns_per_kind() {
        assert_eq!(
            BuildToolKind::Farm
                .ready_pattern()
                .parse_line("Ready in 234ms"),
            Some(234.0)
        );
        assert_eq!(
            BuildToolKind::Vite
                .ready_pattern()
                .parse_line("  VITE v5.2.0  ready in 417 ms"),
            Some(417.0)
        );
        assert_eq!(
            BuildToolKind::Rsbuild
                .ready_pattern()
                .parse_line("ready   built in 0.31 s"),
            Some(310.0)
        );
        assert_eq!(
            BuildToolKind::Webpack
                .ready_pattern()
                .parse_line("webpack 5.91.0 compiled successfully in 2110 ms"),
            Some(2110.0)
        );
    }

    #[test]
    fn test_build_patterns_per_kind() {
        assert_eq!(
            BuildToolKind::Farm
                .build_pattern()
                .parse_line("Build completed in 1.2s"),
            Some(1200.0)
        );
        assert_eq!(
            BuildToolKind::Vite
                .build_pattern()
                .parse_line("✓ built in 3.45s"),
            Some(3450.0)
        );
        // Vite's build pattern must not fire on the dev server banner
        assert_eq!(
            BuildToolKind::Vite
                .build_pattern()
                .parse_line("VITE v5.2.0  ready in 417 ms"),
            None
        );
    }

    #[test]
    fn test_package_script_command() {
        let cmd = CommandSpec::package_script("pnpm", "start:vite");
        assert_eq!(cmd.program, "pnpm");
        assert_eq!(cmd.args, vec!["run", "start:vite"]);
        assert_eq!(cmd.to_string(), "pnpm run start:vite");
    }

    #[test]
    fn test_descriptor_url() {
        let tool = BuildToolDescriptor {
            name: "Vite".to_string(),
            kind: BuildToolKind::Vite,
            port: 5173,
            start: CommandSpec::package_script("npm", "start:vite"),
            build: CommandSpec::package_script("npm", "build:vite"),
            hot: false,
        };
        assert_eq!(tool.url(), "http://localhost:5173");
    }

    #[test]
    fn test_kind_serde_names() {
        let kind: BuildToolKind = serde_json::from_str("\"webpack\"").unwrap();
        assert_eq!(kind, BuildToolKind::Webpack);
        assert_eq!(serde_json::to_string(&BuildToolKind::Rsbuild).unwrap(), "\"rsbuild\"");
    }
}
