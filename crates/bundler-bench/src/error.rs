//! Error types for the benchmark harness

use std::path::PathBuf;

use chromiumoxide::error::CdpError;
use thiserror::Error;

use crate::runner::Phase;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BenchError>;

/// Everything that can go wrong while benchmarking a build tool
#[derive(Error, Debug)]
pub enum BenchError {
    /// The tool's command could not be started at all
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool's process exited before printing the expected line
    #[error("`{command}` exited with {} before reporting a duration", describe_code(.code))]
    ProcessExited { command: String, code: Option<i32> },

    /// The served page could not be loaded
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// Instrumenting or restoring an HMR probe file failed
    #[error("I/O error on {}: {source}", .path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A phase did not reach its exit condition before its deadline
    #[error("Phase {phase} timed out after {elapsed_ms}ms")]
    PhaseTimeout { phase: Phase, elapsed_ms: u64 },

    /// Chrome DevTools Protocol failure
    #[error("Browser error: {0}")]
    Browser(#[from] CdpError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Build a [`BenchError::PhaseTimeout`] from the time the phase started
    pub fn timeout(phase: Phase, started: std::time::Instant) -> Self {
        BenchError::PhaseTimeout {
            phase,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Phase named by a timeout, if this is one
    pub fn phase(&self) -> Option<Phase> {
        match self {
            BenchError::PhaseTimeout { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    pub(crate) fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::FileIo {
            path: path.into(),
            source,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}
