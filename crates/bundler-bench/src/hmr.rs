//! HMR probing
//!
//! HMR latency is measured by appending a `console.log` line to two source
//! files of the served app and waiting for the browser to print it:
//!
//! - the **root** file sits at the top of the component tree; the page logs
//!   `root hmr <Date.now()>` and the page's own timestamp is used;
//! - the **leaf** file is nested deep in the tree; the page logs `leaf hmr`
//!   and the time the harness receives the message is used.
//!
//! [`InstrumentedFile`] guarantees the files get their original bytes back on
//! every exit path, and [`HmrLatch`] waits for exactly the two named signals.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{BenchError, Result};
use crate::runner::Phase;

/// Literal the root file's instrumentation logs
pub const ROOT_MARKER: &str = "root hmr";
/// Literal the leaf file's instrumentation logs
pub const LEAF_MARKER: &str = "leaf hmr";

lazy_static! {
    static ref FIRST_INTEGER: Regex = Regex::new(r"(\d+)").unwrap();
}

/// Milliseconds since the Unix epoch, comparable with the page's `Date.now()`
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Which probe file a signal belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmrTarget {
    Root,
    Leaf,
}

impl HmrTarget {
    pub fn marker(&self) -> &'static str {
        match self {
            HmrTarget::Root => ROOT_MARKER,
            HmrTarget::Leaf => LEAF_MARKER,
        }
    }

    /// Source line appended to the probe file
    pub fn instrumentation(&self) -> String {
        format!("\nconsole.log('{}', Date.now());\n", self.marker())
    }
}

/// Recognise an HMR signal in a console message
///
/// Returns the target and the observation time in epoch milliseconds: the
/// timestamp embedded by the page for the root file, `received_at` for the
/// leaf file. A root message without a timestamp is ignored.
pub fn classify_console(text: &str, received_at: i64) -> Option<(HmrTarget, i64)> {
    if text.contains(ROOT_MARKER) {
        let stamp = FIRST_INTEGER
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok());
        match stamp {
            Some(stamp) => Some((HmrTarget::Root, stamp)),
            None => {
                warn!("Root HMR message without timestamp: {}", text);
                None
            }
        }
    } else if text.contains(LEAF_MARKER) {
        Some((HmrTarget::Leaf, received_at))
    } else {
        None
    }
}

/// A source file temporarily modified for an HMR probe
///
/// The original bytes are captured on creation and written back by
/// [`restore`](Self::restore) or, failing that, on drop.
#[derive(Debug)]
pub struct InstrumentedFile {
    path: PathBuf,
    original: Vec<u8>,
    dirty: bool,
}

impl InstrumentedFile {
    /// Snapshot the file's current content
    pub fn snapshot(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let original = fs::read(&path).map_err(|e| BenchError::file_io(&path, e))?;
        Ok(Self {
            path,
            original,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append text to the file
    pub fn append(&mut self, text: &str) -> Result<()> {
        // Marked first: a partial write still has to be undone
        self.dirty = true;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| BenchError::file_io(&self.path, e))?;
        file.write_all(text.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| BenchError::file_io(&self.path, e))
    }

    /// Write the original content back
    pub fn restore(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        fs::write(&self.path, &self.original).map_err(|e| BenchError::file_io(&self.path, e))?;
        self.dirty = false;
        debug!("Restored {}", self.path.display());
        Ok(())
    }
}

/// Restore several files, most recent edit first
///
/// Snapshots taken later may already contain earlier edits (both probes can
/// name the same file), so they are undone in reverse. Every file is
/// attempted; the first error is returned.
pub fn restore_all(files: &mut [&mut InstrumentedFile]) -> Result<()> {
    let mut first_err = None;
    for file in files.iter_mut().rev() {
        if let Err(e) = file.restore() {
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

impl Drop for InstrumentedFile {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("Could not restore HMR probe file: {}", e);
        }
    }
}

/// Sending half of the HMR latch, owned by the console listener
#[derive(Debug)]
pub struct HmrSignals {
    root: Option<oneshot::Sender<i64>>,
    leaf: Option<oneshot::Sender<i64>>,
}

impl HmrSignals {
    /// Record an observation; later duplicates for the same target are ignored
    pub fn record(&mut self, target: HmrTarget, observed_at: i64) {
        let slot = match target {
            HmrTarget::Root => &mut self.root,
            HmrTarget::Leaf => &mut self.leaf,
        };
        match slot.take() {
            Some(tx) => {
                let _ = tx.send(observed_at);
            }
            None => trace!("Ignoring repeated {:?} HMR signal", target),
        }
    }

    /// Both slots have been filled
    pub fn is_complete(&self) -> bool {
        self.root.is_none() && self.leaf.is_none()
    }
}

/// Observation times of both HMR signals, in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HmrObservation {
    pub root: i64,
    pub leaf: i64,
}

/// Receiving half: completes once both the root and the leaf signal arrived
#[derive(Debug)]
pub struct HmrLatch {
    root: oneshot::Receiver<i64>,
    leaf: oneshot::Receiver<i64>,
}

impl HmrLatch {
    pub fn channel() -> (HmrSignals, HmrLatch) {
        let (root_tx, root_rx) = oneshot::channel();
        let (leaf_tx, leaf_rx) = oneshot::channel();
        (
            HmrSignals {
                root: Some(root_tx),
                leaf: Some(leaf_tx),
            },
            HmrLatch {
                root: root_rx,
                leaf: leaf_rx,
            },
        )
    }

    /// Wait for both signals
    ///
    /// `started` marks the beginning of the [`Phase::HmrAwaiting`] deadline.
    ///
    /// # Errors
    ///
    /// [`BenchError::PhaseTimeout`] if either signal is missing when the
    /// deadline passes or the sending half is dropped before both arrive.
    pub async fn wait(self, started: Instant, deadline: Duration) -> Result<HmrObservation> {
        let remaining = deadline.saturating_sub(started.elapsed());
        let both = async { tokio::try_join!(self.root, self.leaf) };

        match tokio::time::timeout(remaining, both).await {
            Ok(Ok((root, leaf))) => Ok(HmrObservation { root, leaf }),
            Ok(Err(_)) => {
                // Listener ended early (page closed or crashed): report as a stalled phase
                Err(BenchError::timeout(Phase::HmrAwaiting, started))
            }
            Err(_) => Err(BenchError::timeout(Phase::HmrAwaiting, started)),
        }
    }
}
