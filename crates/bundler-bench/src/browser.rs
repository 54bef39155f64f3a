//! Headless browser control via chromiumoxide
//!
//! One Chromium instance serves the whole benchmark session. Each tool run
//! gets a fresh [`ToolPage`], which measures the page load time and turns
//! console output into HMR signals.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               Browser Instance                │
//! ├──────────────────────────────────────────────┤
//! │  ToolPage (Farm)   → closed after HMR probe   │
//! │  ToolPage (Vite)   → closed after HMR probe   │
//! │  ...                                          │
//! └──────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::EventLoadEventFired;
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::BrowserOptions;
use crate::error::{BenchError, Result};
use crate::hmr::{classify_console, epoch_millis, HmrLatch};
use crate::runner::Phase;

/// The session-wide browser
pub struct BrowserDriver {
    browser: Browser,
    handler: JoinHandle<()>,
    profile: tempfile::TempDir,
}

impl BrowserDriver {
    /// Launch Chromium
    ///
    /// Uses `options.executable` when set, otherwise a Chrome for Testing
    /// build from the Puppeteer cache, otherwise chromiumoxide's detection.
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder();

        if !options.headless {
            builder = builder.with_head();
        }

        if let Some(chrome) = options.executable.clone().or_else(find_chrome_for_testing) {
            info!("Using browser executable: {}", chrome.display());
            builder = builder.chrome_executable(chrome);
        }

        // Own profile directory per session, removed when the driver goes away
        let profile = tempfile::Builder::new()
            .prefix("bundler-bench-")
            .tempdir()?;
        debug!("Browser profile at {}", profile.path().display());
        builder = builder.user_data_dir(profile.path());

        let config = builder.build().map_err(BenchError::Config)?;

        info!("Launching browser for benchmarking");
        let (browser, mut handler) = Browser::launch(config).await?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("Browser handler error: {}", e);
                }
            }
        });

        info!("Browser launched successfully");
        Ok(Self {
            browser,
            handler: handle,
            profile,
        })
    }

    /// Open a blank page for one tool run
    pub async fn open_page(&self) -> Result<ToolPage> {
        let page = self.browser.new_page("about:blank").await?;
        Ok(ToolPage {
            page,
            console_task: None,
        })
    }

    /// Close the browser and wait for its process to exit
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Closing browser");
        if let Err(e) = self.browser.close().await {
            warn!("Browser did not accept close: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }
        self.handler.abort();
        if let Err(e) = self.profile.close() {
            warn!("Failed to remove browser profile: {}", e);
        }
        Ok(())
    }

    /// Profile directory the browser was launched with
    pub fn profile_dir(&self) -> &Path {
        self.profile.path()
    }
}

/// A page used for a single tool run
pub struct ToolPage {
    page: Page,
    console_task: Option<JoinHandle<()>>,
}

impl ToolPage {
    /// Navigate to `url` and wait for the load event
    ///
    /// Returns the time from navigation start to the load event in
    /// milliseconds. The load event is timestamped by a listener task the
    /// moment it arrives, independent of when this future resumes.
    ///
    /// # Errors
    ///
    /// - [`BenchError::Navigation`] if the browser reports a navigation error
    /// - [`BenchError::PhaseTimeout`] for [`Phase::PageLoading`] if the page
    ///   does not load within `deadline`
    #[instrument(skip(self))]
    pub async fn navigate(&self, url: &str, deadline: Duration) -> Result<f64> {
        let mut load_events = self.page.event_listener::<EventLoadEventFired>().await?;
        let started = Instant::now();

        let (load_tx, load_rx) = oneshot::channel();
        let load_listener = tokio::spawn(async move {
            if load_events.next().await.is_some() {
                let _ = load_tx.send(started.elapsed());
            }
        });

        let navigated = timeout(deadline, self.page.goto(url)).await;
        match navigated {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                load_listener.abort();
                return Err(BenchError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                load_listener.abort();
                return Err(BenchError::timeout(Phase::PageLoading, started));
            }
        }

        let remaining = deadline.saturating_sub(started.elapsed());
        match timeout(remaining, load_rx).await {
            Ok(Ok(load_time)) => {
                let ms = load_time.as_secs_f64() * 1000.0;
                debug!("Load event after {:.0}ms", ms);
                Ok(ms.floor())
            }
            _ => {
                load_listener.abort();
                Err(BenchError::timeout(Phase::PageLoading, started))
            }
        }
    }

    /// Start routing console messages into an HMR latch
    ///
    /// The listener stops by itself once both signals were recorded.
    pub async fn watch_hmr(&mut self) -> Result<HmrLatch> {
        let mut events = self.page.event_listener::<EventConsoleApiCalled>().await?;
        let (mut signals, latch) = HmrLatch::channel();

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let received_at = epoch_millis();
                let text = console_text(&event);
                trace!("console: {}", text);

                if let Some((target, observed_at)) = classify_console(&text, received_at) {
                    debug!("Captured {:?} HMR signal at {}", target, observed_at);
                    signals.record(target, observed_at);
                    if signals.is_complete() {
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.console_task.replace(task) {
            previous.abort();
        }
        Ok(latch)
    }

    /// Close the page and stop its listeners
    pub async fn close(mut self) -> Result<()> {
        if let Some(task) = self.console_task.take() {
            task.abort();
        }
        self.page.close().await?;
        Ok(())
    }
}

/// Flatten console arguments the way DevTools prints them
fn console_text(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .filter_map(|arg| match &arg.value {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(value) => Some(value.to_string()),
            None => arg.description.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Numeric components of a cache directory name like `linux-131.0.6778.85`
fn version_key(dir: &Path) -> Vec<u32> {
    dir.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.rsplit('-').next())
        .map(|version| {
            version
                .split('.')
                .map(|part| part.parse().unwrap_or(0))
                .collect()
        })
        .unwrap_or_default()
}

/// Find Chrome for Testing installed by Puppeteer
///
/// Front-end projects commonly have it cached already; newest version wins.
pub fn find_chrome_for_testing() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let puppeteer_cache = std::path::Path::new(&home).join(".cache/puppeteer/chrome");

    let mut versions: Vec<_> = std::fs::read_dir(&puppeteer_cache)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    versions.sort_by_cached_key(|dir| std::cmp::Reverse(version_key(dir)));

    const CANDIDATES: [&str; 3] = [
        "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        "chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        "chrome-linux64/chrome",
    ];

    versions.iter().find_map(|version_dir| {
        CANDIDATES
            .iter()
            .map(|candidate| version_dir.join(candidate))
            .find(|path| path.exists())
    })
}
