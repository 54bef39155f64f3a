//! Browser helpers

use bundler_bench::browser::BrowserDriver;
use bundler_bench::config::BrowserOptions;

/// Check if browser tests should be skipped (when Chrome isn't available)
pub fn should_skip() -> bool {
    std::env::var("SKIP_BROWSER_TESTS").is_ok()
}

/// Macro to skip test if Chrome isn't available
#[macro_export]
macro_rules! skip_if_no_chrome {
    () => {
        if browser::should_skip() {
            eprintln!("Skipping test: SKIP_BROWSER_TESTS is set");
            return;
        }
    };
}

/// Try to launch the headless browser, skip the test if it can't start
///
/// Launch failures on machines without Chrome (or without a usable sandbox)
/// are not what these tests are about.
#[allow(dead_code)]
pub async fn require_driver() -> Option<BrowserDriver> {
    match BrowserDriver::launch(&BrowserOptions::default()).await {
        Ok(driver) => Some(driver),
        Err(e) => {
            eprintln!("Skipping: browser could not be launched ({})", e);
            None
        }
    }
}
