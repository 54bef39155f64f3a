//! Duration scraping from build tool output
//!
//! Every supported tool prints a line such as `ready in 312 ms` or
//! `Ready in 1.2s` once its dev server is listening or its production build
//! finished. A [`DurationPattern`] pairs a regular expression exposing two
//! captures (magnitude, unit) with the rule turning them into milliseconds.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // CSI sequences (colours, cursor movement) and OSC sequences (hyperlinks, titles)
    static ref ANSI_ESCAPE: Regex =
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").unwrap();
    static ref NON_NUMERIC: Regex = Regex::new(r"[a-zA-Z ]").unwrap();
}

/// Remove terminal escape sequences from a line of output
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

/// How the unit capture scales the magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Seconds,
    Milliseconds,
}

impl DurationUnit {
    /// `s` means seconds; `ms`, or anything else, is taken as milliseconds
    pub fn from_capture(unit: Option<&str>) -> Self {
        match unit {
            Some("s") => DurationUnit::Seconds,
            _ => DurationUnit::Milliseconds,
        }
    }

    pub fn to_millis(self, magnitude: f64) -> f64 {
        match self {
            DurationUnit::Seconds => magnitude * 1000.0,
            DurationUnit::Milliseconds => magnitude,
        }
    }
}

/// A compiled duration pattern with `(magnitude)(unit)` captures
#[derive(Debug, Clone)]
pub struct DurationPattern {
    regex: Regex,
}

impl DurationPattern {
    /// Wrap an already compiled regex
    pub fn new(regex: Regex) -> Self {
        Self { regex }
    }

    /// Extract a millisecond value from one line of output
    ///
    /// Returns `None` when the line does not match or the magnitude is not a
    /// number once letters and spaces are removed.
    ///
    /// # Example
    ///
    /// ```
    /// use bundler_bench::pattern::DurationPattern;
    /// use regex::Regex;
    ///
    /// let pattern = DurationPattern::new(Regex::new(r"ready\s*in\s*(.+?)(m?s)").unwrap());
    /// assert_eq!(pattern.parse_line("  VITE v5.0.0  ready in 1.5 s"), Some(1500.0));
    /// assert_eq!(pattern.parse_line("hmr update /src/App.jsx"), None);
    /// ```
    pub fn parse_line(&self, line: &str) -> Option<f64> {
        let clean = strip_ansi(line);
        let captures = self.regex.captures(&clean)?;
        let magnitude = parse_magnitude(captures.get(1)?.as_str())?;
        let unit = DurationUnit::from_capture(captures.get(2).map(|m| m.as_str()));
        Some(unit.to_millis(magnitude))
    }
}

fn parse_magnitude(raw: &str) -> Option<f64> {
    if let Ok(value) = raw.parse::<f64>() {
        return Some(value);
    }
    let digits = NON_NUMERIC.replace_all(raw, "");
    digits.parse::<f64>().ok().filter(|v| v.is_finite())
}
