//! Console-output readiness detection.
//!
//! Wrapped packages announce their web server on stdout with an
//! upstream-specific phrase ("Running on local URL", "To see the GUI go
//! to", ...). The parser watches the line stream for any of the package's
//! phrases, extracts the bound URL, and fires a one-shot startup event.

use regex::Regex;
use tracing::debug;

/// One-shot startup-complete signal with the discovered service URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupEvent {
    pub url: String,
}

/// Line-stream state machine detecting server readiness.
///
/// Lines must be fed in order from a single consumer; the parser fires at
/// most one event over its lifetime.
pub struct ConsoleOutputParser {
    /// Case-insensitive readiness phrases for this package family.
    phrases: Vec<String>,
    /// Generic `scheme://host:port` matcher.
    url_regex: Regex,
    /// Most recent URL seen on any line, in case the readiness phrase and
    /// the URL arrive on different lines.
    last_url: Option<String>,
    /// Fallback URL when the output never prints one.
    default_url: Option<String>,
    fired: bool,
}

impl ConsoleOutputParser {
    /// Create a parser watching for the given readiness phrases.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phrases: phrases.into_iter().map(|p| p.into().to_lowercase()).collect(),
            url_regex: Regex::new(r"(https?)://([^:/\s]+):(\d+)").expect("static regex"),
            last_url: None,
            default_url: None,
            fired: false,
        }
    }

    /// Set the URL reported when the readiness line carries none.
    pub fn with_default_url(mut self, url: impl Into<String>) -> Self {
        self.default_url = Some(url.into());
        self
    }

    /// Whether the startup event has already fired.
    pub fn is_complete(&self) -> bool {
        self.fired
    }

    /// Inspect one output line; returns the startup event on first match.
    pub fn process_line(&mut self, line: &str) -> Option<StartupEvent> {
        if let Some(url) = self.extract_url(line) {
            self.last_url = Some(url);
        }

        if self.fired {
            return None;
        }

        let lower = line.to_lowercase();
        if !self.phrases.iter().any(|p| lower.contains(p)) {
            return None;
        }

        let url = self
            .last_url
            .clone()
            .or_else(|| self.default_url.clone())?;

        debug!("Startup complete, service at {}", url);
        self.fired = true;
        Some(StartupEvent { url })
    }

    /// Extract and normalize a `scheme://host:port` URL from a line.
    ///
    /// A bind-all host (`0.0.0.0`, `::`, `*`) is rewritten to loopback so
    /// the URL is openable as displayed.
    fn extract_url(&self, line: &str) -> Option<String> {
        let caps = self.url_regex.captures(line)?;
        let scheme = caps.get(1)?.as_str();
        let host = caps.get(2)?.as_str();
        let port = caps.get(3)?.as_str();

        let host = match host {
            "0.0.0.0" | "::" | "[::]" | "*" => "127.0.0.1",
            other => other,
        };

        Some(format!("{}://{}:{}", scheme, host, port))
    }
}
