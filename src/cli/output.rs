//! Output formatting
//!
//! Global output mode (quiet, JSON, verbosity) and formatted messages.

use std::sync::OnceLock;

use serde::Serialize;

static OUTPUT: OnceLock<OutputConfig> = OnceLock::new();

/// How command results are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Print nothing but errors
    pub quiet: bool,
    /// Print machine-readable JSON
    pub json: bool,
    /// Verbosity level (number of `-v`)
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make this the configuration returned by [`current`]
    ///
    /// Only the first call has an effect.
    pub fn apply_global(self) {
        if OUTPUT.set(self).is_err() {
            tracing::debug!("Output configuration already applied");
        }
    }

    /// Log filter directive for this verbosity
    pub fn log_level(&self) -> tracing::Level {
        match (self.quiet, self.verbose) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::WARN,
            (false, 1) => tracing::Level::INFO,
            (false, _) => tracing::Level::DEBUG,
        }
    }

    /// Print a human-readable line, unless quiet or in JSON mode
    pub fn line(&self, message: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            println!("{message}");
        }
    }

    /// Print a JSON document, in JSON mode only
    pub fn json<T: Serialize>(&self, value: &T) {
        if self.json {
            match serde_json::to_string(value) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!("Failed to serialize output: {e}"),
            }
        }
    }

    /// Print a failure line to stderr, unless in JSON mode
    pub fn failure(&self, message: impl std::fmt::Display) {
        if !self.json {
            eprintln!("{} {message}", status::ERROR);
        }
    }
}

/// The global output configuration
pub fn current() -> OutputConfig {
    OUTPUT.get().copied().unwrap_or_default()
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_follows_verbosity() {
        assert_eq!(OutputConfig::new(false, false, 0).log_level(), tracing::Level::WARN);
        assert_eq!(OutputConfig::new(false, false, 1).log_level(), tracing::Level::INFO);
        assert_eq!(OutputConfig::new(false, false, 3).log_level(), tracing::Level::DEBUG);
        assert_eq!(OutputConfig::new(true, false, 2).log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_default_is_human_output() {
        let config = OutputConfig::default();
        assert!(!config.quiet && !config.json);
    }
}
