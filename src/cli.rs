//! Subcommands of the `wavebattle` binary.
//!
//! `simulate` and `watch` replay a scenario file. `stress` runs seeded
//! random battles in parallel.

pub(crate) mod simulate;
pub(crate) mod stress;
pub(crate) mod validate;
pub(crate) mod watch;

mod output;

use clap::ValueEnum;
use std::error::Error;
use std::fmt;
use wavebattle::ConfigError;
use wavebattle::scenario::ScenarioError;

/// How `simulate` prints its battle report and `stress` its totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Winner, lane control bars and rejected deployments.
    Text,
    /// The serialized `ScenarioReport` or stress totals.
    Json,
}

/// Error reported by a subcommand; printed once by `main`.
#[derive(Debug)]
pub(crate) struct CliError {
    message: String,
}

impl CliError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("JSON output failed: {e}"))
    }
}

impl From<ScenarioError> for CliError {
    fn from(e: ScenarioError) -> Self {
        Self::new(format!("scenario: {e}"))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::new(format!("settings: {e}"))
    }
}
