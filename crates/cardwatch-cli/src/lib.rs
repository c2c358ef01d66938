//! Cardwatch command-line interface.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in demo scenario against a simulated reader
//! cardwatch run
//!
//! # Use a config file and a scenario, stop after 200 ticks
//! cardwatch run --config cardwatch.json --scenario scenarios/demo.json --max-ticks 200
//!
//! # More detail on stderr
//! RUST_LOG=debug cardwatch run --removal-timeout-ms 300
//! ```
//!
//! Identifier report lines go to stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use cardwatch_hardware::{HardwareError, Indicator};
use cardwatch_presence::MonitorConfig;
use clap::{Args, Parser, Subcommand};
use tracing::debug;

pub mod scenario;

pub use scenario::{Scenario, ScenarioPlayer, Step};

/// Exit code after a fatal reader initialization failure.
pub const EXIT_INIT_FAILURE: u8 = 70;

/// Exit code after the watchdog starved.
pub const EXIT_WATCHDOG: u8 = 71;

/// Card presence monitor
#[derive(Parser, Debug)]
#[command(name = "cardwatch")]
#[command(author, version, about = "Contactless card presence monitor")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the presence monitor against a simulated reader
    Run(RunArgs),
}

/// Options for `cardwatch run`
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// JSON configuration file; missing keys take their defaults
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON scenario driving the simulated reader (built-in demo if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub scenario: Option<PathBuf>,

    /// Override the removal debounce timeout
    #[arg(long, value_name = "MS")]
    pub removal_timeout_ms: Option<u64>,

    /// Override the pause between ticks
    #[arg(long, value_name = "MS")]
    pub tick_ms: Option<u64>,

    /// Stop after this many ticks
    #[arg(long, value_name = "N")]
    pub max_ticks: Option<u64>,
}

impl RunArgs {
    /// Build the effective configuration: file (or defaults), then flags.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or if the result does
    /// not pass [`MonitorConfig::validate`].
    pub fn load_config(&self) -> anyhow::Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => MonitorConfig::default(),
        };

        if let Some(ms) = self.removal_timeout_ms {
            config = config.with_removal_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.tick_ms {
            config = config.with_tick_interval(Duration::from_millis(ms));
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    pub fn load_scenario(&self) -> anyhow::Result<Scenario> {
        match &self.scenario {
            Some(path) => Scenario::load(path),
            None => Scenario::demo(),
        }
    }
}

fn read_config(path: &Path) -> anyhow::Result<MonitorConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Indicator that only logs, for hosts without a status LED.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    async fn set(&mut self, on: bool) -> Result<(), HardwareError> {
        debug!(on, "Indicator");
        Ok(())
    }
}
