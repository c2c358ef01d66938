//! Simulated reader scenarios.
//!
//! Without an SPI bus the binary drives a [`MockReader`] from a scenario: a
//! JSON list of steps, each applied to the reader and then held for
//! `hold_ms` milliseconds.
//!
//! ```json
//! {
//!   "repeat": false,
//!   "steps": [
//!     { "kind": "version", "value": 146, "hold_ms": 0 },
//!     { "kind": "present", "uid": "A1B2C3D4", "hold_ms": 2000 },
//!     { "kind": "remove", "hold_ms": 1000 },
//!     { "kind": "malformed", "serial": [238, 238, 238], "hold_ms": 500 }
//!   ]
//! }
//! ```
//!
//! Steps with a zero hold at the head of the list are applied before the
//! reader is brought up, which is how a `version` override reaches the
//! bring-up identification check.
//!
//! [`MockReader`]: cardwatch_hardware::mock::MockReader

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use cardwatch_core::CardIdentifier;
use cardwatch_hardware::mock::MockReaderHandle;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info};

const DEMO_SCENARIO: &str = include_str!("../scenarios/demo.json");

/// One scripted change to the simulated reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// Put a card with a valid UID in the field.
    Present { uid: CardIdentifier, hold_ms: u64 },

    /// Take the card out of the field.
    Remove { hold_ms: u64 },

    /// Put a card in the field whose serial has an arbitrary length.
    Malformed { serial: Vec<u8>, hold_ms: u64 },

    /// Change the identification register value.
    Version { value: u8, hold_ms: u64 },
}

impl Step {
    pub fn hold(&self) -> Duration {
        let ms = match self {
            Step::Present { hold_ms, .. }
            | Step::Remove { hold_ms }
            | Step::Malformed { hold_ms, .. }
            | Step::Version { hold_ms, .. } => *hold_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn apply(&self, reader: &MockReaderHandle) {
        debug!(step = ?self, "Scenario step");
        match self {
            Step::Present { uid, .. } => reader.present_card(uid.as_bytes().to_vec()),
            Step::Remove { .. } => reader.remove_card(),
            Step::Malformed { serial, .. } => reader.present_card(serial.clone()),
            Step::Version { value, .. } => reader.set_version(*value),
        }
    }
}

/// A scripted sequence of reader changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Start over after the last step instead of stopping.
    #[serde(default)]
    pub repeat: bool,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Read a scenario from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&text)
            .with_context(|| format!("parsing scenario {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Card A, a gap, card B, a misread, then nothing; played once.
    pub fn demo() -> anyhow::Result<Self> {
        serde_json::from_str(DEMO_SCENARIO).context("parsing built-in demo scenario")
    }

    /// A repeating scenario must hold somewhere, or it would spin.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.steps.is_empty() {
            bail!("scenario has no steps");
        }
        if self.repeat && self.steps.iter().all(|step| step.hold().is_zero()) {
            bail!("repeating scenario needs at least one step with a non-zero hold");
        }
        Ok(())
    }

    /// Total time of one pass through the steps.
    pub fn duration(&self) -> Duration {
        self.steps.iter().map(Step::hold).sum()
    }
}

/// Plays a [`Scenario`] against a mock reader.
#[derive(Debug)]
pub struct ScenarioPlayer {
    scenario: Scenario,
    reader: MockReaderHandle,
    next: usize,
}

impl ScenarioPlayer {
    pub fn new(scenario: Scenario, reader: MockReaderHandle) -> Self {
        Self {
            scenario,
            reader,
            next: 0,
        }
    }

    /// Apply the leading zero-hold steps right away.
    pub fn prime(&mut self) {
        while let Some(step) = self.scenario.steps.get(self.next) {
            if !step.hold().is_zero() {
                break;
            }
            step.apply(&self.reader);
            self.next += 1;
        }
    }

    /// Play the remaining steps, looping if the scenario repeats.
    pub async fn run(mut self) {
        loop {
            while let Some(step) = self.scenario.steps.get(self.next) {
                step.apply(&self.reader);
                sleep(step.hold()).await;
                self.next += 1;
            }

            if !self.scenario.repeat {
                info!("Scenario finished");
                return;
            }
            self.next = 0;
        }
    }
}
