//! Monitor configuration.
//!
//! Every delay and threshold used by the lifecycle manager, presence tracker
//! and control loop is a named field here so tests can shrink them and
//! deployments can tune them without recompiling.
//!
//! Durations are (de)serialized as integer milliseconds under `*_ms` keys.
//! Missing keys take their default value.
//!
//! # Examples
//!
//! ```
//! use cardwatch_presence::MonitorConfig;
//! use std::time::Duration;
//!
//! let config = MonitorConfig::default()
//!     .with_removal_timeout(Duration::from_millis(300))
//!     .with_resync_threshold(100);
//!
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use cardwatch_core::constants::{
    DEFAULT_ANTENNA_GAIN, DEFAULT_INDICATOR_PULSE_MS, DEFAULT_INIT_ATTEMPTS,
    DEFAULT_INIT_RETRY_DELAY_MS, DEFAULT_KNOWN_VERSIONS, DEFAULT_REMOVAL_TIMEOUT_MS,
    DEFAULT_RESYNC_SETTLE_MS, DEFAULT_RESYNC_THRESHOLD, DEFAULT_TICK_INTERVAL_MS,
    DEFAULT_WATCHDOG_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Presence monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Bring-up attempts before initialization is fatal.
    pub init_attempts: u32,

    /// Settling time between bring-up attempts.
    #[serde(rename = "init_retry_delay_ms", with = "millis")]
    pub init_retry_delay: Duration,

    /// Identification register values accepted as a working reader.
    pub known_versions: Vec<u8>,

    /// Receiver gain written during bring-up and resync.
    pub antenna_gain: u8,

    /// Minimum time since the last read before a removal is reported.
    #[serde(rename = "removal_timeout_ms", with = "millis")]
    pub removal_timeout: Duration,

    /// Consecutive empty polls tolerated before resynchronizing.
    pub resync_threshold: u32,

    /// Settling time after a resync.
    #[serde(rename = "resync_settle_ms", with = "millis")]
    pub resync_settle: Duration,

    /// Remove a present card after this many empty polls regardless of
    /// elapsed time. `None` disables the cap.
    pub max_missed_polls: Option<u32>,

    /// Pause between control-loop ticks.
    #[serde(rename = "tick_interval_ms", with = "millis")]
    pub tick_interval: Duration,

    /// Indicator on-time for a card change.
    #[serde(rename = "indicator_pulse_ms", with = "millis")]
    pub indicator_pulse: Duration,

    /// Watchdog timeout.
    #[serde(rename = "watchdog_timeout_ms", with = "millis")]
    pub watchdog_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            init_attempts: DEFAULT_INIT_ATTEMPTS,
            init_retry_delay: Duration::from_millis(DEFAULT_INIT_RETRY_DELAY_MS),
            known_versions: DEFAULT_KNOWN_VERSIONS.to_vec(),
            antenna_gain: DEFAULT_ANTENNA_GAIN,
            removal_timeout: Duration::from_millis(DEFAULT_REMOVAL_TIMEOUT_MS),
            resync_threshold: DEFAULT_RESYNC_THRESHOLD,
            resync_settle: Duration::from_millis(DEFAULT_RESYNC_SETTLE_MS),
            max_missed_polls: None,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            indicator_pulse: Duration::from_millis(DEFAULT_INDICATOR_PULSE_MS),
            watchdog_timeout: Duration::from_millis(DEFAULT_WATCHDOG_TIMEOUT_MS),
        }
    }
}

impl MonitorConfig {
    /// Set the number of bring-up attempts.
    pub fn with_init_attempts(mut self, attempts: u32) -> Self {
        self.init_attempts = attempts;
        self
    }

    /// Set the delay between bring-up attempts.
    pub fn with_init_retry_delay(mut self, delay: Duration) -> Self {
        self.init_retry_delay = delay;
        self
    }

    /// Set the accepted identification register values.
    pub fn with_known_versions(mut self, versions: impl Into<Vec<u8>>) -> Self {
        self.known_versions = versions.into();
        self
    }

    /// Set the removal debounce timeout.
    pub fn with_removal_timeout(mut self, timeout: Duration) -> Self {
        self.removal_timeout = timeout;
        self
    }

    /// Set the empty-poll count that triggers a resync.
    pub fn with_resync_threshold(mut self, threshold: u32) -> Self {
        self.resync_threshold = threshold;
        self
    }

    /// Set the settling time after a resync.
    pub fn with_resync_settle(mut self, settle: Duration) -> Self {
        self.resync_settle = settle;
        self
    }

    /// Cap the number of empty polls before a present card is removed.
    pub fn with_max_missed_polls(mut self, cap: Option<u32>) -> Self {
        self.max_missed_polls = cap;
        self
    }

    /// Set the pause between ticks.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the indicator pulse length.
    pub fn with_indicator_pulse(mut self, pulse: Duration) -> Self {
        self.indicator_pulse = pulse;
        self
    }

    /// Set the watchdog timeout.
    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    /// Longest a single tick can block: inter-tick sleep, indicator pulse
    /// and resync settling all in the same tick.
    pub fn worst_case_tick(&self) -> Duration {
        self.tick_interval + self.indicator_pulse + self.resync_settle
    }

    /// Total settling time spent by a bring-up that exhausts every attempt.
    pub fn worst_case_bring_up(&self) -> Duration {
        self.init_retry_delay.saturating_mul(self.init_attempts)
    }

    /// Check the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if:
    /// - `init_attempts` is zero
    /// - `known_versions` is empty
    /// - `resync_threshold` is zero
    /// - `max_missed_polls` is below 2 (the removal debounce needs two misses)
    /// - `watchdog_timeout` does not exceed the worst-case tick or
    ///   bring-up
    pub fn validate(&self) -> Result<()> {
        if self.init_attempts == 0 {
            return Err(MonitorError::config("init_attempts must be at least 1"));
        }

        if self.known_versions.is_empty() {
            return Err(MonitorError::config("known_versions cannot be empty"));
        }

        if self.resync_threshold == 0 {
            return Err(MonitorError::config("resync_threshold must be at least 1"));
        }

        if let Some(cap) = self.max_missed_polls
            && cap < 2
        {
            return Err(MonitorError::config(format!(
                "max_missed_polls must be at least 2, got {cap}"
            )));
        }

        let worst_tick = self.worst_case_tick();
        if self.watchdog_timeout <= worst_tick {
            return Err(MonitorError::config(format!(
                "watchdog_timeout ({}ms) must exceed the worst-case tick ({}ms)",
                self.watchdog_timeout.as_millis(),
                worst_tick.as_millis()
            )));
        }

        let worst_bring_up = self.worst_case_bring_up();
        if self.watchdog_timeout <= worst_bring_up {
            return Err(MonitorError::config(format!(
                "watchdog_timeout ({}ms) must exceed the worst-case bring-up ({}ms)",
                self.watchdog_timeout.as_millis(),
                worst_bring_up.as_millis()
            )));
        }

        Ok(())
    }
}

/// Serde adapter for `Duration` as integer milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
