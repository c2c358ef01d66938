//! Reader lifecycle manager.
//!
//! The only component allowed to command the reader into a known-good
//! state. It runs bring-up with a bounded number of retries and the lighter
//! register-level resynchronization, and keeps the presence tracker in
//! lockstep with every reset it performs.

use std::time::Duration;

use cardwatch_hardware::{CardReader, FirmwareVersion, ReaderDriver, Watchdog};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::tracker::PresenceTracker;

/// Bring-up and resynchronization policy.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    init_attempts: u32,
    init_retry_delay: Duration,
    known_versions: Vec<u8>,
    antenna_gain: u8,
    resync_settle: Duration,
}

impl LifecycleManager {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            init_attempts: config.init_attempts,
            init_retry_delay: config.init_retry_delay,
            known_versions: config.known_versions.clone(),
            antenna_gain: config.antenna_gain,
            resync_settle: config.resync_settle,
        }
    }

    /// Bring the reader up, retrying until it reports a known version.
    ///
    /// Each attempt initializes the IC, switches the field on and reads the
    /// identification register. A driver error or an unknown version counts
    /// as a failed attempt. The watchdog is fed before every attempt and the
    /// retry delay is slept only between attempts.
    ///
    /// On success the tracker is reset to its initial state.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::InitializationFailed` once every attempt has
    /// failed. A restart has already been requested from the watchdog at
    /// that point; the caller must not keep operating the reader.
    pub async fn initialize<D, W>(
        &self,
        reader: &mut CardReader<D>,
        tracker: &mut PresenceTracker,
        watchdog: &mut W,
    ) -> Result<FirmwareVersion>
    where
        D: ReaderDriver,
        W: Watchdog,
    {
        let mut last_failure = String::from("no attempt made");

        for attempt in 1..=self.init_attempts {
            if attempt > 1 {
                sleep(self.init_retry_delay).await;
            }
            watchdog.feed().await?;

            match reader.bring_up(self.antenna_gain).await {
                Ok(version) if version.is_known_in(&self.known_versions) => {
                    tracker.reset();
                    info!(attempt, %version, "Reader initialized");
                    return Ok(version);
                }
                Ok(version) => {
                    warn!(attempt, %version, "Reader reported an unknown version");
                    last_failure = format!("unrecognized version {version}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reader bring-up failed");
                    last_failure = e.to_string();
                }
            }
        }

        error!(
            attempts = self.init_attempts,
            last_failure = %last_failure,
            "Reader initialization failed, requesting restart"
        );
        let reason = format!("reader initialization failed: {last_failure}");
        if let Err(e) = watchdog.request_restart(&reason).await {
            error!(error = %e, "Restart request was not delivered");
        }

        Err(MonitorError::InitializationFailed {
            attempts: self.init_attempts,
            last_failure,
        })
    }

    /// Recover a silent reader without a full re-initialization.
    ///
    /// The tracker's empty-cycle counter is cleared and the settle delay is
    /// slept whether or not the register writes succeeded. A dead reader
    /// will simply cross the threshold again.
    ///
    /// # Errors
    ///
    /// Returns the driver error from the register sequence, already logged.
    pub async fn resynchronize<D: ReaderDriver>(
        &self,
        reader: &mut CardReader<D>,
        tracker: &mut PresenceTracker,
    ) -> cardwatch_hardware::Result<()> {
        let empty_cycles = tracker.empty_cycles();
        let outcome = reader.resynchronize(self.antenna_gain).await;

        match &outcome {
            Ok(()) => debug!(empty_cycles, "Reader resynchronized"),
            Err(e) => warn!(empty_cycles, error = %e, "Reader resynchronization failed"),
        }

        tracker.note_resync();
        sleep(self.resync_settle).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardwatch_core::PollResult;
    use cardwatch_hardware::Register;
    use cardwatch_hardware::mock::{MockReader, MockWatchdog};
    use rstest::rstest;
    use tokio::time::Instant;

    fn config() -> MonitorConfig {
        MonitorConfig::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_first_attempt() {
        let (driver, reader_handle) = MockReader::new();
        let (mut watchdog, watchdog_handle) = MockWatchdog::new();
        let mut reader = CardReader::new(driver);
        let mut tracker = PresenceTracker::from_config(&config());
        let lifecycle = LifecycleManager::new(&config());

        let started = Instant::now();
        let version = lifecycle
            .initialize(&mut reader, &mut tracker, &mut watchdog)
            .await
            .unwrap();

        assert_eq!(version.as_u8(), 0x92);
        assert_eq!(reader_handle.init_count(), 1);
        assert_eq!(watchdog_handle.feed_count(), 1);
        assert!(watchdog_handle.restart_requests().is_empty());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[rstest]
    #[case(0x88)]
    #[case(0x91)]
    #[case(0x92)]
    #[case(0xB2)]
    #[tokio::test(start_paused = true)]
    async fn test_initialize_accepts_known_versions(#[case] raw: u8) {
        let (driver, reader_handle) = MockReader::new();
        let (mut watchdog, _watchdog_handle) = MockWatchdog::new();
        reader_handle.set_version(raw);
        let mut reader = CardReader::new(driver);
        let mut tracker = PresenceTracker::from_config(&config());

        let version = LifecycleManager::new(&config())
            .initialize(&mut reader, &mut tracker, &mut watchdog)
            .await
            .unwrap();

        assert_eq!(version.as_u8(), raw);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_unknown_version_is_fatal() {
        let (driver, reader_handle) = MockReader::new();
        let (mut watchdog, watchdog_handle) = MockWatchdog::new();
        reader_handle.set_version(0x00);
        let mut reader = CardReader::new(driver);
        let mut tracker = PresenceTracker::from_config(&config());

        let started = Instant::now();
        let result = LifecycleManager::new(&config())
            .initialize(&mut reader, &mut tracker, &mut watchdog)
            .await;

        let error = result.unwrap_err();
        assert!(error.is_fatal_init());
        assert!(matches!(
            error,
            MonitorError::InitializationFailed { attempts: 5, .. }
        ));
        assert_eq!(reader_handle.init_count(), 5);
        assert_eq!(watchdog_handle.feed_count(), 5);
        assert_eq!(watchdog_handle.restart_requests().len(), 1);
        // Four waits between five attempts
        assert_eq!(started.elapsed(), Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_recovers_after_failures() {
        let (driver, reader_handle) = MockReader::new();
        let (mut watchdog, watchdog_handle) = MockWatchdog::new();
        reader_handle.fail_initialize(true);
        let mut reader = CardReader::new(driver);
        let mut tracker = PresenceTracker::from_config(&config());
        let lifecycle = LifecycleManager::new(&config());

        let handle = reader_handle.clone();
        let heal = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            handle.fail_initialize(false);
        });

        lifecycle
            .initialize(&mut reader, &mut tracker, &mut watchdog)
            .await
            .unwrap();
        heal.await.unwrap();

        // Attempts at 0ms and 500ms fail, the one at 1000ms succeeds
        assert_eq!(reader_handle.init_count(), 1);
        assert_eq!(watchdog_handle.feed_count(), 3);
        assert!(watchdog_handle.restart_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_resets_tracker() {
        let (driver, reader_handle) = MockReader::new();
        let (mut watchdog, _watchdog_handle) = MockWatchdog::new();
        let mut reader = CardReader::new(driver);
        let mut tracker = PresenceTracker::from_config(&config());

        reader_handle.present_card(vec![0xA1, 0xB2, 0xC3, 0xD4]);
        let poll = reader.poll_once().await;
        tracker.observe(&poll, Instant::now());
        tracker.observe(&PollResult::NotDetected, Instant::now());
        assert!(!tracker.is_initial());

        LifecycleManager::new(&config())
            .initialize(&mut reader, &mut tracker, &mut watchdog)
            .await
            .unwrap();

        assert!(tracker.is_initial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resynchronize_resets_counter_and_settles() {
        let (driver, reader_handle) = MockReader::new();
        let mut reader = CardReader::new(driver);
        let mut tracker = PresenceTracker::from_config(&config());
        for _ in 0..5 {
            tracker.observe(&PollResult::NotDetected, Instant::now());
        }
        reader_handle.clear_log();

        let started = Instant::now();
        LifecycleManager::new(&config())
            .resynchronize(&mut reader, &mut tracker)
            .await
            .unwrap();

        assert_eq!(tracker.empty_cycles(), 0);
        assert_eq!(started.elapsed(), Duration::from_millis(10));
        assert_eq!(reader_handle.register(Register::RfCfg), 0x70);
        assert!(!reader_handle.reads().contains(&Register::Version));
        assert_eq!(reader_handle.init_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resynchronize_failure_still_resets_counter() {
        let (driver, reader_handle) = MockReader::new();
        let mut reader = CardReader::new(driver);
        let mut tracker = PresenceTracker::from_config(&config());
        tracker.observe(&PollResult::NotDetected, Instant::now());
        reader_handle.set_bus_fault(true);

        let result = LifecycleManager::new(&config())
            .resynchronize(&mut reader, &mut tracker)
            .await;

        assert!(result.is_err());
        assert_eq!(tracker.empty_cycles(), 0);
    }
}
