//! Control loop.
//!
//! One tick, in order:
//!
//! 1. Feed the watchdog
//! 2. Poll the reader once
//! 3. Classify the poll with the presence tracker
//! 4. On a change, report the UID and pulse the indicator; on a removal,
//!    release the card and report `removed`
//! 5. Resynchronize the reader if the tracker asked for it
//! 6. Sleep the tick interval
//!
//! The loop exclusively owns the reader, the tracker, the watchdog and the
//! indicator. Nothing else touches them, so there is no locking.
//!
//! # Examples
//!
//! ```
//! use cardwatch_hardware::mock::{MockIndicator, MockReader, MockWatchdog};
//! use cardwatch_presence::{ControlLoop, MonitorConfig};
//!
//! #[tokio::main(flavor = "current_thread", start_paused = true)]
//! async fn main() -> cardwatch_presence::Result<()> {
//!     let (reader, card) = MockReader::new();
//!     let (watchdog, _) = MockWatchdog::new();
//!     let (indicator, _) = MockIndicator::new();
//!
//!     let mut monitor = ControlLoop::new(
//!         &MonitorConfig::default(),
//!         reader,
//!         watchdog,
//!         indicator,
//!         Vec::new(),
//!     );
//!     monitor.start().await?;
//!
//!     card.present_card(vec![0xA1, 0xB2, 0xC3, 0xD4]);
//!     monitor.tick().await?;
//!
//!     assert_eq!(monitor.reporter().get_ref().as_slice(), b"A1B2C3D4\n");
//!     Ok(())
//! }
//! ```

use std::future::{Future, ready};
use std::time::Duration;

use cardwatch_core::PresenceEvent;
use cardwatch_hardware::{CardReader, FirmwareVersion, Indicator, ReaderDriver, Watchdog};
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::lifecycle::LifecycleManager;
use crate::report::LineReporter;
use crate::tracker::PresenceTracker;

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickOutcome {
    /// Event reported this tick.
    pub event: Option<PresenceEvent>,

    /// A resync was attempted this tick.
    pub resynchronized: bool,
}

/// Running counters since the loop was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MonitorStats {
    pub ticks: u64,
    pub changes: u64,
    pub removals: u64,
    pub resyncs: u64,
    pub resync_failures: u64,
    pub malformed_reads: u64,
}

/// The presence monitor.
#[derive(Debug)]
pub struct ControlLoop<D, W, I, O> {
    reader: CardReader<D>,
    tracker: PresenceTracker,
    lifecycle: LifecycleManager,
    watchdog: W,
    indicator: I,
    reporter: LineReporter<O>,

    tick_interval: Duration,
    indicator_pulse: Duration,
    tick_limit: Option<u64>,

    stats: MonitorStats,
}

impl<D, W, I, O> ControlLoop<D, W, I, O>
where
    D: ReaderDriver,
    W: Watchdog,
    I: Indicator,
    O: AsyncWrite + Unpin,
{
    /// Assemble a monitor from its devices and report sink.
    ///
    /// `config` is expected to have passed [`MonitorConfig::validate`].
    pub fn new(config: &MonitorConfig, driver: D, watchdog: W, indicator: I, out: O) -> Self {
        Self {
            reader: CardReader::new(driver),
            tracker: PresenceTracker::from_config(config),
            lifecycle: LifecycleManager::new(config),
            watchdog,
            indicator,
            reporter: LineReporter::new(out),
            tick_interval: config.tick_interval,
            indicator_pulse: config.indicator_pulse,
            tick_limit: None,
            stats: MonitorStats::default(),
        }
    }

    /// Stop [`run_until`](Self::run_until) after `limit` ticks in total.
    pub fn with_tick_limit(mut self, limit: Option<u64>) -> Self {
        self.tick_limit = limit;
        self
    }

    /// Bring the reader up.
    ///
    /// # Errors
    ///
    /// `MonitorError::InitializationFailed` is fatal: a restart has been
    /// requested and no tick may run.
    pub async fn start(&mut self) -> Result<FirmwareVersion> {
        self.lifecycle
            .initialize(&mut self.reader, &mut self.tracker, &mut self.watchdog)
            .await
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Fails if the watchdog cannot be fed or a report line cannot be
    /// written. Read misses, malformed UIDs and failed resyncs are absorbed.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        self.watchdog.feed().await?;

        let poll = self.reader.poll_once().await;
        let observation = self.tracker.observe(&poll, Instant::now());

        match &observation.event {
            Some(event @ PresenceEvent::CardChanged(_)) => {
                self.stats.changes += 1;
                self.reporter.report(event).await?;
                self.pulse_indicator().await;
            }
            Some(event @ PresenceEvent::CardRemoved) => {
                self.stats.removals += 1;
                if let Err(e) = self.reader.release_card().await {
                    warn!(error = %e, "Failed to release removed card");
                }
                self.reporter.report(event).await?;
            }
            None => {}
        }

        if observation.resync_requested {
            self.stats.resyncs += 1;
            if self
                .lifecycle
                .resynchronize(&mut self.reader, &mut self.tracker)
                .await
                .is_err()
            {
                self.stats.resync_failures += 1;
            }
        }

        self.stats.malformed_reads = self.reader.malformed_reads();
        self.stats.ticks += 1;
        if observation.event.is_some() || observation.resync_requested {
            debug!(stats = ?self.stats, "Monitor stats");
        }

        sleep(self.tick_interval).await;

        Ok(TickOutcome {
            event: observation.event,
            resynchronized: observation.resync_requested,
        })
    }

    async fn pulse_indicator(&mut self) {
        if let Err(e) = self.indicator.set(true).await {
            warn!(error = %e, "Failed to switch indicator on");
        }
        sleep(self.indicator_pulse).await;
        if let Err(e) = self.indicator.set(false).await {
            warn!(error = %e, "Failed to switch indicator off");
        }
    }

    /// Tick until `shutdown` resolves or the tick limit is reached.
    ///
    /// `shutdown` is only checked between ticks; a tick in progress always
    /// completes.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            if self.tick_limit.is_some_and(|limit| self.stats.ticks >= limit) {
                info!(ticks = self.stats.ticks, "Tick limit reached");
                return Ok(());
            }

            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!(ticks = self.stats.ticks, "Shutdown requested");
                    return Ok(());
                }
                () = ready(()) => {}
            }

            self.tick().await?;
        }
    }

    /// Bring the reader up and tick until an error ends the loop.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;
        self.run_until(std::future::pending()).await
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    pub fn reader(&self) -> &CardReader<D> {
        &self.reader
    }

    pub fn reporter(&self) -> &LineReporter<O> {
        &self.reporter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardwatch_hardware::mock::{
        MockIndicator, MockIndicatorHandle, MockReader, MockReaderHandle, MockWatchdog,
        MockWatchdogHandle,
    };

    type Monitor = ControlLoop<MockReader, MockWatchdog, MockIndicator, Vec<u8>>;

    fn monitor(
        config: &MonitorConfig,
    ) -> (Monitor, MockReaderHandle, MockWatchdogHandle, MockIndicatorHandle) {
        let (reader, reader_handle) = MockReader::new();
        let (watchdog, watchdog_handle) = MockWatchdog::new();
        let (indicator, indicator_handle) = MockIndicator::new();
        let monitor = ControlLoop::new(config, reader, watchdog, indicator, Vec::new());
        (monitor, reader_handle, watchdog_handle, indicator_handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_feeds_watchdog_and_sleeps() {
        let (mut monitor, _, watchdog, _) = monitor(&MonitorConfig::default());

        let started = Instant::now();
        let outcome = monitor.tick().await.unwrap();

        assert_eq!(outcome, TickOutcome::default());
        assert_eq!(watchdog.feed_count(), 1);
        assert_eq!(started.elapsed(), Duration::from_millis(50));
        assert_eq!(monitor.stats().ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_reports_and_pulses() {
        let (mut monitor, card, _, led) = monitor(&MonitorConfig::default());
        card.present_card(vec![0xA1, 0xB2, 0xC3, 0xD4]);

        let started = Instant::now();
        let outcome = monitor.tick().await.unwrap();

        assert!(matches!(outcome.event, Some(PresenceEvent::CardChanged(_))));
        assert_eq!(led.history(), vec![true, false]);
        assert_eq!(started.elapsed(), Duration::from_millis(100));
        assert_eq!(monitor.reporter().get_ref().as_slice(), b"A1B2C3D4\n");

        // Same card again: nothing new
        let outcome = monitor.tick().await.unwrap();
        assert_eq!(outcome.event, None);
        assert_eq!(led.pulse_count(), 1);
        assert_eq!(monitor.reporter().lines_written(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_releases_card() {
        let config = MonitorConfig::default().with_removal_timeout(Duration::from_millis(100));
        let (mut monitor, card, _, led) = monitor(&config);
        card.present_card(vec![0xA1, 0xB2, 0xC3, 0xD4]);
        monitor.tick().await.unwrap();

        card.remove_card();
        // First miss is debounced, second lands 150ms after the last read
        assert_eq!(monitor.tick().await.unwrap().event, None);
        let outcome = monitor.tick().await.unwrap();

        assert_eq!(outcome.event, Some(PresenceEvent::CardRemoved));
        assert_eq!(card.halt_count(), 1);
        assert_eq!(card.stop_crypto_count(), 1);
        assert_eq!(led.pulse_count(), 1);
        assert_eq!(
            monitor.reporter().get_ref().as_slice(),
            b"A1B2C3D4\nremoved\n"
        );
        assert_eq!(monitor.stats().removals, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prolonged_silence_resynchronizes() {
        let config = MonitorConfig::default().with_resync_threshold(3);
        let (mut monitor, card, _, _) = monitor(&config);

        for _ in 0..3 {
            assert!(!monitor.tick().await.unwrap().resynchronized);
        }
        card.clear_log();
        assert!(monitor.tick().await.unwrap().resynchronized);

        assert_eq!(monitor.tracker().empty_cycles(), 0);
        assert_eq!(monitor.stats().resyncs, 1);
        assert_eq!(monitor.stats().resync_failures, 0);
        assert!(!card.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_watchdog_ends_tick() {
        let (mut monitor, _, watchdog, _) = monitor(&MonitorConfig::default());
        watchdog.expire();

        assert!(monitor.tick().await.is_err());
        assert_eq!(monitor.stats().ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_honours_tick_limit() {
        let (monitor, _, watchdog, _) = monitor(&MonitorConfig::default());
        let mut monitor = monitor.with_tick_limit(Some(7));

        monitor.start().await.unwrap();
        monitor.run_until(std::future::pending()).await.unwrap();

        assert_eq!(monitor.stats().ticks, 7);
        // One feed for bring-up plus one per tick
        assert_eq!(watchdog.feed_count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_stops_on_shutdown() {
        let (mut monitor, _, _, _) = monitor(&MonitorConfig::default());

        monitor.run_until(ready(())).await.unwrap();

        assert_eq!(monitor.stats().ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fails_fast_on_bad_reader() {
        let (mut monitor, card, watchdog, _) = monitor(&MonitorConfig::default());
        card.set_version(0xFF);

        let error = monitor.run().await.unwrap_err();

        assert!(error.is_fatal_init());
        assert_eq!(monitor.stats().ticks, 0);
        assert_eq!(watchdog.restart_requests().len(), 1);
    }
}
