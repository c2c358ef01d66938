//! Presence tracker.
//!
//! The tracker owns the current-card state, the last-seen timestamp and the
//! empty-cycle counter. It classifies one [`PollResult`] per control-loop
//! tick and decides whether a card changed, a card left, or the reader has
//! been silent long enough to need a resync.
//!
//! # Decisions
//!
//! | State | Poll | Outcome |
//! |---|---|---|
//! | any | `Detected(I)`, I differs from held card | `Present(I)`, emit `CardChanged(I)` |
//! | `Present(I)` | `Detected(I)` | no event, presence reaffirmed |
//! | `Present(I)` | `NotDetected` | removal once two or more empty polls AND removal timeout elapsed |
//! | `Absent` | `NotDetected` | count only |
//! | any | `NotDetected`, empty cycles above threshold | request resync |
//!
//! Every detection resets the empty-cycle counter and refreshes the
//! last-seen timestamp. A single missed poll never removes a card.
//!
//! The optional missed-poll cap counts misses since the last detection on
//! its own counter, which a resync does not clear.
//!
//! The tracker does not touch hardware. Halting a removed card and running
//! the resync are the caller's job; the caller reports a completed resync
//! through [`PresenceTracker::note_resync`].
//!
//! # Examples
//!
//! ```
//! use cardwatch_core::{CardIdentifier, PollResult, PresenceEvent};
//! use cardwatch_presence::{MonitorConfig, PresenceTracker};
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let mut tracker = PresenceTracker::from_config(&MonitorConfig::default());
//! let uid = CardIdentifier::from_hex("A1B2C3D4").unwrap();
//! let start = Instant::now();
//!
//! let seen = tracker.observe(&PollResult::Detected(uid.clone()), start);
//! assert_eq!(seen.event, Some(PresenceEvent::CardChanged(uid)));
//!
//! let later = start + Duration::from_secs(1);
//! assert_eq!(tracker.observe(&PollResult::NotDetected, later).event, None);
//! assert_eq!(
//!     tracker.observe(&PollResult::NotDetected, later).event,
//!     Some(PresenceEvent::CardRemoved)
//! );
//! ```

use std::time::Duration;

use cardwatch_core::{PollResult, PresenceEvent, PresenceState};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::MonitorConfig;

/// Empty polls a present card must survive before removal is considered.
const MIN_EMPTY_CYCLES_FOR_REMOVAL: u32 = 2;

/// What the tracker decided for one poll.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    /// Presence event to report, if any.
    pub event: Option<PresenceEvent>,

    /// The reader has been silent past the threshold and should be
    /// resynchronized.
    pub resync_requested: bool,
}

/// Card presence state machine.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    state: PresenceState,
    last_seen_at: Option<Instant>,
    empty_cycles: u32,
    missed_since_seen: u32,

    removal_timeout: Duration,
    resync_threshold: u32,
    max_missed_polls: Option<u32>,
}

impl PresenceTracker {
    /// Create a tracker in the `Absent` state.
    pub fn new(removal_timeout: Duration, resync_threshold: u32) -> Self {
        Self {
            state: PresenceState::Absent,
            last_seen_at: None,
            empty_cycles: 0,
            missed_since_seen: 0,
            removal_timeout,
            resync_threshold,
            max_missed_polls: None,
        }
    }

    /// Create a tracker using the thresholds from `config`.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.removal_timeout, config.resync_threshold)
            .with_max_missed_polls(config.max_missed_polls)
    }

    /// Force removal after `cap` empty polls even if the removal timeout has
    /// not elapsed.
    pub fn with_max_missed_polls(mut self, cap: Option<u32>) -> Self {
        self.max_missed_polls = cap;
        self
    }

    /// Classify one poll taken at `now`.
    pub fn observe(&mut self, poll: &PollResult, now: Instant) -> Observation {
        match poll {
            PollResult::Detected(uid) => {
                self.empty_cycles = 0;
                self.missed_since_seen = 0;
                self.last_seen_at = Some(now);

                if self.state.current() == Some(uid) {
                    return Observation::default();
                }

                info!(uid = %uid, previous = %self.state, "Card changed");
                self.state = PresenceState::Present(uid.clone());
                Observation {
                    event: Some(PresenceEvent::CardChanged(uid.clone())),
                    resync_requested: false,
                }
            }
            PollResult::NotDetected => {
                self.empty_cycles = self.empty_cycles.saturating_add(1);
                self.missed_since_seen = self.missed_since_seen.saturating_add(1);

                let event = if self.removal_due(now) {
                    info!(
                        previous = %self.state,
                        empty_cycles = self.empty_cycles,
                        missed = self.missed_since_seen,
                        "Card removed"
                    );
                    self.state = PresenceState::Absent;
                    Some(PresenceEvent::CardRemoved)
                } else {
                    None
                };

                let resync_requested = self.empty_cycles > self.resync_threshold;
                if resync_requested {
                    debug!(
                        empty_cycles = self.empty_cycles,
                        threshold = self.resync_threshold,
                        "Reader silent past threshold"
                    );
                }

                Observation {
                    event,
                    resync_requested,
                }
            }
        }
    }

    fn removal_due(&self, now: Instant) -> bool {
        if !self.state.is_present() || self.empty_cycles < MIN_EMPTY_CYCLES_FOR_REMOVAL {
            return false;
        }

        if let Some(cap) = self.max_missed_polls
            && self.missed_since_seen >= cap
        {
            return true;
        }

        self.last_seen_at
            .is_some_and(|seen| now.saturating_duration_since(seen) > self.removal_timeout)
    }

    /// Record that the reader was resynchronized.
    pub fn note_resync(&mut self) {
        self.empty_cycles = 0;
    }

    /// Return to the initial state, as after a process start.
    pub fn reset(&mut self) {
        self.state = PresenceState::Absent;
        self.last_seen_at = None;
        self.empty_cycles = 0;
        self.missed_since_seen = 0;
    }

    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    pub fn empty_cycles(&self) -> u32 {
        self.empty_cycles
    }

    /// Misses since the last detection, across resyncs.
    pub fn missed_since_seen(&self) -> u32 {
        self.missed_since_seen
    }

    pub fn last_seen_at(&self) -> Option<Instant> {
        self.last_seen_at
    }

    pub fn removal_timeout(&self) -> Duration {
        self.removal_timeout
    }

    pub fn resync_threshold(&self) -> u32 {
        self.resync_threshold
    }

    /// Whether the tracker holds no card and no timing history.
    pub fn is_initial(&self) -> bool {
        self.state == PresenceState::Absent
            && self.last_seen_at.is_none()
            && self.empty_cycles == 0
            && self.missed_since_seen == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardwatch_core::CardIdentifier;
    use rstest::rstest;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn uid(hex: &str) -> CardIdentifier {
        CardIdentifier::from_hex(hex).unwrap()
    }

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(TIMEOUT, 200)
    }

    #[test]
    fn test_first_detection_emits_change() {
        let mut tracker = tracker();
        let now = Instant::now();

        let seen = tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), now);

        assert_eq!(seen.event, Some(PresenceEvent::CardChanged(uid("A1B2C3D4"))));
        assert!(!seen.resync_requested);
        assert_eq!(tracker.state(), &PresenceState::Present(uid("A1B2C3D4")));
        assert_eq!(tracker.last_seen_at(), Some(now));
    }

    #[test]
    fn test_same_card_refreshes_without_event() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), start);
        tracker.observe(&PollResult::NotDetected, start);

        let later = start + Duration::from_millis(300);
        let seen = tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), later);

        assert_eq!(seen.event, None);
        assert_eq!(tracker.empty_cycles(), 0);
        assert_eq!(tracker.last_seen_at(), Some(later));
    }

    #[rstest]
    #[case("A1B2C3D4", "A1B2C3D5")]
    #[case("A1B2C3D4", "A1B2C3D4000000")]
    #[case("04112233445566", "04112233445566778899")]
    fn test_different_card_emits_change(#[case] first: &str, #[case] second: &str) {
        let mut tracker = tracker();
        let now = Instant::now();
        tracker.observe(&PollResult::Detected(uid(first)), now);

        let seen = tracker.observe(&PollResult::Detected(uid(second)), now);

        assert_eq!(seen.event, Some(PresenceEvent::CardChanged(uid(second))));
        assert_eq!(tracker.state().current(), Some(&uid(second)));
    }

    #[test]
    fn test_detect_then_remove_scenario() {
        let mut tracker = tracker();
        let start = Instant::now();
        let card = PollResult::Detected(uid("A1B2C3D4"));

        let events: Vec<_> = [
            (card.clone(), start),
            (card, start + Duration::from_millis(50)),
            (PollResult::NotDetected, start + Duration::from_millis(100)),
            (PollResult::NotDetected, start + Duration::from_millis(600)),
        ]
        .iter()
        .filter_map(|(poll, at)| tracker.observe(poll, *at).event)
        .map(|event| event.to_string())
        .collect();

        assert_eq!(events, vec!["changed→A1B2C3D4", "removed"]);
        assert_eq!(tracker.state(), &PresenceState::Absent);
    }

    #[test]
    fn test_single_miss_never_removes() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), start);

        let seen = tracker.observe(&PollResult::NotDetected, start + Duration::from_secs(60));

        assert_eq!(seen.event, None);
        assert!(tracker.state().is_present());
    }

    #[test]
    fn test_removal_waits_for_timeout() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), start);

        for _ in 0..20 {
            let seen = tracker.observe(&PollResult::NotDetected, start + TIMEOUT);
            assert_eq!(seen.event, None);
        }

        let seen = tracker.observe(
            &PollResult::NotDetected,
            start + TIMEOUT + Duration::from_millis(1),
        );
        assert_eq!(seen.event, Some(PresenceEvent::CardRemoved));
    }

    #[test]
    fn test_no_removal_event_while_absent() {
        let mut tracker = tracker();
        let start = Instant::now();

        for i in 1..=10 {
            let seen = tracker.observe(&PollResult::NotDetected, start + TIMEOUT * i);
            assert_eq!(seen.event, None);
            assert_eq!(tracker.empty_cycles(), i);
        }
    }

    #[test]
    fn test_resync_after_threshold() {
        let mut tracker = tracker();
        let now = Instant::now();
        let mut resyncs = 0;

        for _ in 0..201 {
            if tracker.observe(&PollResult::NotDetected, now).resync_requested {
                resyncs += 1;
                tracker.note_resync();
            }
        }

        assert_eq!(resyncs, 1);
        assert_eq!(tracker.empty_cycles(), 0);
    }

    #[test]
    fn test_resync_not_requested_at_threshold() {
        let mut tracker = PresenceTracker::new(TIMEOUT, 3);
        let now = Instant::now();

        for _ in 0..3 {
            assert!(!tracker.observe(&PollResult::NotDetected, now).resync_requested);
        }
        assert!(tracker.observe(&PollResult::NotDetected, now).resync_requested);
    }

    #[test]
    fn test_missed_poll_cap_forces_removal() {
        let mut tracker = tracker().with_max_missed_polls(Some(3));
        let start = Instant::now();
        tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), start);

        // Clock never advances
        assert_eq!(tracker.observe(&PollResult::NotDetected, start).event, None);
        assert_eq!(tracker.observe(&PollResult::NotDetected, start).event, None);
        assert_eq!(
            tracker.observe(&PollResult::NotDetected, start).event,
            Some(PresenceEvent::CardRemoved)
        );
    }

    #[test]
    fn test_missed_poll_cap_survives_resync() {
        let mut tracker = PresenceTracker::new(TIMEOUT, 3).with_max_missed_polls(Some(6));
        let start = Instant::now();
        tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), start);

        let mut removed_at = None;
        for poll in 1..=20u32 {
            let seen = tracker.observe(&PollResult::NotDetected, start);
            if seen.resync_requested {
                tracker.note_resync();
            }
            if seen.event == Some(PresenceEvent::CardRemoved) {
                removed_at = Some(poll);
                break;
            }
        }

        // Resync after the 4th miss clears the silence counter but not the cap
        assert_eq!(removed_at, Some(6));
        assert_eq!(tracker.empty_cycles(), 2);
        assert_eq!(tracker.missed_since_seen(), 6);
    }

    #[test]
    fn test_detection_clears_missed_polls() {
        let mut tracker = tracker().with_max_missed_polls(Some(3));
        let start = Instant::now();
        tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), start);
        tracker.observe(&PollResult::NotDetected, start);
        tracker.observe(&PollResult::NotDetected, start);
        tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), start);

        assert_eq!(tracker.missed_since_seen(), 0);
        assert_eq!(tracker.observe(&PollResult::NotDetected, start).event, None);
        assert_eq!(tracker.observe(&PollResult::NotDetected, start).event, None);
    }

    #[test]
    fn test_without_cap_stalled_clock_defers_removal() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), start);

        for _ in 0..100 {
            assert_eq!(tracker.observe(&PollResult::NotDetected, start).event, None);
        }
        assert!(tracker.state().is_present());
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut tracker = tracker();
        let now = Instant::now();
        tracker.observe(&PollResult::Detected(uid("A1B2C3D4")), now);
        tracker.observe(&PollResult::NotDetected, now);
        assert!(!tracker.is_initial());

        tracker.reset();

        assert!(tracker.is_initial());
    }

    #[test]
    fn test_from_config() {
        let config = MonitorConfig::default()
            .with_removal_timeout(Duration::from_millis(750))
            .with_resync_threshold(42)
            .with_max_missed_polls(Some(8));
        let tracker = PresenceTracker::from_config(&config);

        assert_eq!(tracker.removal_timeout(), Duration::from_millis(750));
        assert_eq!(tracker.resync_threshold(), 42);
        assert!(tracker.is_initial());
    }
}
