//! Mock watchdog for testing.
//!
//! Records feeds and restart requests instead of restarting anything.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{HardwareError, Result, traits::Watchdog};

/// Mock watchdog supervisor.
///
/// # Examples
///
/// ```
/// use cardwatch_hardware::mock::MockWatchdog;
/// use cardwatch_hardware::traits::Watchdog;
///
/// #[tokio::main]
/// async fn main() -> cardwatch_hardware::Result<()> {
///     let (mut watchdog, handle) = MockWatchdog::new();
///
///     watchdog.feed().await?;
///     watchdog.feed().await?;
///
///     assert_eq!(handle.feed_count(), 2);
///     assert!(handle.restart_requests().is_empty());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockWatchdog {
    state: Arc<Mutex<MockWatchdogState>>,
}

#[derive(Debug, Default)]
struct MockWatchdogState {
    feeds: u64,
    restart_requests: Vec<String>,
    expired: bool,
}

fn lock(state: &Mutex<MockWatchdogState>) -> MutexGuard<'_, MockWatchdogState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockWatchdog {
    /// Create a new mock watchdog and its inspection handle.
    pub fn new() -> (Self, MockWatchdogHandle) {
        let state = Arc::new(Mutex::new(MockWatchdogState::default()));
        let watchdog = Self {
            state: Arc::clone(&state),
        };
        (watchdog, MockWatchdogHandle { state })
    }
}

impl Default for MockWatchdog {
    fn default() -> Self {
        Self::new().0
    }
}

impl Watchdog for MockWatchdog {
    async fn feed(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.expired {
            return Err(HardwareError::disconnected("watchdog"));
        }
        state.feeds += 1;
        Ok(())
    }

    async fn request_restart(&mut self, reason: &str) -> Result<()> {
        lock(&self.state).restart_requests.push(reason.to_string());
        Ok(())
    }
}

/// Handle for inspecting a mock watchdog.
#[derive(Debug, Clone)]
pub struct MockWatchdogHandle {
    state: Arc<Mutex<MockWatchdogState>>,
}

impl MockWatchdogHandle {
    /// Number of successful feeds.
    pub fn feed_count(&self) -> u64 {
        lock(&self.state).feeds
    }

    /// Reasons passed to `request_restart`, in order.
    pub fn restart_requests(&self) -> Vec<String> {
        lock(&self.state).restart_requests.clone()
    }

    /// Simulate the watchdog having fired; later feeds fail.
    pub fn expire(&self) {
        lock(&self.state).expired = true;
    }
}
