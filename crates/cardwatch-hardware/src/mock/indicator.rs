//! Mock indicator for testing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{Result, traits::Indicator};

/// Mock status LED that records every level change.
#[derive(Debug)]
pub struct MockIndicator {
    state: Arc<Mutex<Vec<bool>>>,
}

fn lock(state: &Mutex<Vec<bool>>) -> MutexGuard<'_, Vec<bool>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockIndicator {
    /// Create a new mock indicator and its inspection handle.
    pub fn new() -> (Self, MockIndicatorHandle) {
        let state = Arc::new(Mutex::new(Vec::new()));
        let indicator = Self {
            state: Arc::clone(&state),
        };
        (indicator, MockIndicatorHandle { state })
    }
}

impl Default for MockIndicator {
    fn default() -> Self {
        Self::new().0
    }
}

impl Indicator for MockIndicator {
    async fn set(&mut self, on: bool) -> Result<()> {
        lock(&self.state).push(on);
        Ok(())
    }
}

/// Handle for inspecting a mock indicator.
#[derive(Debug, Clone)]
pub struct MockIndicatorHandle {
    state: Arc<Mutex<Vec<bool>>>,
}

impl MockIndicatorHandle {
    /// Every level written, in order.
    pub fn history(&self) -> Vec<bool> {
        lock(&self.state).clone()
    }

    /// Number of times the indicator was switched on.
    pub fn pulse_count(&self) -> usize {
        lock(&self.state).iter().filter(|on| **on).count()
    }

    /// Last level written (off if never set).
    pub fn is_on(&self) -> bool {
        lock(&self.state).last().copied().unwrap_or(false)
    }
}
