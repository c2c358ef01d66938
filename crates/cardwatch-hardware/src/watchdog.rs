//! Software watchdog for hosted deployments.
//!
//! On a microcontroller the watchdog is a hardware timer. When the monitor
//! runs as a regular process, [`SoftwareWatchdog`] plays the same role: a
//! dedicated supervisor thread expects a feed within the timeout and
//! otherwise invokes an expiry callback, which is expected to terminate the
//! process so the service manager restarts it.
//!
//! The supervisor runs on its own OS thread rather than a tokio task so it
//! still fires when the runtime itself is stuck.
//!
//! # Examples
//!
//! ```no_run
//! use cardwatch_hardware::watchdog::{SoftwareWatchdog, WatchdogExpiry};
//! use cardwatch_hardware::traits::Watchdog;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> cardwatch_hardware::Result<()> {
//!     let mut watchdog = SoftwareWatchdog::start(Duration::from_secs(10), |expiry| {
//!         eprintln!("watchdog fired: {expiry}");
//!         std::process::exit(71);
//!     })?;
//!
//!     loop {
//!         watchdog.feed().await?;
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!     }
//! }
//! ```

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, error};

use crate::{HardwareError, Result, traits::Watchdog};

/// Why the watchdog fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogExpiry {
    /// No feed arrived within the timeout.
    Starved { timeout: Duration },

    /// A component asked for a restart explicitly.
    RestartRequested { reason: String },
}

impl fmt::Display for WatchdogExpiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starved { timeout } => {
                write!(f, "not fed within {}ms", timeout.as_millis())
            }
            Self::RestartRequested { reason } => write!(f, "restart requested: {}", reason),
        }
    }
}

enum Signal {
    Feed,
    Restart(String),
}

/// Thread-backed watchdog supervisor.
///
/// Dropping the watchdog stops the supervisor without firing.
#[derive(Debug)]
pub struct SoftwareWatchdog {
    tx: mpsc::Sender<Signal>,
}

impl SoftwareWatchdog {
    /// Start the supervisor thread.
    ///
    /// `on_expire` runs at most once, on the supervisor thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the supervisor thread cannot be spawned.
    pub fn start<F>(timeout: Duration, on_expire: F) -> Result<Self>
    where
        F: FnOnce(WatchdogExpiry) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || supervise(rx, timeout, on_expire))
            .map_err(|e| HardwareError::other(format!("failed to spawn watchdog thread: {e}")))?;

        debug!(timeout_ms = timeout.as_millis() as u64, "Watchdog armed");
        Ok(Self { tx })
    }
}

fn supervise<F>(rx: mpsc::Receiver<Signal>, timeout: Duration, on_expire: F)
where
    F: FnOnce(WatchdogExpiry),
{
    loop {
        match rx.recv_timeout(timeout) {
            Ok(Signal::Feed) => continue,
            Ok(Signal::Restart(reason)) => {
                error!(%reason, "Restart requested");
                on_expire(WatchdogExpiry::RestartRequested { reason });
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                error!(timeout_ms = timeout.as_millis() as u64, "Watchdog starved");
                on_expire(WatchdogExpiry::Starved { timeout });
                return;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Watchdog disarmed");
                return;
            }
        }
    }
}

impl Watchdog for SoftwareWatchdog {
    async fn feed(&mut self) -> Result<()> {
        self.tx
            .send(Signal::Feed)
            .map_err(|_| HardwareError::disconnected("watchdog"))
    }

    async fn request_restart(&mut self, reason: &str) -> Result<()> {
        self.tx
            .send(Signal::Restart(reason.to_string()))
            .map_err(|_| HardwareError::disconnected("watchdog"))
    }
}
