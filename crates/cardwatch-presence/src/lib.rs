//! Card presence monitor.
//!
//! This crate holds the stateful part of the system:
//!
//! - [`PresenceTracker`]: current card, removal debounce, empty-cycle count
//! - [`LifecycleManager`]: bring-up with retry and register-level resync
//! - [`ControlLoop`]: the per-tick composition of watchdog, poll, tracker,
//!   report and recovery
//! - [`LineReporter`]: one text line per presence event
//! - [`MonitorConfig`]: every delay and threshold, with validation
//!
//! Devices come from `cardwatch-hardware` and are consumed through its
//! traits, so the same loop drives real hardware and the mocks.
//!
//! # Lifecycle
//!
//! ```text
//! start ── initialize (≤ N attempts) ──┬── fatal: request restart, exit
//!                                      │
//!                                      └── tick ─┬─ feed watchdog
//!                                          ▲     ├─ poll reader
//!                                          │     ├─ classify
//!                                          │     ├─ report / pulse / release
//!                                          │     ├─ resync if silent
//!                                          └─────┴─ sleep
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod lifecycle;
pub mod report;
pub mod tracker;

pub use config::MonitorConfig;
pub use control::{ControlLoop, MonitorStats, TickOutcome};
pub use error::{MonitorError, Result};
pub use lifecycle::LifecycleManager;
pub use report::LineReporter;
pub use tracker::{Observation, PresenceTracker};
