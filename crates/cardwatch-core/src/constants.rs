//! Core constants for the card presence monitor.
//!
//! This module collects the identifier rules, default timings and report
//! strings shared by every crate in the workspace. Timing defaults are in
//! milliseconds so they can be used directly in configuration files.
//!
//! # Usage
//!
//! ```
//! use cardwatch_core::constants::*;
//! use std::time::Duration;
//!
//! assert!(VALID_UID_LENGTHS.contains(&7));
//!
//! let removal = Duration::from_millis(DEFAULT_REMOVAL_TIMEOUT_MS);
//! assert_eq!(removal.as_millis(), 500);
//! ```

// ============================================================================
// Card Identifiers
// ============================================================================

/// UID sizes defined by ISO/IEC 14443-3: single (4), double (7) and
/// triple (10) size identifiers.
///
/// Any other length returned by the reader is treated as "no card".
pub const VALID_UID_LENGTHS: [usize; 3] = [4, 7, 10];

// ============================================================================
// Reader Bring-up
// ============================================================================

/// Number of bring-up attempts before initialization is declared fatal.
pub const DEFAULT_INIT_ATTEMPTS: u32 = 5;

/// Settling time between bring-up attempts (milliseconds).
///
/// Gives the reader's analog front end time to stabilize after a reset.
pub const DEFAULT_INIT_RETRY_DELAY_MS: u64 = 500;

/// Identification register values accepted as a working reader.
///
/// | Value | Chip |
/// |-------|------|
/// | `0x88` | FM17522 clone |
/// | `0x91` | MFRC522 v1.0 |
/// | `0x92` | MFRC522 v2.0 |
/// | `0xB2` | FM17522 clone (later revision) |
pub const DEFAULT_KNOWN_VERSIONS: [u8; 4] = [0x88, 0x91, 0x92, 0xB2];

/// Receiver gain written to `RFCfgReg` during bring-up and resync.
///
/// `0x70` selects the maximum 48 dB gain.
pub const DEFAULT_ANTENNA_GAIN: u8 = 0x70;

// ============================================================================
// Presence Tracking
// ============================================================================

/// Minimum time since the last successful read before a card may be
/// reported as removed (milliseconds).
pub const DEFAULT_REMOVAL_TIMEOUT_MS: u64 = 500;

/// Number of consecutive empty polls tolerated before the reader is
/// resynchronized.
pub const DEFAULT_RESYNC_THRESHOLD: u32 = 200;

/// Settling time after a resync (milliseconds).
pub const DEFAULT_RESYNC_SETTLE_MS: u64 = 10;

// ============================================================================
// Control Loop
// ============================================================================

/// Pause between control-loop ticks (milliseconds).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Indicator on-time for a card change (milliseconds).
pub const DEFAULT_INDICATOR_PULSE_MS: u64 = 50;

/// Watchdog timeout (milliseconds).
///
/// Must exceed the worst-case blocking time of a single tick and of the
/// full bring-up sequence.
pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Reports
// ============================================================================

/// Line written when the current card leaves the reader.
///
/// Downstream consumers treat every other line as an uppercase hex UID.
pub const REMOVED_REPORT: &str = "removed";
