//! Hardware abstraction layer for the card presence monitor.
//!
//! This crate defines the peripherals the monitor drives and the adapter
//! that turns the raw reader IC surface into presence-level operations:
//!
//! - [`ReaderDriver`]: the contactless reader IC capability set
//!   (initialize, field on, register access, detect, serial, halt, stop crypto)
//! - [`Watchdog`]: the supervisor that must be fed every control-loop tick
//! - [`Indicator`]: a binary status output pulsed on card changes
//! - [`CardReader`]: the adapter providing bring-up, one-shot polling and
//!   register-level resynchronization on top of any [`ReaderDriver`]
//!
//! # Design Philosophy
//!
//! - **Async-first**: All I/O operations are asynchronous using native `async fn`
//!   in traits (Rust 1.90 + Edition 2024 RPITIT).
//! - **Generic dispatch**: The monitor is generic over its devices; there is
//!   exactly one owner of each device, so no trait objects or locking.
//! - **Error-aware**: All operations return `Result<T>` with detailed error information.
//!
//! # Polling a Reader
//!
//! ```
//! use cardwatch_hardware::mock::MockReader;
//! use cardwatch_hardware::reader::CardReader;
//!
//! #[tokio::main]
//! async fn main() -> cardwatch_hardware::Result<()> {
//!     let (driver, handle) = MockReader::new();
//!     let mut reader = CardReader::new(driver);
//!     reader.bring_up(0x70).await?;
//!
//!     handle.present_card(vec![0x04, 0xAB, 0xCD, 0xEF]);
//!     if let Some(uid) = reader.poll_once().await.identifier() {
//!         println!("{}", uid);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Mock Implementations
//!
//! The [`mock`] module provides simulated reader, watchdog and indicator
//! devices, each paired with a handle for driving or inspecting it from
//! tests and from the command-line simulator.
//!
//! [`ReaderDriver`]: traits::ReaderDriver
//! [`Watchdog`]: traits::Watchdog
//! [`Indicator`]: traits::Indicator
//! [`CardReader`]: reader::CardReader

pub mod error;
pub mod mock;
pub mod reader;
pub mod registers;
pub mod traits;
pub mod types;
pub mod watchdog;

// Re-export commonly used types for convenience
pub use error::{HardwareError, Result};
pub use reader::CardReader;
pub use registers::Register;
pub use traits::{Indicator, ReaderDriver, Watchdog};
pub use types::FirmwareVersion;
pub use watchdog::{SoftwareWatchdog, WatchdogExpiry};
