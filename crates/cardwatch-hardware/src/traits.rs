//! Hardware device trait definitions.
//!
//! This module defines the contract between the presence monitor and the
//! peripherals it drives: the contactless reader IC, the watchdog supervisor
//! and the indicator output. Real drivers and the mocks in [`crate::mock`]
//! implement the same traits so the monitor can run unchanged against either.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::registers::Register;

/// Reader IC capability set.
///
/// This is the raw driver surface consumed as-is; nothing here assumes a
/// particular SPI framing. The state machine never calls these directly:
/// [`CardReader`](crate::reader::CardReader) wraps them into poll, bring-up
/// and resync operations.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`, which is an opaque type that cannot be used in trait objects
/// (Edition 2024 RPITIT). Use generic type parameters:
///
/// ```no_run
/// use cardwatch_hardware::traits::ReaderDriver;
/// use cardwatch_hardware::registers::Register;
/// use cardwatch_hardware::error::Result;
///
/// async fn chip_version<D: ReaderDriver>(driver: &mut D) -> Result<u8> {
///     driver.initialize().await?;
///     driver.read_register(Register::Version).await
/// }
/// ```
pub trait ReaderDriver: Send + Sync {
    /// Reset the IC and load its default timer/modulation configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus transfer fails.
    async fn initialize(&mut self) -> Result<()>;

    /// Switch the RF field on.
    async fn enable_field(&mut self) -> Result<()>;

    /// Read one register.
    async fn read_register(&mut self, register: Register) -> Result<u8>;

    /// Write one register.
    async fn write_register(&mut self, register: Register, value: u8) -> Result<()>;

    /// Check whether a card in the idle state answered a request.
    ///
    /// Returns `Ok(false)` when the field is empty.
    async fn detect_new_card(&mut self) -> Result<bool>;

    /// Run anticollision/select and return the card serial.
    ///
    /// The length of the returned vector is whatever the IC reported; it is
    /// not validated here.
    ///
    /// # Errors
    ///
    /// Returns an error if the card stopped answering mid-exchange.
    async fn read_serial(&mut self) -> Result<Vec<u8>>;

    /// Send HLTA so the selected card stops answering requests.
    async fn halt_card(&mut self) -> Result<()>;

    /// Leave any authenticated (Crypto1) session.
    async fn stop_crypto(&mut self) -> Result<()>;
}

/// Watchdog supervisor.
///
/// The watchdog must be fed at least once per control-loop tick, otherwise
/// it restarts the whole process. It is also the path used to ask for a
/// restart explicitly when bring-up cannot verify the reader.
pub trait Watchdog: Send + Sync {
    /// Acknowledge the watchdog, pushing its deadline forward.
    ///
    /// # Errors
    ///
    /// Returns an error if the watchdog has already fired.
    async fn feed(&mut self) -> Result<()>;

    /// Request an immediate full restart.
    async fn request_restart(&mut self, reason: &str) -> Result<()>;
}

/// Binary indicator output (status LED).
pub trait Indicator: Send + Sync {
    /// Turn the indicator on or off.
    async fn set(&mut self, on: bool) -> Result<()>;
}
