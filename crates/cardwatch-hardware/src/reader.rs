//! Reader driver interface adapter.
//!
//! [`CardReader`] turns the raw [`ReaderDriver`] capability set into the
//! three operations the presence monitor needs:
//!
//! - [`bring_up`](CardReader::bring_up): reset, field on, gain, version read
//! - [`poll_once`](CardReader::poll_once): one detection cycle folded into a
//!   [`PollResult`]
//! - [`resynchronize`](CardReader::resynchronize): the register sequence that
//!   brings a wedged IC back to a known state without a full reset
//!
//! # Examples
//!
//! ```
//! use cardwatch_core::PollResult;
//! use cardwatch_hardware::mock::MockReader;
//! use cardwatch_hardware::reader::CardReader;
//!
//! #[tokio::main]
//! async fn main() -> cardwatch_hardware::Result<()> {
//!     let (driver, handle) = MockReader::new();
//!     let mut reader = CardReader::new(driver);
//!
//!     let version = reader.bring_up(0x70).await?;
//!     assert_eq!(version.as_u8(), 0x92);
//!
//!     handle.present_card(vec![0xA1, 0xB2, 0xC3, 0xD4]);
//!     let poll = reader.poll_once().await;
//!     assert_eq!(poll.identifier().map(|uid| uid.to_hex()), Some("A1B2C3D4".to_string()));
//!
//!     handle.remove_card();
//!     assert_eq!(reader.poll_once().await, PollResult::NotDetected);
//!     Ok(())
//! }
//! ```

use cardwatch_core::{CardIdentifier, PollResult};
use tracing::{debug, warn};

use crate::Result;
use crate::registers::{
    COLL_VALUES_AFTER_COLL, COM_IRQ_CLEAR_ALL, FIFO_FLUSH, PCD_IDLE, Register,
};
use crate::traits::ReaderDriver;
use crate::types::FirmwareVersion;

/// Adapter owning a [`ReaderDriver`].
#[derive(Debug)]
pub struct CardReader<D> {
    driver: D,

    /// Reads rejected for a bad UID length since construction.
    malformed_reads: u64,
}

impl<D: ReaderDriver> CardReader<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            malformed_reads: 0,
        }
    }

    /// Reset the IC, switch the field on, apply the receiver gain and
    /// read the identification register.
    ///
    /// The returned version is not checked here; whitelisting is the
    /// lifecycle manager's decision.
    ///
    /// # Errors
    ///
    /// Returns the first driver error encountered.
    pub async fn bring_up(&mut self, antenna_gain: u8) -> Result<FirmwareVersion> {
        self.driver.initialize().await?;
        self.driver.enable_field().await?;
        self.driver
            .write_register(Register::RfCfg, antenna_gain)
            .await?;
        let raw = self.driver.read_register(Register::Version).await?;
        Ok(FirmwareVersion::new(raw))
    }

    /// Run one detection cycle.
    ///
    /// Returns `NotDetected` when no new card answers, when the serial
    /// cannot be read, or when the UID is not 4, 7 or 10 bytes long. In the
    /// last case the card is halted so it does not re-announce the same bad
    /// read on the next cycle. Driver errors never escape a poll.
    pub async fn poll_once(&mut self) -> PollResult {
        match self.driver.detect_new_card().await {
            Ok(true) => {}
            Ok(false) => return PollResult::NotDetected,
            Err(e) => {
                debug!(error = %e, "Card detection failed");
                return PollResult::NotDetected;
            }
        }

        let serial = match self.driver.read_serial().await {
            Ok(serial) => serial,
            Err(e) => {
                debug!(error = %e, "Card serial read failed");
                return PollResult::NotDetected;
            }
        };

        match CardIdentifier::new(&serial) {
            Ok(uid) => PollResult::Detected(uid),
            Err(e) => {
                self.malformed_reads += 1;
                warn!(len = serial.len(), error = %e, "Discarding malformed UID");
                if let Err(e) = self.driver.halt_card().await {
                    warn!(error = %e, "Failed to halt card after malformed read");
                }
                PollResult::NotDetected
            }
        }
    }

    /// Bring the IC back to a known state without a full re-initialization.
    ///
    /// Idles the command state machine, clears pending interrupts, flushes
    /// the FIFO, clears bit framing and collision state, switches the field
    /// back on and reapplies the receiver gain. The identification register
    /// is not re-checked.
    ///
    /// # Errors
    ///
    /// Returns the first driver error; later steps are skipped.
    pub async fn resynchronize(&mut self, antenna_gain: u8) -> Result<()> {
        self.driver.write_register(Register::Command, PCD_IDLE).await?;
        self.driver
            .write_register(Register::ComIrq, COM_IRQ_CLEAR_ALL)
            .await?;
        self.driver
            .write_register(Register::FifoLevel, FIFO_FLUSH)
            .await?;
        self.driver.write_register(Register::BitFraming, 0x00).await?;
        self.driver
            .write_register(Register::Coll, COLL_VALUES_AFTER_COLL)
            .await?;
        self.driver.enable_field().await?;
        self.driver
            .write_register(Register::RfCfg, antenna_gain)
            .await?;
        Ok(())
    }

    /// Halt the card and leave any crypto session.
    ///
    /// Both steps are always attempted; the first error is returned.
    pub async fn release_card(&mut self) -> Result<()> {
        let halted = self.driver.halt_card().await;
        let stopped = self.driver.stop_crypto().await;
        halted.and(stopped)
    }

    /// Number of reads rejected for a bad UID length.
    #[must_use]
    pub fn malformed_reads(&self) -> u64 {
        self.malformed_reads
    }
}
