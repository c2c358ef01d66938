//! Mock reader IC for testing and development.
//!
//! This module provides a simulated reader that keeps a small register file
//! and a card slot that can be controlled programmatically, so the presence
//! monitor can be exercised without an SPI bus.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    HardwareError, Result,
    registers::{Register, TX_CONTROL_ANTENNA_ON},
    traits::ReaderDriver,
};

/// Version register value reported by a freshly created mock.
pub const MOCK_DEFAULT_VERSION: u8 = 0x92;

/// Register operations kept in each of the read and write logs.
pub const MOCK_LOG_CAPACITY: usize = 256;

/// `TxControlReg` reset value (antenna drivers off).
const TX_CONTROL_RESET: u8 = 0x80;

/// Mock reader IC.
///
/// Card presence, register values and failure injection are controlled
/// through the [`MockReaderHandle`] returned by [`MockReader::new`].
///
/// # Examples
///
/// ```
/// use cardwatch_hardware::mock::MockReader;
/// use cardwatch_hardware::traits::ReaderDriver;
///
/// #[tokio::main]
/// async fn main() -> cardwatch_hardware::Result<()> {
///     let (mut reader, handle) = MockReader::new();
///
///     handle.present_card(vec![0x04, 0xAB, 0xCD, 0xEF]);
///
///     assert!(reader.detect_new_card().await?);
///     assert_eq!(reader.read_serial().await?, vec![0x04, 0xAB, 0xCD, 0xEF]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockReader {
    state: Arc<Mutex<MockReaderState>>,
}

#[derive(Debug)]
struct MockReaderState {
    registers: HashMap<Register, u8>,
    version: u8,

    /// Serial of the card currently in the field.
    card: Option<Vec<u8>>,

    /// Card received HLTA and will not answer until presented again.
    halted: bool,

    /// Every bus operation fails while set.
    bus_fault: bool,
    fail_initialize: bool,
    missed_detects: u32,
    failed_serial_reads: u32,

    writes: VecDeque<(Register, u8)>,
    reads: VecDeque<Register>,
    init_count: u32,
    halt_count: u32,
    stop_crypto_count: u32,
}

impl MockReaderState {
    fn new() -> Self {
        let mut state = Self {
            registers: HashMap::new(),
            version: MOCK_DEFAULT_VERSION,
            card: None,
            halted: false,
            bus_fault: false,
            fail_initialize: false,
            missed_detects: 0,
            failed_serial_reads: 0,
            writes: VecDeque::with_capacity(MOCK_LOG_CAPACITY),
            reads: VecDeque::with_capacity(MOCK_LOG_CAPACITY),
            init_count: 0,
            halt_count: 0,
            stop_crypto_count: 0,
        };
        state.reset_registers();
        state
    }

    fn reset_registers(&mut self) {
        self.registers.clear();
        self.registers.insert(Register::TxControl, TX_CONTROL_RESET);
        self.registers.insert(Register::Version, self.version);
    }

    fn check_bus(&self) -> Result<()> {
        if self.bus_fault {
            return Err(HardwareError::communication("SPI transfer failed"));
        }
        Ok(())
    }

    fn write(&mut self, register: Register, value: u8) {
        self.registers.insert(register, value);
        record(&mut self.writes, (register, value));
    }
}

/// Append to a bounded log, dropping the oldest entry when full.
fn record<T>(log: &mut VecDeque<T>, entry: T) {
    if log.len() == MOCK_LOG_CAPACITY {
        log.pop_front();
    }
    log.push_back(entry);
}

fn lock(state: &Mutex<MockReaderState>) -> MutexGuard<'_, MockReaderState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockReader {
    /// Create a new mock reader with an empty field.
    ///
    /// Returns a tuple of (MockReader, MockReaderHandle) where the handle
    /// can be used to present cards and inject faults.
    pub fn new() -> (Self, MockReaderHandle) {
        let state = Arc::new(Mutex::new(MockReaderState::new()));
        let reader = Self {
            state: Arc::clone(&state),
        };
        (reader, MockReaderHandle { state })
    }
}

impl Default for MockReader {
    fn default() -> Self {
        Self::new().0
    }
}

impl ReaderDriver for MockReader {
    async fn initialize(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.check_bus()?;
        if state.fail_initialize {
            return Err(HardwareError::initialization_failed("soft reset timed out"));
        }
        state.init_count += 1;
        state.reset_registers();
        Ok(())
    }

    async fn enable_field(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.check_bus()?;
        let current = state
            .registers
            .get(&Register::TxControl)
            .copied()
            .unwrap_or(TX_CONTROL_RESET);
        state.write(Register::TxControl, current | TX_CONTROL_ANTENNA_ON);
        Ok(())
    }

    async fn read_register(&mut self, register: Register) -> Result<u8> {
        let mut state = lock(&self.state);
        state.check_bus()?;
        record(&mut state.reads, register);
        let value = match register {
            Register::Version => state.version,
            other => state.registers.get(&other).copied().unwrap_or(0x00),
        };
        Ok(value)
    }

    async fn write_register(&mut self, register: Register, value: u8) -> Result<()> {
        let mut state = lock(&self.state);
        state.check_bus()?;
        state.write(register, value);
        Ok(())
    }

    async fn detect_new_card(&mut self) -> Result<bool> {
        let mut state = lock(&self.state);
        state.check_bus()?;
        if state.card.is_none() || state.halted {
            return Ok(false);
        }
        if state.missed_detects > 0 {
            state.missed_detects -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    async fn read_serial(&mut self) -> Result<Vec<u8>> {
        let mut state = lock(&self.state);
        state.check_bus()?;
        if state.failed_serial_reads > 0 {
            state.failed_serial_reads -= 1;
            return Err(HardwareError::card_read("anticollision failed"));
        }
        state
            .card
            .clone()
            .ok_or_else(|| HardwareError::card_read("card left the field"))
    }

    async fn halt_card(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.check_bus()?;
        state.halt_count += 1;
        if state.card.is_some() {
            state.halted = true;
        }
        Ok(())
    }

    async fn stop_crypto(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.check_bus()?;
        state.stop_crypto_count += 1;
        Ok(())
    }
}

/// Handle for controlling a mock reader.
///
/// Clones share the same underlying reader state.
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    state: Arc<Mutex<MockReaderState>>,
}

impl MockReaderHandle {
    /// Put a card with the given serial into the field.
    ///
    /// The serial is returned verbatim by `read_serial`, so malformed
    /// lengths can be simulated. Presenting a card clears any halt.
    pub fn present_card(&self, serial: Vec<u8>) {
        let mut state = lock(&self.state);
        state.card = Some(serial);
        state.halted = false;
    }

    /// Take the card out of the field.
    pub fn remove_card(&self) {
        let mut state = lock(&self.state);
        state.card = None;
        state.halted = false;
    }

    /// Serial of the card currently in the field, if any.
    pub fn current_card(&self) -> Option<Vec<u8>> {
        lock(&self.state).card.clone()
    }

    /// Set the value reported by the version register.
    pub fn set_version(&self, version: u8) {
        lock(&self.state).version = version;
    }

    /// Make every bus operation fail until cleared.
    pub fn set_bus_fault(&self, fault: bool) {
        lock(&self.state).bus_fault = fault;
    }

    /// Make `initialize` fail until cleared.
    pub fn fail_initialize(&self, fail: bool) {
        lock(&self.state).fail_initialize = fail;
    }

    /// Make the next `count` detections miss a present card.
    pub fn miss_detections(&self, count: u32) {
        lock(&self.state).missed_detects = count;
    }

    /// Make the next `count` serial reads fail.
    pub fn fail_serial_reads(&self, count: u32) {
        lock(&self.state).failed_serial_reads = count;
    }

    /// Current value of a register.
    pub fn register(&self, register: Register) -> u8 {
        let state = lock(&self.state);
        match register {
            Register::Version => state.version,
            other => state.registers.get(&other).copied().unwrap_or(0x00),
        }
    }

    /// Register writes in the order they happened.
    pub fn writes(&self) -> Vec<(Register, u8)> {
        lock(&self.state).writes.iter().copied().collect()
    }

    /// Register reads in the order they happened.
    pub fn reads(&self) -> Vec<Register> {
        lock(&self.state).reads.iter().copied().collect()
    }

    /// Forget recorded reads and writes.
    pub fn clear_log(&self) {
        let mut state = lock(&self.state);
        state.writes.clear();
        state.reads.clear();
    }

    /// Number of successful `initialize` calls.
    pub fn init_count(&self) -> u32 {
        lock(&self.state).init_count
    }

    /// Number of successful `halt_card` calls.
    pub fn halt_count(&self) -> u32 {
        lock(&self.state).halt_count
    }

    /// Number of successful `stop_crypto` calls.
    pub fn stop_crypto_count(&self) -> u32 {
        lock(&self.state).stop_crypto_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_reader_present_and_read() {
        let (mut reader, handle) = MockReader::new();

        assert!(!reader.detect_new_card().await.unwrap());

        handle.present_card(vec![0x04, 0xAB, 0xCD, 0xEF]);
        assert!(reader.detect_new_card().await.unwrap());
        assert_eq!(
            reader.read_serial().await.unwrap(),
            vec![0x04, 0xAB, 0xCD, 0xEF]
        );

        handle.remove_card();
        assert!(!reader.detect_new_card().await.unwrap());
        assert!(reader.read_serial().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_reader_halt_until_represented() {
        let (mut reader, handle) = MockReader::new();
        handle.present_card(vec![0x01, 0x02, 0x03, 0x04]);

        reader.halt_card().await.unwrap();
        assert!(!reader.detect_new_card().await.unwrap());

        handle.present_card(vec![0x01, 0x02, 0x03, 0x04]);
        assert!(reader.detect_new_card().await.unwrap());
        assert_eq!(handle.halt_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_reader_missed_detections() {
        let (mut reader, handle) = MockReader::new();
        handle.present_card(vec![0x01, 0x02, 0x03, 0x04]);
        handle.miss_detections(2);

        assert!(!reader.detect_new_card().await.unwrap());
        assert!(!reader.detect_new_card().await.unwrap());
        assert!(reader.detect_new_card().await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_reader_version_and_registers() {
        let (mut reader, handle) = MockReader::new();
        assert_eq!(
            reader.read_register(Register::Version).await.unwrap(),
            MOCK_DEFAULT_VERSION
        );

        handle.set_version(0x00);
        assert_eq!(reader.read_register(Register::Version).await.unwrap(), 0x00);

        reader.write_register(Register::RfCfg, 0x70).await.unwrap();
        assert_eq!(handle.register(Register::RfCfg), 0x70);
        assert_eq!(handle.writes(), vec![(Register::RfCfg, 0x70)]);
        assert_eq!(handle.reads(), vec![Register::Version, Register::Version]);
    }

    #[tokio::test]
    async fn test_mock_reader_log_is_bounded() {
        let (mut reader, handle) = MockReader::new();

        for value in 0..=u8::MAX {
            reader.write_register(Register::RfCfg, value).await.unwrap();
        }
        reader.write_register(Register::Coll, 0x80).await.unwrap();
        for _ in 0..300 {
            reader.read_register(Register::Version).await.unwrap();
        }

        let writes = handle.writes();
        assert_eq!(writes.len(), MOCK_LOG_CAPACITY);
        assert_eq!(writes.first(), Some(&(Register::RfCfg, 0x01)));
        assert_eq!(writes.last(), Some(&(Register::Coll, 0x80)));
        assert_eq!(handle.reads().len(), MOCK_LOG_CAPACITY);
    }

    #[tokio::test]
    async fn test_mock_reader_initialize_resets_registers() {
        let (mut reader, handle) = MockReader::new();
        reader.write_register(Register::RfCfg, 0x70).await.unwrap();

        reader.initialize().await.unwrap();

        assert_eq!(handle.register(Register::RfCfg), 0x00);
        assert_eq!(handle.register(Register::TxControl), TX_CONTROL_RESET);
        assert_eq!(handle.init_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_reader_bus_fault() {
        let (mut reader, handle) = MockReader::new();
        handle.set_bus_fault(true);

        assert!(matches!(
            reader.detect_new_card().await,
            Err(HardwareError::CommunicationError { .. })
        ));
        assert!(reader.initialize().await.is_err());
        assert_eq!(handle.init_count(), 0);
    }

    #[test]
    fn test_mock_reader_handle_clone_shares_state() {
        let (_reader, handle) = MockReader::new();
        let other = handle.clone();

        other.present_card(vec![0x01, 0x02, 0x03, 0x04]);
        assert_eq!(handle.current_card(), Some(vec![0x01, 0x02, 0x03, 0x04]));
    }
}
