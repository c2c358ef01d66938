//! Mock device implementations for testing and development.
//!
//! This module provides simulated devices that can be controlled
//! programmatically without requiring physical hardware.

pub mod indicator;
pub mod reader;
pub mod watchdog;

// Re-export commonly used types
pub use indicator::{MockIndicator, MockIndicatorHandle};
pub use reader::{MOCK_DEFAULT_VERSION, MOCK_LOG_CAPACITY, MockReader, MockReaderHandle};
pub use watchdog::{MockWatchdog, MockWatchdogHandle};
