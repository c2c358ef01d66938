//! Common types shared across hardware device implementations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value read from the reader's identification register.
///
/// The register encodes chip type and firmware revision. Bring-up only
/// trusts a reader whose version appears in a configured whitelist.
///
/// # Examples
///
/// ```
/// use cardwatch_hardware::types::FirmwareVersion;
///
/// let version = FirmwareVersion::new(0x92);
/// assert_eq!(version.name(), "MFRC522 v2.0");
/// assert!(version.is_known_in(&[0x91, 0x92]));
/// assert!(!FirmwareVersion::new(0x00).is_known_in(&[0x91, 0x92]));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion(u8);

impl FirmwareVersion {
    pub fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw register value.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Human-readable chip name for the register value.
    ///
    /// `0x00` and `0xFF` usually mean the SPI bus is floating or the chip
    /// is unpowered.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self.0 {
            0x88 => "FM17522 clone",
            0x90 => "MFRC522 v0.0",
            0x91 => "MFRC522 v1.0",
            0x92 => "MFRC522 v2.0",
            0xB2 => "FM17522 clone (rev B)",
            0x12 => "counterfeit MFRC522",
            0x00 | 0xFF => "no response",
            _ => "unknown",
        }
    }

    /// Check the version against a whitelist of accepted values.
    #[must_use]
    pub fn is_known_in(&self, known: &[u8]) -> bool {
        known.contains(&self.0)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x88, "FM17522 clone")]
    #[case(0x91, "MFRC522 v1.0")]
    #[case(0x92, "MFRC522 v2.0")]
    #[case(0x00, "no response")]
    #[case(0xFF, "no response")]
    #[case(0x42, "unknown")]
    fn test_firmware_version_name(#[case] raw: u8, #[case] expected: &str) {
        assert_eq!(FirmwareVersion::new(raw).name(), expected);
    }

    #[test]
    fn test_firmware_version_display() {
        assert_eq!(
            FirmwareVersion::new(0x91).to_string(),
            "MFRC522 v1.0 (0x91)"
        );
    }

    #[test]
    fn test_firmware_version_serialization() {
        let version = FirmwareVersion::new(0x92);
        let json = serde_json::to_string(&version).unwrap();
        let deserialized: FirmwareVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(version, deserialized);
    }
}
