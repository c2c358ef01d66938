use crate::{
    Result,
    constants::{REMOVED_REPORT, VALID_UID_LENGTHS},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Card unique identifier (4, 7 or 10 bytes).
///
/// Once captured for a presence episode the identifier is immutable; a
/// different card produces a new value.
///
/// Serialized as an uppercase hex string.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardIdentifier(Vec<u8>);

impl CardIdentifier {
    /// Create an identifier from raw UID bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidUidLength` unless the slice is 4, 7 or 10 bytes.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if !Self::is_valid_length(bytes.len()) {
            return Err(Error::InvalidUidLength(bytes.len()));
        }
        Ok(CardIdentifier(bytes.to_vec()))
    }

    /// Parse an identifier from a hex string (case-insensitive, no separators).
    ///
    /// # Errors
    /// Returns `Error::InvalidUidHex` for odd-length or non-hex input, and
    /// `Error::InvalidUidLength` if the decoded byte count is not 4, 7 or 10.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() % 2 != 0 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidUidHex(hex.to_string()));
        }

        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|_| Error::InvalidUidHex(hex.to_string()))?;

        Self::new(&bytes)
    }

    /// Check whether `len` is a valid ISO 14443 UID size.
    #[must_use]
    pub fn is_valid_length(len: usize) -> bool {
        VALID_UID_LENGTHS.contains(&len)
    }

    /// Get the raw UID bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes in the UID.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Uppercase hex encoding without separators (e.g. `A1B2C3D4`).
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

impl fmt::Display for CardIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for CardIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardIdentifier::from_hex(s)
    }
}

impl TryFrom<String> for CardIdentifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        CardIdentifier::from_hex(&value)
    }
}

impl From<CardIdentifier> for String {
    fn from(uid: CardIdentifier) -> Self {
        uid.to_hex()
    }
}

/// Constant-time comparison implementation for CardIdentifier
///
/// Identifiers of different lengths never compare equal.
impl PartialEq for CardIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl std::hash::Hash for CardIdentifier {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Outcome of a single reader poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// A card answered with a well-formed UID.
    Detected(CardIdentifier),

    /// No card, unreadable serial, or malformed UID.
    NotDetected,
}

impl PollResult {
    /// Get the detected identifier, if any.
    #[must_use]
    pub fn identifier(&self) -> Option<&CardIdentifier> {
        match self {
            PollResult::Detected(uid) => Some(uid),
            PollResult::NotDetected => None,
        }
    }

    #[must_use]
    pub fn is_detected(&self) -> bool {
        matches!(self, PollResult::Detected(_))
    }
}

/// Whether a card is currently considered present on the reader.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PresenceState {
    /// No card on the reader. Initial state after every (re)start.
    #[default]
    Absent,

    /// A card with the given identifier is on the reader.
    Present(CardIdentifier),
}

impl PresenceState {
    /// Get the identifier of the present card, if any.
    #[must_use]
    pub fn current(&self) -> Option<&CardIdentifier> {
        match self {
            PresenceState::Present(uid) => Some(uid),
            PresenceState::Absent => None,
        }
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, PresenceState::Present(_))
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PresenceState::Absent => write!(f, "Absent"),
            PresenceState::Present(uid) => write!(f, "Present({})", uid),
        }
    }
}

/// Externally observable presence transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// A new (or different) card is now on the reader.
    CardChanged(CardIdentifier),

    /// The previously present card left the reader.
    CardRemoved,
}

impl PresenceEvent {
    /// Text line written for this event, without the trailing newline.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardwatch_core::{CardIdentifier, PresenceEvent};
    ///
    /// let uid = CardIdentifier::from_hex("a1b2c3d4").unwrap();
    /// assert_eq!(PresenceEvent::CardChanged(uid).report_line(), "A1B2C3D4");
    /// assert_eq!(PresenceEvent::CardRemoved.report_line(), "removed");
    /// ```
    #[must_use]
    pub fn report_line(&self) -> String {
        match self {
            PresenceEvent::CardChanged(uid) => uid.to_hex(),
            PresenceEvent::CardRemoved => REMOVED_REPORT.to_string(),
        }
    }
}

impl fmt::Display for PresenceEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PresenceEvent::CardChanged(uid) => write!(f, "changed→{}", uid),
            PresenceEvent::CardRemoved => write!(f, "removed"),
        }
    }
}
