use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid UID length: expected 4, 7 or 10 bytes, got {0}")]
    InvalidUidLength(usize),

    #[error("Invalid UID hex string: {0}")]
    InvalidUidHex(String),
}

pub type Result<T> = std::result::Result<T, Error>;
