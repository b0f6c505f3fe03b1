use thiserror::Error;

/// Errors coming from the card or reader layer.
///
/// Only [`ReaderError::Timeout`] is recoverable: the connection loop retries
/// it. Everything else ends the program.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Timed out waiting for a card")]
    Timeout,

    #[error("No card connected")]
    NotConnected,

    #[error("Card response too short: expected at least 2 status bytes, got {0} byte(s)")]
    ShortResponse(usize),

    #[error("Invalid reader name: '{0}'")]
    InvalidReaderName(String),

    #[error("PCSC error: {0}")]
    Pcsc(pcsc::Error),
}

impl From<pcsc::Error> for ReaderError {
    fn from(err: pcsc::Error) -> Self {
        match err {
            pcsc::Error::Timeout => ReaderError::Timeout,
            other => ReaderError::Pcsc(other),
        }
    }
}

/// Invalid memory range or payload for a memory card APDU
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApduError {
    #[error("length must be between 1 and 256 bytes, got {0}")]
    InvalidLength(u16),

    #[error("{length} byte(s) from address {address} runs past the end of the 256-byte memory")]
    RangeOverflow { address: u8, length: u16 },

    #[error("write payload must be between 1 and 255 bytes, got {0}")]
    InvalidPayload(usize),

    #[error("{length} byte(s) from address {address} runs past the end of the 32-byte protection memory")]
    ProtectionRangeOverflow { address: u8, length: usize },
}

/// Bad arguments typed at the prompt. These are reported and the prompt goes on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("missing <{0}> argument")]
    MissingArgument(&'static str),

    #[error("invalid {what} '{value}': expected a decimal number")]
    InvalidNumber { what: &'static str, value: String },

    #[error("address {0} is out of range (0-255)")]
    AddressOutOfRange(u32),

    #[error("length {0} is out of range (1-256)")]
    LengthOutOfRange(u32),

    #[error(transparent)]
    Range(#[from] ApduError),
}
