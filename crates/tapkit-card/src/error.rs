//! Error taxonomy for the protocol engine
//!
//! Only transport failures abort an operation. Protocol and validation problems
//! are recovered locally and surface as tagged data; status words other than the
//! chaining codes are returned to the caller inside the response itself.

use thiserror::Error;

/// Failures of the physical/logical channel to the card
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The card left the field or the connection was reset
    #[error("card disconnected")]
    Disconnected,

    /// The reader did not answer in time
    #[error("operation timed out")]
    Timeout,

    /// Command larger than the transport can carry
    #[error("frame of {len} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// No reader is attached
    #[error("no card reader available")]
    NoReader,

    /// Any other reader-level failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<pcsc::Error> for TransportError {
    fn from(err: pcsc::Error) -> Self {
        match err {
            pcsc::Error::RemovedCard | pcsc::Error::ResetCard | pcsc::Error::NoSmartcard => {
                Self::Disconnected
            }
            pcsc::Error::Timeout => Self::Timeout,
            pcsc::Error::NoReadersAvailable | pcsc::Error::UnknownReader => Self::NoReader,
            other => Self::Io(other.to_string()),
        }
    }
}

/// Malformed protocol data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A response shorter than the two status bytes
    #[error("truncated response: {len} byte(s), expected at least 2")]
    TruncatedResponse { len: usize },

    /// Command bytes that do not form a short ISO 7816-4 APDU
    #[error("malformed command APDU: {0}")]
    MalformedCommand(String),

    /// TLV structure that could not be walked
    #[error("malformed TLV: {0}")]
    MalformedTlv(#[from] tapkit_common::TlvError),
}

/// Authentication and write-protection failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// The card rejected the key for this block
    #[error("authentication with key {key_type} failed for block {block} (SW {sw:04X})")]
    AuthenticationFailed { block: u8, key_type: char, sw: u16 },

    /// Writes to a sector trailer are never issued
    #[error("refusing to write sector trailer block {block}")]
    TrailerWriteRefused { block: u8 },
}

/// Malformed input that still decodes on a best-effort basis
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Sector trailer is not 16 bytes
    #[error("sector trailer must be 16 bytes, got {len}")]
    InvalidTrailer { len: usize },

    /// Inverted access-bit nibble is not the complement of the direct nibble
    #[error("access bits parity mismatch on {plane}")]
    ParityMismatch { plane: &'static str },

    /// MIFARE keys are 6 bytes
    #[error("key must be 6 bytes, got {len}")]
    InvalidKeyLength { len: usize },

    /// MIFARE blocks are 16 bytes
    #[error("block data must be 16 bytes, got {len}")]
    InvalidBlockLength { len: usize },

    /// Track 2 data without a usable separator/expiry layout
    #[error("ambiguous Track 2 data: {0}")]
    InvalidTrack2(String),

    /// Block outside the card geometry
    #[error("block {block} is outside the card layout")]
    BlockOutOfRange { block: u16 },

    /// Sector outside the card geometry
    #[error("sector {sector} is outside the card layout")]
    SectorOutOfRange { sector: u8 },

    /// Input that is not hex
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Top-level error for engine operations
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<pcsc::Error> for Error {
    fn from(err: pcsc::Error) -> Self {
        Self::Transport(err.into())
    }
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcsc_mapping() {
        assert_eq!(
            TransportError::from(pcsc::Error::RemovedCard),
            TransportError::Disconnected
        );
        assert_eq!(TransportError::from(pcsc::Error::Timeout), TransportError::Timeout);
        assert!(matches!(
            TransportError::from(pcsc::Error::InvalidParameter),
            TransportError::Io(_)
        ));
    }

    #[test]
    fn test_messages() {
        let err = Error::from(SecurityError::TrailerWriteRefused { block: 7 });
        assert_eq!(err.to_string(), "refusing to write sector trailer block 7");
        let err = ValidationError::InvalidTrailer { len: 10 };
        assert!(err.to_string().contains("16 bytes"));
    }

    #[test]
    fn test_validation_equality() {
        let err = ValidationError::from(hex::decode("0G").unwrap_err());
        assert_eq!(err, ValidationError::InvalidHex(hex::FromHexError::InvalidHexCharacter { c: 'G', index: 1 }));
        assert_ne!(
            ValidationError::SectorOutOfRange { sector: 40 },
            ValidationError::BlockOutOfRange { block: 40 }
        );
        assert_eq!(
            ValidationError::SectorOutOfRange { sector: 40 }.to_string(),
            "sector 40 is outside the card layout"
        );
    }
}
