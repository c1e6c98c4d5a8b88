//! Error types surfaced by the storage card engine

use thiserror::Error;

use crate::reader::TransportError;

/// Coarse classification of a [`StorageCardError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Unsupported,
    AuthenticationRequired,
    AuthenticationFailed,
    ReaderIo,
    CardIo,
    UnexpectedStatus,
    InconsistentData,
    Config,
}

/// Every failure a prepare call, an accessor or `execute` can report
///
/// Execute-time variants carry the block address of the command that failed
/// when that command is block-scoped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageCardError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Block address {block_address} is out of range")]
    OutOfRange { block_address: u32 },

    #[error("Invalid block range {from}..={to}")]
    InvalidRange { from: u32, to: u32 },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Sector holding block {block_address} is not authenticated")]
    AuthenticationRequired { block_address: u32 },

    #[error("Authentication failed for block {block_address} (SW {sw:04X})")]
    AuthenticationFailed { block_address: u32, sw: u16 },

    #[error("Reader communication error{}: {message}", at_block(.block_address))]
    ReaderIo {
        block_address: Option<u32>,
        message: String,
    },

    #[error("Card communication error{}: {message}", at_block(.block_address))]
    CardIo {
        block_address: Option<u32>,
        message: String,
    },

    #[error("Verification read of block {block_address} does not match the written data")]
    VerificationMismatch { block_address: u32 },

    #[error("Unexpected status {sw:04X}{}", at_block(.block_address))]
    UnexpectedStatus { block_address: Option<u32>, sw: u16 },

    #[error("Inconsistent data: {0}")]
    InconsistentData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn at_block(block_address: &Option<u32>) -> String {
    match block_address {
        Some(address) => format!(" at block {address}"),
        None => String::new(),
    }
}

impl StorageCardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) | Self::OutOfRange { .. } | Self::InvalidRange { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::AuthenticationRequired { .. } => ErrorKind::AuthenticationRequired,
            Self::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            Self::ReaderIo { .. } => ErrorKind::ReaderIo,
            Self::CardIo { .. } | Self::VerificationMismatch { .. } => ErrorKind::CardIo,
            Self::UnexpectedStatus { .. } => ErrorKind::UnexpectedStatus,
            Self::InconsistentData(_) => ErrorKind::InconsistentData,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Block address involved in the failure, `None` if not block-scoped
    pub fn block_address(&self) -> Option<u32> {
        match self {
            Self::OutOfRange { block_address }
            | Self::AuthenticationRequired { block_address }
            | Self::AuthenticationFailed { block_address, .. }
            | Self::VerificationMismatch { block_address } => Some(*block_address),
            Self::InvalidRange { from, .. } => Some(*from),
            Self::ReaderIo { block_address, .. }
            | Self::CardIo { block_address, .. }
            | Self::UnexpectedStatus { block_address, .. } => *block_address,
            _ => None,
        }
    }

    /// Re-wrap a transport failure according to the layer that failed
    pub(crate) fn from_transport(error: TransportError, block_address: Option<u32>) -> Self {
        match error {
            TransportError::Reader(message) => Self::ReaderIo {
                block_address,
                message,
            },
            TransportError::Card(message) => Self::CardIo {
                block_address,
                message,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageCardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_mismatch_is_card_io() {
        let err = StorageCardError::VerificationMismatch { block_address: 5 };
        assert_eq!(err.kind(), ErrorKind::CardIo);
        assert_eq!(err.block_address(), Some(5));
    }

    #[test]
    fn test_range_errors_are_invalid_argument() {
        assert_eq!(
            StorageCardError::OutOfRange { block_address: 16 }.kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            StorageCardError::InvalidRange { from: 4, to: 2 }.kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_display_with_and_without_block() {
        let scoped = StorageCardError::CardIo {
            block_address: Some(3),
            message: "card removed".to_string(),
        };
        assert_eq!(
            scoped.to_string(),
            "Card communication error at block 3: card removed"
        );

        let unscoped = StorageCardError::ReaderIo {
            block_address: None,
            message: "reader unplugged".to_string(),
        };
        assert_eq!(
            unscoped.to_string(),
            "Reader communication error: reader unplugged"
        );
        assert_eq!(unscoped.block_address(), None);
    }

    #[test]
    fn test_authentication_failed_display() {
        let err = StorageCardError::AuthenticationFailed {
            block_address: 10,
            sw: 0x6300,
        };
        assert_eq!(err.to_string(), "Authentication failed for block 10 (SW 6300)");
    }
}
