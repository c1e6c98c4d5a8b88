//! Reader transport seam
//!
//! The engine never talks to PC/SC directly. It drives a [`CardReader`],
//! which a PC/SC binding, an NFC stack or [`crate::sim::VirtualReader`]
//! implements.

use thiserror::Error;

/// Transport failure, split by the layer that failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The reader itself could not be reached (unplugged, driver fault)
    #[error("reader: {0}")]
    Reader(String),

    /// The reader works but the card did not answer (removed, out of field)
    #[error("card: {0}")]
    Card(String),
}

/// Blocking APDU exchange with the card through a reader
pub trait CardReader {
    /// Send a command APDU, return the full response including SW1 SW2
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Terminate the physical channel (or start the removal sequence)
    fn close_channel(&mut self) -> Result<(), TransportError>;

    /// Number of key slots in the reader's key storage
    ///
    /// `None` means the reader does not report it and the configured
    /// capacity applies.
    fn key_storage_capacity(&self) -> Option<u8> {
        None
    }
}

impl<R: CardReader + ?Sized> CardReader for &mut R {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).transmit(apdu)
    }

    fn close_channel(&mut self) -> Result<(), TransportError> {
        (**self).close_channel()
    }

    fn key_storage_capacity(&self) -> Option<u8> {
        (**self).key_storage_capacity()
    }
}

impl<R: CardReader + ?Sized> CardReader for Box<R> {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).transmit(apdu)
    }

    fn close_channel(&mut self) -> Result<(), TransportError> {
        (**self).close_channel()
    }

    fn key_storage_capacity(&self) -> Option<u8> {
        (**self).key_storage_capacity()
    }
}
