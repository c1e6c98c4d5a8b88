//! Storage card transaction engine
//!
//! Drives memory-oriented contactless cards (MIFARE Ultralight, MIFARE
//! Classic, ST25/SRT512) through a PC/SC-style reader and keeps an in-memory
//! image of their blocks.
//!
//! The application prepares a batch of reads, writes and sector
//! authentications on a [`StorageCardTransactionManager`], then runs it with
//! `execute`. Commands go to the card in the order they were prepared and the
//! batch stops at the first failure.
//!
//! # Example
//! ```ignore
//! use storage_card::{ChannelControl, ProductType, StorageCardSelectionExtension,
//!                    StorageCardTransactionManager};
//!
//! let mut selection = StorageCardSelectionExtension::new(ProductType::MifareUltralight);
//! selection.prepare_read_blocks(4, 7)?;
//! let card = selection.process(&mut reader)?;
//!
//! let mut manager = StorageCardTransactionManager::new(reader, card);
//! manager
//!     .prepare_write_blocks(4, &[0x03, 0x00, 0xFE, 0x00])?
//!     .prepare_read_block(4)?;
//! manager.execute(ChannelControl::CloseAfter)?;
//! assert_eq!(manager.card().get_block(4)?, vec![0x03, 0x00, 0xFE, 0x00]);
//! ```

pub mod apdu;
pub mod card;
pub mod config;
pub mod error;
pub mod reader;
pub mod sim;
pub mod transaction;

pub use card::{
    BlockSlot, MemoryImage, ProductDescriptor, ProductType, StorageCard,
    StorageCardSelectionExtension, SYSTEM_BLOCK_ADDRESS,
};
pub use config::TransactionConfig;
pub use error::{ErrorKind, Result, StorageCardError};
pub use reader::{CardReader, TransportError};
pub use transaction::{
    AuthSession, ChannelControl, KeySource, MifareClassicKeyType, PendingCommand, SectorAuth,
    StorageCardTransactionManager,
};

/// Version of the storage card API implemented by this crate
pub const API_VERSION: &str = "1.1";
