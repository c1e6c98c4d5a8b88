//! Prepared command batches and their execution against the card

pub mod auth;
pub mod command;
pub mod manager;

pub use auth::{AuthSession, SectorAuth};
pub use command::{
    ChannelControl, KeySource, MifareClassicKeyType, PendingCommand, MIFARE_KEY_LENGTH,
};
pub use manager::StorageCardTransactionManager;
