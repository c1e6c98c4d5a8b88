//! Commands run during card selection
//!
//! The selection extension lets the application ask for blocks to be read as
//! soon as the card is selected, so the first transaction starts with a
//! partially populated memory image.

use log::info;

use super::product::ProductType;
use super::storage_card::StorageCard;
use crate::apdu::commands;
use crate::apdu::Response;
use crate::error::{Result, StorageCardError};
use crate::reader::CardReader;
use crate::transaction::manager::{check_block_address, check_block_range};
use crate::transaction::{ChannelControl, PendingCommand, StorageCardTransactionManager};

/// Optional reads to perform while selecting a card of a known product
#[derive(Debug, Clone)]
pub struct StorageCardSelectionExtension {
    product_type: ProductType,
    commands: Vec<PendingCommand>,
}

impl StorageCardSelectionExtension {
    pub fn new(product_type: ProductType) -> Self {
        Self {
            product_type,
            commands: Vec::new(),
        }
    }

    pub fn product_type(&self) -> ProductType {
        self.product_type
    }

    /// Prepare the reading of one block
    pub fn prepare_read_block(&mut self, block_address: u32) -> Result<&mut Self> {
        check_block_address(self.product_type, block_address)?;
        self.commands.push(PendingCommand::ReadBlock(block_address));
        Ok(self)
    }

    /// Prepare the reading of blocks `from..=to`
    pub fn prepare_read_blocks(&mut self, from: u32, to: u32) -> Result<&mut Self> {
        check_block_range(self.product_type, from, to)?;
        self.commands.push(PendingCommand::ReadRange { from, to });
        Ok(self)
    }

    /// Fetch the UID, run the prepared reads and return the seeded card
    ///
    /// The channel is left open for the transactions that follow.
    pub fn process<R: CardReader>(&self, reader: &mut R) -> Result<StorageCard> {
        let uid = read_uid(reader)?;
        info!(
            "Selected {} card, UID {}",
            self.product_type,
            hex::encode_upper(&uid)
        );

        let card = StorageCard::new(self.product_type, uid);
        let mut manager = StorageCardTransactionManager::new(reader, card);
        for command in &self.commands {
            manager.enqueue(command.clone());
        }
        manager.execute(ChannelControl::KeepOpen)?;
        Ok(manager.into_card())
    }
}

fn read_uid<R: CardReader>(reader: &mut R) -> Result<Vec<u8>> {
    let raw = reader
        .transmit(&commands::get_uid().to_bytes())
        .map_err(|e| StorageCardError::from_transport(e, None))?;
    let response =
        Response::from_bytes(&raw).map_err(|e| StorageCardError::InconsistentData(e.to_string()))?;
    if !response.is_okay() || response.data.is_empty() {
        return Err(StorageCardError::UnexpectedStatus {
            block_address: None,
            sw: response.sw(),
        });
    }
    Ok(response.data)
}
