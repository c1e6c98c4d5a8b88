//! Storage card transaction manager
//!
//! Commands are prepared first, validated on the spot, then sent to the card
//! in one `execute` call. Processing stops at the first failed command.
//!
//! Read commands update the memory image with what the card returned. Write
//! commands only update it on products whose write status cannot be trusted:
//! there the engine reads the blocks back, and the read-back bytes are what
//! lands in the image. On products with a reliable acknowledgment the image
//! is left as is until the application reads the blocks again.

use log::{debug, info, warn};

use super::auth::AuthSession;
use super::command::{
    ChannelControl, KeySource, MifareClassicKeyType, PendingCommand, MIFARE_KEY_LENGTH,
};
use crate::apdu::{commands, ins, CommandApdu, Response};
use crate::card::{ProductDescriptor, ProductType, StorageCard, SYSTEM_BLOCK_ADDRESS};
use crate::config::TransactionConfig;
use crate::error::{Result, StorageCardError};
use crate::reader::CardReader;

/// Check a block address against the main memory area
pub(crate) fn check_block_address(product: ProductType, block_address: u32) -> Result<()> {
    if block_address >= product.block_count() {
        return Err(StorageCardError::InvalidArgument(format!(
            "block address {} out of range 0..{} for {}",
            block_address,
            product.block_count(),
            product
        )));
    }
    Ok(())
}

/// Check an inclusive block range
pub(crate) fn check_block_range(product: ProductType, from: u32, to: u32) -> Result<()> {
    if from > to {
        return Err(StorageCardError::InvalidArgument(format!(
            "block range start {} is after end {}",
            from, to
        )));
    }
    check_block_address(product, from)?;
    check_block_address(product, to)
}

/// Drives one card session: prepared commands, memory image and sector authentication
pub struct StorageCardTransactionManager<R: CardReader> {
    reader: R,
    card: StorageCard,
    auth: AuthSession,
    queue: Vec<PendingCommand>,
    key_storage_capacity: u8,
}

impl<R: CardReader> std::fmt::Debug for StorageCardTransactionManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCardTransactionManager")
            .field("card", &self.card)
            .field("auth", &self.auth)
            .field("queue", &self.queue)
            .field("key_storage_capacity", &self.key_storage_capacity)
            .finish_non_exhaustive()
    }
}

impl<R: CardReader> StorageCardTransactionManager<R> {
    /// Create a manager with the default configuration
    pub fn new(reader: R, card: StorageCard) -> Self {
        Self::with_config(reader, card, &TransactionConfig::default())
    }

    pub fn with_config(reader: R, card: StorageCard, config: &TransactionConfig) -> Self {
        let descriptor = card.descriptor();
        let reauth = config
            .reauth_on_sector_switch
            .unwrap_or(descriptor.reauth_on_sector_switch);
        let key_storage_capacity = reader
            .key_storage_capacity()
            .unwrap_or(config.key_storage_capacity);

        Self {
            reader,
            card,
            auth: AuthSession::new(reauth),
            queue: Vec::new(),
            key_storage_capacity,
        }
    }

    /// Card data and memory image of this session
    pub fn card(&self) -> &StorageCard {
        &self.card
    }

    /// End the session, keeping the card data
    pub fn into_card(self) -> StorageCard {
        self.card
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn auth_session(&self) -> &AuthSession {
        &self.auth
    }

    /// Commands prepared since the last `execute`
    pub fn pending_commands(&self) -> &[PendingCommand] {
        &self.queue
    }

    fn product(&self) -> ProductType {
        self.card.product_type()
    }

    fn descriptor(&self) -> &'static ProductDescriptor {
        self.card.descriptor()
    }

    pub(crate) fn enqueue(&mut self, command: PendingCommand) -> &mut Self {
        self.queue.push(command);
        self
    }

    // ------------------------------------------------------------------
    // Preparation
    // ------------------------------------------------------------------

    /// Prepare the reading of one block
    pub fn prepare_read_block(&mut self, block_address: u32) -> Result<&mut Self> {
        check_block_address(self.product(), block_address)?;
        Ok(self.enqueue(PendingCommand::ReadBlock(block_address)))
    }

    /// Prepare the reading of blocks `from..=to`
    pub fn prepare_read_blocks(&mut self, from: u32, to: u32) -> Result<&mut Self> {
        check_block_range(self.product(), from, to)?;
        Ok(self.enqueue(PendingCommand::ReadRange { from, to }))
    }

    /// Prepare the reading of the ST25 system block
    pub fn prepare_st25_read_system_block(&mut self) -> Result<&mut Self> {
        self.check_system_block_supported()?;
        Ok(self.enqueue(PendingCommand::ReadSystemBlock))
    }

    #[deprecated(since = "1.1.0", note = "use `prepare_st25_read_system_block`")]
    pub fn prepare_read_system_block(&mut self) -> Result<&mut Self> {
        self.prepare_st25_read_system_block()
    }

    /// Prepare the writing of whole blocks starting at `from`
    ///
    /// `data.len()` must be a positive multiple of the block size and the
    /// written blocks must fit in the memory area.
    pub fn prepare_write_blocks(&mut self, from: u32, data: &[u8]) -> Result<&mut Self> {
        let product = self.product();
        let block_size = product.block_size() as usize;
        check_block_address(product, from)?;
        if data.is_empty() || data.len() % block_size != 0 {
            return Err(StorageCardError::InvalidArgument(format!(
                "data length {} is not a positive multiple of the block size {}",
                data.len(),
                block_size
            )));
        }
        let last = from as usize + data.len() / block_size - 1;
        if last >= product.block_count() as usize {
            return Err(StorageCardError::InvalidArgument(format!(
                "writing {} bytes from block {} goes past block {}",
                data.len(),
                from,
                product.block_count() - 1
            )));
        }
        Ok(self.enqueue(PendingCommand::WriteBlocks {
            from,
            data: data.to_vec(),
        }))
    }

    #[deprecated(since = "1.1.0", note = "use `prepare_st25_write_system_block`")]
    pub fn prepare_write_system_block(&mut self, data: &[u8]) -> Result<&mut Self> {
        self.prepare_st25_write_system_block(data)
    }

    /// Prepare the writing of the ST25 system block
    pub fn prepare_st25_write_system_block(&mut self, data: &[u8]) -> Result<&mut Self> {
        self.check_system_block_supported()?;
        let block_size = self.descriptor().block_size as usize;
        if data.len() != block_size {
            return Err(StorageCardError::InvalidArgument(format!(
                "system block data is {} bytes, expected {}",
                data.len(),
                block_size
            )));
        }
        Ok(self.enqueue(PendingCommand::WriteSystemBlock(data.to_vec())))
    }

    /// Prepare a MIFARE Classic authentication with key bytes
    ///
    /// The key is loaded into the reader's volatile slot before authenticating.
    /// Prefer [`Self::prepare_mifare_classic_authenticate_with_stored_key`] when
    /// the key is already in the reader.
    pub fn prepare_mifare_classic_authenticate(
        &mut self,
        block_address: u32,
        key_type: MifareClassicKeyType,
        key: &[u8],
    ) -> Result<&mut Self> {
        self.check_authentication_supported()?;
        check_block_address(self.product(), block_address)?;
        let key: [u8; MIFARE_KEY_LENGTH] = key.try_into().map_err(|_| {
            StorageCardError::InvalidArgument(format!(
                "key must be {} bytes, got {}",
                MIFARE_KEY_LENGTH,
                key.len()
            ))
        })?;
        Ok(self.enqueue(PendingCommand::Authenticate {
            block_address,
            key_type,
            key: KeySource::Inline(key),
        }))
    }

    /// Prepare a MIFARE Classic authentication with a key stored in the reader
    pub fn prepare_mifare_classic_authenticate_with_stored_key(
        &mut self,
        block_address: u32,
        key_type: MifareClassicKeyType,
        key_number: u8,
    ) -> Result<&mut Self> {
        self.check_authentication_supported()?;
        check_block_address(self.product(), block_address)?;
        if key_number >= self.key_storage_capacity {
            return Err(StorageCardError::InvalidArgument(format!(
                "key number {} out of range 0..{}",
                key_number, self.key_storage_capacity
            )));
        }
        Ok(self.enqueue(PendingCommand::Authenticate {
            block_address,
            key_type,
            key: KeySource::Stored(key_number),
        }))
    }

    fn check_system_block_supported(&self) -> Result<()> {
        if !self.descriptor().has_system_block {
            return Err(StorageCardError::Unsupported(format!(
                "{} has no system block",
                self.product()
            )));
        }
        Ok(())
    }

    fn check_authentication_supported(&self) -> Result<()> {
        if !self.descriptor().has_authentication {
            return Err(StorageCardError::Unsupported(format!(
                "{} does not support authentication",
                self.product()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Process every prepared command in order, then apply `channel_control`
    ///
    /// The queue is emptied whatever the outcome. On failure the remaining
    /// commands are dropped, image updates made by earlier commands are kept
    /// and the channel is left as is.
    pub fn execute(&mut self, channel_control: ChannelControl) -> Result<()> {
        let commands = std::mem::take(&mut self.queue);
        info!(
            "Processing {} command(s) on {} card",
            commands.len(),
            self.product()
        );

        for command in &commands {
            if let Err(e) = self.process_command(command) {
                match command.block_address() {
                    Some(address) => {
                        warn!("Command {:?} on block {} failed: {}", command, address, e)
                    }
                    None => warn!("Command {:?} failed: {}", command, e),
                }
                return Err(e);
            }
        }

        self.apply_channel_control(channel_control)
    }

    /// Forget all authentications after the channel was closed elsewhere
    pub fn on_channel_closed(&mut self) {
        debug!("Channel closed, clearing sector authentication");
        self.auth.clear_all();
    }

    /// Forget all authentications after the card left the field
    pub fn on_card_removed(&mut self) {
        debug!("Card removed, clearing sector authentication");
        self.auth.clear_all();
    }

    fn process_command(&mut self, command: &PendingCommand) -> Result<()> {
        match command {
            PendingCommand::Authenticate {
                block_address,
                key_type,
                key,
            } => self.authenticate(*block_address, *key_type, key),
            PendingCommand::ReadBlock(address) => self.read_blocks(*address, *address),
            PendingCommand::ReadRange { from, to } => self.read_blocks(*from, *to),
            PendingCommand::ReadSystemBlock => {
                self.require_access(SYSTEM_BLOCK_ADDRESS, SYSTEM_BLOCK_ADDRESS)?;
                let data = self.read_raw(SYSTEM_BLOCK_ADDRESS, None)?;
                self.card.image_mut().set_system_block(data)
            }
            PendingCommand::WriteBlocks { from, data } => self.write_blocks(*from, data),
            PendingCommand::WriteSystemBlock(data) => self.write_system_block(data),
        }
    }

    fn authenticate(
        &mut self,
        block_address: u32,
        key_type: MifareClassicKeyType,
        key: &KeySource,
    ) -> Result<()> {
        let sector = self.product().sector_of(block_address);
        let slot = match key {
            KeySource::Inline(bytes) => {
                let response = self.exchange(
                    &commands::load_key(commands::VOLATILE_KEY_SLOT, bytes),
                    Some(block_address),
                )?;
                if !response.is_okay() {
                    warn!("Reader refused volatile key (SW {:04X})", response.sw());
                    return Err(StorageCardError::AuthenticationFailed {
                        block_address,
                        sw: response.sw(),
                    });
                }
                commands::VOLATILE_KEY_SLOT
            }
            KeySource::Stored(number) => *number,
        };

        let response = self.exchange(
            &commands::general_authenticate(block_address as u16, key_type.code(), slot),
            Some(block_address),
        )?;
        if !response.is_okay() {
            self.auth.set_rejected(sector);
            warn!(
                "Authentication of sector {} with {:?} rejected (SW {:04X})",
                sector,
                key_type,
                response.sw()
            );
            return Err(StorageCardError::AuthenticationFailed {
                block_address,
                sw: response.sw(),
            });
        }

        debug!("Sector {} authenticated with {:?}", sector, key_type);
        self.auth.set_authenticated(sector, key_type);
        Ok(())
    }

    /// Local precondition: every sector touched by `from..=to` must be open
    fn require_access(&mut self, from: u32, to: u32) -> Result<()> {
        if !self.descriptor().has_authentication {
            return Ok(());
        }
        let product = self.product();
        for block_address in from..=to {
            if !self.auth.enter_sector(product.sector_of(block_address)) {
                warn!("Block {} accessed without authentication", block_address);
                return Err(StorageCardError::AuthenticationRequired { block_address });
            }
        }
        Ok(())
    }

    fn read_blocks(&mut self, from: u32, to: u32) -> Result<()> {
        self.require_access(from, to)?;
        for block_address in from..=to {
            let data = self.read_raw(block_address, Some(block_address))?;
            self.card.image_mut().set_block(block_address, data)?;
        }
        Ok(())
    }

    fn write_blocks(&mut self, from: u32, data: &[u8]) -> Result<()> {
        let block_size = self.descriptor().block_size as usize;
        let to = from + (data.len() / block_size) as u32 - 1;
        self.require_access(from, to)?;

        for (block_address, chunk) in (from..).zip(data.chunks(block_size)) {
            self.write_raw(block_address, chunk, Some(block_address))?;
        }

        if self.descriptor().has_write_ack {
            return Ok(());
        }

        // No reliable acknowledgment: read the range back
        for (block_address, expected) in (from..).zip(data.chunks(block_size)) {
            let verified = self.read_raw(block_address, Some(block_address))?;
            if verified != expected {
                warn!(
                    "Verification of block {}: wrote {}, read {}",
                    block_address,
                    hex::encode_upper(expected),
                    hex::encode_upper(&verified)
                );
                return Err(StorageCardError::VerificationMismatch { block_address });
            }
            self.card.image_mut().set_block(block_address, verified)?;
        }
        Ok(())
    }

    fn write_system_block(&mut self, data: &[u8]) -> Result<()> {
        self.require_access(SYSTEM_BLOCK_ADDRESS, SYSTEM_BLOCK_ADDRESS)?;
        self.write_raw(SYSTEM_BLOCK_ADDRESS, data, None)?;

        if self.descriptor().has_write_ack {
            return Ok(());
        }

        let verified = self.read_raw(SYSTEM_BLOCK_ADDRESS, None)?;
        if verified != data {
            warn!("Verification of the system block failed");
            return Err(StorageCardError::VerificationMismatch {
                block_address: SYSTEM_BLOCK_ADDRESS,
            });
        }
        self.card.image_mut().set_system_block(verified)
    }

    /// READ BINARY of one block, checked for status and length
    fn read_raw(&mut self, block_address: u32, scope: Option<u32>) -> Result<Vec<u8>> {
        let block_size = self.descriptor().block_size;
        let response = self.exchange(
            &commands::read_binary(block_address as u16, block_size as u8),
            scope,
        )?;
        if !response.is_okay() {
            return Err(StorageCardError::UnexpectedStatus {
                block_address: scope,
                sw: response.sw(),
            });
        }
        if response.data.len() != block_size as usize {
            return Err(StorageCardError::InconsistentData(format!(
                "read of block {} returned {} bytes, expected {}",
                block_address,
                response.data.len(),
                block_size
            )));
        }
        Ok(response.data)
    }

    fn write_raw(&mut self, block_address: u32, data: &[u8], scope: Option<u32>) -> Result<()> {
        let response = self.exchange(&commands::update_binary(block_address as u16, data), scope)?;
        if !response.is_okay() {
            return Err(StorageCardError::UnexpectedStatus {
                block_address: scope,
                sw: response.sw(),
            });
        }
        Ok(())
    }

    /// One APDU round-trip, transport failures re-wrapped by layer
    fn exchange(&mut self, command: &CommandApdu, block_address: Option<u32>) -> Result<Response> {
        let apdu = command.to_bytes();
        if command.ins == ins::LOAD_KEYS {
            debug!("-> {} <key>", hex::encode_upper(&apdu[..4]));
        } else {
            debug!("-> {}", hex::encode_upper(&apdu));
        }

        let raw = self
            .reader
            .transmit(&apdu)
            .map_err(|e| StorageCardError::from_transport(e, block_address))?;
        debug!("<- {}", hex::encode_upper(&raw));

        Response::from_bytes(&raw).map_err(|e| StorageCardError::InconsistentData(e.to_string()))
    }

    fn apply_channel_control(&mut self, channel_control: ChannelControl) -> Result<()> {
        if channel_control == ChannelControl::CloseAfter {
            self.reader
                .close_channel()
                .map_err(|e| StorageCardError::from_transport(e, None))?;
            info!("Physical channel closed");
            self.auth.clear_all();
        }
        Ok(())
    }
}
