//! Virtual storage card reader
//!
//! An in-process card behind the [`CardReader`] trait. It answers the same
//! PC/SC Part 3 commands a contactless reader does, keeps a transcript of
//! every APDU it received, and can be told to misbehave (lost writes,
//! transport faults, card removal) to exercise the error paths.
//!
//! The reader is a cheap handle: clones share the same card, so a test can
//! hand one clone to a transaction manager and inspect the card through another.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::apdu::{ins, CommandApdu, Response, SW};
use crate::card::{ProductDescriptor, ProductType, SYSTEM_BLOCK_ADDRESS};
use crate::reader::{CardReader, TransportError};
use crate::transaction::MIFARE_KEY_LENGTH;

type Key = [u8; MIFARE_KEY_LENGTH];

/// Transport key MIFARE Classic cards ship with
pub const DEFAULT_KEY: Key = [0xFF; MIFARE_KEY_LENGTH];

const KEY_STORAGE_SLOTS: u8 = 8;

/// Card and reader state behind the handle
struct VirtualCard {
    product_type: ProductType,
    uid: Vec<u8>,
    blocks: Vec<Vec<u8>>,
    system_block: Vec<u8>,
    /// Key A and key B per sector, DEFAULT_KEY when absent
    sector_keys: HashMap<u32, (Key, Key)>,
    key_storage: Vec<Option<Key>>,
    /// The card keeps one sector open at a time
    authenticated_sector: Option<u32>,
    present: bool,
    channel_open: bool,
    corrupt_writes: bool,
    /// Transmissions left before failing, and the failure
    scheduled_failure: Option<(usize, TransportError)>,
    transcript: Vec<Vec<u8>>,
}

impl VirtualCard {
    fn new(product_type: ProductType, uid: Vec<u8>) -> Self {
        let descriptor = product_type.descriptor();
        let block_size = descriptor.block_size as usize;
        Self {
            product_type,
            uid,
            blocks: vec![vec![0u8; block_size]; descriptor.block_count as usize],
            system_block: vec![0xFF; block_size],
            sector_keys: HashMap::new(),
            key_storage: vec![None; KEY_STORAGE_SLOTS as usize],
            authenticated_sector: None,
            present: true,
            channel_open: true,
            corrupt_writes: false,
            scheduled_failure: None,
            transcript: Vec::new(),
        }
    }

    fn descriptor(&self) -> &'static ProductDescriptor {
        self.product_type.descriptor()
    }

    /// Process an APDU command
    fn process_apdu(&mut self, raw: &[u8]) -> Response {
        let cmd = match CommandApdu::parse(raw) {
            Ok(apdu) => apdu,
            Err(e) => {
                debug!("Virtual card rejected APDU: {}", e);
                return Response::error(SW::WRONG_LENGTH);
            }
        };

        if cmd.cla != crate::apdu::CLA_PCSC {
            return Response::error(SW::CLA_NOT_SUPPORTED);
        }

        match cmd.ins {
            ins::GET_DATA => self.handle_get_data(&cmd),
            ins::LOAD_KEYS => self.handle_load_key(&cmd),
            ins::GENERAL_AUTHENTICATE => self.handle_authenticate(&cmd),
            ins::READ_BINARY => self.handle_read(&cmd),
            ins::UPDATE_BINARY => self.handle_update(&cmd),
            _ => Response::error(SW::INS_NOT_SUPPORTED),
        }
    }

    fn handle_get_data(&self, cmd: &CommandApdu) -> Response {
        if cmd.p1 != 0x00 {
            return Response::error(SW::FUNCTION_NOT_SUPPORTED);
        }
        Response::success(self.uid.clone())
    }

    fn handle_load_key(&mut self, cmd: &CommandApdu) -> Response {
        let slot = cmd.p2 as usize;
        if slot >= self.key_storage.len() {
            return Response::error(SW::WRONG_P1_P2);
        }
        let key: Key = match cmd.data.as_slice().try_into() {
            Ok(key) => key,
            Err(_) => return Response::error(SW::WRONG_LENGTH),
        };
        self.key_storage[slot] = Some(key);
        Response::ok()
    }

    fn handle_authenticate(&mut self, cmd: &CommandApdu) -> Response {
        if !self.descriptor().has_authentication {
            return Response::error(SW::FUNCTION_NOT_SUPPORTED);
        }
        // 01 <addr hi> <addr lo> <key type> <key slot>
        if cmd.data.len() != 5 || cmd.data[0] != 0x01 {
            return Response::error(SW::WRONG_LENGTH);
        }
        let address = ((cmd.data[1] as u32) << 8) | cmd.data[2] as u32;
        if address >= self.descriptor().block_count {
            return Response::error(SW::WRONG_P1_P2);
        }
        let sector = self.product_type.sector_of(address);
        let (key_a, key_b) = self
            .sector_keys
            .get(&sector)
            .copied()
            .unwrap_or((DEFAULT_KEY, DEFAULT_KEY));
        let expected = match cmd.data[3] {
            crate::apdu::key_type::MIFARE_KEY_A => key_a,
            crate::apdu::key_type::MIFARE_KEY_B => key_b,
            _ => return Response::error(SW::WRONG_P1_P2),
        };
        let presented = self
            .key_storage
            .get(cmd.data[4] as usize)
            .copied()
            .flatten();

        // A failed attempt also closes whatever sector was open
        self.authenticated_sector = None;
        if presented == Some(expected) {
            self.authenticated_sector = Some(sector);
            Response::ok()
        } else {
            Response::error(SW::OPERATION_FAILED)
        }
    }

    fn check_address(&self, address: u32) -> Result<(), u16> {
        if address == SYSTEM_BLOCK_ADDRESS && self.descriptor().has_system_block {
            return Ok(());
        }
        if address >= self.descriptor().block_count {
            return Err(SW::WRONG_P1_P2);
        }
        if self.descriptor().has_authentication
            && self.authenticated_sector != Some(self.product_type.sector_of(address))
        {
            return Err(SW::SECURITY_STATUS_NOT_SATISFIED);
        }
        Ok(())
    }

    /// Storage behind `address`, system block included when supported
    fn block_mut(&mut self, address: u32) -> Option<&mut Vec<u8>> {
        if address == SYSTEM_BLOCK_ADDRESS && self.descriptor().has_system_block {
            Some(&mut self.system_block)
        } else {
            self.blocks.get_mut(address as usize)
        }
    }

    fn handle_read(&mut self, cmd: &CommandApdu) -> Response {
        let address = cmd.p1p2() as u32;
        if let Err(sw) = self.check_address(address) {
            return Response::error(sw);
        }
        let block_size = self.descriptor().block_size as u16;
        if cmd.le != Some(block_size) {
            return Response::error(SW::wrong_le(block_size as u8));
        }
        match self.block_mut(address) {
            Some(block) => Response::success(block.clone()),
            None => Response::error(SW::WRONG_P1_P2),
        }
    }

    fn handle_update(&mut self, cmd: &CommandApdu) -> Response {
        let address = cmd.p1p2() as u32;
        if let Err(sw) = self.check_address(address) {
            return Response::error(sw);
        }
        if cmd.data.len() != self.descriptor().block_size as usize {
            return Response::error(SW::WRONG_LENGTH);
        }
        let mut stored = cmd.data.clone();
        if self.corrupt_writes {
            stored[0] ^= 0xFF;
        }
        match self.block_mut(address) {
            Some(block) => {
                *block = stored;
                Response::ok()
            }
            None => Response::error(SW::WRONG_P1_P2),
        }
    }
}

/// Handle on a virtual card inserted in a virtual reader
#[derive(Clone)]
pub struct VirtualReader {
    card: Arc<Mutex<VirtualCard>>,
}

impl VirtualReader {
    /// Insert a blank card of the given product
    pub fn new(product_type: ProductType, uid: Vec<u8>) -> Self {
        Self {
            card: Arc::new(Mutex::new(VirtualCard::new(product_type, uid))),
        }
    }

    /// Card-side content of a block, `None` if the card has no such block
    pub fn block(&self, address: u32) -> Option<Vec<u8>> {
        self.card.lock().block_mut(address).cloned()
    }

    /// Overwrite card-side content without going through APDUs
    ///
    /// Returns `false` if the card has no block at `address`.
    pub fn set_block(&self, address: u32, data: &[u8]) -> bool {
        match self.card.lock().block_mut(address) {
            Some(block) => {
                *block = data.to_vec();
                true
            }
            None => false,
        }
    }

    pub fn set_sector_keys(&self, sector: u32, key_a: Key, key_b: Key) {
        self.card.lock().sector_keys.insert(sector, (key_a, key_b));
    }

    /// Pre-load a key into the reader's key storage
    ///
    /// Returns `false` if `slot` is past the reader's key storage.
    pub fn store_key(&self, slot: u8, key: Key) -> bool {
        match self.card.lock().key_storage.get_mut(slot as usize) {
            Some(entry) => {
                *entry = Some(key);
                true
            }
            None => false,
        }
    }

    /// Make the card silently alter every written block
    pub fn set_write_corruption(&self, enabled: bool) {
        self.card.lock().corrupt_writes = enabled;
    }

    /// Fail the next transmission with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.fail_after(0, error);
    }

    /// Let `count` transmissions through, then fail the following one
    pub fn fail_after(&self, count: usize, error: TransportError) {
        self.card.lock().scheduled_failure = Some((count, error));
    }

    pub fn remove_card(&self) {
        let mut card = self.card.lock();
        card.present = false;
        card.authenticated_sector = None;
    }

    pub fn is_channel_open(&self) -> bool {
        self.card.lock().channel_open
    }

    /// APDUs received since creation or the last `clear_transcript`
    pub fn transcript(&self) -> Vec<Vec<u8>> {
        self.card.lock().transcript.clone()
    }

    pub fn transmit_count(&self) -> usize {
        self.card.lock().transcript.len()
    }

    pub fn clear_transcript(&self) {
        self.card.lock().transcript.clear();
    }
}

impl CardReader for VirtualReader {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut card = self.card.lock();
        card.transcript.push(apdu.to_vec());

        match card.scheduled_failure.take() {
            Some((0, error)) => return Err(error),
            Some((remaining, error)) => card.scheduled_failure = Some((remaining - 1, error)),
            None => {}
        }
        if !card.present {
            return Err(TransportError::Card("card removed from the field".to_string()));
        }
        // Any exchange reopens the channel
        card.channel_open = true;
        Ok(card.process_apdu(apdu).to_bytes())
    }

    fn close_channel(&mut self) -> Result<(), TransportError> {
        let mut card = self.card.lock();
        card.channel_open = false;
        card.authenticated_sector = None;
        Ok(())
    }

    fn key_storage_capacity(&self) -> Option<u8> {
        Some(KEY_STORAGE_SLOTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::commands;

    fn send(reader: &mut VirtualReader, cmd: CommandApdu) -> Response {
        Response::from_bytes(&reader.transmit(&cmd.to_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_get_uid() {
        let mut reader = VirtualReader::new(ProductType::MifareUltralight, vec![0x04, 0x11, 0x22]);
        let resp = send(&mut reader, commands::get_uid());
        assert!(resp.is_okay());
        assert_eq!(resp.data, vec![0x04, 0x11, 0x22]);
    }

    #[test]
    fn test_read_write_block() {
        let mut reader = VirtualReader::new(ProductType::MifareUltralight, vec![0x01]);
        assert!(send(&mut reader, commands::update_binary(4, &[1, 2, 3, 4])).is_okay());
        let resp = send(&mut reader, commands::read_binary(4, 4));
        assert_eq!(resp.data, vec![1, 2, 3, 4]);
        assert_eq!(reader.transmit_count(), 2);
    }

    #[test]
    fn test_wrong_le() {
        let mut reader = VirtualReader::new(ProductType::MifareUltralight, vec![0x01]);
        let resp = send(&mut reader, commands::read_binary(0, 16));
        assert_eq!(resp.sw(), 0x6C04);
    }

    #[test]
    fn test_classic_requires_authentication() {
        let mut reader = VirtualReader::new(ProductType::MifareClassic1K, vec![0x01]);
        let resp = send(&mut reader, commands::read_binary(10, 16));
        assert_eq!(resp.sw(), SW::SECURITY_STATUS_NOT_SATISFIED);

        assert!(send(&mut reader, commands::load_key(0, &DEFAULT_KEY)).is_okay());
        let auth = commands::general_authenticate(10, crate::apdu::key_type::MIFARE_KEY_A, 0);
        assert!(send(&mut reader, auth).is_okay());
        assert!(send(&mut reader, commands::read_binary(10, 16)).is_okay());
        // Sector 3 is still closed
        assert!(!send(&mut reader, commands::read_binary(12, 16)).is_okay());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let mut reader = VirtualReader::new(ProductType::MifareClassic1K, vec![0x01]);
        reader.set_sector_keys(2, [0xA0; 6], [0xB0; 6]);
        reader.store_key(1, [0xA0; 6]);

        let key_b = commands::general_authenticate(8, crate::apdu::key_type::MIFARE_KEY_B, 1);
        assert_eq!(send(&mut reader, key_b).sw(), SW::OPERATION_FAILED);
        let key_a = commands::general_authenticate(8, crate::apdu::key_type::MIFARE_KEY_A, 1);
        assert!(send(&mut reader, key_a).is_okay());
    }

    #[test]
    fn test_system_block() {
        let mut reader = VirtualReader::new(ProductType::St25Srt512, vec![0x01]);
        let resp = send(&mut reader, commands::read_binary(0xFF, 4));
        assert_eq!(resp.data, vec![0xFF; 4]);
    }

    #[test]
    fn test_injected_failure_and_removal() {
        let mut reader = VirtualReader::new(ProductType::MifareUltralight, vec![0x01]);
        reader.fail_next(TransportError::Reader("unplugged".to_string()));
        assert_eq!(
            reader.transmit(&commands::read_binary(0, 4).to_bytes()),
            Err(TransportError::Reader("unplugged".to_string()))
        );
        assert!(reader.transmit(&commands::read_binary(0, 4).to_bytes()).is_ok());

        reader.remove_card();
        assert!(matches!(
            reader.transmit(&commands::read_binary(0, 4).to_bytes()),
            Err(TransportError::Card(_))
        ));
    }

    #[test]
    fn test_helpers_reject_unknown_locations() {
        let reader = VirtualReader::new(ProductType::MifareUltralight, vec![0x01]);
        assert_eq!(reader.block(16), None);
        assert_eq!(reader.block(SYSTEM_BLOCK_ADDRESS), None);
        assert!(!reader.set_block(16, &[0; 4]));
        assert!(!reader.store_key(KEY_STORAGE_SLOTS, DEFAULT_KEY));
        assert!(reader.store_key(KEY_STORAGE_SLOTS - 1, DEFAULT_KEY));
    }

    #[test]
    fn test_shared_handle() {
        let reader = VirtualReader::new(ProductType::MifareUltralight, vec![0x01]);
        let mut other = reader.clone();
        send(&mut other, commands::update_binary(2, &[9, 9, 9, 9]));
        assert_eq!(reader.block(2), Some(vec![9, 9, 9, 9]));
        assert_eq!(reader.transmit_count(), 1);
    }
}
