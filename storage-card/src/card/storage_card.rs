//! Card session data: product, UID and memory image

use super::image::{BlockSlot, MemoryImage};
use super::product::{ProductDescriptor, ProductType};
use crate::error::Result;

/// A selected storage card as seen by the application
///
/// Read accessors go through the memory image, they never contact the card.
#[derive(Debug, Clone)]
pub struct StorageCard {
    product_type: ProductType,
    uid: Vec<u8>,
    image: MemoryImage,
}

impl StorageCard {
    /// Create a card with an empty memory image
    pub fn new(product_type: ProductType, uid: Vec<u8>) -> Self {
        Self {
            product_type,
            uid,
            image: MemoryImage::new(product_type.descriptor()),
        }
    }

    pub fn product_type(&self) -> ProductType {
        self.product_type
    }

    pub fn descriptor(&self) -> &'static ProductDescriptor {
        self.product_type.descriptor()
    }

    pub fn uid(&self) -> &[u8] {
        &self.uid
    }

    /// Block content, zero-filled if never read
    pub fn get_block(&self, block_address: u32) -> Result<Vec<u8>> {
        self.image.get_block(block_address)
    }

    /// Blocks `from..=to` concatenated, unread blocks zero-filled
    pub fn get_blocks(&self, from: u32, to: u32) -> Result<Vec<u8>> {
        self.image.get_blocks(from, to)
    }

    pub fn get_system_block(&self) -> Result<Option<Vec<u8>>> {
        self.image.get_system_block()
    }

    /// Whether the block holds data read from the card
    pub fn is_block_read(&self, block_address: u32) -> Result<bool> {
        Ok(matches!(self.image.slot(block_address)?, BlockSlot::Set(_)))
    }

    pub fn image(&self) -> &MemoryImage {
        &self.image
    }

    /// Install a block read by the selection process before the first transaction
    pub fn seed_block(&mut self, block_address: u32, data: Vec<u8>) -> Result<()> {
        self.image.set_block(block_address, data)
    }

    pub(crate) fn image_mut(&mut self) -> &mut MemoryImage {
        &mut self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageCardError;

    #[test]
    fn test_new_card() {
        let card = StorageCard::new(ProductType::MifareUltralight, vec![0x04, 0xA1, 0xB2, 0xC3]);
        assert_eq!(card.product_type(), ProductType::MifareUltralight);
        assert_eq!(card.uid(), &[0x04, 0xA1, 0xB2, 0xC3]);
        assert!(!card.is_block_read(0).unwrap());
        assert_eq!(card.get_blocks(0, 15).unwrap(), vec![0u8; 64]);
    }

    #[test]
    fn test_seed_block() {
        let mut card = StorageCard::new(ProductType::MifareUltralight, vec![0x01]);
        card.seed_block(4, vec![0xE1, 0x10, 0x06, 0x00]).unwrap();
        assert!(card.is_block_read(4).unwrap());
        assert_eq!(card.get_block(4).unwrap(), vec![0xE1, 0x10, 0x06, 0x00]);
    }

    #[test]
    fn test_seed_block_validates() {
        let mut card = StorageCard::new(ProductType::MifareUltralight, vec![0x01]);
        assert_eq!(
            card.seed_block(16, vec![0; 4]),
            Err(StorageCardError::OutOfRange { block_address: 16 })
        );
        assert!(card.seed_block(0, vec![0; 16]).is_err());
    }
}
