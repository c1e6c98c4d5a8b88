//! Sparse, block-addressed image of the card memory

use super::product::{ProductDescriptor, SYSTEM_BLOCK_ADDRESS};
use crate::error::{Result, StorageCardError};

/// One block of the image
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BlockSlot {
    /// Never read from the card
    #[default]
    Unset,
    /// Content confirmed by a read (or a verified write)
    Set(Vec<u8>),
}

impl BlockSlot {
    pub fn is_set(&self) -> bool {
        matches!(self, BlockSlot::Set(_))
    }
}

/// Cached view of the card's block storage
///
/// Unread blocks are presented as zeros by the accessors but stay
/// distinguishable through [`MemoryImage::slot`].
#[derive(Debug, Clone)]
pub struct MemoryImage {
    block_size: usize,
    blocks: Vec<BlockSlot>,
    /// `None` when the product has no system block
    system_block: Option<BlockSlot>,
}

impl MemoryImage {
    pub fn new(descriptor: &ProductDescriptor) -> Self {
        Self {
            block_size: descriptor.block_size as usize,
            blocks: vec![BlockSlot::Unset; descriptor.block_count as usize],
            system_block: descriptor.has_system_block.then_some(BlockSlot::Unset),
        }
    }

    pub fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Raw slot for `address`, including the system block address when supported
    pub fn slot(&self, address: u32) -> Result<&BlockSlot> {
        if let Some(slot) = self.blocks.get(address as usize) {
            return Ok(slot);
        }
        match &self.system_block {
            Some(slot) if address == SYSTEM_BLOCK_ADDRESS => Ok(slot),
            _ => Err(StorageCardError::OutOfRange {
                block_address: address,
            }),
        }
    }

    /// Stored bytes, or zeros if the block was never read
    pub fn get_block(&self, address: u32) -> Result<Vec<u8>> {
        Ok(self.read_slot(self.slot(address)?))
    }

    /// Concatenation of `from..=to` in address order
    pub fn get_blocks(&self, from: u32, to: u32) -> Result<Vec<u8>> {
        if from > to || to >= self.block_count() {
            return Err(StorageCardError::InvalidRange { from, to });
        }
        let mut out = Vec::with_capacity((to - from + 1) as usize * self.block_size);
        for slot in &self.blocks[from as usize..=to as usize] {
            out.extend_from_slice(&self.read_slot(slot));
        }
        Ok(out)
    }

    /// System block content, `None` until read
    pub fn get_system_block(&self) -> Result<Option<Vec<u8>>> {
        match &self.system_block {
            None => Err(StorageCardError::Unsupported(
                "product has no system block".to_string(),
            )),
            Some(BlockSlot::Unset) => Ok(None),
            Some(BlockSlot::Set(data)) => Ok(Some(data.clone())),
        }
    }

    pub(crate) fn set_block(&mut self, address: u32, data: Vec<u8>) -> Result<()> {
        self.check_size(&data)?;
        let slot = self
            .blocks
            .get_mut(address as usize)
            .ok_or(StorageCardError::OutOfRange {
                block_address: address,
            })?;
        *slot = BlockSlot::Set(data);
        Ok(())
    }

    pub(crate) fn set_system_block(&mut self, data: Vec<u8>) -> Result<()> {
        self.check_size(&data)?;
        match self.system_block.as_mut() {
            Some(slot) => {
                *slot = BlockSlot::Set(data);
                Ok(())
            }
            None => Err(StorageCardError::Unsupported(
                "product has no system block".to_string(),
            )),
        }
    }

    fn check_size(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.block_size {
            return Err(StorageCardError::InconsistentData(format!(
                "block of {} bytes, expected {}",
                data.len(),
                self.block_size
            )));
        }
        Ok(())
    }

    fn read_slot(&self, slot: &BlockSlot) -> Vec<u8> {
        match slot {
            BlockSlot::Set(data) => data.clone(),
            BlockSlot::Unset => vec![0u8; self.block_size],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::ProductType;

    fn ultralight() -> MemoryImage {
        MemoryImage::new(ProductType::MifareUltralight.descriptor())
    }

    #[test]
    fn test_unread_blocks_are_zero() {
        let image = ultralight();
        for address in 0..16 {
            assert_eq!(image.get_block(address).unwrap(), vec![0u8; 4]);
            assert_eq!(image.slot(address).unwrap(), &BlockSlot::Unset);
        }
    }

    #[test]
    fn test_zero_block_distinguishable_from_unread() {
        let mut image = ultralight();
        image.set_block(3, vec![0u8; 4]).unwrap();
        assert_eq!(image.get_block(3).unwrap(), image.get_block(4).unwrap());
        assert!(image.slot(3).unwrap().is_set());
        assert!(!image.slot(4).unwrap().is_set());
    }

    #[test]
    fn test_out_of_range() {
        let image = ultralight();
        assert_eq!(
            image.get_block(16),
            Err(StorageCardError::OutOfRange { block_address: 16 })
        );
        // No system block on Ultralight
        assert!(image.get_block(SYSTEM_BLOCK_ADDRESS).is_err());
    }

    #[test]
    fn test_get_blocks_concatenates() {
        let mut image = ultralight();
        image.set_block(1, vec![1, 1, 1, 1]).unwrap();
        image.set_block(3, vec![3, 3, 3, 3]).unwrap();
        assert_eq!(
            image.get_blocks(1, 3).unwrap(),
            vec![1, 1, 1, 1, 0, 0, 0, 0, 3, 3, 3, 3]
        );
    }

    #[test]
    fn test_get_blocks_invalid_range() {
        let image = ultralight();
        assert_eq!(
            image.get_blocks(5, 4),
            Err(StorageCardError::InvalidRange { from: 5, to: 4 })
        );
        assert!(image.get_blocks(0, 16).is_err());
        assert_eq!(image.get_blocks(15, 15).unwrap().len(), 4);
    }

    #[test]
    fn test_system_block() {
        let mut image = MemoryImage::new(ProductType::St25Srt512.descriptor());
        assert_eq!(image.get_system_block().unwrap(), None);
        assert_eq!(image.get_block(SYSTEM_BLOCK_ADDRESS).unwrap(), vec![0u8; 4]);

        image.set_system_block(vec![0xFF, 0xFF, 0xFF, 0x0F]).unwrap();
        assert_eq!(
            image.get_system_block().unwrap(),
            Some(vec![0xFF, 0xFF, 0xFF, 0x0F])
        );
    }

    #[test]
    fn test_system_block_unsupported() {
        let image = ultralight();
        assert!(matches!(
            image.get_system_block(),
            Err(StorageCardError::Unsupported(_))
        ));
    }

    #[test]
    fn test_set_block_rejects_wrong_size() {
        let mut image = ultralight();
        assert!(matches!(
            image.set_block(0, vec![1, 2, 3]),
            Err(StorageCardError::InconsistentData(_))
        ));
        assert!(!image.slot(0).unwrap().is_set());
    }
}
