//! Commands accumulated by the prepare calls

use crate::apdu::key_type;

/// Length of a MIFARE Classic key
pub const MIFARE_KEY_LENGTH: usize = 6;

/// MIFARE Classic key used to open a sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MifareClassicKeyType {
    KeyA,
    KeyB,
}

impl MifareClassicKeyType {
    /// Key type code of the GENERAL AUTHENTICATE data object
    pub fn code(self) -> u8 {
        match self {
            MifareClassicKeyType::KeyA => key_type::MIFARE_KEY_A,
            MifareClassicKeyType::KeyB => key_type::MIFARE_KEY_B,
        }
    }
}

/// Where the authentication key comes from
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Key bytes sent to the reader's volatile slot before authenticating
    Inline([u8; MIFARE_KEY_LENGTH]),
    /// Index of a key already stored in the reader
    Stored(u8),
}

// Key material stays out of logs
impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Inline(_) => f.write_str("Inline(..)"),
            KeySource::Stored(slot) => f.debug_tuple("Stored").field(slot).finish(),
        }
    }
}

/// What to do with the physical channel once a batch has been processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelControl {
    /// Leave the channel open
    KeepOpen,
    /// Terminate communication with the card
    CloseAfter,
}

/// One prepared operation, executed in insertion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCommand {
    ReadBlock(u32),
    /// Inclusive range
    ReadRange { from: u32, to: u32 },
    ReadSystemBlock,
    /// `data` holds whole blocks starting at `from`
    WriteBlocks { from: u32, data: Vec<u8> },
    WriteSystemBlock(Vec<u8>),
    Authenticate {
        block_address: u32,
        key_type: MifareClassicKeyType,
        key: KeySource,
    },
}

impl PendingCommand {
    /// Block address the command targets, `None` for the system block
    pub fn block_address(&self) -> Option<u32> {
        match self {
            PendingCommand::ReadBlock(address) => Some(*address),
            PendingCommand::ReadRange { from, .. } | PendingCommand::WriteBlocks { from, .. } => {
                Some(*from)
            }
            PendingCommand::Authenticate { block_address, .. } => Some(*block_address),
            PendingCommand::ReadSystemBlock | PendingCommand::WriteSystemBlock(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_type_codes() {
        assert_eq!(MifareClassicKeyType::KeyA.code(), 0x60);
        assert_eq!(MifareClassicKeyType::KeyB.code(), 0x61);
    }

    #[test]
    fn test_inline_key_not_printed() {
        let key = KeySource::Inline([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
        assert_eq!(format!("{:?}", key), "Inline(..)");
        assert_eq!(format!("{:?}", KeySource::Stored(2)), "Stored(2)");
    }

    #[test]
    fn test_block_address() {
        assert_eq!(PendingCommand::ReadBlock(7).block_address(), Some(7));
        assert_eq!(
            PendingCommand::WriteBlocks { from: 2, data: vec![0; 8] }.block_address(),
            Some(2)
        );
        assert_eq!(PendingCommand::ReadSystemBlock.block_address(), None);
    }
}
