//! Product families and their fixed capabilities

use serde::{Deserialize, Serialize};

/// Address of the reserved system block on products that have one
pub const SYSTEM_BLOCK_ADDRESS: u32 = 0xFF;

/// Supported storage card product families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    /// NXP MIFARE Ultralight
    MifareUltralight,
    /// ST Microelectronics ST25 / SRT512
    #[serde(rename = "ST25_SRT512")]
    St25Srt512,
    /// NXP MIFARE Classic 1K
    #[serde(rename = "MIFARE_CLASSIC_1K")]
    MifareClassic1K,
    /// NXP MIFARE Classic 4K
    #[serde(rename = "MIFARE_CLASSIC_4K")]
    MifareClassic4K,
}

/// Immutable capability record for a product family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductDescriptor {
    /// Blocks in the main memory area, system block excluded
    pub block_count: u32,
    /// Bytes per block
    pub block_size: u32,
    pub has_system_block: bool,
    /// Write status is a reliable confirmation of the stored content
    pub has_write_ack: bool,
    pub has_authentication: bool,
    /// Authenticating or accessing another sector drops the current sector's authentication
    pub reauth_on_sector_switch: bool,
}

const MIFARE_ULTRALIGHT: ProductDescriptor = ProductDescriptor {
    block_count: 16,
    block_size: 4,
    has_system_block: false,
    has_write_ack: true,
    has_authentication: false,
    reauth_on_sector_switch: false,
};

const ST25_SRT512: ProductDescriptor = ProductDescriptor {
    block_count: 16,
    block_size: 4,
    has_system_block: true,
    has_write_ack: false,
    has_authentication: false,
    reauth_on_sector_switch: false,
};

const MIFARE_CLASSIC_1K: ProductDescriptor = ProductDescriptor {
    block_count: 64,
    block_size: 16,
    has_system_block: false,
    has_write_ack: true,
    has_authentication: true,
    reauth_on_sector_switch: true,
};

const MIFARE_CLASSIC_4K: ProductDescriptor = ProductDescriptor {
    block_count: 256,
    block_size: 16,
    has_system_block: false,
    has_write_ack: true,
    has_authentication: true,
    reauth_on_sector_switch: true,
};

/// MIFARE Classic: the first 32 sectors hold 4 blocks, the rest hold 16
const SMALL_SECTOR_BLOCKS: u32 = 4;
const LARGE_SECTOR_BLOCKS: u32 = 16;
const LARGE_SECTOR_START: u32 = 128;
const SMALL_SECTOR_COUNT: u32 = LARGE_SECTOR_START / SMALL_SECTOR_BLOCKS;

impl ProductType {
    pub const ALL: [ProductType; 4] = [
        ProductType::MifareUltralight,
        ProductType::St25Srt512,
        ProductType::MifareClassic1K,
        ProductType::MifareClassic4K,
    ];

    /// Capability record for this product
    pub fn descriptor(self) -> &'static ProductDescriptor {
        match self {
            ProductType::MifareUltralight => &MIFARE_ULTRALIGHT,
            ProductType::St25Srt512 => &ST25_SRT512,
            ProductType::MifareClassic1K => &MIFARE_CLASSIC_1K,
            ProductType::MifareClassic4K => &MIFARE_CLASSIC_4K,
        }
    }

    pub fn block_count(self) -> u32 {
        self.descriptor().block_count
    }

    pub fn block_size(self) -> u32 {
        self.descriptor().block_size
    }

    /// Sector holding `block_address`
    ///
    /// Products without authentication are a single sector.
    pub fn sector_of(self, block_address: u32) -> u32 {
        if !self.descriptor().has_authentication {
            return 0;
        }
        if block_address < LARGE_SECTOR_START {
            block_address / SMALL_SECTOR_BLOCKS
        } else {
            SMALL_SECTOR_COUNT + (block_address - LARGE_SECTOR_START) / LARGE_SECTOR_BLOCKS
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProductType::MifareUltralight => "MIFARE_ULTRALIGHT",
            ProductType::St25Srt512 => "ST25_SRT512",
            ProductType::MifareClassic1K => "MIFARE_CLASSIC_1K",
            ProductType::MifareClassic4K => "MIFARE_CLASSIC_4K",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_table() {
        let ul = ProductType::MifareUltralight.descriptor();
        assert_eq!((ul.block_count, ul.block_size), (16, 4));
        assert!(ul.has_write_ack);
        assert!(!ul.has_authentication);

        let st = ProductType::St25Srt512.descriptor();
        assert!(st.has_system_block);
        assert!(!st.has_write_ack);

        let classic = ProductType::MifareClassic1K.descriptor();
        assert_eq!((classic.block_count, classic.block_size), (64, 16));
        assert!(classic.has_authentication);
    }

    #[test]
    fn test_classic_1k_sectors() {
        let product = ProductType::MifareClassic1K;
        assert_eq!(product.sector_of(0), 0);
        assert_eq!(product.sector_of(3), 0);
        assert_eq!(product.sector_of(4), 1);
        assert_eq!(product.sector_of(10), 2);
        assert_eq!(product.sector_of(63), 15);
    }

    #[test]
    fn test_classic_4k_large_sectors() {
        let product = ProductType::MifareClassic4K;
        assert_eq!(product.sector_of(127), 31);
        assert_eq!(product.sector_of(128), 32);
        assert_eq!(product.sector_of(143), 32);
        assert_eq!(product.sector_of(144), 33);
        assert_eq!(product.sector_of(255), 39);
    }

    #[test]
    fn test_unauthenticated_products_have_one_sector() {
        assert_eq!(ProductType::MifareUltralight.sector_of(15), 0);
        assert_eq!(ProductType::St25Srt512.sector_of(SYSTEM_BLOCK_ADDRESS), 0);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ProductType::St25Srt512).unwrap();
        assert_eq!(json, "\"ST25_SRT512\"");
        let parsed: ProductType = serde_json::from_str("\"MIFARE_CLASSIC_1K\"").unwrap();
        assert_eq!(parsed, ProductType::MifareClassic1K);
        assert_eq!(parsed.to_string(), "MIFARE_CLASSIC_1K");
    }
}
