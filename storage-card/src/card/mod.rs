//! Card data structures
//!
//! Product capabilities, the memory image and the card selection extension.

pub mod image;
pub mod product;
pub mod selection;
pub mod storage_card;

pub use image::{BlockSlot, MemoryImage};
pub use product::{ProductDescriptor, ProductType, SYSTEM_BLOCK_ADDRESS};
pub use selection::StorageCardSelectionExtension;
pub use storage_card::StorageCard;
