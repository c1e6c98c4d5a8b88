//! APDU (Application Protocol Data Unit) handling
//!
//! Storage cards do not speak ISO 7816-4 themselves. The reader exposes them
//! through the PC/SC Part 3 pseudo-APDUs (class byte `FF`), which this module
//! builds and parses.
//!
//! # Example
//! ```ignore
//! use storage_card::apdu::{commands, CommandApdu};
//!
//! let read = commands::read_binary(4, 16);
//! assert_eq!(read.to_bytes(), vec![0xFF, 0xB0, 0x00, 0x04, 0x10]);
//!
//! let parsed = CommandApdu::parse(&read.to_bytes()).unwrap();
//! assert_eq!(parsed.ins, 0xB0);
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Class byte used by every PC/SC Part 3 storage-card command
pub const CLA_PCSC: u8 = 0xFF;

/// Errors that can occur during APDU parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApduError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Invalid APDU length")]
    InvalidLength,

    #[error("Response too short: expected at least 2 status bytes, got {0}")]
    ResponseTooShort(usize),
}

/// A short-format command APDU
///
/// - `cla`: Class byte (`FF` for reader pseudo-APDUs)
/// - `ins`: Instruction byte
/// - `p1`, `p2`: Parameter bytes, for storage commands the block address
/// - `data`: Command data (may be empty)
/// - `le`: Expected response length (None if not specified)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    /// Expected response length, 256 when encoded as `00`
    pub le: Option<u16>,
}

impl CommandApdu {
    /// Create a new APDU with just the header (CLA, INS, P1, P2)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Set command data
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Set expected response length
    pub fn le(mut self, le: u16) -> Self {
        self.le = Some(le);
        self
    }

    /// Get P1-P2 combined as a u16 (the block address for READ/UPDATE BINARY)
    pub fn p1p2(&self) -> u16 {
        ((self.p1 as u16) << 8) | (self.p2 as u16)
    }

    /// Encode as CLA INS P1 P2 [Lc Data] [Le]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut apdu = Vec::with_capacity(6 + self.data.len());
        apdu.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);

        if !self.data.is_empty() {
            apdu.push(self.data.len() as u8);
            apdu.extend_from_slice(&self.data);
        }

        if let Some(le) = self.le {
            // Le=256 is encoded as 00
            apdu.push(le as u8);
        }

        apdu
    }

    /// Parse a short-format APDU
    ///
    /// - Case 1: CLA INS P1 P2
    /// - Case 2: CLA INS P1 P2 Le
    /// - Case 3: CLA INS P1 P2 Lc Data
    /// - Case 4: CLA INS P1 P2 Lc Data Le
    pub fn parse(raw: &[u8]) -> Result<Self, ApduError> {
        if raw.len() < 4 {
            return Err(ApduError::TooShort(raw.len()));
        }

        let mut apdu = Self::new(raw[0], raw[1], raw[2], raw[3]);
        let body = &raw[4..];

        match body.len() {
            0 => Ok(apdu),
            1 => {
                apdu.le = Some(decode_le(body[0]));
                Ok(apdu)
            }
            n => {
                let lc = body[0] as usize;
                if lc == 0 {
                    return Err(ApduError::InvalidLength);
                }
                if n == 1 + lc {
                    apdu.data = body[1..].to_vec();
                    Ok(apdu)
                } else if n == 2 + lc {
                    apdu.data = body[1..1 + lc].to_vec();
                    apdu.le = Some(decode_le(body[1 + lc]));
                    Ok(apdu)
                } else {
                    Err(ApduError::InvalidLength)
                }
            }
        }
    }
}

fn decode_le(byte: u8) -> u16 {
    if byte == 0 {
        256
    } else {
        byte as u16
    }
}

/// PC/SC Part 3 instruction bytes
pub mod ins {
    pub const GET_DATA: u8 = 0xCA;
    pub const LOAD_KEYS: u8 = 0x82;
    pub const GENERAL_AUTHENTICATE: u8 = 0x86;
    pub const READ_BINARY: u8 = 0xB0;
    pub const UPDATE_BINARY: u8 = 0xD6;
}

/// Key type codes carried in the GENERAL AUTHENTICATE data object
pub mod key_type {
    pub const MIFARE_KEY_A: u8 = 0x60;
    pub const MIFARE_KEY_B: u8 = 0x61;
}

/// Builders for the storage-card commands the transaction engine issues
pub mod commands {
    use super::{ins, CommandApdu, CLA_PCSC};

    /// Volatile reader slot that inline keys are loaded into
    pub const VOLATILE_KEY_SLOT: u8 = 0x00;

    /// Version byte of the GENERAL AUTHENTICATE data object
    const AUTHENTICATE_VERSION: u8 = 0x01;

    fn split_address(address: u16) -> (u8, u8) {
        ((address >> 8) as u8, address as u8)
    }

    /// READ BINARY of one block
    pub fn read_binary(address: u16, block_size: u8) -> CommandApdu {
        let (p1, p2) = split_address(address);
        CommandApdu::new(CLA_PCSC, ins::READ_BINARY, p1, p2).le(block_size as u16)
    }

    /// UPDATE BINARY of one block
    pub fn update_binary(address: u16, data: &[u8]) -> CommandApdu {
        let (p1, p2) = split_address(address);
        CommandApdu::new(CLA_PCSC, ins::UPDATE_BINARY, p1, p2).data(data.to_vec())
    }

    /// LOAD KEYS into a volatile reader slot
    pub fn load_key(slot: u8, key: &[u8]) -> CommandApdu {
        CommandApdu::new(CLA_PCSC, ins::LOAD_KEYS, 0x00, slot).data(key.to_vec())
    }

    /// GENERAL AUTHENTICATE against the sector holding `address`
    pub fn general_authenticate(address: u16, key_type: u8, key_slot: u8) -> CommandApdu {
        let (hi, lo) = split_address(address);
        CommandApdu::new(CLA_PCSC, ins::GENERAL_AUTHENTICATE, 0x00, 0x00).data(vec![
            AUTHENTICATE_VERSION,
            hi,
            lo,
            key_type,
            key_slot,
        ])
    }

    /// GET DATA for the card UID
    pub fn get_uid() -> CommandApdu {
        CommandApdu::new(CLA_PCSC, ins::GET_DATA, 0x00, 0x00).le(256)
    }
}
