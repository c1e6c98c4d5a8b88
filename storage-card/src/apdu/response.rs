//! APDU Response handling
//!
//! A Response contains data bytes plus SW1/SW2 status words, either decoded
//! from what the reader returned or built by the virtual card.

use super::status::SW;
use super::ApduError;

/// A reader/card response
///
/// # Example
/// ```ignore
/// let response = Response::from_bytes(&[0x01, 0x02, 0x90, 0x00]).unwrap();
/// assert!(response.is_okay());
/// assert_eq!(response.data, vec![0x01, 0x02]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response data (without status words)
    pub data: Vec<u8>,
    /// Status word 1 (SW1)
    pub sw1: u8,
    /// Status word 2 (SW2)
    pub sw2: u8,
}

impl Response {
    /// Create a new response with data and status word
    pub fn new(data: Vec<u8>, sw: u16) -> Self {
        Self {
            data,
            sw1: (sw >> 8) as u8,
            sw2: sw as u8,
        }
    }

    /// Create a success response (0x9000) with data
    pub fn success(data: Vec<u8>) -> Self {
        Self::new(data, SW::SUCCESS)
    }

    /// Create an empty success response (0x9000)
    pub fn ok() -> Self {
        Self::success(Vec::new())
    }

    /// Create an error response (no data)
    pub fn error(sw: u16) -> Self {
        Self::new(Vec::new(), sw)
    }

    /// Split raw response bytes into data and trailing SW1 SW2
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ApduError> {
        if raw.len() < 2 {
            return Err(ApduError::ResponseTooShort(raw.len()));
        }
        let split = raw.len() - 2;
        Ok(Self {
            data: raw[..split].to_vec(),
            sw1: raw[split],
            sw2: raw[split + 1],
        })
    }

    /// Check if the response is okay (0x9000)
    pub fn is_okay(&self) -> bool {
        SW::is_success(self.sw())
    }

    /// Get the combined status word as u16
    pub fn sw(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Convert to raw bytes for transmission (data + SW1 + SW2)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.data.len() + 2);
        result.extend_from_slice(&self.data);
        result.push(self.sw1);
        result.push(self.sw2);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response() {
        let resp = Response::success(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(resp.is_okay());
        assert_eq!(resp.sw(), 0x9000);
        assert_eq!(resp.to_bytes(), vec![0xDE, 0xAD, 0xBE, 0xEF, 0x90, 0x00]);
    }

    #[test]
    fn test_from_bytes() {
        let resp = Response::from_bytes(&[0x01, 0x02, 0x03, 0x04, 0x90, 0x00]).unwrap();
        assert!(resp.is_okay());
        assert_eq!(resp.data, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_from_bytes_status_only() {
        let resp = Response::from_bytes(&[0x63, 0x00]).unwrap();
        assert!(!resp.is_okay());
        assert!(resp.data.is_empty());
        assert_eq!(resp.sw(), SW::OPERATION_FAILED);
    }

    #[test]
    fn test_from_bytes_too_short() {
        assert_eq!(
            Response::from_bytes(&[0x90]),
            Err(ApduError::ResponseTooShort(1))
        );
    }

    #[test]
    fn test_error_response() {
        let resp = Response::error(SW::SECURITY_STATUS_NOT_SATISFIED);
        assert!(resp.data.is_empty());
        assert_eq!(resp.sw(), SW::SECURITY_STATUS_NOT_SATISFIED);
        assert!(!resp.is_okay());
    }
}
