//! Status Word (SW) constants for storage-card responses
//!
//! Status words a PC/SC reader returns for Part 3 storage commands.

/// Status Word constants
pub struct SW;

impl SW {
    pub const SUCCESS: u16 = 0x9000;

    /// Operation failed (also returned on a rejected authentication)
    pub const OPERATION_FAILED: u16 = 0x6300;
    pub const WRONG_LENGTH: u16 = 0x6700;
    pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
    pub const FUNCTION_NOT_SUPPORTED: u16 = 0x6A81;
    pub const WRONG_P1_P2: u16 = 0x6B00;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;

    /// Create a "wrong Le" status word (6Cxx)
    /// The low byte indicates the correct Le value
    #[inline]
    pub fn wrong_le(correct_le: u8) -> u16 {
        0x6C00 | (correct_le as u16)
    }

    /// Storage commands only succeed with 9000, 61xx is never returned by Part 3 readers
    #[inline]
    pub fn is_success(sw: u16) -> bool {
        sw == Self::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_le() {
        assert_eq!(SW::wrong_le(0x10), 0x6C10);
        assert_eq!(SW::wrong_le(4), 0x6C04);
    }

    #[test]
    fn test_is_success() {
        assert!(SW::is_success(0x9000));
        assert!(!SW::is_success(0x6110));
        assert!(!SW::is_success(SW::OPERATION_FAILED));
    }
}
