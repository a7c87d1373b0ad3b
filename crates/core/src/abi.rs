//! ABI word codec
//!
//! Oracle results come back as single 32-byte ABI words. Only the static
//! types the workflows read are supported: `uint64`, `bool` and `address`.
//! Decoding is strict: out-of-range words are rejected, not truncated.

use alloy_sol_types::SolValue;

use crate::error::DecodeError;
use crate::primitives::Address;

/// Size of one ABI word
pub const WORD_LEN: usize = 32;

pub fn encode_u64(value: u64) -> Vec<u8> {
    value.abi_encode()
}

/// Decode a `uint64` word, rejecting values wider than 64 bits
pub fn decode_u64(data: &[u8]) -> Result<u64, DecodeError> {
    u64::abi_decode(as_word(data)?, true).map_err(abi_error)
}

pub fn encode_bool(value: bool) -> Vec<u8> {
    value.abi_encode()
}

/// Decode a `bool` word; anything but 0 or 1 is rejected
pub fn decode_bool(data: &[u8]) -> Result<bool, DecodeError> {
    bool::abi_decode(as_word(data)?, true).map_err(abi_error)
}

pub fn encode_address(address: &Address) -> Vec<u8> {
    address.abi_encode()
}

pub fn decode_address(data: &[u8]) -> Result<Address, DecodeError> {
    Address::abi_decode(as_word(data)?, true).map_err(abi_error)
}

fn as_word(data: &[u8]) -> Result<&[u8], DecodeError> {
    if data.len() != WORD_LEN {
        return Err(DecodeError::InvalidLength {
            expected: WORD_LEN,
            actual: data.len(),
        });
    }
    Ok(data)
}

fn abi_error(err: alloy_sol_types::Error) -> DecodeError {
    DecodeError::Abi(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_word_layout() {
        let word = encode_u64(1000);
        assert_eq!(word.len(), WORD_LEN);
        assert_eq!(&word[..24], &[0u8; 24]);
        assert_eq!(decode_u64(&word).unwrap(), 1000);
        assert_eq!(decode_u64(&encode_u64(u64::MAX)).unwrap(), u64::MAX);
    }

    #[test]
    fn test_u64_rejects_wide_values() {
        let mut word = encode_u64(1);
        word[0] = 1;
        assert!(matches!(decode_u64(&word), Err(DecodeError::Abi(_))));
    }

    #[test]
    fn test_rejects_short_input() {
        assert_eq!(
            decode_u64(&[0u8; 8]),
            Err(DecodeError::InvalidLength {
                expected: 32,
                actual: 8
            })
        );
    }

    #[test]
    fn test_bool_words() {
        assert!(decode_bool(&encode_bool(true)).unwrap());
        assert!(!decode_bool(&encode_bool(false)).unwrap());
        assert!(matches!(
            decode_bool(&encode_u64(2)),
            Err(DecodeError::Abi(_))
        ));
    }

    #[test]
    fn test_address_word() {
        let address = Address::random();
        let word = encode_address(&address);
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(decode_address(&word).unwrap(), address);
    }
}
