//! Error types shared across crates

use thiserror::Error;

use crate::primitives::{Address, TxHash};

/// Errors decoding ABI words, hex strings or value tags
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Input was not exactly one ABI word
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Word failed ABI validation (out of range integer, non 0/1 bool)
    #[error("invalid abi word: {0}")]
    Abi(String),

    /// Malformed hex input
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Tag does not name a known value kind
    #[error("unknown value kind tag {0}")]
    UnknownValueKind(u8),
}

/// Errors raised by the chain collaborator
///
/// Submission errors are fatal to the workflow step that issued them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChainError {
    /// The node could not be reached or dropped the request
    #[error("transport error: {0}")]
    Transport(String),

    /// The contract rejected the call
    #[error("transaction reverted: {reason}")]
    Reverted { reason: String },

    /// No contract is deployed at the address
    #[error("no contract at {0}")]
    UnknownContract(Address),

    /// No receipt for the transaction
    #[error("transaction {0} not found")]
    UnknownTransaction(TxHash),

    /// The transaction confirmed but did not open an oracle request
    #[error("transaction {0} did not issue an oracle request")]
    NoRequestIssued(TxHash),

    /// The coprocessor has no ciphertext behind the handle
    #[error("unknown ciphertext handle 0x{0}")]
    UnknownCiphertext(String),

    /// Payload or return value could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl ChainError {
    /// Shorthand for a revert with a reason string
    pub fn reverted(reason: impl Into<String>) -> Self {
        Self::Reverted {
            reason: reason.into(),
        }
    }
}
