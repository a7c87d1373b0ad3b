//! Correlation tokens

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Opaque identifier linking an issued oracle request to its callback
///
/// Tokens are minted by the chain collaborator when a request is issued
/// (the contract's `reqId`). The workflow layer only ever compares them for
/// equality; their bytes carry no meaning here.
///
/// Rendered and serialized as `0x`-prefixed hex.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CorrelationToken(Vec<u8>);

impl CorrelationToken {
    /// Wrap raw bytes as a token
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Random 32-byte token, the shape request ids take on chain
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        Self(bytes.to_vec())
    }

    /// Parse a hex string, with or without `0x` prefix
    pub fn parse_hex(s: &str) -> Result<Self, DecodeError> {
        Ok(Self(hex::decode(s.trim_start_matches("0x"))?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationToken({self})")
    }
}

impl From<CorrelationToken> for String {
    fn from(value: CorrelationToken) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for CorrelationToken {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_hex(&value)
    }
}
