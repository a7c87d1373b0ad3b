//! Capsulated values returned by oracle-backed contracts
//!
//! A capsulated value pairs raw bytes with a value-kind tag. For plaintext
//! kinds the bytes are one ABI word; for encrypted kinds they are an opaque
//! ciphertext handle owned by the coprocessor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::abi;
use crate::error::DecodeError;
use crate::primitives::Address;

/// Value kind tag carried next to the bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ValueKind {
    Bool = 0,
    Uint64 = 1,
    Address = 2,
    Bytes = 3,
    Ebool = 128,
    Euint64 = 129,
    Eaddress = 130,
}

impl ValueKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Whether the bytes are a ciphertext handle rather than a plaintext word
    pub fn is_encrypted(self) -> bool {
        matches!(self, Self::Ebool | Self::Euint64 | Self::Eaddress)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Uint64 => "uint64",
            Self::Address => "address",
            Self::Bytes => "bytes",
            Self::Ebool => "ebool",
            Self::Euint64 => "euint64",
            Self::Eaddress => "eaddress",
        }
    }
}

impl TryFrom<u8> for ValueKind {
    type Error = DecodeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::Bool),
            1 => Ok(Self::Uint64),
            2 => Ok(Self::Address),
            3 => Ok(Self::Bytes),
            128 => Ok(Self::Ebool),
            129 => Ok(Self::Euint64),
            130 => Ok(Self::Eaddress),
            other => Err(DecodeError::UnknownValueKind(other)),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bytes plus a value-kind tag, as stored by the contracts
///
/// The tag is kept raw so values with tags this crate does not know still
/// round-trip and can be explained.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapsulatedValue {
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub value_type: u8,
}

impl CapsulatedValue {
    pub fn new(data: impl Into<Vec<u8>>, kind: ValueKind) -> Self {
        Self {
            data: data.into(),
            value_type: kind.tag(),
        }
    }

    pub fn plain_u64(value: u64) -> Self {
        Self::new(abi::encode_u64(value), ValueKind::Uint64)
    }

    pub fn plain_bool(value: bool) -> Self {
        Self::new(abi::encode_bool(value), ValueKind::Bool)
    }

    pub fn plain_address(address: Address) -> Self {
        Self::new(abi::encode_address(&address), ValueKind::Address)
    }

    /// Wrap a ciphertext handle
    pub fn encrypted(kind: ValueKind, handle: impl Into<Vec<u8>>) -> Self {
        debug_assert!(kind.is_encrypted());
        Self::new(handle, kind)
    }

    pub fn kind(&self) -> Result<ValueKind, DecodeError> {
        ValueKind::try_from(self.value_type)
    }

    pub fn is_encrypted(&self) -> bool {
        self.kind().map(ValueKind::is_encrypted).unwrap_or(false)
    }

    /// Decode the plaintext word as `uint64`
    pub fn as_u64(&self) -> Result<u64, DecodeError> {
        abi::decode_u64(&self.data)
    }

    /// Human-readable rendering for logs and console output
    ///
    /// Never fails: malformed or unknown values are rendered as such.
    pub fn explain(&self) -> String {
        let kind = match self.kind() {
            Ok(kind) => kind,
            Err(_) => {
                return format!(
                    "unknown(tag={}, 0x{})",
                    self.value_type,
                    hex::encode(&self.data)
                )
            }
        };

        if kind.is_encrypted() {
            return format!(
                "{kind}(ciphertext {}, {} bytes)",
                abbreviate(&self.data),
                self.data.len()
            );
        }

        let rendered = match kind {
            ValueKind::Bool => abi::decode_bool(&self.data).map(|b| b.to_string()),
            ValueKind::Uint64 => abi::decode_u64(&self.data).map(|v| v.to_string()),
            ValueKind::Address => abi::decode_address(&self.data).map(|a| a.to_string()),
            _ => Ok(format!("0x{}", hex::encode(&self.data))),
        };

        match rendered {
            Ok(text) => format!("{kind}({text})"),
            Err(_) => format!("{kind}(malformed 0x{})", hex::encode(&self.data)),
        }
    }
}

impl fmt::Debug for CapsulatedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explain())
    }
}

fn abbreviate(bytes: &[u8]) -> String {
    let full = hex::encode(bytes);
    if full.len() <= 12 {
        return format!("0x{full}");
    }
    format!("0x{}...{}", &full[..6], &full[full.len() - 4..])
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        hex::decode(text.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
