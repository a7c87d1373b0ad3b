//! Fixed-width chain primitives
//!
//! Addresses and transaction hashes are the alloy types, so CREATE addresses,
//! checksummed rendering and hex serde match what a real node produces.

pub use alloy_primitives::{Address, TxHash};

/// Abbreviated rendering for console output
pub trait ShortHex {
    /// `0x1234...abc` form of the full hex string
    fn short(&self) -> String;
}

impl ShortHex for Address {
    fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 3..])
    }
}
