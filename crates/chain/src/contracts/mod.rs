//! Simulated oracle-backed contracts
//!
//! Each contract handle is bound to a caller account, like an ethers
//! contract connected to a signer. Transactions return a [`PendingTx`]
//! immediately; anything that needs the oracle is answered later by a
//! callback event tagged with the request id found in the receipt.
//!
//! [`PendingTx`]: sightflow_core::PendingTx

mod async_decrypt;
mod decrypt;
mod erc20;

pub use async_decrypt::{AsyncDecryptExample, RESULT_SLOTS};
pub use decrypt::{DecryptCapsulatedValueExample, DecryptExample};
pub use erc20::ConfidentialErc20;
