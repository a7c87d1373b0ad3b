//! # sightflow core
//!
//! Data model shared by every sightflow crate:
//!
//! - [`CorrelationToken`]: opaque request identifier minted by the chain
//! - [`CallbackEvent`] and [`EventCategory`]: what the oracle pushes back
//! - [`CapsulatedValue`] and [`ValueKind`]: encrypted or plaintext results
//! - [`OracleChain`]: the chain collaborator seam (submission, confirmation, events)
//!
//! Nothing in this crate interprets ciphertexts or tokens. They are compared
//! for equality and rendered for diagnostics, nothing more.

pub mod abi;
pub mod chain;
pub mod duration_millis;
pub mod error;
pub mod event;
pub mod primitives;
pub mod token;
pub mod value;

pub use chain::{OracleChain, PendingTx, Receipt, TxStatus};
pub use error::{ChainError, DecodeError};
pub use event::{event_names, CallbackEvent, EventCategory};
pub use primitives::{Address, ShortHex, TxHash};
pub use token::CorrelationToken;
pub use value::{CapsulatedValue, ValueKind};
