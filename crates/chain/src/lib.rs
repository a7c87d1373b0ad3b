//! # Simulated Oracle Chain
//!
//! An in-process stand-in for a confidential-computation chain and its
//! oracle, implementing [`OracleChain`](sightflow_core::OracleChain).
//!
//! ## Features
//!
//! - **Instant mining**: calls are mined on submission, receipts carry request ids
//! - **Asynchronous oracle**: callbacks are emitted after a configurable latency
//! - **Coprocessor**: ciphertext handles, homomorphic add/sub/compare, ACLs
//! - **Contracts**: AsyncDecryptExample, ConfidentialERC20, DecryptExample,
//!   DecryptCapsulatedValueExample
//! - **Fault injection**: stray callbacks with foreign request ids, redelivery
//!
//! ## Example
//!
//! ```ignore
//! use sightflow_chain::prelude::*;
//!
//! let chain = SimulatedChain::new(ChainConfig::from_env()?);
//! let owner = chain.create_account(10u128.pow(18));
//! let zero = chain.encrypt_u64(owner, 0);
//! let (token, deployment) = ConfidentialErc20::deploy(&chain, owner, "MyCToken", "MCT", &zero)?;
//! let init_request = chain.await_request_id(&deployment).await?;
//! ```

pub mod config;
pub mod contracts;
pub mod coprocessor;
pub mod node;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::ChainConfig;
    pub use crate::contracts::{
        AsyncDecryptExample, ConfidentialErc20, DecryptCapsulatedValueExample, DecryptExample,
    };
    pub use crate::node::SimulatedChain;
    pub use sightflow_core::OracleChain;
}

// Re-export key types at crate root
pub use config::{ChainConfig, ConfigError};
pub use contracts::{
    AsyncDecryptExample, ConfidentialErc20, DecryptCapsulatedValueExample, DecryptExample,
    RESULT_SLOTS,
};
pub use coprocessor::{Coprocessor, Handle};
pub use node::{contract_address, CallEffect, ChainState, Emission, SimulatedChain};
