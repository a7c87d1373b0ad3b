//! AsyncDecryptExample
//!
//! One request produces two random operands, their encrypted sum and the
//! oracle's decryption of everything. Result slots:
//!
//! | slot | value |
//! |------|-------|
//! | 0 | `a` (euint64) |
//! | 1 | `a` decrypted |
//! | 2 | `a >= b` (ebool) |
//! | 3 | `a >= b` decrypted |
//! | 4 | `b` (euint64) |
//! | 5 | `b` decrypted |
//! | 6 | `a + b` (euint64) |
//! | 7 | `a + b` decrypted, mod 2^64 |

use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;
use sightflow_core::{
    event_names, Address, CapsulatedValue, ChainError, CorrelationToken, EventCategory, PendingTx,
    ShortHex, ValueKind,
};
use tracing::info;

use crate::node::{CallEffect, ChainState, Emission, SimulatedChain};

/// Number of result slots filled by one callback
pub const RESULT_SLOTS: usize = 8;

#[derive(Debug, Default)]
struct State {
    operands: Option<(u64, u64)>,
    latest_request_id: Option<CorrelationToken>,
    results: Vec<CapsulatedValue>,
}

#[derive(Debug, Clone)]
pub struct AsyncDecryptExample {
    chain: SimulatedChain,
    address: Address,
    caller: Address,
    state: Arc<Mutex<State>>,
}

impl AsyncDecryptExample {
    pub fn deploy(chain: &SimulatedChain, deployer: Address) -> Result<Self, ChainError> {
        let (address, _) = chain.deploy(deployer, |_, _| Ok(CallEffect::none()))?;
        Ok(Self {
            chain: chain.clone(),
            address,
            caller: deployer,
            state: Arc::default(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn oracle_callback(&self) -> EventCategory {
        EventCategory::oracle_callback(self.address)
    }

    /// Use fixed operands instead of random ones for the following requests
    pub fn pin_operands(&self, a: u64, b: u64) {
        self.state.lock().operands = Some((a, b));
    }

    /// Ask the oracle for two random values, their sum, and all decryptions
    pub fn async_decrypt_random_euint64(&self) -> Result<PendingTx, ChainError> {
        let token = self.chain.open_request();
        let tx = self.chain.submit(self.caller, |_| {
            self.state.lock().latest_request_id = Some(token.clone());
            Ok(CallEffect::request(token.clone()))
        })?;

        let address = self.address;
        let state = Arc::clone(&self.state);
        self.chain
            .fulfil(token, move |chain| resolve(chain, address, &state));

        Ok(tx)
    }

    pub fn latest_request_id(&self) -> Option<CorrelationToken> {
        self.state.lock().latest_request_id.clone()
    }

    /// All result slots; empty until the first callback
    pub fn results(&self) -> Vec<CapsulatedValue> {
        self.state.lock().results.clone()
    }

    /// The decrypted sum (slot 7)
    pub fn result(&self) -> Option<CapsulatedValue> {
        self.state.lock().results.get(RESULT_SLOTS - 1).cloned()
    }
}

fn resolve(
    chain: &mut ChainState,
    address: Address,
    state: &Mutex<State>,
) -> Result<Vec<Emission>, ChainError> {
    let (a, b) = state
        .lock()
        .operands
        .unwrap_or_else(|| (rand::thread_rng().gen(), rand::thread_rng().gen()));

    let cop = &mut chain.coprocessor;
    let enc_a = cop.encrypt(ValueKind::Euint64, a, address);
    let enc_b = cop.encrypt(ValueKind::Euint64, b, address);
    let enc_ge = cop.ge(enc_a, enc_b, address)?;
    let enc_sum = cop.add(enc_a, enc_b, address)?;

    let results = vec![
        cop.capsule(enc_a)?,
        CapsulatedValue::plain_u64(cop.decrypt(enc_a)?),
        cop.capsule(enc_ge)?,
        CapsulatedValue::plain_bool(cop.decrypt(enc_ge)? != 0),
        cop.capsule(enc_b)?,
        CapsulatedValue::plain_u64(cop.decrypt(enc_b)?),
        cop.capsule(enc_sum)?,
        CapsulatedValue::plain_u64(cop.decrypt(enc_sum)?),
    ];

    info!(contract = %address.short(), a, b, "random values decrypted");
    state.lock().results = results;

    Ok(vec![Emission::new(
        address,
        event_names::ORACLE_CALLBACK,
        json!({ "slots": RESULT_SLOTS }),
    )])
}
