//! DecryptExample and DecryptCapsulatedValueExample
//!
//! `DecryptExample` asks the oracle for a random encrypted value and keeps it
//! as its capsulated value. It can share that ciphertext with another
//! contract, which may then ask the oracle to decrypt it.
//! `DecryptCapsulatedValueExample` is that other contract: it only accepts
//! ciphertexts it has been granted.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use sightflow_core::{
    event_names, Address, CapsulatedValue, ChainError, CorrelationToken, EventCategory, PendingTx,
    ShortHex, ValueKind,
};
use tracing::info;

use crate::coprocessor::Handle;
use crate::node::{CallEffect, Emission, SimulatedChain};

#[derive(Debug, Default)]
struct DecryptState {
    capsulated_value: Option<Handle>,
    decrypted: Option<u64>,
    callback_acl: Vec<Address>,
    value_owners: Vec<Address>,
    latest_request_id: Option<CorrelationToken>,
}

#[derive(Debug, Clone)]
pub struct DecryptExample {
    chain: SimulatedChain,
    address: Address,
    caller: Address,
    state: Arc<Mutex<DecryptState>>,
}

impl DecryptExample {
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

    /// Add or remove `account` from the accounts allowed to receive callbacks
    pub fn share_acl(&self, account: Address, allowed: bool) -> Result<PendingTx, ChainError> {
        self.chain.submit(self.caller, |_| {
            let mut state = self.state.lock();
            update_membership(&mut state.callback_acl, account, allowed);
            Ok(CallEffect::none())
        })
    }

    /// Ask the oracle for a random euint64 and its decryption
    pub fn decrypt_random_euint64(&self) -> Result<PendingTx, ChainError> {
        let token = self.chain.open_request();
        let tx = self.chain.submit(self.caller, |_| {
            self.state.lock().latest_request_id = Some(token.clone());
            Ok(CallEffect::request(token.clone()))
        })?;

        let state = Arc::clone(&self.state);
        let address = self.address;
        self.chain.fulfil(token, move |chain| {
            let handle = chain.coprocessor.random(ValueKind::Euint64, address);
            let value = chain.coprocessor.decrypt(handle)?;
            let mut state = state.lock();
            state.capsulated_value = Some(handle);
            state.decrypted = Some(value);
            info!(contract = %address.short(), "random value decrypted");
            Ok(vec![Emission::new(
                address,
                event_names::ORACLE_CALLBACK,
                json!({ "value_type": ValueKind::Euint64.tag() }),
            )])
        });

        Ok(tx)
    }

    /// Grant or withdraw `account`'s use of the capsulated value
    ///
    /// Reverts until a random value has been decrypted.
    pub fn share_encrypted_value(
        &self,
        account: Address,
        allowed: bool,
    ) -> Result<PendingTx, ChainError> {
        self.chain.submit(self.caller, |chain| {
            let mut state = self.state.lock();
            let handle = state
                .capsulated_value
                .ok_or_else(|| ChainError::reverted("no capsulated value to share"))?;
            if allowed {
                chain.coprocessor.allow(handle, account)?;
            } else {
                chain.coprocessor.revoke(handle, account)?;
            }
            update_membership(&mut state.value_owners, account, allowed);
            Ok(CallEffect::none())
        })
    }

    pub fn latest_request_id(&self) -> Option<CorrelationToken> {
        self.state.lock().latest_request_id.clone()
    }

    pub fn capsulated_value(&self) -> Option<CapsulatedValue> {
        self.state
            .lock()
            .capsulated_value
            .map(|handle| CapsulatedValue::encrypted(ValueKind::Euint64, handle.as_bytes().to_vec()))
    }

    /// Plaintext of the capsulated value as published by the oracle
    pub fn decrypted(&self) -> Option<u64> {
        self.state.lock().decrypted
    }

    pub fn acl(&self) -> Vec<Address> {
        self.state.lock().callback_acl.clone()
    }

    pub fn encrypted_value_owners(&self) -> Vec<Address> {
        self.state.lock().value_owners.clone()
    }
}

#[derive(Debug, Default)]
struct CapsuleState {
    target: Option<CapsulatedValue>,
    latest_request_id: Option<CorrelationToken>,
}

#[derive(Debug, Clone)]
pub struct DecryptCapsulatedValueExample {
    chain: SimulatedChain,
    address: Address,
    caller: Address,
    state: Arc<Mutex<CapsuleState>>,
}

impl DecryptCapsulatedValueExample {
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

    /// Ask the oracle to decrypt a ciphertext shared with this contract
    pub fn decrypt_capsulated_value(
        &self,
        value: &CapsulatedValue,
    ) -> Result<PendingTx, ChainError> {
        if !value.is_encrypted() {
            return Err(ChainError::reverted(format!(
                "not an encrypted value: {}",
                value.explain()
            )));
        }
        let handle = Handle::from_capsule(value)?;
        let address = self.address;
        let token = self.chain.open_request();

        let tx = self.chain.submit(self.caller, |chain| {
            if !chain.coprocessor.is_allowed(handle, address) {
                return Err(ChainError::reverted(format!(
                    "{} is not allowed to use ciphertext {handle}",
                    address.short()
                )));
            }
            self.state.lock().latest_request_id = Some(token.clone());
            Ok(CallEffect::request(token.clone()))
        })?;

        let state = Arc::clone(&self.state);
        self.chain.fulfil(token, move |chain| {
            let value = chain.coprocessor.decrypt(handle)?;
            state.lock().target = Some(CapsulatedValue::plain_u64(value));
            info!(contract = %address.short(), "capsulated value decrypted");
            Ok(vec![Emission::new(
                address,
                event_names::ORACLE_CALLBACK,
                json!({ "value_type": ValueKind::Uint64.tag() }),
            )])
        });

        Ok(tx)
    }

    pub fn latest_request_id(&self) -> Option<CorrelationToken> {
        self.state.lock().latest_request_id.clone()
    }

    /// Decrypted value, once the oracle has answered
    pub fn target(&self) -> Option<CapsulatedValue> {
        self.state.lock().target.clone()
    }
}

fn update_membership(members: &mut Vec<Address>, account: Address, present: bool) {
    match (present, members.contains(&account)) {
        (true, false) => members.push(account),
        (false, true) => members.retain(|member| *member != account),
        _ => {}
    }
}
