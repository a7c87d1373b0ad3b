//! ConfidentialERC20
//!
//! Balances, allowances and total supply are ciphertexts. Every state
//! change is an oracle request: the call is mined at once, the coprocessor
//! work happens when the oracle answers, and an `OracleCallback` tagged with
//! the request id announces the new state. Insufficient balances or
//! allowances never revert; the moved amount silently becomes zero, as an
//! encrypted `select` would make it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use sightflow_core::{
    event_names, Address, CapsulatedValue, ChainError, CorrelationToken, EventCategory, PendingTx,
    ShortHex, ValueKind,
};
use tracing::info;

use crate::coprocessor::{Coprocessor, Handle};
use crate::node::{CallEffect, Emission, SimulatedChain};

#[derive(Debug)]
struct State {
    name: String,
    symbol: String,
    owner: Address,
    open_mint: bool,
    initial_value: Option<Handle>,
    result: Option<u64>,
    total_supply: Option<Handle>,
    balances: HashMap<Address, Handle>,
    allowances: HashMap<(Address, Address), Handle>,
    decrypted: HashMap<Address, u64>,
    latest_request_id: Option<CorrelationToken>,
}

impl State {
    fn balance_or_zero(&mut self, cop: &mut Coprocessor, account: Address) -> Handle {
        *self
            .balances
            .entry(account)
            .or_insert_with(|| cop.encrypt(ValueKind::Euint64, 0, account))
    }
}

/// Handle to a deployed confidential token, bound to a caller
#[derive(Debug, Clone)]
pub struct ConfidentialErc20 {
    chain: SimulatedChain,
    address: Address,
    caller: Address,
    state: Arc<Mutex<State>>,
}

impl ConfidentialErc20 {
    /// Deploy a token whose owner alone may mint and burn
    ///
    /// `initial` is the encrypted initial supply; the constructor asks the
    /// oracle to decrypt it and answers with `InitializeOracleCallback`.
    pub fn deploy(
        chain: &SimulatedChain,
        deployer: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
        initial: &CapsulatedValue,
    ) -> Result<(Self, PendingTx), ChainError> {
        Self::deploy_with(chain, deployer, name.into(), symbol.into(), initial, false)
    }

    /// Deploy a faucet token: anyone may mint to themselves
    pub fn deploy_faucet(
        chain: &SimulatedChain,
        deployer: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
        initial: &CapsulatedValue,
    ) -> Result<(Self, PendingTx), ChainError> {
        Self::deploy_with(chain, deployer, name.into(), symbol.into(), initial, true)
    }

    fn deploy_with(
        chain: &SimulatedChain,
        deployer: Address,
        name: String,
        symbol: String,
        initial: &CapsulatedValue,
        open_mint: bool,
    ) -> Result<(Self, PendingTx), ChainError> {
        let initial = Handle::from_capsule(initial)?;
        let token = chain.open_request();
        let state = Arc::new(Mutex::new(State {
            name,
            symbol,
            owner: deployer,
            open_mint,
            initial_value: None,
            result: None,
            total_supply: None,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            decrypted: HashMap::new(),
            latest_request_id: Some(token.clone()),
        }));

        let (address, tx) = chain.deploy(deployer, |address, chain_state| {
            chain_state.coprocessor.allow(initial, address)?;
            Ok(CallEffect::request(token.clone()))
        })?;

        let pending = Arc::clone(&state);
        chain.fulfil(token, move |chain_state| {
            let value = chain_state.coprocessor.decrypt(initial)?;
            let mut state = pending.lock();
            state.initial_value = Some(initial);
            state.total_supply = Some(initial);
            state.result = Some(value);
            info!(contract = %address.short(), initial = value, "token initialized");
            Ok(vec![Emission::new(
                address,
                event_names::INITIALIZE_ORACLE_CALLBACK,
                json!({ "initial_value": value }),
            )])
        });

        let contract = Self {
            chain: chain.clone(),
            address,
            caller: deployer,
            state,
        };
        Ok((contract, tx))
    }

    /// The same contract, called from `caller`
    pub fn connect(&self, caller: Address) -> Self {
        Self {
            caller,
            ..self.clone()
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn oracle_callback(&self) -> EventCategory {
        EventCategory::oracle_callback(self.address)
    }

    pub fn initialize_callback(&self) -> EventCategory {
        EventCategory::initialize_callback(self.address)
    }

    pub fn transfer_event(&self) -> EventCategory {
        EventCategory::new(self.address, event_names::TRANSFER)
    }

    // ============================================
    // Transactions
    // ============================================

    /// Credit `amount` to the caller
    pub fn mint(&self, amount: u64) -> Result<PendingTx, ChainError> {
        let caller = self.caller;
        self.request(
            |state| {
                if state.open_mint || caller == state.owner {
                    Ok(())
                } else {
                    Err(ChainError::reverted("caller is not the owner"))
                }
            },
            move |cop, state, address| {
                let balance = state.balance_or_zero(cop, caller);
                let minted = cop.encrypt(ValueKind::Euint64, amount, address);
                let new_balance = cop.add(balance, minted, caller)?;
                cop.allow(new_balance, address)?;
                state.balances.insert(caller, new_balance);

                let supply = state
                    .total_supply
                    .unwrap_or_else(|| cop.encrypt(ValueKind::Euint64, 0, address));
                state.total_supply = Some(cop.add(supply, minted, address)?);

                Ok(vec![op_callback(address, json!({ "op": "mint", "to": caller, "amount": amount }))])
            },
        )
    }

    /// Destroy up to `amount` of the owner's balance
    pub fn burn(&self, amount: u64) -> Result<PendingTx, ChainError> {
        let caller = self.caller;
        self.request(
            |state| {
                if caller == state.owner {
                    Ok(())
                } else {
                    Err(ChainError::reverted("caller is not the owner"))
                }
            },
            move |cop, state, address| {
                let balance = state.balance_or_zero(cop, caller);
                let burned = clamp(cop, amount, &[balance], address)?;
                let new_balance = cop.sub(balance, burned, caller)?;
                cop.allow(new_balance, address)?;
                state.balances.insert(caller, new_balance);

                if let Some(supply) = state.total_supply {
                    state.total_supply = Some(cop.sub(supply, burned, address)?);
                }

                Ok(vec![op_callback(address, json!({ "op": "burn", "amount": amount }))])
            },
        )
    }

    /// Move up to `amount` from the caller to `to`
    pub fn transfer(&self, to: Address, amount: u64) -> Result<PendingTx, ChainError> {
        let from = self.caller;
        self.request(
            |_| Ok(()),
            move |cop, state, address| {
                let balance = state.balance_or_zero(cop, from);
                let moved = clamp(cop, amount, &[balance], address)?;
                move_balance(cop, state, address, from, to, moved)?;

                Ok(vec![op_callback(
                    address,
                    json!({ "op": "transfer", "from": from, "to": to }),
                )])
            },
        )
    }

    /// Let `spender` move up to `amount` of the caller's balance
    pub fn approve(&self, spender: Address, amount: u64) -> Result<PendingTx, ChainError> {
        let owner = self.caller;
        self.request(
            |_| Ok(()),
            move |cop, state, address| {
                let allowance = cop.encrypt(ValueKind::Euint64, amount, owner);
                cop.allow(allowance, spender)?;
                cop.allow(allowance, address)?;
                state.allowances.insert((owner, spender), allowance);

                Ok(vec![op_callback(
                    address,
                    json!({ "op": "approve", "owner": owner, "spender": spender }),
                )])
            },
        )
    }

    /// Spend the caller's allowance on `from` to move up to `amount` to `to`
    ///
    /// Answered by an `OracleCallback` followed by a `Transfer` event.
    pub fn transfer_from(
        &self,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<PendingTx, ChainError> {
        let spender = self.caller;
        self.request(
            |_| Ok(()),
            move |cop, state, address| {
                let allowance = match state.allowances.get(&(from, spender)) {
                    Some(allowance) => *allowance,
                    None => cop.encrypt(ValueKind::Euint64, 0, from),
                };
                let balance = state.balance_or_zero(cop, from);
                let moved = clamp(cop, amount, &[allowance, balance], address)?;

                let remaining = cop.sub(allowance, moved, from)?;
                cop.allow(remaining, spender)?;
                state.allowances.insert((from, spender), remaining);
                move_balance(cop, state, address, from, to, moved)?;

                let payload = json!({ "op": "transfer_from", "from": from, "to": to, "spender": spender });
                Ok(vec![
                    op_callback(address, payload),
                    Emission::new(
                        address,
                        event_names::TRANSFER,
                        json!({ "from": from, "to": to }),
                    ),
                ])
            },
        )
    }

    /// Ask the oracle to publish `user`'s balance in plaintext
    pub fn decrypt_user_balance(&self, user: Address) -> Result<PendingTx, ChainError> {
        self.request(
            |_| Ok(()),
            move |cop, state, address| {
                let balance = match state.balances.get(&user) {
                    Some(handle) => cop.decrypt(*handle)?,
                    None => 0,
                };
                state.decrypted.insert(user, balance);

                Ok(vec![op_callback(
                    address,
                    json!({ "op": "decrypt_balance", "user": user }),
                )])
            },
        )
    }

    fn request<V, R>(&self, validate: V, resolve: R) -> Result<PendingTx, ChainError>
    where
        V: FnOnce(&State) -> Result<(), ChainError>,
        R: FnOnce(&mut Coprocessor, &mut State, Address) -> Result<Vec<Emission>, ChainError>
            + Send
            + 'static,
    {
        let token = self.chain.open_request();
        let tx = self.chain.submit(self.caller, |_| {
            let mut state = self.state.lock();
            validate(&state)?;
            state.latest_request_id = Some(token.clone());
            Ok(CallEffect::request(token.clone()))
        })?;

        let state = Arc::clone(&self.state);
        let address = self.address;
        self.chain.fulfil(token, move |chain| {
            resolve(&mut chain.coprocessor, &mut state.lock(), address)
        });
        Ok(tx)
    }

    // ============================================
    // Views
    // ============================================

    pub fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    pub fn symbol(&self) -> String {
        self.state.lock().symbol.clone()
    }

    pub fn owner(&self) -> Address {
        self.state.lock().owner
    }

    pub fn latest_request_id(&self) -> Option<CorrelationToken> {
        self.state.lock().latest_request_id.clone()
    }

    /// Encrypted initial supply, set by `InitializeOracleCallback`
    pub fn initial_value(&self) -> Option<CapsulatedValue> {
        self.state.lock().initial_value.map(encrypted)
    }

    /// Decrypted initial supply, set by `InitializeOracleCallback`
    pub fn result(&self) -> Option<u64> {
        self.state.lock().result
    }

    pub fn total_supply(&self) -> Option<CapsulatedValue> {
        self.state.lock().total_supply.map(encrypted)
    }

    pub fn balance_of(&self, account: Address) -> Option<CapsulatedValue> {
        self.state.lock().balances.get(&account).copied().map(encrypted)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Option<CapsulatedValue> {
        self.state
            .lock()
            .allowances
            .get(&(owner, spender))
            .copied()
            .map(encrypted)
    }

    /// Plaintext balance published by the last `decrypt_user_balance(user)`
    pub fn decrypted_balance(&self, user: Address) -> Option<u64> {
        self.state.lock().decrypted.get(&user).copied()
    }
}

fn encrypted(handle: Handle) -> CapsulatedValue {
    CapsulatedValue::encrypted(ValueKind::Euint64, handle.as_bytes().to_vec())
}

fn op_callback(address: Address, payload: serde_json::Value) -> Emission {
    Emission::new(address, event_names::ORACLE_CALLBACK, payload)
}

/// Encrypted `amount` if every limit covers it, encrypted zero otherwise
fn clamp(
    cop: &mut Coprocessor,
    amount: u64,
    limits: &[Handle],
    address: Address,
) -> Result<Handle, ChainError> {
    let requested = cop.encrypt(ValueKind::Euint64, amount, address);
    let zero = cop.encrypt(ValueKind::Euint64, 0, address);
    let mut moved = requested;
    for limit in limits {
        let covered = cop.ge(*limit, requested, address)?;
        moved = cop.select(covered, moved, zero, address)?;
    }
    Ok(moved)
}

fn move_balance(
    cop: &mut Coprocessor,
    state: &mut State,
    address: Address,
    from: Address,
    to: Address,
    moved: Handle,
) -> Result<(), ChainError> {
    let from_balance = state.balance_or_zero(cop, from);
    let debited = cop.sub(from_balance, moved, from)?;
    cop.allow(debited, address)?;
    state.balances.insert(from, debited);

    // Read after the debit so a self-transfer nets to zero
    let to_balance = state.balance_or_zero(cop, to);
    let credited = cop.add(to_balance, moved, to)?;
    cop.allow(credited, address)?;
    state.balances.insert(to, credited);
    Ok(())
}
