//! Simulated FHE coprocessor
//!
//! Ciphertexts are random 32-byte handles. The table behind them holds the
//! plaintext, its type and the accounts allowed to use it. Arithmetic on
//! handles produces fresh handles, as on a real coprocessor; only the
//! oracle (through [`Coprocessor::decrypt`]) ever reads a plaintext.

use std::collections::{HashMap, HashSet};
use std::fmt;

use rand::Rng;
use sightflow_core::{Address, CapsulatedValue, ChainError, ShortHex, ValueKind};
use tracing::trace;

/// Opaque reference to a ciphertext
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle([u8; 32]);

impl Handle {
    fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Recover the handle carried by an encrypted capsulated value
    pub fn from_capsule(value: &CapsulatedValue) -> Result<Self, ChainError> {
        <[u8; 32]>::try_from(value.data.as_slice())
            .map(Self)
            .map_err(|_| ChainError::UnknownCiphertext(hex::encode(&value.data)))
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", hex::encode(&self.0[..4]))
    }
}

#[derive(Debug)]
struct Ciphertext {
    kind: ValueKind,
    plaintext: u64,
    acl: HashSet<Address>,
}

#[derive(Debug, Default)]
pub struct Coprocessor {
    ciphertexts: HashMap<Handle, Ciphertext>,
}

impl Coprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encrypt `plaintext` as `kind`, readable by `owner`
    pub fn encrypt(&mut self, kind: ValueKind, plaintext: u64, owner: Address) -> Handle {
        let plaintext = match kind {
            ValueKind::Ebool => u64::from(plaintext != 0),
            _ => plaintext,
        };
        let handle = Handle::random();
        self.ciphertexts.insert(
            handle,
            Ciphertext {
                kind,
                plaintext,
                acl: HashSet::from([owner]),
            },
        );
        trace!(%handle, kind = %kind, "ciphertext created");
        handle
    }

    /// A fresh encrypted random value of `kind`
    pub fn random(&mut self, kind: ValueKind, owner: Address) -> Handle {
        let plaintext = rand::thread_rng().gen::<u64>();
        self.encrypt(kind, plaintext, owner)
    }

    /// Encrypted `a + b`, wrapping at 2^64
    pub fn add(&mut self, a: Handle, b: Handle, owner: Address) -> Result<Handle, ChainError> {
        let (x, y) = (self.plaintext(a)?, self.plaintext(b)?);
        Ok(self.encrypt(ValueKind::Euint64, x.wrapping_add(y), owner))
    }

    /// Encrypted `a - b`, wrapping at 2^64
    pub fn sub(&mut self, a: Handle, b: Handle, owner: Address) -> Result<Handle, ChainError> {
        let (x, y) = (self.plaintext(a)?, self.plaintext(b)?);
        Ok(self.encrypt(ValueKind::Euint64, x.wrapping_sub(y), owner))
    }

    /// Encrypted `a >= b`
    pub fn ge(&mut self, a: Handle, b: Handle, owner: Address) -> Result<Handle, ChainError> {
        let (x, y) = (self.plaintext(a)?, self.plaintext(b)?);
        Ok(self.encrypt(ValueKind::Ebool, u64::from(x >= y), owner))
    }

    /// Encrypted `if condition { a } else { b }`
    pub fn select(
        &mut self,
        condition: Handle,
        a: Handle,
        b: Handle,
        owner: Address,
    ) -> Result<Handle, ChainError> {
        let chosen = if self.plaintext(condition)? != 0 { a } else { b };
        let value = self.plaintext(chosen)?;
        Ok(self.encrypt(ValueKind::Euint64, value, owner))
    }

    /// Grant `account` use of the ciphertext
    pub fn allow(&mut self, handle: Handle, account: Address) -> Result<(), ChainError> {
        self.entry_mut(handle)?.acl.insert(account);
        trace!(%handle, account = %account.short(), "ciphertext shared");
        Ok(())
    }

    /// Withdraw `account`'s use of the ciphertext
    pub fn revoke(&mut self, handle: Handle, account: Address) -> Result<(), ChainError> {
        self.entry_mut(handle)?.acl.remove(&account);
        trace!(%handle, account = %account.short(), "ciphertext unshared");
        Ok(())
    }

    pub fn is_allowed(&self, handle: Handle, account: Address) -> bool {
        self.ciphertexts
            .get(&handle)
            .is_some_and(|ct| ct.acl.contains(&account))
    }

    /// Oracle-side decryption
    pub fn decrypt(&self, handle: Handle) -> Result<u64, ChainError> {
        self.plaintext(handle)
    }

    pub fn kind(&self, handle: Handle) -> Result<ValueKind, ChainError> {
        self.entry(handle).map(|ct| ct.kind)
    }

    /// The handle as an encrypted capsulated value
    pub fn capsule(&self, handle: Handle) -> Result<CapsulatedValue, ChainError> {
        Ok(CapsulatedValue::encrypted(
            self.kind(handle)?,
            handle.as_bytes().to_vec(),
        ))
    }

    pub fn len(&self) -> usize {
        self.ciphertexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertexts.is_empty()
    }

    fn plaintext(&self, handle: Handle) -> Result<u64, ChainError> {
        self.entry(handle).map(|ct| ct.plaintext)
    }

    fn entry(&self, handle: Handle) -> Result<&Ciphertext, ChainError> {
        self.ciphertexts
            .get(&handle)
            .ok_or_else(|| ChainError::UnknownCiphertext(hex::encode(handle.0)))
    }

    fn entry_mut(&mut self, handle: Handle) -> Result<&mut Ciphertext, ChainError> {
        self.ciphertexts
            .get_mut(&handle)
            .ok_or_else(|| ChainError::UnknownCiphertext(hex::encode(handle.0)))
    }
}
