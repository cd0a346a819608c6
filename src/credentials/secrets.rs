//! Persisted API key slot.
//!
//! At most one key is kept, under `STORED_KEY_NAME` in the OS keychain
//! (Keychain on macOS, Credential Manager on Windows, Secret Service on Linux).
//! Keys are held in `SecretValue`, which redacts itself in `Debug`/`Display`
//! and wipes its buffer on drop when the `secrets` feature is on.

#[cfg(feature = "secrets")]
use keyring::Entry;
#[cfg(feature = "secrets")]
use zeroize::Zeroize;

use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

/// Keychain service the key is filed under.
pub const SERVICE_NAME: &str = "cardsmith";

/// Account name of the persisted key.
pub const STORED_KEY_NAME: &str = "user_api_key";

pub type SecretsResult<T> = Result<T, SecretsError>;

/// Credential store failures.
#[derive(Debug, Clone, Error)]
pub enum SecretsError {
    /// Keychain entry could not be opened or read.
    #[error("Could not open the system keychain: {0}")]
    Keychain(String),

    /// Writing the key failed.
    #[error("Could not save the API key: {0}")]
    Write(String),

    /// Deleting the key failed.
    #[error("Could not remove the saved API key: {0}")]
    Remove(String),

    /// Built without the `secrets` feature.
    #[error("Keychain support is not compiled in (enable the 'secrets' feature)")]
    Unsupported,
}

/// An API key. Never printed.
#[cfg(feature = "secrets")]
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue {
    key: String,
}

#[cfg(not(feature = "secrets"))]
#[derive(Clone)]
pub struct SecretValue {
    key: String,
}

impl SecretValue {
    /// Wrap key text.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Raw key text, for the request header only.
    pub fn expose(&self) -> &str {
        &self.key
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl PartialEq for SecretValue {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for SecretValue {}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// A single slot holding the persisted API key.
///
/// Absence of a value means no credential is persisted.
pub trait CredentialStore: Send + Sync {
    /// Read the stored key, if any.
    fn load(&self) -> SecretsResult<Option<SecretValue>>;

    /// Overwrite the stored key.
    fn save(&self, secret: &SecretValue) -> SecretsResult<()>;

    /// Remove the stored key. Clearing an empty slot succeeds.
    fn clear(&self) -> SecretsResult<()>;
}

/// Keychain-backed slot.
#[derive(Debug)]
pub struct KeyringStore {
    service: String,
    account: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringStore {
    /// Store under the default `cardsmith` service.
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a different keychain service, e.g. from `[credentials] service`.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self { service: service.into(), account: STORED_KEY_NAME.to_string() }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    #[cfg(feature = "secrets")]
    fn entry(&self) -> SecretsResult<Entry> {
        Entry::new(&self.service, &self.account).map_err(|e| SecretsError::Keychain(e.to_string()))
    }
}

#[cfg(feature = "secrets")]
impl CredentialStore for KeyringStore {
    fn load(&self) -> SecretsResult<Option<SecretValue>> {
        match self.entry()?.get_password() {
            Ok(key) => Ok(Some(SecretValue::new(key))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SecretsError::Keychain(e.to_string())),
        }
    }

    fn save(&self, secret: &SecretValue) -> SecretsResult<()> {
        self.entry()?
            .set_password(secret.expose())
            .map_err(|e| SecretsError::Write(e.to_string()))
    }

    fn clear(&self) -> SecretsResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SecretsError::Remove(e.to_string())),
        }
    }
}

#[cfg(not(feature = "secrets"))]
impl CredentialStore for KeyringStore {
    fn load(&self) -> SecretsResult<Option<SecretValue>> {
        Ok(None)
    }

    fn save(&self, _secret: &SecretValue) -> SecretsResult<()> {
        Err(SecretsError::Unsupported)
    }

    fn clear(&self) -> SecretsResult<()> {
        Ok(())
    }
}

/// Process-local slot, used in tests and when the keychain is disabled.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<SecretValue>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a key.
    pub fn with_secret(secret: SecretValue) -> Self {
        Self { slot: Mutex::new(Some(secret)) }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> SecretsResult<Option<SecretValue>> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, secret: &SecretValue) -> SecretsResult<()> {
        *self.slot.lock() = Some(secret.clone());
        Ok(())
    }

    fn clear(&self) -> SecretsResult<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}
