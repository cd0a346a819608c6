//! API key handling.
//!
//! The generation service needs a credential. It can come from a manually
//! entered key (verified with a test call, optionally persisted in the OS
//! keychain) or from the ambient environment.

mod ambient;
mod secrets;
mod state;

pub use ambient::{
    AmbientCredentialSource, EnvCredentialSource, NoopCredentialSource, DEFAULT_API_KEY_VARS,
};
pub use secrets::{
    CredentialStore, KeyringStore, MemoryStore, SecretValue, SecretsError, SecretsResult,
    SERVICE_NAME, STORED_KEY_NAME,
};
pub use state::{CredentialError, KeyState, KeyStateMachine, ManualStatus};
