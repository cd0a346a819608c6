//! Credential readiness state machine.
//!
//! Tracks where the API key for generation comes from and whether it has been
//! verified. Only a verified manual key or a detected ambient credential count
//! as ready.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::{AmbientCredentialSource, CredentialStore, SecretValue, SecretsError};
use crate::gateway::GenerationGateway;

/// Verification status of a manually entered key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManualStatus {
    /// Entered or edited, not tested yet.
    Idle,
    /// Connection test in flight.
    Testing,
    /// Accepted by the gateway.
    Verified,
    /// Rejected by the gateway, or denied during generation.
    Failed,
}

/// Where the generation credential currently comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    /// No key anywhere; setup is needed.
    Unset,
    /// The ambient source has a key the gateway resolves itself.
    AmbientDetected,
    /// A manually entered key.
    Manual(ManualStatus),
}

impl KeyState {
    /// Whether generation may proceed in this state.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::AmbientDetected | Self::Manual(ManualStatus::Verified))
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "not configured"),
            Self::AmbientDetected => write!(f, "using ambient credential"),
            Self::Manual(ManualStatus::Idle) => write!(f, "manual key (not tested)"),
            Self::Manual(ManualStatus::Testing) => write!(f, "manual key (testing)"),
            Self::Manual(ManualStatus::Verified) => write!(f, "manual key (verified)"),
            Self::Manual(ManualStatus::Failed) => write!(f, "manual key (failed)"),
        }
    }
}

/// Credential errors.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// No ready credential at generation time.
    #[error("No API key available. Configure one with `cardsmith key test <KEY>` or set GEMINI_API_KEY")]
    Missing,

    /// A test was requested with no manual key.
    #[error("No manual API key entered")]
    NoManualKey,

    /// A test is already in flight.
    #[error("A connection test is already running")]
    TestInProgress,

    /// The key was already verified; edit it to test again.
    #[error("The API key is already verified")]
    AlreadyVerified,

    /// The ambient source could not supply a key.
    #[error("Ambient credential unavailable from {0}")]
    AmbientUnavailable(String),

    /// The credential store failed.
    #[error(transparent)]
    Store(#[from] SecretsError),
}

#[derive(Debug)]
struct KeyInner {
    state: KeyState,
    manual_key: Option<SecretValue>,
    persist: bool,
    ambient_detected: bool,
    setup_requested: bool,
}

/// Tracks credential availability and verification.
pub struct KeyStateMachine {
    store: Arc<dyn CredentialStore>,
    ambient: Arc<dyn AmbientCredentialSource>,
    inner: Mutex<KeyInner>,
}

impl KeyStateMachine {
    /// Create an unset machine. Call [`initialize`](Self::initialize) to
    /// restore persisted or ambient credentials.
    pub fn new(store: Arc<dyn CredentialStore>, ambient: Arc<dyn AmbientCredentialSource>) -> Self {
        Self {
            store,
            ambient,
            inner: Mutex::new(KeyInner {
                state: KeyState::Unset,
                manual_key: None,
                persist: false,
                ambient_detected: false,
                setup_requested: false,
            }),
        }
    }

    /// Resolve the starting state: persisted key, then ambient source, then unset.
    ///
    /// Keys are only ever persisted after verification, so a restored key
    /// starts out verified.
    pub async fn initialize(&self) -> KeyState {
        let persisted = match self.store.load() {
            Ok(key) => key.filter(|k| !k.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read persisted API key");
                None
            }
        };

        let ambient_detected = self.ambient.has_credential().await;

        let mut inner = self.inner.lock();
        inner.ambient_detected = ambient_detected;
        if let Some(key) = persisted {
            inner.manual_key = Some(key);
            inner.persist = true;
            inner.state = KeyState::Manual(ManualStatus::Verified);
        } else if ambient_detected {
            inner.state = KeyState::AmbientDetected;
        } else {
            inner.state = KeyState::Unset;
            inner.setup_requested = true;
        }

        tracing::info!(state = %inner.state, ambient = self.ambient.name(), "Credential state initialized");
        inner.state
    }

    pub fn state(&self) -> KeyState {
        self.inner.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn persist_enabled(&self) -> bool {
        self.inner.lock().persist
    }

    pub fn has_manual_key(&self) -> bool {
        self.inner.lock().manual_key.is_some()
    }

    /// Whether the host should show credential setup.
    pub fn setup_requested(&self) -> bool {
        self.inner.lock().setup_requested
    }

    pub fn dismiss_setup(&self) {
        self.inner.lock().setup_requested = false;
    }

    /// Replace the manual key text. Any verification is discarded.
    pub fn set_manual_key(&self, text: &str) {
        let text = text.trim();
        let mut inner = self.inner.lock();
        if text.is_empty() {
            inner.manual_key = None;
            inner.state =
                if inner.ambient_detected { KeyState::AmbientDetected } else { KeyState::Unset };
        } else {
            inner.manual_key = Some(SecretValue::new(text));
            inner.state = KeyState::Manual(ManualStatus::Idle);
        }
        tracing::debug!(state = %inner.state, "Manual API key edited");
    }

    /// Move from `idle` or `failed` to `testing` and hand out the key to check.
    pub fn begin_test(&self) -> Result<SecretValue, CredentialError> {
        let mut inner = self.inner.lock();
        let key = inner.manual_key.clone().ok_or(CredentialError::NoManualKey)?;
        match inner.state {
            KeyState::Manual(ManualStatus::Testing) => return Err(CredentialError::TestInProgress),
            KeyState::Manual(ManualStatus::Verified) => {
                return Err(CredentialError::AlreadyVerified)
            }
            _ => {}
        }
        inner.state = KeyState::Manual(ManualStatus::Testing);
        Ok(key)
    }

    /// Record the connection test result for `tested`.
    ///
    /// Ignored when the key was edited while the test ran. A verified key is
    /// persisted when persistence is enabled.
    pub fn finish_test(&self, tested: &SecretValue, valid: bool) -> KeyState {
        let mut inner = self.inner.lock();
        let still_current = inner.manual_key.as_ref() == Some(tested)
            && inner.state == KeyState::Manual(ManualStatus::Testing);
        if !still_current {
            tracing::debug!("Discarding stale connection test result");
            return inner.state;
        }

        if valid {
            inner.state = KeyState::Manual(ManualStatus::Verified);
            inner.setup_requested = false;
            if inner.persist {
                if let Err(e) = self.store.save(tested) {
                    tracing::warn!(error = %e, "Could not persist verified API key");
                }
            }
        } else {
            inner.state = KeyState::Manual(ManualStatus::Failed);
        }

        tracing::info!(state = %inner.state, "Connection test finished");
        inner.state
    }

    /// Test the manual key against the gateway.
    pub async fn test(&self, gateway: &dyn GenerationGateway) -> Result<KeyState, CredentialError> {
        let key = self.begin_test()?;
        tracing::debug!(gateway = gateway.name(), "Testing manual API key");
        let valid = gateway.validate_credential(&key).await;
        Ok(self.finish_test(&key, valid))
    }

    /// Toggle persistence of the manual key.
    ///
    /// Disabling clears the stored copy immediately, whatever the state. The
    /// flag only changes once the store call succeeds.
    pub fn set_persist(&self, enabled: bool) -> Result<(), CredentialError> {
        let mut inner = self.inner.lock();
        if enabled {
            if let (KeyState::Manual(ManualStatus::Verified), Some(key)) =
                (inner.state, inner.manual_key.as_ref())
            {
                self.store.save(key)?;
                tracing::info!("Verified API key persisted");
            }
        } else {
            self.store.clear()?;
            tracing::info!("Persisted API key cleared");
        }
        inner.persist = enabled;
        Ok(())
    }

    /// Switch to the ambient credential, dropping any manual key.
    pub async fn select_ambient(&self) -> Result<KeyState, CredentialError> {
        if !self.ambient.select_credential().await {
            return Err(CredentialError::AmbientUnavailable(self.ambient.name().to_string()));
        }

        let mut inner = self.inner.lock();
        inner.manual_key = None;
        inner.ambient_detected = true;
        inner.state = KeyState::AmbientDetected;
        inner.setup_requested = false;
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Could not clear persisted API key");
        }
        tracing::info!(source = self.ambient.name(), "Ambient credential selected");
        Ok(inner.state)
    }

    /// React to a permission or billing denial from the gateway.
    ///
    /// A manual key is kept for editing and marked failed; an ambient state is
    /// left as is. Either way setup is requested.
    pub fn on_authorization_failure(&self) {
        let mut inner = self.inner.lock();
        if inner.manual_key.is_some() {
            inner.state = KeyState::Manual(ManualStatus::Failed);
        }
        inner.setup_requested = true;
        tracing::warn!(state = %inner.state, "Gateway denied authorization");
    }

    /// Credential to pass to the gateway.
    ///
    /// `Some` for a verified manual key, `None` when the gateway should use the
    /// ambient credential.
    pub fn credential_for_generation(&self) -> Result<Option<SecretValue>, CredentialError> {
        let mut inner = self.inner.lock();
        match inner.state {
            KeyState::Manual(ManualStatus::Verified) => {
                inner.manual_key.clone().map(Some).ok_or(CredentialError::Missing)
            }
            KeyState::AmbientDetected => Ok(None),
            _ => {
                inner.setup_requested = true;
                Err(CredentialError::Missing)
            }
        }
    }
}

impl fmt::Debug for KeyStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("KeyStateMachine")
            .field("state", &inner.state)
            .field("persist", &inner.persist)
            .field("ambient", &self.ambient.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::GeneratedImage;
    use crate::credentials::{MemoryStore, NoopCredentialSource, SecretsError, SecretsResult};
    use crate::gateway::GatewayError;
    use crate::prompt::GenerationRequest;
    use async_trait::async_trait;

    struct KeyCheckGateway {
        accept: &'static str,
    }

    #[async_trait]
    impl GenerationGateway for KeyCheckGateway {
        fn name(&self) -> &str {
            "key-check"
        }

        async fn validate_credential(&self, credential: &SecretValue) -> bool {
            credential.expose() == self.accept
        }

        async fn generate(
            &self,
            _request: &GenerationRequest,
            _credential: Option<&SecretValue>,
        ) -> Result<GeneratedImage, GatewayError> {
            Err(GatewayError::NoArtifact)
        }
    }

    struct AlwaysAmbient;

    #[async_trait]
    impl AmbientCredentialSource for AlwaysAmbient {
        async fn has_credential(&self) -> bool {
            true
        }

        async fn select_credential(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "test-host"
        }
    }

    /// Keychain that holds a key but refuses every write.
    struct LockedStore;

    impl CredentialStore for LockedStore {
        fn load(&self) -> SecretsResult<Option<SecretValue>> {
            Ok(Some(SecretValue::new("saved")))
        }

        fn save(&self, _secret: &SecretValue) -> SecretsResult<()> {
            Err(SecretsError::Write("keychain locked".to_string()))
        }

        fn clear(&self) -> SecretsResult<()> {
            Err(SecretsError::Remove("keychain locked".to_string()))
        }
    }

    fn machine(store: Arc<MemoryStore>) -> KeyStateMachine {
        KeyStateMachine::new(store, Arc::new(NoopCredentialSource))
    }

    #[tokio::test]
    async fn test_initialize_unset_requests_setup() {
        let keys = machine(Arc::new(MemoryStore::new()));
        assert_eq!(keys.initialize().await, KeyState::Unset);
        assert!(keys.setup_requested());
        assert!(!keys.is_ready());
    }

    #[tokio::test]
    async fn test_initialize_prefers_persisted_over_ambient() {
        let store = Arc::new(MemoryStore::with_secret(SecretValue::new("saved")));
        let keys = KeyStateMachine::new(store, Arc::new(AlwaysAmbient));
        assert_eq!(keys.initialize().await, KeyState::Manual(ManualStatus::Verified));
        assert!(keys.persist_enabled());
        assert_eq!(keys.credential_for_generation().unwrap().unwrap().expose(), "saved");
    }

    #[tokio::test]
    async fn test_initialize_detects_ambient() {
        let keys = KeyStateMachine::new(Arc::new(MemoryStore::new()), Arc::new(AlwaysAmbient));
        assert_eq!(keys.initialize().await, KeyState::AmbientDetected);
        assert!(keys.is_ready());
        assert!(keys.credential_for_generation().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manual_key_test_cycle() {
        let keys = machine(Arc::new(MemoryStore::new()));
        let gateway = KeyCheckGateway { accept: "good" };

        keys.set_manual_key("bad");
        assert_eq!(keys.state(), KeyState::Manual(ManualStatus::Idle));
        assert_eq!(keys.test(&gateway).await.unwrap(), KeyState::Manual(ManualStatus::Failed));
        assert!(!keys.is_ready());

        keys.set_manual_key("good");
        assert_eq!(keys.state(), KeyState::Manual(ManualStatus::Idle));
        assert_eq!(keys.test(&gateway).await.unwrap(), KeyState::Manual(ManualStatus::Verified));
        assert!(keys.is_ready());
    }

    #[test]
    fn test_testing_state_is_not_ready_and_not_reentrant() {
        let keys = machine(Arc::new(MemoryStore::new()));
        keys.set_manual_key("key");
        let tested = keys.begin_test().unwrap();
        assert_eq!(keys.state(), KeyState::Manual(ManualStatus::Testing));
        assert!(!keys.is_ready());
        assert!(matches!(keys.begin_test(), Err(CredentialError::TestInProgress)));
        assert!(matches!(keys.credential_for_generation(), Err(CredentialError::Missing)));

        keys.finish_test(&tested, true);
        assert!(keys.is_ready());
    }

    #[test]
    fn test_editing_during_test_discards_result() {
        let keys = machine(Arc::new(MemoryStore::new()));
        keys.set_manual_key("first");
        let tested = keys.begin_test().unwrap();
        keys.set_manual_key("second");
        assert_eq!(keys.finish_test(&tested, true), KeyState::Manual(ManualStatus::Idle));
    }

    #[tokio::test]
    async fn test_verified_key_is_not_retested() {
        let keys = machine(Arc::new(MemoryStore::new()));
        let gateway = KeyCheckGateway { accept: "good" };
        keys.set_manual_key("good");
        keys.test(&gateway).await.unwrap();

        assert!(matches!(keys.test(&gateway).await, Err(CredentialError::AlreadyVerified)));
        assert_eq!(keys.state(), KeyState::Manual(ManualStatus::Verified));
        assert!(keys.is_ready());

        keys.set_manual_key("good");
        assert!(keys.begin_test().is_ok());
    }

    #[tokio::test]
    async fn test_failed_key_can_be_retested() {
        let keys = machine(Arc::new(MemoryStore::new()));
        keys.set_manual_key("flaky");
        keys.test(&KeyCheckGateway { accept: "good" }).await.unwrap();
        assert_eq!(
            keys.test(&KeyCheckGateway { accept: "flaky" }).await.unwrap(),
            KeyState::Manual(ManualStatus::Verified)
        );
    }

    #[tokio::test]
    async fn test_persist_flag_unchanged_when_store_fails() {
        let keys = KeyStateMachine::new(Arc::new(LockedStore), Arc::new(NoopCredentialSource));
        keys.initialize().await;
        assert!(keys.persist_enabled());

        assert!(matches!(keys.set_persist(false), Err(CredentialError::Store(_))));
        assert!(keys.persist_enabled());

        let keys = KeyStateMachine::new(Arc::new(LockedStore), Arc::new(NoopCredentialSource));
        keys.set_manual_key("good");
        keys.test(&KeyCheckGateway { accept: "good" }).await.unwrap();
        assert!(matches!(keys.set_persist(true), Err(CredentialError::Store(_))));
        assert!(!keys.persist_enabled());
    }

    #[test]
    fn test_begin_test_without_key() {
        let keys = machine(Arc::new(MemoryStore::new()));
        assert!(matches!(keys.begin_test(), Err(CredentialError::NoManualKey)));
    }

    #[tokio::test]
    async fn test_persist_stores_only_verified_key() {
        let store = Arc::new(MemoryStore::new());
        let keys = machine(store.clone());
        let gateway = KeyCheckGateway { accept: "good" };

        keys.set_manual_key("good");
        keys.set_persist(true).unwrap();
        assert!(store.is_empty(), "unverified key must not be stored");

        keys.test(&gateway).await.unwrap();
        assert_eq!(store.load().unwrap().unwrap().expose(), "good");
    }

    #[tokio::test]
    async fn test_enabling_persist_after_verification_stores_key() {
        let store = Arc::new(MemoryStore::new());
        let keys = machine(store.clone());
        keys.set_manual_key("good");
        keys.test(&KeyCheckGateway { accept: "good" }).await.unwrap();
        assert!(store.is_empty());

        keys.set_persist(true).unwrap();
        assert!(!store.is_empty());
    }

    #[tokio::test]
    async fn test_disabling_persist_clears_store() {
        let store = Arc::new(MemoryStore::new());
        let keys = machine(store.clone());
        keys.set_manual_key("good");
        keys.set_persist(true).unwrap();
        keys.test(&KeyCheckGateway { accept: "good" }).await.unwrap();
        assert!(!store.is_empty());

        keys.set_persist(false).unwrap();
        assert!(store.load().unwrap().is_none());
        // Verification itself is untouched
        assert!(keys.is_ready());
    }

    #[tokio::test]
    async fn test_select_ambient_clears_manual_key() {
        let store = Arc::new(MemoryStore::with_secret(SecretValue::new("saved")));
        let keys = KeyStateMachine::new(store.clone(), Arc::new(AlwaysAmbient));
        keys.initialize().await;

        assert_eq!(keys.select_ambient().await.unwrap(), KeyState::AmbientDetected);
        assert!(!keys.has_manual_key());
        assert!(store.is_empty());
        assert!(keys.is_ready());
    }

    #[tokio::test]
    async fn test_select_ambient_unavailable() {
        let keys = machine(Arc::new(MemoryStore::new()));
        assert!(matches!(
            keys.select_ambient().await,
            Err(CredentialError::AmbientUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_clearing_manual_key_falls_back_to_ambient() {
        let keys = KeyStateMachine::new(Arc::new(MemoryStore::new()), Arc::new(AlwaysAmbient));
        keys.initialize().await;
        keys.set_manual_key("typed");
        assert!(!keys.is_ready());
        keys.set_manual_key("");
        assert_eq!(keys.state(), KeyState::AmbientDetected);
    }

    #[tokio::test]
    async fn test_authorization_failure_keeps_manual_key() {
        let keys = machine(Arc::new(MemoryStore::new()));
        keys.set_manual_key("good");
        keys.test(&KeyCheckGateway { accept: "good" }).await.unwrap();
        keys.dismiss_setup();

        keys.on_authorization_failure();
        assert_eq!(keys.state(), KeyState::Manual(ManualStatus::Failed));
        assert!(keys.has_manual_key());
        assert!(keys.setup_requested());
    }

    #[tokio::test]
    async fn test_authorization_failure_keeps_ambient_ready() {
        let keys = KeyStateMachine::new(Arc::new(MemoryStore::new()), Arc::new(AlwaysAmbient));
        keys.initialize().await;
        keys.on_authorization_failure();
        assert_eq!(keys.state(), KeyState::AmbientDetected);
        assert!(keys.setup_requested());
    }
}
