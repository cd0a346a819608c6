//! Ambient credential sources.
//!
//! An ambient credential is one the host environment already provides, so the
//! user never types it. The session only needs to know whether one exists and
//! to ask the host to select one; resolving the actual value is left to the
//! gateway.

use async_trait::async_trait;

use super::SecretValue;

/// Environment variables checked by default, in priority order.
pub const DEFAULT_API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Host capability that can provide a credential without manual entry.
#[async_trait]
pub trait AmbientCredentialSource: Send + Sync {
    /// Whether a credential is currently available.
    async fn has_credential(&self) -> bool;

    /// Ask the host to select a credential. Returns whether one is now available.
    async fn select_credential(&self) -> bool;

    /// Source name for logs.
    fn name(&self) -> &str;
}

/// Reads the credential from environment variables.
#[derive(Debug, Clone)]
pub struct EnvCredentialSource {
    vars: Vec<String>,
}

impl Default for EnvCredentialSource {
    fn default() -> Self {
        Self::new(DEFAULT_API_KEY_VARS.iter().map(|v| (*v).to_string()).collect())
    }
}

impl EnvCredentialSource {
    pub fn new(vars: Vec<String>) -> Self {
        Self { vars }
    }

    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// First non-empty value among the configured variables.
    pub fn resolve(&self) -> Option<SecretValue> {
        self.vars.iter().find_map(|var| {
            std::env::var(var)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(SecretValue::new)
        })
    }
}

#[async_trait]
impl AmbientCredentialSource for EnvCredentialSource {
    async fn has_credential(&self) -> bool {
        self.resolve().is_some()
    }

    async fn select_credential(&self) -> bool {
        // Nothing to pick from; the environment either has a key or not.
        self.resolve().is_some()
    }

    fn name(&self) -> &str {
        "environment"
    }
}

/// Used when the host offers no ambient credential capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCredentialSource;

#[async_trait]
impl AmbientCredentialSource for NoopCredentialSource {
    async fn has_credential(&self) -> bool {
        false
    }

    async fn select_credential(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "none"
    }
}
