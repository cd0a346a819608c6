//! Image generation gateway.
//!
//! The gateway is the boundary to the external image model. The core hands it
//! a compiled `GenerationRequest` and gets back raw image bytes or a classified
//! failure.

#[cfg(feature = "gemini")]
mod gemini;

#[cfg(feature = "gemini")]
pub use gemini::GeminiGateway;

use async_trait::async_trait;

use crate::card::GeneratedImage;
use crate::credentials::SecretValue;
use crate::prompt::GenerationRequest;

/// Trait for image generation services.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Gateway name for logs.
    fn name(&self) -> &str;

    /// Check whether a credential is accepted. Must not have side effects.
    async fn validate_credential(&self, credential: &SecretValue) -> bool;

    /// Run a generation request.
    ///
    /// With `credential` set to `None` the gateway resolves an ambient
    /// credential itself.
    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: Option<&SecretValue>,
    ) -> Result<GeneratedImage, GatewayError>;
}

/// Gateway error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Request never completed (DNS, TLS, timeout, connection reset).
    #[error("Network error: {0}")]
    Transport(String),

    /// Key rejected, lacking permission, or billing disabled.
    #[error("Access denied: {0}")]
    Authorization(String),

    /// Call succeeded but the response carried no image.
    #[error("No image generated.")]
    NoArtifact,

    /// No credential passed and none found in the environment.
    #[error("No API key available to the gateway")]
    MissingCredential,

    /// Any other non-success HTTP status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, trimmed
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Classify a non-success HTTP response.
    ///
    /// 401/403 and permission denials are authorization failures; everything
    /// else is a generic API error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let lowered = body.to_ascii_lowercase();
        if status == 401
            || status == 403
            || body.contains("PERMISSION_DENIED")
            || lowered.contains("permission")
        {
            Self::Authorization(format!("HTTP {status}: {}", body.trim()))
        } else {
            Self::Api { status, message: body.trim().to_string() }
        }
    }

    /// Whether the host should reopen credential setup.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }
}
