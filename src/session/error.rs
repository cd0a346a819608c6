//! Session error types.

use thiserror::Error;

use super::Step;
use crate::card::FieldParseError;
use crate::credentials::CredentialError;
use crate::gateway::GatewayError;

/// Local validation failures. These block a transition before any gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Custom holiday selected with a blank name.
    #[error("Please specify the occasion for the custom card.")]
    MissingCustomHolidayName,

    /// Reference style selected without an image.
    #[error("Please upload a reference image or switch to the AI theme style.")]
    MissingReferenceImage,

    /// Sender is blank.
    #[error("Please enter a sender name.")]
    MissingSender,

    /// Textual assignment to a field that does not exist.
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// Textual assignment with a value the field cannot take.
    #[error("Invalid value '{value}' for {path}: {reason}")]
    InvalidValue { path: String, value: String, reason: String },
}

impl From<FieldParseError> for ValidationError {
    fn from(err: FieldParseError) -> Self {
        match err {
            FieldParseError::UnknownField(path) => Self::UnknownField(path),
            FieldParseError::InvalidValue { path, value, reason } => {
                Self::InvalidValue { path, value, reason }
            }
            FieldParseError::MissingValue(assignment) => Self::InvalidValue {
                path: assignment,
                value: String::new(),
                reason: "expected path=value".to_string(),
            },
        }
    }
}

/// Errors surfaced by `FormSession` and `RefinementController`.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Local check failed; the gateway was not called.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No usable credential.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Permission or billing denial from the gateway.
    #[error("Access Denied: The API Key does not have permission. Please check your billing or API settings. ({0})")]
    Authorization(String),

    /// Any other gateway failure.
    #[error("{0}")]
    Generation(String),

    /// A generation call is already in flight.
    #[error("A generation request is already in progress")]
    Busy,

    /// Operation not allowed on the current step.
    #[error("Cannot {action} from step {step}")]
    InvalidTransition { step: Step, action: &'static str },

    /// Refinement requested before the first card exists.
    #[error("No card has been generated yet")]
    NotFinalized,
}

impl SessionError {
    /// Reclassify a gateway failure into the session taxonomy.
    pub fn from_gateway(err: GatewayError) -> Self {
        match err {
            GatewayError::Authorization(message) => Self::Authorization(message),
            GatewayError::MissingCredential => Self::Credential(CredentialError::Missing),
            other => Self::Generation(other.to_string()),
        }
    }

    /// Whether the host should reopen credential setup.
    pub fn needs_credential_setup(&self) -> bool {
        matches!(self, Self::Credential(_) | Self::Authorization(_))
    }
}
