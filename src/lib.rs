#![allow(clippy::format_push_string)]
#![allow(clippy::needless_pass_by_value)]

//! # Cardsmith
//!
//! Guided greeting card builder backed by an image-generation model.
//!
//! A card is described by a [`CardSpec`] collected over a short guided
//! session, compiled into a prompt by [`prompt::compile`], and sent to a
//! [`GenerationGateway`]. The generated card can then be refined in rounds
//! that feed the previous image back to the model.
//!
//! ## Features
//!
//! - **Guided Session**: Holiday, style and message steps with validation
//! - **Deterministic Prompts**: Same spec, same request, every time
//! - **Refinement Loop**: Edit and regenerate without losing the last good card
//! - **Key Management**: Verified manual keys, OS keychain persistence, or an ambient key
//!
//! ## Quick Start
//!
//! ```bash
//! # Verify and save an API key
//! cardsmith key test AIza... --persist
//!
//! # Create a card
//! cardsmith create --holiday christmas --sender "Mina" --recipient "Grandma"
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::significant_drop_in_scrutinee)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::use_self)]

pub mod card;
pub mod core;
pub mod credentials;
pub mod gateway;
pub mod prompt;
pub mod session;

// Re-export commonly used types
pub use card::{Artifact, CardField, CardSpec, GeneratedImage, HolidayId, StyleMode, TextField};
pub use crate::core::Config;
pub use credentials::{
    AmbientCredentialSource, CredentialError, CredentialStore, EnvCredentialSource, KeyState,
    KeyStateMachine, KeyringStore, ManualStatus, MemoryStore, NoopCredentialSource, SecretValue,
};
#[cfg(feature = "gemini")]
pub use gateway::GeminiGateway;
pub use gateway::{GatewayError, GenerationGateway};
pub use prompt::{compile, GenerationRequest, PromptSegment, RequestMode};
pub use session::{FormSession, RefinementController, SessionError, Step, ValidationError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "cardsmith";
