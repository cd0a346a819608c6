//! Guided card session.
//!
//! A `FormSession` walks through four ordered steps (holiday, style, message,
//! result), validating the spec at each forward transition. The last
//! transition is a generation call; once it succeeds the session hands over to
//! a `RefinementController` for edit/regenerate rounds.
//!
//! All operations take `&self`. State sits behind a mutex that is never held
//! across an await, so a host can share the session in an `Arc` and observe
//! `is_busy()` while a call is in flight.

mod error;
mod refine;

pub use error::{SessionError, ValidationError};
pub use refine::RefinementController;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::card::{Artifact, CardField, CardSpec, HolidayId, StyleMode};
use crate::credentials::{KeyStateMachine, SecretValue};
use crate::gateway::GenerationGateway;
use crate::prompt::{self, GenerationRequest};

/// Session steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Holiday,
    Style,
    Message,
    Result,
}

impl Step {
    /// 1-based step number.
    pub fn number(self) -> u8 {
        match self {
            Self::Holiday => 1,
            Self::Style => 2,
            Self::Message => 3,
            Self::Result => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Holiday => "holiday",
            Self::Style => "style",
            Self::Message => "message",
            Self::Result => "result",
        }
    }

    fn previous(self) -> Self {
        match self {
            Self::Holiday | Self::Style => Self::Holiday,
            Self::Message => Self::Style,
            Self::Result => Self::Message,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

/// Check the guard for leaving the holiday step.
pub fn validate_holiday(spec: &CardSpec) -> Result<(), ValidationError> {
    if spec.holiday == HolidayId::Custom && spec.custom_holiday_name.trim().is_empty() {
        return Err(ValidationError::MissingCustomHolidayName);
    }
    Ok(())
}

/// Check the guard for leaving the style step.
pub fn validate_style(spec: &CardSpec) -> Result<(), ValidationError> {
    if spec.style == StyleMode::Reference && !spec.has_reference_image() {
        return Err(ValidationError::MissingReferenceImage);
    }
    Ok(())
}

/// Check the preconditions for compiling a spec.
pub fn validate_for_generation(spec: &CardSpec) -> Result<(), ValidationError> {
    if spec.sender.trim().is_empty() {
        return Err(ValidationError::MissingSender);
    }
    validate_style(spec)
}

#[derive(Debug)]
struct SessionState {
    step: Step,
    spec: CardSpec,
    error: Option<SessionError>,
    busy: bool,
    refinement: Option<Arc<RefinementController>>,
}

impl SessionState {
    fn initial() -> Self {
        Self {
            step: Step::Holiday,
            spec: CardSpec::default(),
            error: None,
            busy: false,
            refinement: None,
        }
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        self.error = Some(err.clone());
        err
    }
}

/// Step-wise card session.
pub struct FormSession {
    gateway: Arc<dyn GenerationGateway>,
    keys: Arc<KeyStateMachine>,
    state: Mutex<SessionState>,
}

impl FormSession {
    /// Start a session at step 1 with a default spec.
    pub fn start(gateway: Arc<dyn GenerationGateway>, keys: Arc<KeyStateMachine>) -> Self {
        tracing::debug!(gateway = gateway.name(), "Session started");
        Self { gateway, keys, state: Mutex::new(SessionState::initial()) }
    }

    pub fn step(&self) -> Step {
        self.state.lock().step
    }

    /// Copy of the current spec.
    pub fn spec(&self) -> CardSpec {
        self.state.lock().spec.clone()
    }

    /// Error attached by the last failed transition, if any.
    pub fn last_error(&self) -> Option<SessionError> {
        self.state.lock().error.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    pub fn keys(&self) -> &Arc<KeyStateMachine> {
        &self.keys
    }

    /// Refinement controller, available once a card has been generated.
    pub fn refinement(&self) -> Option<Arc<RefinementController>> {
        self.state.lock().refinement.clone()
    }

    /// Latest generated card.
    pub fn artifact(&self) -> Option<Artifact> {
        self.refinement().map(|controller| controller.latest())
    }

    /// Replace one field of the spec.
    ///
    /// Only allowed on steps 1-3; on the result step edits go through the
    /// refinement controller's working copy.
    pub fn set_field(&self, field: CardField) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.busy {
            return Err(SessionError::Busy);
        }
        if state.step == Step::Result {
            return Err(SessionError::InvalidTransition { step: state.step, action: "edit fields" });
        }

        tracing::debug!(field = %field.path(), step = %state.step, "Field updated");
        state.spec = state.spec.with_field(field);
        Ok(())
    }

    /// Parse and apply a textual `path`/`value` assignment.
    pub fn set_path(&self, path: &str, value: &str) -> Result<(), SessionError> {
        let field = CardField::parse(path, value).map_err(ValidationError::from)?;
        self.set_field(field)
    }

    /// Move to the next step if its guard passes.
    ///
    /// The message step is left only through [`finalize`](Self::finalize).
    pub fn advance(&self) -> Result<Step, SessionError> {
        let mut state = self.state.lock();
        if state.busy {
            return Err(SessionError::Busy);
        }

        let next = match state.step {
            Step::Holiday => {
                validate_holiday(&state.spec).map_err(|e| state.fail(e.into()))?;
                Step::Style
            }
            Step::Style => {
                validate_style(&state.spec).map_err(|e| state.fail(e.into()))?;
                Step::Message
            }
            step @ (Step::Message | Step::Result) => {
                return Err(SessionError::InvalidTransition { step, action: "advance" });
            }
        };

        tracing::info!(from = %state.step, to = %next, "Advanced");
        state.step = next;
        state.error = None;
        Ok(next)
    }

    /// Go back one step (never below step 1), clearing any transient error.
    pub fn back(&self) -> Result<Step, SessionError> {
        let mut state = self.state.lock();
        if state.busy {
            return Err(SessionError::Busy);
        }
        if state.step == Step::Result {
            return Err(SessionError::InvalidTransition { step: state.step, action: "go back" });
        }

        state.step = state.step.previous();
        state.error = None;
        tracing::debug!(step = %state.step, "Went back");
        Ok(state.step)
    }

    /// Generate the card and enter the result step.
    ///
    /// On failure the session stays on the message step with the error
    /// attached and the spec unchanged.
    pub async fn finalize(&self) -> Result<Artifact, SessionError> {
        let (request, snapshot, credential) = {
            let mut state = self.state.lock();
            if state.busy {
                return Err(SessionError::Busy);
            }
            if state.step != Step::Message {
                return Err(SessionError::InvalidTransition { step: state.step, action: "finalize" });
            }

            validate_for_generation(&state.spec).map_err(|e| state.fail(e.into()))?;
            let credential =
                self.keys.credential_for_generation().map_err(|e| state.fail(e.into()))?;

            state.busy = true;
            state.error = None;
            let snapshot = state.spec.clone();
            (prompt::compile(&snapshot, None), snapshot, credential)
        };

        tracing::info!(mode = %request.mode, holiday = %snapshot.holiday, "Generating card");
        let result = generate_artifact(
            self.gateway.as_ref(),
            &self.keys,
            &request,
            credential.as_ref(),
            snapshot,
        )
        .await;

        let mut state = self.state.lock();
        state.busy = false;
        match result {
            Ok(artifact) => {
                tracing::info!(artifact = %artifact.id, bytes = artifact.bytes.len(), "Card generated");
                state.refinement = Some(Arc::new(RefinementController::new(
                    Arc::clone(&self.gateway),
                    Arc::clone(&self.keys),
                    artifact.clone(),
                )));
                state.step = Step::Result;
                Ok(artifact)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Card generation failed");
                Err(state.fail(err))
            }
        }
    }

    /// Regenerate the current card from an edited spec.
    pub async fn refine(&self, edited: CardSpec) -> Result<Artifact, SessionError> {
        let controller = self.refinement().ok_or(SessionError::NotFinalized)?;
        controller.refine(edited).await
    }

    /// Return to step 1 with a default spec, discarding the current card.
    pub fn reset(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        let refining = state.refinement.as_ref().is_some_and(|r| r.is_busy());
        if state.busy || refining {
            return Err(SessionError::Busy);
        }

        *state = SessionState::initial();
        tracing::info!("Session reset");
        Ok(())
    }
}

impl fmt::Debug for FormSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FormSession")
            .field("step", &state.step)
            .field("busy", &state.busy)
            .field("gateway", &self.gateway.name())
            .finish()
    }
}

/// Run one gateway call and wrap the result.
///
/// Authorization failures are reported to the key state machine.
async fn generate_artifact(
    gateway: &dyn GenerationGateway,
    keys: &KeyStateMachine,
    request: &GenerationRequest,
    credential: Option<&SecretValue>,
    snapshot: CardSpec,
) -> Result<Artifact, SessionError> {
    match gateway.generate(request, credential).await {
        Ok(image) => Ok(Artifact::from_generated(image, snapshot)),
        Err(err) => {
            let err = SessionError::from_gateway(err);
            if matches!(err, SessionError::Authorization(_)) {
                keys.on_authorization_failure();
            }
            Err(err)
        }
    }
}
