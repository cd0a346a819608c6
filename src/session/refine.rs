//! Post-generation edit loop.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{generate_artifact, validate_for_generation, SessionError};
use crate::card::{Artifact, CardField, CardSpec};
use crate::credentials::KeyStateMachine;
use crate::gateway::GenerationGateway;
use crate::prompt;

#[derive(Debug)]
struct RefineState {
    latest: Artifact,
    /// Spec that produced `latest`
    baseline: CardSpec,
    /// User edits not yet applied
    working: CardSpec,
    busy: bool,
    error: Option<SessionError>,
    rounds: usize,
}

/// Repeated edit/regenerate cycles on a generated card.
///
/// The working copy is independent of the session's finalized spec. A failed
/// round keeps both the previous card and the edited spec so it can be
/// retried.
pub struct RefinementController {
    gateway: Arc<dyn GenerationGateway>,
    keys: Arc<KeyStateMachine>,
    state: Mutex<RefineState>,
}

impl RefinementController {
    pub fn new(
        gateway: Arc<dyn GenerationGateway>,
        keys: Arc<KeyStateMachine>,
        artifact: Artifact,
    ) -> Self {
        let spec = artifact.spec.clone();
        Self {
            gateway,
            keys,
            state: Mutex::new(RefineState {
                latest: artifact,
                baseline: spec.clone(),
                working: spec,
                busy: false,
                error: None,
                rounds: 0,
            }),
        }
    }

    /// Most recent successfully generated card.
    pub fn latest(&self) -> Artifact {
        self.state.lock().latest.clone()
    }

    pub fn working_spec(&self) -> CardSpec {
        self.state.lock().working.clone()
    }

    pub fn baseline_spec(&self) -> CardSpec {
        self.state.lock().baseline.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.state.lock().error.clone()
    }

    /// Number of successful refinement rounds.
    pub fn rounds(&self) -> usize {
        self.state.lock().rounds
    }

    /// Edit one field of the working copy.
    pub fn set_field(&self, field: CardField) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.busy {
            return Err(SessionError::Busy);
        }
        state.working = state.working.with_field(field);
        Ok(())
    }

    /// Regenerate with the current working copy.
    pub async fn refine_working(&self) -> Result<Artifact, SessionError> {
        let edited = self.working_spec();
        self.refine(edited).await
    }

    /// Regenerate the latest card from `edited`.
    ///
    /// Rejected while another round is in flight. On success `edited` becomes
    /// the new baseline; on failure the latest card is unchanged.
    pub async fn refine(&self, edited: CardSpec) -> Result<Artifact, SessionError> {
        let (request, credential) = {
            let mut state = self.state.lock();
            if state.busy {
                tracing::debug!("Refinement rejected, already busy");
                return Err(SessionError::Busy);
            }

            state.working = edited.clone();
            validate_for_generation(&edited).map_err(|e| {
                let err = SessionError::from(e);
                state.error = Some(err.clone());
                err
            })?;
            let credential = self.keys.credential_for_generation().map_err(|e| {
                let err = SessionError::from(e);
                state.error = Some(err.clone());
                err
            })?;

            state.busy = true;
            state.error = None;
            (prompt::compile(&edited, Some(&state.latest)), credential)
        };

        tracing::info!(
            prior = %request.prior_artifact.map(|id| id.to_string()).unwrap_or_default(),
            instruction = !edited.refinement_instruction.trim().is_empty(),
            "Refining card"
        );
        let result = generate_artifact(
            self.gateway.as_ref(),
            &self.keys,
            &request,
            credential.as_ref(),
            edited.clone(),
        )
        .await;

        let mut state = self.state.lock();
        state.busy = false;
        match result {
            Ok(artifact) => {
                state.latest = artifact.clone();
                state.baseline = edited;
                state.rounds += 1;
                tracing::info!(artifact = %artifact.id, round = state.rounds, "Card refined");
                Ok(artifact)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Refinement failed, keeping previous card");
                state.error = Some(err.clone());
                Err(err)
            }
        }
    }
}

impl fmt::Debug for RefinementController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RefinementController")
            .field("latest", &state.latest.id)
            .field("busy", &state.busy)
            .field("rounds", &state.rounds)
            .finish()
    }
}
