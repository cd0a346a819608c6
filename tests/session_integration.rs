//! Session Integration Tests
//!
//! Drives `FormSession` and `RefinementController` end-to-end against a
//! scripted gateway.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use cardsmith::card::{ReferenceImage, TextField};
use cardsmith::{
    CardField, FormSession, GatewayError, GeneratedImage, GenerationGateway, GenerationRequest,
    HolidayId, KeyState, KeyStateMachine, ManualStatus, MemoryStore, NoopCredentialSource,
    RequestMode, SecretValue, SessionError, Step, StyleMode, ValidationError,
};

/// Gateway that replays scripted results and records every request.
#[derive(Default)]
struct ScriptedGateway {
    results: Mutex<VecDeque<Result<GeneratedImage, GatewayError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
    gated: AtomicBool,
    gate: Notify,
}

impl ScriptedGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, result: Result<GeneratedImage, GatewayError>) {
        self.results.lock().push_back(result);
    }

    fn push_image(&self, tag: u8) {
        self.push(Ok(GeneratedImage::new("image/png", vec![0x89, b'P', b'N', b'G', tag])));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().last().cloned()
    }

    /// Hold subsequent calls until `release` is called.
    fn hold(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn validate_credential(&self, _credential: &SecretValue) -> bool {
        true
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _credential: Option<&SecretValue>,
    ) -> Result<GeneratedImage, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if self.gated.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.results.lock().pop_front().unwrap_or(Err(GatewayError::NoArtifact))
    }
}

/// Key state restored from a previously verified key.
async fn verified_keys() -> Arc<KeyStateMachine> {
    let keys = KeyStateMachine::new(
        Arc::new(MemoryStore::with_secret(SecretValue::new("AIza-test"))),
        Arc::new(NoopCredentialSource),
    );
    keys.initialize().await;
    Arc::new(keys)
}

async fn unset_keys() -> Arc<KeyStateMachine> {
    let keys = KeyStateMachine::new(Arc::new(MemoryStore::new()), Arc::new(NoopCredentialSource));
    keys.initialize().await;
    Arc::new(keys)
}

/// Session on the message step with a sender filled in.
async fn session_at_message(gateway: &Arc<ScriptedGateway>) -> FormSession {
    let session = FormSession::start(gateway.clone(), verified_keys().await);
    session.set_field(CardField::Holiday(HolidayId::Christmas)).unwrap();
    session.advance().unwrap();
    session.advance().unwrap();
    session.set_field(CardField::Text(TextField::Sender, "Mina".into())).unwrap();
    session
}

// ============================================================================
// Step Navigation Tests
// ============================================================================

mod navigation {
    use super::*;

    #[tokio::test]
    async fn test_session_starts_on_holiday_step() {
        let session = FormSession::start(ScriptedGateway::new(), verified_keys().await);
        assert_eq!(session.step(), Step::Holiday);
        assert!(session.artifact().is_none());
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_custom_holiday_requires_name() {
        let session = FormSession::start(ScriptedGateway::new(), verified_keys().await);
        session.set_field(CardField::Holiday(HolidayId::Custom)).unwrap();
        session.set_field(CardField::CustomHolidayName("   ".into())).unwrap();

        let err = session.advance().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::MissingCustomHolidayName)
        ));
        assert_eq!(session.step(), Step::Holiday);
        assert!(session.last_error().is_some());

        session.set_field(CardField::CustomHolidayName("Grand Opening".into())).unwrap();
        assert_eq!(session.advance().unwrap(), Step::Style);
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_reference_style_requires_image() {
        let session = FormSession::start(ScriptedGateway::new(), verified_keys().await);
        session.advance().unwrap();
        session.set_field(CardField::Style(StyleMode::Reference)).unwrap();

        assert!(matches!(
            session.advance(),
            Err(SessionError::Validation(ValidationError::MissingReferenceImage))
        ));
        assert_eq!(session.step(), Step::Style);

        session
            .set_field(CardField::ReferenceImage(Some(ReferenceImage::new("image/jpeg", vec![1, 2]))))
            .unwrap();
        assert_eq!(session.advance().unwrap(), Step::Message);
    }

    #[tokio::test]
    async fn test_back_clears_error_and_stops_at_first_step() {
        let session = FormSession::start(ScriptedGateway::new(), verified_keys().await);
        session.advance().unwrap();
        session.set_field(CardField::Style(StyleMode::Reference)).unwrap();
        assert!(session.advance().is_err());

        assert_eq!(session.back().unwrap(), Step::Holiday);
        assert!(session.last_error().is_none());
        assert_eq!(session.back().unwrap(), Step::Holiday);
    }

    #[tokio::test]
    async fn test_advance_from_message_step_is_rejected() {
        let gateway = ScriptedGateway::new();
        let session = session_at_message(&gateway).await;

        assert!(matches!(
            session.advance(),
            Err(SessionError::InvalidTransition { step: Step::Message, .. })
        ));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_path_assignments_update_spec() {
        let session = FormSession::start(ScriptedGateway::new(), verified_keys().await);
        session.set_path("sender.color", "Silver").unwrap();
        session.set_path("resolution", "4k").unwrap();

        let spec = session.spec();
        assert_eq!(spec.sender_style.color, "Silver");
        assert!(matches!(
            session.set_path("sender.colour", "Gold"),
            Err(SessionError::Validation(ValidationError::UnknownField(_)))
        ));
    }
}

// ============================================================================
// Finalize Tests
// ============================================================================

mod finalize {
    use super::*;

    #[tokio::test]
    async fn test_missing_sender_blocks_generation() {
        let gateway = ScriptedGateway::new();
        let session = FormSession::start(gateway.clone(), verified_keys().await);
        session.advance().unwrap();
        session.advance().unwrap();

        let err = session.finalize().await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(ValidationError::MissingSender)));
        assert_eq!(gateway.calls(), 0);
        assert_eq!(session.step(), Step::Message);
    }

    #[tokio::test]
    async fn test_finalize_enters_result_step() {
        let gateway = ScriptedGateway::new();
        gateway.push_image(1);
        let session = session_at_message(&gateway).await;

        let artifact = session.finalize().await.unwrap();
        assert_eq!(session.step(), Step::Result);
        assert_eq!(artifact.spec.sender, "Mina");
        assert_eq!(session.artifact(), Some(artifact));

        let request = gateway.last_request().unwrap();
        assert_eq!(request.mode, RequestMode::CreateFromText);
        assert_eq!(request.aspect_hint, "3:4");
        assert!(request.prompt_text().contains("Mina"));
    }

    #[tokio::test]
    async fn test_failed_generation_stays_on_message_step() {
        let gateway = ScriptedGateway::new();
        gateway.push(Err(GatewayError::NoArtifact));
        let session = session_at_message(&gateway).await;
        let before = session.spec();

        let err = session.finalize().await.unwrap_err();
        assert_eq!(err.to_string(), "No image generated.");
        assert_eq!(session.step(), Step::Message);
        assert_eq!(session.spec(), before);
        assert!(session.artifact().is_none());
        assert!(!session.is_busy());
        assert!(session.keys().is_ready());
    }

    #[tokio::test]
    async fn test_missing_credential_requests_setup() {
        let gateway = ScriptedGateway::new();
        let session = FormSession::start(gateway.clone(), unset_keys().await);
        session.advance().unwrap();
        session.advance().unwrap();
        session.set_field(CardField::Text(TextField::Sender, "Mina".into())).unwrap();

        let err = session.finalize().await.unwrap_err();
        assert!(err.needs_credential_setup());
        assert!(session.keys().setup_requested());
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_authorization_failure_marks_key_failed() {
        let gateway = ScriptedGateway::new();
        gateway.push(Err(GatewayError::Authorization("PERMISSION_DENIED".into())));
        let session = session_at_message(&gateway).await;

        let err = session.finalize().await.unwrap_err();
        assert!(matches!(err, SessionError::Authorization(_)));
        assert_eq!(session.keys().state(), KeyState::Manual(ManualStatus::Failed));
        assert!(session.keys().setup_requested());
        assert_eq!(session.step(), Step::Message);
    }

    #[tokio::test]
    async fn test_fields_locked_on_result_step() {
        let gateway = ScriptedGateway::new();
        gateway.push_image(1);
        let session = session_at_message(&gateway).await;
        session.finalize().await.unwrap();

        assert!(matches!(
            session.set_field(CardField::Text(TextField::Sender, "Jun".into())),
            Err(SessionError::InvalidTransition { step: Step::Result, .. })
        ));
        assert!(session.back().is_err());
    }

    #[tokio::test]
    async fn test_session_rejects_calls_while_generating() {
        let gateway = ScriptedGateway::new();
        gateway.push_image(1);
        let session = Arc::new(session_at_message(&gateway).await);
        let before = session.spec();
        gateway.hold();

        let in_flight = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.finalize().await })
        };
        while !session.is_busy() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(session.advance(), Err(SessionError::Busy)));
        assert!(matches!(session.back(), Err(SessionError::Busy)));
        assert!(matches!(
            session.set_field(CardField::Text(TextField::Sender, "Jun".into())),
            Err(SessionError::Busy)
        ));
        assert!(matches!(session.finalize().await, Err(SessionError::Busy)));
        assert!(matches!(session.reset(), Err(SessionError::Busy)));

        gateway.release();
        let artifact = in_flight.await.unwrap().unwrap();
        assert_eq!(gateway.calls(), 1);
        assert_eq!(session.step(), Step::Result);
        assert_eq!(artifact.spec, before);
        assert!(!session.is_busy());
    }
}

// ============================================================================
// Refinement Tests
// ============================================================================

mod refinement {
    use super::*;

    #[tokio::test]
    async fn test_refine_before_finalize_is_rejected() {
        let session = FormSession::start(ScriptedGateway::new(), verified_keys().await);
        let err = session.refine(session.spec()).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFinalized));
    }

    #[tokio::test]
    async fn test_refine_sends_edit_request_with_prior_card() {
        let gateway = ScriptedGateway::new();
        gateway.push_image(1);
        gateway.push_image(2);
        let session = session_at_message(&gateway).await;
        let first = session.finalize().await.unwrap();

        let edited = first
            .spec
            .with_field(CardField::RefinementInstruction("Make the snow heavier".into()));
        let second = session.refine(edited).await.unwrap();

        let request = gateway.last_request().unwrap();
        assert_eq!(request.mode, RequestMode::Edit);
        assert_eq!(request.prior_artifact, Some(first.id));
        assert!(request.prompt_text().contains("Make the snow heavier"));

        assert_ne!(second.id, first.id);
        assert_eq!(session.artifact(), Some(second));
        assert_eq!(session.refinement().unwrap().rounds(), 1);
    }

    #[tokio::test]
    async fn test_failed_refinement_keeps_previous_card() {
        let gateway = ScriptedGateway::new();
        gateway.push_image(1);
        gateway.push(Err(GatewayError::Api { status: 500, message: "overloaded".into() }));
        let session = session_at_message(&gateway).await;
        let first = session.finalize().await.unwrap();

        let controller = session.refinement().unwrap();
        controller.set_field(CardField::RefinementInstruction("Add a cat".into())).unwrap();
        let err = controller.refine_working().await.unwrap_err();

        assert!(matches!(err, SessionError::Generation(_)));
        assert_eq!(controller.latest(), first);
        assert_eq!(controller.baseline_spec(), first.spec);
        assert_eq!(controller.working_spec().refinement_instruction, "Add a cat");
        assert!(controller.last_error().is_some());
        assert_eq!(controller.rounds(), 0);
    }

    #[tokio::test]
    async fn test_refine_without_sender_is_rejected_locally() {
        let gateway = ScriptedGateway::new();
        gateway.push_image(1);
        let session = session_at_message(&gateway).await;
        let first = session.finalize().await.unwrap();

        let edited = first.spec.with_field(CardField::Text(TextField::Sender, "  ".into()));
        let err = session.refine(edited.clone()).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(ValidationError::MissingSender)));
        assert_eq!(gateway.calls(), 1);

        let controller = session.refinement().unwrap();
        assert_eq!(controller.working_spec(), edited);
        assert_eq!(controller.baseline_spec(), first.spec);
        assert_eq!(controller.latest(), first);
        assert!(controller.last_error().is_some());
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_concurrent_refine_is_rejected() {
        let gateway = ScriptedGateway::new();
        gateway.push_image(1);
        gateway.push_image(2);
        let session = Arc::new(session_at_message(&gateway).await);
        let first = session.finalize().await.unwrap();
        gateway.hold();

        let in_flight = {
            let session = Arc::clone(&session);
            let spec = first.spec.clone();
            tokio::spawn(async move { session.refine(spec).await })
        };

        let controller = session.refinement().unwrap();
        while !controller.is_busy() {
            tokio::task::yield_now().await;
        }

        let err = session.refine(first.spec.clone()).await.unwrap_err();
        assert!(matches!(err, SessionError::Busy));
        assert!(matches!(session.reset(), Err(SessionError::Busy)));

        gateway.release();
        let refined = in_flight.await.unwrap().unwrap();
        assert_eq!(gateway.calls(), 2);
        assert_eq!(controller.latest(), refined);
        assert!(!controller.is_busy());
    }
}

// ============================================================================
// Reset Tests
// ============================================================================

mod reset {
    use super::*;

    #[tokio::test]
    async fn test_reset_returns_to_defaults() {
        let gateway = ScriptedGateway::new();
        gateway.push_image(1);
        let session = session_at_message(&gateway).await;
        session.finalize().await.unwrap();

        session.reset().unwrap();
        assert_eq!(session.step(), Step::Holiday);
        assert_eq!(session.spec(), cardsmith::CardSpec::default());
        assert!(session.artifact().is_none());
        assert!(session.refinement().is_none());
        assert!(session.keys().is_ready());
    }
}
