//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::ledger::AmbiguityLedger;
use super::state::{Outcome, ProcessingProgress, ResumeOrigin};
use super::transition::*;
use super::*;
use crate::backend::{
    AmbiguityStatus, AnswerOutcome, BackendError, ErrorKind, LogLevel, ProcessingConfig,
    ProcessingLog, ProcessingSnapshot, ProcessingStarted, QuestionSet, ResolutionContinued,
    RunStatus, SessionDetail, SessionStatus, SessionSummary, Step,
};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::new("session_prop", 3)
}

fn snapshot(status: RunStatus, progress: f64) -> ProcessingSnapshot {
    ProcessingSnapshot {
        status,
        current_stage: 0,
        overall_progress: progress,
        stages: Vec::new(),
        started_at: None,
        estimated_completion: None,
        error: None,
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_questions() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[A-Z][a-z ]{3,20}\\?", 1..5)
}

fn arb_answers() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z ]{0,12}", 0..7)
}

fn arb_ledger() -> impl Strategy<Value = AmbiguityLedger> {
    (arb_questions(), arb_answers()).prop_map(|(questions, answers)| {
        let mut ledger = AmbiguityLedger::new(questions);
        ledger.record(answers);
        ledger
    })
}

fn arb_error_kind() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::Auth),
        Just(ErrorKind::NotFound),
        Just(ErrorKind::BadRequest),
        Just(ErrorKind::Conflict),
        Just(ErrorKind::Server),
        Just(ErrorKind::Network),
        Just(ErrorKind::Decode),
    ]
}

fn arb_backend_error() -> impl Strategy<Value = BackendError> {
    (arb_error_kind(), "[a-zA-Z ]{1,20}")
        .prop_map(|(kind, message)| BackendError::new(kind, message))
}

fn arb_request() -> impl Strategy<Value = BackendRequest> {
    prop_oneof![
        Just(BackendRequest::CreateMessage),
        Just(BackendRequest::SubmitAnswers),
        Just(BackendRequest::FetchQuestions),
        Just(BackendRequest::ConfirmContext),
        Just(BackendRequest::ContinueResolving),
        Just(BackendRequest::StartProcessing),
        Just(BackendRequest::StopProcessing),
        Just(BackendRequest::CompleteProcessing),
        Just(BackendRequest::RefreshMessages),
        Just(BackendRequest::LoadSession),
    ]
}

fn arb_run_status() -> impl Strategy<Value = RunStatus> {
    prop_oneof![
        Just(RunStatus::Initializing),
        Just(RunStatus::Processing),
        Just(RunStatus::Completed),
        Just(RunStatus::Stopped),
        Just(RunStatus::Failed),
    ]
}

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Succeeded),
        Just(Outcome::Stopped),
        "[a-z ]{1,10}".prop_map(|error| Outcome::Failed { error }),
        "[a-z ]{1,10}".prop_map(|reason| Outcome::Abandoned { reason }),
    ]
}

fn arb_question_set() -> impl Strategy<Value = QuestionSet> {
    (
        arb_questions(),
        arb_answers(),
        prop_oneof![
            Just(AmbiguityStatus::Active),
            Just(AmbiguityStatus::ContextConfirmation),
            Just(AmbiguityStatus::Confirmed),
        ],
    )
        .prop_map(|(questions, answers, status)| QuestionSet {
            current_index: answers.len(),
            questions,
            answers,
            status,
        })
}

fn arb_answer_outcome() -> impl Strategy<Value = AnswerOutcome> {
    prop_oneof![
        ("[A-Z][a-z ]{3,20}\\?", 0usize..6, 1usize..6).prop_map(|(next_question, answered, total)| {
            AnswerOutcome::Active {
                next_question,
                answered,
                total,
            }
        }),
        (0usize..6)
            .prop_map(|total_answered| AnswerOutcome::ContextConfirmation { total_answered }),
        Just(AnswerOutcome::Unrecognized { reported: None }),
    ]
}

fn arb_processing_state() -> impl Strategy<Value = ConvState> {
    (arb_ledger(), any::<bool>(), 0u32..3, 0u32..3).prop_map(
        |(ledger, started, status_failures, log_failures)| ConvState::Processing {
            ledger,
            progress: ProcessingProgress {
                status_failures,
                log_failures,
                ..ProcessingProgress::default()
            },
            started,
        },
    )
}

fn arb_awaiting_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        "[a-z ]{1,20}".prop_map(|text| ConvState::SubmittingQuery { text }),
        (arb_ledger(), arb_answers())
            .prop_map(|(ledger, pending)| ConvState::SubmittingAnswers { ledger, pending }),
        arb_ledger().prop_map(|ledger| ConvState::ConfirmingContext { ledger }),
        (arb_ledger(), any::<bool>()).prop_map(|(ledger, confirmed)| {
            ConvState::ResumingResolution {
                ledger,
                origin: ResumeOrigin::Context { confirmed },
            }
        }),
        arb_ledger().prop_map(|ledger| ConvState::Recovering {
            ledger,
            progress: ProcessingProgress::default(),
        }),
        (arb_ledger(), arb_outcome(), "[a-z ]{1,20}").prop_map(|(ledger, outcome, text)| {
            ConvState::SubmittingFollowUp {
                ledger,
                outcome,
                text,
            }
        }),
    ]
}

fn arb_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        Just(ConvState::Query),
        arb_ledger().prop_map(|ledger| ConvState::Ambiguity { ledger }),
        (arb_ledger(), any::<bool>())
            .prop_map(|(ledger, confirmed)| ConvState::Context { ledger, confirmed }),
        arb_processing_state(),
        (arb_ledger(), arb_outcome()).prop_map(|(ledger, outcome)| ConvState::Completed {
            ledger,
            outcome
        }),
        arb_awaiting_state(),
    ]
}

fn arb_user_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-zA-Z ]{0,20}".prop_map(|text| Event::UserMessage { text }),
        arb_answers().prop_map(|answers| Event::AnswerQuestions { answers }),
        Just(Event::ConfirmContext),
        Just(Event::ContinueResolving),
        (0u32..40).prop_map(|processing_time| Event::StartAnalysis {
            config: ProcessingConfig {
                processing_time,
                ..ProcessingConfig::default()
            }
        }),
        Just(Event::ForceStop),
        Just(Event::FinishProcessing),
        Just(Event::Reload),
    ]
}

/// User events that never make sense while a request is outstanding
fn arb_blocked_user_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-zA-Z ]{1,20}".prop_map(|text| Event::UserMessage { text }),
        proptest::collection::vec("[a-z]{1,8}", 1..3)
            .prop_map(|answers| Event::AnswerQuestions { answers }),
        Just(Event::ConfirmContext),
        Just(Event::ContinueResolving),
        Just(Event::StartAnalysis {
            config: ProcessingConfig::default()
        }),
        Just(Event::FinishProcessing),
    ]
}

fn arb_backend_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_answer_outcome().prop_map(Event::AnswerRecorded),
        arb_question_set().prop_map(Event::QuestionsFetched),
        Just(Event::ContextConfirmed),
        ("[A-Z][a-z ]{3,20}\\?", 0usize..6, 1usize..6).prop_map(|(q, answered, total)| {
            Event::ResolutionContinued(ResolutionContinued {
                current_question: q,
                total_questions: total,
                answered_questions: answered,
            })
        }),
        Just(Event::ProcessingStarted(ProcessingStarted {
            processing_id: "session_prop".into(),
            estimated_duration: None,
        })),
        Just(Event::ProcessingStopped),
        Just(Event::ProcessingCompleted),
        (arb_request(), arb_backend_error())
            .prop_map(|(request, error)| Event::RequestFailed { request, error }),
        (arb_run_status(), 0.0f64..120.0)
            .prop_map(|(status, progress)| Event::StatusPolled(snapshot(status, progress))),
        proptest::collection::vec("[0-9]{1,2}", 0..4).prop_map(|ids| {
            Event::LogsPolled(
                ids.into_iter()
                    .map(|id| ProcessingLog {
                        id,
                        timestamp: None,
                        message: "stage update".into(),
                        level: LogLevel::Info,
                    })
                    .collect(),
            )
        }),
        (
            prop_oneof![Just(PollSource::Status), Just(PollSource::Logs)],
            arb_backend_error()
        )
            .prop_map(|(source, error)| Event::PollFailed { source, error }),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![arb_user_event(), arb_backend_event()]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Query),
        Just(Step::Ambiguity),
        Just(Step::Context),
        Just(Step::Processing),
        Just(Step::Completed),
    ]
}

fn session_loaded(step: Step, questions: Option<QuestionSet>, run: Option<RunStatus>) -> Event {
    Event::SessionLoaded(Box::new(SessionSnapshot {
        detail: SessionDetail {
            summary: SessionSummary {
                id: "session_prop".into(),
                title: "Churn".into(),
                domain: "Marketing".into(),
                created_at: None,
                updated_at: None,
                current_step: step,
                status: SessionStatus::Active,
                messages_count: 0,
            },
            messages: Vec::new(),
        },
        questions,
        processing: run.map(|status| snapshot(status, 50.0)),
    }))
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: the ledger never holds more answers than questions
    #[test]
    fn prop_answers_never_exceed_questions(
        start in arb_state(),
        events in proptest::collection::vec(arb_event(), 0..25)
    ) {
        let mut state = start;
        let ctx = test_context();

        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                state = result.new_state;
                if let Some(ledger) = state.ledger() {
                    prop_assert!(
                        ledger.answers().len() <= ledger.questions().len(),
                        "Ledger overflow in {:?}",
                        state
                    );
                }
            }
        }
    }

    // Invariant 2: a change of state kind is always published
    #[test]
    fn prop_state_changes_publish(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &test_context(), event) {
            if result.new_state.name() != state.name() {
                prop_assert!(
                    result.effects.contains(&Effect::PublishState),
                    "State changed but not published: {:?} -> {:?}",
                    state.name(),
                    result.new_state.name()
                );
            }
        }
    }

    // Invariant 3: once analysis starts the ambiguity step is closed
    #[test]
    fn prop_processing_rejects_ambiguity_input(
        state in arb_processing_state(),
        text in "[a-zA-Z ]{1,20}"
    ) {
        for event in [
            Event::UserMessage { text: text.clone() },
            Event::AnswerQuestions { answers: vec![text.clone()] },
            Event::ConfirmContext,
            Event::ContinueResolving,
        ] {
            let result = transition(&state, &test_context(), event);
            prop_assert_eq!(result.unwrap_err(), TransitionError::AmbiguityClosed);
        }
    }

    // Invariant 4: starting analysis from context always enters processing
    #[test]
    fn prop_start_analysis_enters_processing(
        ledger in arb_ledger(),
        confirmed in any::<bool>(),
        minutes in 0u32..100
    ) {
        let state = ConvState::Context { ledger, confirmed };
        let event = Event::StartAnalysis {
            config: ProcessingConfig { processing_time: minutes, ..ProcessingConfig::default() },
        };
        let result = transition(&state, &test_context(), event).unwrap();
        prop_assert_eq!(result.new_state.step(), Step::Processing);
        prop_assert!(!result.new_state.accepts_ambiguity_input());

        let sent = result.effects.iter().find_map(|e| match e {
            Effect::StartProcessing { config } => Some(config.processing_time),
            _ => None,
        });
        prop_assert!(matches!(sent, Some(3..=30)), "Unnormalized duration {:?}", sent);
    }

    // Invariant 5: force stop during processing is terminal and stops polling
    #[test]
    fn prop_force_stop_is_terminal(state in arb_processing_state()) {
        let result = transition(&state, &test_context(), Event::ForceStop).unwrap();
        prop_assert!(result.new_state.is_terminal());
        prop_assert!(result.effects.contains(&Effect::StopPolling));
        prop_assert!(result.effects.contains(&Effect::StopProcessing));
        // An unacknowledged start stays in flight so its ack can be stopped again
        prop_assert_eq!(
            result.effects.contains(&Effect::CancelRequests),
            state.is_polling()
        );
    }

    // Invariant 6: pollers run exactly while a started run is in progress
    #[test]
    fn prop_polling_follows_state(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &test_context(), event) {
            if result.effects.contains(&Effect::StartPolling) {
                prop_assert!(result.new_state.is_polling());
            }
            if state.is_polling() && !result.new_state.is_polling() {
                prop_assert!(
                    result.effects.contains(&Effect::StopPolling),
                    "Left {:?} for {:?} without stopping pollers",
                    state.name(),
                    result.new_state.name()
                );
            }
        }
    }

    // Invariant 7: states waiting on the backend reject new input
    #[test]
    fn prop_awaiting_rejects_user_input(
        state in arb_awaiting_state(),
        event in arb_blocked_user_event()
    ) {
        let result = transition(&state, &test_context(), event);
        prop_assert!(result.is_err(), "Awaiting state accepted input: {:?}", result);
    }

    // Invariant 8: late poll results never revive a completed session
    #[test]
    fn prop_completed_ignores_polls(
        ledger in arb_ledger(),
        outcome in arb_outcome(),
        status in arb_run_status(),
        error in arb_backend_error()
    ) {
        let state = ConvState::Completed { ledger, outcome };
        for event in [
            Event::StatusPolled(snapshot(status, 10.0)),
            Event::LogsPolled(Vec::new()),
            Event::PollFailed { source: PollSource::Status, error: error.clone() },
        ] {
            let result = transition(&state, &test_context(), event).unwrap();
            prop_assert_eq!(&result.new_state, &state);
            prop_assert!(result.effects.is_empty());
        }
    }

    // Invariant 9: reopening a session lands on the step the backend reports
    #[test]
    fn prop_session_loaded_matches_backend_step(
        start in arb_state(),
        step in arb_step(),
        questions in proptest::option::of(arb_question_set()),
        run in arb_run_status()
    ) {
        let result = transition(&start, &test_context(), session_loaded(step, questions, Some(run))).unwrap();
        let expected = if step == Step::Processing && run.is_terminal() {
            Step::Completed
        } else {
            step
        };
        prop_assert_eq!(result.new_state.step(), expected);
        prop_assert!(!result.new_state.is_awaiting_response());
    }

    // Invariant 10: the transition function is deterministic
    #[test]
    fn prop_transition_is_deterministic(state in arb_state(), event in arb_event()) {
        let first = transition(&state, &test_context(), event.clone());
        let second = transition(&state, &test_context(), event);
        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.new_state, b.new_state);
                prop_assert_eq!(a.effects, b.effects);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            (a, b) => prop_assert!(false, "Diverged: {:?} vs {:?}", a, b),
        }
    }
}

// ============================================================================
// Deterministic Scenario Tests
// ============================================================================

#[test]
fn test_full_wizard_flow() {
    let ctx = test_context();
    let q1 = "What specific aspect of revenue are you interested in?".to_string();
    let q2 = "What time period should the analysis cover?".to_string();

    let mut ambiguity = crate::session::Message::local(
        crate::session::MessageType::Ambiguity,
        "I need to clarify a few domain-specific terms",
    )
    .with_status(crate::session::MessageStatus::Active);
    ambiguity.current_question = Some(q1.clone());
    ambiguity.all_questions = vec![q1.clone(), q2.clone()];

    let steps = [
        Event::UserMessage {
            text: "Why did revenue drop?".into(),
        },
        Event::MessagesCreated {
            messages: vec![ambiguity],
        },
        Event::UserMessage {
            text: "net revenue".into(),
        },
        Event::AnswerRecorded(AnswerOutcome::Active {
            next_question: q2,
            answered: 1,
            total: 2,
        }),
        Event::UserMessage {
            text: "last quarter".into(),
        },
        Event::AnswerRecorded(AnswerOutcome::ContextConfirmation { total_answered: 2 }),
        Event::ConfirmContext,
        Event::ContextConfirmed,
        Event::StartAnalysis {
            config: ProcessingConfig::default(),
        },
        Event::ProcessingStarted(ProcessingStarted {
            processing_id: "session_prop".into(),
            estimated_duration: Some("6 minutes".into()),
        }),
        Event::StatusPolled(snapshot(RunStatus::Processing, 40.0)),
        Event::StatusPolled(snapshot(RunStatus::Completed, 100.0)),
    ];

    let mut state = ConvState::Query;
    for event in steps {
        state = transition(&state, &ctx, event).unwrap().new_state;
    }

    match state {
        ConvState::Completed { ledger, outcome } => {
            assert_eq!(outcome, Outcome::Succeeded);
            assert_eq!(ledger.answers().len(), 2);
            assert!(ledger.is_complete());
        }
        other => panic!("Expected Completed, got {other:?}"),
    }
}
