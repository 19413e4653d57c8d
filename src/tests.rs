//! Unit tests for the session engine

use crate::blueprint::BlueprintQuestionSource;
use crate::catalog::Catalog;
use crate::extractor::MockExtractor;
use crate::renderer::MockRenderer;
use crate::session::SessionEngine;
use crate::*;
use std::sync::Arc;

/// Two required fields (weights 1, 1), no optional fields, one question
/// per field plus a combined follow-up.
const MEMO_CATALOG: &str = r#"{
  "doc_types": [{
    "id": "memo",
    "name": "Memo",
    "description": "Two-field memo",
    "template_ref": "templates/memo.md",
    "required_fields": [
      {"id": "summary", "label": "Summary"},
      {"id": "action", "label": "Action"}
    ],
    "questions": [
      {"id": "q_summary", "text": "What happened?", "targets": ["summary"]},
      {"id": "q_action", "text": "What should we do?", "targets": ["action"]}
    ]
  }]
}"#;

fn answer(field: &str, value: &str) -> ExtractedAnswer {
    ExtractedAnswer {
        field_id: field.to_string(),
        value: value.to_string(),
        confidence: 0.9,
    }
}

fn extraction(answers: Vec<ExtractedAnswer>) -> Extraction {
    Extraction {
        answers,
        title: None,
    }
}

fn msg(id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: Some(id.to_string()),
        text: text.to_string(),
    }
}

fn memo_engine(script: Vec<Extraction>) -> SharedSessionEngine {
    let catalog = Arc::new(Catalog::load_from_str(MEMO_CATALOG).unwrap());
    SessionEngine::new(
        catalog,
        Arc::new(MockExtractor::new(script)),
        Arc::new(MockRenderer::new()),
    )
}

fn builtin_engine(script: Vec<Extraction>) -> SharedSessionEngine {
    SessionEngine::new(
        Arc::new(Catalog::builtin()),
        Arc::new(MockExtractor::new(script)),
        Arc::new(MockRenderer::new()),
    )
}

#[test]
fn unknown_doc_type_fails_session_creation() {
    let engine = builtin_engine(vec![]);
    let err = engine.start_session("t1", "haiku", None).unwrap_err();
    match err {
        EngineError::UnknownDocType { available, .. } => {
            assert!(available.contains(&"project_brief".to_string()));
        }
        other => panic!("expected UnknownDocType, got {:?}", other),
    }
}

#[test]
fn definitions_are_shared_not_copied() {
    let engine = builtin_engine(vec![]);
    let a = engine.start_session("t1", "design_doc", None).unwrap();
    let b = engine.start_session("t2", "design_doc", None).unwrap();
    assert!(Arc::ptr_eq(&a.definition, &b.definition));
}

#[tokio::test]
async fn scenario_a_partial_fill_is_not_ready() {
    let engine = memo_engine(vec![extraction(vec![answer("summary", "the batch job failed")])]);
    let state = engine.start_session("t1", "memo", None).unwrap();

    // Empty dossier scores zero and reports both fields missing.
    let report = scoring::score(&state.definition, &state.dossier, &state.citations);
    assert_eq!(report.completeness, 0.0);
    assert_eq!(report.missing_required, vec!["summary", "action"]);

    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "our nightly batch job failed"))
        .await
        .unwrap();

    let report = scoring::score(&state.definition, &state.dossier, &state.citations);
    assert!((report.completeness - 0.5).abs() < 1e-9);
    assert!(!state.ready_to_generate);
    assert!(matches!(outcome, TurnOutcome::Questions { .. }));
}

#[tokio::test]
async fn scenario_b_threshold_unmet_without_evidence_needs_explicit_readiness() {
    let engine = memo_engine(vec![extraction(vec![
        answer("summary", "the batch job failed"),
        answer("action", "add retries and alerting"),
    ])]);
    let state = engine.start_session("t1", "memo", None).unwrap();

    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "job failed; we should add retries"))
        .await
        .unwrap();

    // completeness=1, evidence=0, clarity=1 -> overall 0.7 < 0.75.
    assert!((state.confidence - 0.7).abs() < 1e-9);
    assert!(!state.ready_to_generate);
    assert!(!matches!(outcome, TurnOutcome::Drafted { .. }));

    // An explicit readiness utterance overrides the threshold.
    let (state, outcome) = engine
        .process_turn(state, &msg("m2", "looks good, we're ready"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Drafted { .. }));
    assert!(!state.active);
    assert_eq!(state.phase, SessionPhase::Drafted);
}

#[tokio::test]
async fn scenario_c_explicit_override_with_nothing_filled() {
    let engine = memo_engine(vec![]);
    let state = engine.start_session("t1", "memo", None).unwrap();

    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "just generate the document"))
        .await
        .unwrap();

    assert!(state.ready_to_generate);
    match outcome {
        TurnOutcome::Drafted { artifact } => {
            // The unresolved fields ride along for assumption-noting.
            assert_eq!(artifact.missing_required, vec!["summary", "action"]);
        }
        other => panic!("expected Drafted, got {:?}", other),
    }
}

#[tokio::test]
async fn scenario_d_assumption_injection_fills_every_blueprint_gap() {
    let engine = builtin_engine(vec![]);
    let state = engine.start_session("t1", "project_brief", None).unwrap();

    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "you can assume the rest and proceed"))
        .await
        .unwrap();

    // Every blueprint field got its documented default; zero questions
    // surfaced, so the session went straight to drafting.
    match outcome {
        TurnOutcome::Drafted { artifact } => {
            assert_eq!(artifact.assumed_fields.len(), 9);
            assert!(artifact.missing_required.is_empty());
        }
        other => panic!("expected Drafted, got {:?}", other),
    }
    assert_eq!(state.dossier.len(), 9);
    assert!(state
        .clarifying
        .values()
        .all(|q| q.status == QuestionStatus::Assumed));
}

#[tokio::test]
async fn assumption_authorization_after_a_question_turn_injects_defaults() {
    let engine = builtin_engine(vec![]);
    let state = engine.start_session("t1", "project_brief", None).unwrap();

    // Turn 1 asks the top-priority blueprint questions.
    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "let's put together a brief"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Questions { .. }));
    assert_eq!(state.last_asked_question_id.as_deref(), Some("objective"));

    // Turn 2: the authorization sentence is a directive, not the
    // literal answer to the question asked last turn. Every gap gets
    // its documented default and is marked assumed.
    let (state, outcome) = engine
        .process_turn(state, &msg("m2", "you can assume the rest and proceed"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Drafted { .. }));
    assert_ne!(
        state.dossier.get("objective").map(|s| s.as_str()),
        Some("you can assume the rest and proceed")
    );
    assert!(state.assumed_fields.iter().any(|f| f == "objective"));
    assert_eq!(
        state.clarifying["objective"].status,
        QuestionStatus::Assumed
    );
    assert_eq!(
        state.answers["objective"].source,
        AnswerSource::Assumption
    );
}

#[tokio::test]
async fn citations_raise_evidence_and_unlock_threshold_readiness() {
    let engine = memo_engine(vec![extraction(vec![
        answer("summary", "the batch job failed"),
        answer("action", "add retries and alerting"),
    ])]);
    let state = engine.start_session("t1", "memo", None).unwrap();

    let (mut state, _) = engine
        .process_turn(state, &msg("m1", "job failed; we should add retries"))
        .await
        .unwrap();
    assert!((state.confidence - 0.7).abs() < 1e-9);

    let cite = |id: &str, label: &str, field: &str| Citation {
        id: id.to_string(),
        label: label.to_string(),
        url: String::new(),
        note: String::new(),
        applies_to: vec![field.to_string()],
    };
    engine.add_citations(
        &mut state,
        vec![
            cite("c1", "incident report", "summary"),
            cite("c2", "retry design note", "action"),
        ],
    );
    assert_eq!(state.citations.len(), 2);
    assert!((state.confidence - 1.0).abs() < 1e-9);

    // With every valued field cited the threshold holds on its own;
    // no readiness utterance needed.
    let (state, outcome) = engine
        .process_turn(state, &msg("m2", "attaching the incident links for context"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Drafted { .. }));
    assert!(!state.active);
}

#[tokio::test]
async fn drafted_session_reports_inactive_not_duplicate() {
    let engine = memo_engine(vec![]);
    let state = engine.start_session("t1", "memo", None).unwrap();
    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "just generate the document"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Drafted { .. }));

    let (_, outcome) = engine
        .process_turn(state, &msg("m2", "one more thing"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Inactive));
}

#[tokio::test]
async fn duplicate_message_id_changes_nothing() {
    let engine = memo_engine(vec![
        extraction(vec![answer("summary", "first value")]),
        extraction(vec![answer("summary", "would clobber")]),
    ]);
    let state = engine.start_session("t1", "memo", None).unwrap();

    let (state, _) = engine
        .process_turn(state, &msg("m1", "summary text"))
        .await
        .unwrap();
    let dossier_before = state.dossier.clone();
    let pending_before = state.pending_questions.len();

    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "summary text"))
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::Duplicate));
    assert_eq!(state.dossier, dossier_before);
    assert_eq!(state.pending_questions.len(), pending_before);
    assert_eq!(state.answers["summary"].timestamps.len(), 1);
}

#[tokio::test]
async fn content_derived_identity_dedupes_unlabelled_messages() {
    let engine = memo_engine(vec![extraction(vec![answer("summary", "v")])]);
    let state = engine.start_session("t1", "memo", None).unwrap();

    let unlabelled = InboundMessage {
        id: None,
        text: "same words every time".to_string(),
    };
    let (state, _) = engine.process_turn(state, &unlabelled).await.unwrap();
    let (_, outcome) = engine.process_turn(state, &unlabelled).await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Duplicate));
}

#[tokio::test]
async fn readiness_is_monotonic_across_render_failures() {
    let catalog = Arc::new(Catalog::load_from_str(MEMO_CATALOG).unwrap());
    let failing = SessionEngine::new(
        catalog.clone(),
        Arc::new(MockExtractor::new(vec![])),
        Arc::new(MockRenderer::failing()),
    );
    let state = failing.start_session("t1", "memo", None).unwrap();

    let (state, outcome) = failing
        .process_turn(state, &msg("m1", "we're ready"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::RenderFailed { .. }));
    assert!(state.ready_to_generate, "render failure must not un-ready");
    assert!(state.active);
    assert_eq!(state.phase, SessionPhase::Ready);

    // A later ordinary message cannot un-ready the session; with a
    // working renderer the retry drafts without re-asking anything.
    let working = SessionEngine::new(
        catalog,
        Arc::new(MockExtractor::new(vec![])),
        Arc::new(MockRenderer::new()),
    );
    let (state, outcome) = working
        .process_turn(state, &msg("m2", "any message at all"))
        .await
        .unwrap();
    assert!(state.ready_to_generate);
    assert!(matches!(outcome, TurnOutcome::Drafted { .. }));
}

#[tokio::test]
async fn extraction_failure_is_recovered_and_turn_proceeds() {
    let catalog = Arc::new(Catalog::load_from_str(MEMO_CATALOG).unwrap());
    let engine = SessionEngine::new(
        catalog,
        Arc::new(MockExtractor::failing_once("service unavailable")),
        Arc::new(MockRenderer::new()),
    );
    let state = engine.start_session("t1", "memo", None).unwrap();

    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "hello there"))
        .await
        .unwrap();

    // The turn still produced a question despite the extractor error.
    assert!(matches!(outcome, TurnOutcome::Questions { .. }));
    assert!(state.active);
}

#[tokio::test]
async fn raw_answer_is_preserved_for_the_pending_question() {
    let engine = memo_engine(vec![]);
    let state = engine.start_session("t1", "memo", None).unwrap();

    // Turn 1 asks the highest-priority question.
    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "hi, let's write a memo"))
        .await
        .unwrap();
    let asked = match &outcome {
        TurnOutcome::Questions { questions, .. } => questions[0].id.clone(),
        other => panic!("expected a question, got {:?}", other),
    };
    assert_eq!(state.last_asked_question_id.as_deref(), Some(asked.as_str()));

    // Turn 2: extraction yields nothing, but the literal reply must
    // land on the asked question's open target.
    let (state, _) = engine
        .process_turn(state, &msg("m2", "the deploy pipeline broke on Friday"))
        .await
        .unwrap();
    assert_eq!(
        state.dossier.get("summary").map(|s| s.as_str()),
        Some("the deploy pipeline broke on Friday")
    );
    assert_eq!(state.answers["summary"].source, AnswerSource::User);
}

#[tokio::test]
async fn answered_questions_drop_from_the_plan_and_next_skips_just_cleared() {
    let engine = memo_engine(vec![extraction(vec![answer("summary", "queue saturated")])]);
    let state = engine.start_session("t1", "memo", None).unwrap();
    assert_eq!(state.pending_questions.len(), 2);

    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "the queue is saturated"))
        .await
        .unwrap();

    assert_eq!(state.pending_questions.len(), 1);
    match outcome {
        TurnOutcome::Questions { questions, .. } => {
            assert_eq!(questions[0].id, "q_action");
        }
        other => panic!("expected next question, got {:?}", other),
    }
}

#[tokio::test]
async fn never_a_silent_turn_when_questions_run_out() {
    // Single question covering both fields: once it has been asked and
    // only half-answered, there is no other question to rotate to.
    let raw = r#"{
      "doc_types": [{
        "id": "memo",
        "name": "Memo",
        "template_ref": "t",
        "required_fields": [
          {"id": "summary", "label": "Summary"},
          {"id": "action", "label": "Action"}
        ],
        "questions": [
          {"id": "q_both", "text": "What happened and what should we do?", "targets": ["summary", "action"]}
        ]
      }]
    }"#;
    let engine = SessionEngine::new(
        Arc::new(Catalog::load_from_str(raw).unwrap()),
        Arc::new(MockExtractor::new(vec![
            Extraction::default(),
            extraction(vec![answer("summary", "it broke")]),
        ])),
        Arc::new(MockRenderer::new()),
    );
    let state = engine.start_session("t1", "memo", None).unwrap();

    let (state, _) = engine.process_turn(state, &msg("m1", "hello")).await.unwrap();
    let (_, outcome) = engine
        .process_turn(state, &msg("m2", "it broke"))
        .await
        .unwrap();

    match outcome {
        TurnOutcome::MissingSummary {
            missing_required, ..
        } => {
            assert_eq!(missing_required, vec!["action"]);
        }
        other => panic!("expected MissingSummary, got {:?}", other),
    }
}

#[tokio::test]
async fn exhausted_plan_below_threshold_carries_the_confidence() {
    let engine = memo_engine(vec![extraction(vec![
        answer("summary", "the batch job failed"),
        answer("action", "add retries and alerting"),
    ])]);
    let state = engine.start_session("t1", "memo", None).unwrap();

    // Both fields filled in one turn: nothing missing, nothing left to
    // ask, but 0.7 < threshold. The turn must still say where the
    // score stands so the caller can ask for confirmation.
    let (_, outcome) = engine
        .process_turn(state, &msg("m1", "job failed; we should add retries"))
        .await
        .unwrap();
    match outcome {
        TurnOutcome::MissingSummary {
            missing_required,
            confidence,
        } => {
            assert!(missing_required.is_empty());
            assert!((confidence - 0.7).abs() < 1e-9);
        }
        other => panic!("expected a confirmation summary, got {:?}", other),
    }
}

#[tokio::test]
async fn blueprint_surfaces_capped_prioritized_questions() {
    let engine = builtin_engine(vec![]);
    let state = engine.start_session("t1", "project_brief", None).unwrap();

    let (state, outcome) = engine
        .process_turn(state, &msg("m1", "I want to kick off a new project"))
        .await
        .unwrap();

    match outcome {
        TurnOutcome::Questions { questions, .. } => {
            assert_eq!(questions.len(), 4);
            let fields: Vec<&str> = questions.iter().map(|q| q.id.as_str()).collect();
            assert_eq!(fields, vec!["objective", "audience", "scope", "deliverables"]);
        }
        other => panic!("expected questions, got {:?}", other),
    }
    assert_eq!(state.clarifying["objective"].times_asked, 1);
    assert!(state.clarifying["objective"].last_asked_at.is_some());
}

#[test]
fn blueprint_does_not_renag_optional_questions() {
    let engine = builtin_engine(vec![]);
    let mut state = engine.start_session("t1", "project_brief", None).unwrap();

    let bp = BlueprintQuestionSource::project_intake();
    for field in ["objective", "audience", "scope", "deliverables", "success_criteria"] {
        crate::blueprint::record_answer(
            &mut state,
            field,
            "answered".to_string(),
            AnswerSource::User,
            0.9,
            1,
        );
    }
    bp.refresh_questions(&mut state, &[]);

    // Only optional gaps remain; they surface once...
    let first = bp.select_questions(&mut state, 2);
    assert_eq!(first.len(), 4);

    // ...and are not re-asked while still unanswered.
    let second = bp.select_questions(&mut state, 3);
    assert!(second.is_empty());
}

#[tokio::test]
async fn blueprint_coverage_confidence_tracks_required_fields() {
    let engine = builtin_engine(vec![
        extraction(vec![answer("objective", "internal analytics dashboard")]),
        extraction(vec![
            answer("audience", "support leads"),
            answer("scope", "reporting only"),
            answer("deliverables", "dashboard, runbook"),
            answer("success_criteria", "weekly use by support leads"),
        ]),
    ]);
    let state = engine.start_session("t1", "project_brief", None).unwrap();

    let (state, _) = engine
        .process_turn(state, &msg("m1", "we need an analytics dashboard"))
        .await
        .unwrap();
    assert!((state.confidence - 20.0).abs() < 1e-9);

    let (state, outcome) = engine
        .process_turn(state, &msg("m2", "audience, scope, deliverables, criteria"))
        .await
        .unwrap();
    // All required covered: coverage hits 100 and the session drafts.
    assert!((state.confidence - 100.0).abs() < 1e-9);
    assert!(matches!(outcome, TurnOutcome::Drafted { .. }));
}

#[tokio::test]
async fn blueprint_list_fields_merge_across_turns() {
    let engine = builtin_engine(vec![
        extraction(vec![answer("deliverables", "prototype, demo")]),
        extraction(vec![answer("deliverables", "demo; runbook")]),
    ]);
    let state = engine.start_session("t1", "project_brief", None).unwrap();

    let (state, _) = engine
        .process_turn(state, &msg("m1", "deliverables: prototype and demo"))
        .await
        .unwrap();
    let (state, _) = engine
        .process_turn(state, &msg("m2", "also a demo and a runbook"))
        .await
        .unwrap();

    assert_eq!(
        state.dossier.get("deliverables").map(|s| s.as_str()),
        Some("prototype, demo, runbook")
    );
    // History shows both merges.
    assert_eq!(state.answers["deliverables"].timestamps.len(), 2);
}

#[tokio::test]
async fn title_is_captured_from_extraction_once() {
    let engine = memo_engine(vec![
        Extraction {
            answers: vec![answer("summary", "x")],
            title: Some("Incident memo".to_string()),
        },
        Extraction {
            answers: vec![],
            title: Some("Different title".to_string()),
        },
    ]);
    let state = engine.start_session("t1", "memo", None).unwrap();

    let (state, _) = engine.process_turn(state, &msg("m1", "a")).await.unwrap();
    assert_eq!(state.title, "Incident memo");

    let (state, _) = engine.process_turn(state, &msg("m2", "b")).await.unwrap();
    assert_eq!(state.title, "Incident memo");
}

#[tokio::test]
async fn reset_deactivates_and_discards() {
    let engine = memo_engine(vec![extraction(vec![answer("summary", "x")])]);
    let state = engine.start_session("t1", "memo", None).unwrap();
    let (mut state, _) = engine.process_turn(state, &msg("m1", "x")).await.unwrap();
    assert!(!state.dossier.is_empty());

    engine.reset(&mut state);
    assert!(!state.active);
    assert!(state.dossier.is_empty());
    assert!(state.pending_questions.is_empty());
    assert!(!state.ready_to_generate);
}
