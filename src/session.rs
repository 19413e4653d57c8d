//! Session state machine for guided document assembly
//!
//! Owns per-conversation session state and processes exactly one inbound
//! message per turn: extract, merge, rescore, then either ask the next
//! question or trigger the artifact. State flows value-in/value-out per
//! turn; nothing outside this module mutates a session.

use crate::blueprint::{authorizes_assumptions, record_answer, BlueprintQuestionSource};
use crate::catalog::Catalog;
use crate::error::{EngineError, EngineResult};
use crate::extractor::{AnswerExtractor, ExtractionContext};
use crate::planner;
use crate::renderer::{trigger_artifact, DocumentRenderer};
use crate::scoring::{self, READY_THRESHOLD};
use crate::types::{
    AnswerSource, Citation, DocSessionState, Extraction, InboundMessage, QuestionSourceKind,
    SessionPhase, TurnOutcome,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

static READINESS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bready to (start|generate|draft)\b",
        r"(?i)\bgo ahead and (start|generate|draft)\b",
        r"(?i)\bgenerate the (doc|document|draft)\b",
        r"(?i)\bwe'?re ready\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("readiness pattern must compile"))
    .collect()
});

/// Does the message explicitly ask to draft now, overriding the
/// confidence threshold?
pub fn is_readiness_utterance(text: &str) -> bool {
    READINESS_PATTERNS.iter().any(|p| p.is_match(text))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Orchestrator for all document sessions (thread-safe via Arc).
pub struct SessionEngine {
    catalog: Arc<Catalog>,
    extractor: Arc<dyn AnswerExtractor>,
    renderer: Arc<dyn DocumentRenderer>,
    blueprint: BlueprintQuestionSource,
}

pub type SharedSessionEngine = Arc<SessionEngine>;

impl SessionEngine {
    pub fn new(
        catalog: Arc<Catalog>,
        extractor: Arc<dyn AnswerExtractor>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> SharedSessionEngine {
        Arc::new(Self {
            catalog,
            extractor,
            renderer,
            blueprint: BlueprintQuestionSource::project_intake(),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Create a session for a conversation thread. Fails with
    /// `UnknownDocType` when the requested type is not in the catalog.
    pub fn start_session(
        &self,
        thread_id: &str,
        doc_type: &str,
        title: Option<String>,
    ) -> EngineResult<DocSessionState> {
        let definition = self.catalog.get(doc_type)?;

        // Plan once at creation; the session narrows this plan rather
        // than re-deriving it, so priorities stay stable for its
        // lifetime even if the catalog changes underneath.
        let mut pending = planner::plan(&definition);
        pending.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap_or(std::cmp::Ordering::Equal));

        let mut state = DocSessionState {
            active: true,
            thread_id: thread_id.to_string(),
            doc_type: doc_type.to_string(),
            definition,
            answers: BTreeMap::new(),
            dossier: BTreeMap::new(),
            pending_questions: pending,
            citations: Vec::new(),
            confidence: 0.0,
            ready_to_generate: false,
            phase: SessionPhase::Collecting,
            title: title.unwrap_or_default(),
            processed_message_ids: Vec::new(),
            last_asked_question_id: None,
            clarifying: BTreeMap::new(),
            assumed_fields: Vec::new(),
        };

        if state.definition.question_source == QuestionSourceKind::Blueprint {
            self.blueprint.refresh_questions(&mut state, &[]);
        }

        info!(
            "Session started: thread={}, doc_type={}, {} planned questions",
            thread_id,
            doc_type,
            state.pending_questions.len()
        );
        Ok(state)
    }

    /// Process one inbound message to completion. Value in, new value
    /// out: the caller replaces its stored state with the returned one.
    pub async fn process_turn(
        &self,
        mut state: DocSessionState,
        message: &InboundMessage,
    ) -> EngineResult<(DocSessionState, TurnOutcome)> {
        if state.phase == SessionPhase::Drafted || !state.active {
            warn!(
                "Turn ignored: session for thread {} is no longer active",
                state.thread_id
            );
            return Ok((state, TurnOutcome::Inactive));
        }

        // Dedup ledger: a message identity is processed at most once.
        let identity = message.identity();
        if state.has_processed(&identity) {
            debug!("Duplicate message {} for thread {}", identity, state.thread_id);
            return Ok((state, TurnOutcome::Duplicate));
        }
        state.processed_message_ids.push(identity);

        let now = unix_now();
        let ready_signal = is_readiness_utterance(&message.text);
        let prev_asked = state.last_asked_question_id.take();

        // Extraction failures are non-fatal: proceed with what the
        // session already has.
        let ctx = ExtractionContext::for_definition(&state.definition, &state.dossier);
        let extraction = match self.extractor.extract(&ctx, &message.text).await {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(
                    "Extraction failed for thread {} ({}): {:#}. Proceeding without new answers.",
                    state.thread_id,
                    self.extractor.name(),
                    e
                );
                Extraction::default()
            }
        };

        match state.definition.question_source {
            QuestionSourceKind::Catalog => {
                self.catalog_turn(state, message, extraction, prev_asked, ready_signal, now)
                    .await
            }
            QuestionSourceKind::Blueprint => {
                self.blueprint_turn(state, message, extraction, prev_asked, ready_signal, now)
                    .await
            }
        }
    }

    async fn catalog_turn(
        &self,
        mut state: DocSessionState,
        message: &InboundMessage,
        extraction: Extraction,
        prev_asked: Option<String>,
        ready_signal: bool,
        now: i64,
    ) -> EngineResult<(DocSessionState, TurnOutcome)> {
        // Merge extracted answers for declared fields.
        for answer in &extraction.answers {
            if answer.value.trim().is_empty() {
                continue;
            }
            if state.definition.field(&answer.field_id).is_none() {
                debug!("Dropping extracted answer for undeclared field '{}'", answer.field_id);
                continue;
            }
            record_answer(
                &mut state,
                &answer.field_id,
                answer.value.trim().to_string(),
                AnswerSource::User,
                answer.confidence,
                now,
            );
        }
        if let Some(title) = &extraction.title {
            if state.title.trim().is_empty() && !title.trim().is_empty() {
                state.title = title.trim().to_string();
            }
        }

        // The previously asked question gives the answer its context:
        // if extraction produced nothing for its targets, the literal
        // message text is still preserved against the first open target.
        if let Some(prev) = &prev_asked {
            if !ready_signal {
                self.apply_pending_preference(&mut state, prev, &extraction, &message.text, now);
            }
        }

        // Drop questions whose every target is now answered.
        let mut pending = std::mem::take(&mut state.pending_questions);
        pending.retain(|q| q.targets.iter().any(|t| state.field_value(t).is_none()));
        state.pending_questions = pending;

        let report = scoring::score(&state.definition, &state.dossier, &state.citations);
        state.confidence = report.overall;
        let missing = report.missing_required.clone();

        // Readiness is monotonic until the session is deactivated. Note
        // that running out of questions does not by itself force a
        // draft: with required fields unmet only an explicit readiness
        // utterance overrides, and below the threshold the engine keeps
        // confirming instead of silently drafting.
        state.ready_to_generate = state.ready_to_generate
            || (report.overall >= READY_THRESHOLD && missing.is_empty())
            || ready_signal;

        if state.ready_to_generate {
            return self.draft(state, missing).await;
        }
        state.phase = SessionPhase::Collecting;

        // Next question: head of the priority-descending plan, skipping
        // the question that was just cleared.
        let next = state
            .pending_questions
            .iter()
            .find(|q| prev_asked.as_deref() != Some(q.id.as_str()))
            .cloned();

        let outcome = match next {
            Some(item) => {
                state.last_asked_question_id = Some(item.id.clone());
                TurnOutcome::Questions {
                    questions: vec![item],
                    missing_required: missing,
                }
            }
            // Never a silent turn: with nothing left to ask but the
            // threshold unmet, surface what is still missing and where
            // the score stands, so the caller can ask for confirmation.
            None => TurnOutcome::MissingSummary {
                missing_required: missing,
                confidence: state.confidence,
            },
        };
        Ok((state, outcome))
    }

    async fn blueprint_turn(
        &self,
        mut state: DocSessionState,
        message: &InboundMessage,
        extraction: Extraction,
        prev_asked: Option<String>,
        ready_signal: bool,
        now: i64,
    ) -> EngineResult<(DocSessionState, TurnOutcome)> {
        self.blueprint.merge_extraction(&mut state, &extraction, now);

        // An authorization sentence is a directive, not an answer: like
        // a readiness utterance it must never be preserved as the
        // literal value of the question asked last turn.
        let assume_signal = authorizes_assumptions(&message.text);
        if let Some(prev) = &prev_asked {
            if !ready_signal && !assume_signal {
                self.apply_pending_preference(&mut state, prev, &extraction, &message.text, now);
            }
        }

        let assumed = if assume_signal {
            self.blueprint.inject_assumptions(&mut state, now)
        } else {
            Vec::new()
        };

        self.blueprint.refresh_questions(&mut state, &assumed);

        state.confidence = self.blueprint.coverage_confidence(&state);
        let missing = self.blueprint.missing_required(&state);

        state.ready_to_generate = state.ready_to_generate
            || (state.confidence / 100.0 >= READY_THRESHOLD && missing.is_empty())
            || ready_signal
            || !self.blueprint.has_pending(&state);

        if state.ready_to_generate {
            return self.draft(state, missing).await;
        }
        state.phase = SessionPhase::Collecting;

        let questions = self.blueprint.select_questions(&mut state, now);
        let first_id = questions.first().map(|q| q.id.clone());
        let outcome = match first_id {
            Some(id) => {
                state.last_asked_question_id = Some(id);
                TurnOutcome::Questions {
                    questions,
                    missing_required: missing,
                }
            }
            None => TurnOutcome::MissingSummary {
                missing_required: missing,
                confidence: state.confidence,
            },
        };
        Ok((state, outcome))
    }

    /// Merge externally gathered citations into a session, latest entry
    /// per id winning, and rescore so evidence is reflected immediately.
    pub fn add_citations(&self, state: &mut DocSessionState, citations: Vec<Citation>) {
        for citation in citations {
            match state.citations.iter_mut().find(|c| c.id == citation.id) {
                Some(existing) => *existing = citation,
                None => state.citations.push(citation),
            }
        }
        if state.definition.question_source == QuestionSourceKind::Catalog {
            let report = scoring::score(&state.definition, &state.dossier, &state.citations);
            state.confidence = report.overall;
        }
        info!(
            "Citations merged for thread {}: {} on record, confidence {}",
            state.thread_id,
            state.citations.len(),
            state.confidence
        );
    }

    /// Route the message to the question asked last turn when extraction
    /// gave its targets nothing, so the literal answer is never lost.
    fn apply_pending_preference(
        &self,
        state: &mut DocSessionState,
        prev_question_id: &str,
        extraction: &Extraction,
        message_text: &str,
        now: i64,
    ) {
        let targets: Vec<String> = match state.definition.question_source {
            QuestionSourceKind::Catalog => state
                .definition
                .questions
                .iter()
                .find(|q| q.id == prev_question_id)
                .map(|q| q.targets.clone())
                .unwrap_or_default(),
            // Blueprint questions target exactly their own field.
            QuestionSourceKind::Blueprint => vec![prev_question_id.to_string()],
        };
        if targets.is_empty() {
            return;
        }

        let extraction_covered = extraction
            .answers
            .iter()
            .any(|a| !a.value.trim().is_empty() && targets.iter().any(|t| *t == a.field_id));
        if extraction_covered {
            return;
        }

        let raw = message_text.trim();
        if raw.is_empty() {
            return;
        }

        let open_target = targets
            .iter()
            .find(|t| state.field_value(t.as_str()).is_none())
            .cloned();
        if let Some(target) = open_target {
            debug!(
                "Preserving raw answer for question '{}' into field '{}'",
                prev_question_id, target
            );
            let list_valued = match state.definition.question_source {
                QuestionSourceKind::Blueprint => self
                    .blueprint
                    .entries()
                    .iter()
                    .any(|e| e.field == target && e.list_valued),
                QuestionSourceKind::Catalog => false,
            };
            let value = crate::blueprint::merge_value(None, raw, list_valued);
            record_answer(state, &target, value, AnswerSource::User, 0.5, now);
        }
    }

    /// Hand the dossier to the renderer. On success the session is
    /// deactivated; on failure it stays ready so the caller can retry
    /// without re-asking anything.
    async fn draft(
        &self,
        mut state: DocSessionState,
        missing_required: Vec<String>,
    ) -> EngineResult<(DocSessionState, TurnOutcome)> {
        state.phase = SessionPhase::Ready;
        if !missing_required.is_empty() {
            info!(
                "Drafting with {} unresolved required fields (explicit user override): {:?}",
                missing_required.len(),
                missing_required
            );
        }

        let definition = state.definition.clone();
        match trigger_artifact(self.renderer.as_ref(), &definition, &state, missing_required).await
        {
            Ok(artifact) => {
                state.active = false;
                state.phase = SessionPhase::Drafted;
                info!(
                    "Session drafted: thread={}, doc_type={}",
                    state.thread_id, state.doc_type
                );
                Ok((state, TurnOutcome::Drafted { artifact }))
            }
            Err(EngineError::Render(reason)) => {
                warn!(
                    "Render failed for thread {} (session stays ready): {}",
                    state.thread_id, reason
                );
                Ok((state, TurnOutcome::RenderFailed { reason }))
            }
            Err(other) => Err(other),
        }
    }

    /// Explicitly clear a session: deactivate and discard collected state.
    pub fn reset(&self, state: &mut DocSessionState) {
        state.active = false;
        state.phase = SessionPhase::Uninitialized;
        state.answers.clear();
        state.dossier.clear();
        state.pending_questions.clear();
        state.citations.clear();
        state.clarifying.clear();
        state.assumed_fields.clear();
        state.confidence = 0.0;
        state.ready_to_generate = false;
        state.last_asked_question_id = None;
        info!("Session reset: thread={}", state.thread_id);
    }
}
