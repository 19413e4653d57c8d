//! Clarification blueprint engine: assumption-aware question source
//!
//! Document types that need richer, hand-authored intake prompts than
//! catalog-declared questions use a static, priority-ordered blueprint.
//! Each entry knows its question, its rationale, whether it is required,
//! and a documented default that may be injected when the user authorizes
//! proceeding with assumptions.

use crate::scoring::is_placeholder;
use crate::types::{
    AnswerRecord, AnswerSource, ClarifyingQuestion, DocSessionState, Extraction, QuestionPlanItem,
    QuestionStatus,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Maximum clarifying questions surfaced in a single turn.
pub const MAX_QUESTIONS_PER_TURN: usize = 4;

pub type FollowUpFn = fn(&BTreeMap<String, String>) -> bool;

/// One hand-authored blueprint entry. Lower `priority` asks earlier.
pub struct BlueprintEntry {
    pub field: &'static str,
    pub question: &'static str,
    pub rationale: &'static str,
    pub required: bool,
    pub assumption_suggestion: &'static str,
    pub priority: u32,
    pub list_valued: bool,
    /// Custom follow-up predicate; `None` means "needed while blank".
    pub follow_up: Option<FollowUpFn>,
}

impl BlueprintEntry {
    pub fn follow_up_needed(&self, inputs: &BTreeMap<String, String>) -> bool {
        match self.follow_up {
            Some(f) => f(inputs),
            None => field_blank(inputs, self.field),
        }
    }
}

fn field_blank(inputs: &BTreeMap<String, String>, field: &str) -> bool {
    inputs.get(field).map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn success_criteria_follow_up(inputs: &BTreeMap<String, String>) -> bool {
    // A placeholder is not an acceptable success criterion.
    inputs
        .get("success_criteria")
        .map(|v| v.trim().is_empty() || is_placeholder(v))
        .unwrap_or(true)
}

/// Project-intake blueprint backing the `project_brief` doc type.
pub static PROJECT_INTAKE: &[BlueprintEntry] = &[
    BlueprintEntry {
        field: "objective",
        question: "What outcome should this project achieve?",
        rationale: "Anchors scope, deliverables, and success criteria",
        required: true,
        assumption_suggestion: "Ship an initial version the team can evaluate end to end",
        priority: 1,
        list_valued: false,
        follow_up: None,
    },
    BlueprintEntry {
        field: "audience",
        question: "Who is the primary audience for the result?",
        rationale: "The audience decides what counts as done",
        required: true,
        assumption_suggestion: "The internal team sponsoring the project",
        priority: 2,
        list_valued: false,
        follow_up: None,
    },
    BlueprintEntry {
        field: "scope",
        question: "What is in scope, and what is explicitly out?",
        rationale: "Unstated scope is the usual source of drift",
        required: true,
        assumption_suggestion: "Core workflow only; integrations and polish out of scope",
        priority: 3,
        list_valued: false,
        follow_up: None,
    },
    BlueprintEntry {
        field: "deliverables",
        question: "What concrete deliverables should exist at the end?",
        rationale: "Deliverables make the brief checkable",
        required: true,
        assumption_suggestion: "Working prototype, short written summary",
        priority: 4,
        list_valued: true,
        follow_up: None,
    },
    BlueprintEntry {
        field: "success_criteria",
        question: "How will you judge whether the project succeeded?",
        rationale: "Without criteria the brief cannot be closed out",
        required: true,
        assumption_suggestion: "Sponsor sign-off after an end-to-end demo",
        priority: 5,
        list_valued: false,
        follow_up: Some(success_criteria_follow_up),
    },
    BlueprintEntry {
        field: "timeline",
        question: "Is there a target timeline or hard deadline?",
        rationale: "Schedule pressure changes every other answer",
        required: false,
        assumption_suggestion: "Four to six weeks from kickoff",
        priority: 6,
        list_valued: false,
        follow_up: None,
    },
    BlueprintEntry {
        field: "stakeholders",
        question: "Who are the stakeholders that need to stay informed?",
        rationale: "Surprised stakeholders stall projects",
        required: false,
        assumption_suggestion: "Project sponsor, delivery team",
        priority: 7,
        list_valued: true,
        follow_up: None,
    },
    BlueprintEntry {
        field: "constraints",
        question: "Any constraints we must work within (tooling, budget, policy)?",
        rationale: "Constraints bound the solution space",
        required: false,
        assumption_suggestion: "Existing tooling and current team capacity",
        priority: 8,
        list_valued: true,
        follow_up: None,
    },
    BlueprintEntry {
        field: "risks",
        question: "What risks worry you most going in?",
        rationale: "Named risks get mitigations; unnamed ones get postmortems",
        required: false,
        assumption_suggestion: "Schedule slip from under-specified requirements",
        priority: 9,
        list_valued: true,
        follow_up: None,
    },
];

static EXPLICIT_ASSUME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\byou can assume\b").unwrap());
static DIRECTIVE_VERB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(proceed|continue|go ahead|move on)\b").unwrap());
static ASSUMPTION_VERB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(assum\w*|estimat\w*|decid\w*|guess\w*)\b").unwrap());

/// Does the message authorize filling missing fields with defaults?
/// Either explicit "you can assume ..." phrasing, or a directive verb
/// co-occurring with an assumption-related verb.
pub fn authorizes_assumptions(text: &str) -> bool {
    EXPLICIT_ASSUME.is_match(text)
        || (DIRECTIVE_VERB.is_match(text) && ASSUMPTION_VERB.is_match(text))
}

/// Merge an incoming value into the current one under the per-field
/// merge rule: scalars overwrite, lists union-and-dedupe preserving
/// first-seen order.
pub fn merge_value(existing: Option<&str>, incoming: &str, list_valued: bool) -> String {
    if !list_valued {
        return incoming.trim().to_string();
    }

    let mut items: Vec<String> = Vec::new();
    let mut absorb = |raw: &str| {
        for part in raw.split(['\n', ',', ';']) {
            let item = part.trim();
            if item.is_empty() {
                continue;
            }
            if !items.iter().any(|seen| seen.eq_ignore_ascii_case(item)) {
                items.push(item.to_string());
            }
        }
    };

    if let Some(current) = existing {
        absorb(current);
    }
    absorb(incoming);
    items.join(", ")
}

/// Question source driven by a static blueprint.
pub struct BlueprintQuestionSource {
    entries: &'static [BlueprintEntry],
}

impl BlueprintQuestionSource {
    pub fn new(entries: &'static [BlueprintEntry]) -> Self {
        Self { entries }
    }

    pub fn project_intake() -> Self {
        Self::new(PROJECT_INTAKE)
    }

    pub fn entries(&self) -> &'static [BlueprintEntry] {
        self.entries
    }

    fn entry(&self, field: &str) -> Option<&'static BlueprintEntry> {
        self.entries.iter().find(|e| e.field == field)
    }

    /// Merge extracted answers into the session under per-field rules,
    /// appending to each touched field's timestamp history.
    pub fn merge_extraction(&self, state: &mut DocSessionState, extraction: &Extraction, now: i64) {
        for answer in &extraction.answers {
            if answer.value.trim().is_empty() {
                continue;
            }
            let list_valued = self
                .entry(&answer.field_id)
                .map(|e| e.list_valued)
                .unwrap_or(false);
            let merged = merge_value(
                state.dossier.get(&answer.field_id).map(|v| v.as_str()),
                &answer.value,
                list_valued,
            );
            record_answer(
                state,
                &answer.field_id,
                merged,
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
    }

    /// Fill every entry still flagged follow-up-needed with its
    /// documented default. Returns the fields filled, in blueprint order.
    pub fn inject_assumptions(&self, state: &mut DocSessionState, now: i64) -> Vec<String> {
        let mut filled = Vec::new();
        for entry in self.entries {
            if !entry.follow_up_needed(&state.dossier) {
                continue;
            }
            record_answer(
                state,
                entry.field,
                entry.assumption_suggestion.to_string(),
                AnswerSource::Assumption,
                0.5,
                now,
            );
            if !state.assumed_fields.iter().any(|f| f == entry.field) {
                state.assumed_fields.push(entry.field.to_string());
            }
            filled.push(entry.field.to_string());
        }
        if !filled.is_empty() {
            info!("Assumption injection filled {} fields: {:?}", filled.len(), filled);
        }
        filled
    }

    /// Recompute the tracked question map. Convergent: one entry per
    /// field regardless of how many turns re-detect the same gap.
    pub fn refresh_questions(&self, state: &mut DocSessionState, just_assumed: &[String]) {
        for entry in self.entries {
            let status = if entry.follow_up_needed(&state.dossier) {
                QuestionStatus::Pending
            } else if just_assumed.iter().any(|f| f == entry.field) {
                QuestionStatus::Assumed
            } else {
                QuestionStatus::Answered
            };

            let tracked = state
                .clarifying
                .entry(entry.field.to_string())
                .or_insert_with(|| ClarifyingQuestion {
                    field: entry.field.to_string(),
                    question: entry.question.to_string(),
                    rationale: entry.rationale.to_string(),
                    required: entry.required,
                    status: QuestionStatus::Pending,
                    times_asked: 0,
                    last_asked_at: None,
                    assumption_suggestion: Some(entry.assumption_suggestion.to_string()),
                });
            tracked.status = status;
        }
    }

    /// Select up to [`MAX_QUESTIONS_PER_TURN`] pending questions,
    /// ordered by blueprint priority then by ascending times-asked.
    /// Only never-yet-asked or required questions surface, so optional
    /// gaps are not re-nagged. `times_asked` and `last_asked_at` bump
    /// at selection time, not at answer time.
    pub fn select_questions(&self, state: &mut DocSessionState, now: i64) -> Vec<QuestionPlanItem> {
        let mut eligible: Vec<&'static BlueprintEntry> = self
            .entries
            .iter()
            .filter(|entry| {
                state
                    .clarifying
                    .get(entry.field)
                    .map(|q| {
                        q.status == QuestionStatus::Pending && (q.times_asked == 0 || q.required)
                    })
                    .unwrap_or(false)
            })
            .collect();

        eligible.sort_by_key(|entry| {
            let asked = state
                .clarifying
                .get(entry.field)
                .map(|q| q.times_asked)
                .unwrap_or(0);
            (entry.priority, asked)
        });
        eligible.truncate(MAX_QUESTIONS_PER_TURN);

        let mut selected = Vec::new();
        for entry in eligible {
            if let Some(tracked) = state.clarifying.get_mut(entry.field) {
                tracked.times_asked += 1;
                tracked.last_asked_at = Some(now);
            }
            selected.push(QuestionPlanItem {
                id: entry.field.to_string(),
                text: entry.question.to_string(),
                targets: vec![entry.field.to_string()],
                priority: entry.priority as f64,
            });
        }
        debug!("Blueprint selected {} questions", selected.len());
        selected
    }

    /// Required-field coverage ratio, scaled to 0..100.
    pub fn coverage_confidence(&self, state: &DocSessionState) -> f64 {
        let required: Vec<&BlueprintEntry> =
            self.entries.iter().filter(|e| e.required).collect();
        if required.is_empty() {
            return 100.0;
        }
        let covered = required
            .iter()
            .filter(|e| !e.follow_up_needed(&state.dossier))
            .count();
        covered as f64 / required.len() as f64 * 100.0
    }

    /// Required fields still flagged follow-up-needed, in blueprint order.
    pub fn missing_required(&self, state: &DocSessionState) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.required && e.follow_up_needed(&state.dossier))
            .map(|e| e.field.to_string())
            .collect()
    }

    /// Any entry still needing follow-up?
    pub fn has_pending(&self, state: &DocSessionState) -> bool {
        self.entries
            .iter()
            .any(|e| e.follow_up_needed(&state.dossier))
    }
}

/// Record a value for a field: latest value wins, timestamp history
/// appends, dossier stays in sync.
pub(crate) fn record_answer(
    state: &mut DocSessionState,
    field_id: &str,
    value: String,
    source: AnswerSource,
    confidence: f64,
    now: i64,
) {
    let record = state
        .answers
        .entry(field_id.to_string())
        .or_insert_with(|| AnswerRecord {
            field_id: field_id.to_string(),
            value: String::new(),
            source,
            confidence,
            timestamps: Vec::new(),
        });
    record.value = value.clone();
    record.source = source;
    record.confidence = confidence;
    record.timestamps.push(now);
    state.dossier.insert(field_id.to_string(), value);
}
