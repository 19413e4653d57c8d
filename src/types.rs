//! Core type definitions for guided document assembly

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One fact the document needs. Immutable once loaded from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Explicit weight from the catalog; when absent, required fields
    /// count as 1.0 and optional fields as 0.5.
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub required: bool,
}

impl RequirementSpec {
    pub fn effective_weight(&self) -> f64 {
        self.weight
            .unwrap_or(if self.required { 1.0 } else { 0.5 })
            .max(0.0)
    }
}

/// One diagnostic question; may satisfy multiple fields at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub id: String,
    pub text: String,
    pub targets: Vec<String>,
}

/// External-research hint; carried through but not processed by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPromptSpec {
    pub query: String,
    #[serde(default)]
    pub applies_to: Vec<String>,
}

/// Which question source drives clarification for a document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSourceKind {
    #[default]
    Catalog,
    Blueprint,
}

/// A document-type schema. Owned by the catalog, shared read-only
/// across sessions via `Arc` and never mutated after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stage_hint: Option<String>,
    pub template_ref: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub required_fields: Vec<RequirementSpec>,
    #[serde(default)]
    pub optional_fields: Vec<RequirementSpec>,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    #[serde(default)]
    pub research_prompts: Vec<ResearchPromptSpec>,
    #[serde(default)]
    pub question_source: QuestionSourceKind,
}

impl DocumentDefinition {
    /// All declared fields, required first, in catalog order.
    pub fn all_fields(&self) -> impl Iterator<Item = &RequirementSpec> {
        self.required_fields
            .iter()
            .chain(self.optional_fields.iter())
    }

    pub fn field(&self, field_id: &str) -> Option<&RequirementSpec> {
        self.all_fields().find(|f| f.id == field_id)
    }
}

/// Read-only catalog projection for listing endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct DocTypeSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub stage_hint: Option<String>,
}

/// A planned question with its derived priority. Computed when a
/// session is created, then narrowed (never re-derived) for its lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionPlanItem {
    pub id: String,
    pub text: String,
    pub targets: Vec<String>,
    pub priority: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub applies_to: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    User,
    Research,
    Assumption,
}

/// Latest value for a field plus its append-only timestamp history.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub field_id: String,
    pub value: String,
    pub source: AnswerSource,
    pub confidence: f64,
    pub timestamps: Vec<i64>,
}

/// Lifecycle phase of a doc session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Uninitialized,
    Collecting,
    Ready,
    Drafted,
}

/// Tracked clarifying question for the blueprint variant. Keyed by
/// field so repeated detection converges to one entry per field.
#[derive(Debug, Clone, Serialize)]
pub struct ClarifyingQuestion {
    pub field: String,
    pub question: String,
    pub rationale: String,
    pub required: bool,
    pub status: QuestionStatus,
    pub times_asked: u32,
    pub last_asked_at: Option<i64>,
    pub assumption_suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Pending,
    Answered,
    Assumed,
}

/// Aggregate session state for one conversation thread. Exclusively
/// owned and mutated by the session engine; the definition it points at
/// is shared read-only with every other session on the same doc type.
#[derive(Debug, Clone)]
pub struct DocSessionState {
    pub active: bool,
    pub thread_id: String,
    pub doc_type: String,
    pub definition: Arc<DocumentDefinition>,
    pub answers: BTreeMap<String, AnswerRecord>,
    /// Flattened current best-known value per field id.
    pub dossier: BTreeMap<String, String>,
    pub pending_questions: Vec<QuestionPlanItem>,
    pub citations: Vec<Citation>,
    pub confidence: f64,
    pub ready_to_generate: bool,
    pub phase: SessionPhase,
    pub title: String,
    /// Dedup ledger of processed inbound message identities.
    pub processed_message_ids: Vec<String>,
    pub last_asked_question_id: Option<String>,
    /// Blueprint-variant question tracking, keyed by field.
    pub clarifying: BTreeMap<String, ClarifyingQuestion>,
    /// Fields filled by assumption injection, in fill order.
    pub assumed_fields: Vec<String>,
}

impl DocSessionState {
    pub fn has_processed(&self, message_identity: &str) -> bool {
        self.processed_message_ids
            .iter()
            .any(|m| m == message_identity)
    }

    /// Current non-blank value for a field, if any.
    pub fn field_value(&self, field_id: &str) -> Option<&str> {
        self.dossier
            .get(field_id)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }
}

/// One inbound user message for a session turn.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
}

impl InboundMessage {
    /// Stable identity for the dedup ledger: the explicit id when
    /// present, otherwise derived from trailing message content.
    pub fn identity(&self) -> String {
        match &self.id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => {
                let trimmed = self.text.trim();
                let chars: Vec<char> = trimmed.chars().collect();
                let tail: String = chars[chars.len().saturating_sub(48)..].iter().collect();
                format!("tail:{}:{}", chars.len(), tail)
            }
        }
    }
}

/// What one processed turn produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Message identity already in the ledger; nothing changed.
    Duplicate,
    /// The session was already drafted or reset; the message was not
    /// processed.
    Inactive,
    /// One or more clarifying questions to surface this turn.
    Questions {
        questions: Vec<QuestionPlanItem>,
        missing_required: Vec<String>,
    },
    /// No question to ask but the session has not drafted: surface the
    /// missing-required list and the current confidence. With nothing
    /// missing this is a request for explicit confirmation.
    MissingSummary {
        missing_required: Vec<String>,
        confidence: f64,
    },
    /// The artifact was produced and the session deactivated.
    Drafted { artifact: ArtifactRef },
    /// Rendering failed; the session stays ready and the caller may
    /// retry the turn without re-answering anything.
    RenderFailed { reason: String },
}

/// Rendered artifact handed back to the caller. Unresolved required
/// fields ride along so the drafting layer can note them as assumptions.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRef {
    pub doc_type: String,
    pub title: String,
    pub text: String,
    pub assumed_fields: Vec<String>,
    pub missing_required: Vec<String>,
}

/// Composite readiness score for a dossier against a definition.
#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceReport {
    pub completeness: f64,
    pub evidence: f64,
    pub clarity: f64,
    pub overall: f64,
    pub missing_required: Vec<String>,
}

/// One proposed field value from the external answer extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedAnswer {
    pub field_id: String,
    pub value: String,
    #[serde(default = "default_extraction_confidence")]
    pub confidence: f64,
}

fn default_extraction_confidence() -> f64 {
    0.8
}

/// Extractor output for one message. Empty `answers` is valid and
/// means "no new information".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub answers: Vec<ExtractedAnswer>,
    #[serde(default)]
    pub title: Option<String>,
}
