//! Document definition catalog: load, validate, lookup, listing
//!
//! The catalog source is a JSON document with a `doc_types` array. It is
//! loaded once, validated, and cached for the process lifetime; every
//! session holds `Arc` references into it and never copies or mutates a
//! definition.

use crate::error::{EngineError, EngineResult};
use crate::types::{DocTypeSummary, DocumentDefinition};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    doc_types: Vec<DocumentDefinition>,
}

/// Validated, immutable collection of document definitions.
#[derive(Debug)]
pub struct Catalog {
    by_id: HashMap<String, Arc<DocumentDefinition>>,
    order: Vec<String>,
}

static SHARED_CATALOG: OnceCell<Arc<Catalog>> = OnceCell::new();

impl Catalog {
    /// Load and validate a catalog from a JSON file.
    pub fn load_from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::CatalogLoad(format!("cannot read {}: {}", path.display(), e)))?;
        Self::load_from_str(&raw)
    }

    /// Load and validate a catalog from a raw JSON string.
    pub fn load_from_str(raw: &str) -> EngineResult<Self> {
        let file: CatalogFile = serde_json::from_str(raw)
            .map_err(|e| EngineError::CatalogLoad(format!("malformed catalog source: {}", e)))?;

        if file.doc_types.is_empty() {
            return Err(EngineError::CatalogLoad(
                "catalog declares no doc_types".to_string(),
            ));
        }

        let mut by_id = HashMap::new();
        let mut order = Vec::new();

        for mut def in file.doc_types {
            // Required/optional membership is positional in the source;
            // normalize the per-field flag from it.
            for f in &mut def.required_fields {
                f.required = true;
            }
            for f in &mut def.optional_fields {
                f.required = false;
            }

            validate_definition(&def)?;

            if by_id.contains_key(&def.id) {
                return Err(EngineError::CatalogLoad(format!(
                    "duplicate doc type id '{}'",
                    def.id
                )));
            }
            order.push(def.id.clone());
            by_id.insert(def.id.clone(), Arc::new(def));
        }

        info!("Catalog loaded: {} doc types", order.len());
        Ok(Self { by_id, order })
    }

    /// Built-in default catalog, used when no source path is configured
    /// and as a fixture for tests.
    pub fn builtin() -> Self {
        Self::load_from_str(BUILTIN_CATALOG).expect("builtin catalog must be valid")
    }

    /// Process-scoped shared catalog. The first caller pays the load
    /// cost; concurrent first-access performs exactly one load and
    /// every later caller hits the cache. The path argument is only
    /// consulted on that first load.
    pub fn shared(path: Option<&Path>) -> EngineResult<Arc<Catalog>> {
        SHARED_CATALOG
            .get_or_try_init(|| {
                let catalog = match path {
                    Some(p) => Catalog::load_from_path(p)?,
                    None => Catalog::builtin(),
                };
                Ok(Arc::new(catalog))
            })
            .map(Arc::clone)
    }

    /// Look up a definition by id.
    pub fn get(&self, id: &str) -> EngineResult<Arc<DocumentDefinition>> {
        self.by_id
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDocType {
                requested: id.to_string(),
                available: self.order.clone(),
            })
    }

    /// Listing projection, in catalog order.
    pub fn list(&self) -> Vec<DocTypeSummary> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .map(|def| DocTypeSummary {
                id: def.id.clone(),
                name: def.name.clone(),
                description: def.description.clone(),
                stage_hint: def.stage_hint.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn validate_definition(def: &DocumentDefinition) -> EngineResult<()> {
    let mut field_ids: HashSet<&str> = HashSet::new();
    for f in def.all_fields() {
        if !field_ids.insert(f.id.as_str()) {
            return Err(EngineError::CatalogLoad(format!(
                "doc type '{}': duplicate field id '{}'",
                def.id, f.id
            )));
        }
    }

    for q in &def.questions {
        for target in &q.targets {
            if !field_ids.contains(target.as_str()) {
                return Err(EngineError::CatalogLoad(format!(
                    "doc type '{}': question '{}' targets undeclared field '{}'",
                    def.id, q.id, target
                )));
            }
        }
    }

    Ok(())
}

/// Default catalog shipped with the engine. Kept small: one blueprint
/// intake type and two catalog-question types.
const BUILTIN_CATALOG: &str = r#"{
  "doc_types": [
    {
      "id": "project_brief",
      "name": "Project Brief",
      "description": "Free-form project intake distilled into a one-page brief",
      "stage_hint": "discovery",
      "template_ref": "templates/project_brief.md",
      "question_source": "blueprint",
      "required_fields": [
        {"id": "objective", "label": "Objective", "description": "What the project must achieve"},
        {"id": "audience", "label": "Audience", "description": "Who the outcome serves"},
        {"id": "scope", "label": "Scope", "description": "What is in and out of bounds"},
        {"id": "deliverables", "label": "Deliverables", "description": "Concrete outputs"},
        {"id": "success_criteria", "label": "Success criteria", "description": "How success is judged"}
      ],
      "optional_fields": [
        {"id": "timeline", "label": "Timeline"},
        {"id": "stakeholders", "label": "Stakeholders"},
        {"id": "constraints", "label": "Constraints"},
        {"id": "risks", "label": "Risks"}
      ]
    },
    {
      "id": "design_doc",
      "name": "Design Document",
      "description": "Technical design for a proposed change",
      "stage_hint": "planning",
      "template_ref": "templates/design_doc.md",
      "required_fields": [
        {"id": "problem_statement", "label": "Problem statement", "weight": 2},
        {"id": "proposed_approach", "label": "Proposed approach"},
        {"id": "success_criteria", "label": "Success criteria"}
      ],
      "optional_fields": [
        {"id": "alternatives", "label": "Alternatives considered"},
        {"id": "risks", "label": "Risks"},
        {"id": "rollout_plan", "label": "Rollout plan"}
      ],
      "questions": [
        {"id": "q_problem", "text": "What problem are we solving, and for whom?", "targets": ["problem_statement"]},
        {"id": "q_approach", "text": "What approach do you have in mind, and what alternatives did you rule out?", "targets": ["proposed_approach", "alternatives"]},
        {"id": "q_success", "text": "How will we know the design worked?", "targets": ["success_criteria"]},
        {"id": "q_rollout", "text": "How should this be rolled out, and what could go wrong?", "targets": ["rollout_plan", "risks"]}
      ],
      "research_prompts": [
        {"query": "prior art for the proposed approach", "applies_to": ["alternatives"]}
      ]
    },
    {
      "id": "decision_record",
      "name": "Decision Record",
      "description": "Lightweight record of a decision and its context",
      "stage_hint": "any",
      "template_ref": "templates/decision_record.md",
      "required_fields": [
        {"id": "context", "label": "Context"},
        {"id": "decision", "label": "Decision"},
        {"id": "consequences", "label": "Consequences"}
      ],
      "optional_fields": [
        {"id": "alternatives", "label": "Alternatives considered"}
      ],
      "questions": [
        {"id": "q_context", "text": "What situation forced this decision?", "targets": ["context"]},
        {"id": "q_decision", "text": "What was decided?", "targets": ["decision"]},
        {"id": "q_consequences", "text": "What follows from the decision, good and bad?", "targets": ["consequences", "alternatives"]}
      ]
    }
  ]
}"#;
