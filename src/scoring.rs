//! Confidence scoring for a dossier against a definition
//!
//! Pure functions of their inputs; no side effects.

use crate::types::{Citation, ConfidenceReport, DocumentDefinition};
use std::collections::BTreeMap;

/// Policy weights for the composite score. Design policy, not a law of
/// nature; callers that need different behavior override at this seam.
pub const COMPLETENESS_WEIGHT: f64 = 0.5;
pub const EVIDENCE_WEIGHT: f64 = 0.3;
pub const CLARITY_WEIGHT: f64 = 0.2;

/// Overall-confidence gate for drafting.
pub const READY_THRESHOLD: f64 = 0.75;

/// Values treated as placeholders rather than real answers.
pub const PLACEHOLDER_VALUES: [&str; 4] = ["tbd", "to be determined", "lorem ipsum", "fill me"];

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn is_placeholder(value: &str) -> bool {
    let normalized = value.trim().to_lowercase();
    PLACEHOLDER_VALUES.iter().any(|p| *p == normalized)
}

/// Compute the composite readiness score.
pub fn score(
    definition: &DocumentDefinition,
    dossier: &BTreeMap<String, String>,
    citations: &[Citation],
) -> ConfidenceReport {
    let has_value = |field_id: &str| {
        dossier
            .get(field_id)
            .map(|v| !is_blank(v))
            .unwrap_or(false)
    };

    // Completeness: weighted coverage of required fields.
    let required_total: f64 = definition
        .required_fields
        .iter()
        .map(|f| f.effective_weight())
        .sum();
    let required_filled: f64 = definition
        .required_fields
        .iter()
        .filter(|f| has_value(&f.id))
        .map(|f| f.effective_weight())
        .sum();
    let completeness = if required_total > 0.0 {
        required_filled / required_total
    } else {
        0.0
    };

    // Evidence: among valued fields, the fraction backed by a citation.
    let valued: Vec<&str> = definition
        .all_fields()
        .filter(|f| has_value(&f.id))
        .map(|f| f.id.as_str())
        .collect();
    let evidence = if valued.is_empty() {
        0.0
    } else {
        let cited = valued
            .iter()
            .filter(|fid| {
                citations
                    .iter()
                    .any(|c| c.applies_to.iter().any(|a| a == *fid))
            })
            .count();
        cited as f64 / valued.len() as f64
    };

    // Clarity: share of dossier entries that are real answers.
    let vague = dossier
        .values()
        .filter(|v| is_blank(v) || is_placeholder(v))
        .count();
    let clarity = 1.0 - vague as f64 / dossier.len().max(1) as f64;

    let overall = round3(
        COMPLETENESS_WEIGHT * completeness + EVIDENCE_WEIGHT * evidence + CLARITY_WEIGHT * clarity,
    );

    let missing_required = definition
        .required_fields
        .iter()
        .filter(|f| !has_value(&f.id))
        .map(|f| f.id.clone())
        .collect();

    ConfidenceReport {
        completeness,
        evidence,
        clarity,
        overall,
        missing_required,
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
