//! Question planner: turns a definition's diagnostic questions into a
//! prioritized plan

use crate::types::{DocumentDefinition, QuestionPlanItem};

/// Build the question plan for a definition.
///
/// `priority = Σ effective weight of targeted fields + 1/(1+index)`.
/// The additive index term is a stable tie-breaker that preserves
/// catalog-declared order among equal-weight questions. Output is not
/// pre-sorted; callers sort descending by priority when building an
/// execution order.
pub fn plan(definition: &DocumentDefinition) -> Vec<QuestionPlanItem> {
    definition
        .questions
        .iter()
        .enumerate()
        .map(|(index, q)| {
            let weight_sum: f64 = q
                .targets
                .iter()
                .filter_map(|t| definition.field(t))
                .map(|f| f.effective_weight())
                .sum();
            QuestionPlanItem {
                id: q.id.clone(),
                text: q.text.clone(),
                targets: q.targets.clone(),
                priority: weight_sum + 1.0 / (1.0 + index as f64),
            }
        })
        .collect()
}
