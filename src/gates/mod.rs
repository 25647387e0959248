//! Hard stops between pipeline stages.
//!
//! Two gates guard the pipeline:
//! - the intent gate reads the verdict produced by stage 4 before entity
//!   extraction starts
//! - the component gate requires stages 1-8 to have passed before component
//!   extraction starts
//!
//! Both fail closed: missing or malformed data denies progression.

pub mod prompt;

pub use prompt::ApprovalPrompt;

use crate::session::{StepResult, StepStatus};
use crate::step::StepNumber;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    IntentValidation,
    ComponentExtraction,
}

impl GateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntentValidation => "intent_validation",
            Self::ComponentExtraction => "component_extraction",
        }
    }

    /// The stage whose entry this gate guards.
    pub fn guards(&self) -> StepNumber {
        match self {
            Self::IntentValidation => StepNumber::ENTITY_EXTRACTION,
            Self::ComponentExtraction => StepNumber::COMPONENT_GATE,
        }
    }
}

impl std::fmt::Display for GateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict of one gate evaluation. Transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub gate: GateKind,
    pub allowed: bool,
    pub blockers: Vec<String>,
}

impl GateDecision {
    fn allow(gate: GateKind) -> Self {
        Self {
            gate,
            allowed: true,
            blockers: Vec::new(),
        }
    }

    fn deny(gate: GateKind, blockers: Vec<String>) -> Self {
        Self {
            gate,
            allowed: false,
            blockers,
        }
    }
}

/// Evaluate the intent gate against stage 4's data.
///
/// Progression is allowed only when `can_proceed.extraction_allowed` is the
/// boolean `true`. Denials carry the stage's `blockers`, or a synthetic one
/// when the stage supplied none.
pub fn evaluate_intent_gate(validation: Option<&Value>) -> GateDecision {
    let gate = GateKind::IntentValidation;
    let Some(data) = validation else {
        return GateDecision::deny(gate, vec!["Drawing intent validation produced no data".to_string()]);
    };

    let allowed = data
        .get("can_proceed")
        .and_then(|c| c.get("extraction_allowed"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if allowed {
        return GateDecision::allow(gate);
    }

    let mut blockers: Vec<String> = match data.get("blockers") {
        Some(Value::Array(items)) => items.iter().map(blocker_text).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![blocker_text(other)],
    };
    if blockers.is_empty() {
        blockers.push("Drawing intent validation did not allow extraction".to_string());
    }
    GateDecision::deny(gate, blockers)
}

/// Evaluate the component gate: every stage before 9 must have passed.
pub fn evaluate_component_gate(results: &BTreeMap<StepNumber, StepResult>) -> GateDecision {
    let gate = GateKind::ComponentExtraction;
    let not_passed: Vec<String> = StepNumber::COMPONENT_GATE
        .predecessors()
        .filter_map(|step| match results.get(&step) {
            Some(r) if r.status == StepStatus::Passed => None,
            Some(r) => Some(format!("Step {} ({}) is {}", step, step.name(), r.status.as_str())),
            None => Some(format!("Step {} ({}) has not run", step, step.name())),
        })
        .collect();

    if not_passed.is_empty() {
        return GateDecision::allow(gate);
    }
    let mut blockers = vec!["Prior steps must pass before component extraction".to_string()];
    blockers.extend(not_passed);
    GateDecision::deny(gate, blockers)
}

fn blocker_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
