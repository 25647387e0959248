use crate::gates::GateKind;
use crate::session::{ResumeAction, Session, StepResult};
use crate::step::StepNumber;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// How a run (or a resumed run) ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// All ten stages finished.
    Completed {
        total_duration_ms: u64,
        final_audit: Option<Value>,
    },
    /// A stage failed, or a stage's dependencies had not passed.
    Failed {
        step: StepNumber,
        step_name: String,
        error: String,
    },
    /// A gate denied progression.
    Blocked { gate: GateKind, blockers: Vec<String> },
    /// The session paused after `step` for a human decision.
    AwaitingApproval {
        step: StepNumber,
        step_name: String,
        result: StepResult,
        available_actions: Vec<ResumeAction>,
        editable_fields: Vec<String>,
        help_text: String,
        next_step: Option<StepNumber>,
    },
    /// The reviewer aborted the session while paused at `step`.
    Aborted { step: StepNumber },
}

impl PipelineOutcome {
    pub fn awaiting(result: StepResult) -> Self {
        let step = result.step_number;
        let spec = step.spec();
        PipelineOutcome::AwaitingApproval {
            step,
            step_name: spec.name.to_string(),
            available_actions: ResumeAction::all().to_vec(),
            editable_fields: spec.editable_fields.iter().map(|f| f.to_string()).collect(),
            help_text: spec.help_text.to_string(),
            next_step: step.next(),
            result,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineOutcome::Completed { .. } => "completed",
            PipelineOutcome::Failed { .. } => "failed",
            PipelineOutcome::Blocked { .. } => "blocked",
            PipelineOutcome::AwaitingApproval { .. } => "awaiting_approval",
            PipelineOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// A session together with how its latest run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub session: Session,
    pub outcome: PipelineOutcome,
}

impl PipelineResult {
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::Completed { .. })
    }

    pub fn is_awaiting_approval(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::AwaitingApproval { .. })
    }

    /// Caller-facing JSON payload.
    pub fn to_response_json(&self) -> Value {
        let session = &self.session;
        let mut response = json!({
            "success": self.is_completed(),
            "status": session.status,
            "session_id": session.id,
            "intervention_mode": session.intervention_mode,
        });

        let details = match &self.outcome {
            PipelineOutcome::Completed {
                total_duration_ms,
                final_audit,
            } => json!({
                "results": session.step_results,
                "total_duration_ms": total_duration_ms,
                "final_audit": final_audit,
                "message": "Drawing analysis completed",
            }),
            PipelineOutcome::Failed { step, step_name, error } => json!({
                "failed_at_step": step,
                "step_name": step_name,
                "error": error,
                "partial_results": session.step_results,
                "message": format!("Pipeline failed at step {}: {}", step, step_name),
            }),
            PipelineOutcome::Blocked { gate, blockers } => json!({
                "blocked_at_gate": gate,
                "blockers": blockers,
                "partial_results": session.step_results,
                "message": format!("Pipeline blocked at gate: {}. Resolve blockers before proceeding.", gate),
            }),
            PipelineOutcome::AwaitingApproval {
                step,
                step_name,
                result,
                available_actions,
                editable_fields,
                help_text,
                next_step,
            } => json!({
                "paused_at_step": step,
                "step_name": step_name,
                "step_result": result,
                "available_actions": available_actions,
                "editable_fields": editable_fields,
                "help_text": help_text,
                "next_step": next_step,
                "message": format!("Paused after step {}: {}. Review and approve to continue.", step, step_name),
            }),
            PipelineOutcome::Aborted { step } => json!({
                "aborted_at_step": step,
                "message": "Pipeline aborted by user",
            }),
        };

        if let (Value::Object(response), Value::Object(details)) = (&mut response, details) {
            response.extend(details);
        }
        response
    }
}

/// Results of a standalone subset run.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRunResult {
    pub session: Session,
    /// Only the stages executed by this run.
    pub results: BTreeMap<StepNumber, StepResult>,
}

impl PartialRunResult {
    pub fn all_passed(&self) -> bool {
        self.results.values().all(StepResult::is_passed)
    }
}
