use super::PipelineEngine;
use crate::errors::StepDataError;
use crate::intervention::has_warnings;
use crate::session::{
    ApprovalRecord, InterventionMode, PipelineState, Session, SessionStatus, StepResult, StepStatus,
};
use crate::step::{STEP_COUNT, STEP_SPECS, StepNumber};
use crate::util::deep_merge;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One stage's result prepared for a reviewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReview {
    pub step: StepNumber,
    pub step_name: String,
    pub status: StepStatus,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub edited: bool,
    pub is_gate: bool,
    pub has_warnings: bool,
    pub editable_fields: Vec<String>,
    pub help_text: String,
}

/// Compact progress view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub intervention_mode: InterventionMode,
    pub paused_at_step: Option<StepNumber>,
    pub completed_steps: Vec<StepNumber>,
    pub step_statuses: BTreeMap<StepNumber, StepStatus>,
    pub total_steps: u8,
    pub progress_percent: u8,
    pub approval_count: usize,
    pub has_edits: bool,
    pub started_at: DateTime<Utc>,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Everything a persistence collaborator needs to store an analysed drawing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistenceExport {
    pub session_id: String,
    pub status: SessionStatus,
    pub pipeline_state: PipelineState,
    pub step_results: BTreeMap<StepNumber, StepResult>,
    pub approval_history: Vec<ApprovalRecord>,
    /// Stage data under stable names; always has all ten keys.
    pub extracted_data: BTreeMap<String, Value>,
}

impl PipelineEngine {
    /// Merge `updates` into an executed stage's data and mark it edited.
    pub fn update_step_data(
        &self,
        session: &mut Session,
        step: StepNumber,
        updates: Value,
    ) -> Result<(), StepDataError> {
        let result = session
            .step_results
            .get_mut(&step)
            .ok_or(StepDataError::NotExecuted(step))?;
        match result.data.as_mut() {
            Some(data) => deep_merge(data, updates),
            None => result.data = Some(updates),
        }
        result.edited = true;
        result.edit_timestamp = Some(Utc::now());
        session.debug(format!("Step {} data updated", step), Value::Null);
        Ok(())
    }

    pub fn get_step_for_review(&self, session: &Session, step: StepNumber) -> Result<StepReview, StepDataError> {
        let result = session.result(step).ok_or(StepDataError::NotExecuted(step))?;
        let spec = step.spec();
        Ok(StepReview {
            step,
            step_name: spec.name.to_string(),
            status: result.status,
            data: result.data.clone(),
            error: result.error.clone(),
            duration_ms: result.duration_ms,
            edited: result.edited,
            is_gate: step.is_gate(),
            has_warnings: has_warnings(result),
            editable_fields: spec.editable_fields.iter().map(|f| f.to_string()).collect(),
            help_text: spec.help_text.to_string(),
        })
    }

    pub fn state_summary(&self, session: &Session) -> StateSummary {
        let completed_steps = session.passed_steps();
        let progress_percent = u8::try_from(completed_steps.len() * 100 / usize::from(STEP_COUNT)).unwrap_or(100);
        StateSummary {
            session_id: session.id.clone(),
            status: session.status,
            intervention_mode: session.intervention_mode,
            paused_at_step: session.paused_at_step,
            step_statuses: session
                .step_results
                .iter()
                .map(|(step, r)| (*step, r.status))
                .collect(),
            completed_steps,
            total_steps: STEP_COUNT,
            progress_percent,
            approval_count: session.approval_history.len(),
            has_edits: session.has_edits(),
            started_at: session.pipeline_state.started_at,
            saved_at: session.saved_at,
        }
    }

    pub fn export_for_persistence(&self, session: &Session) -> PersistenceExport {
        let extracted_data = STEP_SPECS
            .iter()
            .zip(StepNumber::all())
            .map(|(spec, step)| {
                let data = session.step_data(step).cloned().unwrap_or(Value::Null);
                (spec.export_key.to_string(), data)
            })
            .collect();

        PersistenceExport {
            session_id: session.id.clone(),
            status: session.status,
            pipeline_state: session.pipeline_state.clone(),
            step_results: session.step_results.clone(),
            approval_history: session.approval_history.clone(),
            extracted_data,
        }
    }
}
