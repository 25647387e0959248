use super::PipelineEngine;
use super::outcome::{PipelineOutcome, PipelineResult};
use crate::errors::{ResumeError, StepDataError};
use crate::session::{
    ApprovalRecord, DrawingInput, InterventionMode, ResultSource, ResumeAction, Session, SessionStatus, StepResult,
    StepStatus,
};
use crate::step::StepNumber;
use crate::util::{deep_merge, is_empty_payload};
use chrono::Utc;
use serde_json::{Value, json};

impl PipelineEngine {
    /// Continue a paused session with a reviewer decision.
    ///
    /// `action` is one of `approve`, `edit`, `retry`, `skip`, `abort`. Invalid
    /// actions and sessions that are not paused are rejected without touching
    /// the stored session.
    pub async fn resume_after_intervention(
        &self,
        session_id: &str,
        action: &str,
        edited_data: Option<Value>,
    ) -> Result<PipelineResult, ResumeError> {
        let action: ResumeAction = action.parse()?;
        self.resume(session_id, action, edited_data).await
    }

    /// Typed form of [`resume_after_intervention`](Self::resume_after_intervention).
    pub async fn resume(
        &self,
        session_id: &str,
        action: ResumeAction,
        edited_data: Option<Value>,
    ) -> Result<PipelineResult, ResumeError> {
        let mut session = self.load_session(session_id).await?;
        let step = session
            .paused_at_step
            .filter(|_| session.status == SessionStatus::AwaitingApproval)
            .ok_or_else(|| ResumeError::NoPausedStep {
                session_id: session_id.to_string(),
            })?;

        let edits = edited_data.filter(|v| !is_empty_payload(v));
        session.approval_history.push(ApprovalRecord {
            step,
            action,
            timestamp: Utc::now(),
            had_edits: edits.is_some(),
        });
        tracing::info!(session_id, step = %step, action = %action, "Resuming session");
        session.debug(
            format!("Resuming from step {} with action: {}", step, action),
            json!({"had_edits": edits.is_some()}),
        );

        let next = match action {
            ResumeAction::Approve => step.next(),
            ResumeAction::Edit => {
                if let Some(updates) = edits {
                    self.apply_edit(&mut session, step, updates).await?;
                }
                step.next()
            }
            ResumeAction::Retry => Some(step),
            ResumeAction::Skip => {
                mark_skipped(&mut session, step);
                step.next()
            }
            ResumeAction::Abort => {
                tracing::info!(session_id, step = %step, "Session aborted");
                session.status = SessionStatus::Failed;
                session.paused_at_step = None;
                self.cache.save_session(&mut session).await?;
                return Ok(PipelineResult {
                    session,
                    outcome: PipelineOutcome::Aborted { step },
                });
            }
        };

        let input = self.cache.cached_input(session_id).await?;
        let outcome = self.drive(&mut session, input.as_ref(), next).await?;
        Ok(PipelineResult { session, outcome })
    }

    /// Restart a session at `start`, rebuilding earlier stage results from the
    /// per-stage cache. Execution restarts at the first earlier stage with no
    /// cached output. A session with no stored state starts fresh under the
    /// given id.
    pub async fn resume_from_step(
        &self,
        session_id: &str,
        start: StepNumber,
        input: Option<DrawingInput>,
    ) -> Result<PipelineResult, ResumeError> {
        let mut session = match self.cache.load_session(session_id).await? {
            Some(session) => session,
            None => {
                let kind = input.as_ref().map_or("single_image", DrawingInput::kind);
                let mut session = Session::new(
                    session_id,
                    InterventionMode::None,
                    crate::session::DEFAULT_PURPOSES.iter().map(|p| p.to_string()).collect(),
                    kind,
                    true,
                );
                session.debug = self.debug;
                session
            }
        };

        let input = match input {
            Some(input) => {
                self.cache.cache_input(session_id, &input).await?;
                Some(input)
            }
            None => self.cache.cached_input(session_id).await?,
        };

        let mut restart = start;
        for step in start.predecessors() {
            match self.cache.cached_step(session_id, step).await? {
                Some(data) => {
                    let mut result = StepResult::seeded(step, data, ResultSource::Cached);
                    if let Some(previous) = session.result(step) {
                        result.edited = previous.edited;
                        result.edit_timestamp = previous.edit_timestamp;
                    }
                    session.step_results.insert(step, result);
                }
                None => {
                    tracing::info!(session_id, step = %step, "No cached output, restarting from this step");
                    restart = step;
                    break;
                }
            }
        }
        session.step_results.retain(|step, _| *step < restart);

        tracing::info!(session_id, step = %restart, "Resuming from step");
        session.debug(format!("Resuming from step {}", restart), json!({"requested": start}));
        let outcome = self.drive(&mut session, input.as_ref(), Some(restart)).await?;
        Ok(PipelineResult { session, outcome })
    }

    /// Load a session, merge `updates` into one stage's data, and persist it.
    pub async fn update_session_step(
        &self,
        session_id: &str,
        step: StepNumber,
        updates: Value,
    ) -> Result<Session, StepDataError> {
        let mut session = self.load_session(session_id).await?;
        self.update_step_data(&mut session, step, updates)?;
        if let Some(data) = session.step_data(step) {
            self.cache
                .cache_step(session_id, step, data)
                .await
                .map_err(ResumeError::from)?;
        }
        self.cache
            .save_session(&mut session)
            .await
            .map_err(ResumeError::from)?;
        Ok(session)
    }

    async fn apply_edit(&self, session: &mut Session, step: StepNumber, updates: Value) -> Result<(), ResumeError> {
        let now = Utc::now();
        let result = session
            .step_results
            .entry(step)
            .or_insert_with(|| StepResult::seeded(step, json!({}), ResultSource::Executed));

        match result.data.as_mut() {
            Some(data) => deep_merge(data, updates),
            None => result.data = Some(updates),
        }
        // Reviewer-supplied output stands in for a failed stage's output.
        if result.status == StepStatus::Failed {
            result.status = StepStatus::Passed;
            result.error = None;
        }
        result.edited = true;
        result.edit_timestamp = Some(now);

        if let Some(data) = &result.data {
            self.cache.cache_step(&session.id, step, data).await?;
        }
        Ok(())
    }
}

fn mark_skipped(session: &mut Session, step: StepNumber) {
    let result = session
        .step_results
        .entry(step)
        .or_insert_with(|| StepResult::seeded(step, json!({}), ResultSource::Executed));
    result.status = StepStatus::Skipped;
    result.skipped_at = Some(Utc::now());
}
