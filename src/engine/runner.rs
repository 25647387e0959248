use super::PipelineEngine;
use super::outcome::PipelineOutcome;
use crate::errors::PipelineError;
use crate::gates::{GateDecision, evaluate_component_gate, evaluate_intent_gate};
use crate::hooks::{HookContext, HookEvent};
use crate::intervention::should_pause;
use crate::session::{DrawingInput, Session, SessionStatus, StepResult};
use crate::step::{StepInputs, StepNumber};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Instant;

impl PipelineEngine {
    /// Drive `session` forward starting at `from` until it completes, fails,
    /// blocks, or pauses. `None` means every stage has already been handled.
    pub(super) async fn drive(
        &self,
        session: &mut Session,
        input: Option<&DrawingInput>,
        from: Option<StepNumber>,
    ) -> Result<PipelineOutcome, PipelineError> {
        session.status = SessionStatus::InProgress;
        session.paused_at_step = None;

        let mut current = from;
        while let Some(step) = current {
            if let Some(decision) = self.gate_before(session, step) {
                return self.block(session, decision).await;
            }

            if let Some(dependency) = unmet_dependency(session, step) {
                let error = format!(
                    "Dependency step {} ({}) has not passed",
                    dependency,
                    dependency.name()
                );
                self.hooks
                    .fire(&HookContext::new(HookEvent::OnError, &session.id, step, None));
                return self.fail(session, step, error).await;
            }

            let result = self.execute_step(session, step, input).await?;

            if should_pause(session.intervention_mode, &result) {
                return self.pause(session, result).await;
            }
            if result.is_failed() {
                let error = result.error.unwrap_or_default();
                return self.fail(session, step, error).await;
            }
            current = step.next();
        }

        self.complete(session).await
    }

    /// Invoke one stage, record and persist its result, and fire hooks.
    pub(super) async fn execute_step(
        &self,
        session: &mut Session,
        step: StepNumber,
        input: Option<&DrawingInput>,
    ) -> Result<StepResult, PipelineError> {
        self.hooks
            .fire(&HookContext::new(HookEvent::Before, &session.id, step, None));
        tracing::info!(session_id = %session.id, step = %step, name = step.name(), "Executing step");
        session.debug(format!("Executing step {}: {}", step, step.name()), Value::Null);

        let inputs = build_inputs(session, step, input);
        let started = Instant::now();
        let outcome = self.steps.get(step).execute(inputs).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(outcome) if outcome.success => {
                let data = outcome.data.unwrap_or_else(|| json!({}));
                StepResult::passed(step, data, duration_ms)
            }
            Ok(outcome) => {
                let error = outcome
                    .error
                    .unwrap_or_else(|| format!("Step {} reported failure without an error message", step));
                StepResult::failed(step, error, duration_ms)
            }
            Err(e) => StepResult::failed(step, format!("{:#}", e), duration_ms),
        };

        match (&result.data, &result.error) {
            (Some(data), _) => {
                tracing::info!(session_id = %session.id, step = %step, duration_ms, "Step passed");
                session.debug(
                    format!("Step {} completed", step),
                    json!({"duration_ms": duration_ms, "keys": crate::util::top_level_keys(Some(data))}),
                );
                self.cache.cache_step(&session.id, step, data).await?;
            }
            (None, error) => {
                tracing::warn!(session_id = %session.id, step = %step, error = ?error, "Step failed");
                session.debug(format!("Step {} failed", step), json!({"error": error}));
            }
        }

        session.step_results.insert(step, result.clone());
        self.cache.save_session(session).await?;

        self.hooks
            .fire(&HookContext::new(HookEvent::After, &session.id, step, Some(&result)));
        if result.is_failed() {
            self.hooks
                .fire(&HookContext::new(HookEvent::OnError, &session.id, step, Some(&result)));
        }
        Ok(result)
    }

    /// The gate guarding entry into `step`, if it denies progression.
    fn gate_before(&self, session: &Session, step: StepNumber) -> Option<GateDecision> {
        let decision = if step == StepNumber::ENTITY_EXTRACTION && session.stop_on_gate_failure() {
            evaluate_intent_gate(session.step_data(StepNumber::INTENT_GATE))
        } else if step == StepNumber::COMPONENT_GATE {
            evaluate_component_gate(&session.step_results)
        } else {
            return None;
        };
        (!decision.allowed).then_some(decision)
    }

    async fn block(&self, session: &mut Session, decision: GateDecision) -> Result<PipelineOutcome, PipelineError> {
        tracing::warn!(
            session_id = %session.id,
            gate = %decision.gate,
            blockers = ?decision.blockers,
            "Pipeline blocked at gate"
        );
        session.debug(
            format!("Blocked at gate {}", decision.gate),
            json!({"blockers": decision.blockers}),
        );
        session.status = SessionStatus::Blocked;
        self.cache.save_session(session).await?;
        Ok(PipelineOutcome::Blocked {
            gate: decision.gate,
            blockers: decision.blockers,
        })
    }

    async fn pause(&self, session: &mut Session, result: StepResult) -> Result<PipelineOutcome, PipelineError> {
        let step = result.step_number;
        tracing::info!(session_id = %session.id, step = %step, "Paused for review");
        session.debug(format!("Paused after step {}", step), Value::Null);
        session.status = SessionStatus::AwaitingApproval;
        session.paused_at_step = Some(step);
        self.cache.save_session(session).await?;

        self.hooks
            .fire(&HookContext::new(HookEvent::OnPause, &session.id, step, Some(&result)));
        Ok(PipelineOutcome::awaiting(result))
    }

    async fn fail(&self, session: &mut Session, step: StepNumber, error: String) -> Result<PipelineOutcome, PipelineError> {
        tracing::warn!(session_id = %session.id, step = %step, error = %error, "Pipeline failed");
        session.status = SessionStatus::Failed;
        self.cache.save_session(session).await?;
        Ok(PipelineOutcome::Failed {
            step,
            step_name: step.name().to_string(),
            error,
        })
    }

    async fn complete(&self, session: &mut Session) -> Result<PipelineOutcome, PipelineError> {
        let total_duration_ms: u64 = session.step_results.values().map(|r| r.duration_ms).sum();
        tracing::info!(session_id = %session.id, total_duration_ms, "Drawing analysis completed");
        session.debug("Pipeline completed", json!({"total_duration_ms": total_duration_ms}));
        session.status = SessionStatus::Completed;
        session.paused_at_step = None;
        self.cache.save_session(session).await?;
        Ok(PipelineOutcome::Completed {
            total_duration_ms,
            final_audit: session.step_data(StepNumber::LAST).cloned(),
        })
    }
}

/// The first declared dependency of `step` that is neither passed nor skipped.
fn unmet_dependency(session: &Session, step: StepNumber) -> Option<StepNumber> {
    step.spec().dependencies().into_iter().find(|dep| {
        !session
            .result(*dep)
            .is_some_and(|r| r.status.satisfies_dependency())
    })
}

/// Hand the stage only what it declares.
fn build_inputs(session: &Session, step: StepNumber, input: Option<&DrawingInput>) -> StepInputs {
    let spec = step.spec();
    let prior: BTreeMap<StepNumber, Value> = spec
        .dependencies()
        .into_iter()
        .filter_map(|dep| session.step_data(dep).map(|data| (dep, data.clone())))
        .collect();

    let input = if spec.uses_input {
        if input.is_none() {
            tracing::warn!(session_id = %session.id, step = %step, "No drawing input available for step");
        }
        input.cloned()
    } else {
        None
    };
    let purposes = if spec.uses_purposes {
        session.pipeline_state.purposes.clone()
    } else {
        Vec::new()
    };

    StepInputs {
        step,
        step_name: spec.name.to_string(),
        prior,
        input,
        purposes,
    }
}
