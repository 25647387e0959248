//! The pipeline engine.
//!
//! [`PipelineEngine`] is stateless between calls: every operation takes a
//! session id or a [`Session`] value, drives it, persists it through the
//! [`SessionCache`], and hands it back. Two callers with the same engine can
//! drive different sessions independently.
//!
//! Control flow is a single loop over stage numbers (see `runner.rs`):
//!
//! 1. evaluate the gate guarding the stage, if any
//! 2. check the stage's declared dependencies
//! 3. execute the stage and fire hooks
//! 4. pause for review, halt on failure, or move to the next stage

mod outcome;
mod resume;
mod review;
mod runner;


pub use outcome::{PartialRunResult, PipelineOutcome, PipelineResult};
pub use review::{PersistenceExport, StateSummary, StepReview};

use crate::errors::{PipelineError, ResumeError};
use crate::hooks::CallbackRegistry;
use crate::session::{
    DEFAULT_PURPOSES, DrawingInput, InterventionMode, ResultSource, Session, SessionCache, StepResult,
};
use crate::step::{StepNumber, StepTable};
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-run options.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Session id to use; generated when `None`.
    pub session_id: Option<String>,
    /// Analysis purposes; defaults to [`DEFAULT_PURPOSES`] when empty.
    pub purposes: Vec<String>,
    /// Whether a denied intent gate halts the run.
    pub stop_on_gate_failure: bool,
    /// Pause policy for interactive runs. Ignored by full runs.
    pub intervention_mode: Option<InterventionMode>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            session_id: None,
            purposes: Vec::new(),
            stop_on_gate_failure: true,
            intervention_mode: None,
        }
    }
}

impl RunOptions {
    fn resolved_purposes(&self) -> Vec<String> {
        if self.purposes.is_empty() {
            DEFAULT_PURPOSES.iter().map(|p| p.to_string()).collect()
        } else {
            self.purposes.clone()
        }
    }
}

pub struct PipelineEngine {
    steps: StepTable,
    cache: SessionCache,
    hooks: CallbackRegistry,
    debug: bool,
}

impl PipelineEngine {
    pub fn new(steps: StepTable, cache: SessionCache) -> Self {
        Self {
            steps,
            cache,
            hooks: CallbackRegistry::new(),
            debug: false,
        }
    }

    pub fn with_hooks(mut self, hooks: CallbackRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Record debug entries on sessions started by this engine.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn hooks_mut(&mut self) -> &mut CallbackRegistry {
        &mut self.hooks
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    fn start_session(&self, prefix: &str, options: &RunOptions, mode: InterventionMode, input: &DrawingInput) -> Session {
        let id = options
            .session_id
            .clone()
            .unwrap_or_else(|| Session::generate_id(prefix));
        let mut session = Session::new(
            id,
            mode,
            options.resolved_purposes(),
            input.kind(),
            options.stop_on_gate_failure,
        );
        session.debug = self.debug;
        session
    }

    /// Run all ten stages without pausing.
    pub async fn run_full_pipeline(
        &self,
        input: DrawingInput,
        options: RunOptions,
    ) -> Result<PipelineResult, PipelineError> {
        let mut session = self.start_session("pipeline", &options, InterventionMode::None, &input);
        tracing::info!(session_id = %session.id, "Starting full drawing analysis");
        session.debug("Starting full pipeline", serde_json::json!({"input_type": input.kind()}));

        self.cache.cache_input(&session.id, &input).await?;
        let outcome = self.drive(&mut session, Some(&input), Some(StepNumber::FIRST)).await?;
        Ok(PipelineResult { session, outcome })
    }

    /// Run the stages, pausing whenever the intervention mode says so.
    /// Interactive runs default to pausing after every stage.
    pub async fn run_interactive(
        &self,
        input: DrawingInput,
        options: RunOptions,
    ) -> Result<PipelineResult, PipelineError> {
        let mode = options.intervention_mode.unwrap_or(InterventionMode::AllSteps);
        let mut session = self.start_session("interactive", &options, mode, &input);
        tracing::info!(session_id = %session.id, mode = %mode, "Starting interactive drawing analysis");
        session.debug("Starting interactive pipeline", serde_json::json!({"mode": mode}));

        self.cache.cache_input(&session.id, &input).await?;
        let outcome = self.drive(&mut session, Some(&input), Some(StepNumber::FIRST)).await?;
        Ok(PipelineResult { session, outcome })
    }

    /// Execute a subset of stages standalone, after seeding the session with
    /// `prior_results`. Stages run in the given order, every one of them runs
    /// regardless of earlier failures, and no gate or dependency check applies.
    pub async fn run_steps(
        &self,
        steps: &[StepNumber],
        input: DrawingInput,
        prior_results: BTreeMap<StepNumber, Value>,
    ) -> Result<PartialRunResult, PipelineError> {
        let options = RunOptions::default();
        let mut session = self.start_session("partial", &options, InterventionMode::None, &input);
        for (step, data) in prior_results {
            session
                .step_results
                .insert(step, StepResult::seeded(step, data, ResultSource::Provided));
        }
        tracing::info!(session_id = %session.id, count = steps.len(), "Running partial analysis");

        let mut results = BTreeMap::new();
        for step in steps {
            let result = self.execute_step(&mut session, *step, Some(&input)).await?;
            results.insert(*step, result);
        }
        Ok(PartialRunResult { session, results })
    }

    /// Fetch a persisted session.
    pub async fn load_session(&self, session_id: &str) -> Result<Session, ResumeError> {
        self.cache
            .load_session(session_id)
            .await?
            .ok_or_else(|| ResumeError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Change the intervention mode of a persisted session.
    pub async fn set_intervention_mode(
        &self,
        session_id: &str,
        mode: InterventionMode,
    ) -> Result<Session, ResumeError> {
        let mut session = self.load_session(session_id).await?;
        session.intervention_mode = mode;
        session.debug("Intervention mode changed", serde_json::json!({"mode": mode}));
        self.cache.save_session(&mut session).await?;
        Ok(session)
    }
}
