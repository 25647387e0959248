//! Session state for drawing analysis runs.
//!
//! A [`Session`] is the unit of work for one drawing: it carries the run status,
//! the per-stage results, the human approval history, and the debug log. The
//! engine takes a session in, drives it, and hands it back; the only long-lived
//! copy lives in a [`SessionStore`].

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteSessionStore;
pub use store::{CacheTtl, MemorySessionStore, SessionCache, SessionStore, keys};

use crate::errors::ResumeError;
use crate::step::StepNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Purposes requested when the caller does not name any.
pub const DEFAULT_PURPOSES: [&str; 3] = ["production_modeling", "cnc_generation", "material_takeoff"];

/// Overall status of a session. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
    /// A gate denied progression.
    Blocked,
    Paused,
    /// A stage finished and the session waits for a human decision.
    AwaitingApproval,
    AwaitingEdit,
}

impl SessionStatus {
    /// Terminal for the current run; a new session is needed to start over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Blocked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Paused => "paused",
            Self::AwaitingApproval => "awaiting_approval",
            Self::AwaitingEdit => "awaiting_edit",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Policy controlling when the engine pauses for human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterventionMode {
    /// Never pause.
    #[default]
    None,
    /// Pause after the gate stages (4 and 9).
    #[serde(alias = "gates")]
    GatesOnly,
    /// Pause after every stage.
    #[serde(alias = "all")]
    AllSteps,
    /// Pause when a stage reports warnings, flags, or discrepancies.
    #[serde(alias = "warnings")]
    OnWarning,
    /// Pause when a stage fails, so it can be retried or edited.
    #[serde(alias = "errors")]
    OnError,
}

impl InterventionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::GatesOnly => "gates_only",
            Self::AllSteps => "all_steps",
            Self::OnWarning => "on_warning",
            Self::OnError => "on_error",
        }
    }
}

impl std::fmt::Display for InterventionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InterventionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gates_only" | "gates" => Ok(Self::GatesOnly),
            "all_steps" | "all" => Ok(Self::AllSteps),
            "on_warning" | "warnings" => Ok(Self::OnWarning),
            "on_error" | "errors" => Ok(Self::OnError),
            _ => anyhow::bail!(
                "Invalid intervention mode '{}'. Valid values: none, gates_only, all_steps, on_warning, on_error",
                s
            ),
        }
    }
}

/// Outcome status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Whether a later stage may consume this stage's output.
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, Self::Passed | Self::Skipped)
    }
}

/// Where a stage result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    #[default]
    Executed,
    /// Loaded from the per-stage cache when resuming from a stage.
    Cached,
    /// Seeded by the caller of a partial run.
    Provided,
}

/// The outcome of one stage's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_number: StepNumber,
    pub step_name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    /// Stage payload; `None` when the stage failed.
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: ResultSource,
}

impl StepResult {
    /// A stage that ran and produced data.
    pub fn passed(step: StepNumber, data: Value, duration_ms: u64) -> Self {
        Self {
            step_number: step,
            step_name: step.name().to_string(),
            status: StepStatus::Passed,
            duration_ms,
            data: Some(data),
            error: None,
            edited: false,
            edit_timestamp: None,
            skipped_at: None,
            source: ResultSource::Executed,
        }
    }

    /// A stage that ran and failed.
    pub fn failed(step: StepNumber, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step_number: step,
            step_name: step.name().to_string(),
            status: StepStatus::Failed,
            duration_ms,
            data: None,
            error: Some(error.into()),
            edited: false,
            edit_timestamp: None,
            skipped_at: None,
            source: ResultSource::Executed,
        }
    }

    /// A result that did not come from executing the stage in this session.
    pub fn seeded(step: StepNumber, data: Value, source: ResultSource) -> Self {
        Self {
            source,
            ..Self::passed(step, data, 0)
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == StepStatus::Passed
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// A human decision made while a session was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeAction {
    /// Accept the stage output and continue with the next stage.
    Approve,
    /// Merge reviewer edits into the stage output, then continue.
    Edit,
    /// Execute the paused stage again.
    Retry,
    /// Mark the paused stage as skipped and continue.
    Skip,
    /// Stop the session.
    Abort,
}

impl ResumeAction {
    pub fn all() -> &'static [ResumeAction] {
        &[Self::Approve, Self::Edit, Self::Retry, Self::Skip, Self::Abort]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Edit => "edit",
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Abort => "abort",
        }
    }
}

impl std::fmt::Display for ResumeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResumeAction {
    type Err = ResumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "edit" => Ok(Self::Edit),
            "retry" => Ok(Self::Retry),
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            _ => Err(ResumeError::InvalidAction(s.to_string())),
        }
    }
}

/// One entry in a session's approval history. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub step: StepNumber,
    pub action: ResumeAction,
    pub timestamp: DateTime<Utc>,
    pub had_edits: bool,
}

/// A timestamped debug entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

/// The drawing handed to the pipeline: one image reference or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DrawingInput {
    Single(String),
    Multi(Vec<String>),
}

impl DrawingInput {
    /// Build an input from one or more references.
    pub fn from_refs(mut refs: Vec<String>) -> Self {
        if refs.len() == 1 {
            DrawingInput::Single(refs.remove(0))
        } else {
            DrawingInput::Multi(refs)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DrawingInput::Single(_) => "single_image",
            DrawingInput::Multi(_) => "multi_image",
        }
    }
}

/// Metadata captured when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub purposes: Vec<String>,
    pub drawing_input_type: String,
    #[serde(default = "default_stop_on_gate_failure")]
    pub stop_on_gate_failure: bool,
}

fn default_stop_on_gate_failure() -> bool {
    true
}

/// One end-to-end, possibly paused and resumed, run of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub intervention_mode: InterventionMode,
    /// Set only while `status` is `AwaitingApproval`.
    #[serde(default)]
    pub paused_at_step: Option<StepNumber>,
    #[serde(default)]
    pub step_results: BTreeMap<StepNumber, StepResult>,
    pub pipeline_state: PipelineState,
    #[serde(default)]
    pub approval_history: Vec<ApprovalRecord>,
    #[serde(default)]
    pub debug_log: Vec<DebugEntry>,
    /// Whether debug entries are recorded for this session.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session that has not run any stage yet.
    pub fn new(
        id: impl Into<String>,
        mode: InterventionMode,
        purposes: Vec<String>,
        input_kind: &str,
        stop_on_gate_failure: bool,
    ) -> Self {
        let id = id.into();
        Self {
            pipeline_state: PipelineState {
                session_id: id.clone(),
                started_at: Utc::now(),
                purposes,
                drawing_input_type: input_kind.to_string(),
                stop_on_gate_failure,
            },
            id,
            status: SessionStatus::NotStarted,
            intervention_mode: mode,
            paused_at_step: None,
            step_results: BTreeMap::new(),
            approval_history: Vec::new(),
            debug_log: Vec::new(),
            debug: false,
            saved_at: None,
        }
    }

    /// Generate a fresh session id with the given prefix.
    pub fn generate_id(prefix: &str) -> String {
        format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
    }

    pub fn result(&self, step: StepNumber) -> Option<&StepResult> {
        self.step_results.get(&step)
    }

    /// Data recorded for a stage, if the stage has a result with data.
    pub fn step_data(&self, step: StepNumber) -> Option<&Value> {
        self.step_results.get(&step).and_then(|r| r.data.as_ref())
    }

    /// Stages whose result status is `Passed`, in order.
    pub fn passed_steps(&self) -> Vec<StepNumber> {
        self.step_results
            .values()
            .filter(|r| r.is_passed())
            .map(|r| r.step_number)
            .collect()
    }

    pub fn has_edits(&self) -> bool {
        self.step_results.values().any(|r| r.edited)
    }

    pub fn stop_on_gate_failure(&self) -> bool {
        self.pipeline_state.stop_on_gate_failure
    }

    /// Append a debug entry when debug mode is enabled for this session.
    pub fn debug(&mut self, message: impl Into<String>, context: Value) {
        if !self.debug {
            return;
        }
        let message = message.into();
        tracing::debug!(session_id = %self.id, %context, "{}", message);
        self.debug_log.push(DebugEntry {
            timestamp: Utc::now(),
            message,
            context,
        });
    }

    /// Human-readable rendering of the debug log.
    pub fn formatted_debug_log(&self) -> String {
        let mut output = String::from("=== Drawing Analysis Debug Log ===\n");
        output.push_str(&format!("Session: {}\n", self.id));
        output.push_str(&format!("Status: {}\n", self.status));
        output.push_str(&format!("Intervention Mode: {}\n\n", self.intervention_mode));

        for entry in &self.debug_log {
            output.push_str(&format!("[{}] {}\n", entry.timestamp.to_rfc3339(), entry.message));
            if !entry.context.is_null() {
                let context = serde_json::to_string_pretty(&entry.context).unwrap_or_default();
                output.push_str(&format!("  Context: {}\n", context));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(n: u8) -> StepNumber {
        StepNumber::new(n).unwrap()
    }

    fn new_session() -> Session {
        Session::new("pipeline_test", InterventionMode::None, vec!["production_modeling".into()], "single_image", true)
    }

    #[test]
    fn test_session_status_terminal() {
        assert!(!SessionStatus::NotStarted.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(!SessionStatus::AwaitingApproval.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_intervention_mode_parses_aliases() {
        assert_eq!("gates".parse::<InterventionMode>().unwrap(), InterventionMode::GatesOnly);
        assert_eq!("ALL_STEPS".parse::<InterventionMode>().unwrap(), InterventionMode::AllSteps);
        assert_eq!("warnings".parse::<InterventionMode>().unwrap(), InterventionMode::OnWarning);
        assert_eq!("errors".parse::<InterventionMode>().unwrap(), InterventionMode::OnError);
        assert!("sometimes".parse::<InterventionMode>().is_err());
    }

    #[test]
    fn test_intervention_mode_serde_aliases() {
        let mode: InterventionMode = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(mode, InterventionMode::AllSteps);
        assert_eq!(serde_json::to_string(&InterventionMode::OnWarning).unwrap(), "\"on_warning\"");
    }

    #[test]
    fn test_resume_action_parse() {
        assert_eq!("Retry".parse::<ResumeAction>().unwrap(), ResumeAction::Retry);
        let err = "rewind".parse::<ResumeAction>().unwrap_err();
        assert!(matches!(err, ResumeError::InvalidAction(ref a) if a == "rewind"));
    }

    #[test]
    fn test_drawing_input_kind_and_serde() {
        let single = DrawingInput::from_refs(vec!["sheet-a.png".into()]);
        assert_eq!(single.kind(), "single_image");
        assert_eq!(serde_json::to_value(&single).unwrap(), json!("sheet-a.png"));

        let multi = DrawingInput::from_refs(vec!["a.png".into(), "b.png".into()]);
        assert_eq!(multi.kind(), "multi_image");
        let back: DrawingInput = serde_json::from_value(json!(["a.png", "b.png"])).unwrap();
        assert_eq!(back, multi);
    }

    #[test]
    fn test_step_result_constructors() {
        let passed = StepResult::passed(step(2), json!({"dimensions": []}), 12);
        assert!(passed.is_passed());
        assert_eq!(passed.step_name, "Dimension Reference Analysis");
        assert!(passed.error.is_none());

        let failed = StepResult::failed(step(3), "timeout", 30_000);
        assert!(failed.is_failed());
        assert!(failed.data.is_none());
        assert_eq!(failed.error.as_deref(), Some("timeout"));

        let provided = StepResult::seeded(step(1), json!({}), ResultSource::Provided);
        assert_eq!(provided.source, ResultSource::Provided);
        assert!(provided.is_passed());
    }

    #[test]
    fn test_session_roundtrips_through_json() {
        let mut session = new_session();
        session.step_results.insert(step(1), StepResult::passed(step(1), json!({"view_type": "elevation"}), 5));
        session.paused_at_step = Some(step(1));
        session.status = SessionStatus::AwaitingApproval;

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["status"], "awaiting_approval");
        assert_eq!(json["step_results"]["1"]["status"], "passed");

        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_debug_entries_only_recorded_in_debug_mode() {
        let mut session = new_session();
        session.debug("ignored", Value::Null);
        assert!(session.debug_log.is_empty());

        session.debug = true;
        session.debug("Executing step 1", json!({"step": 1}));
        assert_eq!(session.debug_log.len(), 1);

        let formatted = session.formatted_debug_log();
        assert!(formatted.contains("Session: pipeline_test"));
        assert!(formatted.contains("Executing step 1"));
        assert!(formatted.contains("Context:"));
    }

    #[test]
    fn test_generate_id_uses_prefix() {
        let a = Session::generate_id("interactive");
        let b = Session::generate_id("interactive");
        assert!(a.starts_with("interactive_"));
        assert_ne!(a, b);
    }
}
