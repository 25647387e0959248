//! Typed error hierarchy for the drawing pipeline.
//!
//! Four enums cover the four places a caller can see an error:
//! - `StoreError` - session store backend and serialization failures
//! - `PipelineError` - engine failures that are not stage outcomes
//! - `ResumeError` - caller-facing failures of the resume/control surface
//! - `StepDataError` - review and edit requests against stage data
//!
//! Stage failures and gate blocks are outcomes, not errors; they are reported
//! through `PipelineOutcome`.

use crate::step::StepNumber;
use thiserror::Error;

/// Errors from a session store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session store backend error: {0}")]
    Backend(#[source] anyhow::Error),

    #[error("Failed to serialize value for key {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Corrupt entry at key {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the pipeline engine itself.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No implementation registered for step {0}")]
    MissingStep(StepNumber),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors returned by the resume/control surface. None of them mutate the
/// stored session.
#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("No paused step found for session {session_id}")]
    NoPausedStep { session_id: String },

    #[error("Unknown action '{0}'. Valid actions: approve, edit, retry, skip, abort")]
    InvalidAction(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl From<StoreError> for ResumeError {
    fn from(err: StoreError) -> Self {
        ResumeError::Pipeline(PipelineError::Store(err))
    }
}

/// Errors from review and edit requests against a session's stage data.
#[derive(Debug, Error)]
pub enum StepDataError {
    #[error("Step {0} has not been executed yet")]
    NotExecuted(StepNumber),

    #[error(transparent)]
    Resume(#[from] ResumeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_error_session_not_found_carries_id() {
        let err = ResumeError::SessionNotFound {
            session_id: "interactive_abc".to_string(),
        };
        match &err {
            ResumeError::SessionNotFound { session_id } => assert_eq!(session_id, "interactive_abc"),
            _ => panic!("Expected SessionNotFound"),
        }
        assert!(err.to_string().contains("interactive_abc"));
    }

    #[test]
    fn resume_error_invalid_action_lists_valid_actions() {
        let err = ResumeError::InvalidAction("rewind".into());
        let msg = err.to_string();
        assert!(msg.contains("rewind"));
        assert!(msg.contains("approve, edit, retry, skip, abort"));
    }

    #[test]
    fn store_error_converts_into_resume_error() {
        let err: ResumeError = StoreError::Backend(anyhow::anyhow!("disk full")).into();
        assert!(matches!(
            err,
            ResumeError::Pipeline(PipelineError::Store(StoreError::Backend(_)))
        ));
    }

    #[test]
    fn step_data_error_not_executed_names_step() {
        let step = StepNumber::new(6).unwrap();
        let err = StepDataError::NotExecuted(step);
        assert_eq!(err.to_string(), "Step 6 has not been executed yet");
    }

    #[test]
    fn pipeline_error_wraps_anyhow() {
        let err: PipelineError = anyhow::anyhow!("table incomplete").into();
        assert!(matches!(err, PipelineError::Other(_)));
        assert_eq!(err.to_string(), "table incomplete");
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StoreError::Backend(anyhow::anyhow!("x")));
        assert_std_error(&PipelineError::MissingStep(StepNumber::FIRST));
        assert_std_error(&ResumeError::InvalidAction("x".into()));
        assert_std_error(&StepDataError::NotExecuted(StepNumber::LAST));
    }
}
