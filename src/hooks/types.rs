//! Hook events, scopes, and the context handed to observers.

use crate::session::StepResult;
use crate::step::StepNumber;
use serde::{Deserialize, Serialize};

/// Points in a stage's lifecycle where observers fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    /// Before the stage implementation is invoked
    Before,
    /// After the stage returns
    After,
    /// When the stage failed
    OnError,
    /// When the session pauses for review after the stage
    OnPause,
}

impl HookEvent {
    /// Returns all hook events in firing order.
    pub fn all() -> &'static [HookEvent] {
        &[HookEvent::Before, HookEvent::After, HookEvent::OnError, HookEvent::OnPause]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Before => "before",
            HookEvent::After => "after",
            HookEvent::OnError => "on_error",
            HookEvent::OnPause => "on_pause",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HookEvent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "before" => Ok(HookEvent::Before),
            "after" => Ok(HookEvent::After),
            "on_error" | "onerror" | "error" => Ok(HookEvent::OnError),
            "on_pause" | "onpause" | "pause" => Ok(HookEvent::OnPause),
            _ => anyhow::bail!("Invalid hook event '{}'. Valid values: before, after, on_error, on_pause", s),
        }
    }
}

/// Which stages an observer is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookScope {
    Step(StepNumber),
    All,
}

/// What an observer sees when it fires.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub event: HookEvent,
    pub session_id: &'a str,
    pub step: StepNumber,
    pub step_name: &'static str,
    /// The stage result; `None` for `Before` and for an `OnError` raised
    /// because a dependency had not passed (no result is recorded then).
    pub result: Option<&'a StepResult>,
}

impl<'a> HookContext<'a> {
    pub fn new(event: HookEvent, session_id: &'a str, step: StepNumber, result: Option<&'a StepResult>) -> Self {
        Self {
            event,
            session_id,
            step,
            step_name: step.name(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_event_parse() {
        assert_eq!("before".parse::<HookEvent>().unwrap(), HookEvent::Before);
        assert_eq!("on_error".parse::<HookEvent>().unwrap(), HookEvent::OnError);
        assert_eq!("pause".parse::<HookEvent>().unwrap(), HookEvent::OnPause);
        assert!("during".parse::<HookEvent>().is_err());
    }

    #[test]
    fn test_hook_event_serde() {
        assert_eq!(serde_json::to_string(&HookEvent::OnPause).unwrap(), "\"on_pause\"");
        let event: HookEvent = serde_json::from_str("\"after\"").unwrap();
        assert_eq!(event, HookEvent::After);
    }

    #[test]
    fn test_context_carries_step_name() {
        let ctx = HookContext::new(HookEvent::Before, "s1", StepNumber::COMPONENT_GATE, None);
        assert_eq!(ctx.step_name, "Component Extraction");
        assert!(ctx.result.is_none());
    }
}
