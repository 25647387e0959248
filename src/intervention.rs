//! Pause policy for interactive runs.

use crate::session::{InterventionMode, StepResult};
use crate::util::has_non_empty_any;

/// Data fields whose non-empty presence counts as a warning.
pub const WARNING_FIELDS: [&str; 3] = ["warnings", "flags", "discrepancies"];

/// Whether the engine should pause for review after `result`.
pub fn should_pause(mode: InterventionMode, result: &StepResult) -> bool {
    match mode {
        InterventionMode::None => false,
        InterventionMode::AllSteps => true,
        InterventionMode::GatesOnly => result.step_number.is_gate(),
        InterventionMode::OnWarning => has_warnings(result),
        InterventionMode::OnError => result.is_failed(),
    }
}

/// Whether the stage data carries a non-empty warnings, flags, or
/// discrepancies collection.
pub fn has_warnings(result: &StepResult) -> bool {
    has_non_empty_any(result.data.as_ref(), &WARNING_FIELDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepNumber;
    use serde_json::json;

    fn passed(n: u8, data: serde_json::Value) -> StepResult {
        StepResult::passed(StepNumber::new(n).unwrap(), data, 1)
    }

    #[test]
    fn test_none_never_pauses() {
        assert!(!should_pause(InterventionMode::None, &passed(4, json!({}))));
        let failed = StepResult::failed(StepNumber::new(2).unwrap(), "boom", 1);
        assert!(!should_pause(InterventionMode::None, &failed));
    }

    #[test]
    fn test_all_steps_always_pauses() {
        for n in 1..=10 {
            assert!(should_pause(InterventionMode::AllSteps, &passed(n, json!({}))));
        }
    }

    #[test]
    fn test_gates_only_pauses_at_four_and_nine() {
        let paused: Vec<u8> = (1..=10)
            .filter(|n| should_pause(InterventionMode::GatesOnly, &passed(*n, json!({}))))
            .collect();
        assert_eq!(paused, vec![4, 9]);
    }

    #[test]
    fn test_on_warning_checks_collections() {
        let mode = InterventionMode::OnWarning;
        assert!(should_pause(mode, &passed(6, json!({"discrepancies": [{"cabinet": "B1"}]}))));
        assert!(should_pause(mode, &passed(7, json!({"flags": {"toe_kick": "non-standard"}}))));
        assert!(!should_pause(mode, &passed(6, json!({"discrepancies": []}))));
        assert!(!should_pause(mode, &passed(2, json!({"warnings": "none"}))));
        assert!(!should_pause(mode, &passed(2, json!({"potential_conflicts": ["x"]}))));
    }

    #[test]
    fn test_on_error_pauses_only_on_failure() {
        let mode = InterventionMode::OnError;
        assert!(!should_pause(mode, &passed(3, json!({"warnings": ["w"]}))));
        let failed = StepResult::failed(StepNumber::new(3).unwrap(), "timeout", 1);
        assert!(should_pause(mode, &failed));
    }
}
