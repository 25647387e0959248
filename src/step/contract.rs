//! The seam between the engine and stage implementations.

use super::StepNumber;
use crate::session::DrawingInput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything a stage is allowed to see: its declared dependencies' outputs,
/// plus the drawing input and purposes when the stage asks for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInputs {
    pub step: StepNumber,
    pub step_name: String,
    /// Outputs of the declared dependency stages, keyed by stage number.
    pub prior: BTreeMap<StepNumber, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<DrawingInput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub purposes: Vec<String>,
}

impl StepInputs {
    /// Output of a dependency stage.
    pub fn prior(&self, step: u8) -> Option<&Value> {
        StepNumber::new(step).and_then(|s| self.prior.get(&s))
    }
}

/// What a stage reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// One interpretation stage. A returned `Err` is treated as a stage failure.
#[async_trait]
pub trait StepContract: Send + Sync {
    async fn execute(&self, inputs: StepInputs) -> anyhow::Result<StepOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_parses_minimal_json() {
        let outcome: StepOutcome = serde_json::from_str(r#"{"success": false, "error": "no scale"}"#).unwrap();
        assert_eq!(outcome, StepOutcome::failure("no scale"));

        let outcome: StepOutcome = serde_json::from_str(r#"{"success": true, "data": {"a": 1}}"#).unwrap();
        assert_eq!(outcome, StepOutcome::success(json!({"a": 1})));
    }

    #[test]
    fn test_inputs_serialize_prior_by_number() {
        let step = StepNumber::new(2).unwrap();
        let mut prior = BTreeMap::new();
        prior.insert(StepNumber::FIRST, json!({"view_type": "plan"}));
        let inputs = StepInputs {
            step,
            step_name: step.name().to_string(),
            prior,
            input: Some(DrawingInput::Single("sheet.png".into())),
            purposes: vec![],
        };

        let json = serde_json::to_value(&inputs).unwrap();
        assert_eq!(json["step"], 2);
        assert_eq!(json["prior"]["1"]["view_type"], "plan");
        assert_eq!(json["input"], "sheet.png");
        assert!(json.get("purposes").is_none());
        assert_eq!(inputs.prior(1), Some(&json!({"view_type": "plan"})));
        assert_eq!(inputs.prior(3), None);
    }
}
