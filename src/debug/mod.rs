//! Read-only inspection of a session for troubleshooting runs.
//!
//! [`DebugViewer`] never mutates the session. It answers "what did each stage
//! produce, what did it receive, and how does that compare with what we
//! expected" and can render the answer as text, markdown, or JSON.

use crate::session::{Session, SessionStatus};
use crate::step::{Dependencies, STEP_COUNT, StepNumber};
use crate::util::{has_non_empty_any, is_empty_payload, is_non_empty_collection, top_level_keys};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Keys that mark a stage as having reported warnings in debug views.
const DEBUG_WARNING_FIELDS: [&str; 4] = ["warnings", "flags", "discrepancies", "potential_conflicts"];

/// Keys surfaced as key findings in the detailed view.
const FINDING_FIELDS: [&str; 4] = ["warnings", "flags", "discrepancies", "blockers"];

const NOT_EXECUTED: &str = "not_executed";

/// How much of a stage's data `step_detail` includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    Summary,
    #[default]
    Detailed,
    Raw,
}

impl std::str::FromStr for ViewMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "detailed" => Ok(Self::Detailed),
            "raw" => Ok(Self::Raw),
            _ => anyhow::bail!("Invalid view '{}'. Valid values: summary, detailed, raw", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid report format '{}'. Valid values: text, markdown, json", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOverview {
    pub number: StepNumber,
    pub name: &'static str,
    /// Result status, or `not_executed`.
    pub status: String,
    pub duration_ms: Option<u64>,
    pub has_data: bool,
    pub was_edited: bool,
    pub has_warnings: bool,
    pub has_errors: bool,
    pub data_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepsOverview {
    pub session_id: String,
    pub status: SessionStatus,
    pub steps: Vec<StepOverview>,
    pub total_duration_ms: u64,
    pub completed_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDetail {
    pub step_number: StepNumber,
    pub step_name: &'static str,
    pub status: String,
    pub duration_ms: u64,
    pub was_edited: bool,
    pub edit_timestamp: Option<chrono::DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_summary: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_findings: Option<Map<String, Value>>,
}

/// What a dependency handed to a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DependencyInput {
    Keys(Vec<String>),
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataFlowEntry {
    pub step: StepNumber,
    pub name: &'static str,
    pub receives_from: Vec<StepNumber>,
    /// Stage 10 receives every prior stage rather than a fixed list.
    pub receives_all_prior: bool,
    pub input_summary: BTreeMap<StepNumber, DependencyInput>,
    pub output_keys: Vec<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Difference {
    MissingInActual { path: String, expected: Value },
    ExtraInActual { path: String, actual: Value },
    ValueMismatch { path: String, actual: Value, expected: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepComparison {
    pub step: StepNumber,
    pub has_actual: bool,
    pub has_expected: bool,
    pub matches: bool,
    pub differences: Vec<Difference>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    session_id: &'a str,
    generated_at: String,
    overview: StepsOverview,
    data_flow: Vec<DataFlowEntry>,
}

/// Read-only view over one session.
pub struct DebugViewer<'a> {
    session: &'a Session,
}

impl<'a> DebugViewer<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    fn status_of(&self, step: StepNumber) -> String {
        self.session
            .result(step)
            .map_or_else(|| NOT_EXECUTED.to_string(), |r| r.status.as_str().to_string())
    }

    pub fn steps_overview(&self) -> StepsOverview {
        let steps: Vec<StepOverview> = StepNumber::all()
            .map(|step| {
                let result = self.session.result(step);
                let data = result.and_then(|r| r.data.as_ref());
                StepOverview {
                    number: step,
                    name: step.name(),
                    status: self.status_of(step),
                    duration_ms: result.map(|r| r.duration_ms),
                    has_data: data.is_some_and(|d| !is_empty_payload(d)),
                    was_edited: result.is_some_and(|r| r.edited),
                    has_warnings: has_non_empty_any(data, &DEBUG_WARNING_FIELDS),
                    has_errors: result.is_some_and(|r| r.is_failed()),
                    data_keys: top_level_keys(data),
                }
            })
            .collect();

        StepsOverview {
            session_id: self.session.id.clone(),
            status: self.session.status,
            total_duration_ms: steps.iter().filter_map(|s| s.duration_ms).sum(),
            completed_count: steps.iter().filter(|s| s.status == "passed").count(),
            failed_count: steps.iter().filter(|s| s.has_errors).count(),
            steps,
        }
    }

    /// Detail for one executed stage. `None` when the stage has no result.
    pub fn step_detail(&self, step: StepNumber, view: ViewMode) -> Option<StepDetail> {
        let result = self.session.result(step)?;
        let data = result.data.as_ref();
        let mut detail = StepDetail {
            step_number: step,
            step_name: step.name(),
            status: result.status.as_str().to_string(),
            duration_ms: result.duration_ms,
            was_edited: result.edited,
            edit_timestamp: result.edit_timestamp,
            data: None,
            data_summary: None,
            key_findings: None,
        };

        match view {
            ViewMode::Raw => detail.data = data.cloned(),
            ViewMode::Summary => detail.data_summary = Some(summarize(data)),
            ViewMode::Detailed => {
                detail.data = data.cloned();
                detail.data_summary = Some(summarize(data));
                detail.key_findings = Some(key_findings(step, data));
            }
        }
        Some(detail)
    }

    pub fn data_flow(&self) -> Vec<DataFlowEntry> {
        StepNumber::all()
            .map(|step| {
                let spec = step.spec();
                let receives_from = spec.dependencies();
                let input_summary = receives_from
                    .iter()
                    .map(|dep| {
                        let input = match self.session.step_data(*dep) {
                            Some(data) => DependencyInput::Keys(top_level_keys(Some(data))),
                            None => DependencyInput::Missing("missing"),
                        };
                        (*dep, input)
                    })
                    .collect();

                DataFlowEntry {
                    step,
                    name: spec.name,
                    receives_all_prior: matches!(spec.depends_on, Dependencies::AllPrior),
                    receives_from,
                    input_summary,
                    output_keys: top_level_keys(self.session.step_data(step)),
                    status: self.status_of(step),
                }
            })
            .collect()
    }

    /// Compare each stage's actual data with `expected`.
    pub fn compare_steps(&self, expected: &BTreeMap<StepNumber, Value>) -> Vec<StepComparison> {
        expected
            .iter()
            .map(|(step, expected)| {
                let actual = self.session.step_data(*step);
                let mut differences = Vec::new();
                match actual {
                    Some(actual) => find_differences(actual, expected, "", &mut differences),
                    None => differences.push(Difference::MissingInActual {
                        path: String::new(),
                        expected: expected.clone(),
                    }),
                }
                StepComparison {
                    step: *step,
                    has_actual: actual.is_some(),
                    has_expected: !expected.is_null(),
                    matches: actual == Some(expected),
                    differences,
                }
            })
            .collect()
    }

    pub fn render_report(&self, format: ReportFormat) -> anyhow::Result<String> {
        let report = Report {
            session_id: &self.session.id,
            generated_at: Utc::now().to_rfc3339(),
            overview: self.steps_overview(),
            data_flow: self.data_flow(),
        };
        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(&report)?),
            ReportFormat::Markdown => Ok(render_markdown(&report)),
            ReportFormat::Text => Ok(render_text(&report)),
        }
    }
}

/// Generic shape summary: one entry per top-level key.
fn summarize(data: Option<&Value>) -> Map<String, Value> {
    let Some(Value::Object(map)) = data else {
        return Map::new();
    };
    map.iter()
        .map(|(key, value)| {
            let shape = match value {
                Value::Array(items) => json!({"type": "array", "count": items.len()}),
                Value::Object(fields) => json!({"type": "object", "count": fields.len()}),
                Value::Null => json!({"type": "null"}),
                other => other.clone(),
            };
            (key.clone(), shape)
        })
        .collect()
}

fn key_findings(step: StepNumber, data: Option<&Value>) -> Map<String, Value> {
    let mut findings = Map::new();
    let Some(data) = data else {
        return findings;
    };
    for key in FINDING_FIELDS {
        if is_non_empty_collection(data.get(key)) {
            findings.insert(key.to_string(), data[key].clone());
        }
    }

    if step == StepNumber::INTENT_GATE {
        let can_proceed = data.get("can_proceed");
        let allowed = can_proceed
            .and_then(|c| c.get("extraction_allowed"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        findings.insert("extraction_allowed".to_string(), Value::Bool(allowed));
        if !allowed {
            let missing = can_proceed
                .and_then(|c| c.get("missing"))
                .cloned()
                .unwrap_or_else(|| json!([]));
            findings.insert("missing_requirements".to_string(), missing);
        }
    }
    findings
}

fn find_differences(actual: &Value, expected: &Value, path: &str, out: &mut Vec<Difference>) {
    let (Value::Object(actual_map), Value::Object(expected_map)) = (actual, expected) else {
        if actual != expected {
            out.push(Difference::ValueMismatch {
                path: path.to_string(),
                actual: actual.clone(),
                expected: expected.clone(),
            });
        }
        return;
    };

    let join = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", path, key)
        }
    };

    for (key, expected_value) in expected_map {
        match actual_map.get(key) {
            Some(actual_value) => find_differences(actual_value, expected_value, &join(key), out),
            None => out.push(Difference::MissingInActual {
                path: join(key),
                expected: expected_value.clone(),
            }),
        }
    }
    for (key, actual_value) in actual_map {
        if !expected_map.contains_key(key) {
            out.push(Difference::ExtraInActual {
                path: join(key),
                actual: actual_value.clone(),
            });
        }
    }
}

fn render_markdown(report: &Report<'_>) -> String {
    let overview = &report.overview;
    let mut md = String::from("# Drawing Analysis Debug Report\n\n");
    md.push_str(&format!("**Session:** {}\n", report.session_id));
    md.push_str(&format!("**Generated:** {}\n\n", report.generated_at));

    md.push_str("## Pipeline Overview\n\n");
    md.push_str(&format!("- **Status:** {}\n", overview.status));
    md.push_str(&format!(
        "- **Completed:** {}/{} steps\n\n",
        overview.completed_count, STEP_COUNT
    ));

    md.push_str("| Step | Name | Status | Duration |\n");
    md.push_str("|------|------|--------|----------|\n");
    for step in &overview.steps {
        let duration = step
            .duration_ms
            .map_or_else(|| "-".to_string(), |ms| format!("{}ms", ms));
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            step.number, step.name, step.status, duration
        ));
    }

    md.push_str("\n## Data Flow\n\n");
    for entry in &report.data_flow {
        let sources = if entry.receives_all_prior {
            "all prior steps".to_string()
        } else if entry.receives_from.is_empty() {
            "drawing input".to_string()
        } else {
            entry
                .receives_from
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        md.push_str(&format!("- **{}** {} <- {}\n", entry.step, entry.name, sources));
    }
    md
}

fn render_text(report: &Report<'_>) -> String {
    let overview = &report.overview;
    let mut text = String::from("=== DRAWING ANALYSIS DEBUG REPORT ===\n\n");
    text.push_str(&format!("Session: {}\n", report.session_id));
    text.push_str(&format!("Generated: {}\n\n", report.generated_at));
    text.push_str(&format!("STATUS: {}\n", overview.status));
    text.push_str(&format!(
        "COMPLETED: {}/{} steps\n\n",
        overview.completed_count, STEP_COUNT
    ));

    text.push_str("--- STEPS ---\n");
    for step in &overview.steps {
        let marker = if step.was_edited { " (edited)" } else { "" };
        text.push_str(&format!(
            "  [{}] Step {}: {}{}\n",
            step.status.to_uppercase(),
            step.number,
            step.name,
            marker
        ));
    }
    text
}
