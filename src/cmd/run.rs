//! Pipeline execution - `run`, `resume`, `rerun`, and `steps`.

use anyhow::{Context, Result};
use console::style;
use drawing_pipeline::config::PipelineConfig;
use drawing_pipeline::engine::{PipelineEngine, PipelineOutcome, PipelineResult};
use drawing_pipeline::gates::ApprovalPrompt;
use drawing_pipeline::hooks::HookScope;
use drawing_pipeline::session::{DrawingInput, StepStatus};
use drawing_pipeline::step::StepNumber;
use drawing_pipeline::ui::PipelineUI;
use drawing_pipeline::ui::icons::{CHECK, CROSS};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::super::Cli;
use super::{parse_step, print_json};

/// Arguments of `drawing-pipeline run`.
pub struct RunRequest {
    pub drawings: Vec<String>,
    pub interactive: bool,
    pub session_id: Option<String>,
    pub purposes: Vec<String>,
    pub stop_on_gate_failure: bool,
    pub prompt: bool,
}

/// Attach the progress UI unless `--json`. `completed` positions the stage
/// bar for resumed sessions.
fn attach_ui(cli: &Cli, engine: &mut PipelineEngine, completed: u64) -> Option<Arc<PipelineUI>> {
    if cli.json {
        return None;
    }
    let ui = Arc::new(PipelineUI::new(completed, cli.verbose));
    engine.hooks_mut().observe(HookScope::All, ui.clone());
    Some(ui)
}

pub async fn cmd_run(cli: &Cli, config: &PipelineConfig, request: RunRequest) -> Result<()> {
    let mut engine = config.build_engine().await?;
    let ui = attach_ui(cli, &mut engine, 0);

    let mut options = config.run_options();
    options.session_id = request.session_id;
    options.stop_on_gate_failure = request.stop_on_gate_failure;
    if !request.purposes.is_empty() {
        options.purposes = request.purposes;
    }

    let input = DrawingInput::from_refs(request.drawings);
    let result = if request.interactive {
        options.intervention_mode = Some(config.intervention_mode()?);
        engine.run_interactive(input, options).await?
    } else {
        engine.run_full_pipeline(input, options).await?
    };

    let result = if request.prompt || cli.yes {
        prompt_until_settled(&engine, ui.as_deref(), result, cli.yes).await?
    } else {
        result
    };
    report(cli, ui.as_deref(), &result)
}

pub async fn cmd_resume(
    cli: &Cli,
    config: &PipelineConfig,
    session_id: &str,
    action: &str,
    edits: Option<Value>,
    prompt: bool,
) -> Result<()> {
    let mut engine = config.build_engine().await?;
    let session = engine.load_session(session_id).await?;
    let ui = attach_ui(cli, &mut engine, session.passed_steps().len() as u64);

    let result = engine.resume_after_intervention(session_id, action, edits).await?;
    let result = if prompt || cli.yes {
        prompt_until_settled(&engine, ui.as_deref(), result, cli.yes).await?
    } else {
        result
    };
    report(cli, ui.as_deref(), &result)
}

pub async fn cmd_rerun(
    cli: &Cli,
    config: &PipelineConfig,
    session_id: &str,
    from: u8,
    drawings: &[String],
) -> Result<()> {
    let start = parse_step(from)?;
    let input = (!drawings.is_empty()).then(|| DrawingInput::from_refs(drawings.to_vec()));
    let mut engine = config.build_engine().await?;
    let ui = attach_ui(cli, &mut engine, u64::from(start.get() - 1));

    let result = engine.resume_from_step(session_id, start, input).await?;
    report(cli, ui.as_deref(), &result)
}

pub async fn cmd_steps(
    cli: &Cli,
    config: &PipelineConfig,
    steps: &[u8],
    drawings: &[String],
    prior: Option<&Path>,
) -> Result<()> {
    let steps = steps.iter().map(|n| parse_step(*n)).collect::<Result<Vec<_>>>()?;
    let prior: BTreeMap<StepNumber, Value> = match prior {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prior results: {}", path.display()))?;
            serde_json::from_str(&text).context("Prior results must be a JSON object keyed by stage number")?
        }
        None => BTreeMap::new(),
    };

    let engine = config.build_engine().await?;
    let result = engine
        .run_steps(&steps, DrawingInput::from_refs(drawings.to_vec()), prior)
        .await?;

    if cli.json {
        print_json(&serde_json::json!({
            "session_id": result.session.id,
            "success": result.all_passed(),
            "results": result.results,
        }))?;
    } else {
        println!();
        for (step, r) in &result.results {
            let icon = match r.status {
                StepStatus::Passed => CHECK,
                _ => CROSS,
            };
            println!("{} Step {} {} ({}ms)", icon, step, step.name(), r.duration_ms);
            if let Some(error) = &r.error {
                println!("    {}", style(error).red());
            }
        }
        println!();
        println!("Session: {}", style(&result.session.id).cyan());
    }

    if !result.all_passed() {
        anyhow::bail!("One or more stages failed");
    }
    Ok(())
}

/// Prompt for a decision after every pause until the run settles.
async fn prompt_until_settled(
    engine: &PipelineEngine,
    ui: Option<&PipelineUI>,
    mut result: PipelineResult,
    auto_approve: bool,
) -> Result<PipelineResult> {
    let prompt = ApprovalPrompt::new(auto_approve);
    while let PipelineOutcome::AwaitingApproval { step, .. } = result.outcome {
        let review = engine.get_step_for_review(&result.session, step)?;
        let (action, edits) = match ui {
            Some(ui) => ui.suspend(|| prompt.decide(&review))?,
            None => prompt.decide(&review)?,
        };
        tracing::info!(session_id = %result.session.id, step = %step, action = %action, "Reviewer decision");
        let session_id = result.session.id.clone();
        result = engine.resume(&session_id, action, edits).await?;
    }
    Ok(result)
}

/// Print the outcome and turn a failed, blocked, or aborted run into an error.
fn report(cli: &Cli, ui: Option<&PipelineUI>, result: &PipelineResult) -> Result<()> {
    if cli.json {
        print_json(&result.to_response_json())?;
    } else if let Some(ui) = ui {
        ui.finish(result);
        if result.is_awaiting_approval() {
            println!();
            println!(
                "Review with `drawing-pipeline review {} <step>`, then `drawing-pipeline resume {} approve`.",
                result.session_id(),
                result.session_id()
            );
        } else {
            println!("Session: {}", style(result.session_id()).cyan());
        }
    }

    match &result.outcome {
        PipelineOutcome::Completed { .. } | PipelineOutcome::AwaitingApproval { .. } => Ok(()),
        other => anyhow::bail!("Pipeline {}", other.kind()),
    }
}
