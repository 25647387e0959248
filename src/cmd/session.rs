//! Session inspection and editing - `status`, `review`, `edit`, `mode`, `export`.

use anyhow::{Context, Result};
use console::style;
use drawing_pipeline::config::PipelineConfig;
use drawing_pipeline::session::{InterventionMode, StepStatus};
use drawing_pipeline::step::StepNumber;
use drawing_pipeline::ui::icons::{CHECK, CROSS, GATE, PAUSE, SKIP, WARNING};
use std::path::Path;

use super::super::Cli;
use super::{parse_step, print_json};

pub async fn cmd_status(cli: &Cli, config: &PipelineConfig, session_id: &str) -> Result<()> {
    let engine = config.inspection_engine().await?;
    let session = engine.load_session(session_id).await?;
    let summary = engine.state_summary(&session);

    if cli.json {
        return print_json(&summary);
    }

    println!();
    println!("Session: {}", style(&summary.session_id).cyan().bold());
    println!("Status:  {}", summary.status);
    println!("Mode:    {}", summary.intervention_mode);
    println!(
        "Progress: {}/{} stages ({}%)",
        summary.completed_steps.len(),
        summary.total_steps,
        summary.progress_percent
    );
    println!("Started: {}", summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(saved) = summary.saved_at {
        println!("Saved:   {}", saved.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();

    for step in StepNumber::all() {
        let marker = match summary.step_statuses.get(&step) {
            Some(StepStatus::Passed) => format!("{}", CHECK),
            Some(StepStatus::Failed) => format!("{}", CROSS),
            Some(StepStatus::Skipped) => format!("{}", SKIP),
            None => "  ".to_string(),
        };
        let gate = if step.is_gate() { format!("{}", GATE) } else { String::new() };
        let paused = if summary.paused_at_step == Some(step) {
            format!(" {}", PAUSE)
        } else {
            String::new()
        };
        let edited = session
            .result(step)
            .filter(|r| r.edited)
            .map(|_| style(" (edited)").dim().to_string())
            .unwrap_or_default();
        println!("  {} {:>2} {}{}{}{}", marker, step, gate, step.name(), edited, paused);
    }
    println!();
    if summary.approval_count > 0 {
        println!("{} reviewer decision(s) recorded", summary.approval_count);
    }
    Ok(())
}

pub async fn cmd_review(cli: &Cli, config: &PipelineConfig, session_id: &str, step: u8) -> Result<()> {
    let step = parse_step(step)?;
    let engine = config.inspection_engine().await?;
    let session = engine.load_session(session_id).await?;
    let review = engine.get_step_for_review(&session, step)?;

    if cli.json {
        return print_json(&review);
    }

    println!();
    println!(
        "{}{} {}",
        if review.is_gate { format!("{}", GATE) } else { String::new() },
        style(format!("Step {}", review.step)).bold().cyan(),
        style(&review.step_name).bold()
    );
    println!("  Status: {}{}", review.status.as_str(), if review.edited { " (edited)" } else { "" });
    println!("  Duration: {}ms", review.duration_ms);
    if let Some(error) = &review.error {
        println!("  Error: {}", style(error).red());
    }
    if review.has_warnings {
        println!("  {} {}", WARNING, style("This step reported warnings").yellow());
    }
    println!("  Editable fields: {}", review.editable_fields.join(", "));
    println!("  {}", style(&review.help_text).dim());
    if let Some(data) = &review.data {
        println!();
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    println!();
    Ok(())
}

pub async fn cmd_edit(cli: &Cli, config: &PipelineConfig, session_id: &str, step: u8, data: &str) -> Result<()> {
    let step = parse_step(step)?;
    let updates = serde_json::from_str(data).context("Edit data must be valid JSON")?;
    let engine = config.inspection_engine().await?;
    let session = engine.update_session_step(session_id, step, updates).await?;

    if cli.json {
        return print_json(&engine.get_step_for_review(&session, step)?);
    }
    println!("{} Updated step {} ({}) in session {}", CHECK, step, step.name(), style(&session.id).cyan());
    Ok(())
}

pub async fn cmd_mode(cli: &Cli, config: &PipelineConfig, session_id: &str, mode: &str) -> Result<()> {
    let mode: InterventionMode = mode.parse()?;
    let engine = config.inspection_engine().await?;
    let session = engine.set_intervention_mode(session_id, mode).await?;

    if cli.json {
        return print_json(&engine.state_summary(&session));
    }
    println!("Session {} now uses intervention mode {}", style(&session.id).cyan(), mode);
    Ok(())
}

pub async fn cmd_export(config: &PipelineConfig, session_id: &str, output: Option<&Path>) -> Result<()> {
    let engine = config.inspection_engine().await?;
    let session = engine.load_session(session_id).await?;
    let export = engine.export_for_persistence(&session);
    let content = serde_json::to_string_pretty(&export)?;

    match output {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("Failed to write export: {}", path.display()))?;
            eprintln!("Exported session {} to {}", session.id, path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
