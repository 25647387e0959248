//! Session troubleshooting - `drawing-pipeline debug <session>`.

use anyhow::{Context, Result};
use console::style;
use drawing_pipeline::config::PipelineConfig;
use drawing_pipeline::debug::{DebugViewer, DependencyInput, ReportFormat, ViewMode};
use drawing_pipeline::step::StepNumber;
use drawing_pipeline::ui::icons::{CROSS, WARNING};
use serde_json::Value;
use std::collections::BTreeMap;

use super::super::DebugCommands;
use super::{parse_step, print_json};

pub async fn cmd_debug(config: &PipelineConfig, session_id: &str, command: DebugCommands) -> Result<()> {
    let engine = config.inspection_engine().await?;
    let session = engine.load_session(session_id).await?;
    let viewer = DebugViewer::new(&session);

    match command {
        DebugCommands::Overview => {
            let overview = viewer.steps_overview();
            println!();
            println!(
                "{} {} ({}/10 passed, {} failed, {}ms)",
                style("Session").bold(),
                style(&overview.session_id).cyan(),
                overview.completed_count,
                overview.failed_count,
                overview.total_duration_ms
            );
            println!();
            for step in &overview.steps {
                let flags = format!(
                    "{}{}{}",
                    if step.has_warnings { format!(" {}", WARNING) } else { String::new() },
                    if step.has_errors { format!(" {}", CROSS) } else { String::new() },
                    if step.was_edited { " edited" } else { "" }
                );
                println!(
                    "  {:>2} {:<36} {:<13} {:>8}{}",
                    step.number,
                    step.name,
                    step.status,
                    step.duration_ms.map(|ms| format!("{}ms", ms)).unwrap_or_default(),
                    flags
                );
                if !step.data_keys.is_empty() {
                    println!("     {}", style(step.data_keys.join(", ")).dim());
                }
            }
            println!();
        }
        DebugCommands::Step { step, view } => {
            let step = parse_step(step)?;
            let view: ViewMode = view.parse()?;
            match viewer.step_detail(step, view) {
                Some(detail) => print_json(&detail)?,
                None => anyhow::bail!("Step {} not found in session {}", step, session.id),
            }
        }
        DebugCommands::Flow => {
            println!();
            for entry in viewer.data_flow() {
                println!(
                    "{:>2} {} [{}]",
                    entry.step,
                    style(entry.name).bold(),
                    entry.status
                );
                if entry.receives_from.is_empty() {
                    println!("     <- drawing input");
                }
                for (dep, input) in &entry.input_summary {
                    let keys = match input {
                        DependencyInput::Keys(keys) => keys.join(", "),
                        DependencyInput::Missing(text) => style(*text).red().to_string(),
                    };
                    println!("     <- {:>2}: {}", dep, keys);
                }
                if !entry.output_keys.is_empty() {
                    println!("     -> {}", entry.output_keys.join(", "));
                }
            }
            println!();
        }
        DebugCommands::Compare { expected } => {
            let text = std::fs::read_to_string(&expected)
                .with_context(|| format!("Failed to read expected results: {}", expected.display()))?;
            let expected: BTreeMap<StepNumber, Value> = serde_json::from_str(&text)
                .context("Expected results must be a JSON object keyed by stage number")?;
            print_json(&viewer.compare_steps(&expected))?;
        }
        DebugCommands::Report { format } => {
            let format: ReportFormat = format.parse()?;
            println!("{}", viewer.render_report(format)?);
        }
        DebugCommands::Log => {
            if session.debug_log.is_empty() {
                println!("No debug entries recorded. Start the run with --debug or PIPELINE_DEBUG=1.");
            } else {
                println!("{}", session.formatted_debug_log());
            }
        }
    }
    Ok(())
}
