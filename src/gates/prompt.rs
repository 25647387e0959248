use crate::engine::StepReview;
use crate::session::{ResumeAction, StepStatus};
use crate::ui::icons::{GATE, WARNING};
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use serde_json::Value;

/// Lines of stage data shown before truncating.
const PREVIEW_LINES: usize = 40;

/// Terminal prompt for the reviewer decision on a paused stage.
pub struct ApprovalPrompt {
    pub auto_approve: bool,
}

impl ApprovalPrompt {
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }

    /// Show the paused stage and ask what to do. Returns the action and, for
    /// `edit`, the JSON to merge into the stage output.
    pub fn decide(&self, review: &StepReview) -> Result<(ResumeAction, Option<Value>)> {
        print_review(review);

        if self.auto_approve {
            println!("  {} (--yes flag)", style("Auto-approved").dim());
            return Ok((ResumeAction::Approve, None));
        }

        let options = &[
            "Approve and continue",
            "Edit the step output",
            "Retry this step",
            "Skip this step",
            "Abort analysis",
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("How should the pipeline proceed?")
            .items(options)
            .default(0)
            .interact()?;

        match selection {
            0 => Ok((ResumeAction::Approve, None)),
            1 => Ok((ResumeAction::Edit, Some(prompt_edit(review)?))),
            2 => Ok((ResumeAction::Retry, None)),
            3 => Ok((ResumeAction::Skip, None)),
            _ => Ok((ResumeAction::Abort, None)),
        }
    }
}

fn prompt_edit(review: &StepReview) -> Result<Value> {
    println!(
        "  {} {}",
        style("Editable fields:").dim(),
        review.editable_fields.join(", ")
    );
    let text: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("JSON to merge into the step output")
        .validate_with(|input: &String| -> Result<(), String> {
            serde_json::from_str::<Value>(input)
                .map(|_| ())
                .map_err(|e| format!("Invalid JSON: {}", e))
        })
        .interact_text()?;
    serde_json::from_str(&text).context("Failed to parse edited JSON")
}

fn print_review(review: &StepReview) {
    println!();
    let gate = if review.is_gate { format!("{}", GATE) } else { String::new() };
    println!(
        "{}{} {}",
        gate,
        style(format!("Step {}", review.step)).bold().cyan(),
        style(&review.step_name).bold()
    );

    let status = match review.status {
        StepStatus::Passed => style(review.status.as_str()).green(),
        StepStatus::Failed => style(review.status.as_str()).red(),
        StepStatus::Skipped => style(review.status.as_str()).yellow(),
    };
    println!("  Status: {}{}", status, if review.edited { " (edited)" } else { "" });
    if let Some(error) = &review.error {
        println!("  Error: {}", style(error).red());
    }
    if review.has_warnings {
        println!("  {} {}", WARNING, style("This step reported warnings").yellow());
    }
    println!("  {}", style(&review.help_text).dim());

    if let Some(data) = &review.data {
        let pretty = serde_json::to_string_pretty(data).unwrap_or_default();
        let total = pretty.lines().count();
        for line in pretty.lines().take(PREVIEW_LINES) {
            println!("    {}", line);
        }
        if total > PREVIEW_LINES {
            println!("    {}", style(format!("... {} more lines", total - PREVIEW_LINES)).dim());
        }
    }
    println!();
}
