use crate::engine::{PipelineOutcome, PipelineResult};
use crate::hooks::{HookContext, StepObserver};
use crate::intervention::has_warnings;
use crate::session::StepStatus;
use crate::step::STEP_COUNT;
use crate::ui::icons::{BLOCKER, CHECK, CLOCK, CROSS, GATE, PAUSE, SKIP, SPARKLE, WARNING};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for a pipeline run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Stage bar - how many of the ten stages have finished
/// - Step spinner - the stage currently executing
///
/// Registered as a global [`StepObserver`], so the engine drives it through
/// the same hooks as any other observer.
pub struct PipelineUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    step_spinner: ProgressBar,
    verbose: bool,
}

impl PipelineUI {
    /// Create the UI. `completed` is how many stages already finished, for
    /// resumed sessions.
    pub fn new(completed: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let stage_bar = multi.add(ProgressBar::new(u64::from(STEP_COUNT)));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");
        stage_bar.set_position(completed);

        let spinner_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let step_spinner = multi.add(ProgressBar::new_spinner());
        step_spinner.set_style(spinner_style);
        step_spinner.set_prefix("  Step");

        Self {
            multi,
            stage_bar,
            step_spinner,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Hide the bars while `f` talks to the terminal directly.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.step_spinner.disable_steady_tick();
        self.multi.suspend(f)
    }

    /// Stop both bars and print a one-line summary of the outcome.
    pub fn finish(&self, result: &PipelineResult) {
        self.step_spinner.finish_and_clear();
        match &result.outcome {
            PipelineOutcome::Completed { total_duration_ms, .. } => {
                self.stage_bar.finish_with_message(format!("{}", style("complete").green()));
                self.print_line(format!(
                    "{} Analysis complete {}{}",
                    SPARKLE,
                    CLOCK,
                    style(format_duration(*total_duration_ms)).dim()
                ));
            }
            PipelineOutcome::Failed { step, step_name, error } => {
                self.stage_bar.abandon_with_message(format!("{}", style("failed").red()));
                self.print_line(format!(
                    "{} Failed at step {} ({}): {}",
                    CROSS,
                    step,
                    step_name,
                    style(error).red()
                ));
            }
            PipelineOutcome::Blocked { gate, blockers } => {
                self.stage_bar.abandon_with_message(format!("{}", style("blocked").red()));
                self.print_line(format!("{} Blocked at gate {}", GATE, style(gate).red().bold()));
                for blocker in blockers {
                    self.print_line(format!("    {} {}", BLOCKER, style(blocker).red()));
                }
            }
            PipelineOutcome::AwaitingApproval { step, step_name, .. } => {
                self.stage_bar.abandon_with_message(format!("{}", style("paused").yellow()));
                self.print_line(format!(
                    "{} Awaiting review of step {} ({}) in session {}",
                    PAUSE,
                    step,
                    step_name,
                    style(&result.session.id).cyan()
                ));
            }
            PipelineOutcome::Aborted { step } => {
                self.stage_bar.abandon_with_message(format!("{}", style("aborted").red()));
                self.print_line(format!("{} Aborted at step {}", CROSS, step));
            }
        }
    }
}

impl StepObserver for PipelineUI {
    fn on_before(&self, ctx: &HookContext<'_>) -> anyhow::Result<()> {
        self.stage_bar
            .set_message(format!("{}: {}", style(ctx.step).yellow(), ctx.step_name));
        self.step_spinner.set_message(format!("Running {}", ctx.step_name));
        self.step_spinner.enable_steady_tick(Duration::from_millis(100));
        Ok(())
    }

    fn on_after(&self, ctx: &HookContext<'_>) -> anyhow::Result<()> {
        let Some(result) = ctx.result else {
            return Ok(());
        };
        self.step_spinner.set_message("");
        let duration = style(format_duration(result.duration_ms)).dim();
        match result.status {
            StepStatus::Passed => {
                self.stage_bar.inc(1);
                let warn = if has_warnings(result) {
                    format!(" {}", WARNING)
                } else {
                    String::new()
                };
                self.print_line(format!(
                    "{} Step {} {} {}{}",
                    CHECK,
                    ctx.step,
                    ctx.step_name,
                    duration,
                    warn
                ));
            }
            StepStatus::Failed => {
                self.print_line(format!(
                    "{} Step {} {} {}",
                    CROSS,
                    ctx.step,
                    style(ctx.step_name).red(),
                    duration
                ));
                if self.verbose
                    && let Some(error) = &result.error
                {
                    self.print_line(format!("    {}", style(error).red()));
                }
            }
            StepStatus::Skipped => {
                self.print_line(format!("{} Step {} {}", SKIP, ctx.step, ctx.step_name));
            }
        }
        Ok(())
    }

    fn on_pause(&self, ctx: &HookContext<'_>) -> anyhow::Result<()> {
        if self.verbose {
            self.print_line(format!(
                "    {} {}",
                PAUSE,
                style(format!("pausing after step {}", ctx.step)).dim()
            ));
        }
        Ok(())
    }
}

/// Formats as `Nms`, `N.Ns`, or `Xm Ys`.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = ms / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
