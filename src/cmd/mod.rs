//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                          |
//! |------------|-------------------------------------------|
//! | `project`  | `Init`                                    |
//! | `run`      | `Run`, `Resume`, `Rerun`, `Steps`         |
//! | `session`  | `Status`, `Review`, `Edit`, `Mode`, `Export` |
//! | `debug`    | `Debug`                                   |
//! | `config`   | `Config`                                  |

pub mod config;
pub mod debug;
pub mod project;
pub mod run;
pub mod session;

pub use config::cmd_config;
pub use debug::cmd_debug;
pub use project::cmd_init;
pub use run::{RunRequest, cmd_rerun, cmd_resume, cmd_run, cmd_steps};
pub use session::{cmd_edit, cmd_export, cmd_mode, cmd_review, cmd_status};

use anyhow::{Context, Result};
use drawing_pipeline::config::PipelineConfig;
use drawing_pipeline::session::InterventionMode;
use drawing_pipeline::step::StepNumber;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::{Cli, Commands};

/// Resolve configuration with the CLI flags layered on top.
pub fn load_config(cli: &Cli, project_dir: PathBuf) -> Result<PipelineConfig> {
    let mode = match &cli.command {
        Commands::Run { mode: Some(mode), .. } => Some(mode.parse::<InterventionMode>()?),
        _ => None,
    };
    PipelineConfig::with_cli_args(project_dir, cli.verbose, mode, cli.debug)
}

pub fn parse_step(n: u8) -> Result<StepNumber> {
    StepNumber::try_from(n).map_err(anyhow::Error::msg)
}

/// JSON from an inline argument or a file, if either was given.
pub fn read_json_arg(inline: Option<&str>, file: Option<&Path>) -> Result<Option<Value>> {
    let text = match (inline, file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read JSON file: {}", path.display()))?,
        (None, None) => return Ok(None),
    };
    let value = serde_json::from_str(&text).context("Failed to parse JSON argument")?;
    Ok(Some(value))
}

pub fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
