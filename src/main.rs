use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "drawing-pipeline")]
#[command(version, about = "Drive construction drawings through ten gated analysis stages")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Approve every paused stage without prompting
    #[arg(long, global = true)]
    pub yes: bool,

    /// Record a debug log on new sessions (overrides PIPELINE_DEBUG)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print machine-readable JSON on stdout instead of progress output
    #[arg(long, global = true)]
    pub json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .pipeline/ with a starter pipeline.toml
    Init,
    /// Analyse a drawing from stage 1
    Run {
        /// Drawing references (paths or URLs); more than one means a multi-image drawing
        #[arg(required = true)]
        drawings: Vec<String>,

        /// Pause for review according to the intervention mode
        #[arg(short, long)]
        interactive: bool,

        /// Intervention mode: none, gates_only, all_steps, on_warning, on_error
        #[arg(long)]
        mode: Option<String>,

        #[arg(long)]
        session_id: Option<String>,

        /// Analysis purpose (repeatable); defaults come from pipeline.toml
        #[arg(long = "purpose")]
        purposes: Vec<String>,

        /// Continue past a denied intent gate
        #[arg(long)]
        no_stop_on_gate: bool,

        /// Ask for a decision in the terminal whenever the run pauses
        #[arg(long)]
        prompt: bool,
    },
    /// Resume a paused session with approve, edit, retry, skip, or abort
    Resume {
        session_id: String,
        action: String,

        /// JSON to merge into the paused stage output (for edit)
        #[arg(long, conflicts_with = "data_file")]
        data: Option<String>,

        /// File holding the JSON to merge
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Keep prompting while the session stays paused
        #[arg(long)]
        prompt: bool,
    },
    /// Re-run a session from a given stage, reusing cached outputs before it
    Rerun {
        session_id: String,

        #[arg(long)]
        from: u8,

        /// Drawing references; the cached input is used when omitted
        drawings: Vec<String>,
    },
    /// Run selected stages standalone
    Steps {
        /// Comma-separated stage numbers, executed in the given order
        #[arg(value_delimiter = ',', required = true)]
        steps: Vec<u8>,

        #[arg(long, required = true, num_args = 1..)]
        drawings: Vec<String>,

        /// JSON object of prior stage outputs keyed by stage number
        #[arg(long)]
        prior: Option<PathBuf>,
    },
    /// Show the progress summary of a session
    Status { session_id: String },
    /// Show one stage of a session for review
    Review { session_id: String, step: u8 },
    /// Merge JSON into a stage's stored output without re-running it
    Edit {
        session_id: String,
        step: u8,
        /// JSON object to merge
        data: String,
    },
    /// Change the intervention mode of a session
    Mode { session_id: String, mode: String },
    /// Print the persistence export of a session
    Export {
        session_id: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Inspect a session for troubleshooting
    Debug {
        session_id: String,

        #[command(subcommand)]
        command: Option<DebugCommands>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum DebugCommands {
    /// One line per stage
    Overview,
    /// Detail for one stage
    Step {
        step: u8,
        /// summary, detailed, or raw
        #[arg(long, default_value = "detailed")]
        view: String,
    },
    /// What each stage received from its dependencies
    Flow,
    /// Compare stage outputs with expected JSON keyed by stage number
    Compare { expected: PathBuf },
    /// Full report as text, markdown, or json
    Report {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// The session's recorded debug log
    Log,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = cmd::load_config(&cli, project_dir)?;
    let _log_guard = drawing_pipeline::logging::init_logging(&config.toml.logging, &config.log_dir(), cli.verbose)?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config.project_dir)?,
        Commands::Run {
            drawings,
            interactive,
            mode: _,
            session_id,
            purposes,
            no_stop_on_gate,
            prompt,
        } => {
            let request = cmd::RunRequest {
                drawings: drawings.clone(),
                interactive: *interactive || *prompt,
                session_id: session_id.clone(),
                purposes: purposes.clone(),
                stop_on_gate_failure: !*no_stop_on_gate,
                prompt: *prompt,
            };
            cmd::cmd_run(&cli, &config, request).await?;
        }
        Commands::Resume {
            session_id,
            action,
            data,
            data_file,
            prompt,
        } => {
            let edits = cmd::read_json_arg(data.as_deref(), data_file.as_deref())?;
            cmd::cmd_resume(&cli, &config, session_id, action, edits, *prompt).await?;
        }
        Commands::Rerun {
            session_id,
            from,
            drawings,
        } => cmd::cmd_rerun(&cli, &config, session_id, *from, drawings).await?,
        Commands::Steps { steps, drawings, prior } => {
            cmd::cmd_steps(&cli, &config, steps, drawings, prior.as_deref()).await?
        }
        Commands::Status { session_id } => cmd::cmd_status(&cli, &config, session_id).await?,
        Commands::Review { session_id, step } => cmd::cmd_review(&cli, &config, session_id, *step).await?,
        Commands::Edit { session_id, step, data } => {
            cmd::cmd_edit(&cli, &config, session_id, *step, data).await?
        }
        Commands::Mode { session_id, mode } => cmd::cmd_mode(&cli, &config, session_id, mode).await?,
        Commands::Export { session_id, output } => {
            cmd::cmd_export(&config, session_id, output.as_deref()).await?
        }
        Commands::Debug { session_id, command } => {
            cmd::cmd_debug(&config, session_id, command.clone().unwrap_or(DebugCommands::Overview)).await?
        }
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
