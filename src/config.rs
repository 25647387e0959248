//! Project configuration read from `.pipeline/pipeline.toml`.
//!
//! Settings are layered file → environment → CLI flags:
//!
//! ```toml
//! [engine]
//! stop_on_gate_failure = true
//! intervention_mode = "all_steps"
//! debug = false
//! purposes = ["production_modeling", "cnc_generation", "material_takeoff"]
//!
//! [cache]
//! backend = "sqlite"
//! path = "sessions.db"
//! step_ttl_hours = 24
//! state_ttl_hours = 48
//! input_ttl_hours = 48
//!
//! [logging]
//! filter = "drawing_pipeline=info"
//! json = false
//! file = false
//!
//! [[stages]]
//! step = 1
//! command = "./stages/context.sh"
//! timeout_secs = 300
//! ```
//!
//! Environment overrides: `PIPELINE_INTERVENTION_MODE`, `PIPELINE_DEBUG`,
//! `PIPELINE_STORE_PATH`.

use crate::engine::{PipelineEngine, RunOptions};
use crate::session::{
    CacheTtl, DEFAULT_PURPOSES, InterventionMode, MemorySessionStore, SessionCache, SqliteSessionStore,
};
use crate::step::{CommandStep, StageDefinition, StepContract, StepInputs, StepNumber, StepOutcome, StepTable};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory under the project root holding config, the session store, and logs.
pub const PIPELINE_DIR: &str = ".pipeline";
pub const CONFIG_FILE: &str = "pipeline.toml";

pub const ENV_INTERVENTION_MODE: &str = "PIPELINE_INTERVENTION_MODE";
pub const ENV_DEBUG: &str = "PIPELINE_DEBUG";
pub const ENV_STORE_PATH: &str = "PIPELINE_STORE_PATH";

const BACKEND_SQLITE: &str = "sqlite";
const BACKEND_MEMORY: &str = "memory";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSection {
    /// Whether a denied intent gate halts the run.
    #[serde(default = "default_true")]
    pub stop_on_gate_failure: bool,
    /// Pause policy for interactive runs.
    #[serde(default = "default_interactive_mode")]
    pub intervention_mode: InterventionMode,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_purposes")]
    pub purposes: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_interactive_mode() -> InterventionMode {
    InterventionMode::AllSteps
}

fn default_purposes() -> Vec<String> {
    DEFAULT_PURPOSES.iter().map(|p| p.to_string()).collect()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            stop_on_gate_failure: true,
            intervention_mode: default_interactive_mode(),
            debug: false,
            purposes: default_purposes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    /// `sqlite` or `memory`. A memory store does not survive the process.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Relative paths resolve against `.pipeline/`.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_step_ttl")]
    pub step_ttl_hours: u64,
    #[serde(default = "default_state_ttl")]
    pub state_ttl_hours: u64,
    #[serde(default = "default_state_ttl")]
    pub input_ttl_hours: u64,
}

fn default_backend() -> String {
    BACKEND_SQLITE.to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("sessions.db")
}

fn default_step_ttl() -> u64 {
    24
}

fn default_state_ttl() -> u64 {
    48
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
            step_ttl_hours: default_step_ttl(),
            state_ttl_hours: default_state_ttl(),
            input_ttl_hours: default_state_ttl(),
        }
    }
}

impl CacheSection {
    pub fn ttl(&self) -> CacheTtl {
        CacheTtl::from_hours(self.step_ttl_hours, self.state_ttl_hours, self.input_ttl_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
    /// Also write daily-rolling log files under `.pipeline/logs/`.
    #[serde(default)]
    pub file: bool,
}

fn default_filter() -> String {
    "drawing_pipeline=info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
            file: false,
        }
    }
}

/// Parsed `pipeline.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineToml {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

impl PipelineToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse pipeline.toml")
    }

    /// Load `pipeline.toml` from `pipeline_dir`, or defaults if it does not exist.
    pub fn load_or_default(pipeline_dir: &Path) -> Result<Self> {
        let config_path = pipeline_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize pipeline.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// The stage definition for `step`, the last one wins on duplicates.
    pub fn stage(&self, step: StepNumber) -> Option<&StageDefinition> {
        self.stages.iter().rev().find(|s| s.step == step)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let mut seen = BTreeSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.step) {
                warnings.push(format!(
                    "Stage {} is defined more than once; the last definition is used",
                    stage.step
                ));
            }
            if stage.command.trim().is_empty() {
                warnings.push(format!("Stage {} has an empty command", stage.step));
            }
            if stage.timeout_secs == 0 {
                warnings.push(format!("Stage {} has a zero timeout_secs", stage.step));
            }
        }
        let missing: Vec<String> = StepNumber::all()
            .filter(|step| !seen.contains(step))
            .map(|step| format!("{} ({})", step, step.name()))
            .collect();
        if !missing.is_empty() {
            warnings.push(format!("No command configured for stages: {}", missing.join(", ")));
        }

        let cache = &self.cache;
        for (name, hours) in [
            ("step_ttl_hours", cache.step_ttl_hours),
            ("state_ttl_hours", cache.state_ttl_hours),
            ("input_ttl_hours", cache.input_ttl_hours),
        ] {
            if hours == 0 {
                warnings.push(format!("cache.{} is 0; entries expire immediately", name));
            }
        }
        if cache.backend != BACKEND_SQLITE && cache.backend != BACKEND_MEMORY {
            warnings.push(format!(
                "Unknown cache backend '{}': expected 'sqlite' or 'memory'",
                cache.backend
            ));
        } else if cache.backend == BACKEND_MEMORY {
            warnings.push("cache.backend = 'memory' does not keep sessions between commands".to_string());
        }

        warnings
    }
}

/// Runtime configuration: the parsed file plus environment and CLI overrides.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub project_dir: PathBuf,
    pub pipeline_dir: PathBuf,
    pub toml: PipelineToml,
    pub verbose: bool,
    /// CLI override for the interactive intervention mode.
    pub cli_intervention_mode: Option<InterventionMode>,
    /// CLI `--debug`.
    pub cli_debug: bool,
}

impl PipelineConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let pipeline_dir = project_dir.join(PIPELINE_DIR);
        let toml = PipelineToml::load_or_default(&pipeline_dir)?;

        Ok(Self {
            project_dir,
            pipeline_dir,
            toml,
            verbose: false,
            cli_intervention_mode: None,
            cli_debug: false,
        })
    }

    pub fn with_cli_args(
        project_dir: PathBuf,
        verbose: bool,
        intervention_mode: Option<InterventionMode>,
        debug: bool,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.cli_intervention_mode = intervention_mode;
        config.cli_debug = debug;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.pipeline_dir.join(CONFIG_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.pipeline_dir.join("logs")
    }

    /// Session store path (env → file), resolved against `.pipeline/`.
    pub fn store_path(&self) -> PathBuf {
        let path = std::env::var(ENV_STORE_PATH)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.toml.cache.path.clone());
        if path.is_absolute() {
            path
        } else {
            self.pipeline_dir.join(path)
        }
    }

    /// Intervention mode for interactive runs (CLI → env → file).
    pub fn intervention_mode(&self) -> Result<InterventionMode> {
        if let Some(mode) = self.cli_intervention_mode {
            return Ok(mode);
        }
        if let Ok(value) = std::env::var(ENV_INTERVENTION_MODE)
            && !value.is_empty()
        {
            return value
                .parse()
                .with_context(|| format!("Invalid {} environment variable", ENV_INTERVENTION_MODE));
        }
        Ok(self.toml.engine.intervention_mode)
    }

    /// Debug recording (CLI → env → file).
    pub fn debug(&self) -> bool {
        if self.cli_debug {
            return true;
        }
        if let Ok(value) = std::env::var(ENV_DEBUG) {
            return matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        self.toml.engine.debug
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }

    /// Run options seeded from `[engine]`.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            purposes: self.toml.engine.purposes.clone(),
            stop_on_gate_failure: self.toml.engine.stop_on_gate_failure,
            ..RunOptions::default()
        }
    }

    /// Open the configured session store.
    pub async fn open_cache(&self) -> Result<SessionCache> {
        let ttl = self.toml.cache.ttl();
        match self.toml.cache.backend.as_str() {
            BACKEND_MEMORY => Ok(SessionCache::new(Arc::new(MemorySessionStore::new()), ttl)),
            BACKEND_SQLITE => {
                let path = self.store_path();
                let store = SqliteSessionStore::open(&path)
                    .await
                    .with_context(|| format!("Failed to open session store: {}", path.display()))?;
                store.purge_expired().await.context("Failed to purge expired sessions")?;
                Ok(SessionCache::new(Arc::new(store), ttl))
            }
            other => anyhow::bail!("Unknown cache backend '{}': expected 'sqlite' or 'memory'", other),
        }
    }

    /// Stage table built from `[[stages]]`; every stage must have a command.
    pub fn step_table(&self) -> Result<StepTable> {
        let builder = StepNumber::all().fold(StepTable::builder(), |builder, step| match self.toml.stage(step) {
            Some(definition) => builder.with(step, Arc::new(CommandStep::new(definition.clone(), &self.project_dir))),
            None => builder,
        });
        builder
            .build()
            .with_context(|| format!("Incomplete [[stages]] in {}", self.config_file().display()))
    }

    /// Engine that can execute stages; requires every stage to be configured.
    pub async fn build_engine(&self) -> Result<PipelineEngine> {
        let steps = self.step_table()?;
        let cache = self.open_cache().await?;
        Ok(PipelineEngine::new(steps, cache).with_debug(self.debug()))
    }

    /// Engine for commands that only read or edit stored sessions.
    pub async fn inspection_engine(&self) -> Result<PipelineEngine> {
        let steps = StepTable::builder().with_all(Arc::new(Unconfigured)).build()?;
        let cache = self.open_cache().await?;
        Ok(PipelineEngine::new(steps, cache))
    }
}

/// Placeholder stage for engines that never execute.
struct Unconfigured;

#[async_trait]
impl StepContract for Unconfigured {
    async fn execute(&self, inputs: StepInputs) -> Result<StepOutcome> {
        anyhow::bail!(
            "No command configured for stage {} ({})",
            inputs.step,
            inputs.step_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn full_stages() -> String {
        (1..=10)
            .map(|n| format!("[[stages]]\nstep = {}\ncommand = \"./stage{}.sh\"\n", n, n))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let toml = PipelineToml::parse("").unwrap();
        assert!(toml.engine.stop_on_gate_failure);
        assert_eq!(toml.engine.intervention_mode, InterventionMode::AllSteps);
        assert_eq!(toml.engine.purposes.len(), 3);
        assert_eq!(toml.cache.backend, "sqlite");
        assert_eq!(toml.cache.ttl(), CacheTtl::default());
        assert_eq!(toml.logging.filter, "drawing_pipeline=info");
        assert!(toml.stages.is_empty());
    }

    #[test]
    fn test_parse_sections() {
        let content = r#"
[engine]
stop_on_gate_failure = false
intervention_mode = "gates"
purposes = ["cnc_generation"]

[cache]
backend = "memory"
step_ttl_hours = 1

[logging]
json = true

[[stages]]
step = 4
command = "python validate.py"
timeout_secs = 30
working_dir = "stages"
"#;
        let toml = PipelineToml::parse(content).unwrap();
        assert!(!toml.engine.stop_on_gate_failure);
        assert_eq!(toml.engine.intervention_mode, InterventionMode::GatesOnly);
        assert_eq!(toml.engine.purposes, vec!["cnc_generation"]);
        assert_eq!(toml.cache.backend, "memory");
        assert_eq!(toml.cache.step_ttl_hours, 1);
        assert_eq!(toml.cache.state_ttl_hours, 48);
        assert!(toml.logging.json);

        let stage = toml.stage(StepNumber::INTENT_GATE).unwrap();
        assert_eq!(stage.command, "python validate.py");
        assert_eq!(stage.timeout_secs, 30);
        assert_eq!(stage.working_dir.as_deref(), Some(Path::new("stages")));
    }

    #[test]
    fn test_parse_rejects_out_of_range_step() {
        let content = "[[stages]]\nstep = 11\ncommand = \"x\"\n";
        assert!(PipelineToml::parse(content).is_err());
    }

    #[test]
    fn test_validate_complete_config() {
        let toml = PipelineToml::parse(&full_stages()).unwrap();
        assert!(toml.validate().is_empty(), "{:?}", toml.validate());
    }

    #[test]
    fn test_validate_reports_problems() {
        let content = r#"
[cache]
backend = "redis"
state_ttl_hours = 0

[[stages]]
step = 1
command = "a"

[[stages]]
step = 1
command = "b"
timeout_secs = 0
"#;
        let toml = PipelineToml::parse(content).unwrap();
        let warnings = toml.validate();
        assert!(warnings.iter().any(|w| w.contains("defined more than once")));
        assert!(warnings.iter().any(|w| w.contains("zero timeout_secs")));
        assert!(warnings.iter().any(|w| w.contains("No command configured for stages: 2 (")));
        assert!(warnings.iter().any(|w| w.contains("state_ttl_hours is 0")));
        assert!(warnings.iter().any(|w| w.contains("Unknown cache backend 'redis'")));
        assert_eq!(toml.stage(StepNumber::FIRST).unwrap().command, "b");
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut toml = PipelineToml::default();
        toml.engine.debug = true;
        toml.stages.push(StageDefinition::new(StepNumber::FIRST, "./context.sh").with_timeout(5));
        toml.save(&path).unwrap();

        let loaded = PipelineToml::load(&path).unwrap();
        assert_eq!(loaded, toml);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let toml = PipelineToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml, PipelineToml::default());
    }

    #[test]
    fn test_config_paths_and_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        unsafe {
            std::env::remove_var(ENV_STORE_PATH);
            std::env::remove_var(ENV_INTERVENTION_MODE);
            std::env::remove_var(ENV_DEBUG);
        }

        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PIPELINE_DIR)).unwrap();
        let config = PipelineConfig::new(dir.path().to_path_buf()).unwrap();

        assert!(config.config_file().ends_with(".pipeline/pipeline.toml"));
        assert!(config.store_path().ends_with(".pipeline/sessions.db"));
        assert!(config.log_dir().ends_with(".pipeline/logs"));
        assert_eq!(config.intervention_mode().unwrap(), InterventionMode::AllSteps);
        assert!(!config.debug());

        unsafe {
            std::env::set_var(ENV_INTERVENTION_MODE, "errors");
            std::env::set_var(ENV_DEBUG, "1");
            std::env::set_var(ENV_STORE_PATH, "other.db");
        }
        assert_eq!(config.intervention_mode().unwrap(), InterventionMode::OnError);
        assert!(config.debug());
        assert!(config.store_path().ends_with(".pipeline/other.db"));

        let cli = PipelineConfig::with_cli_args(dir.path().to_path_buf(), true, Some(InterventionMode::None), false)
            .unwrap();
        assert_eq!(cli.intervention_mode().unwrap(), InterventionMode::None);

        unsafe { std::env::set_var(ENV_INTERVENTION_MODE, "sometimes") };
        assert!(config.intervention_mode().is_err());

        unsafe {
            std::env::remove_var(ENV_STORE_PATH);
            std::env::remove_var(ENV_INTERVENTION_MODE);
            std::env::remove_var(ENV_DEBUG);
        }
    }

    #[test]
    fn test_step_table_requires_every_stage() {
        let dir = tempdir().unwrap();
        let pipeline_dir = dir.path().join(PIPELINE_DIR);
        std::fs::create_dir_all(&pipeline_dir).unwrap();
        std::fs::write(pipeline_dir.join(CONFIG_FILE), "[[stages]]\nstep = 1\ncommand = \"true\"\n").unwrap();

        let config = PipelineConfig::new(dir.path().to_path_buf()).unwrap();
        let err = config.step_table().err().unwrap();
        assert!(format!("{:#}", err).contains("Incomplete [[stages]]"));

        std::fs::write(pipeline_dir.join(CONFIG_FILE), full_stages()).unwrap();
        let config = PipelineConfig::new(dir.path().to_path_buf()).unwrap();
        assert!(config.step_table().is_ok());
    }

    #[tokio::test]
    async fn test_open_memory_cache() {
        let dir = tempdir().unwrap();
        let pipeline_dir = dir.path().join(PIPELINE_DIR);
        std::fs::create_dir_all(&pipeline_dir).unwrap();
        std::fs::write(
            pipeline_dir.join(CONFIG_FILE),
            "[cache]\nbackend = \"memory\"\nstep_ttl_hours = 2\n",
        )
        .unwrap();

        let config = PipelineConfig::new(dir.path().to_path_buf()).unwrap();
        let cache = config.open_cache().await.unwrap();
        assert_eq!(cache.ttl().step, std::time::Duration::from_secs(7200));

        // No stages configured, but stored sessions can still be inspected.
        let engine = config.inspection_engine().await.unwrap();
        let err = engine.load_session("missing").await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
