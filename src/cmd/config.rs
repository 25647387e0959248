//! Configuration view and validation commands - `drawing-pipeline config`.

use anyhow::Result;
use drawing_pipeline::config::PipelineConfig;
use drawing_pipeline::step::StepNumber;

use super::super::ConfigCommands;

pub fn cmd_config(config: &PipelineConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Pipeline Configuration");
            println!("======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No pipeline.toml found at {}; using defaults.", config_path.display());
            }
            println!();

            let toml = &config.toml;
            println!("[engine]");
            println!("  stop_on_gate_failure = {}", toml.engine.stop_on_gate_failure);
            println!("  intervention_mode = \"{}\"", toml.engine.intervention_mode);
            println!("  debug = {}", toml.engine.debug);
            println!("  purposes = {:?}", toml.engine.purposes);
            println!();

            println!("[cache]");
            println!("  backend = \"{}\"", toml.cache.backend);
            println!("  path = \"{}\"", toml.cache.path.display());
            println!("  step_ttl_hours = {}", toml.cache.step_ttl_hours);
            println!("  state_ttl_hours = {}", toml.cache.state_ttl_hours);
            println!("  input_ttl_hours = {}", toml.cache.input_ttl_hours);
            println!();

            println!("[logging]");
            println!("  filter = \"{}\"", toml.logging.filter);
            println!("  json = {}", toml.logging.json);
            println!("  file = {}", toml.logging.file);
            println!();

            println!("Stages:");
            for step in StepNumber::all() {
                match toml.stage(step) {
                    Some(stage) => println!(
                        "  {:>2} {:<36} {} ({}s)",
                        step,
                        step.name(),
                        stage.command,
                        stage.timeout_secs
                    ),
                    None => println!(
                        "  {:>2} {:<36} {}",
                        step,
                        step.name(),
                        console::style("not configured").yellow()
                    ),
                }
            }
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("  intervention_mode = \"{}\"", config.intervention_mode()?);
            println!("  debug = {}", config.debug());
            println!("  store = {}", config.store_path().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
    }

    Ok(())
}
