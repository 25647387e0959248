//! Project initialization - `drawing-pipeline init`.

use anyhow::{Context, Result};
use drawing_pipeline::config::{CONFIG_FILE, PIPELINE_DIR, PipelineToml};
use drawing_pipeline::step::{STEP_SPECS, StageDefinition, StepNumber};
use std::path::Path;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let pipeline_dir = project_dir.join(PIPELINE_DIR);
    let config_path = pipeline_dir.join(CONFIG_FILE);

    if config_path.exists() {
        println!("Pipeline already initialized at {}", pipeline_dir.display());
        println!("Delete {} first if you want to recreate it.", config_path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&pipeline_dir)
        .with_context(|| format!("Failed to create {}", pipeline_dir.display()))?;

    let toml = PipelineToml {
        stages: STEP_SPECS
            .iter()
            .zip(StepNumber::all())
            .map(|(spec, step)| StageDefinition::new(step, format!("./stages/{}.sh", spec.export_key)))
            .collect(),
        ..PipelineToml::default()
    };
    toml.save(&config_path)?;

    println!("Initialized drawing pipeline at {}", pipeline_dir.display());
    println!();
    println!("Created:");
    println!("  .pipeline/");
    println!("  └── pipeline.toml   # engine, cache, logging, and one [[stages]] entry per stage");
    println!();
    println!("Each stage command reads its inputs as JSON on stdin and prints");
    println!("{{\"success\": true, \"data\": {{...}}}} on stdout.");
    println!();
    println!("Next steps:");
    println!("  1. Point each [[stages]] command at your stage implementation");
    println!("  2. Run `drawing-pipeline config validate`");
    println!("  3. Run `drawing-pipeline run <drawing>`");
    Ok(())
}
