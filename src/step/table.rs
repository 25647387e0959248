use super::{STEP_COUNT, StepContract, StepNumber};
use crate::errors::PipelineError;
use std::sync::Arc;

/// The ten stage implementations, one per stage number.
#[derive(Clone)]
pub struct StepTable {
    /// Always exactly `STEP_COUNT` entries, indexed by `StepNumber::index`.
    steps: Vec<Arc<dyn StepContract>>,
}

impl StepTable {
    pub fn builder() -> StepTableBuilder {
        StepTableBuilder::default()
    }

    pub fn get(&self, step: StepNumber) -> &Arc<dyn StepContract> {
        &self.steps[step.index()]
    }
}

/// Collects stage implementations; `build` fails if any stage is missing.
#[derive(Default)]
pub struct StepTableBuilder {
    steps: [Option<Arc<dyn StepContract>>; STEP_COUNT as usize],
}

impl StepTableBuilder {
    /// Register the implementation for a stage, replacing any earlier one.
    pub fn with(mut self, step: StepNumber, implementation: Arc<dyn StepContract>) -> Self {
        self.steps[step.index()] = Some(implementation);
        self
    }

    /// Register the same implementation for every stage.
    pub fn with_all(mut self, implementation: Arc<dyn StepContract>) -> Self {
        for slot in &mut self.steps {
            *slot = Some(implementation.clone());
        }
        self
    }

    pub fn build(self) -> Result<StepTable, PipelineError> {
        let mut steps = Vec::with_capacity(STEP_COUNT as usize);
        for (step, slot) in StepNumber::all().zip(self.steps) {
            steps.push(slot.ok_or(PipelineError::MissingStep(step))?);
        }
        Ok(StepTable { steps })
    }
}
