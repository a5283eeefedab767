//! Fail-fast execution of the provisioning pipeline

use std::path::Path;

use colored::Colorize;
use tracing::{error, info};

use crate::errors::BootstrapError;
use crate::stages::engine::ProvisioningEngine;
use crate::stages::fsm::{StageEvent, StageState};
use crate::stages::stage::ProvisioningStage;

/// Aggregate state of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    AllSucceeded,
    /// 1-based index of the stage that failed
    AbortedAtStage(usize),
}

/// Per-stage outcomes of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub stages: Vec<ProvisioningStage>,
    pub state: PipelineState,
}

impl PipelineReport {
    /// Turn an aborted pipeline into the error of its failed stage
    pub fn into_result(self) -> Result<PipelineReport, BootstrapError> {
        match self.state {
            PipelineState::AllSucceeded => Ok(self),
            PipelineState::AbortedAtStage(index) => {
                let stage = &self.stages[index - 1];
                Err(BootstrapError::StageFailed {
                    index,
                    name: stage.name.clone(),
                    cause: stage.error().unwrap_or("unknown failure").to_string(),
                })
            }
        }
    }
}

/// Runs stages in declared order, stopping at the first failure
pub struct StageRunner<'a> {
    engine: &'a dyn ProvisioningEngine,
}

impl<'a> StageRunner<'a> {
    pub fn new(engine: &'a dyn ProvisioningEngine) -> Self {
        Self { engine }
    }

    /// Run every stage against the artifact at `extra_vars`
    pub async fn run(
        &self,
        mut stages: Vec<ProvisioningStage>,
        extra_vars: &Path,
    ) -> Result<PipelineReport, BootstrapError> {
        let total = stages.len();
        let mut state = PipelineState::AllSucceeded;

        for (i, stage) in stages.iter_mut().enumerate() {
            let index = i + 1;
            transition(stage, StageEvent::Start)?;
            println!(
                "{} {} on {}",
                format!("[{}/{}]", index, total).bold(),
                stage.name,
                stage.inventory
            );
            info!("Stage {} ({}) started", index, stage.name);

            match self
                .engine
                .run(&stage.inventory, stage.procedure, extra_vars)
                .await
            {
                Ok(()) => {
                    transition(stage, StageEvent::Succeed)?;
                    println!("      {} {}", "ok".green().bold(), stage.name);
                    info!("Stage {} ({}) succeeded", index, stage.name);
                }
                Err(e) => {
                    transition(stage, StageEvent::Fail(e.to_string()))?;
                    println!("      {} {}: {}", "FAILED".red().bold(), stage.name, e);
                    error!("Stage {} ({}) failed: {}", index, stage.name, e);
                    state = PipelineState::AbortedAtStage(index);
                    break;
                }
            }
        }

        Ok(PipelineReport { stages, state })
    }
}

fn transition(stage: &mut ProvisioningStage, event: StageEvent) -> Result<(), BootstrapError> {
    stage.process(event).map_err(BootstrapError::EngineError)
}
