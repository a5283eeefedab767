//! Top-level bootstrap sequence

use colored::Colorize;
use tracing::{info, warn};

use crate::app::options::BootstrapOptions;
use crate::config::answers::{is_affirmative, AnswerSource, PromptSpec};
use crate::config::collector::ConfigCollector;
use crate::config::model::DeploymentConfig;
use crate::config::writer::ConfigWriter;
use crate::errors::BootstrapError;
use crate::preconditions::{check_preconditions, refresh_delegation, PrivilegeProbe};
use crate::prereqs::{ensure_prerequisites, extend_search_path, ToolInstaller};
use crate::secrets::SecretGenerator;
use crate::stages::engine::ProvisioningEngine;
use crate::stages::runner::{PipelineReport, StageRunner};
use crate::stages::stage::{Inventory, ProvisioningStage};
use crate::transport::ReachabilityProbe;

/// How a run ended when nothing went wrong
#[derive(Debug)]
pub enum RunOutcome {
    /// Every stage succeeded
    Completed(PipelineReport),
    /// The operator declined the confirmation gate
    Cancelled,
}

/// Capabilities the orchestrator drives
pub struct Collaborators<'a> {
    pub privileges: &'a dyn PrivilegeProbe,
    pub installer: &'a dyn ToolInstaller,
    pub answers: &'a mut dyn AnswerSource,
    pub generator: &'a SecretGenerator,
    pub engine: &'a dyn ProvisioningEngine,
    pub reachability: &'a dyn ReachabilityProbe,
}

/// Runs a node bootstrap from preconditions to the final report
pub struct Orchestrator<'a> {
    options: BootstrapOptions,
    collaborators: Collaborators<'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(options: BootstrapOptions, collaborators: Collaborators<'a>) -> Self {
        Self {
            options,
            collaborators,
        }
    }

    pub async fn run(mut self) -> Result<RunOutcome, BootstrapError> {
        check_preconditions(self.collaborators.privileges).await?;

        if let Some(home) = &self.options.home_dir {
            extend_search_path(home).await?;
        }
        section("Prerequisites");
        for (tool, status) in ensure_prerequisites(self.collaborators.installer).await? {
            println!("  {:<18} {}", tool.binary, status);
        }

        section("Configuration");
        let config = ConfigCollector::new(&mut *self.collaborators.answers, self.collaborators.generator)
            .collect()?;
        let secrets = self.collaborators.generator.generate_all()?;
        ConfigWriter::new()
            .write(&config, &secrets, &self.options.artifact_path)
            .await?;

        print_summary(&config);
        println!(
            "  {} {}",
            "Configuration written to".dimmed(),
            self.options.artifact_path.display()
        );

        let answer = self
            .collaborators
            .answers
            .next_answer(&PromptSpec::proceed_gate())?;
        if !is_affirmative(&answer) {
            info!("Operator declined provisioning");
            println!("{}", "Provisioning cancelled, no changes were made.".yellow());
            return Ok(RunOutcome::Cancelled);
        }

        let inventory = Inventory::for_config(&config);
        if let Inventory::Remote { host } = &inventory {
            self.collaborators.reachability.check(host).await?;
        }
        // The prompts may have outlived the sudo timestamp
        refresh_delegation(self.collaborators.privileges).await?;

        section("Provisioning");
        let report = StageRunner::new(self.collaborators.engine)
            .run(ProvisioningStage::pipeline(&inventory), &self.options.artifact_path)
            .await?
            .into_result()?;

        self.print_report(&config);
        Ok(RunOutcome::Completed(report))
    }

    fn print_report(&self, config: &DeploymentConfig) {
        println!();
        println!("{}", "Build node bootstrapped successfully.".green().bold());
        println!("  Frontend:  {}", config.frontend_baseurl);
        println!("  Node root: {}", self.options.layout.base_dir.display());
        println!();
        println!("Next steps:");
        println!(
            "  - allow {} as a redirect target for OAuth client {}",
            config.frontend_baseurl, config.oauth_client_id
        );
        println!("  - open a new shell so ~/.local/bin is on your PATH");
        warn!(
            "{} contains plaintext secrets; restrict its permissions",
            self.options.artifact_path.display()
        );
        println!(
            "  - {} holds plaintext secrets, keep it private",
            self.options.artifact_path.display()
        );
    }
}

/// Follow-up lines printed after a failed run
pub fn failure_guidance(err: &BootstrapError) -> Vec<String> {
    let mut lines = Vec::new();
    match err {
        BootstrapError::StageFailed { index, name, .. } => {
            lines.push(format!("Stage {} ({}) failed; inspect its output above.", index, name));
            lines.push(
                "Set NODEBOOT_LOG_LEVEL=debug to see the full provisioning output.".to_string(),
            );
        }
        BootstrapError::TargetUnreachable(_) => {
            lines.push("Check that the target accepts key-based ssh logins.".to_string());
        }
        _ => {}
    }
    lines.push(
        "Re-running nodeboot is safe: completed steps are detected and left as they are."
            .to_string(),
    );
    lines
}

fn section(title: &str) {
    println!();
    println!("{}", title.bold().underline());
}

fn print_summary(config: &DeploymentConfig) {
    section("Summary");
    for (key, value) in config.summary() {
        println!("  {:<26} {}", key.as_str(), value);
    }
}
