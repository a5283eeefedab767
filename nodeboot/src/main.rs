//! nodeboot - Entry Point
//!
//! Interactive bootstrapper for a build-automation cluster node.

use std::process::ExitCode;

use colored::Colorize;
use tracing::{error, info};

use nodeboot::app::options::BootstrapOptions;
use nodeboot::app::orchestrator::{failure_guidance, Collaborators, Orchestrator, RunOutcome};
use nodeboot::config::answers::TerminalAnswers;
use nodeboot::errors::BootstrapError;
use nodeboot::logs::init_logging;
use nodeboot::preconditions::SystemPrivileges;
use nodeboot::prereqs::SystemToolInstaller;
use nodeboot::secrets::SecretGenerator;
use nodeboot::stages::engine::Provisioner;
use nodeboot::transport::SshProbe;
use nodeboot::utils::version_info;

#[tokio::main]
async fn main() -> ExitCode {
    let options = match BootstrapOptions::from_env() {
        Ok(options) => options,
        Err(e) => return report_failure(&e),
    };

    // Held until exit so buffered file logs are flushed
    let _log_guard = match init_logging(options.log.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let version = version_info();
    println!("{} {}", "nodeboot".bold(), version);
    info!("Starting nodeboot {}", version);

    match run(options).await {
        Ok(RunOutcome::Completed(report)) => {
            info!("Pipeline finished with {:?}", report.state);
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Cancelled) => ExitCode::SUCCESS,
        Err(e) => report_failure(&e),
    }
}

async fn run(options: BootstrapOptions) -> Result<RunOutcome, BootstrapError> {
    let privileges = SystemPrivileges;
    let installer = SystemToolInstaller::detect();
    let mut answers = TerminalAnswers::new();
    let generator = SecretGenerator::os();
    let engine = Provisioner::new(
        options.playbook_dir.clone(),
        options.layout.clone(),
        options.source.clone(),
    );
    let reachability = SshProbe;

    let collaborators = Collaborators {
        privileges: &privileges,
        installer: &installer,
        answers: &mut answers,
        generator: &generator,
        engine: &engine,
        reachability: &reachability,
    };
    Orchestrator::new(options, collaborators).run().await
}

fn report_failure(e: &BootstrapError) -> ExitCode {
    error!("Bootstrap failed: {e}");
    eprintln!("{} [{}] {}", "error:".red().bold(), e.class(), e);
    for line in failure_guidance(e) {
        eprintln!("  {}", line);
    }
    ExitCode::FAILURE
}
