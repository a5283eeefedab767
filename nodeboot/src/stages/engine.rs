//! Provisioning engine driven by the stages

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::writer::load_artifact;
use crate::errors::BootstrapError;
use crate::reconcile::desired::{DesiredState, SourceSpec};
use crate::reconcile::host::SystemHost;
use crate::reconcile::layout::NodeLayout;
use crate::reconcile::reconciler::{Change, EnvironmentReconciler, ReconcileReport};
use crate::stages::stage::{Inventory, Procedure};
use crate::transport::{run_argv, CommandTransport, LocalTransport, SshTransport};

/// Executes one procedure against one inventory. Success or failure is the
/// only result the pipeline looks at.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    async fn run(
        &self,
        inventory: &Inventory,
        procedure: Procedure,
        extra_vars: &Path,
    ) -> Result<(), BootstrapError>;
}

/// Production engine: native reconciliation for host preparation,
/// `ansible-playbook` for service deployment
#[derive(Debug, Clone)]
pub struct Provisioner {
    playbook_dir: PathBuf,
    layout: NodeLayout,
    source: SourceSpec,
}

impl Provisioner {
    pub fn new(playbook_dir: impl Into<PathBuf>, layout: NodeLayout, source: SourceSpec) -> Self {
        Self {
            playbook_dir: playbook_dir.into(),
            layout,
            source,
        }
    }

    async fn prepare_host(&self, inventory: &Inventory, extra_vars: &Path) -> Result<(), BootstrapError> {
        let artifact = load_artifact(extra_vars).await?;
        let desired = DesiredState::build(&artifact.config, &self.layout, &self.source);

        let report = match inventory {
            Inventory::Local => reconcile_with(LocalTransport::new(), &desired).await?,
            Inventory::Remote { host } => reconcile_with(SshTransport::new(host.as_str()), &desired).await?,
        };

        let changed = report
            .primitives
            .iter()
            .filter(|r| matches!(r.change, Change::Created | Change::Updated))
            .count();
        info!(
            "Host {} reconciled: {} of {} primitives changed",
            inventory.host(),
            changed,
            report.primitives.len()
        );
        Ok(())
    }

    /// `ansible-playbook` command line for a procedure
    pub fn playbook_argv(&self, inventory: &Inventory, procedure: Procedure, extra_vars: &Path) -> Vec<String> {
        let mut argv = vec![
            "ansible-playbook".to_string(),
            "-i".to_string(),
            inventory.reference(),
        ];
        if inventory.is_local() {
            argv.push("--connection=local".to_string());
        }
        argv.push("-e".to_string());
        argv.push(format!("@{}", extra_vars.display()));
        argv.push(procedure.playbook(&self.playbook_dir).display().to_string());
        argv
    }

    async fn run_playbook(
        &self,
        inventory: &Inventory,
        procedure: Procedure,
        extra_vars: &Path,
    ) -> Result<(), BootstrapError> {
        let argv = self.playbook_argv(inventory, procedure, extra_vars);
        let output = run_argv(&argv, None).await?;
        debug!("{} output:\n{}", procedure.name(), output.stdout);
        if !output.success() {
            return Err(BootstrapError::EngineError(format!(
                "{} exited with {}",
                procedure.name(),
                output.failure_summary()
            )));
        }
        Ok(())
    }
}

async fn reconcile_with<T: CommandTransport>(
    transport: T,
    desired: &DesiredState,
) -> Result<ReconcileReport, BootstrapError> {
    debug!("Reconciling over transport to {}", transport.target());
    let host = SystemHost::new(transport);
    EnvironmentReconciler::new(&host).reconcile(desired).await
}

#[async_trait]
impl ProvisioningEngine for Provisioner {
    async fn run(
        &self,
        inventory: &Inventory,
        procedure: Procedure,
        extra_vars: &Path,
    ) -> Result<(), BootstrapError> {
        match procedure {
            Procedure::PrepareHost => self.prepare_host(inventory, extra_vars).await,
            Procedure::DeployServices => self.run_playbook(inventory, procedure, extra_vars).await,
        }
    }
}
