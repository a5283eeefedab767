//! Provisioning stages and their targets

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::model::{ConnectionMode, DeploymentConfig};
use crate::stages::fsm::{StageEvent, StageFsm, StageState};

/// Which host a stage's provisioning call applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inventory {
    /// This machine, without SSH
    Local,
    /// A remote host reached over SSH
    Remote { host: String },
}

impl Inventory {
    /// Inventory targeted by a configuration
    pub fn for_config(config: &DeploymentConfig) -> Self {
        match config.connection_mode {
            ConnectionMode::Local => Inventory::Local,
            ConnectionMode::Remote => Inventory::Remote {
                host: config.server_address.clone(),
            },
        }
    }

    pub fn host(&self) -> &str {
        match self {
            Inventory::Local => "localhost",
            Inventory::Remote { host } => host,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Inventory::Local)
    }

    /// Inline inventory argument for the provisioning engine
    pub fn reference(&self) -> String {
        format!("{},", self.host())
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inventory::Local => write!(f, "localhost (local)"),
            Inventory::Remote { host } => write!(f, "{} (ssh)", host),
        }
    }
}

/// What a stage asks the provisioning engine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    /// Reconcile the build-node environment
    PrepareHost,
    /// Stand up the build services
    DeployServices,
}

impl Procedure {
    pub fn name(&self) -> &'static str {
        match self {
            Procedure::PrepareHost => "prepare_host",
            Procedure::DeployServices => "deploy_services",
        }
    }

    /// Playbook implementing the procedure
    pub fn playbook(&self, playbook_dir: &Path) -> PathBuf {
        playbook_dir.join(format!("{}.yml", self.name()))
    }
}

/// One ordered step of the pipeline
#[derive(Debug, Clone)]
pub struct ProvisioningStage {
    pub name: String,
    pub inventory: Inventory,
    pub procedure: Procedure,
    fsm: StageFsm,
}

impl ProvisioningStage {
    pub fn new(name: impl Into<String>, inventory: Inventory, procedure: Procedure) -> Self {
        Self {
            name: name.into(),
            inventory,
            procedure,
            fsm: StageFsm::new(),
        }
    }

    /// The two stages of a node bootstrap, preparation first
    pub fn pipeline(inventory: &Inventory) -> Vec<ProvisioningStage> {
        vec![
            ProvisioningStage::new(
                "Prepare host environment",
                inventory.clone(),
                Procedure::PrepareHost,
            ),
            ProvisioningStage::new("Deploy services", inventory.clone(), Procedure::DeployServices),
        ]
    }

    pub fn outcome(&self) -> StageState {
        self.fsm.state()
    }

    pub fn error(&self) -> Option<&str> {
        self.fsm.error()
    }

    pub fn process(&mut self, event: StageEvent) -> Result<(), String> {
        self.fsm.process(event)
    }
}
