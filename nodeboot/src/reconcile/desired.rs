//! Desired state of a build node

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::model::DeploymentConfig;
use crate::reconcile::layout::NodeLayout;

/// Login of the service account that runs builds
pub const SERVICE_ACCOUNT: &str = "builder";

/// Supplementary groups of the service account
pub const SERVICE_GROUPS: [&str; 2] = ["mock", "kvm"];

/// Infrastructure primitives, in the order they are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    ServiceAccount,
    Directories,
    Declaration,
    SourceCheckout,
    DependencyEnvironment,
    InstallerUpgrade,
    Requirements,
}

impl Primitive {
    pub const ORDER: [Primitive; 7] = [
        Primitive::ServiceAccount,
        Primitive::Directories,
        Primitive::Declaration,
        Primitive::SourceCheckout,
        Primitive::DependencyEnvironment,
        Primitive::InstallerUpgrade,
        Primitive::Requirements,
    ];
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Primitive::ServiceAccount => "service account",
            Primitive::Directories => "directory set",
            Primitive::Declaration => "node declaration",
            Primitive::SourceCheckout => "source checkout",
            Primitive::DependencyEnvironment => "dependency environment",
            Primitive::InstallerUpgrade => "installer upgrade",
            Primitive::Requirements => "requirement set",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub name: String,
    pub groups: Vec<String>,
    /// Private key of the account's key pair, relative to its home
    pub key_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDirectorySet {
    /// Absolute paths, parents before children
    pub paths: Vec<PathBuf>,
    pub owner: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCheckout {
    pub repo_url: String,
    pub dest: PathBuf,
    pub git_ref: String,
    /// Keep an existing checkout untouched instead of forcing it to the ref
    pub reuse_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEnvironment {
    pub root: PathBuf,
    pub interpreter: String,
    pub requirements: PathBuf,
}

impl DependencyEnvironment {
    /// Entry point whose presence marks the environment as created
    pub fn activation_entry(&self) -> PathBuf {
        self.root.join("bin").join("activate")
    }

    /// Package installer inside the environment
    pub fn installer(&self) -> PathBuf {
        self.root.join("bin").join("pip")
    }
}

/// Everything the reconciler brings a host to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub account: ServiceAccount,
    pub directories: WorkingDirectorySet,
    pub checkout: SourceCheckout,
    pub environment: DependencyEnvironment,
    /// Where the rendered declaration lives on the target
    pub declaration_path: PathBuf,
    pub frontend_baseurl: String,
    pub trusted_signing_keys: Vec<String>,
}

/// Where the build-node sources come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub repo_url: String,
    pub git_ref: String,
}

impl DesiredState {
    /// Desired state for a node configured by `config`
    pub fn build(config: &DeploymentConfig, layout: &NodeLayout, source: &SourceSpec) -> Self {
        let source_dir = layout.source_dir();
        Self {
            account: ServiceAccount {
                name: SERVICE_ACCOUNT.to_string(),
                groups: SERVICE_GROUPS.iter().map(|g| g.to_string()).collect(),
                key_file: ".ssh/id_ed25519".to_string(),
            },
            directories: WorkingDirectorySet {
                paths: layout.directories(),
                owner: SERVICE_ACCOUNT.to_string(),
                group: SERVICE_ACCOUNT.to_string(),
            },
            checkout: SourceCheckout {
                repo_url: source.repo_url.clone(),
                dest: source_dir.clone(),
                git_ref: source.git_ref.clone(),
                reuse_existing: config.reuse_existing_checkouts,
            },
            environment: DependencyEnvironment {
                root: layout.venv_dir(),
                interpreter: config.python_interpreter.command(),
                requirements: source_dir.join("requirements.txt"),
            },
            declaration_path: layout.declaration_file(),
            frontend_baseurl: config.frontend_baseurl.clone(),
            trusted_signing_keys: config.trusted_signing_keys.clone(),
        }
    }

    /// Render the declaration written to the target
    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
