//! Bootstrap options

use std::path::PathBuf;

use crate::errors::BootstrapError;
use crate::logs::{LogLevel, LogOptions};
use crate::reconcile::desired::SourceSpec;
use crate::reconcile::layout::{NodeLayout, DEFAULT_NODE_ROOT};

/// Artifact location, relative to the working directory
pub const DEFAULT_ARTIFACT_PATH: &str = "config/deployment.yml";

pub const DEFAULT_PLAYBOOK_DIR: &str = "playbooks";

pub const DEFAULT_SOURCE_REPO: &str = "https://git.example.org/buildsys/build-node.git";

pub const DEFAULT_SOURCE_REF: &str = "main";

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "NODEBOOT_";

/// Main bootstrap options
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Where the configuration artifact is written
    pub artifact_path: PathBuf,

    /// Directory holding the provisioning playbooks
    pub playbook_dir: PathBuf,

    /// Logging configuration
    pub log: LogOptions,

    /// Build-node sources checked out on the target
    pub source: SourceSpec,

    /// Layout of the node on the target
    pub layout: NodeLayout,

    /// Operator home; its shell profile gets the local bin directory
    pub home_dir: Option<PathBuf>,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            playbook_dir: PathBuf::from(DEFAULT_PLAYBOOK_DIR),
            log: LogOptions::default(),
            source: SourceSpec {
                repo_url: DEFAULT_SOURCE_REPO.to_string(),
                git_ref: DEFAULT_SOURCE_REF.to_string(),
            },
            layout: NodeLayout::default(),
            home_dir: None,
        }
    }
}

impl BootstrapOptions {
    /// Defaults overridden by `NODEBOOT_*` environment variables
    pub fn from_env() -> Result<Self, BootstrapError> {
        let mut options = Self::from_vars(|name| std::env::var(name).ok())?;
        options.home_dir = std::env::var_os("HOME").map(PathBuf::from);
        Ok(options)
    }

    /// Defaults overridden by whatever `lookup` returns for `NODEBOOT_*` names
    pub fn from_vars<F>(lookup: F) -> Result<Self, BootstrapError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };
        let mut options = Self::default();

        if let Some(path) = var("ARTIFACT") {
            options.artifact_path = PathBuf::from(path);
        }
        if let Some(dir) = var("PLAYBOOK_DIR") {
            options.playbook_dir = PathBuf::from(dir);
        }
        if let Some(level) = var("LOG_LEVEL") {
            options.log.log_level = level
                .parse::<LogLevel>()
                .map_err(BootstrapError::ConfigError)?;
        }
        if let Some(dir) = var("LOG_DIR") {
            options.log.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(json) = var("LOG_JSON") {
            options.log.json_format = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(repo) = var("SOURCE_REPO") {
            options.source.repo_url = repo;
        }
        if let Some(git_ref) = var("SOURCE_REF") {
            options.source.git_ref = git_ref;
        }
        options.layout = NodeLayout::new(var("NODE_ROOT").unwrap_or_else(|| DEFAULT_NODE_ROOT.to_string()));

        Ok(options)
    }
}
