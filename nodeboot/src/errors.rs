//! Error types for the node bootstrap

use std::path::PathBuf;

use thiserror::Error;

use crate::reconcile::desired::Primitive;

/// Main error type for the node bootstrap
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("Failed to install prerequisite '{tool}': {cause}")]
    PrerequisiteInstallError { tool: String, cause: String },

    #[error("Secure entropy source unavailable: {0}")]
    EntropySourceUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to write configuration artifact {}: {source}", .path.display())]
    PersistWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to reconcile {primitive}: {cause}")]
    ReconciliationError { primitive: Primitive, cause: String },

    #[error("Stage {index} ({name}) failed: {cause}")]
    StageFailed {
        index: usize,
        name: String,
        cause: String,
    },

    #[error("Target host unreachable: {0}")]
    TargetUnreachable(String),

    #[error("Command `{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("Provisioning engine error: {0}")]
    EngineError(String),

    #[error("Prompt error: {0}")]
    PromptError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl BootstrapError {
    /// Short classification shown to the operator next to the message
    pub fn class(&self) -> &'static str {
        match self {
            BootstrapError::PreconditionViolation(_) => "precondition",
            BootstrapError::PrerequisiteInstallError { .. } => "prerequisite",
            BootstrapError::EntropySourceUnavailable(_) => "entropy",
            BootstrapError::InvalidConfig(_) => "configuration",
            BootstrapError::PersistWriteError { .. } => "persist",
            BootstrapError::ReconciliationError { .. } => "reconciliation",
            BootstrapError::StageFailed { .. } => "stage",
            BootstrapError::TargetUnreachable(_) => "transport",
            BootstrapError::CommandFailed { .. } => "command",
            BootstrapError::EngineError(_) => "engine",
            BootstrapError::PromptError(_) => "prompt",
            BootstrapError::ConfigError(_) => "configuration",
            BootstrapError::IoError(_) => "io",
            BootstrapError::YamlError(_) => "serialization",
        }
    }
}

impl From<dialoguer::Error> for BootstrapError {
    fn from(err: dialoguer::Error) -> Self {
        BootstrapError::PromptError(err.to_string())
    }
}
