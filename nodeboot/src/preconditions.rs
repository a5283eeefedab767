//! Identity checks before anything else runs

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::BootstrapError;

/// What the bootstrap needs to know about the invoking identity
#[async_trait]
pub trait PrivilegeProbe: Send + Sync {
    /// Running with root identity
    async fn is_root(&self) -> Result<bool, BootstrapError>;

    /// Allowed to run administrative commands through `sudo`
    async fn has_admin_delegation(&self) -> Result<bool, BootstrapError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPrivileges;

#[async_trait]
impl PrivilegeProbe for SystemPrivileges {
    async fn is_root(&self) -> Result<bool, BootstrapError> {
        let output = Command::new("id").arg("-u").output().await?;
        if !output.status.success() {
            return Err(BootstrapError::PreconditionViolation(
                "unable to determine the current user id".to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "0")
    }

    async fn has_admin_delegation(&self) -> Result<bool, BootstrapError> {
        // May ask for the operator's password on the terminal
        let status = Command::new("sudo").arg("-v").status().await?;
        debug!("sudo -v exited with {:?}", status.code());
        Ok(status.success())
    }
}

/// Refuse to run as root or without administrative delegation
pub async fn check_preconditions(probe: &dyn PrivilegeProbe) -> Result<(), BootstrapError> {
    if probe.is_root().await? {
        return Err(BootstrapError::PreconditionViolation(
            "do not run as root; run as a regular user with sudo rights".to_string(),
        ));
    }
    if !probe.has_admin_delegation().await? {
        return Err(BootstrapError::PreconditionViolation(
            "the current user cannot run commands through sudo".to_string(),
        ));
    }
    info!("Preconditions satisfied");
    Ok(())
}

/// Renew the sudo timestamp before local commands start running with `sudo -n`
pub async fn refresh_delegation(probe: &dyn PrivilegeProbe) -> Result<(), BootstrapError> {
    if !probe.has_admin_delegation().await? {
        return Err(BootstrapError::PreconditionViolation(
            "sudo credentials could not be renewed before provisioning".to_string(),
        ));
    }
    debug!("sudo credentials renewed");
    Ok(())
}
