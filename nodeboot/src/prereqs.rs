//! Prerequisite tools on the operator's machine

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::transport::run_argv;

/// A binary the bootstrap needs and the package that provides it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    pub binary: &'static str,
    pub package: &'static str,
}

/// Interpreter, version control client and provisioning engine
pub const REQUIRED_TOOLS: [Tool; 3] = [
    Tool {
        binary: "python3",
        package: "python3",
    },
    Tool {
        binary: "git",
        package: "git",
    },
    Tool {
        binary: "ansible-playbook",
        package: "ansible-core",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    AlreadyPresent,
    Installed,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolStatus::AlreadyPresent => f.write_str("already present"),
            ToolStatus::Installed => f.write_str("installed"),
        }
    }
}

/// Makes sure a tool can be found on the search path
#[async_trait]
pub trait ToolInstaller: Send + Sync {
    async fn ensure_tool_present(&self, tool: &Tool) -> Result<ToolStatus, BootstrapError>;
}

/// Platform package manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Dnf,
    Apt,
}

impl PackageManager {
    /// Package manager of a distribution, from its os-release id
    pub fn for_distribution(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "fedora" | "rhel" | "centos" | "rocky" | "almalinux" => Some(PackageManager::Dnf),
            "debian" | "ubuntu" | "raspbian" => Some(PackageManager::Apt),
            _ => None,
        }
    }

    /// Non-interactive install command line
    pub fn install_argv(&self, package: &str) -> Vec<String> {
        let program = match self {
            PackageManager::Dnf => "dnf",
            PackageManager::Apt => "apt-get",
        };
        ["sudo", "-n", program, "install", "-y", package]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Finds tools with `which` and installs missing ones with the distribution's
/// package manager
#[derive(Debug, Clone)]
pub struct SystemToolInstaller {
    package_manager: Option<PackageManager>,
}

impl SystemToolInstaller {
    pub fn new(package_manager: Option<PackageManager>) -> Self {
        Self { package_manager }
    }

    /// Pick the package manager for the running distribution
    pub fn detect() -> Self {
        let distribution = sysinfo::System::distribution_id();
        debug!("Detected distribution: {}", distribution);
        Self::new(PackageManager::for_distribution(&distribution))
    }
}

#[async_trait]
impl ToolInstaller for SystemToolInstaller {
    async fn ensure_tool_present(&self, tool: &Tool) -> Result<ToolStatus, BootstrapError> {
        if let Ok(path) = which::which(tool.binary) {
            debug!("{} found at {}", tool.binary, path.display());
            return Ok(ToolStatus::AlreadyPresent);
        }

        let manager = self
            .package_manager
            .ok_or_else(|| BootstrapError::PrerequisiteInstallError {
                tool: tool.binary.to_string(),
                cause: "no supported package manager on this distribution".to_string(),
            })?;

        info!("Installing {} with {:?}", tool.package, manager);
        let output = run_argv(&manager.install_argv(tool.package), None)
            .await
            .map_err(|e| BootstrapError::PrerequisiteInstallError {
                tool: tool.binary.to_string(),
                cause: e.to_string(),
            })?;
        if !output.success() {
            return Err(BootstrapError::PrerequisiteInstallError {
                tool: tool.binary.to_string(),
                cause: output.failure_summary(),
            });
        }

        which::which(tool.binary).map_err(|e| BootstrapError::PrerequisiteInstallError {
            tool: tool.binary.to_string(),
            cause: format!("still not on PATH after installing {}: {}", tool.package, e),
        })?;
        Ok(ToolStatus::Installed)
    }
}

/// Ensure every required tool is present, in order
pub async fn ensure_prerequisites(
    installer: &dyn ToolInstaller,
) -> Result<Vec<(Tool, ToolStatus)>, BootstrapError> {
    let mut statuses = Vec::with_capacity(REQUIRED_TOOLS.len());
    for tool in REQUIRED_TOOLS {
        let status = installer.ensure_tool_present(&tool).await?;
        info!("{}: {}", tool.binary, status);
        statuses.push((tool, status));
    }
    Ok(statuses)
}

/// Per-user binary directory under `home`
pub fn local_bin_dir(home: &Path) -> PathBuf {
    home.join(".local").join("bin")
}

/// Search path with `dir` in front, unless it is already listed
pub fn prepend_to_path(dir: &Path, current: Option<OsString>) -> Result<OsString, BootstrapError> {
    let mut paths: Vec<PathBuf> = current
        .map(|p| env::split_paths(&p).collect())
        .unwrap_or_default();
    if !paths.iter().any(|p| p == dir) {
        paths.insert(0, dir.to_path_buf());
    }
    env::join_paths(paths).map_err(|e| BootstrapError::ConfigError(e.to_string()))
}

/// Put `~/.local/bin` on the search path for this run and persist it in
/// the shell profile. Returns whether the profile changed.
pub async fn extend_search_path(home: &Path) -> Result<bool, BootstrapError> {
    let bin_dir = local_bin_dir(home);
    let path = prepend_to_path(&bin_dir, env::var_os("PATH"))?;
    env::set_var("PATH", path);

    let profile = File::new(home.join(".bashrc"));
    let line = format!("export PATH=\"{}:$PATH\"", bin_dir.display());
    let changed = profile.append_line_once(&line).await?;
    if changed {
        warn!("Added {} to PATH in {}", bin_dir.display(), profile.path().display());
    }
    Ok(changed)
}
