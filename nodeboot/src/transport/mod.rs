//! Command execution on the target host, locally or over SSH

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::BootstrapError;

/// A command to run on the target host with administrative rights
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Run as this user instead of root
    pub run_as: Option<String>,
    /// Bytes fed to the command's stdin
    pub stdin: Option<Vec<u8>>,
}

impl HostCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            run_as: None,
            stdin: None,
        }
    }

    pub fn run_as(mut self, user: &str) -> Self {
        self.run_as = Some(user.to_string());
        self
    }

    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    /// `sudo` invocation that runs this command on the host
    pub fn privileged_argv(&self) -> Vec<String> {
        let mut argv = vec!["sudo".to_string(), "-n".to_string()];
        if let Some(user) = &self.run_as {
            argv.push("-u".to_string());
            argv.push(user.clone());
            argv.push("-H".to_string());
        }
        argv.push("--".to_string());
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Human-readable rendering for logs
    pub fn display(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&shell_quote(arg));
        }
        rendered
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short failure description for error messages
    pub fn failure_summary(&self) -> String {
        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit status {}", code)
        } else {
            format!("exit status {}: {}", code, stderr)
        }
    }
}

/// Runs commands on a target host
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Name of the target for logs and reports
    fn target(&self) -> &str;

    /// Run a command to completion
    async fn exec(&self, command: &HostCommand) -> Result<CommandOutput, BootstrapError>;
}

/// Runs commands on this machine through `sudo`
#[derive(Debug, Default, Clone)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandTransport for LocalTransport {
    fn target(&self) -> &str {
        "localhost"
    }

    async fn exec(&self, command: &HostCommand) -> Result<CommandOutput, BootstrapError> {
        run_argv(&command.privileged_argv(), command.stdin.as_deref()).await
    }
}

/// Runs commands on a remote host through `ssh` and `sudo`
#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
}

impl SshTransport {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Full `ssh` argv for a command
    pub fn ssh_argv(&self, command: &HostCommand) -> Vec<String> {
        let remote = command
            .privileged_argv()
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ");
        vec![
            "ssh".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            self.host.clone(),
            "--".to_string(),
            remote,
        ]
    }
}

#[async_trait]
impl CommandTransport for SshTransport {
    fn target(&self) -> &str {
        &self.host
    }

    async fn exec(&self, command: &HostCommand) -> Result<CommandOutput, BootstrapError> {
        run_argv(&self.ssh_argv(command), command.stdin.as_deref()).await
    }
}

/// Checks that a remote target answers before anything runs against it
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn check(&self, host: &str) -> Result<(), BootstrapError>;
}

/// Runs a no-op through the SSH transport, `sudo` included
#[derive(Debug, Default, Clone, Copy)]
pub struct SshProbe;

#[async_trait]
impl ReachabilityProbe for SshProbe {
    async fn check(&self, host: &str) -> Result<(), BootstrapError> {
        let transport = SshTransport::new(host);
        let output = transport
            .exec(&HostCommand::new("true", Vec::<String>::new()))
            .await
            .map_err(|e| BootstrapError::TargetUnreachable(format!("{}: {}", host, e)))?;
        if !output.success() {
            return Err(BootstrapError::TargetUnreachable(format!(
                "{}: {}",
                host,
                output.failure_summary()
            )));
        }
        debug!("{} is reachable", host);
        Ok(())
    }
}

/// Spawn `argv` and wait for it, capturing output
pub async fn run_argv(argv: &[String], stdin: Option<&[u8]>) -> Result<CommandOutput, BootstrapError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| BootstrapError::EngineError("empty command line".to_string()))?;
    debug!("Running: {}", argv.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(bytes).await?;
        drop(pipe);
    }

    let output = child.wait_with_output().await?;
    Ok(CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Quote an argument for a POSIX shell
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
