//! Inspection and mutation of a target host's primitives

use std::path::Path;

use async_trait::async_trait;

use crate::errors::BootstrapError;
use crate::reconcile::desired::{DependencyEnvironment, SourceCheckout};
use crate::transport::{shell_quote, CommandOutput, CommandTransport, HostCommand};

/// Observed state of a path that should be a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryState {
    pub is_dir: bool,
    pub owner: String,
    pub group: String,
}

/// Checks and actions the reconciler needs from a host
#[async_trait]
pub trait HostOps: Send + Sync {
    async fn account_exists(&self, name: &str) -> Result<bool, BootstrapError>;

    async fn account_groups(&self, name: &str) -> Result<Vec<String>, BootstrapError>;

    async fn create_account(&self, name: &str) -> Result<(), BootstrapError>;

    /// Ensure the groups exist and add the account to them
    async fn add_to_groups(&self, name: &str, groups: &[String]) -> Result<(), BootstrapError>;

    async fn key_pair_exists(&self, account: &str, key_file: &str) -> Result<bool, BootstrapError>;

    async fn generate_key_pair(&self, account: &str, key_file: &str) -> Result<(), BootstrapError>;

    /// `None` when nothing exists at `path`
    async fn directory_state(&self, path: &Path) -> Result<Option<DirectoryState>, BootstrapError>;

    /// Create `path` recursively and hand it to `owner:group`
    async fn create_directory(&self, path: &Path, owner: &str, group: &str) -> Result<(), BootstrapError>;

    /// `None` when the file does not exist
    async fn read_file(&self, path: &Path) -> Result<Option<String>, BootstrapError>;

    async fn write_file(&self, path: &Path, contents: &str, owner: &str) -> Result<(), BootstrapError>;

    /// Commit checked out at `dest`, `None` when it is not a checkout
    async fn checkout_revision(&self, dest: &Path, owner: &str) -> Result<Option<String>, BootstrapError>;

    /// Tracked files in the checkout differ from its `HEAD`
    async fn checkout_dirty(&self, dest: &Path, owner: &str) -> Result<bool, BootstrapError>;

    /// Commit the remote ref currently points to
    async fn remote_revision(&self, checkout: &SourceCheckout, owner: &str) -> Result<String, BootstrapError>;

    async fn clone_checkout(&self, checkout: &SourceCheckout, owner: &str) -> Result<(), BootstrapError>;

    /// Discard local drift and move the checkout to the remote ref
    async fn force_checkout(&self, checkout: &SourceCheckout, owner: &str) -> Result<(), BootstrapError>;

    async fn path_exists(&self, path: &Path) -> Result<bool, BootstrapError>;

    async fn create_environment(&self, env: &DependencyEnvironment, owner: &str) -> Result<(), BootstrapError>;

    async fn upgrade_installer(&self, env: &DependencyEnvironment, owner: &str) -> Result<(), BootstrapError>;

    async fn install_requirements(&self, env: &DependencyEnvironment, owner: &str) -> Result<(), BootstrapError>;
}

/// Host operations implemented with standard OS tools over a transport
pub struct SystemHost<T: CommandTransport> {
    transport: T,
}

impl<T: CommandTransport> SystemHost<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run a command whose exit status answers a yes/no question
    async fn probe(&self, command: HostCommand) -> Result<CommandOutput, BootstrapError> {
        self.transport.exec(&command).await
    }

    /// Run a command that must succeed
    async fn run(&self, command: HostCommand) -> Result<CommandOutput, BootstrapError> {
        let output = self.transport.exec(&command).await?;
        if !output.success() {
            return Err(BootstrapError::CommandFailed {
                command: command.display(),
                detail: output.failure_summary(),
            });
        }
        Ok(output)
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Remote ref names that can satisfy `git_ref`, most specific first.
/// Tags come before branches, the same order `git fetch` resolves them in.
fn ref_candidates(git_ref: &str) -> Vec<String> {
    if git_ref.starts_with("refs/") {
        vec![format!("{git_ref}^{{}}"), git_ref.to_string()]
    } else {
        vec![
            format!("refs/tags/{git_ref}^{{}}"),
            format!("refs/tags/{git_ref}"),
            format!("refs/heads/{git_ref}"),
        ]
    }
}

/// Commit for `git_ref` in `git ls-remote` output. Only exact ref names
/// count; a peeled tag wins over the tag object.
fn resolve_listed_ref(listing: &str, git_ref: &str) -> Option<String> {
    let entries: Vec<(&str, &str)> = listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some((fields.next()?, fields.next()?))
        })
        .collect();

    ref_candidates(git_ref).iter().find_map(|candidate| {
        entries
            .iter()
            .find(|(_, name)| *name == candidate.as_str())
            .map(|(commit, _)| commit.to_string())
    })
}

/// `"$HOME"/<file>` for use inside `sh -c`
fn home_relative(file: &str) -> String {
    format!("\"$HOME\"/{}", shell_quote(file))
}

#[async_trait]
impl<T: CommandTransport> HostOps for SystemHost<T> {
    async fn account_exists(&self, name: &str) -> Result<bool, BootstrapError> {
        let output = self.probe(HostCommand::new("getent", ["passwd", name])).await?;
        Ok(output.success())
    }

    async fn account_groups(&self, name: &str) -> Result<Vec<String>, BootstrapError> {
        let output = self.run(HostCommand::new("id", ["-nG", name])).await?;
        Ok(output.stdout.split_whitespace().map(str::to_string).collect())
    }

    async fn create_account(&self, name: &str) -> Result<(), BootstrapError> {
        self.run(HostCommand::new("useradd", ["--create-home", "--user-group", name]))
            .await?;
        Ok(())
    }

    async fn add_to_groups(&self, name: &str, groups: &[String]) -> Result<(), BootstrapError> {
        for group in groups {
            self.run(HostCommand::new("groupadd", ["-f", group.as_str()])).await?;
        }
        let joined = groups.join(",");
        self.run(HostCommand::new("usermod", ["-aG", joined.as_str(), name]))
            .await?;
        Ok(())
    }

    async fn key_pair_exists(&self, account: &str, key_file: &str) -> Result<bool, BootstrapError> {
        let script = format!("test -f {}", home_relative(key_file));
        let output = self
            .probe(HostCommand::new("sh", ["-c", script.as_str()]).run_as(account))
            .await?;
        Ok(output.success())
    }

    async fn generate_key_pair(&self, account: &str, key_file: &str) -> Result<(), BootstrapError> {
        let key = home_relative(key_file);
        let script = format!(
            "mkdir -p -m 700 \"$(dirname {key})\" && ssh-keygen -q -t ed25519 -N '' -f {key}"
        );
        self.run(HostCommand::new("sh", ["-c", script.as_str()]).run_as(account))
            .await?;
        Ok(())
    }

    async fn directory_state(&self, path: &Path) -> Result<Option<DirectoryState>, BootstrapError> {
        let output = self
            .probe(HostCommand::new("stat", ["-c", "%F|%U|%G", path_arg(path).as_str()]))
            .await?;
        if !output.success() {
            return Ok(None);
        }

        let mut fields = output.stdout.trim().split('|');
        let kind = fields.next().unwrap_or_default();
        let owner = fields.next().unwrap_or_default().to_string();
        let group = fields.next().unwrap_or_default().to_string();
        Ok(Some(DirectoryState {
            is_dir: kind == "directory",
            owner,
            group,
        }))
    }

    async fn create_directory(&self, path: &Path, owner: &str, group: &str) -> Result<(), BootstrapError> {
        let path = path_arg(path);
        self.run(HostCommand::new("mkdir", ["-p", path.as_str()])).await?;
        self.run(HostCommand::new("chown", [format!("{owner}:{group}"), path]))
            .await?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>, BootstrapError> {
        let output = self.probe(HostCommand::new("cat", [path_arg(path)])).await?;
        Ok(output.success().then_some(output.stdout))
    }

    async fn write_file(&self, path: &Path, contents: &str, owner: &str) -> Result<(), BootstrapError> {
        let path = path_arg(path);
        self.run(HostCommand::new("tee", [path.as_str()]).stdin(contents.as_bytes()))
            .await?;
        self.run(HostCommand::new("chown", [owner, path.as_str()])).await?;
        Ok(())
    }

    async fn checkout_revision(&self, dest: &Path, owner: &str) -> Result<Option<String>, BootstrapError> {
        let output = self
            .probe(
                HostCommand::new("git", ["-C", path_arg(dest).as_str(), "rev-parse", "HEAD"])
                    .run_as(owner),
            )
            .await?;
        Ok(output.success().then(|| output.stdout.trim().to_string()))
    }

    async fn checkout_dirty(&self, dest: &Path, owner: &str) -> Result<bool, BootstrapError> {
        let output = self
            .run(
                HostCommand::new(
                    "git",
                    [
                        "-C",
                        path_arg(dest).as_str(),
                        "status",
                        "--porcelain",
                        "--untracked-files=no",
                    ],
                )
                .run_as(owner),
            )
            .await?;
        Ok(!output.stdout.trim().is_empty())
    }

    async fn remote_revision(&self, checkout: &SourceCheckout, owner: &str) -> Result<String, BootstrapError> {
        let mut args = vec!["ls-remote".to_string(), checkout.repo_url.clone()];
        args.extend(ref_candidates(&checkout.git_ref));
        let output = self
            .run(HostCommand::new("git", args).run_as(owner))
            .await?;
        resolve_listed_ref(&output.stdout, &checkout.git_ref)
            .ok_or_else(|| BootstrapError::CommandFailed {
                command: format!("git ls-remote {} {}", checkout.repo_url, checkout.git_ref),
                detail: "ref not found on remote".to_string(),
            })
    }

    async fn clone_checkout(&self, checkout: &SourceCheckout, owner: &str) -> Result<(), BootstrapError> {
        self.run(
            HostCommand::new(
                "git",
                [
                    "clone",
                    "--branch",
                    checkout.git_ref.as_str(),
                    checkout.repo_url.as_str(),
                    path_arg(&checkout.dest).as_str(),
                ],
            )
            .run_as(owner),
        )
        .await?;
        Ok(())
    }

    async fn force_checkout(&self, checkout: &SourceCheckout, owner: &str) -> Result<(), BootstrapError> {
        let dest = path_arg(&checkout.dest);
        self.run(
            HostCommand::new(
                "git",
                ["-C", dest.as_str(), "fetch", "origin", checkout.git_ref.as_str()],
            )
            .run_as(owner),
        )
        .await?;
        self.run(
            HostCommand::new("git", ["-C", dest.as_str(), "reset", "--hard", "FETCH_HEAD"])
                .run_as(owner),
        )
        .await?;
        Ok(())
    }

    async fn path_exists(&self, path: &Path) -> Result<bool, BootstrapError> {
        let output = self
            .probe(HostCommand::new("test", ["-e", path_arg(path).as_str()]))
            .await?;
        Ok(output.success())
    }

    async fn create_environment(&self, env: &DependencyEnvironment, owner: &str) -> Result<(), BootstrapError> {
        self.run(
            HostCommand::new(
                &env.interpreter,
                ["-m", "venv", "--system-site-packages", path_arg(&env.root).as_str()],
            )
            .run_as(owner),
        )
        .await?;
        Ok(())
    }

    async fn upgrade_installer(&self, env: &DependencyEnvironment, owner: &str) -> Result<(), BootstrapError> {
        self.run(
            HostCommand::new(&path_arg(&env.installer()), ["install", "--upgrade", "pip"]).run_as(owner),
        )
        .await?;
        Ok(())
    }

    async fn install_requirements(&self, env: &DependencyEnvironment, owner: &str) -> Result<(), BootstrapError> {
        self.run(
            HostCommand::new(
                &path_arg(&env.installer()),
                ["install", "--upgrade", "-r", path_arg(&env.requirements).as_str()],
            )
            .run_as(owner),
        )
        .await?;
        Ok(())
    }
}
