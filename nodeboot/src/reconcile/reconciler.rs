//! Check-then-act reconciliation of a build node

use tracing::{debug, info};

use crate::errors::BootstrapError;
use crate::reconcile::desired::{DesiredState, Primitive};
use crate::reconcile::host::HostOps;

/// What reconciling a primitive did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Already in the desired state, nothing done
    Unchanged,
    /// Did not exist and was created
    Created,
    /// Existed but drifted and was brought back
    Updated,
    /// Applied unconditionally, no state check
    Applied,
}

/// Outcome for one primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveReport {
    pub primitive: Primitive,
    pub change: Change,
}

/// Outcome for a whole host, in reconciliation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub primitives: Vec<PrimitiveReport>,
}

impl ReconcileReport {
    pub fn change_of(&self, primitive: Primitive) -> Option<Change> {
        self.primitives
            .iter()
            .find(|r| r.primitive == primitive)
            .map(|r| r.change)
    }

    /// Whether any state-checked primitive had to change
    pub fn converged(&self) -> bool {
        self.primitives
            .iter()
            .all(|r| matches!(r.change, Change::Unchanged | Change::Applied))
    }
}

/// Brings a host to a desired state, one primitive at a time
pub struct EnvironmentReconciler<'a> {
    host: &'a dyn HostOps,
}

impl<'a> EnvironmentReconciler<'a> {
    pub fn new(host: &'a dyn HostOps) -> Self {
        Self { host }
    }

    /// Reconcile every primitive in order. The first failure stops the run
    /// and leaves the host as it is.
    pub async fn reconcile(&self, desired: &DesiredState) -> Result<ReconcileReport, BootstrapError> {
        let mut report = ReconcileReport::default();

        for primitive in Primitive::ORDER {
            let change = self
                .reconcile_primitive(primitive, desired)
                .await
                .map_err(|e| BootstrapError::ReconciliationError {
                    primitive,
                    cause: e.to_string(),
                })?;
            info!("{}: {:?}", primitive, change);
            report.primitives.push(PrimitiveReport { primitive, change });
        }

        Ok(report)
    }

    async fn reconcile_primitive(
        &self,
        primitive: Primitive,
        desired: &DesiredState,
    ) -> Result<Change, BootstrapError> {
        match primitive {
            Primitive::ServiceAccount => self.ensure_account(desired).await,
            Primitive::Directories => self.ensure_directories(desired).await,
            Primitive::Declaration => self.ensure_declaration(desired).await,
            Primitive::SourceCheckout => self.ensure_checkout(desired).await,
            Primitive::DependencyEnvironment => self.ensure_environment(desired).await,
            Primitive::InstallerUpgrade => {
                self.host
                    .upgrade_installer(&desired.environment, &desired.account.name)
                    .await?;
                Ok(Change::Applied)
            }
            Primitive::Requirements => {
                self.host
                    .install_requirements(&desired.environment, &desired.account.name)
                    .await?;
                Ok(Change::Applied)
            }
        }
    }

    async fn ensure_account(&self, desired: &DesiredState) -> Result<Change, BootstrapError> {
        let account = &desired.account;
        let mut change = Change::Unchanged;

        if !self.host.account_exists(&account.name).await? {
            self.host.create_account(&account.name).await?;
            change = Change::Created;
        }

        let current = self.host.account_groups(&account.name).await?;
        let missing: Vec<String> = account
            .groups
            .iter()
            .filter(|g| !current.contains(g))
            .cloned()
            .collect();
        if !missing.is_empty() {
            debug!("Adding {} to groups {:?}", account.name, missing);
            self.host.add_to_groups(&account.name, &missing).await?;
            change = promote(change);
        }

        if !self.host.key_pair_exists(&account.name, &account.key_file).await? {
            self.host
                .generate_key_pair(&account.name, &account.key_file)
                .await?;
            change = promote(change);
        }

        Ok(change)
    }

    async fn ensure_directories(&self, desired: &DesiredState) -> Result<Change, BootstrapError> {
        let dirs = &desired.directories;
        let mut change = Change::Unchanged;

        for path in &dirs.paths {
            match self.host.directory_state(path).await? {
                Some(state) if state.is_dir && state.owner == dirs.owner && state.group == dirs.group => {}
                Some(state) if !state.is_dir => {
                    return Err(BootstrapError::InvalidConfig(format!(
                        "{} exists and is not a directory",
                        path.display()
                    )));
                }
                Some(_) => {
                    self.host.create_directory(path, &dirs.owner, &dirs.group).await?;
                    change = promote(change);
                }
                None => {
                    self.host.create_directory(path, &dirs.owner, &dirs.group).await?;
                    if change == Change::Unchanged {
                        change = Change::Created;
                    }
                }
            }
        }

        Ok(change)
    }

    async fn ensure_declaration(&self, desired: &DesiredState) -> Result<Change, BootstrapError> {
        let rendered = desired.render()?;
        match self.host.read_file(&desired.declaration_path).await? {
            Some(existing) if existing == rendered => Ok(Change::Unchanged),
            existing => {
                self.host
                    .write_file(&desired.declaration_path, &rendered, &desired.account.name)
                    .await?;
                Ok(if existing.is_some() {
                    Change::Updated
                } else {
                    Change::Created
                })
            }
        }
    }

    async fn ensure_checkout(&self, desired: &DesiredState) -> Result<Change, BootstrapError> {
        let checkout = &desired.checkout;
        let owner = &desired.account.name;

        let Some(current) = self.host.checkout_revision(&checkout.dest, owner).await? else {
            if self.host.path_exists(&checkout.dest).await? {
                return Err(BootstrapError::InvalidConfig(format!(
                    "{} exists and is not a git checkout",
                    checkout.dest.display()
                )));
            }
            self.host.clone_checkout(checkout, owner).await?;
            return Ok(Change::Created);
        };

        if checkout.reuse_existing {
            debug!("Reusing existing checkout at {}", checkout.dest.display());
            return Ok(Change::Unchanged);
        }

        let wanted = self.host.remote_revision(checkout, owner).await?;
        if current == wanted && !self.host.checkout_dirty(&checkout.dest, owner).await? {
            return Ok(Change::Unchanged);
        }
        self.host.force_checkout(checkout, owner).await?;
        Ok(Change::Updated)
    }

    async fn ensure_environment(&self, desired: &DesiredState) -> Result<Change, BootstrapError> {
        let env = &desired.environment;
        if self.host.path_exists(&env.activation_entry()).await? {
            return Ok(Change::Unchanged);
        }
        self.host.create_environment(env, &desired.account.name).await?;
        Ok(Change::Created)
    }
}

/// A later fix-up on an unchanged primitive counts as an update
fn promote(change: Change) -> Change {
    match change {
        Change::Unchanged => Change::Updated,
        other => other,
    }
}
