//! Reconciler unit tests against an in-memory host

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::SecretString;

use nodeboot::config::model::{ConnectionMode, DeploymentConfig, InterpreterMode};
use nodeboot::errors::BootstrapError;
use nodeboot::reconcile::desired::{DependencyEnvironment, DesiredState, Primitive, SourceCheckout, SourceSpec};
use nodeboot::reconcile::host::{DirectoryState, HostOps};
use nodeboot::reconcile::layout::NodeLayout;
use nodeboot::reconcile::reconciler::{Change, EnvironmentReconciler};

#[derive(Default)]
struct HostState {
    accounts: HashMap<String, Vec<String>>,
    keys: HashSet<(String, String)>,
    dirs: HashMap<PathBuf, (String, String)>,
    files: HashMap<PathBuf, String>,
    checkouts: HashMap<PathBuf, String>,
    /// Checkouts with locally modified tracked files
    dirty: HashSet<PathBuf>,
    paths: HashSet<PathBuf>,
    remote_revision: String,
    /// Every call that changed something, in order
    mutations: Vec<String>,
    /// Calls that are applied unconditionally
    applied: Vec<String>,
    fail_on: Option<&'static str>,
}

#[derive(Default)]
struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    fn with_remote_revision(revision: &str) -> Self {
        let host = FakeHost::default();
        host.state.lock().unwrap().remote_revision = revision.to_string();
        host
    }

    fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    fn mutate(&self, call: &'static str, detail: String) -> Result<(), BootstrapError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_on == Some(call) {
            return Err(BootstrapError::CommandFailed {
                command: call.to_string(),
                detail: "exit status 1".to_string(),
            });
        }
        state.mutations.push(format!("{} {}", call, detail));
        Ok(())
    }
}

#[async_trait]
impl HostOps for FakeHost {
    async fn account_exists(&self, name: &str) -> Result<bool, BootstrapError> {
        Ok(self.state.lock().unwrap().accounts.contains_key(name))
    }

    async fn account_groups(&self, name: &str) -> Result<Vec<String>, BootstrapError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .accounts
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_account(&self, name: &str) -> Result<(), BootstrapError> {
        self.mutate("create_account", name.to_string())?;
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(name.to_string(), vec![name.to_string()]);
        Ok(())
    }

    async fn add_to_groups(&self, name: &str, groups: &[String]) -> Result<(), BootstrapError> {
        self.mutate("add_to_groups", groups.join(","))?;
        let mut state = self.state.lock().unwrap();
        let current = state.accounts.entry(name.to_string()).or_default();
        current.extend(groups.iter().cloned());
        Ok(())
    }

    async fn key_pair_exists(&self, account: &str, key_file: &str) -> Result<bool, BootstrapError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .keys
            .contains(&(account.to_string(), key_file.to_string())))
    }

    async fn generate_key_pair(&self, account: &str, key_file: &str) -> Result<(), BootstrapError> {
        self.mutate("generate_key_pair", account.to_string())?;
        self.state
            .lock()
            .unwrap()
            .keys
            .insert((account.to_string(), key_file.to_string()));
        Ok(())
    }

    async fn directory_state(&self, path: &Path) -> Result<Option<DirectoryState>, BootstrapError> {
        let state = self.state.lock().unwrap();
        if let Some((owner, group)) = state.dirs.get(path) {
            return Ok(Some(DirectoryState {
                is_dir: true,
                owner: owner.clone(),
                group: group.clone(),
            }));
        }
        if state.files.contains_key(path) {
            return Ok(Some(DirectoryState {
                is_dir: false,
                owner: "root".to_string(),
                group: "root".to_string(),
            }));
        }
        Ok(None)
    }

    async fn create_directory(&self, path: &Path, owner: &str, group: &str) -> Result<(), BootstrapError> {
        self.mutate("create_directory", path.display().to_string())?;
        self.state
            .lock()
            .unwrap()
            .dirs
            .insert(path.to_path_buf(), (owner.to_string(), group.to_string()));
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>, BootstrapError> {
        Ok(self.state.lock().unwrap().files.get(path).cloned())
    }

    async fn write_file(&self, path: &Path, contents: &str, _owner: &str) -> Result<(), BootstrapError> {
        self.mutate("write_file", path.display().to_string())?;
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn checkout_revision(&self, dest: &Path, _owner: &str) -> Result<Option<String>, BootstrapError> {
        Ok(self.state.lock().unwrap().checkouts.get(dest).cloned())
    }

    async fn checkout_dirty(&self, dest: &Path, _owner: &str) -> Result<bool, BootstrapError> {
        Ok(self.state.lock().unwrap().dirty.contains(dest))
    }

    async fn remote_revision(&self, _checkout: &SourceCheckout, _owner: &str) -> Result<String, BootstrapError> {
        Ok(self.state.lock().unwrap().remote_revision.clone())
    }

    async fn clone_checkout(&self, checkout: &SourceCheckout, _owner: &str) -> Result<(), BootstrapError> {
        self.mutate("clone_checkout", checkout.dest.display().to_string())?;
        let mut state = self.state.lock().unwrap();
        let revision = state.remote_revision.clone();
        state.checkouts.insert(checkout.dest.clone(), revision);
        Ok(())
    }

    async fn force_checkout(&self, checkout: &SourceCheckout, _owner: &str) -> Result<(), BootstrapError> {
        self.mutate("force_checkout", checkout.dest.display().to_string())?;
        let mut state = self.state.lock().unwrap();
        let revision = state.remote_revision.clone();
        state.checkouts.insert(checkout.dest.clone(), revision);
        state.dirty.remove(&checkout.dest);
        Ok(())
    }

    async fn path_exists(&self, path: &Path) -> Result<bool, BootstrapError> {
        let state = self.state.lock().unwrap();
        Ok(state.paths.contains(path)
            || state.dirs.contains_key(path)
            || state.files.contains_key(path)
            || state.checkouts.contains_key(path))
    }

    async fn create_environment(&self, env: &DependencyEnvironment, _owner: &str) -> Result<(), BootstrapError> {
        self.mutate("create_environment", env.root.display().to_string())?;
        let mut state = self.state.lock().unwrap();
        state.paths.insert(env.root.clone());
        state.paths.insert(env.activation_entry());
        Ok(())
    }

    async fn upgrade_installer(&self, _env: &DependencyEnvironment, _owner: &str) -> Result<(), BootstrapError> {
        self.state.lock().unwrap().applied.push("upgrade_installer".to_string());
        Ok(())
    }

    async fn install_requirements(&self, _env: &DependencyEnvironment, _owner: &str) -> Result<(), BootstrapError> {
        self.state.lock().unwrap().applied.push("install_requirements".to_string());
        Ok(())
    }
}

fn config(reuse_existing_checkouts: bool) -> DeploymentConfig {
    DeploymentConfig {
        server_address: "localhost".to_string(),
        frontend_baseurl: "http://localhost:8080".to_string(),
        connection_mode: ConnectionMode::Local,
        oauth_client_id: "abc123".to_string(),
        oauth_client_secret: SecretString::from("xyz".to_string()),
        db_name: "buildsys".to_string(),
        db_user: "buildsys".to_string(),
        db_password: SecretString::from("dbpass".to_string()),
        broker_user: "buildsys".to_string(),
        broker_password: SecretString::from("mqpass".to_string()),
        artifact_repo_password: SecretString::from("repopass".to_string()),
        reuse_existing_checkouts,
        python_interpreter: InterpreterMode::Auto,
        trusted_signing_keys: vec![],
    }
}

fn desired(reuse_existing_checkouts: bool) -> DesiredState {
    DesiredState::build(
        &config(reuse_existing_checkouts),
        &NodeLayout::new("/srv/bn"),
        &SourceSpec {
            repo_url: "https://git.example.org/buildsys/build-node.git".to_string(),
            git_ref: "main".to_string(),
        },
    )
}

#[tokio::test]
async fn test_first_run_creates_everything() {
    let host = FakeHost::with_remote_revision("rev-1");
    let report = EnvironmentReconciler::new(&host)
        .reconcile(&desired(false))
        .await
        .unwrap();

    let order: Vec<Primitive> = report.primitives.iter().map(|r| r.primitive).collect();
    assert_eq!(order, Primitive::ORDER.to_vec());

    assert_eq!(report.change_of(Primitive::ServiceAccount), Some(Change::Created));
    assert_eq!(report.change_of(Primitive::Directories), Some(Change::Created));
    assert_eq!(report.change_of(Primitive::Declaration), Some(Change::Created));
    assert_eq!(report.change_of(Primitive::SourceCheckout), Some(Change::Created));
    assert_eq!(report.change_of(Primitive::DependencyEnvironment), Some(Change::Created));
    assert_eq!(report.change_of(Primitive::InstallerUpgrade), Some(Change::Applied));
    assert_eq!(report.change_of(Primitive::Requirements), Some(Change::Applied));
    assert!(!report.converged());

    let mutations = host.mutations();
    assert_eq!(mutations[0], "create_account builder");
    assert_eq!(mutations[1], "add_to_groups mock,kvm");
    assert!(mutations.contains(&"create_directory /srv/bn/work".to_string()));
    assert!(mutations.contains(&"clone_checkout /srv/bn/src".to_string()));
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let host = FakeHost::with_remote_revision("rev-1");
    let reconciler = EnvironmentReconciler::new(&host);
    let state = desired(false);

    reconciler.reconcile(&state).await.unwrap();
    let after_first = host.mutations();

    let report = reconciler.reconcile(&state).await.unwrap();
    assert!(report.converged());
    assert_eq!(host.mutations(), after_first);
    assert_eq!(report.change_of(Primitive::ServiceAccount), Some(Change::Unchanged));
    assert_eq!(report.change_of(Primitive::SourceCheckout), Some(Change::Unchanged));
}

#[tokio::test]
async fn test_checkout_drift_is_forced_back() {
    let host = FakeHost::with_remote_revision("rev-1");
    let reconciler = EnvironmentReconciler::new(&host);
    let state = desired(false);
    reconciler.reconcile(&state).await.unwrap();

    host.state.lock().unwrap().remote_revision = "rev-2".to_string();
    let report = reconciler.reconcile(&state).await.unwrap();

    assert_eq!(report.change_of(Primitive::SourceCheckout), Some(Change::Updated));
    assert_eq!(
        host.state.lock().unwrap().checkouts.get(Path::new("/srv/bn/src")),
        Some(&"rev-2".to_string())
    );
}

#[tokio::test]
async fn test_modified_files_at_wanted_revision_are_reset() {
    let host = FakeHost::with_remote_revision("rev-1");
    let reconciler = EnvironmentReconciler::new(&host);
    let state = desired(false);
    reconciler.reconcile(&state).await.unwrap();

    host.state
        .lock()
        .unwrap()
        .dirty
        .insert(PathBuf::from("/srv/bn/src"));
    let report = reconciler.reconcile(&state).await.unwrap();

    assert_eq!(report.change_of(Primitive::SourceCheckout), Some(Change::Updated));
    assert!(host.mutations().contains(&"force_checkout /srv/bn/src".to_string()));
    assert!(host.state.lock().unwrap().dirty.is_empty());

    let report = reconciler.reconcile(&state).await.unwrap();
    assert_eq!(report.change_of(Primitive::SourceCheckout), Some(Change::Unchanged));
}

#[tokio::test]
async fn test_reuse_flag_keeps_modified_checkout() {
    let host = FakeHost::with_remote_revision("rev-1");
    let reconciler = EnvironmentReconciler::new(&host);
    let state = desired(true);
    reconciler.reconcile(&state).await.unwrap();

    host.state
        .lock()
        .unwrap()
        .dirty
        .insert(PathBuf::from("/srv/bn/src"));
    let report = reconciler.reconcile(&state).await.unwrap();

    assert_eq!(report.change_of(Primitive::SourceCheckout), Some(Change::Unchanged));
    assert!(!host.state.lock().unwrap().dirty.is_empty());
}

#[tokio::test]
async fn test_reuse_flag_keeps_existing_checkout() {
    let host = FakeHost::with_remote_revision("rev-1");
    let reconciler = EnvironmentReconciler::new(&host);
    let state = desired(true);
    reconciler.reconcile(&state).await.unwrap();

    host.state.lock().unwrap().remote_revision = "rev-2".to_string();
    let report = reconciler.reconcile(&state).await.unwrap();

    assert_eq!(report.change_of(Primitive::SourceCheckout), Some(Change::Unchanged));
    assert!(!host.mutations().iter().any(|m| m.starts_with("force_checkout")));
}

#[tokio::test]
async fn test_wrong_directory_owner_is_fixed() {
    let host = FakeHost::with_remote_revision("rev-1");
    let reconciler = EnvironmentReconciler::new(&host);
    let state = desired(false);
    reconciler.reconcile(&state).await.unwrap();

    host.state
        .lock()
        .unwrap()
        .dirs
        .insert(PathBuf::from("/srv/bn/cache"), ("root".to_string(), "root".to_string()));
    let report = reconciler.reconcile(&state).await.unwrap();

    assert_eq!(report.change_of(Primitive::Directories), Some(Change::Updated));
    assert_eq!(
        host.state.lock().unwrap().dirs.get(Path::new("/srv/bn/cache")),
        Some(&("builder".to_string(), "builder".to_string()))
    );
}

#[tokio::test]
async fn test_missing_group_is_added_to_existing_account() {
    let host = FakeHost::with_remote_revision("rev-1");
    host.state
        .lock()
        .unwrap()
        .accounts
        .insert("builder".to_string(), vec!["builder".to_string(), "mock".to_string()]);

    let report = EnvironmentReconciler::new(&host)
        .reconcile(&desired(false))
        .await
        .unwrap();

    assert_eq!(report.change_of(Primitive::ServiceAccount), Some(Change::Updated));
    assert!(host.mutations().contains(&"add_to_groups kvm".to_string()));
    assert!(!host.mutations().iter().any(|m| m.starts_with("create_account")));
}

#[tokio::test]
async fn test_edited_declaration_is_rewritten() {
    let host = FakeHost::with_remote_revision("rev-1");
    let reconciler = EnvironmentReconciler::new(&host);
    let state = desired(false);
    reconciler.reconcile(&state).await.unwrap();

    host.state
        .lock()
        .unwrap()
        .files
        .insert(PathBuf::from("/srv/bn/node.yml"), "edited: true\n".to_string());
    let report = reconciler.reconcile(&state).await.unwrap();

    assert_eq!(report.change_of(Primitive::Declaration), Some(Change::Updated));
    assert_eq!(
        host.state.lock().unwrap().files.get(Path::new("/srv/bn/node.yml")),
        Some(&state.render().unwrap())
    );
}

#[tokio::test]
async fn test_failure_stops_at_primitive() {
    let host = FakeHost::with_remote_revision("rev-1");
    host.state.lock().unwrap().fail_on = Some("clone_checkout");

    let err = EnvironmentReconciler::new(&host)
        .reconcile(&desired(false))
        .await
        .unwrap_err();

    match err {
        BootstrapError::ReconciliationError { primitive, cause } => {
            assert_eq!(primitive, Primitive::SourceCheckout);
            assert!(cause.contains("clone_checkout"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Nothing after the checkout ran
    let state = host.state.lock().unwrap();
    assert!(state.applied.is_empty());
    assert!(!state.mutations.iter().any(|m| m.starts_with("create_environment")));
}
