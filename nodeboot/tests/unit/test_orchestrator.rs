//! Orchestrator tests with in-memory collaborators

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use nodeboot::app::options::BootstrapOptions;
use nodeboot::app::orchestrator::{failure_guidance, Collaborators, Orchestrator, RunOutcome};
use nodeboot::config::answers::{PromptKey, ScriptedAnswers};
use nodeboot::config::keys::ConfigKey;
use nodeboot::config::model::ConnectionMode;
use nodeboot::config::writer::load_artifact;
use nodeboot::errors::BootstrapError;
use nodeboot::preconditions::PrivilegeProbe;
use nodeboot::prereqs::{Tool, ToolInstaller, ToolStatus};
use nodeboot::secrets::{is_hex_token, SecretGenerator};
use nodeboot::stages::engine::ProvisioningEngine;
use nodeboot::stages::runner::PipelineState;
use nodeboot::stages::stage::{Inventory, Procedure};
use nodeboot::transport::ReachabilityProbe;

#[derive(Default)]
struct FixedPrivileges {
    root: bool,
    /// Number of successful sudo checks before delegation lapses
    expires_after: Option<usize>,
    delegation_checks: AtomicUsize,
}

impl FixedPrivileges {
    fn checks(&self) -> usize {
        self.delegation_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrivilegeProbe for FixedPrivileges {
    async fn is_root(&self) -> Result<bool, BootstrapError> {
        Ok(self.root)
    }

    async fn has_admin_delegation(&self) -> Result<bool, BootstrapError> {
        let previous = self.delegation_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.expires_after.map_or(true, |limit| previous < limit))
    }
}

#[derive(Default)]
struct FakeInstaller {
    missing: Option<&'static str>,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl ToolInstaller for FakeInstaller {
    async fn ensure_tool_present(&self, tool: &Tool) -> Result<ToolStatus, BootstrapError> {
        self.seen.lock().unwrap().push(tool.binary.to_string());
        if self.missing == Some(tool.binary) {
            return Err(BootstrapError::PrerequisiteInstallError {
                tool: tool.binary.to_string(),
                cause: "no package".to_string(),
            });
        }
        Ok(ToolStatus::AlreadyPresent)
    }
}

/// Records every call; optionally fails one procedure
#[derive(Default)]
struct StubEngine {
    fail: Option<Procedure>,
    calls: Mutex<Vec<(Inventory, Procedure, PathBuf)>>,
}

impl StubEngine {
    fn failing(procedure: Procedure) -> Self {
        Self {
            fail: Some(procedure),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(Inventory, Procedure, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProvisioningEngine for StubEngine {
    async fn run(
        &self,
        inventory: &Inventory,
        procedure: Procedure,
        extra_vars: &Path,
    ) -> Result<(), BootstrapError> {
        self.calls
            .lock()
            .unwrap()
            .push((inventory.clone(), procedure, extra_vars.to_path_buf()));
        if self.fail == Some(procedure) {
            return Err(BootstrapError::EngineError(format!("{} exited with 2", procedure.name())));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeReachability {
    unreachable: bool,
    checked: Mutex<Vec<String>>,
}

#[async_trait]
impl ReachabilityProbe for FakeReachability {
    async fn check(&self, host: &str) -> Result<(), BootstrapError> {
        self.checked.lock().unwrap().push(host.to_string());
        if self.unreachable {
            return Err(BootstrapError::TargetUnreachable(host.to_string()));
        }
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    artifact: PathBuf,
    privileges: FixedPrivileges,
    installer: FakeInstaller,
    generator: SecretGenerator,
    engine: StubEngine,
    reachability: FakeReachability,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("config").join("deployment.yml");
        Self {
            _dir: dir,
            artifact,
            privileges: FixedPrivileges::default(),
            installer: FakeInstaller::default(),
            generator: SecretGenerator::os(),
            engine: StubEngine::default(),
            reachability: FakeReachability::default(),
        }
    }

    async fn run(&self, answers: &mut ScriptedAnswers) -> Result<RunOutcome, BootstrapError> {
        let options = BootstrapOptions {
            artifact_path: self.artifact.clone(),
            ..Default::default()
        };
        let collaborators = Collaborators {
            privileges: &self.privileges,
            installer: &self.installer,
            answers,
            generator: &self.generator,
            engine: &self.engine,
            reachability: &self.reachability,
        };
        Orchestrator::new(options, collaborators).run().await
    }
}

fn local_answers() -> ScriptedAnswers {
    ScriptedAnswers::new()
        .with(ConfigKey::ServerAddress, "localhost")
        .with(ConfigKey::OauthClientId, "abc123")
        .with(ConfigKey::OauthClientSecret, "xyz")
}

#[tokio::test]
async fn test_end_to_end_local() {
    let harness = Harness::new();
    let mut answers = local_answers().with_gate("yes");

    let outcome = harness.run(&mut answers).await.unwrap();
    let report = match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::Cancelled => panic!("run was cancelled"),
    };
    assert_eq!(report.state, PipelineState::AllSucceeded);

    let artifact = load_artifact(&harness.artifact).await.unwrap();
    assert_eq!(artifact.config.connection_mode, ConnectionMode::Local);
    assert_eq!(artifact.config.frontend_baseurl, "http://localhost:8080");
    assert_eq!(artifact.config.oauth_client_id, "abc123");
    assert_eq!(artifact.config.oauth_client_secret.expose_secret(), "xyz");
    assert!(is_hex_token(artifact.secrets.api_secret_key.expose_secret(), 32));
    assert!(is_hex_token(artifact.secrets.frontend_secret_key.expose_secret(), 32));
    assert!(is_hex_token(artifact.secrets.broker_cluster_cookie.expose_secret(), 16));

    let calls = harness.engine.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, Procedure::PrepareHost);
    assert_eq!(calls[1].1, Procedure::DeployServices);
    assert!(calls.iter().all(|(inventory, _, _)| *inventory == Inventory::Local));
    assert!(calls.iter().all(|(_, _, vars)| *vars == harness.artifact));

    // Loopback targets are not probed
    assert!(harness.reachability.checked.lock().unwrap().is_empty());
    assert_eq!(answers.asked().last(), Some(&PromptKey::ProceedGate));
}

#[tokio::test]
async fn test_declined_gate_cancels_after_writing_artifact() {
    let harness = Harness::new();
    let mut answers = local_answers().with_gate("n");

    let outcome = harness.run(&mut answers).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert!(harness.artifact.exists());
    assert!(harness.engine.calls().is_empty());
}

#[tokio::test]
async fn test_empty_gate_answer_cancels() {
    let harness = Harness::new();
    let mut answers = local_answers();

    let outcome = harness.run(&mut answers).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert!(harness.engine.calls().is_empty());
}

#[tokio::test]
async fn test_first_stage_failure_skips_deployment() {
    let mut harness = Harness::new();
    harness.engine = StubEngine::failing(Procedure::PrepareHost);
    let mut answers = local_answers().with_gate("y");

    let err = harness.run(&mut answers).await.unwrap_err();

    assert!(matches!(err, BootstrapError::StageFailed { index: 1, .. }));
    assert_eq!(err.class(), "stage");
    let calls = harness.engine.calls();
    assert!(calls.len() <= 1);
    assert!(!calls.iter().any(|(_, p, _)| *p == Procedure::DeployServices));
}

#[tokio::test]
async fn test_second_stage_failure_reports_index() {
    let mut harness = Harness::new();
    harness.engine = StubEngine::failing(Procedure::DeployServices);
    let mut answers = local_answers().with_gate("yes");

    let err = harness.run(&mut answers).await.unwrap_err();

    assert!(matches!(err, BootstrapError::StageFailed { index: 2, .. }));
    assert_eq!(harness.engine.calls().len(), 2);

    let guidance = failure_guidance(&err);
    assert!(guidance[0].starts_with("Stage 2 (Deploy services)"));
    assert!(guidance.last().unwrap().contains("Re-running nodeboot is safe"));
}

#[test]
fn test_guidance_for_non_stage_failure_only_suggests_rerun() {
    let guidance = failure_guidance(&BootstrapError::InvalidConfig("bad".to_string()));
    assert_eq!(guidance.len(), 1);
    assert!(guidance[0].contains("Re-running nodeboot is safe"));
}

#[tokio::test]
async fn test_delegation_is_renewed_before_stages() {
    let harness = Harness::new();
    let mut answers = local_answers().with_gate("yes");

    harness.run(&mut answers).await.unwrap();

    assert_eq!(harness.privileges.checks(), 2);
}

#[tokio::test]
async fn test_declined_gate_does_not_renew_delegation() {
    let harness = Harness::new();
    let mut answers = local_answers().with_gate("no");

    harness.run(&mut answers).await.unwrap();

    assert_eq!(harness.privileges.checks(), 1);
}

#[tokio::test]
async fn test_expired_delegation_stops_before_stages() {
    let mut harness = Harness::new();
    harness.privileges = FixedPrivileges {
        expires_after: Some(1),
        ..Default::default()
    };
    let mut answers = local_answers().with_gate("yes");

    let err = harness.run(&mut answers).await.unwrap_err();

    assert!(matches!(err, BootstrapError::PreconditionViolation(_)));
    assert!(harness.artifact.exists());
    assert!(harness.engine.calls().is_empty());
}

#[tokio::test]
async fn test_root_is_refused_before_anything_else() {
    let mut harness = Harness::new();
    harness.privileges = FixedPrivileges {
        root: true,
        ..Default::default()
    };
    let mut answers = local_answers().with_gate("yes");

    let err = harness.run(&mut answers).await.unwrap_err();

    assert!(matches!(err, BootstrapError::PreconditionViolation(_)));
    assert!(answers.asked().is_empty());
    assert!(harness.installer.seen.lock().unwrap().is_empty());
    assert!(!harness.artifact.exists());
}

#[tokio::test]
async fn test_prerequisite_failure_aborts_before_prompts() {
    let mut harness = Harness::new();
    harness.installer = FakeInstaller {
        missing: Some("git"),
        ..Default::default()
    };
    let mut answers = local_answers().with_gate("yes");

    let err = harness.run(&mut answers).await.unwrap_err();

    assert_eq!(err.class(), "prerequisite");
    assert!(answers.asked().is_empty());
    assert_eq!(*harness.installer.seen.lock().unwrap(), vec!["python3", "git"]);
}

#[tokio::test]
async fn test_missing_oauth_secret_is_not_persisted() {
    let harness = Harness::new();
    let mut answers = ScriptedAnswers::new()
        .with(ConfigKey::OauthClientId, "abc123")
        .with_gate("yes");

    let err = harness.run(&mut answers).await.unwrap_err();

    assert!(matches!(err, BootstrapError::InvalidConfig(_)));
    assert!(!harness.artifact.exists());
    assert!(harness.engine.calls().is_empty());
}

#[tokio::test]
async fn test_remote_target_is_probed() {
    let harness = Harness::new();
    let mut answers = ScriptedAnswers::new()
        .with(ConfigKey::ServerAddress, "build01.example.org")
        .with(ConfigKey::ConnectionMode, "no")
        .with(ConfigKey::OauthClientId, "abc123")
        .with(ConfigKey::OauthClientSecret, "xyz")
        .with_gate("yes");

    harness.run(&mut answers).await.unwrap();

    assert_eq!(
        *harness.reachability.checked.lock().unwrap(),
        vec!["build01.example.org"]
    );
    let remote = Inventory::Remote {
        host: "build01.example.org".to_string(),
    };
    assert!(harness.engine.calls().iter().all(|(inventory, _, _)| *inventory == remote));
}

#[tokio::test]
async fn test_unreachable_remote_aborts_before_stages() {
    let mut harness = Harness::new();
    harness.reachability = FakeReachability {
        unreachable: true,
        ..Default::default()
    };
    let mut answers = ScriptedAnswers::new()
        .with(ConfigKey::ServerAddress, "build01.example.org")
        .with(ConfigKey::OauthClientId, "abc123")
        .with(ConfigKey::OauthClientSecret, "xyz")
        .with_gate("yes");

    let err = harness.run(&mut answers).await.unwrap_err();

    assert!(matches!(err, BootstrapError::TargetUnreachable(_)));
    assert!(harness.artifact.exists());
    assert!(harness.engine.calls().is_empty());
}
