//! Collect -> generate -> persist pipeline tests

use std::path::Path;

use secrecy::ExposeSecret;
use serde_yaml::{Mapping, Value};

use nodeboot::config::answers::ScriptedAnswers;
use nodeboot::config::collector::ConfigCollector;
use nodeboot::config::keys::ConfigKey;
use nodeboot::config::writer::{load_artifact, ConfigWriter};
use nodeboot::secrets::{is_hex_token, SecretGenerator};

const SECRET_KEYS: [&str; 3] = ["api_secret_key", "frontend_secret_key", "broker_cluster_cookie"];

fn answers() -> ScriptedAnswers {
    ScriptedAnswers::new()
        .with(ConfigKey::ServerAddress, "build01.example.org")
        .with(ConfigKey::ConnectionMode, "no")
        .with(ConfigKey::OauthClientId, "abc123")
        .with(ConfigKey::OauthClientSecret, "xyz")
        .with(ConfigKey::DbPassword, "dbpass")
        .with(ConfigKey::BrokerPassword, "mqpass")
        .with(ConfigKey::ArtifactRepoPassword, "repopass")
        .with(ConfigKey::TrustedSigningKeys, "A1B2C3D4, E5F6A7B8")
}

async fn collect_and_write(mut answers: ScriptedAnswers, path: &Path) -> Mapping {
    let generator = SecretGenerator::os();
    let config = ConfigCollector::new(&mut answers, &generator).collect().unwrap();
    let secrets = generator.generate_all().unwrap();
    ConfigWriter::new().write(&config, &secrets, path).await.unwrap();

    let contents = std::fs::read_to_string(path).unwrap();
    serde_yaml::from_str(&contents).unwrap()
}

fn without_secrets(mut mapping: Mapping) -> Mapping {
    for key in SECRET_KEYS {
        mapping.remove(key);
    }
    mapping
}

#[tokio::test]
async fn test_rerun_keeps_non_secret_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deployment.yml");

    let first = collect_and_write(answers(), &path).await;
    let second = collect_and_write(answers(), &path).await;

    for key in SECRET_KEYS {
        let a = first.get(key).and_then(Value::as_str).unwrap();
        let b = second.get(key).and_then(Value::as_str).unwrap();
        assert_ne!(a, b, "{} must be regenerated", key);
    }
    assert_eq!(without_secrets(first), without_secrets(second));
}

#[tokio::test]
async fn test_artifact_is_flat_and_complete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deployment.yml");

    let mapping = collect_and_write(answers(), &path).await;

    for key in ConfigKey::PROMPT_ORDER {
        assert!(mapping.contains_key(key.as_str()), "missing {}", key.as_str());
    }
    for key in SECRET_KEYS {
        assert!(mapping.contains_key(key), "missing {}", key);
    }
    assert_eq!(mapping.len(), ConfigKey::PROMPT_ORDER.len() + SECRET_KEYS.len());
    assert_eq!(
        mapping.get("connection_mode").and_then(Value::as_str),
        Some("remote")
    );
    assert_eq!(
        mapping.get("frontend_baseurl").and_then(Value::as_str),
        Some("http://build01.example.org:8080")
    );
}

#[tokio::test]
async fn test_generated_passwords_differ_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deployment.yml");
    let answers = || {
        ScriptedAnswers::new()
            .with(ConfigKey::OauthClientId, "abc123")
            .with(ConfigKey::OauthClientSecret, "xyz")
    };

    collect_and_write(answers(), &path).await;
    let first = load_artifact(&path).await.unwrap();
    collect_and_write(answers(), &path).await;
    let second = load_artifact(&path).await.unwrap();

    let a = first.config.db_password.expose_secret().to_string();
    let b = second.config.db_password.expose_secret().to_string();
    assert!(is_hex_token(&a, 16));
    assert!(is_hex_token(&b, 16));
    assert_ne!(a, b);
    assert_eq!(first.config.frontend_baseurl, second.config.frontend_baseurl);
}

#[tokio::test]
async fn test_signing_keys_keep_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deployment.yml");

    collect_and_write(answers(), &path).await;
    let artifact = load_artifact(&path).await.unwrap();

    assert_eq!(artifact.config.trusted_signing_keys, vec!["A1B2C3D4", "E5F6A7B8"]);
}
