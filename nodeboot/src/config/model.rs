//! Deployment configuration data model

use std::fmt;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::keys::ConfigKey;
use crate::errors::BootstrapError;
use crate::secrets::{conceal, expose, GeneratedSecrets};

/// Address that always resolves to a local connection
pub const LOOPBACK_ADDRESS: &str = "localhost";

/// Port the frontend listens on when no base URL is given
pub const DEFAULT_FRONTEND_PORT: u16 = 8080;

pub const DEFAULT_DB_NAME: &str = "buildsys";
pub const DEFAULT_DB_USER: &str = "buildsys";
pub const DEFAULT_BROKER_USER: &str = "buildsys";

/// How the provisioning engine reaches the target host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    Local,
    Remote,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Local => f.write_str("local"),
            ConnectionMode::Remote => f.write_str("remote"),
        }
    }
}

/// Interpreter used on the target host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InterpreterMode {
    /// Let the target pick its platform interpreter
    #[default]
    Auto,
    /// Explicit interpreter path
    Path(PathBuf),
}

impl InterpreterMode {
    /// Executable to invoke on the target
    pub fn command(&self) -> String {
        match self {
            InterpreterMode::Auto => "python3".to_string(),
            InterpreterMode::Path(path) => path.display().to_string(),
        }
    }
}

impl fmt::Display for InterpreterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpreterMode::Auto => f.write_str("auto"),
            InterpreterMode::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

impl std::str::FromStr for InterpreterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            Ok(InterpreterMode::Auto)
        } else {
            Ok(InterpreterMode::Path(PathBuf::from(s)))
        }
    }
}

impl Serialize for InterpreterMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InterpreterMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a comma or whitespace separated key list, keeping order and
/// dropping duplicates
pub fn parse_signing_keys(input: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for key in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|k| !k.is_empty())
    {
        if !keys.iter().any(|existing| existing == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// Default frontend URL derived from the server address
pub fn default_frontend_baseurl(address: &str) -> String {
    format!("http://{}:{}", address, DEFAULT_FRONTEND_PORT)
}

/// Deployment parameters gathered from the operator
#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub server_address: String,

    pub frontend_baseurl: String,

    pub connection_mode: ConnectionMode,

    pub oauth_client_id: String,

    #[serde(serialize_with = "expose", deserialize_with = "conceal")]
    pub oauth_client_secret: SecretString,

    pub db_name: String,

    pub db_user: String,

    #[serde(serialize_with = "expose", deserialize_with = "conceal")]
    pub db_password: SecretString,

    pub broker_user: String,

    #[serde(serialize_with = "expose", deserialize_with = "conceal")]
    pub broker_password: SecretString,

    #[serde(serialize_with = "expose", deserialize_with = "conceal")]
    pub artifact_repo_password: SecretString,

    #[serde(default)]
    pub reuse_existing_checkouts: bool,

    #[serde(default)]
    pub python_interpreter: InterpreterMode,

    #[serde(default)]
    pub trusted_signing_keys: Vec<String>,
}

impl DeploymentConfig {
    /// Check every required field is present
    pub fn validate(&self) -> Result<(), BootstrapError> {
        let missing: Vec<&str> = ConfigKey::PROMPT_ORDER
            .iter()
            .filter(|key| key.is_required())
            .filter(|key| self.text_value(**key).map_or(true, |v| v.trim().is_empty()))
            .map(|key| key.as_str())
            .collect();

        if !missing.is_empty() {
            return Err(BootstrapError::InvalidConfig(format!(
                "required fields are empty: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Unmasked value of a free-text or secret field, `None` for typed fields
    fn text_value(&self, key: ConfigKey) -> Option<&str> {
        match key {
            ConfigKey::ServerAddress => Some(self.server_address.as_str()),
            ConfigKey::FrontendBaseUrl => Some(self.frontend_baseurl.as_str()),
            ConfigKey::OauthClientId => Some(self.oauth_client_id.as_str()),
            ConfigKey::OauthClientSecret => Some(self.oauth_client_secret.expose_secret()),
            ConfigKey::DbName => Some(self.db_name.as_str()),
            ConfigKey::DbUser => Some(self.db_user.as_str()),
            ConfigKey::DbPassword => Some(self.db_password.expose_secret()),
            ConfigKey::BrokerUser => Some(self.broker_user.as_str()),
            ConfigKey::BrokerPassword => Some(self.broker_password.expose_secret()),
            ConfigKey::ArtifactRepoPassword => Some(self.artifact_repo_password.expose_secret()),
            ConfigKey::ConnectionMode
            | ConfigKey::ReuseExistingCheckouts
            | ConfigKey::PythonInterpreter
            | ConfigKey::TrustedSigningKeys => None,
        }
    }

    /// Display value for a key; secret values are masked
    pub fn display_value(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::ServerAddress => self.server_address.clone(),
            ConfigKey::FrontendBaseUrl => self.frontend_baseurl.clone(),
            ConfigKey::ConnectionMode => self.connection_mode.to_string(),
            ConfigKey::OauthClientId => self.oauth_client_id.clone(),
            ConfigKey::DbName => self.db_name.clone(),
            ConfigKey::DbUser => self.db_user.clone(),
            ConfigKey::BrokerUser => self.broker_user.clone(),
            ConfigKey::ReuseExistingCheckouts => self.reuse_existing_checkouts.to_string(),
            ConfigKey::PythonInterpreter => self.python_interpreter.to_string(),
            ConfigKey::TrustedSigningKeys => {
                if self.trusted_signing_keys.is_empty() {
                    "(none)".to_string()
                } else {
                    self.trusted_signing_keys.join(", ")
                }
            }
            ConfigKey::OauthClientSecret
            | ConfigKey::DbPassword
            | ConfigKey::BrokerPassword
            | ConfigKey::ArtifactRepoPassword => "********".to_string(),
        }
    }

    /// Summary rows in prompt order
    pub fn summary(&self) -> Vec<(ConfigKey, String)> {
        ConfigKey::PROMPT_ORDER
            .iter()
            .map(|key| (*key, self.display_value(*key)))
            .collect()
    }
}

/// Borrowed view of everything that goes into the persisted artifact
#[derive(Serialize)]
pub struct ArtifactView<'a> {
    #[serde(flatten)]
    pub config: &'a DeploymentConfig,

    #[serde(flatten)]
    pub secrets: &'a GeneratedSecrets,
}

/// The persisted artifact as read back by the stages
#[derive(Debug, Deserialize)]
pub struct DeploymentArtifact {
    #[serde(flatten)]
    pub config: DeploymentConfig,

    #[serde(flatten)]
    pub secrets: GeneratedSecrets,
}
