//! Interactive collection of the deployment configuration

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::config::answers::{is_affirmative, AnswerSource, PromptSpec};
use crate::config::keys::{ConfigKey, PromptKind};
use crate::config::model::{
    default_frontend_baseurl, parse_signing_keys, ConnectionMode, DeploymentConfig,
    InterpreterMode, DEFAULT_BROKER_USER, DEFAULT_DB_NAME, DEFAULT_DB_USER, LOOPBACK_ADDRESS,
};
use crate::errors::BootstrapError;
use crate::secrets::{SecretGenerator, COOKIE_SECRET_BYTES};

/// Values resolved so far, one per key
#[derive(Debug, Default)]
struct Draft {
    values: BTreeMap<ConfigKey, String>,
}

impl Draft {
    fn get(&self, key: ConfigKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Record a resolved value. A key keeps the first value it was given.
    fn set(&mut self, key: ConfigKey, value: String) {
        self.values.entry(key).or_insert(value);
    }

    /// Default for a key, computed from values resolved earlier
    fn default_for(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::ServerAddress => Some(LOOPBACK_ADDRESS.to_string()),
            ConfigKey::FrontendBaseUrl => self.get(ConfigKey::ServerAddress).map(default_frontend_baseurl),
            ConfigKey::ConnectionMode => Some("no".to_string()),
            ConfigKey::DbName => Some(DEFAULT_DB_NAME.to_string()),
            ConfigKey::DbUser => Some(DEFAULT_DB_USER.to_string()),
            ConfigKey::BrokerUser => Some(DEFAULT_BROKER_USER.to_string()),
            ConfigKey::ReuseExistingCheckouts => Some("no".to_string()),
            ConfigKey::PythonInterpreter => Some("auto".to_string()),
            ConfigKey::TrustedSigningKeys => Some(String::new()),
            ConfigKey::OauthClientId
            | ConfigKey::OauthClientSecret
            | ConfigKey::DbPassword
            | ConfigKey::BrokerPassword
            | ConfigKey::ArtifactRepoPassword => None,
        }
    }

    fn take(&mut self, key: ConfigKey) -> String {
        self.values.remove(&key).unwrap_or_default()
    }

    fn into_config(mut self) -> Result<DeploymentConfig, BootstrapError> {
        let connection_mode = match self.take(ConfigKey::ConnectionMode).as_str() {
            "local" => ConnectionMode::Local,
            _ => ConnectionMode::Remote,
        };
        let python_interpreter: InterpreterMode = self
            .take(ConfigKey::PythonInterpreter)
            .parse()
            .map_err(BootstrapError::InvalidConfig)?;

        Ok(DeploymentConfig {
            server_address: self.take(ConfigKey::ServerAddress),
            frontend_baseurl: self.take(ConfigKey::FrontendBaseUrl),
            connection_mode,
            oauth_client_id: self.take(ConfigKey::OauthClientId),
            oauth_client_secret: SecretString::from(self.take(ConfigKey::OauthClientSecret)),
            db_name: self.take(ConfigKey::DbName),
            db_user: self.take(ConfigKey::DbUser),
            db_password: SecretString::from(self.take(ConfigKey::DbPassword)),
            broker_user: self.take(ConfigKey::BrokerUser),
            broker_password: SecretString::from(self.take(ConfigKey::BrokerPassword)),
            artifact_repo_password: SecretString::from(self.take(ConfigKey::ArtifactRepoPassword)),
            reuse_existing_checkouts: self.take(ConfigKey::ReuseExistingCheckouts) == "true",
            python_interpreter,
            trusted_signing_keys: parse_signing_keys(&self.take(ConfigKey::TrustedSigningKeys)),
        })
    }
}

/// Asks the operator for every configuration field in a fixed order
pub struct ConfigCollector<'a> {
    answers: &'a mut dyn AnswerSource,
    generator: &'a SecretGenerator,
}

impl<'a> ConfigCollector<'a> {
    pub fn new(answers: &'a mut dyn AnswerSource, generator: &'a SecretGenerator) -> Self {
        Self { answers, generator }
    }

    /// Prompt for all fields and build the configuration
    pub fn collect(&mut self) -> Result<DeploymentConfig, BootstrapError> {
        let mut draft = Draft::default();

        for key in ConfigKey::PROMPT_ORDER {
            if key == ConfigKey::ConnectionMode
                && draft.get(ConfigKey::ServerAddress) == Some(LOOPBACK_ADDRESS)
            {
                info!("Loopback address given, using a local connection");
                draft.set(key, "local".to_string());
                continue;
            }

            let default = draft.default_for(key);
            let prompt = PromptSpec::field(key, default.clone());
            let answer = self.answers.next_answer(&prompt)?;
            let value = self.resolve(key, answer.trim(), default)?;
            debug!("Resolved {}", key);
            draft.set(key, value);
        }

        draft.into_config()
    }

    /// Turn a raw answer into the stored value
    fn resolve(
        &self,
        key: ConfigKey,
        answer: &str,
        default: Option<String>,
    ) -> Result<String, BootstrapError> {
        if key.kind() == PromptKind::Confirm {
            let affirmative = if answer.is_empty() {
                default.as_deref().map(is_affirmative).unwrap_or(false)
            } else {
                is_affirmative(answer)
            };
            return Ok(match (key, affirmative) {
                (ConfigKey::ConnectionMode, true) => "local".to_string(),
                (ConfigKey::ConnectionMode, false) => "remote".to_string(),
                (_, affirmative) => affirmative.to_string(),
            });
        }

        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
        if key.is_generated_when_empty() {
            let token = self.generator.generate(COOKIE_SECRET_BYTES)?;
            return Ok(token.expose_secret().to_string());
        }
        Ok(default.unwrap_or_default())
    }
}
