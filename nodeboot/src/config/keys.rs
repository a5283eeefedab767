//! Closed set of configuration keys

use std::fmt;

/// How a configuration value is gathered from the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Echoed free text
    Text,
    /// Text collected without echo
    Secret,
    /// Yes/no question
    Confirm,
}

/// Every field of the deployment configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKey {
    ServerAddress,
    FrontendBaseUrl,
    ConnectionMode,
    OauthClientId,
    OauthClientSecret,
    DbName,
    DbUser,
    DbPassword,
    BrokerUser,
    BrokerPassword,
    ArtifactRepoPassword,
    ReuseExistingCheckouts,
    PythonInterpreter,
    TrustedSigningKeys,
}

impl ConfigKey {
    /// Order in which the operator is asked for values. Derived defaults only
    /// read keys that come earlier in this list.
    pub const PROMPT_ORDER: [ConfigKey; 14] = [
        ConfigKey::ServerAddress,
        ConfigKey::FrontendBaseUrl,
        ConfigKey::ConnectionMode,
        ConfigKey::OauthClientId,
        ConfigKey::OauthClientSecret,
        ConfigKey::DbName,
        ConfigKey::DbUser,
        ConfigKey::DbPassword,
        ConfigKey::BrokerUser,
        ConfigKey::BrokerPassword,
        ConfigKey::ArtifactRepoPassword,
        ConfigKey::ReuseExistingCheckouts,
        ConfigKey::PythonInterpreter,
        ConfigKey::TrustedSigningKeys,
    ];

    /// Key name used in the persisted artifact
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::ServerAddress => "server_address",
            ConfigKey::FrontendBaseUrl => "frontend_baseurl",
            ConfigKey::ConnectionMode => "connection_mode",
            ConfigKey::OauthClientId => "oauth_client_id",
            ConfigKey::OauthClientSecret => "oauth_client_secret",
            ConfigKey::DbName => "db_name",
            ConfigKey::DbUser => "db_user",
            ConfigKey::DbPassword => "db_password",
            ConfigKey::BrokerUser => "broker_user",
            ConfigKey::BrokerPassword => "broker_password",
            ConfigKey::ArtifactRepoPassword => "artifact_repo_password",
            ConfigKey::ReuseExistingCheckouts => "reuse_existing_checkouts",
            ConfigKey::PythonInterpreter => "python_interpreter",
            ConfigKey::TrustedSigningKeys => "trusted_signing_keys",
        }
    }

    /// Prompt label shown to the operator
    pub fn label(&self) -> &'static str {
        match self {
            ConfigKey::ServerAddress => "Server address (hostname or IP)",
            ConfigKey::FrontendBaseUrl => "Frontend base URL",
            ConfigKey::ConnectionMode => "Provision this machine directly (local connection)?",
            ConfigKey::OauthClientId => "OAuth client ID",
            ConfigKey::OauthClientSecret => "OAuth client secret",
            ConfigKey::DbName => "Database name",
            ConfigKey::DbUser => "Database user",
            ConfigKey::DbPassword => "Database password (empty to generate)",
            ConfigKey::BrokerUser => "Message broker user",
            ConfigKey::BrokerPassword => "Message broker password (empty to generate)",
            ConfigKey::ArtifactRepoPassword => "Artifact repository password (empty to generate)",
            ConfigKey::ReuseExistingCheckouts => "Reuse existing source checkouts?",
            ConfigKey::PythonInterpreter => "Python interpreter ('auto' or a path)",
            ConfigKey::TrustedSigningKeys => "Trusted signing key IDs (comma separated)",
        }
    }

    pub fn kind(&self) -> PromptKind {
        match self {
            ConfigKey::OauthClientSecret
            | ConfigKey::DbPassword
            | ConfigKey::BrokerPassword
            | ConfigKey::ArtifactRepoPassword => PromptKind::Secret,
            ConfigKey::ConnectionMode | ConfigKey::ReuseExistingCheckouts => PromptKind::Confirm,
            _ => PromptKind::Text,
        }
    }

    /// Whether an empty value is filled with a freshly generated token
    pub fn is_generated_when_empty(&self) -> bool {
        matches!(
            self,
            ConfigKey::DbPassword | ConfigKey::BrokerPassword | ConfigKey::ArtifactRepoPassword
        )
    }

    /// Whether the persisted artifact must carry a non-empty value
    pub fn is_required(&self) -> bool {
        !matches!(
            self,
            ConfigKey::ConnectionMode
                | ConfigKey::ReuseExistingCheckouts
                | ConfigKey::PythonInterpreter
                | ConfigKey::TrustedSigningKeys
        )
    }

    /// Look a key up by its artifact name
    pub fn from_name(name: &str) -> Option<ConfigKey> {
        Self::PROMPT_ORDER
            .iter()
            .copied()
            .find(|key| key.as_str() == name)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
