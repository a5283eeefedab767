//! Random token generation for authentication secrets

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::BootstrapError;

/// Byte length of the application secrets
pub const APP_SECRET_BYTES: usize = 32;

/// Byte length of the broker cluster cookie
pub const COOKIE_SECRET_BYTES: usize = 16;

/// A source of cryptographically secure random bytes
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), BootstrapError>;
}

/// Entropy from the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), BootstrapError> {
        getrandom::getrandom(buf)
            .map_err(|e| BootstrapError::EntropySourceUnavailable(e.to_string()))
    }
}

/// Produces lowercase hex tokens from a secure entropy source
pub struct SecretGenerator {
    source: Box<dyn EntropySource>,
}

impl SecretGenerator {
    pub fn new(source: Box<dyn EntropySource>) -> Self {
        Self { source }
    }

    /// Generator backed by the OS entropy source
    pub fn os() -> Self {
        Self::new(Box::new(OsEntropy))
    }

    /// Generate `byte_len` random bytes rendered as `2 * byte_len` hex characters
    pub fn generate(&self, byte_len: usize) -> Result<SecretString, BootstrapError> {
        let mut bytes = vec![0u8; byte_len];
        self.source.fill(&mut bytes)?;
        Ok(SecretString::from(hex::encode(&bytes)))
    }

    /// Generate the full set of secrets needed by a deployment
    pub fn generate_all(&self) -> Result<GeneratedSecrets, BootstrapError> {
        Ok(GeneratedSecrets {
            api_secret_key: self.generate(APP_SECRET_BYTES)?,
            frontend_secret_key: self.generate(APP_SECRET_BYTES)?,
            broker_cluster_cookie: self.generate(COOKIE_SECRET_BYTES)?,
        })
    }
}

impl Default for SecretGenerator {
    fn default() -> Self {
        Self::os()
    }
}

/// Secrets generated once per run and persisted alongside the configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratedSecrets {
    #[serde(serialize_with = "expose", deserialize_with = "conceal")]
    pub api_secret_key: SecretString,

    #[serde(serialize_with = "expose", deserialize_with = "conceal")]
    pub frontend_secret_key: SecretString,

    #[serde(serialize_with = "expose", deserialize_with = "conceal")]
    pub broker_cluster_cookie: SecretString,
}

/// Serialize a secret as its plain value
pub fn expose<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

/// Deserialize a plain string into a secret
pub fn conceal<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::from(s))
}

/// Check a token is lowercase hex of the expected byte length
pub fn is_hex_token(token: &str, byte_len: usize) -> bool {
    token.len() == byte_len * 2
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
