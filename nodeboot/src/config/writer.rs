//! Persisting the configuration artifact

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::config::model::{ArtifactView, DeploymentArtifact, DeploymentConfig};
use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::secrets::GeneratedSecrets;

/// Writes the configuration and generated secrets as one YAML artifact
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigWriter;

impl ConfigWriter {
    pub fn new() -> Self {
        Self
    }

    /// Validate, serialize and replace the artifact at `path`
    pub async fn write(
        &self,
        config: &DeploymentConfig,
        secrets: &GeneratedSecrets,
        path: &Path,
    ) -> Result<(), BootstrapError> {
        config.validate()?;

        let document = format!(
            "# Generated by nodeboot on {}. Contains plaintext secrets.\n{}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            serde_yaml::to_string(&ArtifactView { config, secrets })?
        );
        File::new(path)
            .write_atomic(document.as_bytes())
            .await
            .map_err(|source| BootstrapError::PersistWriteError {
                path: PathBuf::from(path),
                source,
            })?;

        info!("Configuration artifact written to {}", path.display());
        Ok(())
    }
}

/// Read a persisted artifact
pub async fn load_artifact(path: &Path) -> Result<DeploymentArtifact, BootstrapError> {
    File::new(path).read_yaml().await
}
