use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::backends::{Publisher, RunArtifacts};

/// 📁 Where the directory publisher drops its copies.
#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryPublishConfig {
    pub path: PathBuf,
    /// 🗑️ Delete the local report and log once the copies are in place.
    #[serde(default)]
    pub remove_local: bool,
}

/// 📁 Copies the report and the diagnostics log into an outbound directory.
///
/// When the outbound directory is the output directory, there is nothing to copy
/// and nothing is removed.
#[derive(Debug)]
pub(crate) struct DirectoryPublisher {
    config: DirectoryPublishConfig,
}

impl DirectoryPublisher {
    pub(crate) fn new(config: DirectoryPublishConfig) -> Self {
        Self { config }
    }

    async fn deliver(&self, artifact: &Path) -> Result<()> {
        let Some(the_name) = artifact.file_name() else {
            anyhow::bail!("💀 '{}' has no file name to publish under.", artifact.display());
        };
        let the_destination = self.config.path.join(the_name);

        if same_directory(artifact, &self.config.path).await {
            debug!("📁 '{}' already lives in the outbound directory", artifact.display());
            return Ok(());
        }

        tokio::fs::copy(artifact, &the_destination)
            .await
            .context(format!(
                "💀 Copying '{}' to '{}' failed.",
                artifact.display(),
                the_destination.display()
            ))?;
        if self.config.remove_local {
            tokio::fs::remove_file(artifact).await.context(format!(
                "💀 '{}' was published but refused to be removed locally.",
                artifact.display()
            ))?;
        }
        info!("📤 published '{}'", the_destination.display());
        Ok(())
    }
}

async fn same_directory(artifact: &Path, outbound: &Path) -> bool {
    let the_parent = match artifact.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (
        tokio::fs::canonicalize(the_parent).await,
        tokio::fs::canonicalize(outbound).await,
    ) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(&mut self, artifacts: &RunArtifacts) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.path)
            .await
            .context(format!(
                "💀 The outbound directory '{}' could not be created.",
                self.config.path.display()
            ))?;

        self.deliver(&artifacts.report_path).await?;
        if let Some(log_path) = &artifacts.log_path {
            self.deliver(log_path).await?;
        }
        Ok(())
    }

    fn destination(&self) -> String {
        self.config.path.display().to_string()
    }
}
