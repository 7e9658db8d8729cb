use anyhow::{Context, Result};
use portaria_types::{Grant, Module, Permission};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Contents of the grant relation and its catalogs, as stored in a data file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendData {
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

/// Loading and saving of backend data files
pub struct DataFile;

impl DataFile {
    /// Load data from a YAML file; a missing file yields empty catalogs.
    pub async fn load(path: &Path) -> Result<BackendData> {
        if !path.exists() {
            warn!(
                "Grant data file not found at {}, starting with empty catalogs",
                path.display()
            );
            return Ok(BackendData::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read grant data file {}", path.display()))?;

        serde_norway::from_str(&content)
            .with_context(|| format!("Failed to parse grant data file {}", path.display()))
    }

    pub async fn save(data: &BackendData, path: &Path) -> Result<()> {
        let yaml = serde_norway::to_string(data).context("Failed to serialize grant data")?;
        tokio::fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to save grant data file {}", path.display()))?;
        Ok(())
    }
}
