//! Marker files the pipeline keeps about what it last applied

use crate::core::StepError;
use crate::steps::context::{read_optional, write_if_changed};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Manifest digest written by the deploy step
pub const DEPLOY_DIGEST: &str = "deploy.digest";
/// Commit written by the deploy step
pub const DEPLOY_REVISION: &str = "deploy.revision";
/// Digest of the site config the proxy last loaded
pub const PROXY_LOADED: &str = "proxy.loaded";

/// Hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Marker files under the state directory
#[derive(Debug, Clone)]
pub struct MarkerStore {
    dir: PathBuf,
}

impl MarkerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Trimmed marker content, `None` if the marker was never written
    pub async fn read(&self, name: &str) -> Result<Option<String>, StepError> {
        Ok(read_optional(&self.path(name))
            .await?
            .map(|content| content.trim().to_string()))
    }

    pub async fn write(&self, name: &str, value: &str) -> Result<(), StepError> {
        write_if_changed(&self.path(name), &format!("{}\n", value)).await?;
        Ok(())
    }

    /// Whether the marker holds exactly `value`
    pub async fn matches(&self, name: &str, value: &str) -> Result<bool, StepError> {
        Ok(self.read(name).await?.as_deref() == Some(value))
    }
}

/// Digest of a file's content, `None` if it does not exist
pub async fn file_digest(path: &Path) -> Result<Option<String>, StepError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(sha256_hex(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StepError::io(path, e)),
    }
}
