/// Artifact storage
///
/// Screenshots, crops, diffs and thumbnails are addressed by relative paths
/// scoped by page id. One backend is chosen from configuration at startup and
/// shared as `Arc<dyn ArtifactStore>`.
pub mod gateway;
pub mod local;
mod object;
pub mod path;
pub mod s3;

pub use gateway::GatewayStore;
pub use local::LocalStore;
pub use s3::S3Store;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use crate::config::StorageSettings;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid artifact path '{0}': {1}")]
    InvalidPath(String, &'static str),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("failed to write artifact {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("failed to read artifact {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("storage backend unavailable: {0}")]
    Backend(String),
}

/// How the artifact retrieval boundary hands an artifact to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Stream the bytes through the service
    Proxy,
    /// Redirect the client to `ArtifactStore::url`
    Redirect,
}

pub type ArtifactReader = Box<dyn AsyncRead + Send + Unpin>;

/// A filesystem path to an artifact's bytes.
///
/// Object backends hand out a temporary download that is removed on
/// `release` or drop.
#[derive(Debug)]
pub struct LocalArtifact {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl LocalArtifact {
    pub fn persistent(path: PathBuf) -> Self {
        Self { path, temp: None }
    }

    pub fn transient(temp: TempPath) -> Self {
        Self { path: temp.to_path_buf(), temp: Some(temp) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_transient(&self) -> bool {
        self.temp.is_some()
    }

    /// Remove the temporary copy, if any
    pub fn release(self) {
        if let Some(temp) = self.temp {
            if let Err(e) = temp.close() {
                warn!("Failed to remove temporary artifact {}: {}", self.path.display(), e);
            }
        }
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Write or overwrite an artifact
    async fn save(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;

    async fn open(&self, path: &str) -> Result<ArtifactReader, StoreError>;

    /// Never fails; backend errors count as absent
    async fn exists(&self, path: &str) -> bool;

    /// Best-effort and idempotent. Empty paths are ignored.
    async fn delete(&self, path: &str);

    /// Client-facing URL; empty when none can be produced
    async fn url(&self, path: &str) -> String;

    async fn local_access(&self, path: &str) -> Option<LocalArtifact>;

    fn delivery(&self) -> Delivery;

    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let mut reader = self.open(path).await?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| StoreError::Read { path: path.to_string(), reason: e.to_string() })?;
        Ok(data)
    }
}

/// Construct the configured backend
pub async fn build_store(settings: &StorageSettings) -> Result<Arc<dyn ArtifactStore>, StoreError> {
    let store: Arc<dyn ArtifactStore> = match settings {
        StorageSettings::Local(local) => Arc::new(LocalStore::new(&local.root, &local.public_prefix)?),
        StorageSettings::S3(s3) => Arc::new(S3Store::new(s3)?),
        StorageSettings::Gateway(gateway) => Arc::new(GatewayStore::connect(gateway).await?),
    };
    tracing::info!("Artifact store ready: {}", store.backend());
    Ok(store)
}
