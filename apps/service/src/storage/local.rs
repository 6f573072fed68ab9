use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::path::normalize;
use super::{ArtifactReader, ArtifactStore, Delivery, LocalArtifact, StoreError};

/// Artifacts as files under a root directory
pub struct LocalStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            StoreError::Backend(format!("cannot create storage root {}: {}", root.display(), e))
        })?;

        Ok(Self { root, public_prefix: public_prefix.trim_end_matches('/').to_string() })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(normalize(path)?))
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn save(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        let write_error = |e: std::io::Error| StoreError::Write { path: path.to_string(), reason: e.to_string() };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }
        tokio::fs::write(&target, data).await.map_err(write_error)?;

        debug!("Saved {} ({} bytes)", path, data.len());
        Ok(())
    }

    async fn open(&self, path: &str) -> Result<ArtifactReader, StoreError> {
        let target = self.resolve(path)?;
        match tokio::fs::File::open(&target).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(path.to_string())),
            Err(e) => Err(StoreError::Read { path: path.to_string(), reason: e.to_string() }),
        }
    }

    async fn exists(&self, path: &str) -> bool {
        let Ok(target) = self.resolve(path) else {
            return false;
        };
        match tokio::fs::try_exists(&target).await {
            Ok(found) => found && target.is_file(),
            Err(e) => {
                warn!("Failed to stat {}: {}", path, e);
                false
            }
        }
    }

    async fn delete(&self, path: &str) {
        if path.is_empty() {
            return;
        }
        let target = match self.resolve(path) {
            Ok(target) => target,
            Err(e) => {
                warn!("Refusing to delete {}", e);
                return;
            }
        };

        match tokio::fs::remove_file(&target).await {
            Ok(()) => debug!("Deleted {}", path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", path, e),
        }
    }

    async fn url(&self, path: &str) -> String {
        match normalize(path) {
            Ok(rel) => format!("{}/{}", self.public_prefix, rel),
            Err(_) => String::new(),
        }
    }

    async fn local_access(&self, path: &str) -> Option<LocalArtifact> {
        let target = self.resolve(path).ok()?;
        target.is_file().then(|| LocalArtifact::persistent(target))
    }

    fn delivery(&self) -> Delivery {
        Delivery::Proxy
    }
}
