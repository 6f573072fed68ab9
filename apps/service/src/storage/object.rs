//! Shared S3 plumbing for the object backends.

use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::path::{content_type, normalize};
use super::{ArtifactReader, LocalArtifact, StoreError};

/// Connection parameters common to both object backends
pub(crate) struct BucketSpec<'a> {
    pub bucket: &'a str,
    pub region: &'a str,
    pub endpoint: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub path_style: bool,
}

impl BucketSpec<'_> {
    pub fn region(&self) -> Result<Region, StoreError> {
        if self.endpoint.is_empty() {
            self.region.parse().map_err(|e| StoreError::Backend(format!("invalid region '{}': {}", self.region, e)))
        } else {
            Ok(Region::Custom { region: self.region.to_string(), endpoint: self.endpoint.to_string() })
        }
    }

    /// Signed credentials, or anonymous requests when no keys are configured
    pub fn credentials(&self) -> Result<Credentials, StoreError> {
        let credentials = if self.access_key.is_empty() || self.secret_key.is_empty() {
            Credentials::anonymous()
        } else {
            Credentials::new(Some(self.access_key), Some(self.secret_key), None, None, None)
        };
        credentials.map_err(|e| StoreError::Backend(format!("invalid credentials: {e}")))
    }

    pub fn open(&self) -> Result<Box<Bucket>, StoreError> {
        let bucket = Bucket::new(self.bucket, self.region()?, self.credentials()?)
            .map_err(|e| StoreError::Backend(format!("cannot open bucket '{}': {}", self.bucket, e)))?;
        Ok(if self.path_style { bucket.with_path_style() } else { bucket })
    }
}

fn is_not_found(error: &S3Error) -> bool {
    matches!(error, S3Error::HttpFailWithBody(404, _))
}

/// A bucket plus the key prefix artifacts live under
pub(crate) struct ObjectBucket {
    bucket: Box<Bucket>,
    key_prefix: String,
}

impl ObjectBucket {
    pub fn new(bucket: Box<Bucket>, key_prefix: &str) -> Self {
        Self { bucket, key_prefix: key_prefix.trim_matches('/').to_string() }
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    /// Object key for an artifact path
    pub fn key(&self, path: &str) -> Result<String, StoreError> {
        let rel = normalize(path)?;
        Ok(if self.key_prefix.is_empty() { rel } else { format!("{}/{}", self.key_prefix, rel) })
    }

    pub async fn put(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let key = self.key(path)?;
        self.bucket
            .put_object_with_content_type(&key, data, content_type(path))
            .await
            .map_err(|e| StoreError::Write { path: path.to_string(), reason: e.to_string() })?;
        debug!("Uploaded {} ({} bytes)", key, data.len());
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let key = self.key(path)?;
        match self.bucket.get_object(&key).await {
            Ok(response) => Ok(response.bytes().to_vec()),
            Err(e) if is_not_found(&e) => Err(StoreError::NotFound(path.to_string())),
            Err(e) => Err(StoreError::Read { path: path.to_string(), reason: e.to_string() }),
        }
    }

    pub async fn open(&self, path: &str) -> Result<ArtifactReader, StoreError> {
        let data = self.get(path).await?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    pub async fn exists(&self, path: &str) -> bool {
        let Ok(key) = self.key(path) else {
            return false;
        };
        match self.bucket.head_object(&key).await {
            Ok((_, status)) => (200..300).contains(&status),
            Err(e) if is_not_found(&e) => false,
            Err(e) => {
                warn!("Failed to stat object {}: {}", key, e);
                false
            }
        }
    }

    pub async fn delete(&self, path: &str) {
        if path.is_empty() {
            return;
        }
        let key = match self.key(path) {
            Ok(key) => key,
            Err(e) => {
                warn!("Refusing to delete {}", e);
                return;
            }
        };
        match self.bucket.delete_object(&key).await {
            Ok(_) => debug!("Deleted object {}", key),
            Err(e) if is_not_found(&e) => {}
            Err(e) => warn!("Failed to delete object {}: {}", key, e),
        }
    }

    /// Download into a temporary file the caller releases
    pub async fn download(&self, path: &str) -> Option<LocalArtifact> {
        let data = match self.get(path).await {
            Ok(data) => data,
            Err(e) => {
                debug!("No local copy of {}: {}", path, e);
                return None;
            }
        };

        let written = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            let mut file = NamedTempFile::with_suffix(".jpg")?;
            file.write_all(&data)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await;

        match written {
            Ok(Ok(temp)) => Some(LocalArtifact::transient(temp)),
            Ok(Err(e)) => {
                warn!("Failed to write temporary copy of {}: {}", path, e);
                None
            }
            Err(e) => {
                warn!("Temporary copy of {} panicked: {}", path, e);
                None
            }
        }
    }
}
