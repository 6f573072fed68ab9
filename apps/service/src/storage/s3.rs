use async_trait::async_trait;
use tracing::warn;

use super::object::{BucketSpec, ObjectBucket};
use super::{ArtifactReader, ArtifactStore, Delivery, LocalArtifact, StoreError};
use crate::config::S3StorageSettings;

/// Generic S3-compatible bucket. Clients fetch artifacts through pre-signed URLs.
pub struct S3Store {
    objects: ObjectBucket,
    presign_expiry_seconds: u32,
}

impl S3Store {
    pub fn new(settings: &S3StorageSettings) -> Result<Self, StoreError> {
        if settings.bucket.is_empty() {
            return Err(StoreError::Backend("s3 backend requires a bucket name".to_string()));
        }

        let bucket = BucketSpec {
            bucket: &settings.bucket,
            region: &settings.region,
            endpoint: &settings.endpoint,
            access_key: &settings.access_key,
            secret_key: &settings.secret_key,
            path_style: settings.path_style,
        }
        .open()?;

        Ok(Self {
            objects: ObjectBucket::new(bucket, &settings.key_prefix),
            presign_expiry_seconds: settings.presign_expiry_seconds,
        })
    }
}

#[async_trait]
impl ArtifactStore for S3Store {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn save(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.objects.put(path, data).await
    }

    async fn open(&self, path: &str) -> Result<ArtifactReader, StoreError> {
        self.objects.open(path).await
    }

    async fn exists(&self, path: &str) -> bool {
        self.objects.exists(path).await
    }

    async fn delete(&self, path: &str) {
        self.objects.delete(path).await
    }

    async fn url(&self, path: &str) -> String {
        let Ok(key) = self.objects.key(path) else {
            return String::new();
        };
        match self.objects.bucket().presign_get(&key, self.presign_expiry_seconds, None).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Failed to presign {}: {}", key, e);
                String::new()
            }
        }
    }

    async fn local_access(&self, path: &str) -> Option<LocalArtifact> {
        self.objects.download(path).await
    }

    fn delivery(&self) -> Delivery {
        Delivery::Redirect
    }
}
