use async_trait::async_trait;
use s3::{Bucket, BucketConfiguration};
use tracing::{info, warn};

use super::object::{BucketSpec, ObjectBucket};
use super::path::normalize;
use super::{ArtifactReader, ArtifactStore, Delivery, LocalArtifact, StoreError};
use crate::config::GatewayStorageSettings;

/// Internal S3-compatible gateway.
///
/// The gateway is not reachable by clients, so artifacts are always proxied
/// through the service under `public_prefix`. Addressing is path-style and
/// requests go unsigned when no credentials are configured.
pub struct GatewayStore {
    objects: ObjectBucket,
    public_prefix: String,
}

impl GatewayStore {
    /// Open the bucket, creating it when missing. A failed create is logged only.
    pub async fn connect(settings: &GatewayStorageSettings) -> Result<Self, StoreError> {
        let spec = BucketSpec {
            bucket: &settings.bucket,
            region: &settings.region,
            endpoint: &settings.endpoint,
            access_key: &settings.access_key,
            secret_key: &settings.secret_key,
            path_style: true,
        };
        let store = Self::with_bucket(spec.open()?, settings);
        store.ensure_bucket(&spec).await;
        Ok(store)
    }

    fn with_bucket(bucket: Box<Bucket>, settings: &GatewayStorageSettings) -> Self {
        Self {
            objects: ObjectBucket::new(bucket, &settings.key_prefix),
            public_prefix: settings.public_prefix.trim_end_matches('/').to_string(),
        }
    }

    async fn ensure_bucket(&self, spec: &BucketSpec<'_>) {
        match self.objects.bucket().exists().await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!("Could not query gateway bucket '{}': {}", spec.bucket, e);
                return;
            }
        }

        let (region, credentials) = match (spec.region(), spec.credentials()) {
            (Ok(region), Ok(credentials)) => (region, credentials),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Cannot create gateway bucket '{}': {}", spec.bucket, e);
                return;
            }
        };

        match Bucket::create_with_path_style(spec.bucket, region, credentials, BucketConfiguration::default()).await {
            Ok(_) => info!("Created gateway bucket '{}'", spec.bucket),
            Err(e) => warn!("Failed to create gateway bucket '{}': {}", spec.bucket, e),
        }
    }
}

#[async_trait]
impl ArtifactStore for GatewayStore {
    fn backend(&self) -> &'static str {
        "gateway"
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
        match normalize(path) {
            Ok(rel) => format!("{}/{}", self.public_prefix, rel),
            Err(_) => String::new(),
        }
    }

    async fn local_access(&self, path: &str) -> Option<LocalArtifact> {
        self.objects.download(path).await
    }

    fn delivery(&self) -> Delivery {
        Delivery::Proxy
    }
}
