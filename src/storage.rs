use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::ApiError;

/// Prefixes covered by the retention sweep, matching the folders
/// `MediaType::folder` uploads into.
pub const SWEEP_PREFIXES: [&str; 2] = ["vidioe/", "audio/"];

pub const DEFAULT_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ObjectPage {
    pub objects: Vec<StoredObject>,
    pub next_token: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: u64,
    pub errors: u64,
}

/// Backend seam over the bucket so the sweep and the upload path can be
/// exercised against an in-memory store in tests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_file(&self, local: &Path, key: &str) -> Result<(), ApiError>;

    async fn download_object(&self, key: &str, dest: &Path) -> Result<(), ApiError>;

    async fn delete_object(&self, key: &str) -> Result<(), ApiError>;

    /// One page of a paginated listing. `token` of `None` starts from the
    /// beginning; a page with `next_token: None` is the last one.
    async fn list_page(&self, prefix: &str, token: Option<String>) -> Result<ObjectPage, ApiError>;
}

/// Thin gateway over the configured bucket: uploads with public-URL
/// construction, plus the periodic retention sweep.
pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
    public_url: String,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn ObjectStore>, public_url: String) -> Self {
        Self { store, public_url }
    }

    pub async fn upload_file(&self, local: &Path, key: &str) -> Result<String, ApiError> {
        self.store.put_file(local, key).await?;
        Ok(format!("{}/{key}", self.public_url.trim_end_matches('/')))
    }

    pub async fn download_object(&self, key: &str, dest: &Path) -> Result<(), ApiError> {
        self.store.download_object(key, dest).await
    }

    pub async fn delete_object(&self, key: &str) -> Result<(), ApiError> {
        self.store.delete_object(key).await
    }

    /// Deletes every object under the swept prefixes strictly older than
    /// `now - retention_days`. Best effort: a failed listing aborts only
    /// that prefix, a failed delete only skips that object; both are
    /// counted, logged, and never escalated.
    pub async fn sweep_older_than(&self, retention_days: i64) -> SweepReport {
        info!(retention_days, "starting retention sweep");

        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let mut report = SweepReport::default();

        for prefix in SWEEP_PREFIXES {
            let mut token: Option<String> = None;

            loop {
                let page = match self.store.list_page(prefix, token.take()).await {
                    Ok(page) => page,
                    Err(error) => {
                        warn!(prefix, %error, "failed to list objects, skipping prefix");
                        report.errors += 1;
                        break;
                    }
                };

                for object in &page.objects {
                    if object.last_modified >= cutoff {
                        continue;
                    }

                    match self.store.delete_object(&object.key).await {
                        Ok(()) => {
                            debug!(key = %object.key, last_modified = %object.last_modified,
                                "deleted expired object");
                            report.deleted += 1;
                        }
                        Err(error) => {
                            warn!(key = %object.key, %error, "failed to delete expired object");
                            report.errors += 1;
                        }
                    }
                }

                token = page.next_token;
                if token.is_none() {
                    break;
                }
            }
        }

        info!(
            deleted = report.deleted,
            errors = report.errors,
            "retention sweep finished"
        );
        report
    }
}

/// Production backend over aws-sdk-s3 pointed at the configured
/// S3-compatible endpoint.
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(cfg: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            cfg.access_key_id.clone(),
            cfg.secret_access_key.clone(),
            None,
            None,
            "static",
        );

        // R2 endpoints are derivable from the account id when not given
        let endpoint = if cfg.endpoint.is_empty() {
            format!("https://{}.r2.cloudflarestorage.com", cfg.account_id)
        } else {
            cfg.endpoint.clone()
        };

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: cfg.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_file(&self, local: &Path, key: &str) -> Result<(), ApiError> {
        let body = ByteStream::from_path(local).await.map_err(|error| {
            ApiError::upload_failed("Could not read local file for upload", error.to_string())
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|error| {
                ApiError::upload_failed("Failed to upload object to storage", error.to_string())
            })?;

        Ok(())
    }

    async fn download_object(&self, key: &str, dest: &Path) -> Result<(), ApiError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| {
                ApiError::internal(format!("failed to get object from storage: {error}"))
            })?;

        let bytes = object.body.collect().await.map_err(|error| {
            ApiError::internal(format!("failed to read object body: {error}"))
        })?;

        tokio::fs::write(dest, bytes.into_bytes()).await.map_err(|error| {
            ApiError::internal(format!("failed to write local file: {error}"))
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), ApiError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| {
                ApiError::internal(format!("failed to delete object: {error}"))
            })?;

        Ok(())
    }

    async fn list_page(&self, prefix: &str, token: Option<String>) -> Result<ObjectPage, ApiError> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|error| {
                ApiError::internal(format!("failed to list objects: {error}"))
            })?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?.to_string();
                let last_modified = object
                    .last_modified()
                    .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos()))
                    .unwrap_or_else(Utc::now);
                Some(StoredObject { key, last_modified })
            })
            .collect();

        Ok(ObjectPage {
            objects,
            next_token: response.next_continuation_token().map(str::to_string),
        })
    }
}
