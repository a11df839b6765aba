//! Object storage client
//!
//! Objects live under `users/{subject}{inode_path}` in a single bucket. A
//! store is built from the credentials current at the time of each
//! operation, so credentials re-derived after a token refresh are picked up
//! immediately.

use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use insight_core::config::StorageConfig;
use insight_core::domain::{ClientError, StorageCredentials};
use insight_core::ports::IObjectStorage;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, TagSet};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Content type of every stored document
pub const CONTENT_TYPE: &str = "application/pdf";

/// Region used when none is configured; MinIO ignores it
const DEFAULT_REGION: &str = "us-east-1";

/// Credentials together with the identity they are scoped to
#[derive(Debug, Clone)]
pub struct StorageSession {
    pub subject: String,
    pub credentials: StorageCredentials,
}

/// Supplies storage credentials for the current session
#[async_trait::async_trait]
pub trait StorageSessionSource: Send + Sync {
    async fn storage_session(&self) -> Result<StorageSession, ClientError>;
}

/// Builds an object store for a set of credentials
pub trait StoreFactory: Send + Sync {
    fn build(&self, credentials: &StorageCredentials) -> Result<Arc<dyn ObjectStore>, ClientError>;
}

/// S3-compatible store (AWS or MinIO) with path-style addressing
#[derive(Debug, Clone)]
pub struct S3StoreFactory {
    endpoint: String,
    bucket: String,
    region: Option<String>,
}

impl S3StoreFactory {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            region: None,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            region: config.region.clone(),
            ..Self::new(config.endpoint.clone(), config.bucket.clone())
        }
    }
}

impl StoreFactory for S3StoreFactory {
    fn build(&self, credentials: &StorageCredentials) -> Result<Arc<dyn ObjectStore>, ClientError> {
        let store = AmazonS3Builder::new()
            .with_endpoint(&self.endpoint)
            .with_allow_http(self.endpoint.starts_with("http://"))
            .with_bucket_name(&self.bucket)
            .with_region(self.region.as_deref().unwrap_or(DEFAULT_REGION))
            .with_access_key_id(&credentials.access_key)
            .with_secret_access_key(&credentials.secret_key)
            .with_token(&credentials.session_token)
            .build()
            .map_err(|e| ClientError::Storage(format!("invalid object store settings: {e}")))?;
        Ok(Arc::new(store))
    }
}

/// Owner-scoped object key for an inode path
///
/// The key is taken verbatim: names are not percent-encoded, so the key is
/// the one other clients of the bucket compute for the same inode.
pub fn object_key(subject: &str, inode_path: &str) -> Result<ObjectPath, ClientError> {
    ObjectPath::parse(format!("users/{subject}{inode_path}"))
        .map_err(|e| ClientError::Storage(format!("invalid object key: {e}")))
}

/// Rejections are permanent; everything else may succeed on a later attempt
fn storage_error(context: &str, err: object_store::Error) -> ClientError {
    match err {
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. }
        | object_store::Error::InvalidPath { .. }
        | object_store::Error::NotSupported { .. }
        | object_store::Error::NotImplemented
        | object_store::Error::AlreadyExists { .. }
        | object_store::Error::Precondition { .. }
        | object_store::Error::UnknownConfigurationKey { .. } => {
            ClientError::Storage(format!("{context}: {err}"))
        }
        other => ClientError::StorageUnavailable(format!("{context}: {other}")),
    }
}

/// Failures surfaced by the buffered writer carry the store error inside
fn write_error(context: &str, err: std::io::Error) -> ClientError {
    let message = err.to_string();
    match err.into_inner().map(|inner| inner.downcast::<object_store::Error>()) {
        Some(Ok(store_err)) => storage_error(context, *store_err),
        _ => ClientError::StorageUnavailable(format!("{context}: {message}")),
    }
}

/// Streams file contents to and from object storage
#[derive(Clone)]
pub struct ObjectStorageClient {
    sessions: Arc<dyn StorageSessionSource>,
    factory: Arc<dyn StoreFactory>,
}

impl ObjectStorageClient {
    pub fn new(sessions: Arc<dyn StorageSessionSource>, factory: Arc<dyn StoreFactory>) -> Self {
        Self { sessions, factory }
    }

    async fn open(&self, inode_path: &str) -> Result<(Arc<dyn ObjectStore>, ObjectPath), ClientError> {
        let session = self.sessions.storage_session().await?;
        let store = self.factory.build(&session.credentials)?;
        let key = object_key(&session.subject, inode_path)?;
        Ok((store, key))
    }
}

#[async_trait::async_trait]
impl IObjectStorage for ObjectStorageClient {
    async fn upload(
        &self,
        inode_path: &str,
        local: &Path,
        is_public: bool,
    ) -> Result<u64, ClientError> {
        let (store, key) = self.open(inode_path).await?;
        let mut file = tokio::fs::File::open(local).await?;

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, CONTENT_TYPE.into());
        let mut writer = BufWriter::new(store, key.clone()).with_attributes(attributes);
        if is_public {
            let mut tags = TagSet::default();
            tags.push("is_public", "true");
            writer = writer.with_tags(tags);
        }

        debug!(key = %key, local = %local.display(), "Uploading object");
        let bytes = match tokio::io::copy(&mut file, &mut writer).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    debug!(error = %abort, "Failed to abort upload");
                }
                return Err(write_error("upload failed", e));
            }
        };
        writer
            .shutdown()
            .await
            .map_err(|e| write_error("upload failed", e))?;

        info!(key = %key, bytes, is_public, "Uploaded object");
        Ok(bytes)
    }

    async fn download(&self, inode_path: &str, dest: &Path) -> Result<u64, ClientError> {
        let (store, key) = self.open(inode_path).await?;
        let result = store.get(&key).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => ClientError::NotFound(format!("object {key}")),
            other => storage_error("download failed", other),
        })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;

        let mut bytes = 0u64;
        let mut stream = result.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| storage_error("download failed", e))?;
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;

        info!(key = %key, dest = %dest.display(), bytes, "Downloaded object");
        Ok(bytes)
    }
}
