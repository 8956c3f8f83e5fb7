use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Every attachment object lives under this prefix.
pub const ATTACHMENT_PREFIX: &str = "attachments/";

// Presigned URLs are valid for 10 minutes.
const PRESIGN_TTL: Duration = Duration::from_secs(600);

/// StorageService
///
/// Opaque blob store for request attachments, keyed by object path. Implemented by the
/// real S3 client and by an in-memory mock for tests.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in `Env::Local` to provision MinIO.
    async fn ensure_bucket_exists(&self);

    /// Temporary URL allowing a client to PUT `key` directly, constrained to `content_type`.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String>;

    /// Temporary URL allowing a client to GET `key`.
    async fn get_presigned_download_url(&self, key: &str) -> Result<String, String>;

    async fn delete_object(&self, key: &str) -> Result<(), String>;
}

/// S3StorageClient
///
/// AWS SDK client. Path-style addressing is forced because MinIO and the Supabase
/// Storage gateway both require it.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }

    fn presigning() -> Result<PresigningConfig, String> {
        PresigningConfig::expires_in(PRESIGN_TTL).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket fails harmlessly when the bucket is already there.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!("create_bucket: {:?}", e);
        }
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String> {
        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .presigned(Self::presigning()?)
            .await
            .map_err(|e| e.to_string())?;

        Ok(presigned_req.uri().to_string())
    }

    async fn get_presigned_download_url(&self, key: &str) -> Result<String, String> {
        let presigned_req = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .presigned(Self::presigning()?)
            .await
            .map_err(|e| e.to_string())?;

        Ok(presigned_req.uri().to_string())
    }

    async fn delete_object(&self, key: &str) -> Result<(), String> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// sanitize_key
///
/// Removes empty, `.` and `..` segments so a client-supplied key cannot traverse paths.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// attachment_key
///
/// Accepts a client-supplied key only if it is already canonical and under
/// `ATTACHMENT_PREFIX`.
pub fn attachment_key(key: &str) -> Option<String> {
    let sanitized = sanitize_key(key);
    let is_canonical = sanitized == key;
    let has_object = sanitized.len() > ATTACHMENT_PREFIX.len();
    (is_canonical && has_object && sanitized.starts_with(ATTACHMENT_PREFIX)).then_some(sanitized)
}

/// MockStorageService
///
/// In-memory `StorageService` for tests. Deleted keys are recorded for assertions.
#[derive(Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    pub deleted: Mutex<Vec<String>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    fn fail_if_requested(&self) -> Result<(), String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, String> {
        self.fail_if_requested()?;
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }

    async fn get_presigned_download_url(&self, key: &str) -> Result<String, String> {
        self.fail_if_requested()?;
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake-get",
            sanitize_key(key)
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<(), String> {
        self.fail_if_requested()?;
        self.deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sanitize_key(key));
        Ok(())
    }
}

/// StorageState
///
/// The type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
