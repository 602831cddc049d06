use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Largest attachment accepted on a ticket (25 MiB).
pub const MAX_ATTACHMENT_BYTES: i64 = 25 * 1024 * 1024;

/// UploadRejection
///
/// Why an attachment upload slot was refused before anything was signed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("attachment is empty")]
    Empty,
    #[error("attachment exceeds the 25 MiB limit")]
    TooLarge,
    #[error("attachment needs a filename and content type")]
    MissingMetadata,
}

/// StorageService
///
/// Contract for the object store holding ticket attachments. The S3 client backs it in
/// production (MinIO locally, Supabase Storage in prod); the mock backs it in tests.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if needed. Only called for `Env::Local`.
    async fn ensure_bucket_exists(&self);

    /// A short-lived signed URL the browser can PUT the file to directly.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String>;
}

/// S3StorageClient
///
/// `force_path_style(true)` is required by both MinIO and the Supabase Storage gateway.
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
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket on an existing bucket fails harmlessly.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, "create_bucket: {:?}", e);
        }
    }

    /// get_presigned_upload_url
    ///
    /// Valid for 10 minutes and pinned to the declared content type.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String> {
        let presigning =
            PresigningConfig::expires_in(Duration::from_secs(600)).map_err(|e| e.to_string())?;

        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| e.to_string())?;

        Ok(presigned_req.uri().to_string())
    }
}

/// Checks the declared size and metadata of an attachment before a slot is issued.
pub fn validate_upload(
    filename: &str,
    content_type: &str,
    size_bytes: i64,
) -> Result<(), UploadRejection> {
    if filename.trim().is_empty() || content_type.trim().is_empty() {
        return Err(UploadRejection::MissingMetadata);
    }
    if size_bytes <= 0 {
        return Err(UploadRejection::Empty);
    }
    if size_bytes > MAX_ATTACHMENT_BYTES {
        return Err(UploadRejection::TooLarge);
    }
    Ok(())
}

/// attachment_key
///
/// `tickets/<ticket>/<uuid>.<ext>`. Only the extension of the client filename survives, and
/// only if it is plain alphanumeric.
pub fn attachment_key(ticket_id: Uuid, filename: &str) -> String {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin")
        .to_ascii_lowercase();
    format!("tickets/{}/{}.{}", ticket_id, Uuid::new_v4(), extension)
}

/// Removes empty, `.` and `..` segments from an object key.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// Deterministic, offline `StorageService` for handler tests.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, every presign call fails.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
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
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }

        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }
}

pub type StorageState = Arc<dyn StorageService>;
