//! S3 object-storage client.
//!
//! Wraps the AWS SDK S3 client with the two provisioning operations the
//! rest of the system needs: bucket creation (duplicate-tolerant) and
//! encrypted file upload. Failures are reduced to the shared
//! [`ErrorKind`](lakewire_core::ErrorKind) taxonomy.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, ServerSideEncryption,
};
use tracing::{debug, info};

use lakewire_core::{AwsConfig, Config, ErrorKind, RemoteError};

use crate::error::StorageError;

/// KMS key alias used for server-side encryption of uploads.
const SSE_KMS_KEY_ALIAS: &str = "alias/aws/s3";

/// Outcome of a bucket-creation attempt.
///
/// A second creation of the same name is not an error: the provider's
/// already-owned / already-exists responses map to `AlreadyExists`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOutcome {
    Created,
    AlreadyExists,
}

/// Receipt for a completed upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub bucket: String,
    pub key: String,
    /// ETag reported by S3, quotes stripped.
    pub etag: Option<String>,
}

/// Client for S3 bucket and object operations.
pub struct StorageClient {
    client: aws_sdk_s3::Client,
    region: String,
}

impl StorageClient {
    /// Create a client for the session described by `config`.
    ///
    /// Static credentials from the config take precedence; otherwise the
    /// ambient provider chain (env, profile, IMDS) is used.
    pub async fn new(config: &Config) -> Self {
        let sdk_config = sdk_config(&config.aws).await;
        info!(region = %config.aws.region, "StorageClient initialised");
        Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            region: config.aws.region.clone(),
        }
    }

    /// Create a storage bucket.
    ///
    /// Returns [`BucketOutcome::AlreadyExists`] when the provider reports
    /// the bucket as already present (owned by us or anyone else); every
    /// other failure surfaces as a typed error.
    pub async fn create_bucket(&self, name: &str) -> Result<BucketOutcome, StorageError> {
        validate_bucket_name(name)?;

        let mut request = self.client.create_bucket().bucket(name);

        // us-east-1 is the one region where a location constraint is rejected.
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(bucket = %name, "bucket created");
                Ok(BucketOutcome::Created)
            }
            Err(err) => match err.as_service_error() {
                Some(e) if is_already_exists(e) => {
                    info!(bucket = %name, "bucket already exists");
                    Ok(BucketOutcome::AlreadyExists)
                }
                Some(e) => Err(RemoteError::from_parts(e.code(), e.message()).into()),
                None => Err(RemoteError::network(format!("{}", DisplayErrorContext(&err))).into()),
            },
        }
    }

    /// Upload a local file to `bucket` under `key`, encrypted server-side
    /// with the provider-managed KMS key.
    ///
    /// A missing local file fails with [`StorageError::FileNotFound`]
    /// before any network call. Rejected credentials fail with
    /// [`StorageError::CredentialsUnavailable`].
    pub async fn upload_file(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<UploadReceipt, StorageError> {
        if !local_path.is_file() {
            return Err(StorageError::FileNotFound(local_path.to_path_buf()));
        }

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;

        debug!(path = %local_path.display(), bucket = %bucket, key = %key, "uploading");

        let response = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .server_side_encryption(ServerSideEncryption::AwsKms)
            .ssekms_key_id(SSE_KMS_KEY_ALIAS)
            .send()
            .await;

        match response {
            Ok(out) => {
                info!(bucket = %bucket, key = %key, "upload complete");
                Ok(UploadReceipt {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    etag: out.e_tag().map(|t| t.trim_matches('"').to_string()),
                })
            }
            Err(err) => Err(match err.as_service_error() {
                Some(e) => categorize_upload_failure(
                    e.code(),
                    e.message().unwrap_or("put object failed"),
                ),
                None => {
                    categorize_upload_failure(None, &format!("{}", DisplayErrorContext(&err)))
                }
            }),
        }
    }
}

/// Build the shared SDK config for the session.
async fn sdk_config(aws: &AwsConfig) -> aws_config::SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));

    if let (Some(key), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key.clone(),
            secret.clone(),
            aws.session_token.clone(),
            None,
            "lakewire-static",
        ));
    }

    if let Some(endpoint) = &aws.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}

/// Both already-owned and already-exists responses count as the bucket
/// being present; the distinction does not matter to provisioning.
fn is_already_exists(
    err: &aws_sdk_s3::operation::create_bucket::CreateBucketError,
) -> bool {
    err.is_bucket_already_owned_by_you() || err.is_bucket_already_exists()
}

/// Reduce an upload failure to the storage taxonomy.
///
/// Auth rejections and unresolved credentials both surface as
/// `CredentialsUnavailable`; everything else keeps its remote category.
fn categorize_upload_failure(code: Option<&str>, message: &str) -> StorageError {
    if code.is_none() && message.to_ascii_lowercase().contains("credential") {
        return StorageError::CredentialsUnavailable;
    }

    let remote = RemoteError::from_parts(code, Some(message));
    if remote.kind == ErrorKind::Unauthorized {
        return StorageError::CredentialsUnavailable;
    }

    StorageError::Remote(remote)
}

/// Light local check against the S3 naming rules.
fn validate_bucket_name(name: &str) -> Result<(), StorageError> {
    let valid_len = (3..=63).contains(&name.len());
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = name
        .chars()
        .next()
        .zip(name.chars().last())
        .map(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric())
        .unwrap_or(false);

    if valid_len && valid_chars && valid_edges {
        Ok(())
    } else {
        Err(StorageError::InvalidBucketName(name.to_string()))
    }
}
