//! The S3 client capability and its AWS SDK implementation
//!
//! Services depend on [`ObjectStoreClient`], never on SDK types, so the
//! whole orchestration layer can run against an in-memory fake in tests.
//! [`AwsClient`] is the production implementation over `aws-sdk-s3`,
//! bound to one endpoint/credential/region triple from a vault profile.

use crate::blob::StreamingBlob;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::RequestId;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use aws_smithy_types::body::SdkBody;
use aws_smithy_types::date_time::Format;
use bytes::Bytes;
use s3browser_common::types::{
    BatchItemError, BucketSummary, DeleteTarget, EncryptionInfo, LifecycleRule,
    LifecycleTransition, VersioningInfo,
};
use s3browser_common::{Error, Result};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Parameters an S3 client is materialized from. The secret comes from
/// the vault and is dropped once the SDK config owns it.
#[derive(Clone)]
pub struct ClientParams {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl std::fmt::Debug for ClientParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientParams")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// One page request against `ListObjectsV2`.
#[derive(Clone, Debug)]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: i32,
}

/// A raw object row from a list page.
#[derive(Clone, Debug)]
pub struct RawObject {
    pub key: String,
    pub size: Option<u64>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// One page of `ListObjectsV2` output.
#[derive(Clone, Debug, Default)]
pub struct ObjectPage {
    pub objects: Vec<RawObject>,
    pub common_prefixes: Vec<String>,
    pub next_continuation_token: Option<String>,
    pub is_truncated: bool,
}

/// Continuation marker for version listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionToken {
    pub key_marker: String,
    pub version_id_marker: Option<String>,
}

/// One page request against `ListObjectVersions`.
#[derive(Clone, Debug)]
pub struct ListVersionsRequest {
    pub bucket: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub token: Option<VersionToken>,
    pub max_keys: i32,
}

/// A raw version or delete-marker row.
#[derive(Clone, Debug)]
pub struct RawVersion {
    pub key: String,
    pub version_id: Option<String>,
    pub is_latest: bool,
    pub is_delete_marker: bool,
    pub size: Option<u64>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// One page of `ListObjectVersions` output.
#[derive(Clone, Debug, Default)]
pub struct VersionPage {
    pub versions: Vec<RawVersion>,
    pub common_prefixes: Vec<String>,
    pub next_token: Option<VersionToken>,
    pub is_truncated: bool,
}

/// Head-object output.
#[derive(Clone, Debug, Default)]
pub struct HeadOutput {
    pub content_type: Option<String>,
    pub size: u64,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub server_side_encryption: Option<String>,
    pub sse_kms_key_id: Option<String>,
    pub storage_class: Option<String>,
    pub user_metadata: Option<std::collections::HashMap<String, String>>,
}

/// A fetched object: metadata plus a streaming body.
#[derive(Debug)]
pub struct FetchedObject {
    pub content_type: Option<String>,
    pub content_length: u64,
    pub body: StreamingBlob,
}

/// Per-request outcome of one `DeleteObjects` call.
#[derive(Clone, Debug, Default)]
pub struct DeleteObjectsOutcome {
    pub deleted: Vec<DeleteTarget>,
    pub errors: Vec<BatchItemError>,
}

/// A part reference passed to `CompleteMultipartUpload`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedPartSpec {
    pub part_number: i32,
    pub etag: String,
}

/// The capability the orchestration services consume. One instance is
/// bound to a single endpoint, credential and region.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync + std::fmt::Debug {
    async fn list_objects_v2(&self, req: ListObjectsRequest) -> Result<ObjectPage>;
    async fn list_object_versions(&self, req: ListVersionsRequest) -> Result<VersionPage>;
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<HeadOutput>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<FetchedObject>;
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        body: StreamingBlob,
    ) -> Result<()>;
    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<()>;
    async fn delete_objects(
        &self,
        bucket: &str,
        targets: &[DeleteTarget],
    ) -> Result<DeleteObjectsOutcome>;
    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
        version_id: Option<&str>,
    ) -> Result<()>;
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String>;
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: StreamingBlob,
    ) -> Result<String>;
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartSpec],
    ) -> Result<()>;
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()>;
    async fn presign_get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        ttl: Duration,
    ) -> Result<String>;
    async fn get_bucket_location(&self, bucket: &str) -> Result<String>;
    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningInfo>;
    async fn get_bucket_encryption(&self, bucket: &str) -> Result<Option<EncryptionInfo>>;
    async fn get_bucket_lifecycle_configuration(
        &self,
        bucket: &str,
    ) -> Result<Vec<LifecycleRule>>;
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>>;
}

/// Production client over the AWS SDK.
#[derive(Clone, Debug)]
pub struct AwsClient {
    client: aws_sdk_s3::Client,
}

impl AwsClient {
    /// Build a client bound to the given endpoint, credentials and
    /// region. Non-AWS endpoints get path-style addressing, which MinIO,
    /// Backblaze and most self-hosted stores expect.
    #[must_use]
    pub fn new(params: &ClientParams) -> Self {
        let credentials = Credentials::new(
            &params.access_key_id,
            &params.secret_access_key,
            None,
            None,
            "s3browser-vault",
        );
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(params.region.clone()))
            .credentials_provider(credentials);
        if !params.endpoint.contains("amazonaws.com") {
            builder = builder
                .endpoint_url(&params.endpoint)
                .force_path_style(true);
        }
        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }
}

/// Convert a proxied body into an SDK byte stream without collecting it.
fn to_byte_stream(blob: StreamingBlob) -> ByteStream {
    use futures::StreamExt;
    let frames = blob.map(|chunk| chunk.map(http_body::Frame::data));
    ByteStream::new(SdkBody::from_body_1_x(http_body_util::StreamBody::new(
        frames,
    )))
}

fn format_time(time: Option<&aws_smithy_types::DateTime>) -> Option<String> {
    time.and_then(|t| t.fmt(Format::DateTime).ok())
}

/// Map an SDK failure onto the common taxonomy, keeping the store's
/// error code and request id when present.
fn map_sdk_err<E>(err: &SdkError<E>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err {
        SdkError::TimeoutError(_) => return Error::Timeout,
        SdkError::DispatchFailure(failure) if failure.is_timeout() => return Error::Timeout,
        _ => {}
    }
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map_or_else(|| err.to_string(), str::to_string);
    if matches!(code.as_deref(), Some("NoSuchKey" | "NoSuchBucket" | "NotFound")) {
        return Error::not_found(message);
    }
    Error::S3 {
        code,
        message,
        request_id: err.request_id().map(str::to_string),
    }
}

#[async_trait]
impl ObjectStoreClient for AwsClient {
    async fn list_objects_v2(&self, req: ListObjectsRequest) -> Result<ObjectPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&req.bucket)
            .max_keys(req.max_keys)
            .set_continuation_token(req.continuation_token)
            .set_delimiter(req.delimiter);
        if !req.prefix.is_empty() {
            request = request.prefix(&req.prefix);
        }
        let output = request.send().await.map_err(|e| map_sdk_err(&e))?;
        Ok(ObjectPage {
            objects: output
                .contents()
                .iter()
                .map(|obj| RawObject {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().and_then(|s| u64::try_from(s).ok()),
                    last_modified: format_time(obj.last_modified()),
                    etag: obj.e_tag().map(str::to_string),
                })
                .collect(),
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|cp| cp.prefix().map(str::to_string))
                .collect(),
            next_continuation_token: output.next_continuation_token().map(str::to_string),
            is_truncated: output.is_truncated().unwrap_or(false),
        })
    }

    async fn list_object_versions(&self, req: ListVersionsRequest) -> Result<VersionPage> {
        let mut request = self
            .client
            .list_object_versions()
            .bucket(&req.bucket)
            .max_keys(req.max_keys)
            .set_delimiter(req.delimiter);
        if !req.prefix.is_empty() {
            request = request.prefix(&req.prefix);
        }
        if let Some(token) = req.token {
            request = request
                .key_marker(token.key_marker)
                .set_version_id_marker(token.version_id_marker);
        }
        let output = request.send().await.map_err(|e| map_sdk_err(&e))?;

        let mut rows: Vec<RawVersion> = output
            .versions()
            .iter()
            .map(|v| RawVersion {
                key: v.key().unwrap_or_default().to_string(),
                version_id: v.version_id().map(str::to_string),
                is_latest: v.is_latest().unwrap_or(false),
                is_delete_marker: false,
                size: v.size().and_then(|s| u64::try_from(s).ok()),
                last_modified: format_time(v.last_modified()),
                etag: v.e_tag().map(str::to_string),
            })
            .collect();
        rows.extend(output.delete_markers().iter().map(|m| RawVersion {
            key: m.key().unwrap_or_default().to_string(),
            version_id: m.version_id().map(str::to_string),
            is_latest: m.is_latest().unwrap_or(false),
            is_delete_marker: true,
            size: None,
            last_modified: format_time(m.last_modified()),
            etag: None,
        }));
        // Versions and markers arrive in separate lists; restore one
        // key-ordered sequence with the latest entry of each key first.
        rows.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| b.is_latest.cmp(&a.is_latest))
                .then_with(|| b.last_modified.cmp(&a.last_modified))
        });

        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_key_marker().map(|key_marker| VersionToken {
                key_marker: key_marker.to_string(),
                version_id_marker: output.next_version_id_marker().map(str::to_string),
            })
        } else {
            None
        };
        Ok(VersionPage {
            versions: rows,
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|cp| cp.prefix().map(str::to_string))
                .collect(),
            is_truncated: next_token.is_some(),
            next_token,
        })
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<HeadOutput> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(str::to_string))
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err) if service_err.err().is_not_found() => {
                    Error::not_found(format!("object {key:?} does not exist"))
                }
                _ => map_sdk_err(&e),
            })?;
        Ok(HeadOutput {
            content_type: output.content_type().map(str::to_string),
            size: output
                .content_length()
                .and_then(|s| u64::try_from(s).ok())
                .unwrap_or(0),
            last_modified: format_time(output.last_modified()),
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
            server_side_encryption: output
                .server_side_encryption()
                .map(|sse| sse.as_str().to_string()),
            sse_kms_key_id: output.ssekms_key_id().map(str::to_string),
            storage_class: output.storage_class().map(|sc| sc.as_str().to_string()),
            user_metadata: output.metadata().cloned(),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<FetchedObject> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        let content_type = output.content_type().map(str::to_string);
        let content_length = output
            .content_length()
            .and_then(|s| u64::try_from(s).ok())
            .unwrap_or(0);
        let mut body = output.body;
        let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(crate::blob::CHANNEL_CAPACITY);
        tokio::spawn(async move {
            loop {
                match body.try_next().await {
                    Ok(Some(chunk)) => {
                        if tx.send(Ok(chunk)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(io::Error::other(e))).await;
                        break;
                    }
                }
            }
        });
        Ok(FetchedObject {
            content_type,
            content_length,
            body: StreamingBlob::from_channel(rx, content_length),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        body: StreamingBlob,
    ) -> Result<()> {
        let len = body.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .content_length(i64::try_from(len).unwrap_or(i64::MAX))
            .body(to_byte_stream(body))
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        Ok(())
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        targets: &[DeleteTarget],
    ) -> Result<DeleteObjectsOutcome> {
        let identifiers = targets
            .iter()
            .map(|t| {
                ObjectIdentifier::builder()
                    .key(&t.key)
                    .set_version_id(t.version_id.clone())
                    .build()
                    .map_err(|e| Error::internal(format!("bad delete target: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(false)
            .build()
            .map_err(|e| Error::internal(format!("bad delete request: {e}")))?;
        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        Ok(DeleteObjectsOutcome {
            deleted: output
                .deleted()
                .iter()
                .filter_map(|d| {
                    d.key().map(|key| DeleteTarget {
                        key: key.to_string(),
                        version_id: d.version_id().map(str::to_string),
                    })
                })
                .collect(),
            errors: output
                .errors()
                .iter()
                .map(|e| BatchItemError {
                    key: e.key().unwrap_or_default().to_string(),
                    message: e
                        .message()
                        .or(e.code())
                        .unwrap_or("delete failed")
                        .to_string(),
                })
                .collect(),
        })
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
        version_id: Option<&str>,
    ) -> Result<()> {
        let copy_source = match version_id {
            Some(version) => format!("{bucket}/{source_key}?versionId={version}"),
            None => format!("{bucket}/{source_key}"),
        };
        self.client
            .copy_object()
            .bucket(bucket)
            .key(destination_key)
            .copy_source(copy_source)
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::s3("store returned no upload id"))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: StreamingBlob,
    ) -> Result<String> {
        let len = body.len();
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(i64::try_from(len).unwrap_or(i64::MAX))
            .body(to_byte_stream(body))
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| Error::s3("store returned no part etag"))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartSpec],
    ) -> Result<()> {
        let completed = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect::<Vec<_>>();
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            // Aborting an already-aborted upload is a no-op.
            Err(e) if e.code() == Some("NoSuchUpload") => Ok(()),
            Err(e) => Err(map_sdk_err(&e)),
        }
    }

    async fn presign_get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        ttl: Duration,
    ) -> Result<String> {
        let config = PresigningConfig::expires_in(ttl)
            .map_err(|e| Error::invalid_input(format!("invalid presign ttl: {e}")))?;
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(str::to_string))
            .presigned(config)
            .await
            .map_err(|e| map_sdk_err(&e))?;
        Ok(presigned.uri().to_string())
    }

    async fn get_bucket_location(&self, bucket: &str) -> Result<String> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        let region = output
            .location_constraint()
            .map(|lc| lc.as_str().to_string())
            .unwrap_or_default();
        Ok(normalize_region(&region))
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningInfo> {
        let output = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        Ok(VersioningInfo {
            status: output
                .status()
                .map_or_else(|| "Disabled".to_string(), |s| s.as_str().to_string()),
            mfa_delete: output.mfa_delete().map(|m| m.as_str().to_string()),
        })
    }

    async fn get_bucket_encryption(&self, bucket: &str) -> Result<Option<EncryptionInfo>> {
        let result = self
            .client
            .get_bucket_encryption()
            .bucket(bucket)
            .send()
            .await;
        let output = match result {
            Ok(output) => output,
            // Buckets without a default-encryption config are normal.
            Err(e) if e.code() == Some("ServerSideEncryptionConfigurationNotFoundError") => {
                return Ok(None);
            }
            Err(e) => return Err(map_sdk_err(&e)),
        };
        let info = output
            .server_side_encryption_configuration()
            .and_then(|config| config.rules().first())
            .and_then(|rule| rule.apply_server_side_encryption_by_default())
            .map(|default| EncryptionInfo {
                algorithm: Some(default.sse_algorithm().as_str().to_string()),
                kms_key_id: default.kms_master_key_id().map(str::to_string),
            });
        Ok(info)
    }

    async fn get_bucket_lifecycle_configuration(
        &self,
        bucket: &str,
    ) -> Result<Vec<LifecycleRule>> {
        let result = self
            .client
            .get_bucket_lifecycle_configuration()
            .bucket(bucket)
            .send()
            .await;
        let output = match result {
            Ok(output) => output,
            Err(e) if e.code() == Some("NoSuchLifecycleConfiguration") => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(map_sdk_err(&e)),
        };
        Ok(output.rules().iter().map(map_lifecycle_rule).collect())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| map_sdk_err(&e))?;
        Ok(output
            .buckets()
            .iter()
            .map(|bucket| BucketSummary {
                name: bucket.name().unwrap_or_default().to_string(),
                creation_date: format_time(bucket.creation_date()),
            })
            .collect())
    }
}

/// Binds a client to a request's cancellation token. Every call races
/// the signal, so a fired token aborts the in-flight store call with
/// `Cancelled` instead of merely skipping the next loop iteration.
pub struct CancellableClient {
    inner: Arc<dyn ObjectStoreClient>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for CancellableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableClient")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl CancellableClient {
    #[must_use]
    pub fn new(inner: Arc<dyn ObjectStoreClient>, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }

    async fn race<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            result = call => result,
        }
    }
}

#[async_trait]
impl ObjectStoreClient for CancellableClient {
    async fn list_objects_v2(&self, req: ListObjectsRequest) -> Result<ObjectPage> {
        self.race(self.inner.list_objects_v2(req)).await
    }

    async fn list_object_versions(&self, req: ListVersionsRequest) -> Result<VersionPage> {
        self.race(self.inner.list_object_versions(req)).await
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<HeadOutput> {
        self.race(self.inner.head_object(bucket, key, version_id)).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<FetchedObject> {
        self.race(self.inner.get_object(bucket, key)).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        body: StreamingBlob,
    ) -> Result<()> {
        self.race(self.inner.put_object(bucket, key, content_type, body))
            .await
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<()> {
        self.race(self.inner.delete_object(bucket, key, version_id))
            .await
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        targets: &[DeleteTarget],
    ) -> Result<DeleteObjectsOutcome> {
        self.race(self.inner.delete_objects(bucket, targets)).await
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
        version_id: Option<&str>,
    ) -> Result<()> {
        self.race(
            self.inner
                .copy_object(bucket, source_key, destination_key, version_id),
        )
        .await
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String> {
        self.race(self.inner.create_multipart_upload(bucket, key, content_type))
            .await
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: StreamingBlob,
    ) -> Result<String> {
        self.race(
            self.inner
                .upload_part(bucket, key, upload_id, part_number, body),
        )
        .await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartSpec],
    ) -> Result<()> {
        self.race(
            self.inner
                .complete_multipart_upload(bucket, key, upload_id, parts),
        )
        .await
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.race(self.inner.abort_multipart_upload(bucket, key, upload_id))
            .await
    }

    async fn presign_get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        ttl: Duration,
    ) -> Result<String> {
        self.race(self.inner.presign_get_object(bucket, key, version_id, ttl))
            .await
    }

    async fn get_bucket_location(&self, bucket: &str) -> Result<String> {
        self.race(self.inner.get_bucket_location(bucket)).await
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningInfo> {
        self.race(self.inner.get_bucket_versioning(bucket)).await
    }

    async fn get_bucket_encryption(&self, bucket: &str) -> Result<Option<EncryptionInfo>> {
        self.race(self.inner.get_bucket_encryption(bucket)).await
    }

    async fn get_bucket_lifecycle_configuration(
        &self,
        bucket: &str,
    ) -> Result<Vec<LifecycleRule>> {
        self.race(self.inner.get_bucket_lifecycle_configuration(bucket))
            .await
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        self.race(self.inner.list_buckets()).await
    }
}

#[allow(deprecated)] // rule.prefix() is the portable accessor across stores
fn map_lifecycle_rule(rule: &aws_sdk_s3::types::LifecycleRule) -> LifecycleRule {
    LifecycleRule {
        id: rule.id().map(str::to_string),
        status: rule.status().as_str().to_string(),
        prefix: rule
            .prefix()
            .map(str::to_string)
            .or_else(|| {
                rule.filter()
                    .and_then(|f| f.prefix())
                    .map(str::to_string)
            }),
        expiration_days: rule.expiration().and_then(|e| e.days()),
        transitions: {
            let transitions: Vec<LifecycleTransition> = rule
                .transitions()
                .iter()
                .map(|t| LifecycleTransition {
                    days: t.days(),
                    storage_class: t.storage_class().map(|sc| sc.as_str().to_string()),
                })
                .collect();
            if transitions.is_empty() {
                None
            } else {
                Some(transitions)
            }
        },
        noncurrent_version_expiration_days: rule
            .noncurrent_version_expiration()
            .and_then(|n| n.noncurrent_days()),
        abort_incomplete_multipart_days: rule
            .abort_incomplete_multipart_upload()
            .and_then(|a| a.days_after_initiation()),
    }
}

/// Normalize a `LocationConstraint` value: the classic region comes back
/// as an empty string and very old buckets report `EU`.
#[must_use]
pub fn normalize_region(raw: &str) -> String {
    match raw {
        "" => "us-east-1".to_string(),
        "EU" => "eu-west-1".to_string(),
        other => other.to_string(),
    }
}
