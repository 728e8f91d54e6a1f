//! Wire DTOs and shared limits for s3browser
//!
//! These are the JSON shapes the gateway returns to the browser and the
//! structs the services hand around. Field names follow the REST API's
//! camelCase convention.

use serde::{Deserialize, Serialize};

/// Fixed multipart part size: 10 MiB.
pub const PART_SIZE: u64 = 10 * 1024 * 1024;

/// Largest file accepted by the upload proxy: 5 GiB.
pub const MAX_UPLOAD_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Highest part number S3 accepts.
pub const MAX_PART_NUMBER: i32 = 10_000;

/// Page size used for every underlying list call.
pub const LIST_PAGE_SIZE: i32 = 5_000;

/// `DeleteObjects` count cap per request.
pub const MAX_BATCH_COUNT: usize = 1_000;

/// Serialized-body byte cap per delete batch, a safety margin under the
/// S3 request-body limit.
pub const MAX_BATCH_BYTES: usize = 90_000;

/// Presign TTL bounds in seconds: one minute to seven days.
pub const MIN_PRESIGN_TTL_SECS: u64 = 60;
pub const MAX_PRESIGN_TTL_SECS: u64 = 604_800;

/// Default presign TTL for the download-url convenience endpoint.
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 3_600;

/// One entry in a listing window.
///
/// Folders collapse sub-prefixes: `is_folder == true` implies the key
/// ends with `/`, `name` is the last path segment without the trailing
/// slash, and size/modified/etag are absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Object {
    pub key: String,
    pub name: String,
    pub is_folder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_latest: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_delete_marker: Option<bool>,
}

impl S3Object {
    /// Build a folder entry from a common prefix such as `photos/2024/`.
    #[must_use]
    pub fn folder(prefix: &str) -> Self {
        let name = prefix
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            key: prefix.to_string(),
            name,
            is_folder: true,
            size: None,
            last_modified: None,
            etag: None,
            version_id: None,
            is_latest: None,
            is_delete_marker: None,
        }
    }

    /// Derive the display name for a file key (last path segment).
    #[must_use]
    pub fn file_name(key: &str) -> String {
        key.rsplit('/').next().unwrap_or(key).to_string()
    }
}

/// One window of a listing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListWindow {
    pub objects: Vec<S3Object>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    pub is_truncated: bool,
}

/// A connection profile as returned over the wire — never carries the
/// secret, in plaintext or otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: i64,
    pub profile_name: String,
    pub endpoint: String,
    pub access_key_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub auto_detect_region: bool,
    pub last_used_at: i64,
}

/// One bucket in the list-buckets response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
}

/// Bucket versioning state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersioningInfo {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_delete: Option<String>,
}

/// Default bucket encryption, when configured.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
}

/// One lifecycle rule, flattened to the fields the UI shows.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_days: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transitions: Option<Vec<LifecycleTransition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noncurrent_version_expiration_days: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_incomplete_multipart_days: Option<i32>,
}

/// A storage-class transition within a lifecycle rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleTransition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// Aggregate bucket information. Encryption lookup is best-effort: an
/// absent config is `encryption: null`, any other failure lands in
/// `encryption_error` without failing the whole call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub versioning: VersioningInfo,
    pub encryption: Option<EncryptionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_error: Option<String>,
    pub lifecycle_rules: Vec<LifecycleRule>,
}

/// Which flavor of store an endpoint points at, inferred from the
/// hostname and reported in object metadata only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Aws,
    B2,
    Other,
}

impl Vendor {
    /// Infer the vendor from an endpoint hostname.
    #[must_use]
    pub fn from_host(host: &str) -> Self {
        if host.ends_with("amazonaws.com") {
            Self::Aws
        } else if host.ends_with("backblazeb2.com") {
            Self::B2
        } else {
            Self::Other
        }
    }
}

/// Head-object metadata plus vendor detection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_side_encryption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sse_kms_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<std::collections::HashMap<String, String>>,
    pub vendor: Vendor,
}

/// One target of a (batch) delete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTarget {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// Aggregated batch-delete outcome across all request batches.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeleteOutcome {
    pub deleted: Vec<DeleteTarget>,
    pub errors: Vec<BatchItemError>,
}

/// Per-item failure in a batch operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub key: String,
    pub message: String,
}

/// One copy/move operation in a batch request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyOperation {
    pub source_key: String,
    pub destination_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// Aggregated batch copy/move outcome.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCopyOutcome {
    pub successful: Vec<String>,
    pub errors: Vec<BatchCopyError>,
}

/// Per-operation failure in a batch copy/move.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCopyError {
    pub source_key: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_entry_invariants() {
        let folder = S3Object::folder("photos/2024/");
        assert!(folder.is_folder);
        assert_eq!(folder.key, "photos/2024/");
        assert_eq!(folder.name, "2024");
        assert!(folder.size.is_none());
        assert!(folder.last_modified.is_none());
        assert!(folder.etag.is_none());
    }

    #[test]
    fn test_folder_entry_top_level() {
        let folder = S3Object::folder("docs/");
        assert_eq!(folder.name, "docs");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(S3Object::file_name("a/b/c.txt"), "c.txt");
        assert_eq!(S3Object::file_name("root.bin"), "root.bin");
    }

    #[test]
    fn test_vendor_from_host() {
        assert_eq!(Vendor::from_host("s3.us-east-1.amazonaws.com"), Vendor::Aws);
        assert_eq!(
            Vendor::from_host("s3.us-west-000.backblazeb2.com"),
            Vendor::B2
        );
        assert_eq!(Vendor::from_host("minio.internal"), Vendor::Other);
    }

    #[test]
    fn test_s3object_serializes_camel_case() {
        let folder = S3Object::folder("a/");
        let json = serde_json::to_value(&folder).unwrap();
        assert_eq!(json["isFolder"], true);
        assert!(json.get("lastModified").is_none());
    }

    #[test]
    fn test_connection_record_has_no_secret_field() {
        let record = ConnectionRecord {
            id: 1,
            profile_name: "aws-dev".to_string(),
            endpoint: "https://s3.amazonaws.com".to_string(),
            access_key_id: "AKIAEXAMPLE".to_string(),
            bucket: None,
            region: None,
            auto_detect_region: true,
            last_used_at: 0,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("secret"));
    }
}
