//! In-memory fake of the client capability for service tests
//!
//! Records every call so tests can assert on batching shapes, call
//! ordering and cache behavior. Multipart uploads are assembled the way
//! S3 assembles them: by the part list supplied at completion, in the
//! order given.

use crate::blob::StreamingBlob;
use crate::client::{
    CompletedPartSpec, DeleteObjectsOutcome, FetchedObject, HeadOutput, ListObjectsRequest,
    ListVersionsRequest, ObjectPage, ObjectStoreClient, RawObject, RawVersion, VersionPage,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use s3browser_common::types::{
    BatchItemError, BucketSummary, DeleteTarget, EncryptionInfo, LifecycleRule, VersioningInfo,
};
use s3browser_common::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct FakeObject {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub etag: String,
}

#[derive(Debug, Default)]
struct FakeUpload {
    key: String,
    // part number -> (last etag, last body)
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Debug)]
enum EncryptionBehavior {
    Missing,
    Configured(EncryptionInfo),
    Fails(String),
}

/// Recording in-memory object store.
#[derive(Debug)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<String, FakeObject>>,
    versions: Mutex<Vec<RawVersion>>,
    uploads: Mutex<HashMap<String, FakeUpload>>,
    buckets: Mutex<Vec<BucketSummary>>,
    bucket_regions: Mutex<HashMap<String, String>>,
    versioning: Mutex<VersioningInfo>,
    encryption: Mutex<EncryptionBehavior>,
    lifecycle: Mutex<Vec<LifecycleRule>>,
    fail_delete_keys: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    delete_batch_sizes: Mutex<Vec<usize>>,
    counter: AtomicU64,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            versions: Mutex::new(Vec::new()),
            uploads: Mutex::new(HashMap::new()),
            buckets: Mutex::new(Vec::new()),
            bucket_regions: Mutex::new(HashMap::new()),
            versioning: Mutex::new(VersioningInfo {
                status: "Disabled".to_string(),
                mfa_delete: None,
            }),
            encryption: Mutex::new(EncryptionBehavior::Missing),
            lifecycle: Mutex::new(Vec::new()),
            fail_delete_keys: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            delete_batch_sizes: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    // ---- seeding helpers ----

    pub fn put_bytes(&self, key: &str, data: &[u8]) {
        let etag = format!("\"etag-{}\"", self.next_id());
        self.objects.lock().insert(
            key.to_string(),
            FakeObject {
                data: Bytes::copy_from_slice(data),
                content_type: None,
                etag,
            },
        );
    }

    pub fn put_typed(&self, key: &str, data: &[u8], content_type: &str) {
        self.put_bytes(key, data);
        self.objects.lock().get_mut(key).unwrap().content_type =
            Some(content_type.to_string());
    }

    pub fn set_buckets(&self, names: &[&str]) {
        *self.buckets.lock() = names
            .iter()
            .map(|name| BucketSummary {
                name: (*name).to_string(),
                creation_date: None,
            })
            .collect();
    }

    pub fn set_bucket_region(&self, bucket: &str, region: &str) {
        self.bucket_regions
            .lock()
            .insert(bucket.to_string(), region.to_string());
    }

    pub fn seed_version(&self, version: RawVersion) {
        self.versions.lock().push(version);
    }

    pub fn set_versioning(&self, status: &str) {
        self.versioning.lock().status = status.to_string();
    }

    pub fn set_encryption(&self, info: EncryptionInfo) {
        *self.encryption.lock() = EncryptionBehavior::Configured(info);
    }

    pub fn set_encryption_error(&self, message: &str) {
        *self.encryption.lock() = EncryptionBehavior::Fails(message.to_string());
    }

    pub fn set_lifecycle(&self, rules: Vec<LifecycleRule>) {
        *self.lifecycle.lock() = rules;
    }

    pub fn fail_delete(&self, key: &str) {
        self.fail_delete_keys.lock().insert(key.to_string());
    }

    // ---- inspection helpers ----

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn delete_batch_sizes(&self) -> Vec<usize> {
        self.delete_batch_sizes.lock().clone()
    }

    pub fn object(&self, key: &str) -> Option<FakeObject> {
        self.objects.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

enum Entry {
    Object(RawObject),
    Prefix(String),
}

#[async_trait]
impl ObjectStoreClient for FakeStore {
    async fn list_objects_v2(&self, req: ListObjectsRequest) -> Result<ObjectPage> {
        self.record("list_objects_v2");
        let objects = self.objects.lock();
        let mut entries: Vec<Entry> = Vec::new();
        let mut seen_prefixes: HashSet<String> = HashSet::new();
        for (key, object) in objects.range(req.prefix.clone()..) {
            if !key.starts_with(&req.prefix) {
                break;
            }
            let remainder = &key[req.prefix.len()..];
            if req.delimiter.as_deref() == Some("/") {
                // Anything past the next delimiter groups into a common
                // prefix; a bare placeholder key (`prefix/sub/`) groups
                // into itself, which is how S3 reports it too.
                if let Some(idx) = remainder.find('/') {
                    let common = format!("{}{}", req.prefix, &remainder[..=idx]);
                    if seen_prefixes.insert(common.clone()) {
                        entries.push(Entry::Prefix(common));
                    }
                    continue;
                }
            }
            entries.push(Entry::Object(RawObject {
                key: key.clone(),
                size: Some(object.data.len() as u64),
                last_modified: Some("2026-01-01T00:00:00Z".to_string()),
                etag: Some(object.etag.clone()),
            }));
        }
        drop(objects);

        let offset: usize = req
            .continuation_token
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let max = usize::try_from(req.max_keys).unwrap_or(usize::MAX).max(1);
        let total = entries.len();
        let page: Vec<Entry> = entries
            .into_iter()
            .skip(offset)
            .take(max)
            .collect();
        let consumed = offset + page.len();

        let mut out = ObjectPage {
            is_truncated: consumed < total,
            next_continuation_token: (consumed < total).then(|| consumed.to_string()),
            ..ObjectPage::default()
        };
        for entry in page {
            match entry {
                Entry::Object(object) => out.objects.push(object),
                Entry::Prefix(prefix) => out.common_prefixes.push(prefix),
            }
        }
        Ok(out)
    }

    async fn list_object_versions(&self, req: ListVersionsRequest) -> Result<VersionPage> {
        self.record("list_object_versions");
        let mut out = VersionPage::default();
        let mut seen_prefixes = HashSet::new();
        for version in self.versions.lock().iter() {
            if !version.key.starts_with(&req.prefix) {
                continue;
            }
            let remainder = &version.key[req.prefix.len()..];
            if req.delimiter.as_deref() == Some("/") {
                if let Some(idx) = remainder.find('/') {
                    if remainder.len() > idx + 1 {
                        let common = format!("{}{}", req.prefix, &remainder[..=idx]);
                        if seen_prefixes.insert(common.clone()) {
                            out.common_prefixes.push(common);
                        }
                        continue;
                    }
                }
            }
            out.versions.push(version.clone());
        }
        Ok(out)
    }

    async fn head_object(
        &self,
        _bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<HeadOutput> {
        self.record(format!("head_object:{key}"));
        let objects = self.objects.lock();
        let object = objects
            .get(key)
            .ok_or_else(|| Error::not_found(format!("object {key:?} does not exist")))?;
        Ok(HeadOutput {
            content_type: object.content_type.clone(),
            size: object.data.len() as u64,
            last_modified: Some("2026-01-01T00:00:00Z".to_string()),
            etag: Some(object.etag.clone()),
            version_id: version_id.map(str::to_string),
            ..HeadOutput::default()
        })
    }

    async fn get_object(&self, _bucket: &str, key: &str) -> Result<FetchedObject> {
        self.record(format!("get_object:{key}"));
        let objects = self.objects.lock();
        let object = objects
            .get(key)
            .ok_or_else(|| Error::not_found(format!("object {key:?} does not exist")))?;
        Ok(FetchedObject {
            content_type: object.content_type.clone(),
            content_length: object.data.len() as u64,
            body: StreamingBlob::from_bytes(object.data.clone()),
        })
    }

    async fn put_object(
        &self,
        _bucket: &str,
        key: &str,
        content_type: Option<&str>,
        body: StreamingBlob,
    ) -> Result<()> {
        self.record(format!("put_object:{key}"));
        let data = body
            .collect()
            .await
            .map_err(|e| Error::s3(format!("body read failed: {e}")))?;
        let etag = format!("\"etag-{}\"", self.next_id());
        self.objects.lock().insert(
            key.to_string(),
            FakeObject {
                data,
                content_type: content_type.map(str::to_string),
                etag,
            },
        );
        Ok(())
    }

    async fn delete_object(
        &self,
        _bucket: &str,
        key: &str,
        _version_id: Option<&str>,
    ) -> Result<()> {
        self.record(format!("delete_object:{key}"));
        if self.fail_delete_keys.lock().contains(key) {
            return Err(Error::s3(format!("AccessDenied deleting {key}")));
        }
        self.objects.lock().remove(key);
        Ok(())
    }

    async fn delete_objects(
        &self,
        _bucket: &str,
        targets: &[DeleteTarget],
    ) -> Result<DeleteObjectsOutcome> {
        self.record("delete_objects");
        self.delete_batch_sizes.lock().push(targets.len());
        let failures = self.fail_delete_keys.lock();
        let mut objects = self.objects.lock();
        let mut outcome = DeleteObjectsOutcome::default();
        for target in targets {
            if failures.contains(&target.key) {
                outcome.errors.push(BatchItemError {
                    key: target.key.clone(),
                    message: "AccessDenied".to_string(),
                });
                continue;
            }
            objects.remove(&target.key);
            outcome.deleted.push(target.clone());
        }
        Ok(outcome)
    }

    async fn copy_object(
        &self,
        _bucket: &str,
        source_key: &str,
        destination_key: &str,
        _version_id: Option<&str>,
    ) -> Result<()> {
        self.record(format!("copy_object:{source_key}->{destination_key}"));
        let mut objects = self.objects.lock();
        let source = objects
            .get(source_key)
            .ok_or_else(|| Error::not_found(format!("object {source_key:?} does not exist")))?
            .clone();
        objects.insert(destination_key.to_string(), source);
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
        _content_type: Option<&str>,
    ) -> Result<String> {
        self.record(format!("create_multipart_upload:{key}"));
        let upload_id = format!("upload-{}", self.next_id());
        self.uploads.lock().insert(
            upload_id.clone(),
            FakeUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        body: StreamingBlob,
    ) -> Result<String> {
        self.record(format!("upload_part:{upload_id}:{part_number}"));
        let data = body
            .collect()
            .await
            .map_err(|e| Error::s3(format!("body read failed: {e}")))?;
        let etag = format!("\"part-{}\"", self.next_id());
        let mut uploads = self.uploads.lock();
        let upload = uploads.get_mut(upload_id).ok_or_else(|| Error::S3 {
            code: Some("NoSuchUpload".to_string()),
            message: format!("upload {upload_id} does not exist"),
            request_id: None,
        })?;
        upload.parts.insert(part_number, (etag.clone(), data));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPartSpec],
    ) -> Result<()> {
        self.record(format!("complete_multipart_upload:{upload_id}"));
        let mut uploads = self.uploads.lock();
        let upload = uploads.remove(upload_id).ok_or_else(|| Error::S3 {
            code: Some("NoSuchUpload".to_string()),
            message: format!("upload {upload_id} does not exist"),
            request_id: None,
        })?;
        let mut assembled = Vec::new();
        for spec in parts {
            let (etag, data) = upload.parts.get(&spec.part_number).ok_or_else(|| Error::S3 {
                code: Some("InvalidPart".to_string()),
                message: format!("part {} was never uploaded", spec.part_number),
                request_id: None,
            })?;
            if *etag != spec.etag {
                return Err(Error::S3 {
                    code: Some("InvalidPart".to_string()),
                    message: format!("etag mismatch for part {}", spec.part_number),
                    request_id: None,
                });
            }
            assembled.extend_from_slice(data);
        }
        let etag = format!("\"etag-{}\"", self.next_id());
        self.objects.lock().insert(
            upload.key,
            FakeObject {
                data: Bytes::from(assembled),
                content_type: None,
                etag,
            },
        );
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.record(format!("abort_multipart_upload:{upload_id}"));
        self.uploads.lock().remove(upload_id);
        Ok(())
    }

    async fn presign_get_object(
        &self,
        bucket: &str,
        key: &str,
        _version_id: Option<&str>,
        ttl: Duration,
    ) -> Result<String> {
        self.record(format!("presign_get_object:{key}"));
        Ok(format!(
            "https://presigned.example/{bucket}/{key}?expires={}",
            ttl.as_secs()
        ))
    }

    async fn get_bucket_location(&self, bucket: &str) -> Result<String> {
        self.record(format!("get_bucket_location:{bucket}"));
        Ok(self
            .bucket_regions
            .lock()
            .get(bucket)
            .cloned()
            .unwrap_or_else(|| "us-east-1".to_string()))
    }

    async fn get_bucket_versioning(&self, _bucket: &str) -> Result<VersioningInfo> {
        self.record("get_bucket_versioning");
        Ok(self.versioning.lock().clone())
    }

    async fn get_bucket_encryption(&self, _bucket: &str) -> Result<Option<EncryptionInfo>> {
        self.record("get_bucket_encryption");
        match &*self.encryption.lock() {
            EncryptionBehavior::Missing => Ok(None),
            EncryptionBehavior::Configured(info) => Ok(Some(info.clone())),
            EncryptionBehavior::Fails(message) => Err(Error::s3(message.clone())),
        }
    }

    async fn get_bucket_lifecycle_configuration(
        &self,
        _bucket: &str,
    ) -> Result<Vec<LifecycleRule>> {
        self.record("get_bucket_lifecycle_configuration");
        Ok(self.lifecycle.lock().clone())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        self.record("list_buckets");
        Ok(self.buckets.lock().clone())
    }
}
