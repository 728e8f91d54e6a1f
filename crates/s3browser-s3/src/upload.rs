//! Upload proxying: single PUT and the multipart coordinator
//!
//! The server is stateless across parts except for a small
//! `upload_id -> context` map used to check that follow-up part,
//! complete and abort calls come from the session that initiated the
//! upload. Entries older than the abandonment horizon are reaped on the
//! next map access. The server never retries; the browser drives part
//! parallelism and retry.

use crate::blob::StreamingBlob;
use crate::client::{CompletedPartSpec, ObjectStoreClient};
use parking_lot::Mutex;
use s3browser_common::types::{MAX_PART_NUMBER, MAX_UPLOAD_SIZE, PART_SIZE};
use s3browser_common::{Error, Result, key};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::info;

/// Contexts older than this are assumed abandoned and reaped; the
/// store-side upload still exists until an explicit abort or the
/// bucket's lifecycle cleans it up.
const CONTEXT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Server-side state for one open multipart upload.
#[derive(Clone, Debug)]
struct UploadContext {
    connection_id: i64,
    bucket: String,
    key: String,
    created_at: Instant,
}

/// Result of initiating a multipart upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitiateOutcome {
    pub upload_id: String,
    pub key: String,
    pub part_size: u64,
    pub total_parts: u64,
}

/// One part reference supplied by the client at completion.
#[derive(Clone, Debug)]
pub struct PartEtag {
    pub part_number: i32,
    pub etag: String,
}

/// Single-PUT and multipart upload coordinator.
pub struct UploadService {
    contexts: Mutex<HashMap<String, UploadContext>>,
}

impl std::fmt::Debug for UploadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadService")
            .field("open_uploads", &self.contexts.lock().len())
            .finish()
    }
}

impl UploadService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Start a multipart upload: sanitize the key, bound the size, fix
    /// the part size and record the owning connection.
    pub async fn initiate(
        &self,
        client: &dyn ObjectStoreClient,
        connection_id: i64,
        bucket: &str,
        raw_key: &str,
        content_type: Option<&str>,
        file_size: u64,
    ) -> Result<InitiateOutcome> {
        let key = key::sanitize_key(raw_key)?;
        if file_size > MAX_UPLOAD_SIZE {
            return Err(Error::invalid_input(format!(
                "file size {file_size} exceeds the {MAX_UPLOAD_SIZE}-byte limit"
            )));
        }
        let upload_id = client
            .create_multipart_upload(bucket, &key, content_type)
            .await?;
        let total_parts = file_size.div_ceil(PART_SIZE);
        {
            let mut contexts = self.contexts.lock();
            reap_stale(&mut contexts);
            contexts.insert(
                upload_id.clone(),
                UploadContext {
                    connection_id,
                    bucket: bucket.to_string(),
                    key: key.clone(),
                    created_at: Instant::now(),
                },
            );
        }
        info!(bucket, key = %key, upload_id = %upload_id, total_parts, "initiated multipart upload");
        Ok(InitiateOutcome {
            upload_id,
            key,
            part_size: PART_SIZE,
            total_parts,
        })
    }

    /// Stream one part to the store. Parts may arrive in any order and a
    /// part number may be re-uploaded; the store keeps the last write.
    pub async fn upload_part(
        &self,
        client: &dyn ObjectStoreClient,
        connection_id: i64,
        upload_id: &str,
        raw_key: &str,
        part_number: i32,
        body: StreamingBlob,
    ) -> Result<String> {
        let key = key::sanitize_key(raw_key)?;
        if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(Error::invalid_input(format!(
                "part number {part_number} is outside 1..={MAX_PART_NUMBER}"
            )));
        }
        let context = self.context_for(upload_id, connection_id, &key)?;
        client
            .upload_part(&context.bucket, &key, upload_id, part_number, body)
            .await
    }

    /// Complete a multipart upload. Parts are sorted ascending and
    /// deduplicated by part number, keeping the last etag the client
    /// supplied for each number.
    pub async fn complete(
        &self,
        client: &dyn ObjectStoreClient,
        connection_id: i64,
        upload_id: &str,
        raw_key: &str,
        parts: Vec<PartEtag>,
    ) -> Result<()> {
        let key = key::sanitize_key(raw_key)?;
        if parts.is_empty() {
            return Err(Error::invalid_input("complete requires at least one part"));
        }
        let context = self.context_for(upload_id, connection_id, &key)?;

        // BTreeMap insertion both dedups (last insert wins) and yields
        // the ascending order S3 demands.
        let mut by_number: BTreeMap<i32, String> = BTreeMap::new();
        for part in parts {
            if !(1..=MAX_PART_NUMBER).contains(&part.part_number) {
                return Err(Error::invalid_input(format!(
                    "part number {} is outside 1..={MAX_PART_NUMBER}",
                    part.part_number
                )));
            }
            by_number.insert(part.part_number, part.etag);
        }
        let specs: Vec<CompletedPartSpec> = by_number
            .into_iter()
            .map(|(part_number, etag)| CompletedPartSpec { part_number, etag })
            .collect();

        client
            .complete_multipart_upload(&context.bucket, &key, upload_id, &specs)
            .await?;
        self.contexts.lock().remove(upload_id);
        info!(bucket = %context.bucket, key = %key, upload_id = %upload_id, "completed multipart upload");
        Ok(())
    }

    /// Abort a multipart upload. Idempotent: aborting an unknown or
    /// already-aborted upload succeeds.
    pub async fn abort(
        &self,
        client: &dyn ObjectStoreClient,
        connection_id: i64,
        upload_id: &str,
        raw_key: &str,
    ) -> Result<()> {
        let key = key::sanitize_key(raw_key)?;
        let context = match self.context_for(upload_id, connection_id, &key) {
            Ok(context) => context,
            // Unknown upload id: nothing to own, nothing to abort.
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };
        client
            .abort_multipart_upload(&context.bucket, &key, upload_id)
            .await?;
        self.contexts.lock().remove(upload_id);
        Ok(())
    }

    /// Proxy a whole object in one PUT, streaming the body through.
    pub async fn put_single(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        raw_key: &str,
        content_type: Option<&str>,
        body: StreamingBlob,
    ) -> Result<String> {
        let key = key::sanitize_key(raw_key)?;
        if body.len() > MAX_UPLOAD_SIZE {
            return Err(Error::invalid_input(format!(
                "file size {} exceeds the {MAX_UPLOAD_SIZE}-byte limit",
                body.len()
            )));
        }
        client.put_object(bucket, &key, content_type, body).await?;
        Ok(key)
    }

    /// Create an empty folder placeholder object (`path/`).
    pub async fn create_folder(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        raw_path: &str,
    ) -> Result<String> {
        let trimmed = raw_path.trim_end_matches('/');
        let key = key::sanitize_key(&format!("{trimmed}/"))?;
        client
            .put_object(bucket, &key, None, StreamingBlob::empty())
            .await?;
        Ok(key)
    }

    fn context_for(
        &self,
        upload_id: &str,
        connection_id: i64,
        key: &str,
    ) -> Result<UploadContext> {
        let mut contexts = self.contexts.lock();
        reap_stale(&mut contexts);
        let context = contexts
            .get(upload_id)
            .ok_or_else(|| Error::not_found(format!("upload {upload_id:?} is not open")))?;
        if context.connection_id != connection_id {
            return Err(Error::forbidden(
                "upload belongs to a different connection",
            ));
        }
        if context.key != key {
            return Err(Error::invalid_input(
                "key does not match the initiated upload",
            ));
        }
        Ok(context.clone())
    }
}

impl Default for UploadService {
    fn default() -> Self {
        Self::new()
    }
}

fn reap_stale(contexts: &mut HashMap<String, UploadContext>) {
    contexts.retain(|_, context| context.created_at.elapsed() < CONTEXT_TTL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeStore;
    use bytes::Bytes;

    fn blob(data: &[u8]) -> StreamingBlob {
        StreamingBlob::from_bytes(Bytes::copy_from_slice(data))
    }

    #[tokio::test]
    async fn test_initiate_computes_part_layout() {
        let store = FakeStore::new();
        let service = UploadService::new();
        let outcome = service
            .initiate(&store, 1, "b1", "video.mp4", Some("video/mp4"), 26_214_400)
            .await
            .unwrap();
        assert_eq!(outcome.part_size, PART_SIZE);
        assert_eq!(outcome.total_parts, 3);
        assert_eq!(outcome.key, "video.mp4");
    }

    #[tokio::test]
    async fn test_initiate_rejects_oversized_file() {
        let store = FakeStore::new();
        let service = UploadService::new();
        let err = service
            .initiate(&store, 1, "b1", "huge.bin", None, MAX_UPLOAD_SIZE + 1)
            .await
            .unwrap_err();
        assert_eq!(err.api_code(), "invalid_input");
    }

    #[tokio::test]
    async fn test_initiate_rejects_traversal_key() {
        let store = FakeStore::new();
        let service = UploadService::new();
        assert!(service
            .initiate(&store, 1, "b1", "../etc/passwd", None, 10)
            .await
            .is_err());
        assert!(service
            .initiate(&store, 1, "b1", "/absolute", None, 10)
            .await
            .is_err());
        assert_eq!(store.count_calls("create_multipart_upload"), 0);
    }

    #[tokio::test]
    async fn test_parts_out_of_order_assemble_in_order() {
        let store = FakeStore::new();
        let service = UploadService::new();
        let init = service
            .initiate(&store, 1, "b1", "file.bin", None, 9)
            .await
            .unwrap();
        // Upload parts 3, 1, 2 — completion must still concatenate 1..3.
        let e3 = service
            .upload_part(&store, 1, &init.upload_id, "file.bin", 3, blob(b"ccc"))
            .await
            .unwrap();
        let e1 = service
            .upload_part(&store, 1, &init.upload_id, "file.bin", 1, blob(b"aaa"))
            .await
            .unwrap();
        let e2 = service
            .upload_part(&store, 1, &init.upload_id, "file.bin", 2, blob(b"bbb"))
            .await
            .unwrap();
        service
            .complete(
                &store,
                1,
                &init.upload_id,
                "file.bin",
                vec![
                    PartEtag { part_number: 2, etag: e2 },
                    PartEtag { part_number: 3, etag: e3 },
                    PartEtag { part_number: 1, etag: e1 },
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.object("file.bin").unwrap().data, Bytes::from_static(b"aaabbbccc"));
    }

    #[tokio::test]
    async fn test_duplicate_part_keeps_last_etag() {
        let store = FakeStore::new();
        let service = UploadService::new();
        let init = service
            .initiate(&store, 1, "b1", "file.bin", None, 6)
            .await
            .unwrap();
        let _first = service
            .upload_part(&store, 1, &init.upload_id, "file.bin", 1, blob(b"old"))
            .await
            .unwrap();
        let second = service
            .upload_part(&store, 1, &init.upload_id, "file.bin", 1, blob(b"new"))
            .await
            .unwrap();
        service
            .complete(
                &store,
                1,
                &init.upload_id,
                "file.bin",
                vec![PartEtag { part_number: 1, etag: second }],
            )
            .await
            .unwrap();
        assert_eq!(store.object("file.bin").unwrap().data, Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn test_part_number_bounds() {
        let store = FakeStore::new();
        let service = UploadService::new();
        let init = service
            .initiate(&store, 1, "b1", "file.bin", None, 6)
            .await
            .unwrap();
        for bad in [0, -1, MAX_PART_NUMBER + 1] {
            let err = service
                .upload_part(&store, 1, &init.upload_id, "file.bin", bad, blob(b"x"))
                .await
                .unwrap_err();
            assert_eq!(err.api_code(), "invalid_input");
        }
    }

    #[tokio::test]
    async fn test_other_connection_is_forbidden() {
        let store = FakeStore::new();
        let service = UploadService::new();
        let init = service
            .initiate(&store, 1, "b1", "file.bin", None, 6)
            .await
            .unwrap();
        let err = service
            .upload_part(&store, 2, &init.upload_id, "file.bin", 1, blob(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.api_code(), "forbidden");
    }

    #[tokio::test]
    async fn test_complete_requires_parts() {
        let store = FakeStore::new();
        let service = UploadService::new();
        let init = service
            .initiate(&store, 1, "b1", "file.bin", None, 6)
            .await
            .unwrap();
        let err = service
            .complete(&store, 1, &init.upload_id, "file.bin", Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.api_code(), "invalid_input");
    }

    #[tokio::test]
    async fn test_complete_missing_part_surfaces_invalid_part() {
        let store = FakeStore::new();
        let service = UploadService::new();
        let init = service
            .initiate(&store, 1, "b1", "file.bin", None, 6)
            .await
            .unwrap();
        let e1 = service
            .upload_part(&store, 1, &init.upload_id, "file.bin", 1, blob(b"aaa"))
            .await
            .unwrap();
        let err = service
            .complete(
                &store,
                1,
                &init.upload_id,
                "file.bin",
                vec![
                    PartEtag { part_number: 1, etag: e1 },
                    PartEtag { part_number: 2, etag: "\"ghost\"".to_string() },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::S3 { code: Some(ref c), .. } if c == "InvalidPart"));
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let store = FakeStore::new();
        let service = UploadService::new();
        let init = service
            .initiate(&store, 1, "b1", "file.bin", None, 6)
            .await
            .unwrap();
        service
            .abort(&store, 1, &init.upload_id, "file.bin")
            .await
            .unwrap();
        // Second abort: the context is gone, still succeeds.
        service
            .abort(&store, 1, &init.upload_id, "file.bin")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_single_and_folder() {
        let store = FakeStore::new();
        let key = UploadService::put_single(&store, "b1", "notes.txt", Some("text/plain"), blob(b"hi"))
            .await
            .unwrap();
        assert_eq!(key, "notes.txt");
        assert_eq!(store.object("notes.txt").unwrap().data, Bytes::from_static(b"hi"));

        let folder = UploadService::create_folder(&store, "b1", "new-folder")
            .await
            .unwrap();
        assert_eq!(folder, "new-folder/");
        assert!(store.object("new-folder/").unwrap().data.is_empty());
    }
}
