//! Presigned URLs, text preview and object metadata
//!
//! Presign TTLs are bounded to one minute..seven days. Preview is
//! deliberately narrow: text-shaped content types only, capped at 1 MiB,
//! everything else is rejected before any bytes stream to the browser.

use crate::client::ObjectStoreClient;
use s3browser_common::types::{
    DEFAULT_PRESIGN_TTL_SECS, MAX_PRESIGN_TTL_SECS, MIN_PRESIGN_TTL_SECS, ObjectMetadata, Vendor,
};
use s3browser_common::{Error, Result, key};
use std::time::Duration;

/// Largest object the preview endpoint will render.
pub const MAX_PREVIEW_BYTES: u64 = 1024 * 1024;

/// Presign/preview/metadata operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct DownloadService;

impl DownloadService {
    /// Issue a presigned GET URL with a bounded TTL.
    pub async fn presign(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        raw_key: &str,
        version_id: Option<&str>,
        ttl_seconds: u64,
    ) -> Result<String> {
        let key = key::sanitize_key(raw_key)?;
        if !(MIN_PRESIGN_TTL_SECS..=MAX_PRESIGN_TTL_SECS).contains(&ttl_seconds) {
            return Err(Error::invalid_input(format!(
                "ttl {ttl_seconds}s is outside {MIN_PRESIGN_TTL_SECS}..={MAX_PRESIGN_TTL_SECS}"
            )));
        }
        client
            .presign_get_object(bucket, &key, version_id, Duration::from_secs(ttl_seconds))
            .await
    }

    /// Presign with the default one-hour TTL.
    pub async fn download_url(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        raw_key: &str,
    ) -> Result<String> {
        Self::presign(client, bucket, raw_key, None, DEFAULT_PRESIGN_TTL_SECS).await
    }

    /// Fetch a small text object for inline preview.
    pub async fn preview(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        raw_key: &str,
    ) -> Result<String> {
        let key = key::sanitize_key(raw_key)?;
        let object = client.get_object(bucket, &key).await?;
        if object.content_length > MAX_PREVIEW_BYTES {
            return Err(Error::invalid_input(format!(
                "cannot preview: object is larger than {MAX_PREVIEW_BYTES} bytes"
            )));
        }
        if !is_previewable(object.content_type.as_deref()) {
            return Err(Error::invalid_input(format!(
                "cannot preview content type {:?}",
                object.content_type.as_deref().unwrap_or("unknown")
            )));
        }
        let (bytes, truncated) = object
            .body
            .read_up_to(usize::try_from(MAX_PREVIEW_BYTES).unwrap_or(usize::MAX))
            .await
            .map_err(|e| Error::s3(format!("body read failed: {e}")))?;
        if truncated {
            // The head lied about the length; refuse rather than show a
            // silently cut-off document.
            return Err(Error::invalid_input(
                "cannot preview: object exceeded the preview size cap",
            ));
        }
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::invalid_input("cannot preview: object is not valid UTF-8"))
    }

    /// Head an object and report its metadata plus the endpoint vendor.
    pub async fn object_metadata(
        client: &dyn ObjectStoreClient,
        endpoint: &str,
        bucket: &str,
        raw_key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectMetadata> {
        let object_key = key::sanitize_key(raw_key)?;
        let head = client.head_object(bucket, &object_key, version_id).await?;
        let vendor = key::endpoint_host(endpoint).map_or(Vendor::Other, Vendor::from_host);
        Ok(ObjectMetadata {
            content_type: head.content_type,
            size: head.size,
            last_modified: head.last_modified,
            etag: head.etag,
            version_id: head.version_id,
            server_side_encryption: head.server_side_encryption,
            sse_kms_key_id: head.sse_kms_key_id,
            storage_class: head.storage_class,
            user_metadata: head.user_metadata,
            vendor,
        })
    }
}

/// Text-shaped content types the preview endpoint will render.
fn is_previewable(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    essence.starts_with("text/")
        || matches!(
            essence,
            "application/json"
                | "application/xml"
                | "application/x-yaml"
                | "application/yaml"
                | "application/javascript"
                | "application/x-ndjson"
        )
}
