//! Route handlers
//!
//! One module per resource. Shared here: the request time budgets, the
//! connection-binding check every S3 endpoint performs, and the body
//! pump that turns an incoming HTTP body into a bounded streaming blob.

pub mod auth;
pub mod connections;
pub mod download;
pub mod objects;
pub mod transfer;

use crate::error::ApiError;
use crate::sessions::SessionHandle;
use axum::body::Body;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_LENGTH;
use futures::StreamExt;
use s3browser_common::Error;
use s3browser_s3::StreamingBlob;
use s3browser_s3::blob::CHANNEL_CAPACITY;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

/// Run a service call under a time budget; elapsing maps to `Timeout`.
pub async fn with_timeout<T>(
    budget: Duration,
    future: impl Future<Output = Result<T, Error>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(budget, future).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_elapsed) => Err(ApiError::from(Error::Timeout)),
    }
}

/// S3 endpoints (other than bucket listing) require the session to have
/// bound exactly the connection named in the path.
pub fn require_bound(handle: &SessionHandle, connection_id: i64) -> Result<(), ApiError> {
    if handle.connection_id == Some(connection_id) {
        Ok(())
    } else {
        Err(ApiError(Error::forbidden(
            "no active connection bound for this request",
        )))
    }
}

/// Read the Content-Length of a raw-body request.
pub fn content_length(headers: &HeaderMap) -> Result<u64, ApiError> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| ApiError(Error::invalid_input("missing or malformed Content-Length")))
}

/// Pump an incoming HTTP body through a bounded channel. The channel
/// capacity keeps server-side buffering to a few chunks regardless of
/// how large the body is.
pub fn blob_from_body(body: Body, len: u64) -> StreamingBlob {
    let mut stream = body.into_data_stream();
    let (tx, rx) = mpsc::channel::<io::Result<bytes::Bytes>>(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(io::Error::other);
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() || failed {
                break;
            }
        }
    });
    StreamingBlob::from_channel(rx, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_bound() {
        let bound = SessionHandle {
            id: "s".to_string(),
            connection_id: Some(3),
        };
        assert!(require_bound(&bound, 3).is_ok());
        assert!(require_bound(&bound, 4).is_err());
        let unbound = SessionHandle {
            id: "s".to_string(),
            connection_id: None,
        };
        assert!(require_bound(&unbound, 3).is_err());
    }

    #[test]
    fn test_content_length() {
        let mut headers = HeaderMap::new();
        assert!(content_length(&headers).is_err());
        headers.insert(CONTENT_LENGTH, "1048576".parse().unwrap());
        assert_eq!(content_length(&headers).unwrap(), 1_048_576);
        headers.insert(CONTENT_LENGTH, "not-a-number".parse().unwrap());
        assert!(content_length(&headers).is_err());
    }

    #[tokio::test]
    async fn test_blob_from_body_round_trip() {
        let blob = blob_from_body(Body::from("stream me"), 9);
        assert_eq!(blob.len(), 9);
        let bytes = blob.collect().await.unwrap();
        assert_eq!(&bytes[..], b"stream me");
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result: Result<(), ApiError> = with_timeout(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.0.api_code(), "timeout");
    }
}
