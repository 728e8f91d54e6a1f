//! Streaming request/response bodies
//!
//! [`StreamingBlob`] is the body type the client capability moves around:
//! a stream of `Bytes` chunks with a known total length. Proxied uploads
//! flow through a small bounded channel, so the gateway never holds more
//! than a few chunks of a part in memory at once.

use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Capacity of the chunk channel behind proxied bodies. With the 1 MiB
/// chunks the gateway reads, this bounds buffering well under the part
/// size.
pub const CHANNEL_CAPACITY: usize = 4;

enum Inner {
    Full(Option<Bytes>),
    Channel(mpsc::Receiver<io::Result<Bytes>>),
}

/// A byte stream with a known total length.
pub struct StreamingBlob {
    inner: Inner,
    len: u64,
}

impl std::fmt::Debug for StreamingBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingBlob")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl StreamingBlob {
    /// Wrap a fully materialized buffer.
    #[must_use]
    pub fn from_bytes(bytes: Bytes) -> Self {
        let len = bytes.len() as u64;
        Self {
            inner: Inner::Full(Some(bytes)),
            len,
        }
    }

    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// Wrap a chunk channel whose sender knows the total length up
    /// front.
    #[must_use]
    pub fn from_channel(rx: mpsc::Receiver<io::Result<Bytes>>, len: u64) -> Self {
        Self {
            inner: Inner::Channel(rx),
            len,
        }
    }

    /// Total body length in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether the body is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drain the stream into one buffer. Intended for small bodies and
    /// test fakes; proxies stream instead.
    pub async fn collect(self) -> io::Result<Bytes> {
        use futures::StreamExt;
        let mut stream = self;
        let mut buf = Vec::with_capacity(usize::try_from(stream.len).unwrap_or(0));
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }

    /// Read at most `cap` bytes, reporting whether the body was
    /// truncated. The rest of the stream is dropped.
    pub async fn read_up_to(self, cap: usize) -> io::Result<(Bytes, bool)> {
        use futures::StreamExt;
        let mut stream = self;
        let mut buf = Vec::with_capacity(cap.min(64 * 1024));
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if buf.len() + chunk.len() > cap {
                buf.extend_from_slice(&chunk[..cap - buf.len()]);
                return Ok((Bytes::from(buf), true));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok((Bytes::from(buf), false))
    }
}

impl Stream for StreamingBlob {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.get_mut().inner {
            Inner::Full(slot) => Poll::Ready(slot.take().filter(|b| !b.is_empty()).map(Ok)),
            Inner::Channel(rx) => rx.poll_recv(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_from_bytes_round_trip() {
        let blob = StreamingBlob::from_bytes(Bytes::from_static(b"hello"));
        assert_eq!(blob.len(), 5);
        assert_eq!(blob.collect().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_empty_yields_no_chunks() {
        let mut blob = StreamingBlob::empty();
        assert!(blob.is_empty());
        assert!(blob.next().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_streams_chunks_in_order() {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let blob = StreamingBlob::from_channel(rx, 6);
        tokio::spawn(async move {
            tx.send(Ok(Bytes::from_static(b"foo"))).await.unwrap();
            tx.send(Ok(Bytes::from_static(b"bar"))).await.unwrap();
        });
        assert_eq!(blob.collect().await.unwrap(), Bytes::from_static(b"foobar"));
    }

    #[tokio::test]
    async fn test_read_up_to_truncates() {
        let blob = StreamingBlob::from_bytes(Bytes::from_static(b"0123456789"));
        let (bytes, truncated) = blob.read_up_to(4).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"0123"));
        assert!(truncated);
    }

    #[tokio::test]
    async fn test_read_up_to_exact_fit() {
        let blob = StreamingBlob::from_bytes(Bytes::from_static(b"0123"));
        let (bytes, truncated) = blob.read_up_to(4).await.unwrap();
        assert_eq!(bytes.len(), 4);
        assert!(!truncated);
    }

    #[tokio::test]
    async fn test_channel_error_propagates() {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let blob = StreamingBlob::from_channel(rx, 0);
        tokio::spawn(async move {
            tx.send(Err(io::Error::other("connection reset"))).await.unwrap();
        });
        assert!(blob.collect().await.is_err());
    }
}
