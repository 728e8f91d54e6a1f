//! S3 orchestration services for s3browser
//!
//! The gateway talks to object stores exclusively through the
//! [`client::ObjectStoreClient`] capability. [`factory::ClientFactory`]
//! materializes and caches clients from vault profiles; the service
//! modules implement the logical operations (windowed listing, recursive
//! plans, uploads, deletes, copies, presigning) on top of the capability.

pub mod blob;
pub mod bucket_info;
pub mod client;
pub mod download;
pub mod factory;
pub mod listing;
pub mod mutation;
pub mod upload;

#[cfg(test)]
pub(crate) mod fake;

pub use blob::StreamingBlob;
pub use client::{AwsClient, CancellableClient, ClientParams, ObjectStoreClient};
pub use factory::ClientFactory;
