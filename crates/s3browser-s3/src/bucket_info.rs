//! Aggregate bucket information
//!
//! Versioning, default encryption and lifecycle rules, fanned in from
//! three S3 calls. Every sub-call is best-effort: a missing encryption
//! config is normal, any other encryption failure is reported as text,
//! and missing lifecycle/versioning degrade to empty defaults instead of
//! failing the whole response.

use crate::client::ObjectStoreClient;
use s3browser_common::Result;
use s3browser_common::types::{BucketInfo, VersioningInfo};
use tracing::debug;

/// Best-effort bucket info fan-in.
#[derive(Clone, Copy, Debug, Default)]
pub struct BucketInfoService;

impl BucketInfoService {
    /// Gather versioning, encryption and lifecycle state for one bucket.
    pub async fn bucket_info(client: &dyn ObjectStoreClient, bucket: &str) -> Result<BucketInfo> {
        let versioning = match client.get_bucket_versioning(bucket).await {
            Ok(versioning) => versioning,
            Err(err) => {
                debug!(bucket, %err, "versioning lookup failed");
                VersioningInfo {
                    status: "Unknown".to_string(),
                    mfa_delete: None,
                }
            }
        };

        let (encryption, encryption_error) = match client.get_bucket_encryption(bucket).await {
            Ok(encryption) => (encryption, None),
            Err(err) => {
                debug!(bucket, %err, "encryption lookup failed");
                (None, Some(err.to_string()))
            }
        };

        let lifecycle_rules = match client.get_bucket_lifecycle_configuration(bucket).await {
            Ok(rules) => rules,
            Err(err) => {
                debug!(bucket, %err, "lifecycle lookup failed");
                Vec::new()
            }
        };

        Ok(BucketInfo {
            versioning,
            encryption,
            encryption_error,
            lifecycle_rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeStore;
    use s3browser_common::types::{EncryptionInfo, LifecycleRule};

    #[tokio::test]
    async fn test_missing_encryption_is_null_not_error() {
        let store = FakeStore::new();
        store.set_versioning("Enabled");
        let info = BucketInfoService::bucket_info(&store, "b1").await.unwrap();
        assert_eq!(info.versioning.status, "Enabled");
        assert!(info.encryption.is_none());
        assert!(info.encryption_error.is_none());
        assert!(info.lifecycle_rules.is_empty());
    }

    #[tokio::test]
    async fn test_encryption_error_is_reported_not_fatal() {
        let store = FakeStore::new();
        store.set_encryption_error("AccessDenied");
        let info = BucketInfoService::bucket_info(&store, "b1").await.unwrap();
        assert!(info.encryption.is_none());
        assert!(info.encryption_error.as_deref().unwrap().contains("AccessDenied"));
    }

    #[tokio::test]
    async fn test_configured_encryption_and_lifecycle() {
        let store = FakeStore::new();
        store.set_encryption(EncryptionInfo {
            algorithm: Some("aws:kms".to_string()),
            kms_key_id: Some("key-1".to_string()),
        });
        store.set_lifecycle(vec![LifecycleRule {
            id: Some("expire-tmp".to_string()),
            status: "Enabled".to_string(),
            prefix: Some("tmp/".to_string()),
            expiration_days: Some(7),
            ..LifecycleRule::default()
        }]);
        let info = BucketInfoService::bucket_info(&store, "b1").await.unwrap();
        assert_eq!(
            info.encryption.unwrap().algorithm.as_deref(),
            Some("aws:kms")
        );
        assert_eq!(info.lifecycle_rules.len(), 1);
        assert_eq!(info.lifecycle_rules[0].expiration_days, Some(7));
    }
}
