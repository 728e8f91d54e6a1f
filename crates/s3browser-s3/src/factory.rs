//! Client factory and region cache
//!
//! Materializes an [`ObjectStoreClient`] from a vault profile, resolving
//! the region lazily (and once) when the profile asks for auto
//! detection. Clients are cached per `(connection, region)` and evicted
//! when the profile is deleted. Lookups happen under the lock; region
//! resolution and client construction happen outside it with a
//! double-checked insert.

use crate::client::{AwsClient, ClientParams, ObjectStoreClient};
use parking_lot::RwLock;
use s3browser_common::Result;
use s3browser_common::types::ConnectionRecord;
use s3browser_vault::Vault;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_REGION: &str = "us-east-1";

type BuildClient = dyn Fn(&ClientParams) -> Arc<dyn ObjectStoreClient> + Send + Sync;

/// Vault-backed factory for per-connection S3 clients.
pub struct ClientFactory {
    vault: Arc<Vault>,
    clients: RwLock<HashMap<(i64, String), Arc<dyn ObjectStoreClient>>>,
    regions: RwLock<HashMap<(i64, String), String>>,
    build: Box<BuildClient>,
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory").finish_non_exhaustive()
    }
}

impl ClientFactory {
    /// Create a factory producing real AWS SDK clients.
    #[must_use]
    pub fn new(vault: Arc<Vault>) -> Self {
        Self::with_builder(
            vault,
            Box::new(|params| Arc::new(AwsClient::new(params)) as Arc<dyn ObjectStoreClient>),
        )
    }

    /// Create a factory with a custom client constructor. Tests inject
    /// fakes through this.
    #[must_use]
    pub fn with_builder(vault: Arc<Vault>, build: Box<BuildClient>) -> Self {
        Self {
            vault,
            clients: RwLock::new(HashMap::new()),
            regions: RwLock::new(HashMap::new()),
            build,
        }
    }

    /// Resolve the client for a connection, optionally scoped to a
    /// bucket for region auto-detection. Returns the client together
    /// with the profile record it was built from.
    pub async fn client_for(
        &self,
        connection_id: i64,
        bucket: Option<&str>,
    ) -> Result<(Arc<dyn ObjectStoreClient>, ConnectionRecord)> {
        let record = self.vault.get_connection(connection_id)?;
        let region = self.resolve_region(&record, bucket).await?;

        let cache_key = (connection_id, region.clone());
        if let Some(client) = self.clients.read().get(&cache_key) {
            return Ok((Arc::clone(client), record));
        }

        let secret = self.vault.decrypt_secret(connection_id)?;
        let params = ClientParams {
            endpoint: record.endpoint.clone(),
            access_key_id: record.access_key_id.clone(),
            secret_access_key: secret,
            region,
        };
        let client = (self.build)(&params);
        drop(params);

        let mut clients = self.clients.write();
        let entry = clients.entry(cache_key).or_insert(client);
        Ok((Arc::clone(entry), record))
    }

    /// Drop cached clients and regions for a deleted or edited profile.
    pub fn invalidate_connection(&self, connection_id: i64) {
        self.clients
            .write()
            .retain(|(id, _), _| *id != connection_id);
        self.regions
            .write()
            .retain(|(id, _), _| *id != connection_id);
    }

    /// Drop every cached region, e.g. when the UI re-enters bucket
    /// selection.
    pub fn clear_region_cache(&self) {
        self.regions.write().clear();
    }

    /// Pick the region for a request: explicit profile region first,
    /// then the memoized auto-detected one, then a live
    /// `GetBucketLocation` through a probe client.
    async fn resolve_region(
        &self,
        record: &ConnectionRecord,
        bucket: Option<&str>,
    ) -> Result<String> {
        if let Some(region) = record.region.as_deref() {
            if !region.is_empty() {
                return Ok(region.to_string());
            }
        }
        if !record.auto_detect_region {
            return Ok(DEFAULT_REGION.to_string());
        }
        let Some(bucket) = bucket else {
            return Ok(DEFAULT_REGION.to_string());
        };

        let region_key = (record.id, bucket.to_string());
        if let Some(region) = self.regions.read().get(&region_key) {
            return Ok(region.clone());
        }

        let secret = self.vault.decrypt_secret(record.id)?;
        let probe = (self.build)(&ClientParams {
            endpoint: record.endpoint.clone(),
            access_key_id: record.access_key_id.clone(),
            secret_access_key: secret,
            region: DEFAULT_REGION.to_string(),
        });
        let region = probe.get_bucket_location(bucket).await?;
        debug!(connection = record.id, bucket, region = %region, "detected bucket region");

        let mut regions = self.regions.write();
        let entry = regions.entry(region_key).or_insert(region);
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeStore;
    use s3browser_vault::SaveConnection;
    use tempfile::TempDir;

    fn vault_with_profile(auto_detect: bool, region: Option<&str>) -> (TempDir, Arc<Vault>, i64) {
        let dir = TempDir::new().unwrap();
        let vault = Vault::open(
            &dir.path().join("s3browser.db"),
            "a master secret of sufficient length",
        )
        .unwrap();
        let record = vault
            .save_connection(SaveConnection {
                id: None,
                profile_name: "minio".to_string(),
                endpoint: "http://localhost:9000".to_string(),
                access_key_id: "AKIAEXAMPLE".to_string(),
                secret: Some("secret-secret".to_string()),
                bucket: None,
                region: region.map(str::to_string),
                auto_detect_region: auto_detect,
            })
            .unwrap();
        (dir, Arc::new(vault), record.id)
    }

    fn fake_factory(vault: Arc<Vault>, store: Arc<FakeStore>) -> ClientFactory {
        ClientFactory::with_builder(
            vault,
            Box::new(move |_params| Arc::clone(&store) as Arc<dyn ObjectStoreClient>),
        )
    }

    #[tokio::test]
    async fn test_region_detected_once_per_bucket() {
        let (_dir, vault, id) = vault_with_profile(true, None);
        let store = Arc::new(FakeStore::new());
        store.set_bucket_region("b1", "eu-central-1");
        let factory = fake_factory(vault, Arc::clone(&store));

        factory.client_for(id, Some("b1")).await.unwrap();
        factory.client_for(id, Some("b1")).await.unwrap();
        factory.client_for(id, Some("b1")).await.unwrap();
        assert_eq!(store.count_calls("get_bucket_location"), 1);
    }

    #[tokio::test]
    async fn test_explicit_region_skips_detection() {
        let (_dir, vault, id) = vault_with_profile(true, Some("ap-south-1"));
        let store = Arc::new(FakeStore::new());
        let factory = fake_factory(vault, Arc::clone(&store));

        factory.client_for(id, Some("b1")).await.unwrap();
        assert_eq!(store.count_calls("get_bucket_location"), 0);
    }

    #[tokio::test]
    async fn test_invalidate_connection_clears_region_cache() {
        let (_dir, vault, id) = vault_with_profile(true, None);
        let store = Arc::new(FakeStore::new());
        store.set_bucket_region("b1", "eu-central-1");
        let factory = fake_factory(vault, Arc::clone(&store));

        factory.client_for(id, Some("b1")).await.unwrap();
        factory.invalidate_connection(id);
        factory.client_for(id, Some("b1")).await.unwrap();
        assert_eq!(store.count_calls("get_bucket_location"), 2);
    }

    #[tokio::test]
    async fn test_unknown_connection_is_not_found() {
        let (_dir, vault, _id) = vault_with_profile(true, None);
        let store = Arc::new(FakeStore::new());
        let factory = fake_factory(vault, store);
        let err = factory.client_for(999, None).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
