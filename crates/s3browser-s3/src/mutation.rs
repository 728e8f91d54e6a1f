//! Delete, copy and move orchestration
//!
//! Batch deletes pack targets greedily under two simultaneous caps (1000
//! items, 90,000 serialized-body bytes). Folder deletes enumerate first,
//! batch-delete the files, then remove placeholders longest-key-first so
//! a folder never disappears before its contents. Copies and moves are
//! individual store calls; batches bound their parallelism.

use crate::client::{DeleteObjectsOutcome, ObjectStoreClient};
use crate::listing::{EnumerateOptions, ListingService};
use futures::StreamExt;
use s3browser_common::types::{
    BatchCopyError, BatchCopyOutcome, BatchDeleteOutcome, BatchItemError, CopyOperation,
    DeleteTarget, MAX_BATCH_BYTES, MAX_BATCH_COUNT,
};
use s3browser_common::{Error, Result, key};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Concurrent store calls within one copy/move batch.
const BATCH_PARALLELISM: usize = 8;

/// Outcome of a move: the copy always stands once it succeeded; a
/// failing source delete is reported, not rolled back.
#[derive(Clone, Debug, Default)]
pub struct MoveOutcome {
    pub delete_error: Option<String>,
}

/// Delete/copy/move resolver.
#[derive(Clone, Copy, Debug, Default)]
pub struct MutationService;

impl MutationService {
    /// Delete one object or, on a versioned bucket with `version_id`
    /// set, one specific version.
    pub async fn delete_object(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        raw_key: &str,
        version_id: Option<&str>,
    ) -> Result<()> {
        let key = key::sanitize_key(raw_key)?;
        client.delete_object(bucket, &key, version_id).await
    }

    /// Pack delete targets into request batches respecting both the
    /// count cap and the serialized-body byte cap. Packing is greedy in
    /// arrival order; a single target that alone exceeds the byte cap
    /// still gets its own batch.
    #[must_use]
    pub fn pack_batches(targets: Vec<DeleteTarget>) -> Vec<Vec<DeleteTarget>> {
        let mut batches: Vec<Vec<DeleteTarget>> = Vec::new();
        let mut current: Vec<DeleteTarget> = Vec::new();
        let mut current_bytes = 2usize; // array brackets
        for target in targets {
            let item_bytes = serde_json::to_string(&target)
                .map_or(target.key.len() + 48, |json| json.len() + 1);
            let full = current.len() >= MAX_BATCH_COUNT
                || current_bytes + item_bytes > MAX_BATCH_BYTES;
            if full && !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_bytes = 2;
            }
            current_bytes += item_bytes;
            current.push(target);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    /// Delete many objects, one store call per packed batch. Partial
    /// success is normal; per-item failures aggregate into the outcome.
    pub async fn batch_delete(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        targets: Vec<DeleteTarget>,
        cancel: &CancellationToken,
    ) -> Result<BatchDeleteOutcome> {
        for target in &targets {
            key::sanitize_key(&target.key)?;
        }
        let mut outcome = BatchDeleteOutcome::default();
        for batch in Self::pack_batches(targets) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match client.delete_objects(bucket, &batch).await {
                Ok(DeleteObjectsOutcome { deleted, errors }) => {
                    outcome.deleted.extend(deleted);
                    outcome.errors.extend(errors);
                }
                Err(err) => {
                    // The whole call failed; report every target in the
                    // batch and keep going with the rest.
                    warn!(bucket, %err, batch_len = batch.len(), "delete batch failed");
                    let message = err.to_string();
                    outcome.errors.extend(batch.into_iter().map(|target| {
                        BatchItemError {
                            key: target.key,
                            message: message.clone(),
                        }
                    }));
                }
            }
        }
        Ok(outcome)
    }

    /// Recursively delete a folder: enumerate, batch-delete the files,
    /// then remove placeholders in descending key-length order so that
    /// containing folders go last.
    pub async fn delete_folder(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchDeleteOutcome> {
        let plan = ListingService::enumerate(
            client,
            bucket,
            prefix,
            &EnumerateOptions::default(),
            cancel,
        )
        .await?;
        info!(
            bucket,
            prefix,
            files = plan.files.len(),
            placeholders = plan.placeholders.len(),
            "resolved folder delete plan"
        );

        let file_targets: Vec<DeleteTarget> = plan
            .files
            .into_iter()
            .map(|key| DeleteTarget {
                key,
                version_id: None,
            })
            .collect();
        let mut outcome = Self::batch_delete(client, bucket, file_targets, cancel).await?;

        let mut placeholders = plan.placeholders;
        placeholders.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        for placeholder in placeholders {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match client.delete_object(bucket, &placeholder, None).await {
                Ok(()) => outcome.deleted.push(DeleteTarget {
                    key: placeholder,
                    version_id: None,
                }),
                Err(err) => outcome.errors.push(BatchItemError {
                    key: placeholder,
                    message: err.to_string(),
                }),
            }
        }
        Ok(outcome)
    }

    /// Copy one object. The destination is the caller's responsibility;
    /// this never synthesizes destination keys.
    pub async fn copy_object(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
        version_id: Option<&str>,
    ) -> Result<()> {
        let source = key::sanitize_key(source_key)?;
        let destination = key::validate_destination_key(destination_key)?;
        client
            .copy_object(bucket, &source, &destination, version_id)
            .await
    }

    /// Move = copy then delete. A failed copy aborts with no delete; a
    /// failed delete leaves the copy standing and is reported.
    pub async fn move_object(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
        version_id: Option<&str>,
    ) -> Result<MoveOutcome> {
        Self::copy_object(client, bucket, source_key, destination_key, version_id).await?;
        match client.delete_object(bucket, source_key, version_id).await {
            Ok(()) => Ok(MoveOutcome::default()),
            Err(err) => {
                warn!(bucket, source_key, %err, "copy succeeded but source delete failed");
                Ok(MoveOutcome {
                    delete_error: Some(err.to_string()),
                })
            }
        }
    }

    /// Copy many objects with bounded parallelism per batch of at most
    /// 1000 operations.
    pub async fn batch_copy(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        operations: Vec<CopyOperation>,
        cancel: &CancellationToken,
    ) -> Result<BatchCopyOutcome> {
        Self::run_copy_batch(client, bucket, operations, false, cancel).await
    }

    /// Move many objects with bounded parallelism per batch.
    pub async fn batch_move(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        operations: Vec<CopyOperation>,
        cancel: &CancellationToken,
    ) -> Result<BatchCopyOutcome> {
        Self::run_copy_batch(client, bucket, operations, true, cancel).await
    }

    async fn run_copy_batch(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        operations: Vec<CopyOperation>,
        delete_source: bool,
        cancel: &CancellationToken,
    ) -> Result<BatchCopyOutcome> {
        let mut outcome = BatchCopyOutcome::default();
        for batch in operations.chunks(MAX_BATCH_COUNT) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let results: Vec<(String, std::result::Result<Option<String>, BatchCopyError>)> =
                futures::stream::iter(batch.iter().cloned().map(|op| async move {
                    if cancel.is_cancelled() {
                        return (
                            op.source_key.clone(),
                            Err(BatchCopyError {
                                source_key: op.source_key,
                                message: "cancelled".to_string(),
                                destination_key: Some(op.destination_key),
                            }),
                        );
                    }
                    let source = op.source_key.clone();
                    let result = if delete_source {
                        Self::move_object(
                            client,
                            bucket,
                            &op.source_key,
                            &op.destination_key,
                            op.version_id.as_deref(),
                        )
                        .await
                        .map(|moved| moved.delete_error)
                    } else {
                        Self::copy_object(
                            client,
                            bucket,
                            &op.source_key,
                            &op.destination_key,
                            op.version_id.as_deref(),
                        )
                        .await
                        .map(|()| None)
                    };
                    match result {
                        Ok(delete_error) => (source, Ok(delete_error)),
                        Err(err) => (
                            source.clone(),
                            Err(BatchCopyError {
                                source_key: source,
                                message: err.to_string(),
                                destination_key: Some(op.destination_key),
                            }),
                        ),
                    }
                }))
                .buffer_unordered(BATCH_PARALLELISM)
                .collect()
                .await;

            for (source, result) in results {
                match result {
                    Ok(None) => outcome.successful.push(source),
                    // The copy stands; the lingering source is an error
                    // entry, not a success.
                    Ok(Some(delete_error)) => outcome.errors.push(BatchCopyError {
                        source_key: source,
                        message: format!("copied but source delete failed: {delete_error}"),
                        destination_key: None,
                    }),
                    Err(err) => outcome.errors.push(err),
                }
            }
        }
        Ok(outcome)
    }
}

/// Benchmark helper: seed a prefix with deterministic zero-byte objects.
/// Compiled only with the `seed-test-items` feature and absent from
/// hardened builds.
#[cfg(feature = "seed-test-items")]
pub mod seeding {
    use super::{BATCH_PARALLELISM, ObjectStoreClient};
    use crate::blob::StreamingBlob;
    use futures::StreamExt;
    use s3browser_common::{Error, Result, key};
    use tokio_util::sync::CancellationToken;

    /// How many objects one seeding call creates.
    pub const SEED_ITEM_COUNT: u64 = 10_005;

    /// Hard cap; seeding more than this fails before any put.
    pub const SEED_SAFETY_CAP: u64 = 20_000;

    /// Create `SEED_ITEM_COUNT` zero-byte objects under `prefix/`.
    pub async fn seed_test_items(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        raw_prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let trimmed = raw_prefix.trim_end_matches('/');
        let prefix = key::sanitize_key(&format!("{trimmed}/"))?;
        if SEED_ITEM_COUNT > SEED_SAFETY_CAP {
            return Err(Error::invalid_input(format!(
                "seed count {SEED_ITEM_COUNT} exceeds the safety cap {SEED_SAFETY_CAP}"
            )));
        }
        let mut created = 0u64;
        let mut puts = futures::stream::iter((0..SEED_ITEM_COUNT).map(|i| {
            let key = format!("{prefix}seed-{i:05}.dat");
            async move {
                client
                    .put_object(bucket, &key, None, StreamingBlob::empty())
                    .await
            }
        }))
        .buffer_unordered(BATCH_PARALLELISM);
        while let Some(result) = puts.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            result?;
            created += 1;
        }
        Ok(created)
    }
}
