//! Bucket and object endpoints: listing, info, delete, copy, move
//!
//! Every handler takes the request's cancellation token from the
//! extensions (inserted by the cancellation layer) and wraps its store
//! client in a [`CancellableClient`], so a dropped connection aborts
//! in-flight store calls, not just the next loop iteration.

use super::{require_bound, with_timeout};
use crate::error::ApiError;
use crate::sessions::SessionHandle;
use crate::state::AppState;
use axum::Extension;
use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use s3browser_common::key;
use s3browser_common::types::{
    BatchCopyOutcome, BatchDeleteOutcome, BucketInfo, BucketSummary, CopyOperation, DeleteTarget,
    ListWindow, ObjectMetadata,
};
use s3browser_s3::bucket_info::BucketInfoService;
use s3browser_s3::download::DownloadService;
use s3browser_s3::listing::ListingService;
use s3browser_s3::mutation::MutationService;
use s3browser_s3::upload::UploadService;
use s3browser_s3::{CancellableClient, ObjectStoreClient};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    prefix: String,
    continuation_token: Option<String>,
    versions: Option<u8>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyQuery {
    key: String,
    version_id: Option<String>,
}

#[derive(Deserialize)]
pub struct BatchDeleteRequest {
    keys: Vec<DeleteTarget>,
}

#[derive(Deserialize)]
pub struct CreateFolderRequest {
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRequest {
    source_key: String,
    destination_key: String,
    version_id: Option<String>,
}

#[derive(Deserialize)]
pub struct BatchCopyRequest {
    operations: Vec<CopyOperation>,
}

/// `GET /api/buckets/{connId}` — works right after login, before any
/// binding, so a freshly connected profile can pick a bucket.
pub async fn buckets(
    State(state): State<Arc<AppState>>,
    Extension(cancel): Extension<CancellationToken>,
    Path(conn_id): Path<i64>,
) -> Result<Json<Vec<BucketSummary>>, ApiError> {
    let (client, _record) = state.factory.client_for(conn_id, None).await?;
    let client = CancellableClient::new(client, cancel);
    let buckets = with_timeout(state.config.control_timeout, async move {
        client.list_buckets().await
    })
    .await?;
    Ok(Json(buckets))
}

/// `GET /api/bucket/{connId}/{bucket}/info`
pub async fn bucket_info(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
) -> Result<Json<BucketInfo>, ApiError> {
    require_bound(&handle, conn_id)?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel);
    let info = with_timeout(state.config.control_timeout, async move {
        BucketInfoService::bucket_info(&client, &bucket).await
    })
    .await?;
    Ok(Json(info))
}

/// `GET /api/objects/{connId}/{bucket}` — one listing window.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListWindow>, ApiError> {
    require_bound(&handle, conn_id)?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel);
    let window = with_timeout(state.config.control_timeout, async move {
        ListingService::list_window(
            &client,
            &bucket,
            &query.prefix,
            query.continuation_token,
            query.versions == Some(1),
        )
        .await
    })
    .await?;
    Ok(Json(window))
}

/// `GET /api/objects/{connId}/{bucket}/metadata`
pub async fn metadata(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<ObjectMetadata>, ApiError> {
    require_bound(&handle, conn_id)?;
    let (client, record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel);
    let metadata = with_timeout(state.config.control_timeout, async move {
        DownloadService::object_metadata(
            &client,
            &record.endpoint,
            &bucket,
            &query.key,
            query.version_id.as_deref(),
        )
        .await
    })
    .await?;
    Ok(Json(metadata))
}

/// `DELETE /api/objects/{connId}/{bucket}` — a key ending in `/` with no
/// version id is a recursive folder delete; anything else removes one
/// object (or one version).
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Query(query): Query<KeyQuery>,
) -> Result<StatusCode, ApiError> {
    require_bound(&handle, conn_id)?;
    key::sanitize_key(&query.key)?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel.clone());
    with_timeout(state.config.data_timeout, async move {
        if query.key.ends_with('/') && query.version_id.is_none() {
            MutationService::delete_folder(&client, &bucket, &query.key, &cancel)
                .await
                .map(|_outcome| ())
        } else {
            MutationService::delete_object(
                &client,
                &bucket,
                &query.key,
                query.version_id.as_deref(),
            )
            .await
        }
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/objects/{connId}/{bucket}/batch-delete`
pub async fn batch_delete(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Json(request): Json<BatchDeleteRequest>,
) -> Result<Json<BatchDeleteOutcome>, ApiError> {
    require_bound(&handle, conn_id)?;
    for target in &request.keys {
        key::sanitize_key(&target.key)?;
    }
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel.clone());
    let outcome = with_timeout(state.config.data_timeout, async move {
        MutationService::batch_delete(&client, &bucket, request.keys, &cancel).await
    })
    .await?;
    Ok(Json(outcome))
}

/// `POST /api/objects/{connId}/{bucket}/folder`
pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Json(request): Json<CreateFolderRequest>,
) -> Result<StatusCode, ApiError> {
    require_bound(&handle, conn_id)?;
    key::sanitize_key(&format!("{}/", request.path.trim_end_matches('/')))?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel);
    with_timeout(state.config.control_timeout, async move {
        UploadService::create_folder(&client, &bucket, &request.path).await
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/objects/{connId}/{bucket}/copy`
pub async fn copy(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Json(request): Json<CopyRequest>,
) -> Result<StatusCode, ApiError> {
    require_bound(&handle, conn_id)?;
    key::sanitize_key(&request.source_key)?;
    key::validate_destination_key(&request.destination_key)?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel);
    with_timeout(state.config.data_timeout, async move {
        MutationService::copy_object(
            &client,
            &bucket,
            &request.source_key,
            &request.destination_key,
            request.version_id.as_deref(),
        )
        .await
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/objects/{connId}/{bucket}/move` — copy then delete; a
/// failed source delete is logged by the service and the copy stands.
pub async fn rename(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Json(request): Json<CopyRequest>,
) -> Result<StatusCode, ApiError> {
    require_bound(&handle, conn_id)?;
    key::sanitize_key(&request.source_key)?;
    key::validate_destination_key(&request.destination_key)?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel);
    with_timeout(state.config.data_timeout, async move {
        MutationService::move_object(
            &client,
            &bucket,
            &request.source_key,
            &request.destination_key,
            request.version_id.as_deref(),
        )
        .await
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/objects/{connId}/{bucket}/batch-copy`
pub async fn batch_copy(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Json(request): Json<BatchCopyRequest>,
) -> Result<Json<BatchCopyOutcome>, ApiError> {
    require_bound(&handle, conn_id)?;
    validate_operations(&request.operations)?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel.clone());
    let outcome = with_timeout(state.config.data_timeout, async move {
        MutationService::batch_copy(&client, &bucket, request.operations, &cancel).await
    })
    .await?;
    Ok(Json(outcome))
}

/// `POST /api/objects/{connId}/{bucket}/batch-move`
pub async fn batch_move(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Json(request): Json<BatchCopyRequest>,
) -> Result<Json<BatchCopyOutcome>, ApiError> {
    require_bound(&handle, conn_id)?;
    validate_operations(&request.operations)?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel.clone());
    let outcome = with_timeout(state.config.data_timeout, async move {
        MutationService::batch_move(&client, &bucket, request.operations, &cancel).await
    })
    .await?;
    Ok(Json(outcome))
}

/// Traversal-shaped batch input is rejected before any store call.
fn validate_operations(operations: &[CopyOperation]) -> Result<(), ApiError> {
    for op in operations {
        key::sanitize_key(&op.source_key)?;
        key::validate_destination_key(&op.destination_key)?;
    }
    Ok(())
}

#[cfg(feature = "seed-test-items")]
#[derive(Deserialize)]
pub struct SeedRequest {
    prefix: String,
}

#[cfg(feature = "seed-test-items")]
#[derive(serde::Serialize)]
pub struct SeedResponse {
    created: u64,
    prefix: String,
}

/// `POST /api/objects/{connId}/{bucket}/seed-test-items` — benchmark
/// seeding, only compiled with the `seed-test-items` feature.
#[cfg(feature = "seed-test-items")]
pub async fn seed_test_items(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Json(request): Json<SeedRequest>,
) -> Result<Json<SeedResponse>, ApiError> {
    require_bound(&handle, conn_id)?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel.clone());
    let prefix = request.prefix.clone();
    let created = with_timeout(state.config.data_timeout, async move {
        s3browser_s3::mutation::seeding::seed_test_items(
            &client,
            &bucket,
            &request.prefix,
            &cancel,
        )
        .await
    })
    .await?;
    Ok(Json(SeedResponse { created, prefix }))
}
