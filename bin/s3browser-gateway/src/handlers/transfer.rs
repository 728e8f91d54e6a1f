//! Upload proxy endpoints: single PUT and the multipart lifecycle
//!
//! Clients are wrapped in [`CancellableClient`] so a dropped connection
//! aborts the in-flight store call; parts in flight are never retried
//! server-side.

use super::{blob_from_body, content_length, require_bound, with_timeout};
use crate::error::ApiError;
use crate::sessions::SessionHandle;
use crate::state::AppState;
use axum::Extension;
use axum::body::Body;
use axum::extract::{Json, Query, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use s3browser_common::key;
use s3browser_s3::CancellableClient;
use s3browser_s3::upload::{PartEtag, UploadService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    conn_id: i64,
    bucket: String,
    key: String,
    content_type: Option<String>,
    file_size: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    upload_id: String,
    key: String,
    part_size: u64,
    total_parts: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartQuery {
    conn_id: i64,
    bucket: String,
    upload_id: String,
    key: String,
    part_number: i32,
}

#[derive(Serialize)]
pub struct PartResponse {
    etag: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartEtagDto {
    part_number: i32,
    etag: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    conn_id: i64,
    bucket: String,
    upload_id: String,
    key: String,
    parts: Vec<PartEtagDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortRequest {
    conn_id: i64,
    bucket: String,
    upload_id: String,
    key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleQuery {
    conn_id: i64,
    bucket: String,
    key: String,
}

/// `POST /api/upload/initiate`
pub async fn initiate(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Json(request): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>, ApiError> {
    require_bound(&handle, request.conn_id)?;
    key::sanitize_key(&request.key)?;
    let (client, _record) = state
        .factory
        .client_for(request.conn_id, Some(&request.bucket))
        .await?;
    let client = CancellableClient::new(client, cancel);
    let outcome = with_timeout(state.config.control_timeout, async {
        state
            .uploads
            .initiate(
                &client,
                request.conn_id,
                &request.bucket,
                &request.key,
                request.content_type.as_deref(),
                request.file_size,
            )
            .await
    })
    .await?;
    Ok(Json(InitiateResponse {
        upload_id: outcome.upload_id,
        key: outcome.key,
        part_size: outcome.part_size,
        total_parts: outcome.total_parts,
    }))
}

/// `POST /api/upload/part` — raw part bytes, streamed through.
pub async fn part(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Query(query): Query<PartQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<PartResponse>, ApiError> {
    require_bound(&handle, query.conn_id)?;
    key::sanitize_key(&query.key)?;
    let len = content_length(&headers)?;
    let (client, _record) = state
        .factory
        .client_for(query.conn_id, Some(&query.bucket))
        .await?;
    let client = CancellableClient::new(client, cancel);
    let blob = blob_from_body(body, len);
    let etag = with_timeout(state.config.data_timeout, async {
        state
            .uploads
            .upload_part(
                &client,
                query.conn_id,
                &query.upload_id,
                &query.key,
                query.part_number,
                blob,
            )
            .await
    })
    .await?;
    Ok(Json(PartResponse { etag }))
}

/// `POST /api/upload/complete`
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    require_bound(&handle, request.conn_id)?;
    let (client, _record) = state
        .factory
        .client_for(request.conn_id, Some(&request.bucket))
        .await?;
    let client = CancellableClient::new(client, cancel);
    let parts = request
        .parts
        .into_iter()
        .map(|part| PartEtag {
            part_number: part.part_number,
            etag: part.etag,
        })
        .collect();
    with_timeout(state.config.data_timeout, async {
        state
            .uploads
            .complete(
                &client,
                request.conn_id,
                &request.upload_id,
                &request.key,
                parts,
            )
            .await
    })
    .await?;
    Ok(Json(TransferResponse {
        success: true,
        key: Some(request.key),
    }))
}

/// `POST /api/upload/abort`
pub async fn abort(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Json(request): Json<AbortRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    require_bound(&handle, request.conn_id)?;
    let (client, _record) = state
        .factory
        .client_for(request.conn_id, Some(&request.bucket))
        .await?;
    let client = CancellableClient::new(client, cancel);
    with_timeout(state.config.control_timeout, async {
        state
            .uploads
            .abort(&client, request.conn_id, &request.upload_id, &request.key)
            .await
    })
    .await?;
    Ok(Json(TransferResponse {
        success: true,
        key: None,
    }))
}

/// `POST /api/upload/single` — whole object in one streamed PUT; the
/// request Content-Type passes through to the store.
pub async fn single(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Query(query): Query<SingleQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<TransferResponse>, ApiError> {
    require_bound(&handle, query.conn_id)?;
    key::sanitize_key(&query.key)?;
    let len = content_length(&headers)?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let (client, _record) = state
        .factory
        .client_for(query.conn_id, Some(&query.bucket))
        .await?;
    let client = CancellableClient::new(client, cancel);
    let blob = blob_from_body(body, len);
    let key = with_timeout(state.config.data_timeout, async {
        UploadService::put_single(
            &client,
            &query.bucket,
            &query.key,
            content_type.as_deref(),
            blob,
        )
        .await
    })
    .await?;
    Ok(Json(TransferResponse {
        success: true,
        key: Some(key),
    }))
}
