//! Presigned download URLs and text preview

use super::{require_bound, with_timeout};
use crate::error::ApiError;
use crate::sessions::SessionHandle;
use crate::state::AppState;
use axum::Extension;
use axum::extract::{Json, Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use s3browser_common::types::DEFAULT_PRESIGN_TTL_SECS;
use s3browser_s3::CancellableClient;
use s3browser_s3::download::DownloadService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlQuery {
    key: String,
    ttl: Option<u64>,
    version_id: Option<String>,
}

#[derive(Serialize)]
pub struct UrlResponse {
    url: String,
}

#[derive(Deserialize)]
pub struct PreviewQuery {
    key: String,
}

/// `GET /api/download/{connId}/{bucket}/url`
pub async fn url(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<UrlResponse>, ApiError> {
    require_bound(&handle, conn_id)?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel);
    let ttl = query.ttl.unwrap_or(DEFAULT_PRESIGN_TTL_SECS);
    let url = with_timeout(state.config.control_timeout, async move {
        DownloadService::presign(
            &client,
            &bucket,
            &query.key,
            query.version_id.as_deref(),
            ttl,
        )
        .await
    })
    .await?;
    Ok(Json(UrlResponse { url }))
}

/// `GET /api/download/{connId}/{bucket}/preview` — plain-text body.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Extension(cancel): Extension<CancellationToken>,
    Path((conn_id, bucket)): Path<(i64, String)>,
    Query(query): Query<PreviewQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_bound(&handle, conn_id)?;
    let (client, _record) = state.factory.client_for(conn_id, Some(&bucket)).await?;
    let client = CancellableClient::new(client, cancel);
    let body = with_timeout(state.config.data_timeout, async move {
        DownloadService::preview(&client, &bucket, &query.key).await
    })
    .await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    ))
}
