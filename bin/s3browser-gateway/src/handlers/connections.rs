//! Connection profile management and export

use crate::error::ApiError;
use crate::export::{self, ExportFormat};
use crate::sessions::SessionHandle;
use crate::state::AppState;
use axum::Extension;
use axum::extract::{Json, Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use s3browser_common::types::ConnectionRecord;
use s3browser_vault::SaveConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Deserialize)]
pub struct SaveConnectionRequest {
    pub id: Option<i64>,
    pub profile_name: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    #[serde(default = "default_auto_detect")]
    pub auto_detect_region: bool,
}

const fn default_auto_detect() -> bool {
    true
}

#[derive(Serialize)]
pub struct DeleteResponse {
    deleted: bool,
}

#[derive(Serialize)]
pub struct BindResponse {
    ok: bool,
}

#[derive(Deserialize)]
pub struct ExportQuery {
    format: String,
    bucket: Option<String>,
}

#[derive(Serialize)]
pub struct ExportResponse {
    filename: String,
    content: String,
}

/// `GET /api/connections`
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConnectionRecord>>, ApiError> {
    Ok(Json(state.vault.list_connections()?))
}

/// `POST /api/connections` — insert or update a profile.
pub async fn save(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveConnectionRequest>,
) -> Result<Json<ConnectionRecord>, ApiError> {
    let record = state.vault.save_connection(SaveConnection {
        id: request.id,
        profile_name: request.profile_name,
        endpoint: request.endpoint,
        access_key_id: request.access_key_id,
        secret: request.secret,
        bucket: request.bucket,
        region: request.region,
        auto_detect_region: request.auto_detect_region,
    })?;
    if request.id.is_some() {
        // Cached clients may hold the old endpoint or credentials.
        state.factory.invalidate_connection(record.id);
    }
    info!(id = record.id, profile = %record.profile_name, "saved connection");
    Ok(Json(record))
}

/// `DELETE /api/connections/{id}`
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = state.vault.delete_connection(id)?;
    if deleted {
        state.factory.invalidate_connection(id);
        state.sessions.unbind_connection(id);
        info!(id, "deleted connection");
    }
    Ok(Json(DeleteResponse { deleted }))
}

/// `POST /api/connections/{id}/bind` — make the profile the session's
/// active connection.
pub async fn bind(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Path(id): Path<i64>,
) -> Result<Json<BindResponse>, ApiError> {
    // Fails with NotFound before touching the session.
    let record = state.vault.get_connection(id)?;
    state.vault.touch(record.id)?;
    state.sessions.bind_connection(&handle.id, record.id);
    // A fresh bucket-selection flow starts from a clean slate.
    state.factory.clear_region_cache();
    info!(id, "bound connection to session");
    Ok(Json(BindResponse { ok: true }))
}

/// `GET /api/auth/export/{id}?format=aws|rclone&bucket=…`
pub async fn export_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let format = ExportFormat::parse(&query.format)?;
    let record = state.vault.get_connection(id)?;
    let secret = state.vault.decrypt_secret(id)?;
    let file = export::render(format, &record, &secret, query.bucket.as_deref());
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(ExportResponse {
            filename: file.filename,
            content: file.content,
        }),
    ))
}
