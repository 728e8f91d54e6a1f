//! Router assembly
//!
//! The `/api` surface maps one route per endpoint onto the handler
//! modules. Raw-body upload routes opt out of the default body limit;
//! the 5 GiB bound is enforced by the upload service against the
//! declared Content-Length instead.

use crate::auth_middleware::session_layer;
use crate::cancel::cancellation_layer;
use crate::handlers::{auth, connections, download, objects, transfer};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router, middleware};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// JSON bodies (including large batch-delete lists) stay well under
/// this.
const JSON_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Liveness probe, served without a session.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        // Auth and profiles
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/session", get(auth::session))
        .route("/auth/export/{id}", get(connections::export_profile))
        .route("/connections", get(connections::list).post(connections::save))
        .route("/connections/{id}", delete(connections::remove))
        .route("/connections/{id}/bind", post(connections::bind))
        // Buckets and objects
        .route("/buckets/{conn_id}", get(objects::buckets))
        .route("/bucket/{conn_id}/{bucket}/info", get(objects::bucket_info))
        .route(
            "/objects/{conn_id}/{bucket}",
            get(objects::list).delete(objects::remove),
        )
        .route("/objects/{conn_id}/{bucket}/metadata", get(objects::metadata))
        .route(
            "/objects/{conn_id}/{bucket}/batch-delete",
            post(objects::batch_delete),
        )
        .route("/objects/{conn_id}/{bucket}/folder", post(objects::create_folder))
        .route("/objects/{conn_id}/{bucket}/copy", post(objects::copy))
        .route(
            "/objects/{conn_id}/{bucket}/batch-copy",
            post(objects::batch_copy),
        )
        .route("/objects/{conn_id}/{bucket}/move", post(objects::rename))
        .route(
            "/objects/{conn_id}/{bucket}/batch-move",
            post(objects::batch_move),
        )
        // Downloads
        .route("/download/{conn_id}/{bucket}/url", get(download::url))
        .route("/download/{conn_id}/{bucket}/preview", get(download::preview))
        // Uploads; raw-body routes stream and skip the body limit
        .route("/upload/initiate", post(transfer::initiate))
        .route(
            "/upload/part",
            post(transfer::part).layer(DefaultBodyLimit::disable()),
        )
        .route("/upload/complete", post(transfer::complete))
        .route("/upload/abort", post(transfer::abort))
        .route(
            "/upload/single",
            post(transfer::single).layer(DefaultBodyLimit::disable()),
        );

    #[cfg(feature = "seed-test-items")]
    let api = api.route(
        "/objects/{conn_id}/{bucket}/seed-test-items",
        post(objects::seed_test_items),
    );

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            session_layer,
        ))
        .layer(middleware::from_fn(cancellation_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
