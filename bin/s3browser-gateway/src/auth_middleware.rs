//! Session-cookie middleware
//!
//! Every route except the health check and the login endpoint requires a
//! valid session cookie. Authentication slides the session expiry and
//! leaves a [`SessionHandle`] in the request extensions for handlers.

use crate::error::ApiError;
use crate::sessions::SessionHandle;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "s3browser_session";

/// Paths served without a session.
fn is_public(method: &Method, path: &str) -> bool {
    path == "/health" || (*method == Method::POST && path == "/api/auth/login")
}

/// Axum middleware enforcing the session requirement.
pub async fn session_layer(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if is_public(request.method(), request.uri().path()) {
        return Ok(next.run(request).await);
    }
    let cookie = jar
        .get(SESSION_COOKIE)
        .ok_or_else(|| ApiError::unauthorized("missing session cookie"))?;
    let handle: SessionHandle = state
        .sessions
        .authenticate(cookie.value())
        .ok_or_else(|| ApiError::unauthorized("session is expired or unknown"))?;
    request.extensions_mut().insert(handle);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public(&Method::GET, "/health"));
        assert!(is_public(&Method::POST, "/api/auth/login"));
        assert!(!is_public(&Method::GET, "/api/auth/login"));
        assert!(!is_public(&Method::GET, "/api/connections"));
        assert!(!is_public(&Method::POST, "/api/auth/logout"));
    }
}
