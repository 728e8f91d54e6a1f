//! Login, logout and session introspection

use crate::auth_middleware::SESSION_COOKIE;
use crate::error::ApiError;
use crate::sessions::{SessionHandle, verify_password};
use crate::state::AppState;
use axum::Extension;
use axum::extract::{Json, State};
use axum::http::header::FORWARDED;
use axum::http::{HeaderMap, StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use s3browser_common::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Fixed delay added to failed logins; uniform regardless of where the
/// comparison diverged.
const FAILED_LOGIN_DELAY: Duration = Duration::from_millis(300);

#[derive(Deserialize)]
pub struct LoginRequest {
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    connection_id: Option<i64>,
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, StatusCode), ApiError> {
    if !verify_password(&state.login_password, request.password.as_bytes()) {
        tokio::time::sleep(FAILED_LOGIN_DELAY).await;
        return Err(ApiError(Error::unauthorized("invalid password")));
    }
    let session_id = state.sessions.create();
    info!("login succeeded, session created");
    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(request_is_https(&headers))
        .build();
    Ok((jar.add(cookie), StatusCode::NO_CONTENT))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    state.sessions.remove(&handle.id);
    let removal = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    (jar.remove(removal), StatusCode::NO_CONTENT)
}

/// `GET /api/auth/session`
pub async fn session(Extension(handle): Extension<SessionHandle>) -> Json<SessionResponse> {
    Json(SessionResponse {
        ok: true,
        connection_id: handle.connection_id,
    })
}

/// Whether the client-facing endpoint is https. The listener itself is
/// plain HTTP, so this is decided by what a TLS-terminating proxy in
/// front reports: `X-Forwarded-Proto` first, then RFC 7239 `Forwarded`.
fn request_is_https(headers: &HeaderMap) -> bool {
    if let Some(proto) = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
    {
        return proto.trim().eq_ignore_ascii_case("https");
    }
    headers
        .get(FORWARDED)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|forwarded| {
            forwarded
                .split([';', ','])
                .filter_map(|pair| pair.trim().split_once('='))
                .any(|(name, value)| {
                    name.eq_ignore_ascii_case("proto")
                        && value.trim_matches('"').eq_ignore_ascii_case("https")
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_no_proxy_headers_is_http() {
        assert!(!request_is_https(&headers(&[])));
    }

    #[test]
    fn test_x_forwarded_proto() {
        assert!(request_is_https(&headers(&[("x-forwarded-proto", "https")])));
        assert!(request_is_https(&headers(&[(
            "x-forwarded-proto",
            "https, http"
        )])));
        assert!(!request_is_https(&headers(&[("x-forwarded-proto", "http")])));
    }

    #[test]
    fn test_x_forwarded_proto_wins_over_forwarded() {
        assert!(!request_is_https(&headers(&[
            ("x-forwarded-proto", "http"),
            ("forwarded", "proto=https"),
        ])));
    }

    #[test]
    fn test_forwarded_header() {
        assert!(request_is_https(&headers(&[(
            "forwarded",
            "for=203.0.113.7;proto=https;by=203.0.113.43"
        )])));
        assert!(request_is_https(&headers(&[(
            "forwarded",
            "proto=\"https\""
        )])));
        assert!(!request_is_https(&headers(&[(
            "forwarded",
            "for=203.0.113.7;proto=http"
        )])));
    }
}
