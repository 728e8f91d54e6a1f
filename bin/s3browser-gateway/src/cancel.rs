//! Request-scoped cancellation
//!
//! Every request gets its own `CancellationToken`, cancelled when the
//! connection goes away: hyper drops the request future on disconnect,
//! the guard held across the handler drops with it, and the token
//! fires. Handlers pull the token from request extensions, thread it
//! through the long-running services, and wrap their store client so
//! in-flight S3 calls race the same signal.

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tokio_util::sync::CancellationToken;

/// Axum middleware inserting the per-request cancellation token.
pub async fn cancellation_layer(mut request: Request<Body>, next: Next) -> Response {
    let token = CancellationToken::new();
    request.extensions_mut().insert(token.clone());
    // Dropped when this future is dropped mid-flight (client went
    // away), which fires the token for anything still running.
    let _guard = token.drop_guard();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_dropped_guard_fires_token() {
        let token = CancellationToken::new();
        let handle = token.clone();
        let guard = token.drop_guard();
        assert!(!handle.is_cancelled());
        drop(guard);
        assert!(handle.is_cancelled());
        handle.cancelled().await;
    }
}
