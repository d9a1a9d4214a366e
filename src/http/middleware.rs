//! Axum middleware binding the limiter to HTTP requests.

use std::panic::AssertUnwindSafe;

use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use tracing::warn;

use super::AppState;
use crate::error::ApiError;
use crate::ratelimit::{Decision, ResolvedIdentity};

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const USER_ID: HeaderName = HeaderName::from_static("x-user-id");

/// Resolve the caller, evaluate the request and annotate the response.
///
/// Admitted requests carry their `Identity` in request extensions. Rejected
/// requests get a 429 and never reach the inner service.
pub async fn rate_limit(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let resolved = state.resolver.resolve_headers(request.headers());
    let decision = state
        .limiter
        .evaluate(&resolved.identity, state.clock.now_millis());

    let mut response = if decision.admitted {
        request.extensions_mut().insert(resolved.identity.clone());
        next.run(request).await
    } else {
        ApiError::RateLimited.into_response()
    };

    let headers = response.headers_mut();
    apply_decision(headers, &decision);
    if resolved.is_new {
        issue_identity(&state, headers, &resolved);
    }

    response
}

/// Write the quota headers for `decision`.
pub fn apply_decision(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(decision.reset_seconds));
}

fn issue_identity(state: &AppState, headers: &mut HeaderMap, resolved: &ResolvedIdentity) {
    let cookie = state.resolver.cookie_for(&resolved.identity);
    match (
        HeaderValue::from_str(&cookie.to_string()),
        HeaderValue::from_str(resolved.identity.as_str()),
    ) {
        (Ok(cookie), Ok(identity)) => {
            headers.append(SET_COOKIE, cookie);
            headers.insert(USER_ID, identity);
        }
        _ => warn!(identity = %resolved.identity, "Issued identity is not a valid header value"),
    }
}

/// Turn a panic anywhere further down the stack into a 500.
pub async fn catch_panic(request: Request, next: Next) -> Response {
    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            ApiError::Internal(detail).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn test_apply_decision_headers() {
        let mut headers = HeaderMap::new();
        let decision = Decision {
            admitted: true,
            limit: 5,
            remaining: 3,
            reset_seconds: 42,
        };

        apply_decision(&mut headers, &decision);

        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "3");
        assert_eq!(headers.get("x-ratelimit-reset").unwrap(), "42");
    }

    #[tokio::test]
    async fn test_catch_panic_returns_internal_error() {
        let app = Router::new()
            .route("/boom", get(|| async {
                if true {
                    panic!("kaboom");
                }
                StatusCode::OK
            }))
            .layer(axum::middleware::from_fn(catch_panic));

        let request = axum::http::Request::builder()
            .uri("/boom")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal_server_error");
        assert!(!body.to_string().contains("kaboom"));
    }
}
