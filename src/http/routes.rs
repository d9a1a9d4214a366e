//! Demonstration endpoints and the introspection endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::AppState;
use crate::error::ApiError;
use crate::ratelimit::{Identity, IdentityStatus, JanitorStats};

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub async fn index(Extension(identity): Extension<Identity>) -> Json<Value> {
    Json(json!({
        "message": "Welcome to the Rate Limited API!",
        "userId": identity,
        "timestamp": timestamp(),
    }))
}

pub async fn api_test() -> Json<Value> {
    Json(json!({
        "message": "This is a test endpoint",
        "data": {
            "random": rand::random::<f64>(),
            "timestamp": timestamp(),
        },
    }))
}

/// Echo a JSON body. A request without a JSON content type echoes `{}`.
pub async fn data(payload: Result<Json<Value>, JsonRejection>) -> Result<Json<Value>, ApiError> {
    let received = match payload {
        Ok(Json(value)) => value,
        Err(JsonRejection::MissingJsonContentType(_)) => json!({}),
        Err(JsonRejection::JsonSyntaxError(e)) => {
            debug!(error = %e, "Rejecting malformed JSON body");
            return Err(ApiError::InvalidJson(e.body_text()));
        }
        Err(JsonRejection::JsonDataError(e)) => return Err(ApiError::InvalidJson(e.body_text())),
        Err(other) => return Err(ApiError::Internal(other.body_text())),
    };

    Ok(Json(json!({
        "message": "Data received",
        "received": received,
        "timestamp": timestamp(),
    })))
}

pub async fn status() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "server": "Tollgate",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": timestamp(),
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Introspection payload.
#[derive(Debug, Serialize)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub window_ms: i64,
    pub identities: usize,
    pub janitor: Option<JanitorStats>,
    pub users: Vec<IdentityStatus>,
}

/// Current state of every tracked identity. Does not count as a request.
pub async fn rate_limit_status(State(state): State<AppState>) -> Json<RateLimitStatus> {
    let settings = state.limiter.settings();
    let users = state.limiter.snapshot(state.clock.now_millis());

    Json(RateLimitStatus {
        limit: settings.limit,
        window_ms: settings.window_ms,
        identities: users.len(),
        janitor: state.janitor.as_ref().map(|j| j.stats()),
        users,
    })
}
