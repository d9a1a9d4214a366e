//! HTTP surface: shared state, router and server.

mod middleware;
mod routes;
mod server;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

pub use middleware::{apply_decision, catch_panic, rate_limit};
pub use routes::RateLimitStatus;
pub use server::HttpServer;

use crate::ratelimit::{Clock, IdentityResolver, StoreJanitor, WindowLimiter};

/// State shared by the middleware and the handlers.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<WindowLimiter>,
    pub resolver: IdentityResolver,
    pub clock: Arc<dyn Clock>,
    /// Present when a janitor runs over the limiter's store
    pub janitor: Option<StoreJanitor>,
}

impl AppState {
    pub fn new(limiter: Arc<WindowLimiter>, resolver: IdentityResolver, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter,
            resolver,
            clock,
            janitor: None,
        }
    }

    pub fn with_janitor(mut self, janitor: StoreJanitor) -> Self {
        self.janitor = Some(janitor);
        self
    }
}

/// Build the application router.
///
/// Every route, including the 404 fallback, sits behind the limiter. The
/// introspection route, when enabled, does not.
pub fn router(state: AppState, introspection: bool) -> Router {
    let limited = Router::new()
        .route("/", get(routes::index))
        .route("/api/test", get(routes::api_test))
        .route("/api/data", post(routes::data))
        .route("/api/status", get(routes::status))
        .fallback(routes::not_found)
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit));

    let mut app = Router::new();
    if introspection {
        app = app.route("/api/rate-limit/status", get(routes::rate_limit_status));
    }

    app.merge(limited)
        .layer(axum::middleware::from_fn(catch_panic))
        .with_state(state)
}
