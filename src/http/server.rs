//! HTTP server implementation.

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{Result, TollgateError};

/// HTTP server for the rate limited API.
pub struct HttpServer {
    /// Address to bind to
    addr: String,
    /// The fully layered application router
    router: Router,
}

impl HttpServer {
    pub fn new(addr: impl Into<String>, router: Router) -> Self {
        Self {
            addr: addr.into(),
            router,
        }
    }

    /// Bind and serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            TollgateError::Io(e)
        })?;

        info!(addr = %listener.local_addr()?, "HTTP server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                TollgateError::Io(e)
            })
    }
}
