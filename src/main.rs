use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{LoggingConfig, TollgateConfig};
use tollgate::http::{self, AppState, HttpServer};
use tollgate::ratelimit::{
    Clock, IdentityResolver, RateLimitStore, StoreJanitor, SystemClock, WindowLimiter,
};

#[derive(Parser, Debug)]
#[command(name = "tollgate", version)]
#[command(about = "Per-identity sliding-window rate limiter for HTTP APIs")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding configuration
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TollgateConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(&config.logging);

    info!("Starting Tollgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        limit = config.rate_limiting.limit,
        window_sec = config.rate_limiting.window_sec,
        environment = %config.server.environment,
        "Configuration loaded"
    );

    let settings = config.rate_limiting.settings();
    let store = Arc::new(RateLimitStore::new());
    let limiter = Arc::new(WindowLimiter::with_store(settings, Arc::clone(&store)));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let janitor = StoreJanitor::new(store, settings);
    let janitor_handle = janitor
        .clone()
        .spawn(config.rate_limiting.sweep_interval(), Arc::clone(&clock));

    let resolver = IdentityResolver::new(config.server.is_production());
    let state = AppState::new(limiter, resolver, clock).with_janitor(janitor);
    let app = http::router(state, config.server.introspection);

    // Run the server with graceful shutdown on Ctrl+C
    let result = HttpServer::new(config.server.listen_addr(), app)
        .serve_with_shutdown(shutdown_signal())
        .await;

    janitor_handle.shutdown().await;
    result?;

    info!("Tollgate stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
