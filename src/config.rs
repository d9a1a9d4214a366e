//! Configuration management for Tollgate.
//!
//! Sources are layered in this order, later ones winning:
//! built-in defaults, an optional YAML file, `TOLLGATE__SECTION__KEY`
//! environment variables, and finally the flat legacy variables
//! (`RATE_LIMIT`, `RATE_WINDOW_SEC`, `RATE_SWEEP_INTERVAL_SEC`, `PORT`, `APP_ENV`).
//! `NODE_ENV` is read as the environment name when `APP_ENV` is unset.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TollgateError};
use crate::ratelimit::LimitSettings;

/// Flat environment variables and the config keys they override.
const LEGACY_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("RATE_LIMIT", "rate_limiting.limit"),
    ("RATE_WINDOW_SEC", "rate_limiting.window_sec"),
    ("RATE_SWEEP_INTERVAL_SEC", "rate_limiting.sweep_interval_sec"),
    ("PORT", "server.port"),
    ("APP_ENV", "server.environment"),
];

/// Fallback for `APP_ENV`.
const ENVIRONMENT_ALIAS: &str = "NODE_ENV";

/// Longest accepted window or sweep interval (one year).
pub const MAX_INTERVAL_SEC: u64 = 365 * 24 * 60 * 60;

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment name; `production` marks identity cookies `Secure`
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Expose the read-only `/api/rate-limit/status` endpoint
    #[serde(default = "default_introspection")]
    pub introspection: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            introspection: default_introspection(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_introspection() -> bool {
    true
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum admitted requests per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds
    #[serde(default = "default_window_sec")]
    pub window_sec: u64,

    /// Interval between janitor sweeps in seconds
    #[serde(default = "default_sweep_interval_sec")]
    pub sweep_interval_sec: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_sec: default_window_sec(),
            sweep_interval_sec: default_sweep_interval_sec(),
        }
    }
}

impl RateLimitingConfig {
    /// Limit settings shared by the limiter and the janitor.
    ///
    /// The window is clamped to `MAX_INTERVAL_SEC`; `validate` rejects
    /// anything longer.
    pub fn settings(&self) -> LimitSettings {
        let window_ms = self.window_ms().unwrap_or(MAX_INTERVAL_SEC as i64 * 1000);
        LimitSettings::new(self.limit, window_ms)
    }

    /// Window length in milliseconds, if it is within bounds.
    pub fn window_ms(&self) -> Option<i64> {
        if self.window_sec > MAX_INTERVAL_SEC {
            return None;
        }
        self.window_sec
            .checked_mul(1000)
            .and_then(|ms| i64::try_from(ms).ok())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_sec.min(MAX_INTERVAL_SEC))
    }
}

fn default_limit() -> u64 {
    5
}

fn default_window_sec() -> u64 {
    60
}

fn default_sweep_interval_sec() -> u64 {
    60
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl TollgateConfig {
    /// Load configuration from the optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(path, env)
    }

    /// Load configuration using an explicit environment map instead of the
    /// process environment.
    pub fn load_with_env(path: Option<&Path>, env: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Yaml));
        }

        builder = builder.add_source(
            Environment::with_prefix("TOLLGATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        let legacy = |var: &str| {
            env.get(var)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        for (var, key) in LEGACY_ENV_OVERRIDES {
            let value = match *var {
                "APP_ENV" => legacy(*var).or_else(|| legacy(ENVIRONMENT_ALIAS)),
                _ => legacy(*var),
            };
            builder = builder.set_override_option(*key, value)?;
        }

        let config: TollgateConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.limit == 0 {
            return Err(TollgateError::InvalidSetting {
                key: "rate_limiting.limit",
                reason: "must be a positive integer".to_string(),
            });
        }
        if self.rate_limiting.window_sec == 0 {
            return Err(TollgateError::InvalidSetting {
                key: "rate_limiting.window_sec",
                reason: "must be a positive integer".to_string(),
            });
        }
        if self.rate_limiting.window_ms().is_none() {
            return Err(TollgateError::InvalidSetting {
                key: "rate_limiting.window_sec",
                reason: format!("must not exceed {} seconds", MAX_INTERVAL_SEC),
            });
        }
        if self.rate_limiting.sweep_interval_sec == 0 {
            return Err(TollgateError::InvalidSetting {
                key: "rate_limiting.sweep_interval_sec",
                reason: "must be a positive integer".to_string(),
            });
        }
        if self.rate_limiting.sweep_interval_sec > MAX_INTERVAL_SEC {
            return Err(TollgateError::InvalidSetting {
                key: "rate_limiting.sweep_interval_sec",
                reason: format!("must not exceed {} seconds", MAX_INTERVAL_SEC),
            });
        }
        Ok(())
    }
}
