//! Core sliding-window limiter.

use std::sync::Arc;
use tracing::{debug, trace};

use super::identity::Identity;
use super::record::{ceil_seconds, LimitSettings};
use super::store::{IdentityStatus, RateLimitStore};

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Configured quota per window
    pub limit: u64,
    /// Admissions left in the current window
    pub remaining: u64,
    /// Seconds until the oldest tracked request leaves the window
    pub reset_seconds: i64,
}

/// The limiter that owns decision logic over a shared store.
///
/// Cheap to share behind an `Arc`; all mutation goes through the store's
/// per-identity locking.
#[derive(Debug)]
pub struct WindowLimiter {
    store: Arc<RateLimitStore>,
    settings: LimitSettings,
}

impl WindowLimiter {
    /// Create a limiter with its own empty store.
    pub fn new(settings: LimitSettings) -> Self {
        Self::with_store(settings, Arc::new(RateLimitStore::new()))
    }

    /// Create a limiter over an existing store.
    pub fn with_store(settings: LimitSettings, store: Arc<RateLimitStore>) -> Self {
        Self { store, settings }
    }

    /// Decide whether `identity` may make a request at `now` (epoch ms).
    ///
    /// Admission appends `now` to the record and refreshes its last activity.
    /// Rejection leaves the record as it was apart from pruning.
    pub fn evaluate(&self, identity: &Identity, now: i64) -> Decision {
        let settings = self.settings;
        let cutoff = settings.cutoff(now);

        let decision = self.store.with_record(identity, now, |record, created| {
            if created {
                debug!(
                    identity = %identity,
                    limit = settings.limit,
                    window_ms = settings.window_ms,
                    "Creating new window record"
                );
            }

            record.prune(cutoff);

            if record.len() as u64 >= settings.limit {
                let oldest = record.oldest().unwrap_or(now);
                return Decision {
                    admitted: false,
                    limit: settings.limit,
                    remaining: 0,
                    reset_seconds: ceil_seconds(oldest + settings.window_ms - now),
                };
            }

            record.admit(now);
            let oldest = record.oldest().unwrap_or(now);
            Decision {
                admitted: true,
                limit: settings.limit,
                remaining: settings.limit.saturating_sub(record.len() as u64),
                reset_seconds: ceil_seconds(oldest + settings.window_ms - now).max(1),
            }
        });

        trace!(
            identity = %identity,
            admitted = decision.admitted,
            remaining = decision.remaining,
            reset_seconds = decision.reset_seconds,
            "Evaluated request"
        );

        if !decision.admitted {
            debug!(
                identity = %identity,
                limit = settings.limit,
                reset_seconds = decision.reset_seconds,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Read-only status of every tracked identity at `now`.
    pub fn snapshot(&self, now: i64) -> Vec<IdentityStatus> {
        self.store.snapshot(&self.settings, now)
    }

    pub fn settings(&self) -> LimitSettings {
        self.settings
    }

    /// The store this limiter writes to.
    pub fn store(&self) -> &Arc<RateLimitStore> {
        &self.store
    }

    /// Number of tracked identities.
    pub fn identity_count(&self) -> usize {
        self.store.len()
    }
}
