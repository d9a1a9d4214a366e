//! Background eviction of idle window records.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::record::LimitSettings;
use super::store::RateLimitStore;

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// When the sweep ran (epoch ms)
    pub swept_at: i64,
    /// Records visited
    pub examined: usize,
    /// Records removed
    pub evicted: usize,
    /// Records left in the store
    pub remaining: usize,
}

/// Running totals published for introspection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JanitorStats {
    pub sweeps: u64,
    pub total_evicted: u64,
    pub last_sweep: Option<SweepReport>,
}

/// Prunes every record and evicts the ones idle for longer than a window.
#[derive(Debug, Clone)]
pub struct StoreJanitor {
    store: Arc<RateLimitStore>,
    settings: LimitSettings,
    stats: Arc<RwLock<JanitorStats>>,
}

impl StoreJanitor {
    pub fn new(store: Arc<RateLimitStore>, settings: LimitSettings) -> Self {
        Self {
            store,
            settings,
            stats: Arc::new(RwLock::new(JanitorStats::default())),
        }
    }

    /// Run one sweep as of `now` (epoch ms).
    ///
    /// A record is evicted when, after pruning, it holds no timestamps and
    /// its last admission is more than one window old.
    pub fn sweep(&self, now: i64) -> SweepReport {
        let cutoff = self.settings.cutoff(now);
        let window_ms = self.settings.window_ms;
        let mut examined = 0;
        let mut evicted = 0;

        self.store.retain(|identity, record| {
            examined += 1;
            record.prune(cutoff);
            if record.is_idle(now, window_ms) {
                debug!(identity = %identity, "Evicting idle window record");
                evicted += 1;
                false
            } else {
                true
            }
        });

        let report = SweepReport {
            swept_at: now,
            examined,
            evicted,
            remaining: self.store.len(),
        };

        let mut stats = self.stats.write();
        stats.sweeps += 1;
        stats.total_evicted += evicted as u64;
        stats.last_sweep = Some(report);

        report
    }

    /// Current totals.
    pub fn stats(&self) -> JanitorStats {
        self.stats.read().clone()
    }

    /// Start sweeping every `period`, reading time from `clock`.
    ///
    /// The first sweep happens one period after the call.
    pub fn spawn(self, period: Duration, clock: Arc<dyn Clock>) -> JanitorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval = ?period, "Store janitor started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.sweep(clock.now_millis());
                        debug!(
                            examined = report.examined,
                            evicted = report.evicted,
                            remaining = report.remaining,
                            "Sweep finished"
                        );
                    }
                    _ = &mut shutdown_rx => break,
                }
            }

            info!("Store janitor stopped");
        });

        JanitorHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Owner of a running janitor task.
///
/// Dropping the handle aborts the task; `shutdown` stops it cleanly.
#[derive(Debug)]
pub struct JanitorHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl JanitorHandle {
    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Store janitor task ended abnormally");
            }
        }
    }
}

impl Drop for JanitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{Identity, ManualClock, WindowRecord};

    const WINDOW_MS: i64 = 60_000;
    const NOW: i64 = 1_700_000_000_000;

    fn setup() -> (Arc<RateLimitStore>, StoreJanitor) {
        let store = Arc::new(RateLimitStore::new());
        let janitor = StoreJanitor::new(Arc::clone(&store), LimitSettings::new(5, WINDOW_MS));
        (store, janitor)
    }

    fn id(value: &str) -> Identity {
        Identity::new(value).unwrap()
    }

    #[test]
    fn test_evicts_idle_record() {
        let (store, janitor) = setup();
        store.insert(id("idle"), WindowRecord::new(NOW - WINDOW_MS - 1));

        let report = janitor.sweep(NOW);

        assert_eq!(report.evicted, 1);
        assert!(!store.contains("idle"));
    }

    #[test]
    fn test_keeps_recently_active_empty_record() {
        let (store, janitor) = setup();
        store.insert(id("recent"), WindowRecord::new(NOW - 10));

        let report = janitor.sweep(NOW);

        assert_eq!(report.evicted, 0);
        assert!(store.contains("recent"));
    }

    #[test]
    fn test_keeps_record_exactly_one_window_old() {
        let (store, janitor) = setup();
        store.insert(id("edge"), WindowRecord::new(NOW - WINDOW_MS));

        janitor.sweep(NOW);
        assert!(store.contains("edge"));
    }

    #[test]
    fn test_prunes_but_keeps_active_record() {
        let (store, janitor) = setup();
        let mut record = WindowRecord::new(0);
        record.admit(NOW - WINDOW_MS - 5);
        record.admit(NOW - 1_000);
        store.insert(id("active"), record);

        janitor.sweep(NOW);

        let record = store.get("active").unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.oldest(), Some(NOW - 1_000));
    }

    #[test]
    fn test_evicts_after_all_requests_age_out() {
        let (store, janitor) = setup();
        let mut record = WindowRecord::new(0);
        record.admit(NOW - WINDOW_MS - 5);
        store.insert(id("stale"), record);

        let report = janitor.sweep(NOW);

        assert_eq!(report.examined, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn test_stats_accumulate() {
        let (store, janitor) = setup();
        store.insert(id("a"), WindowRecord::new(0));
        janitor.sweep(NOW);
        store.insert(id("b"), WindowRecord::new(0));
        janitor.sweep(NOW);

        let stats = janitor.stats();
        assert_eq!(stats.sweeps, 2);
        assert_eq!(stats.total_evicted, 2);
        assert_eq!(stats.last_sweep.unwrap().swept_at, NOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_janitor_sweeps_on_interval() {
        let (store, janitor) = setup();
        let clock = Arc::new(ManualClock::new(NOW));
        store.insert(id("idle"), WindowRecord::new(NOW - WINDOW_MS - 1));

        let handle = janitor.clone().spawn(Duration::from_secs(60), clock);

        // Nothing happens before the first period elapses
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(store.contains("idle"));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!store.contains("idle"));
        assert_eq!(janitor.stats().sweeps, 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweeping() {
        let (store, janitor) = setup();
        let clock = Arc::new(ManualClock::new(NOW));

        let handle = janitor.clone().spawn(Duration::from_secs(60), clock);
        handle.shutdown().await;

        store.insert(id("idle"), WindowRecord::new(0));
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(store.contains("idle"));
        assert_eq!(janitor.stats().sweeps, 0);
    }
}
