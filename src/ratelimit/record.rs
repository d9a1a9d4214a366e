//! Per-identity sliding window state.

use std::collections::VecDeque;

/// Quota shared by every identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSettings {
    /// Maximum admitted requests per window
    pub limit: u64,
    /// Window length in milliseconds
    pub window_ms: i64,
}

impl LimitSettings {
    pub fn new(limit: u64, window_ms: i64) -> Self {
        Self { limit, window_ms }
    }

    /// Timestamps at or before this instant are outside the window ending at `now`.
    pub fn cutoff(&self, now: i64) -> i64 {
        now - self.window_ms
    }
}

/// Recent admissions for one identity.
///
/// `requests` holds the epoch-millisecond timestamps of admitted requests.
/// Entries are pruned lazily, right before they are read.
#[derive(Debug, Clone)]
pub struct WindowRecord {
    requests: VecDeque<i64>,
    last_activity: i64,
}

impl WindowRecord {
    /// Create an empty record first seen at `now`.
    pub fn new(now: i64) -> Self {
        Self {
            requests: VecDeque::new(),
            last_activity: now,
        }
    }

    /// Drop every timestamp `t <= cutoff`.
    ///
    /// Returns the number of timestamps removed.
    pub fn prune(&mut self, cutoff: i64) -> usize {
        let before = self.requests.len();
        self.requests.retain(|&t| t > cutoff);
        before - self.requests.len()
    }

    /// Record an admission at `now`.
    pub fn admit(&mut self, now: i64) {
        self.requests.push_back(now);
        self.last_activity = now;
    }

    /// Number of tracked timestamps.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Earliest tracked timestamp.
    pub fn oldest(&self) -> Option<i64> {
        self.requests.iter().copied().min()
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity
    }

    /// Timestamps still inside the window, without pruning.
    pub fn recent(&self, cutoff: i64) -> Vec<i64> {
        self.requests.iter().copied().filter(|&t| t > cutoff).collect()
    }

    /// Whether the janitor may drop this record.
    ///
    /// Only meaningful after `prune`.
    pub fn is_idle(&self, now: i64, window_ms: i64) -> bool {
        self.requests.is_empty() && now - self.last_activity > window_ms
    }
}

/// Whole seconds until `ms` milliseconds have passed, rounded up.
pub(crate) fn ceil_seconds(ms: i64) -> i64 {
    ms.div_euclid(1000) + i64::from(ms.rem_euclid(1000) > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_empty() {
        let record = WindowRecord::new(500);

        assert!(record.is_empty());
        assert_eq!(record.last_activity(), 500);
        assert_eq!(record.oldest(), None);
    }

    #[test]
    fn test_prune_removes_timestamps_at_cutoff() {
        let mut record = WindowRecord::new(0);
        record.admit(100);
        record.admit(200);
        record.admit(300);

        // Boundary is inclusive: t <= cutoff goes
        assert_eq!(record.prune(200), 2);
        assert_eq!(record.len(), 1);
        assert_eq!(record.oldest(), Some(300));
    }

    #[test]
    fn test_admit_updates_last_activity() {
        let mut record = WindowRecord::new(0);
        record.admit(1_234);

        assert_eq!(record.last_activity(), 1_234);
        assert_eq!(record.len(), 1);
        assert_eq!(record.oldest(), Some(1_234));
    }

    #[test]
    fn test_recent_does_not_mutate() {
        let mut record = WindowRecord::new(0);
        record.admit(10);
        record.admit(20);

        assert_eq!(record.recent(10), vec![20]);
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_is_idle() {
        let record = WindowRecord::new(1_000);

        assert!(!record.is_idle(1_000 + 60_000, 60_000));
        assert!(record.is_idle(1_000 + 60_001, 60_000));
    }

    #[test]
    fn test_ceil_seconds() {
        assert_eq!(ceil_seconds(60_000), 60);
        assert_eq!(ceil_seconds(59_001), 60);
        assert_eq!(ceil_seconds(1), 1);
        assert_eq!(ceil_seconds(0), 0);
        assert_eq!(ceil_seconds(-1), 0);
        assert_eq!(ceil_seconds(-1_500), -1);
    }
}
