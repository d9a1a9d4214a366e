//! Shared identity -> window record storage.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use super::identity::Identity;
use super::record::{LimitSettings, WindowRecord};

/// In-memory map from identity to its window record.
///
/// Each record is only ever touched while its shard is write-locked, so the
/// limiter's prune-check-append and the janitor's prune-evict sequences never
/// interleave for the same identity.
#[derive(Debug, Default)]
pub struct RateLimitStore {
    records: DashMap<Identity, WindowRecord>,
}

/// Read-only view of one identity's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityStatus {
    pub identity: Identity,
    pub recent_requests: usize,
    pub remaining: u64,
    pub last_request: Option<i64>,
    pub requests: Vec<i64>,
    pub exhausted: bool,
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the identity's record, creating an
    /// empty one first seen at `now` if needed.
    ///
    /// The second argument to `f` is `true` when the record was just created.
    pub fn with_record<R>(
        &self,
        identity: &Identity,
        now: i64,
        f: impl FnOnce(&mut WindowRecord, bool) -> R,
    ) -> R {
        match self.records.entry(identity.clone()) {
            Entry::Occupied(mut entry) => f(entry.get_mut(), false),
            Entry::Vacant(entry) => {
                let mut record = entry.insert(WindowRecord::new(now));
                f(record.value_mut(), true)
            }
        }
    }

    /// Keep only the records for which `keep` returns `true`.
    pub fn retain(&self, mut keep: impl FnMut(&Identity, &mut WindowRecord) -> bool) {
        self.records.retain(|identity, record| keep(identity, record));
    }

    /// Copy of one identity's record.
    pub fn get(&self, identity: &str) -> Option<WindowRecord> {
        self.records.get(identity).map(|r| r.value().clone())
    }

    /// Insert or replace a record.
    pub fn insert(&self, identity: Identity, record: WindowRecord) {
        self.records.insert(identity, record);
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.records.contains_key(identity)
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Status of every identity as seen at `now`. Records are not modified.
    pub fn snapshot(&self, settings: &LimitSettings, now: i64) -> Vec<IdentityStatus> {
        let cutoff = settings.cutoff(now);
        let mut statuses: Vec<IdentityStatus> = self
            .records
            .iter()
            .map(|entry| {
                let requests = entry.value().recent(cutoff);
                let count = requests.len() as u64;
                IdentityStatus {
                    identity: entry.key().clone(),
                    recent_requests: requests.len(),
                    remaining: settings.limit.saturating_sub(count),
                    last_request: requests.iter().copied().max(),
                    exhausted: count >= settings.limit,
                    requests,
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.identity.as_str().cmp(b.identity.as_str()));
        statuses
    }
}
