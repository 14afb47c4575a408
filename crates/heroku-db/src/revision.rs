//! Rolling log of known-good store snapshots used for rollback

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::guard;
use crate::store::Store;

/// Immutable deep copy of the whole store
#[derive(Debug, Clone)]
pub struct Revision {
    /// Wall-clock time the copy was taken
    pub taken_at: DateTime<Utc>,

    store: Store,
}

impl Revision {
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }
}

/// Bounded revision log, oldest first
#[derive(Debug)]
pub struct RevisionLog {
    revisions: VecDeque<Revision>,
    capacity: usize,
    interval: Duration,
    next_allowed: Option<Instant>,
}

impl RevisionLog {
    pub fn new(capacity: usize, interval: Duration) -> Self {
        Self {
            revisions: VecDeque::with_capacity(capacity),
            capacity,
            interval,
            next_allowed: None,
        }
    }

    /// Take a revision if the snapshot window is open at `now`.
    ///
    /// Returns whether a revision was taken.
    pub fn maybe_snapshot(&mut self, store: &Store, now: Instant) -> bool {
        if matches!(self.next_allowed, Some(next) if now < next) {
            return false;
        }

        self.revisions.push_back(Revision {
            taken_at: Utc::now(),
            store: store.clone(),
        });
        self.next_allowed = Some(now + self.interval);

        while self.revisions.len() > self.capacity {
            self.revisions.pop_front();
        }
        true
    }

    /// Pop revisions newest first until one passes the guard.
    ///
    /// Revisions that only needed broken owners dropped are accepted in their
    /// repaired form. `None` means the log is exhausted.
    pub fn recover(&mut self) -> Option<Revision> {
        while let Some(mut revision) = self.revisions.pop_back() {
            let report = guard::autofix(&mut revision.store);
            if report.is_usable() {
                tracing::warn!(
                    "Restoring database from revision taken at {} ({} left)",
                    revision.taken_at,
                    self.revisions.len()
                );
                return Some(revision);
            }
            tracing::warn!(
                "Revision taken at {} is broken as well, trying an older one",
                revision.taken_at
            );
        }
        None
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn latest(&self) -> Option<&Revision> {
        self.revisions.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.iter()
    }

    /// Drop every revision; the next snapshot window opens immediately
    pub fn clear(&mut self) {
        self.revisions.clear();
        self.next_allowed = None;
    }

    #[cfg(test)]
    pub(crate) fn push_unchecked(&mut self, store: Store) {
        self.revisions.push_back(Revision {
            taken_at: Utc::now(),
            store,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(n: i64) -> Store {
        let mut store = Store::new();
        store.insert("mod", "n", json!(n));
        store
    }

    fn deep_value() -> serde_json::Value {
        let mut value = json!(0);
        for _ in 0..guard::MAX_VALUE_DEPTH + 1 {
            value = json!([value]);
        }
        value
    }

    #[test]
    fn test_first_snapshot_is_always_taken() {
        let mut log = RevisionLog::new(15, Duration::from_secs(3));
        assert!(log.maybe_snapshot(&store_with(1), Instant::now()));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_snapshots_are_spaced_by_interval() {
        let mut log = RevisionLog::new(15, Duration::from_secs(3));
        let t0 = Instant::now();

        assert!(log.maybe_snapshot(&store_with(1), t0));
        assert!(!log.maybe_snapshot(&store_with(2), t0 + Duration::from_secs(1)));
        assert!(!log.maybe_snapshot(&store_with(3), t0 + Duration::from_millis(2999)));
        assert!(log.maybe_snapshot(&store_with(4), t0 + Duration::from_secs(3)));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let mut log = RevisionLog::new(15, Duration::from_secs(3));
        let t0 = Instant::now();

        for i in 0..16 {
            let now = t0 + Duration::from_secs(3 * i as u64);
            assert!(log.maybe_snapshot(&store_with(i), now));
        }

        assert_eq!(log.len(), 15);
        let first = log.iter().next().unwrap();
        assert_eq!(first.store().get("mod", "n"), Some(&json!(1)));
        assert_eq!(log.latest().unwrap().store().get("mod", "n"), Some(&json!(15)));
    }

    #[test]
    fn test_snapshot_is_a_deep_copy() {
        let mut log = RevisionLog::new(15, Duration::from_secs(3));
        let mut store = store_with(1);
        log.maybe_snapshot(&store, Instant::now());

        store.insert("mod", "n", json!(99));
        assert_eq!(log.latest().unwrap().store().get("mod", "n"), Some(&json!(1)));
    }

    #[test]
    fn test_recover_returns_newest_clean_revision() {
        let mut log = RevisionLog::new(15, Duration::ZERO);
        log.push_unchecked(store_with(1));
        log.push_unchecked(store_with(2));

        let revision = log.recover().unwrap();
        assert_eq!(revision.store().get("mod", "n"), Some(&json!(2)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_recover_skips_broken_revisions() {
        let mut log = RevisionLog::new(15, Duration::ZERO);
        log.push_unchecked(store_with(1));

        let mut broken = Store::new();
        broken.insert("mod", "deep", deep_value());
        log.push_unchecked(broken);

        let revision = log.recover().unwrap();
        assert_eq!(revision.store().get("mod", "n"), Some(&json!(1)));
        assert!(log.is_empty());
    }

    #[test]
    fn test_recover_repairs_dropping_broken_owners() {
        let mut log = RevisionLog::new(15, Duration::ZERO);
        let mut store = store_with(3);
        store.insert_raw("junk", json!(7));
        log.push_unchecked(store);

        let revision = log.recover().unwrap();
        assert!(revision.store().namespace("junk").is_none());
        assert_eq!(revision.store().get("mod", "n"), Some(&json!(3)));
    }

    #[test]
    fn test_recover_exhausted() {
        let mut log = RevisionLog::new(15, Duration::ZERO);
        assert!(log.recover().is_none());

        let mut broken = Store::new();
        broken.insert("mod", "deep", deep_value());
        log.push_unchecked(broken);
        assert!(log.recover().is_none());
    }
}
