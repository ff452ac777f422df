//! Append-only change log for cache invalidation and cross-instance catch-up
//! reads, grounded on the teacher's `history_log: DashMap<FullKey,
//! Vec<VersionedValue>>` append pattern, narrowed to a single ordered log with
//! a time-based retention sweep.

use crate::types::{ChangeEntry, ChangeOp, EntityType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Default retention window: 24 hours, per spec.
pub const DEFAULT_RETENTION_SECS: i64 = 24 * 60 * 60;

/// An ordered, append-only log of entity mutations.
pub struct ChangeLog {
    entries: Mutex<Vec<ChangeEntry>>,
    sequence: AtomicU64,
    retention_secs: i64,
}

impl ChangeLog {
    pub fn new(retention_secs: i64) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
            retention_secs,
        }
    }

    /// Append one entry. Called after every successful mutation, before the
    /// originating operation returns.
    pub fn record(&self, entity_type: EntityType, entity_id: impl Into<String>, op: ChangeOp, now: i64) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let entry = ChangeEntry {
            timestamp: now,
            sequence,
            entity_type,
            entity_id: entity_id.into(),
            op,
        };
        self.entries.lock().unwrap().push(entry);
    }

    /// All entries with `timestamp > since`, sorted ascending. Returns `None`
    /// when `since` predates the retention horizon — the caller must
    /// resynchronize by reloading full indexes from storage instead.
    pub fn changes_since(&self, since: i64, now: i64) -> Option<Vec<ChangeEntry>> {
        if now - since > self.retention_secs {
            let entries = self.entries.lock().unwrap();
            let oldest = entries.first().map(|e| e.timestamp).unwrap_or(now);
            if since < oldest {
                return None;
            }
        }
        let entries = self.entries.lock().unwrap();
        Some(
            entries
                .iter()
                .filter(|e| e.timestamp > since)
                .cloned()
                .collect(),
        )
    }

    /// Drop entries older than the retention window. Run by a single-writer sweeper.
    pub fn compact(&self, now: i64) {
        let cutoff = now - self.retention_secs;
        self.entries.lock().unwrap().retain(|e| e.timestamp >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changes_since_returns_only_newer_entries() {
        let log = ChangeLog::new(DEFAULT_RETENTION_SECS);
        log.record(EntityType::Noun, "n1", ChangeOp::Upsert, 100);
        log.record(EntityType::Noun, "n2", ChangeOp::Upsert, 200);

        let changes = log.changes_since(100, 200).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].entity_id, "n2");
    }

    #[test]
    fn applying_the_same_entry_twice_is_idempotent_for_readers() {
        let log = ChangeLog::new(DEFAULT_RETENTION_SECS);
        log.record(EntityType::Noun, "n1", ChangeOp::Delete, 100);
        let first = log.changes_since(0, 100).unwrap();
        let second = log.changes_since(0, 100).unwrap();
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn compact_drops_entries_past_retention() {
        let log = ChangeLog::new(10);
        log.record(EntityType::Noun, "old", ChangeOp::Upsert, 0);
        log.record(EntityType::Noun, "new", ChangeOp::Upsert, 100);
        log.compact(100);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn stale_since_beyond_retention_signals_resync() {
        let log = ChangeLog::new(10);
        log.record(EntityType::Noun, "n1", ChangeOp::Upsert, 50);
        assert!(log.changes_since(0, 100).is_none());
    }
}
