// =============================================================================
// History Store — bounded most-recent-first signal log
// =============================================================================
//
// Stored as a JSON array of `{text, cashout, time}` objects in a single slot.
// `read_all` is tolerant: a missing, unreadable or malformed slot is an
// empty history. `record` only starts fresh over a missing or malformed
// slot; a failed read is returned so the stored entries are never
// overwritten.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::storage::SlotStore;
use crate::types::HistoryEntry;

/// Maximum number of entries kept in the history.
pub const MAX_HISTORY_ENTRIES: usize = 10;

#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn SlotStore>,
    key: String,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn SlotStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Prepend `entry`, keep the newest [`MAX_HISTORY_ENTRIES`], persist.
    /// Fails without writing if the slot cannot be read.
    pub fn record(&self, entry: HistoryEntry) -> Result<()> {
        let raw = self
            .store
            .read(&self.key)
            .with_context(|| format!("failed to read history slot {}", self.key))?;
        let mut entries = raw.map(|raw| self.parse(&raw)).unwrap_or_default();
        entries.insert(0, entry);
        entries.truncate(MAX_HISTORY_ENTRIES);

        let payload = serde_json::to_string(&entries).context("failed to serialise history")?;
        self.store
            .write(&self.key, &payload)
            .with_context(|| format!("failed to persist history slot {}", self.key))?;

        debug!(key = %self.key, len = entries.len(), "history recorded");
        Ok(())
    }

    /// Entries, most recent first. Empty on any read or parse failure.
    pub fn read_all(&self) -> Vec<HistoryEntry> {
        match self.store.read(&self.key) {
            Ok(Some(raw)) => self.parse(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "history slot unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(&self.key)
    }

    fn parse(&self, raw: &str) -> Vec<HistoryEntry> {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!(key = %self.key, error = %e, "history payload malformed, treating as empty");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use anyhow::bail;

    use super::*;
    use crate::storage::MemorySlotStore;

    /// Memory store whose reads fail while `fail_reads` is set.
    #[derive(Default)]
    struct FlakySlotStore {
        inner: MemorySlotStore,
        fail_reads: AtomicBool,
    }

    impl SlotStore for FlakySlotStore {
        fn read(&self, key: &str) -> Result<Option<String>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                bail!("slot {key} temporarily unavailable");
            }
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &str) -> Result<()> {
            self.inner.write(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    fn entry(n: usize) -> HistoryEntry {
        HistoryEntry {
            text: format!("signal {n}"),
            cashout: format!("Exit between 1.{n:02}x and 3.00x"),
            time: "12:00".to_string(),
        }
    }

    fn store() -> (Arc<MemorySlotStore>, HistoryStore) {
        let slots = Arc::new(MemorySlotStore::new());
        let history = HistoryStore::new(slots.clone(), "aviator_history");
        (slots, history)
    }

    #[test]
    fn empty_when_never_recorded() {
        let (_, history) = store();
        assert!(history.read_all().is_empty());
    }

    #[test]
    fn newest_entry_is_first() {
        let (_, history) = store();
        history.record(entry(1)).unwrap();
        history.record(entry(2)).unwrap();
        let all = history.read_all();
        assert_eq!(all, vec![entry(2), entry(1)]);
    }

    #[test]
    fn eleventh_record_evicts_the_oldest() {
        let (_, history) = store();
        for n in 0..11 {
            history.record(entry(n)).unwrap();
        }
        let all = history.read_all();
        assert_eq!(all.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(all[0], entry(10));
        assert_eq!(all[9], entry(1));
        assert!(!all.contains(&entry(0)));
    }

    #[test]
    fn never_exceeds_capacity() {
        let (_, history) = store();
        for n in 0..37 {
            history.record(entry(n % 4)).unwrap();
            assert!(history.read_all().len() <= MAX_HISTORY_ENTRIES);
        }
    }

    #[test]
    fn duplicates_are_kept() {
        let (_, history) = store();
        history.record(entry(5)).unwrap();
        history.record(entry(5)).unwrap();
        assert_eq!(history.read_all(), vec![entry(5), entry(5)]);
    }

    #[test]
    fn malformed_payload_reads_as_empty() {
        let (slots, history) = store();
        slots.write("aviator_history", "{not json").unwrap();
        assert!(history.read_all().is_empty());

        slots.write("aviator_history", r#"{"text":"object, not array"}"#).unwrap();
        assert!(history.read_all().is_empty());
    }

    #[test]
    fn record_over_malformed_payload_starts_fresh() {
        let (slots, history) = store();
        slots.write("aviator_history", "garbage").unwrap();
        history.record(entry(1)).unwrap();
        assert_eq!(history.read_all(), vec![entry(1)]);
    }

    #[test]
    fn record_during_read_failure_keeps_stored_entries() {
        let slots = Arc::new(FlakySlotStore::default());
        let history = HistoryStore::new(slots.clone(), "aviator_history");
        for n in 0..9 {
            history.record(entry(n)).unwrap();
        }

        slots.fail_reads.store(true, Ordering::SeqCst);
        assert!(history.record(entry(42)).is_err());
        assert!(history.read_all().is_empty());

        slots.fail_reads.store(false, Ordering::SeqCst);
        let all = history.read_all();
        assert_eq!(all.len(), 9);
        assert_eq!(all[0], entry(8));
        assert!(!all.contains(&entry(42)));
    }

    #[test]
    fn persisted_layout_is_text_cashout_time() {
        let (slots, history) = store();
        history.record(entry(3)).unwrap();
        let raw = slots.read("aviator_history").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let first = &value.as_array().unwrap()[0];
        assert_eq!(first["text"], "signal 3");
        assert_eq!(first["cashout"], "Exit between 1.03x and 3.00x");
        assert_eq!(first["time"], "12:00");
    }

    #[test]
    fn clear_empties_the_history() {
        let (_, history) = store();
        history.record(entry(1)).unwrap();
        history.clear().unwrap();
        assert!(history.read_all().is_empty());
    }
}
