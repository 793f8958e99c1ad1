// =============================================================================
// Slot Storage — named key-value slots outside the process
// =============================================================================
//
// Each slot holds one serialised document. The file-backed store keeps one
// `<key>.json` per slot under a data directory and writes through a `.tmp`
// sibling + rename so a crash never leaves a half-written slot behind.
// =============================================================================

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::debug;

/// Named slots holding serialised documents.
pub trait SlotStore: Send + Sync {
    /// Read a slot. `Ok(None)` when it was never written.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the contents of a slot.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a slot. Removing a missing slot is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

// =============================================================================
// FileSlotStore
// =============================================================================

pub struct FileSlotStore {
    dir: PathBuf,
}

impl FileSlotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SlotStore for FileSlotStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.slot_path(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read slot {}", path.display())),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create data dir {}", self.dir.display()))?;

        let path = self.slot_path(key);
        let tmp_path = path.with_extension("json.tmp");

        fs::write(&tmp_path, value)
            .with_context(|| format!("failed to write tmp slot {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to rename tmp slot to {}", path.display()))?;

        debug!(key, path = %path.display(), bytes = value.len(), "slot written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.slot_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove slot {}", path.display())),
        }
    }
}

// =============================================================================
// MemorySlotStore
// =============================================================================

#[derive(Default)]
pub struct MemorySlotStore {
    slots: RwLock<HashMap<String, String>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStore for MemorySlotStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.slots.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.slots.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("signal-slots-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn file_store_missing_slot_reads_none() {
        let store = FileSlotStore::new(temp_dir());
        assert_eq!(store.read("nothing").unwrap(), None);
    }

    #[test]
    fn file_store_write_read_remove() {
        let dir = temp_dir();
        let store = FileSlotStore::new(&dir);

        store.write("slot", "[1,2,3]").unwrap();
        assert_eq!(store.read("slot").unwrap().as_deref(), Some("[1,2,3]"));
        assert!(dir.join("slot.json").exists());
        assert!(!dir.join("slot.json.tmp").exists());

        store.write("slot", "[]").unwrap();
        assert_eq!(store.read("slot").unwrap().as_deref(), Some("[]"));

        store.remove("slot").unwrap();
        assert_eq!(store.read("slot").unwrap(), None);
        store.remove("slot").unwrap();

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn memory_store_slots_are_independent() {
        let store = MemorySlotStore::new();
        store.write("a", "1").unwrap();
        store.write("b", "2").unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.read("a").unwrap(), None);
        assert_eq!(store.read("b").unwrap().as_deref(), Some("2"));
    }
}
