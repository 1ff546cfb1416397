//! Debounced persistence of the store snapshot.
//!
//! Every mutation pushes the save deadline back; the snapshot is written once
//! the deadline passes without a newer mutation.

use crate::store::{StoreSnapshot, TransformStore};
use crate::storage::{Storage, StorageResult, load_optional};
use std::sync::Arc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Default quiet period before a snapshot write.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Writes the store snapshot after a quiet period.
pub struct PersistScheduler<S: Storage + ?Sized> {
    storage: Arc<S>,
    key: String,
    debounce: Duration,
    /// When the pending write becomes due.
    deadline: Option<Instant>,
    last_save: Option<Instant>,
}

impl<S: Storage + ?Sized> PersistScheduler<S> {
    /// Create a scheduler writing the snapshot under `key`.
    pub fn new(storage: Arc<S>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            deadline: None,
            last_save: None,
        }
    }

    /// Set the debounce period.
    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    /// Get the debounce period.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record a mutation at `now`, pushing the deadline back.
    pub fn mark_dirty_at(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
    }

    /// Record a mutation now.
    pub fn mark_dirty(&mut self) {
        self.mark_dirty_at(Instant::now());
    }

    /// Check if a write is pending.
    pub fn is_dirty(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the last write happened.
    pub fn last_save(&self) -> Option<Instant> {
        self.last_save
    }

    /// Check if the pending write is due at `now`.
    pub fn should_save_at(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Write the snapshot if it is due at `now`. Returns true if it was written.
    pub fn maybe_save_at(&mut self, now: Instant, store: &TransformStore) -> StorageResult<bool> {
        if !self.should_save_at(now) {
            return Ok(false);
        }
        self.save_at(now, store)?;
        Ok(true)
    }

    /// Write the snapshot if it is due now.
    pub fn maybe_save(&mut self, store: &TransformStore) -> StorageResult<bool> {
        self.maybe_save_at(Instant::now(), store)
    }

    /// Write the snapshot immediately.
    pub fn save_at(&mut self, now: Instant, store: &TransformStore) -> StorageResult<()> {
        let json = store.snapshot().to_json()?;
        self.storage.save(&self.key, &json)?;
        self.deadline = None;
        self.last_save = Some(now);
        log::debug!("Saved store snapshot ({} bytes)", json.len());
        Ok(())
    }

    /// Load the last written snapshot, if any.
    pub fn load(&self) -> StorageResult<Option<StoreSnapshot>> {
        match load_optional(self.storage.as_ref(), &self.key)? {
            Some(json) => Ok(Some(StoreSnapshot::from_json(&json)?)),
            None => Ok(None),
        }
    }

    /// Get a reference to the storage backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}
