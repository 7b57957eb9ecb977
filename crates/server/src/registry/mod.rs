//! Slot registry
//!
//! Maps slot keys to [`Slot`]s. The map is append-only: slots are created at
//! config load or on first reference by an event and live for the lifetime of
//! the process, so an `Arc<Slot>` handed out stays valid and current.

pub mod slot;

pub use slot::{Slot, SlotGuard, SlotState};

use crate::config::SlotConfig;
use protocol::SlotStatus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

#[derive(Default)]
struct Inner {
    by_key: HashMap<String, Arc<Slot>>,
    /// Insertion order (configured slots first, then discovery order)
    order: Vec<Arc<Slot>>,
}

/// Registry of every known slot
#[derive(Default)]
pub struct SlotRegistry {
    inner: RwLock<Inner>,
    seq: AtomicU64,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from configuration; every slot starts empty
    pub fn load(slots: &[SlotConfig]) -> Self {
        let registry = Self::new();
        {
            let mut inner = registry.write();
            for config in slots {
                let slot = Arc::new(Slot::configured(
                    config.slot_key.clone(),
                    config.label.clone(),
                    config.tcp_port,
                ));
                inner.by_key.insert(config.slot_key.clone(), Arc::clone(&slot));
                inner.order.push(slot);
            }
        }
        info!("Registry loaded with {} configured slot(s)", slots.len());
        registry
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up an existing slot
    pub fn get(&self, key: &str) -> Option<Arc<Slot>> {
        self.read().by_key.get(key).cloned()
    }

    /// Look up a slot, inserting a dynamic one if the key is new
    ///
    /// Concurrent callers with the same new key all receive the same slot.
    pub fn get_or_create(&self, key: &str) -> Arc<Slot> {
        if let Some(slot) = self.get(key) {
            return slot;
        }

        let mut inner = self.write();
        // Re-check under the write lock; another caller may have won the race
        if let Some(slot) = inner.by_key.get(key) {
            return Arc::clone(slot);
        }

        let slot = Arc::new(Slot::dynamic(key));
        inner.by_key.insert(key.to_string(), Arc::clone(&slot));
        inner.order.push(Arc::clone(&slot));
        debug!(slot = key, "Created dynamic slot");
        slot
    }

    /// All slots in registry order
    pub fn slots(&self) -> Vec<Arc<Slot>> {
        self.read().order.clone()
    }

    /// Copy of every slot's observable fields
    pub fn snapshot_all(&self) -> Vec<SlotStatus> {
        self.slots().iter().map(|slot| slot.snapshot()).collect()
    }

    /// Next registry-wide event sequence number (starts at 1)
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (configured, running) slot counts
    pub fn counts(&self) -> (usize, usize) {
        self.slots().iter().fold((0, 0), |(configured, running), slot| {
            (
                configured + usize::from(slot.is_configured()),
                running + usize::from(slot.state().running),
            )
        })
    }
}
