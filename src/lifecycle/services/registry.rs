//! Server registry: the single owner of lifecycle records.

use crate::lifecycle::domain::{ManagedServerRecord, ServerId, ServerSnapshot};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Registry of managed server records.
///
/// The map itself is guarded by one lock that is held only to insert,
/// remove, or look up a slot. Each record sits behind its own mutex, so work
/// on one server never waits on another.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    slots: RwLock<HashMap<ServerId, Arc<RecordSlot>>>,
}

/// Lock around a single record.
#[derive(Debug)]
pub(crate) struct RecordSlot {
    record: Mutex<ManagedServerRecord>,
}

impl RecordSlot {
    fn new(record: ManagedServerRecord) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }

    /// Runs `f` with shared access to the record.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&ManagedServerRecord) -> T) -> T {
        f(&self.record.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Runs `f` with exclusive access to the record.
    pub(crate) fn update<T>(&self, f: impl FnOnce(&mut ManagedServerRecord) -> T) -> T {
        f(&mut self.record.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ServerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record` and returns `false` when its id is already taken.
    pub fn insert(&self, record: ManagedServerRecord) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        match slots.entry(record.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(RecordSlot::new(record)));
                true
            }
        }
    }

    /// Removes the record for `id` when `allow` accepts it.
    ///
    /// The check and the removal happen under both locks, so no other
    /// operation can claim the record in between. A removed record is
    /// retired; callers that still hold its slot see it as gone.
    pub fn remove_if<E>(
        &self,
        id: &str,
        allow: impl FnOnce(&ManagedServerRecord) -> Result<(), E>,
    ) -> Option<Result<ServerSnapshot, E>> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let slot = Arc::clone(slots.get(id)?);
        let outcome = slot.update(|record| {
            allow(record)?;
            record.retire();
            Ok(record.snapshot())
        });
        if outcome.is_ok() {
            slots.remove(id);
        }
        Some(outcome)
    }

    pub(crate) fn slot(&self, id: &str) -> Option<Arc<RecordSlot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub(crate) fn slots(&self) -> Vec<Arc<RecordSlot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Returns a snapshot of the record for `id`.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<ServerSnapshot> {
        self.slot(id).map(|slot| slot.read(ManagedServerRecord::snapshot))
    }

    /// Returns snapshots of every record, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<ServerSnapshot> {
        let mut snapshots: Vec<_> = self
            .slots()
            .iter()
            .map(|slot| slot.read(ManagedServerRecord::snapshot))
            .collect();
        snapshots.sort_by(|left, right| left.id.cmp(&right.id));
        snapshots
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether the registry holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
