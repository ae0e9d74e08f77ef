//! Per-page derived cache of server records.
//!
//! Full reloads (polling) and push patches are two producers feeding the same
//! reducer. For each id the newest revision wins; records without a revision
//! are always accepted. Reloads are ticketed so a slow response that resolves
//! after a newer one is discarded instead of overwriting it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use pantry_core::Entity;

/// What a mutation did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    /// Duplicate, stale or absent-on-delete: nothing changed.
    Unchanged,
    /// An update named a record the cache does not hold; reload to recover.
    Miss,
}

impl Applied {
    pub fn changed(self) -> bool {
        matches!(self, Applied::Inserted | Applied::Replaced | Applied::Removed)
    }
}

/// Handle for one full reload, issued by [`ViewCache::begin_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket(u64);

/// Ordered collection keyed by entity id.
#[derive(Debug, Clone)]
pub struct ViewCache<T: Entity> {
    items: Vec<T>,
    issued: u64,
    applied: u64,
    loaded: bool,
}

impl<T: Entity> Default for ViewCache<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            issued: 0,
            applied: 0,
            loaded: false,
        }
    }
}

fn is_stale(incoming: Option<DateTime<Utc>>, current: Option<DateTime<Utc>>) -> bool {
    matches!((incoming, current), (Some(new), Some(old)) if new < old)
}

impl<T: Entity + Clone> ViewCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_load(&mut self) -> LoadTicket {
        self.issued += 1;
        LoadTicket(self.issued)
    }

    /// Replace the collection with a full reload result.
    ///
    /// Returns `false` (and leaves the cache alone) when a later reload has
    /// already been applied. A record already held with a newer revision is
    /// kept over the reloaded copy.
    pub fn finish_load(&mut self, ticket: LoadTicket, records: Vec<T>) -> bool {
        if ticket.0 <= self.applied {
            tracing::debug!(ticket = ticket.0, applied = self.applied, "discarding stale reload");
            return false;
        }
        self.applied = ticket.0;
        self.loaded = true;

        let mut previous: HashMap<T::Id, T> = self
            .items
            .drain(..)
            .map(|item| (item.id().clone(), item))
            .collect();

        let mut next: Vec<T> = Vec::with_capacity(records.len());
        for record in records {
            if let Some(pos) = next.iter().position(|item| item.id() == record.id()) {
                // Duplicate within one response: later row wins, first position kept.
                next[pos] = record;
                continue;
            }
            let keep = match previous.remove(record.id()) {
                Some(held) if is_stale(record.revision(), held.revision()) => held,
                _ => record,
            };
            next.push(keep);
        }
        self.items = next;
        true
    }

    /// Insert a created record; a record already held is only replaced by a
    /// newer revision.
    pub fn insert(&mut self, record: T) -> Applied {
        match self.position(record.id()) {
            Some(pos) => match (record.revision(), self.items[pos].revision()) {
                (Some(new), Some(old)) if new > old => {
                    self.items[pos] = record;
                    Applied::Replaced
                }
                _ => Applied::Unchanged,
            },
            None => {
                self.items.push(record);
                Applied::Inserted
            }
        }
    }

    /// Replace a held record in place, keeping its position.
    pub fn update(&mut self, record: T) -> Applied {
        let Some(pos) = self.position(record.id()) else {
            return Applied::Miss;
        };
        if is_stale(record.revision(), self.items[pos].revision()) {
            tracing::debug!(id = ?record.id(), "ignoring out-of-order update");
            return Applied::Unchanged;
        }
        self.items[pos] = record;
        Applied::Replaced
    }

    /// Update when held, insert otherwise.
    pub fn upsert(&mut self, record: T) -> Applied {
        match self.update(record.clone()) {
            Applied::Miss => self.insert(record),
            applied => applied,
        }
    }

    /// Remove by id; absent ids are a no-op.
    pub fn remove(&mut self, id: &T::Id) -> Applied {
        match self.position(id) {
            Some(pos) => {
                self.items.remove(pos);
                Applied::Removed
            }
            None => Applied::Unchanged,
        }
    }

    /// Mutate a held record in place.
    pub fn patch(&mut self, id: &T::Id, f: impl FnOnce(&mut T)) -> Applied {
        match self.position(id) {
            Some(pos) => {
                f(&mut self.items[pos]);
                Applied::Replaced
            }
            None => Applied::Miss,
        }
    }

    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.position(id).map(|pos| &self.items[pos])
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.position(id).is_some()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether at least one full reload has been applied.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn position(&self, id: &T::Id) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }
}
