//! Record collections - ordered, persisted, observable lists of limited records.
//!
//! A collection owns its records outright. Every mutation rewrites the whole
//! snapshot to the key-value store (collections hold tens of records, not
//! thousands) and then notifies observers exactly once.

use crate::{
    core::models::{Event, Record, RecordId, RecordKind, Reorderable},
    errors::Result,
    storage::{KeyValueStore, load_json, persist_or_log, save_json},
};
use chrono::{NaiveDate, TimeZone};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// What changed in a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// A record was appended
    Added(RecordId),
    /// A record's fields changed
    Updated(RecordId),
    /// One or more records were removed
    Removed(Vec<RecordId>),
    /// A record moved to another position
    Reordered {
        /// Position before the move
        from: usize,
        /// Position after the move
        to: usize,
    },
}

/// Notification delivered to observers after a mutation has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionChange {
    /// Which collection changed
    pub kind: RecordKind,
    /// What happened
    pub change: ChangeKind,
    /// Number of records after the change
    pub len: usize,
}

type Observer = Box<dyn Fn(&CollectionChange) + Send + Sync>;

/// Ordered collection of one record type, persisted under `T::STORAGE_KEY`.
pub struct RecordCollection<T: Record, S: KeyValueStore> {
    store: Arc<S>,
    records: Vec<T>,
    observers: Vec<Observer>,
}

impl<T: Record, S: KeyValueStore> std::fmt::Debug for RecordCollection<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCollection")
            .field("kind", &T::KIND)
            .field("records", &self.records)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl<T: Record, S: KeyValueStore> RecordCollection<T, S> {
    /// Loads the stored snapshot, or starts empty when none exists.
    ///
    /// Records sharing an id with an earlier record get a fresh id so the
    /// collection never holds duplicates.
    pub async fn load(store: Arc<S>) -> Result<Self> {
        let mut records: Vec<T> = load_json(store.as_ref(), T::STORAGE_KEY)
            .await?
            .unwrap_or_default();

        let mut seen = HashSet::with_capacity(records.len());
        for record in &mut records {
            if record.id().is_unset() || !seen.insert(record.id()) {
                let fresh = RecordId::new();
                warn!(
                    "Duplicate or unset {} id {} in stored snapshot, reassigned to {}",
                    T::KIND,
                    record.id(),
                    fresh
                );
                record.assign_id(fresh);
                seen.insert(fresh);
            }
        }

        info!("Loaded {} {} record(s)", records.len(), T::KIND);
        Ok(Self {
            store,
            records,
            observers: Vec::new(),
        })
    }

    /// Registers a callback run after every successful mutation.
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: Fn(&CollectionChange) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Records in stored order
    #[must_use]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up a record by id
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&T> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Appends `record` under a freshly generated id, whatever id it carried.
    /// Ids of deleted records are never handed out again. Returns the new id.
    pub async fn add(&mut self, mut record: T) -> RecordId {
        let id = RecordId::new();
        record.assign_id(id);
        self.records.push(record);
        debug!("Added {} {}", T::KIND, id);

        self.commit(ChangeKind::Added(id)).await;
        id
    }

    /// Applies `mutator` to the record with `id`. Unknown ids are a silent no-op
    /// and return `false`. The id is restored if the mutator touched it.
    pub async fn update<F>(&mut self, id: RecordId, mutator: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let Some(record) = self.records.iter_mut().find(|r| r.id() == id) else {
            trace!("Update of unknown {} {} ignored", T::KIND, id);
            return false;
        };
        mutator(&mut *record);
        record.assign_id(id);

        self.commit(ChangeKind::Updated(id)).await;
        true
    }

    /// Removes the record with `id` if present.
    pub async fn delete(&mut self, id: RecordId) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id() != id);
        if self.records.len() == before {
            trace!("Delete of unknown {} {} ignored", T::KIND, id);
            return false;
        }

        self.commit(ChangeKind::Removed(vec![id])).await;
        true
    }

    /// Removes every record whose id is in `ids`, persisting once. Returns how
    /// many records were removed.
    pub async fn delete_many(&mut self, ids: &HashSet<RecordId>) -> usize {
        let mut removed = Vec::new();
        self.records.retain(|r| {
            if ids.contains(&r.id()) {
                removed.push(r.id());
                false
            } else {
                true
            }
        });
        if removed.is_empty() {
            return 0;
        }

        let count = removed.len();
        self.commit(ChangeKind::Removed(removed)).await;
        count
    }

    async fn commit(&self, change: ChangeKind) {
        persist_or_log(
            T::STORAGE_KEY,
            save_json(self.store.as_ref(), T::STORAGE_KEY, &self.records),
        )
        .await;

        let notice = CollectionChange {
            kind: T::KIND,
            change,
            len: self.records.len(),
        };
        for observer in &self.observers {
            observer(&notice);
        }
    }
}

impl<T: Reorderable, S: KeyValueStore> RecordCollection<T, S> {
    /// Moves the record at `from` to `to`, shifting the others. Out-of-range
    /// indices leave the collection untouched and return `false`.
    pub async fn reorder(&mut self, from: usize, to: usize) -> bool {
        let len = self.records.len();
        if from >= len || to >= len {
            warn!(
                "Ignoring {} reorder {} -> {} with {} record(s)",
                T::KIND,
                from,
                to,
                len
            );
            return false;
        }
        if from == to {
            return false;
        }

        let record = self.records.remove(from);
        self.records.insert(to, record);

        self.commit(ChangeKind::Reordered { from, to }).await;
        true
    }
}

impl<S: KeyValueStore> RecordCollection<Event, S> {
    /// All events ordered by date; ties keep stored order.
    #[must_use]
    pub fn sorted_by_date(&self) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.records.iter().collect();
        events.sort_by_key(|e| e.date);
        events
    }

    /// Events on local calendar `day`, ordered by date.
    #[must_use]
    pub fn events_on<Tz: TimeZone>(&self, day: NaiveDate, tz: &Tz) -> Vec<&Event> {
        self.sorted_by_date()
            .into_iter()
            .filter(|e| e.local_day(tz) == day)
            .collect()
    }
}
