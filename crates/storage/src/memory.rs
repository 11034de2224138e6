//! In-memory storage implementation for testing and development
//!
//! HashMap-backed stores behind the same traits a persistent backend
//! would implement.

use crate::{ConflictStore, Result, StorageError, StorageStats, ValueStore};
use async_trait::async_trait;
use crosscheck_core::{CacheKey, Conflict, ConflictId, ConflictStatus, FieldValue, RecordId, ValueId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory append-mostly value ledger
#[derive(Clone, Default)]
pub struct InMemoryValueStore {
    values: Arc<RwLock<HashMap<ValueId, FieldValue>>>,
}

impl InMemoryValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[async_trait]
impl ValueStore for InMemoryValueStore {
    async fn append(&self, value: FieldValue) -> Result<ValueId> {
        let id = value.id;
        self.values.write().insert(id, value);
        Ok(id)
    }

    async fn get(&self, id: &ValueId) -> Result<FieldValue> {
        self.values
            .read()
            .get(id)
            .cloned()
            .ok_or(StorageError::ValueNotFound(*id))
    }

    async fn list(&self, record_id: &RecordId, active_only: bool) -> Result<Vec<FieldValue>> {
        let values = self.values.read();
        let mut rows: Vec<FieldValue> = values
            .values()
            .filter(|v| v.record_id == *record_id && (!active_only || v.active))
            .cloned()
            .collect();
        // UUIDv7 ids sort by creation time
        rows.sort_by_key(|v| v.id);
        Ok(rows)
    }

    async fn list_for_field(
        &self,
        record_id: &RecordId,
        field_name: &str,
    ) -> Result<Vec<FieldValue>> {
        let values = self.values.read();
        let mut rows: Vec<FieldValue> = values
            .values()
            .filter(|v| v.record_id == *record_id && v.field_name == field_name)
            .cloned()
            .collect();
        rows.sort_by_key(|v| v.id);
        Ok(rows)
    }

    async fn deactivate(&self, id: &ValueId) -> Result<()> {
        let mut values = self.values.write();
        let value = values.get_mut(id).ok_or(StorageError::ValueNotFound(*id))?;
        if !value.active {
            return Err(StorageError::ValueAlreadyInactive(*id));
        }
        value.active = false;
        Ok(())
    }

    async fn stats(&self) -> Result<StorageStats> {
        let values = self.values.read();
        Ok(StorageStats {
            total_values: values.len() as u64,
            active_values: values.values().filter(|v| v.active).count() as u64,
            total_conflicts: 0,
            pending_conflicts: 0,
        })
    }
}

/// In-memory conflict table keyed by (record, kind, field)
#[derive(Clone, Default)]
pub struct InMemoryConflictStore {
    rows: Arc<RwLock<ConflictRows>>,
}

#[derive(Default)]
struct ConflictRows {
    by_id: HashMap<ConflictId, Conflict>,
    by_key: HashMap<CacheKey, ConflictId>,
}

impl InMemoryConflictStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().by_id.len()
    }

    pub fn pending_count(&self) -> usize {
        self.rows
            .read()
            .by_id
            .values()
            .filter(|c| c.status == ConflictStatus::Pending)
            .count()
    }
}

#[async_trait]
impl ConflictStore for InMemoryConflictStore {
    async fn upsert(&self, conflict: Conflict) -> Result<()> {
        let mut rows = self.rows.write();
        let key = conflict.cache_key();
        if let Some(existing_id) = rows.by_key.get(&key).copied() {
            if existing_id != conflict.id {
                rows.by_id.remove(&existing_id);
            }
        }
        rows.by_key.insert(key, conflict.id);
        rows.by_id.insert(conflict.id, conflict);
        Ok(())
    }

    async fn get(&self, id: &ConflictId) -> Result<Conflict> {
        self.rows
            .read()
            .by_id
            .get(id)
            .cloned()
            .ok_or(StorageError::ConflictNotFound(*id))
    }

    async fn get_by_key(&self, key: &CacheKey) -> Result<Option<Conflict>> {
        let rows = self.rows.read();
        Ok(rows
            .by_key
            .get(key)
            .and_then(|id| rows.by_id.get(id))
            .cloned())
    }

    async fn list_for_record(&self, record_id: &RecordId) -> Result<Vec<Conflict>> {
        let rows = self.rows.read();
        let mut out: Vec<Conflict> = rows
            .by_id
            .values()
            .filter(|c| c.record_id == *record_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (a.kind, a.field_name.clone()).cmp(&(b.kind, b.field_name.clone()))
        });
        Ok(out)
    }

    async fn update(&self, conflict: Conflict) -> Result<()> {
        let mut rows = self.rows.write();
        if !rows.by_id.contains_key(&conflict.id) {
            return Err(StorageError::ConflictNotFound(conflict.id));
        }
        rows.by_key.insert(conflict.cache_key(), conflict.id);
        rows.by_id.insert(conflict.id, conflict);
        Ok(())
    }

    async fn remove_by_key(&self, key: &CacheKey) -> Result<()> {
        let mut rows = self.rows.write();
        if let Some(id) = rows.by_key.remove(key) {
            rows.by_id.remove(&id);
        }
        Ok(())
    }

    async fn counts(&self) -> Result<(u64, u64)> {
        Ok((self.len() as u64, self.pending_count() as u64))
    }
}
