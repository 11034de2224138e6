//! Storage layer for the crosscheck conflict review system
//!
//! Two logical tables behind async traits:
//! - FieldValue: append-mostly ledger, indexed by record + field + active
//! - Conflict: mutable status, keyed by (record, kind, field) for upsert
//!
//! The in-memory implementations in [`memory`] back tests and the default
//! server; persistent backends plug in behind the same traits.

pub mod memory;

use async_trait::async_trait;
use crosscheck_core::{CacheKey, Conflict, ConflictId, FieldValue, RecordId, ValueId};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("value not found: {0}")]
    ValueNotFound(ValueId),

    #[error("conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    #[error("value already inactive: {0}")]
    ValueAlreadyInactive(ValueId),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Append-mostly ledger of provenance-tagged field values
#[async_trait]
pub trait ValueStore: Send + Sync {
    /// Append a value. Never mutates existing rows.
    async fn append(&self, value: FieldValue) -> Result<ValueId>;

    /// Fetch a single value by id
    async fn get(&self, id: &ValueId) -> Result<FieldValue>;

    /// All values for a record, optionally restricted to active ones
    async fn list(&self, record_id: &RecordId, active_only: bool) -> Result<Vec<FieldValue>>;

    /// All values (active and not) for one field of a record
    async fn list_for_field(
        &self,
        record_id: &RecordId,
        field_name: &str,
    ) -> Result<Vec<FieldValue>>;

    /// Flip the active flag off. The only mutation the ledger supports;
    /// atomic per value. Errors with [`StorageError::ValueAlreadyInactive`]
    /// when a concurrent resolution got there first.
    async fn deactivate(&self, id: &ValueId) -> Result<()>;

    /// Storage statistics
    async fn stats(&self) -> Result<StorageStats>;
}

/// Conflict rows with idempotent upsert by cache key
#[async_trait]
pub trait ConflictStore: Send + Sync {
    /// Insert or replace the row identified by the conflict's cache key
    async fn upsert(&self, conflict: Conflict) -> Result<()>;

    /// Fetch a conflict by id
    async fn get(&self, id: &ConflictId) -> Result<Conflict>;

    /// Fetch by upsert key
    async fn get_by_key(&self, key: &CacheKey) -> Result<Option<Conflict>>;

    /// All conflict rows for a record
    async fn list_for_record(&self, record_id: &RecordId) -> Result<Vec<Conflict>>;

    /// Replace an existing row (status transition, staleness flip)
    async fn update(&self, conflict: Conflict) -> Result<()>;

    /// Drop a row by key. Used when a fresh detection pass no longer
    /// emits a pending finding.
    async fn remove_by_key(&self, key: &CacheKey) -> Result<()>;

    /// (total, pending) row counts across all records
    async fn counts(&self) -> Result<(u64, u64)>;
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub total_values: u64,
    pub active_values: u64,
    pub total_conflicts: u64,
    pub pending_conflicts: u64,
}
