//! Conflict review engine
//!
//! Ties the pure detector to the value and conflict stores: boundary
//! validation on writes, the trigger strategy, the conflict cache with
//! staleness and freshness window, the resolution workflow, and the gate
//! consulted before irreversible downstream actions.

pub mod config;
pub mod trigger;

pub use config::EngineConfig;
pub use trigger::{TriggerAction, TriggerController, TriggerMode};

use crosscheck_core::{
    Conflict, ConflictId, ConflictKind, ConflictStatus, CoreError, DocumentRef, FieldValue,
    Priority, RecordId, Resolution, ResolutionMethod, SourceKind, TypedValue, ValueId,
};
use crosscheck_detector::{detect, DetectorConfig};
use crosscheck_storage::{ConflictStore, StorageError, ValueStore};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

/// Engine errors
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("conflict {id} is not pending (status {status:?})")]
    ConflictState { id: ConflictId, status: ConflictStatus },

    #[error("concurrent update lost: {0}")]
    Concurrency(String),
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ValueAlreadyInactive(id) => {
                Self::Concurrency(format!("value {id} was deactivated by another actor"))
            }
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A field value write entering the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub record_id: RecordId,
    pub field_name: String,
    pub value: TypedValue,
    pub source: SourceKind,
    pub confidence: Option<f64>,
    pub document: Option<DocumentRef>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub actor: String,
}

/// A brand-new value supplied during resolution, written as a manual edit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewValue {
    pub field_name: String,
    pub value: TypedValue,
}

/// How the reviewer wants a pending conflict settled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionRequest {
    /// Existing implicated value(s) to keep active
    #[serde(default)]
    pub winning_value_ids: Vec<ValueId>,

    /// A corrected value to write instead of picking an existing one
    pub new_value: Option<NewValue>,

    pub notes: Option<String>,
}

/// Pending conflict counts broken down by priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Aggregated conflict state for the downstream gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSummary {
    pub pending: usize,
    pub by_priority: PriorityCounts,
    pub resolved: usize,
    pub deferred: usize,
}

/// Engine operation counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub total_values: u64,
    pub detection_passes: u64,
    pub resolutions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    computed_at: Instant,
    stale: bool,
}

/// The conflict review engine, generic over its two stores
pub struct Engine<V, C>
where
    V: ValueStore,
    C: ConflictStore,
{
    values: V,
    conflicts: C,
    trigger: RwLock<TriggerController>,
    detector_config: DetectorConfig,
    cache_ttl: Duration,
    cache: RwLock<HashMap<RecordId, CacheEntry>>,

    /// Serializes check-and-act resolution sequences
    resolve_gate: tokio::sync::Mutex<()>,

    stats: DashMap<String, u64>,
}

impl<V, C> Engine<V, C>
where
    V: ValueStore,
    C: ConflictStore,
{
    pub fn new(values: V, conflicts: C, config: EngineConfig) -> Self {
        let mode = TriggerMode::parse(&config.trigger_mode);
        Self {
            values,
            conflicts,
            trigger: RwLock::new(TriggerController::new(
                mode,
                config.immediate_fields.clone(),
            )),
            detector_config: config.detector,
            cache_ttl: config.cache_ttl,
            cache: RwLock::new(HashMap::new()),
            resolve_gate: tokio::sync::Mutex::new(()),
            stats: DashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Append a provenance-tagged value, then consult the trigger strategy
    pub async fn save_value(&self, request: WriteRequest) -> Result<ValueId> {
        let mut value = FieldValue::new(
            request.record_id,
            request.field_name,
            request.value,
            request.source,
            request.actor,
        );
        value.confidence = request.confidence;
        value.document = request.document;
        value.metadata = request.metadata;
        value.validate()?;

        let record_id = value.record_id;
        let field_name = value.field_name.clone();
        let value_id = self.values.append(value).await?;
        self.increment_stat("total_values");
        tracing::debug!(%record_id, field = %field_name, %value_id, "value written");

        self.on_value_written(record_id, &field_name).await?;
        Ok(value_id)
    }

    /// Trigger-strategy hook: detect now or just mark stale
    pub async fn on_value_written(&self, record_id: RecordId, field_name: &str) -> Result<()> {
        let action = self.trigger.read().action_for(field_name);
        match action {
            TriggerAction::DetectNow => {
                self.force_refresh(record_id).await?;
            }
            TriggerAction::MarkStale => {
                self.invalidate(record_id).await?;
            }
        }
        Ok(())
    }

    pub async fn get_value(&self, id: &ValueId) -> Result<FieldValue> {
        Ok(self.values.get(id).await?)
    }

    pub async fn list_values(&self, record_id: RecordId, active_only: bool) -> Result<Vec<FieldValue>> {
        Ok(self.values.list(&record_id, active_only).await?)
    }

    pub async fn list_values_for_field(
        &self,
        record_id: RecordId,
        field_name: &str,
    ) -> Result<Vec<FieldValue>> {
        Ok(self.values.list_for_field(&record_id, field_name).await?)
    }

    // ------------------------------------------------------------------
    // Conflict cache
    // ------------------------------------------------------------------

    /// Cached conflicts for a record, recomputing when stale or expired.
    /// A record with no cached entry always gets a detection pass, so the
    /// result is never a hard miss.
    pub async fn get_conflicts(&self, record_id: RecordId) -> Result<Vec<Conflict>> {
        let fresh = {
            let cache = self.cache.read();
            cache
                .get(&record_id)
                .map(|e| !e.stale && e.computed_at.elapsed() < self.cache_ttl)
                .unwrap_or(false)
        };

        if fresh {
            self.increment_stat("cache_hits");
            return Ok(self.conflicts.list_for_record(&record_id).await?);
        }

        self.increment_stat("cache_misses");
        self.force_refresh(record_id).await
    }

    /// Recompute detection for a record, bypassing freshness checks.
    /// Upserts by (record, kind, field): existing rows keep their identity
    /// and status, pending rows the fresh pass no longer emits are pruned,
    /// terminal rows are retained for audit.
    pub async fn force_refresh(&self, record_id: RecordId) -> Result<Vec<Conflict>> {
        let values = self.values.list(&record_id, false).await?;
        let fresh = detect(record_id, &values, &self.detector_config);
        self.increment_stat("detection_passes");
        tracing::debug!(%record_id, findings = fresh.len(), "detection pass");

        let existing = self.conflicts.list_for_record(&record_id).await?;
        let mut fresh_keys = HashSet::new();

        for finding in fresh {
            let key = finding.cache_key();
            fresh_keys.insert(key.clone());

            match self.conflicts.get_by_key(&key).await? {
                Some(mut row) if row.status == ConflictStatus::Pending => {
                    row.priority = finding.priority;
                    row.value_ids = finding.value_ids;
                    row.detail = finding.detail;
                    row.detected_at = finding.detected_at;
                    row.stale = false;
                    self.conflicts.update(row).await?;
                }
                Some(row) => {
                    // Already adjudicated. The same implicated set only
                    // confirms the adjudication; a different set is a new
                    // disagreement and supersedes the closed row, otherwise
                    // the gate would never see it.
                    if row.value_ids != finding.value_ids {
                        let mut superseding = finding;
                        superseding.resolution = row.resolution;
                        superseding.reviewed_by = row.reviewed_by;
                        superseding.reviewed_at = row.reviewed_at;
                        tracing::info!(
                            superseded = %row.id,
                            superseding = %superseding.id,
                            "closed conflict superseded by new disagreement"
                        );
                        self.conflicts.upsert(superseding).await?;
                    } else if row.stale {
                        let mut row = row;
                        row.stale = false;
                        self.conflicts.update(row).await?;
                    }
                }
                None => {
                    self.conflicts.upsert(finding).await?;
                }
            }
        }

        for row in existing {
            if fresh_keys.contains(&row.cache_key()) {
                continue;
            }
            if row.status == ConflictStatus::Pending {
                // The disagreement no longer exists; a lingering pending row
                // would block the gate forever.
                self.conflicts.remove_by_key(&row.cache_key()).await?;
            } else if row.stale {
                let mut row = row;
                row.stale = false;
                self.conflicts.update(row).await?;
            }
        }

        self.cache.write().insert(
            record_id,
            CacheEntry {
                computed_at: Instant::now(),
                stale: false,
            },
        );

        Ok(self.conflicts.list_for_record(&record_id).await?)
    }

    /// Mark cached rows stale without deleting them. Readers keep the last
    /// known-good state until the next read recomputes.
    pub async fn invalidate(&self, record_id: RecordId) -> Result<()> {
        for row in self.conflicts.list_for_record(&record_id).await? {
            if !row.stale {
                let mut row = row;
                row.stale = true;
                self.conflicts.update(row).await?;
            }
        }

        if let Some(entry) = self.cache.write().get_mut(&record_id) {
            entry.stale = true;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Arbitrate a pending conflict: write the corrected value if one was
    /// supplied, deactivate every losing value for the winner's field, and
    /// approve — as one serialized unit.
    pub async fn resolve(
        &self,
        conflict_id: ConflictId,
        request: ResolutionRequest,
        actor: &str,
    ) -> Result<Conflict> {
        let _guard = self.resolve_gate.lock().await;

        let conflict = self.conflicts.get(&conflict_id).await?;
        if conflict.status != ConflictStatus::Pending {
            return Err(EngineError::ConflictState {
                id: conflict_id,
                status: conflict.status,
            });
        }

        // A winner must come from the conflict's implicated set; anything
        // else would deactivate values of a field under no dispute.
        for id in &request.winning_value_ids {
            if !conflict.value_ids.contains(id) {
                return Err(EngineError::Validation(format!(
                    "value {id} is not implicated in conflict {conflict_id}"
                )));
            }
        }

        let mut winners = request.winning_value_ids.clone();
        let method = if let Some(new_value) = request.new_value {
            if let Some(field) = &conflict.field_name {
                let field_bound = matches!(
                    conflict.kind,
                    ConflictKind::ValueMismatch | ConflictKind::MissingRequired
                );
                if field_bound && new_value.field_name != *field {
                    return Err(EngineError::Validation(format!(
                        "replacement value targets {} but the conflict is on {field}",
                        new_value.field_name
                    )));
                }
            }

            let value = FieldValue::new(
                conflict.record_id,
                new_value.field_name,
                new_value.value,
                SourceKind::ManualEdit,
                actor,
            );
            value.validate()?;
            let id = self.values.append(value).await?;
            self.increment_stat("total_values");
            winners.push(id);
            ResolutionMethod::ManualEntry
        } else if !winners.is_empty() {
            ResolutionMethod::ChoseExisting
        } else {
            match conflict.kind {
                ConflictKind::ValueMismatch => {
                    return Err(EngineError::Validation(
                        "resolving a value mismatch requires a winning value".to_string(),
                    ));
                }
                ConflictKind::MissingRequired => {
                    return Err(EngineError::Validation(
                        "resolving a missing required field needs a value".to_string(),
                    ));
                }
                _ => ResolutionMethod::Confirmed,
            }
        };

        // Missing-required only approves once a usable value exists.
        if conflict.kind == ConflictKind::MissingRequired {
            if let Some(field) = &conflict.field_name {
                let usable = self
                    .values
                    .list_for_field(&conflict.record_id, field)
                    .await?
                    .iter()
                    .any(|v| v.active && !v.value.is_empty());
                if !usable {
                    return Err(EngineError::Validation(format!(
                        "required field {field} still has no usable value"
                    )));
                }
            }
        }

        if !winners.is_empty() {
            self.deactivate_losers(&conflict, &winners).await?;
        }

        winners.sort();
        winners.dedup();

        let mut updated = conflict;
        updated.status = ConflictStatus::Approved;
        updated.resolution = Some(Resolution {
            chosen_value_ids: winners,
            method,
            notes: request.notes,
        });
        updated.reviewed_by = Some(actor.to_string());
        updated.reviewed_at = Some(Utc::now());
        self.conflicts.update(updated.clone()).await?;
        self.increment_stat("resolutions");
        tracing::info!(%conflict_id, actor, "conflict approved");

        self.invalidate(updated.record_id).await?;
        Ok(updated)
    }

    /// Every active value on a winner's field that is not itself a winner
    /// loses. A lost update here means another actor raced us.
    async fn deactivate_losers(&self, conflict: &Conflict, winners: &[ValueId]) -> Result<()> {
        let winner_set: HashSet<ValueId> = winners.iter().copied().collect();

        let mut fields = BTreeSet::new();
        for id in winners {
            let value = self.values.get(id).await?;
            fields.insert(value.field_name);
        }

        for field in fields {
            let current = self
                .values
                .list_for_field(&conflict.record_id, &field)
                .await?;
            for value in current {
                if value.active && !winner_set.contains(&value.id) {
                    self.values.deactivate(&value.id).await?;
                    tracing::debug!(value_id = %value.id, field, "value deactivated");
                }
            }
        }
        Ok(())
    }

    /// Set a pending conflict aside without touching any value
    pub async fn defer(
        &self,
        conflict_id: ConflictId,
        notes: Option<String>,
        actor: &str,
    ) -> Result<Conflict> {
        self.close_without_changes(
            conflict_id,
            ConflictStatus::Deferred,
            ResolutionMethod::Deferred,
            notes,
            actor,
        )
        .await
    }

    /// Dismiss a pending conflict as not a real disagreement
    pub async fn reject(
        &self,
        conflict_id: ConflictId,
        notes: Option<String>,
        actor: &str,
    ) -> Result<Conflict> {
        self.close_without_changes(
            conflict_id,
            ConflictStatus::Rejected,
            ResolutionMethod::Rejected,
            notes,
            actor,
        )
        .await
    }

    async fn close_without_changes(
        &self,
        conflict_id: ConflictId,
        status: ConflictStatus,
        method: ResolutionMethod,
        notes: Option<String>,
        actor: &str,
    ) -> Result<Conflict> {
        let _guard = self.resolve_gate.lock().await;

        let mut conflict = self.conflicts.get(&conflict_id).await?;
        if conflict.status != ConflictStatus::Pending {
            return Err(EngineError::ConflictState {
                id: conflict_id,
                status: conflict.status,
            });
        }

        conflict.status = status;
        conflict.resolution = Some(Resolution {
            chosen_value_ids: Vec::new(),
            method,
            notes,
        });
        conflict.reviewed_by = Some(actor.to_string());
        conflict.reviewed_at = Some(Utc::now());
        self.conflicts.update(conflict.clone()).await?;
        tracing::info!(%conflict_id, actor, ?status, "conflict closed without data change");
        Ok(conflict)
    }

    // ------------------------------------------------------------------
    // Gate
    // ------------------------------------------------------------------

    /// Aggregate conflict state for precondition checks. Always backed by
    /// at least one detection pass for the record.
    pub async fn summary(&self, record_id: RecordId) -> Result<GateSummary> {
        let conflicts = self.get_conflicts(record_id).await?;

        let mut summary = GateSummary {
            pending: 0,
            by_priority: PriorityCounts::default(),
            resolved: 0,
            deferred: 0,
        };

        for conflict in &conflicts {
            match conflict.status {
                ConflictStatus::Pending => {
                    summary.pending += 1;
                    match conflict.priority {
                        Priority::High => summary.by_priority.high += 1,
                        Priority::Medium => summary.by_priority.medium += 1,
                        Priority::Low => summary.by_priority.low += 1,
                    }
                }
                ConflictStatus::Approved | ConflictStatus::Rejected => summary.resolved += 1,
                ConflictStatus::Deferred => summary.deferred += 1,
            }
        }

        Ok(summary)
    }

    /// True iff a pending high-priority conflict exists for the record
    pub async fn has_blocking(&self, record_id: RecordId) -> Result<bool> {
        Ok(self
            .get_conflicts(record_id)
            .await?
            .iter()
            .any(Conflict::is_blocking))
    }

    // ------------------------------------------------------------------
    // Misc
    // ------------------------------------------------------------------

    pub fn trigger_mode(&self) -> TriggerMode {
        self.trigger.read().mode()
    }

    /// Runtime mode switch; needs no migration. Previously cached results
    /// stay valid under the freshness rules until the next read.
    pub fn set_trigger_mode(&self, mode: TriggerMode) {
        tracing::info!(?mode, "trigger mode switched");
        self.trigger.write().set_mode(mode);
    }

    /// Counts from the underlying stores
    pub async fn storage_stats(&self) -> Result<crosscheck_storage::StorageStats> {
        let mut stats = self.values.stats().await?;
        let (total, pending) = self.conflicts.counts().await?;
        stats.total_conflicts = total;
        stats.pending_conflicts = pending;
        Ok(stats)
    }

    pub fn get_stats(&self) -> EngineStats {
        EngineStats {
            total_values: self.get_stat("total_values"),
            detection_passes: self.get_stat("detection_passes"),
            resolutions: self.get_stat("resolutions"),
            cache_hits: self.get_stat("cache_hits"),
            cache_misses: self.get_stat("cache_misses"),
        }
    }

    fn increment_stat(&self, key: &str) {
        self.stats
            .entry(key.to_string())
            .and_modify(|v| *v += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &str) -> u64 {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}
