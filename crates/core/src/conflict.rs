//! Conflict (review item) structures

use crate::types::{ConflictId, RecordId, ValueId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of disagreement the detector can surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two or more active values for a field normalize to different forms
    ValueMismatch,

    /// An automated extraction fell below the verification threshold
    LowConfidence,

    /// A required field has no usable active value
    MissingRequired,

    /// A declarative rule across two fields is violated
    CrossField,

    /// A numeric value is outside its configured range
    Outlier,
}

/// Review priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Lifecycle of a review item. Pending is the only non-terminal state;
/// transitions out of it are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Pending,
    Approved,
    Rejected,
    Deferred,
}

impl ConflictStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Upsert key: at most one conflict row exists per (record, kind, field)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub record_id: RecordId,
    pub kind: ConflictKind,
    pub field_name: Option<String>,
}

/// One group of values sharing a normalized form within a mismatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchGroup {
    /// Canonical key of the normalized form
    pub normalized: String,

    /// Values that normalize to it
    pub value_ids: Vec<ValueId>,
}

/// Structured description of what the detector found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConflictDetail {
    ValueMismatch {
        groups: Vec<MismatchGroup>,
    },
    LowConfidence {
        value_id: ValueId,
        confidence: f64,
        threshold: f64,
    },
    MissingRequired {
        field_name: String,
    },
    CrossField {
        violations: Vec<CrossFieldViolation>,
    },
    Outlier {
        value_id: ValueId,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// A single violated cross-field rule within a cross-field conflict.
/// All violations for a record share one row, since the upsert key for
/// cross-field findings carries no field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossFieldViolation {
    pub rule: String,
    pub left_field: String,
    pub right_field: String,
    pub value_ids: Vec<ValueId>,
}

/// How a reviewer settled a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// Picked one of the implicated values as the winner
    ChoseExisting,

    /// Supplied a brand-new manually entered value
    ManualEntry,

    /// Confirmed the data as-is (low confidence / outlier sign-off)
    Confirmed,

    /// Set aside for later without touching any value
    Deferred,

    /// Dismissed as not a real disagreement
    Rejected,
}

/// Audit payload recorded when a conflict leaves Pending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub chosen_value_ids: Vec<ValueId>,
    pub method: ResolutionMethod,
    pub notes: Option<String>,
}

/// A detected disagreement requiring human adjudication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    pub record_id: RecordId,
    pub kind: ConflictKind,

    /// None only for cross-field findings
    pub field_name: Option<String>,

    pub priority: Priority,
    pub status: ConflictStatus,

    /// Every implicated value id must exist in the value ledger
    pub value_ids: Vec<ValueId>,

    pub detail: ConflictDetail,
    pub resolution: Option<Resolution>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub detected_at: DateTime<Utc>,

    /// Orthogonal to status; set when the underlying values changed since
    /// the last detection pass, cleared by the next one
    pub stale: bool,
}

impl Conflict {
    pub fn new(
        record_id: RecordId,
        kind: ConflictKind,
        field_name: Option<String>,
        priority: Priority,
        value_ids: Vec<ValueId>,
        detail: ConflictDetail,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            record_id,
            kind,
            field_name,
            priority,
            status: ConflictStatus::Pending,
            value_ids,
            detail,
            resolution: None,
            reviewed_by: None,
            reviewed_at: None,
            detected_at: Utc::now(),
            stale: false,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            record_id: self.record_id,
            kind: self.kind,
            field_name: self.field_name.clone(),
        }
    }

    /// A pending high-priority conflict blocks the downstream gate
    pub fn is_blocking(&self) -> bool {
        self.status == ConflictStatus::Pending && self.priority == Priority::High
    }
}
