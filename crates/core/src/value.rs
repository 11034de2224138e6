//! Field value structures and provenance metadata

use crate::types::{RecordId, ValueId};
use crate::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a field value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Produced by the automated document extraction pipeline
    AutomatedExtraction,

    /// Entered through a structured form
    StructuredForm,

    /// Typed in by a human, including resolution-time corrections
    ManualEdit,

    /// Bulk-imported from a legacy system
    Migration,
}

/// Declared type of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Numeric,
    Text,
    Date,
    Boolean,
}

/// A typed value as written: declared kind plus the raw form the source
/// supplied. Normalization happens in the detector; malformed raw input is
/// stored untouched so detection can flag it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    pub kind: FieldKind,
    pub raw: String,
}

impl TypedValue {
    pub fn numeric(raw: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Numeric,
            raw: raw.into(),
        }
    }

    pub fn text(raw: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Text,
            raw: raw.into(),
        }
    }

    pub fn date(raw: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Date,
            raw: raw.into(),
        }
    }

    pub fn boolean(raw: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Boolean,
            raw: raw.into(),
        }
    }

    /// True if the raw form is empty after trimming
    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }
}

/// Reference to the document a value was extracted from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: String,
    pub page: Option<u32>,
}

/// A provenance-tagged field value in the append-mostly ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValue {
    /// Unique identifier (UUIDv7 for temporal sorting)
    pub id: ValueId,

    /// Owning record
    pub record_id: RecordId,

    /// Field this value belongs to
    pub field_name: String,

    /// The value as written
    pub value: TypedValue,

    /// Provenance
    pub source: SourceKind,

    /// Extraction confidence in [0, 1], when the source reports one
    pub confidence: Option<f64>,

    /// Originating document, when known
    pub document: Option<DocumentRef>,

    /// Free-form extraction metadata
    pub metadata: HashMap<String, serde_json::Value>,

    /// Flipped to false only by the resolution engine; rows are never deleted
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl FieldValue {
    pub fn new(
        record_id: RecordId,
        field_name: impl Into<String>,
        value: TypedValue,
        source: SourceKind,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: ValueId::new(),
            record_id,
            field_name: field_name.into(),
            value,
            source,
            confidence: None,
            document: None,
            metadata: HashMap::new(),
            active: true,
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_document(mut self, document: DocumentRef) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Boundary validation for writes. Malformed *values* are accepted (the
    /// detector flags them); malformed *envelopes* are not.
    pub fn validate(&self) -> Result<()> {
        if self.field_name.trim().is_empty() {
            return Err(CoreError::EmptyFieldName);
        }
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) || c.is_nan() {
                return Err(CoreError::ConfidenceOutOfRange(c));
            }
        }
        Ok(())
    }
}
