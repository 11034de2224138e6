//! Per-kind value normalization
//!
//! Every helper here is total: input that fails to parse maps to
//! [`Normalized::Opaque`] rather than an error, so malformed data surfaces
//! as a detection finding instead of crashing a pass.

use chrono::NaiveDate;
use crosscheck_core::{FieldKind, TypedValue, ValueId};

/// Canonical form of a field value used for equality grouping
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Number(f64),
    Date(NaiveDate),
    Text(String),
    Bool(bool),

    /// Raw form did not parse under its declared kind. Each opaque value is
    /// its own equivalence class, so two sources disagreeing in garbage
    /// still show up as a mismatch.
    Opaque(ValueId),
}

impl Normalized {
    /// Stable grouping key. Two values agree iff their keys are equal.
    pub fn key(&self) -> String {
        match self {
            Self::Number(n) => format!("n:{n}"),
            Self::Date(d) => format!("d:{d}"),
            Self::Text(t) => format!("t:{t}"),
            Self::Bool(b) => format!("b:{b}"),
            Self::Opaque(id) => format!("opaque:{id}"),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// Normalize a typed value under its declared kind
pub fn normalize(value: &TypedValue, id: ValueId) -> Normalized {
    match value.kind {
        FieldKind::Numeric => parse_number(&value.raw)
            .map(Normalized::Number)
            .unwrap_or(Normalized::Opaque(id)),
        FieldKind::Date => parse_date(&value.raw)
            .map(Normalized::Date)
            .unwrap_or(Normalized::Opaque(id)),
        FieldKind::Boolean => parse_bool(&value.raw)
            .map(Normalized::Bool)
            .unwrap_or(Normalized::Opaque(id)),
        FieldKind::Text => {
            let folded = fold_text(&value.raw);
            if folded.is_empty() {
                Normalized::Opaque(id)
            } else {
                Normalized::Text(folded)
            }
        }
    }
}

/// Parse a numeric string, tolerating currency symbols, thousands
/// separators, and surrounding whitespace
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | '_' | ' '))
        .collect();

    let parsed: f64 = cleaned.parse().ok()?;
    if parsed.is_finite() {
        Some(parsed)
    } else {
        None
    }
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

/// Parse common date layouts to a canonical date
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Case fold and collapse whitespace
pub fn fold_text(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse common boolean spellings
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
