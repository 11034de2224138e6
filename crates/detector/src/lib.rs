//! Pure conflict detection engine
//!
//! `detect` is a deterministic function from a set of provenance-tagged
//! field values to a list of conflicts. No I/O, no clocks besides the
//! `detected_at` stamp on emitted rows, no suspension points; safe to call
//! repeatedly and in parallel for different records. Identical input sets
//! (order-independent) yield identical conflict sets modulo timestamps.

pub mod config;
pub mod normalize;

pub use config::{CrossFieldRule, DetectorConfig};
pub use normalize::{fold_text, normalize, parse_bool, parse_date, parse_number, Normalized};

use crosscheck_core::{
    Conflict, ConflictDetail, ConflictKind, CrossFieldViolation, FieldValue, MismatchGroup,
    Priority, RecordId, ValueId,
};
use std::collections::{BTreeMap, BTreeSet};

/// Run every sub-detector over the active values of a record
pub fn detect(record_id: RecordId, values: &[FieldValue], config: &DetectorConfig) -> Vec<Conflict> {
    let active: Vec<&FieldValue> = values
        .iter()
        .filter(|v| v.active && v.record_id == record_id)
        .collect();

    let mut conflicts = Vec::new();
    conflicts.extend(detect_mismatches(record_id, &active, config));
    conflicts.extend(detect_low_confidence(record_id, &active, config));
    conflicts.extend(detect_missing_required(record_id, &active, config));
    conflicts.extend(detect_cross_field(record_id, &active, config));
    conflicts.extend(detect_outliers(record_id, &active, config));

    conflicts.sort_by(|a, b| (a.kind, &a.field_name).cmp(&(b.kind, &b.field_name)));
    conflicts
}

/// Active values grouped by field name, each group sorted by id
fn by_field<'a>(active: &[&'a FieldValue]) -> BTreeMap<&'a str, Vec<&'a FieldValue>> {
    let mut fields: BTreeMap<&str, Vec<&FieldValue>> = BTreeMap::new();
    for value in active {
        fields.entry(value.field_name.as_str()).or_default().push(value);
    }
    for group in fields.values_mut() {
        group.sort_by_key(|v| v.id);
    }
    fields
}

fn detect_mismatches(
    record_id: RecordId,
    active: &[&FieldValue],
    config: &DetectorConfig,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for (field, values) in by_field(active) {
        if values.len() < 2 {
            continue;
        }

        let mut groups: BTreeMap<String, Vec<ValueId>> = BTreeMap::new();
        let mut norms: Vec<Normalized> = Vec::with_capacity(values.len());
        for value in &values {
            let norm = normalize(&value.value, value.id);
            groups.entry(norm.key()).or_default().push(value.id);
            norms.push(norm);
        }

        if groups.len() < 2 {
            continue;
        }

        let mut value_ids: Vec<ValueId> = values.iter().map(|v| v.id).collect();
        value_ids.sort();

        let detail = ConflictDetail::ValueMismatch {
            groups: groups
                .into_iter()
                .map(|(normalized, mut ids)| {
                    ids.sort();
                    MismatchGroup {
                        normalized,
                        value_ids: ids,
                    }
                })
                .collect(),
        };

        conflicts.push(Conflict::new(
            record_id,
            ConflictKind::ValueMismatch,
            Some(field.to_string()),
            mismatch_priority(&norms, config),
            value_ids,
            detail,
        ));
    }

    conflicts
}

/// High when the normalized spread exceeds the configured magnitude,
/// otherwise medium. Text, boolean, and opaque disagreements stay medium.
fn mismatch_priority(norms: &[Normalized], config: &DetectorConfig) -> Priority {
    let numbers: Vec<f64> = norms.iter().filter_map(Normalized::as_number).collect();
    if numbers.len() >= 2 {
        let min = numbers.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let scale = min.abs().max(max.abs()).max(f64::EPSILON);
        if (max - min) / scale > config.mismatch_magnitude {
            return Priority::High;
        }
    }

    let dates: Vec<_> = norms.iter().filter_map(Normalized::as_date).collect();
    if dates.len() >= 2 {
        let min = dates.iter().min().copied();
        let max = dates.iter().max().copied();
        if let (Some(min), Some(max)) = (min, max) {
            if (max - min).num_days() > config.mismatch_date_days {
                return Priority::High;
            }
        }
    }

    Priority::Medium
}

fn detect_low_confidence(
    record_id: RecordId,
    active: &[&FieldValue],
    config: &DetectorConfig,
) -> Vec<Conflict> {
    let mut per_field: BTreeMap<&str, Vec<(&FieldValue, f64)>> = BTreeMap::new();

    for value in active {
        if value.source != crosscheck_core::SourceKind::AutomatedExtraction {
            continue;
        }
        let Some(confidence) = value.confidence else {
            continue;
        };
        // At or above auto-accept never triggers, whatever the other
        // thresholds say; such values still participate in mismatch checks.
        if confidence >= config.auto_accept_threshold {
            continue;
        }
        if confidence < config.needs_verification_threshold {
            per_field
                .entry(value.field_name.as_str())
                .or_default()
                .push((value, confidence));
        }
    }

    per_field
        .into_iter()
        .map(|(field, mut hits)| {
            hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            let (weakest, confidence) = hits[0];
            let mut value_ids: Vec<ValueId> = hits.iter().map(|(v, _)| v.id).collect();
            value_ids.sort();

            Conflict::new(
                record_id,
                ConflictKind::LowConfidence,
                Some(field.to_string()),
                Priority::Medium,
                value_ids,
                ConflictDetail::LowConfidence {
                    value_id: weakest.id,
                    confidence,
                    threshold: config.needs_verification_threshold,
                },
            )
        })
        .collect()
}

fn detect_missing_required(
    record_id: RecordId,
    active: &[&FieldValue],
    config: &DetectorConfig,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for field in &config.required_fields {
        let present: Vec<&&FieldValue> = active
            .iter()
            .filter(|v| v.field_name == *field)
            .collect();

        let usable = present.iter().any(|v| !v.value.is_empty());
        if usable {
            continue;
        }

        // Reference the empty placeholders when they exist, so the reviewer
        // sees what the sources actually sent.
        let mut value_ids: Vec<ValueId> = present.iter().map(|v| v.id).collect();
        value_ids.sort();

        conflicts.push(Conflict::new(
            record_id,
            ConflictKind::MissingRequired,
            Some(field.clone()),
            Priority::High,
            value_ids,
            ConflictDetail::MissingRequired {
                field_name: field.clone(),
            },
        ));
    }

    conflicts
}

fn detect_cross_field(
    record_id: RecordId,
    active: &[&FieldValue],
    config: &DetectorConfig,
) -> Vec<Conflict> {
    let fields = by_field(active);
    let mut violations = Vec::new();
    let mut implicated: BTreeSet<ValueId> = BTreeSet::new();

    for rule in &config.cross_field_rules {
        let (left_field, right_field) = match rule {
            CrossFieldRule::DateOrder { earlier, later } => (earlier, later),
            CrossFieldRule::NumericOrder { smaller, larger } => (smaller, larger),
        };

        let left = fields.get(left_field.as_str()).cloned().unwrap_or_default();
        let right = fields.get(right_field.as_str()).cloned().unwrap_or_default();

        let mut violating: BTreeSet<ValueId> = BTreeSet::new();
        for l in &left {
            for r in &right {
                let violated = match rule {
                    CrossFieldRule::DateOrder { .. } => {
                        match (
                            normalize(&l.value, l.id).as_date(),
                            normalize(&r.value, r.id).as_date(),
                        ) {
                            (Some(earlier), Some(later)) => earlier >= later,
                            _ => false,
                        }
                    }
                    CrossFieldRule::NumericOrder { .. } => {
                        match (
                            normalize(&l.value, l.id).as_number(),
                            normalize(&r.value, r.id).as_number(),
                        ) {
                            (Some(smaller), Some(larger)) => smaller > larger,
                            _ => false,
                        }
                    }
                };
                if violated {
                    violating.insert(l.id);
                    violating.insert(r.id);
                }
            }
        }

        if !violating.is_empty() {
            implicated.extend(violating.iter().copied());
            violations.push(CrossFieldViolation {
                rule: rule.describe(),
                left_field: left_field.clone(),
                right_field: right_field.clone(),
                value_ids: violating.into_iter().collect(),
            });
        }
    }

    if violations.is_empty() {
        return Vec::new();
    }

    // One row per record: the cross-field upsert key has no field name.
    vec![Conflict::new(
        record_id,
        ConflictKind::CrossField,
        None,
        Priority::High,
        implicated.into_iter().collect(),
        ConflictDetail::CrossField { violations },
    )]
}

fn detect_outliers(
    record_id: RecordId,
    active: &[&FieldValue],
    config: &DetectorConfig,
) -> Vec<Conflict> {
    let fields = by_field(active);
    let mut ranges: Vec<(&String, &(f64, f64))> = config.outlier_ranges.iter().collect();
    ranges.sort_by_key(|(field, _)| field.as_str());

    let mut conflicts = Vec::new();

    for (field, (min, max)) in ranges {
        let Some(values) = fields.get(field.as_str()) else {
            continue;
        };

        let offenders: Vec<(&&FieldValue, f64)> = values
            .iter()
            .filter_map(|v| {
                normalize(&v.value, v.id)
                    .as_number()
                    .filter(|n| n < min || n > max)
                    .map(|n| (v, n))
            })
            .collect();

        if offenders.is_empty() {
            continue;
        }

        let mut value_ids: Vec<ValueId> = offenders.iter().map(|(v, _)| v.id).collect();
        value_ids.sort();
        let (first, number) = offenders[0];

        conflicts.push(Conflict::new(
            record_id,
            ConflictKind::Outlier,
            Some(field.clone()),
            Priority::Medium,
            value_ids,
            ConflictDetail::Outlier {
                value_id: first.id,
                value: number,
                min: *min,
                max: *max,
            },
        ));
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosscheck_core::{SourceKind, TypedValue};

    fn value(
        record_id: RecordId,
        field: &str,
        typed: TypedValue,
        source: SourceKind,
    ) -> FieldValue {
        FieldValue::new(record_id, field, typed, source, "test")
    }

    fn kinds(conflicts: &[Conflict]) -> Vec<ConflictKind> {
        conflicts.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn test_scenario_a_revenue_mismatch() {
        let record_id = RecordId::new();
        let extracted = value(
            record_id,
            "annual_revenue",
            TypedValue::numeric("5,000,000"),
            SourceKind::AutomatedExtraction,
        )
        .with_confidence(0.85);
        let form = value(
            record_id,
            "annual_revenue",
            TypedValue::numeric("8200000"),
            SourceKind::StructuredForm,
        );

        let conflicts = detect(
            record_id,
            &[extracted.clone(), form.clone()],
            &DetectorConfig::default(),
        );

        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::ValueMismatch);
        assert_eq!(conflict.priority, Priority::High);
        assert_eq!(conflict.field_name.as_deref(), Some("annual_revenue"));

        let mut expected = vec![extracted.id, form.id];
        expected.sort();
        assert_eq!(conflict.value_ids, expected);
    }

    #[test]
    fn test_agreeing_values_no_mismatch() {
        let record_id = RecordId::new();
        let conflicts = detect(
            record_id,
            &[
                value(
                    record_id,
                    "annual_revenue",
                    TypedValue::numeric("$5,000,000"),
                    SourceKind::AutomatedExtraction,
                )
                .with_confidence(0.99),
                value(
                    record_id,
                    "annual_revenue",
                    TypedValue::numeric("5000000.00"),
                    SourceKind::StructuredForm,
                ),
            ],
            &DetectorConfig::default(),
        );

        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_small_difference_is_medium() {
        let record_id = RecordId::new();
        let conflicts = detect(
            record_id,
            &[
                value(
                    record_id,
                    "headcount",
                    TypedValue::numeric("100"),
                    SourceKind::StructuredForm,
                ),
                value(
                    record_id,
                    "headcount",
                    TypedValue::numeric("103"),
                    SourceKind::ManualEdit,
                ),
            ],
            &DetectorConfig::default(),
        );

        assert_eq!(kinds(&conflicts), vec![ConflictKind::ValueMismatch]);
        assert_eq!(conflicts[0].priority, Priority::Medium);
    }

    #[test]
    fn test_determinism_is_order_independent() {
        let record_id = RecordId::new();
        let config = DetectorConfig::default()
            .with_required_fields(vec!["effective_date".to_string()])
            .with_outlier_range("headcount", 0.0, 1000.0);

        let values = vec![
            value(
                record_id,
                "annual_revenue",
                TypedValue::numeric("5000000"),
                SourceKind::AutomatedExtraction,
            )
            .with_confidence(0.6),
            value(
                record_id,
                "annual_revenue",
                TypedValue::numeric("8200000"),
                SourceKind::StructuredForm,
            ),
            value(
                record_id,
                "headcount",
                TypedValue::numeric("5000"),
                SourceKind::StructuredForm,
            ),
        ];

        let forward = detect(record_id, &values, &config);
        let mut reversed_input = values.clone();
        reversed_input.reverse();
        let reversed = detect(record_id, &reversed_input, &config);

        assert_eq!(forward.len(), reversed.len());
        for (a, b) in forward.iter().zip(reversed.iter()) {
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.field_name, b.field_name);
            assert_eq!(a.priority, b.priority);
            assert_eq!(a.value_ids, b.value_ids);
            assert_eq!(a.detail, b.detail);
        }
    }

    #[test]
    fn test_low_confidence_threshold() {
        let record_id = RecordId::new();
        let config = DetectorConfig::default();

        let weak = value(
            record_id,
            "company_name",
            TypedValue::text("Acme Corp"),
            SourceKind::AutomatedExtraction,
        )
        .with_confidence(0.5);

        let conflicts = detect(record_id, &[weak.clone()], &config);
        assert_eq!(kinds(&conflicts), vec![ConflictKind::LowConfidence]);
        assert_eq!(conflicts[0].priority, Priority::Medium);
        assert_eq!(conflicts[0].value_ids, vec![weak.id]);
    }

    #[test]
    fn test_auto_accept_never_flags_confidence() {
        let record_id = RecordId::new();
        let strong = value(
            record_id,
            "company_name",
            TypedValue::text("Acme Corp"),
            SourceKind::AutomatedExtraction,
        )
        .with_confidence(0.97);

        let conflicts = detect(record_id, &[strong], &DetectorConfig::default());
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_auto_accepted_values_still_mismatch() {
        let record_id = RecordId::new();
        let conflicts = detect(
            record_id,
            &[
                value(
                    record_id,
                    "company_name",
                    TypedValue::text("Acme Corp"),
                    SourceKind::AutomatedExtraction,
                )
                .with_confidence(0.99),
                value(
                    record_id,
                    "company_name",
                    TypedValue::text("Acme Corporation"),
                    SourceKind::StructuredForm,
                ),
            ],
            &DetectorConfig::default(),
        );

        assert_eq!(kinds(&conflicts), vec![ConflictKind::ValueMismatch]);
    }

    #[test]
    fn test_manual_values_never_flag_confidence() {
        let record_id = RecordId::new();
        // Confidence only gates automated extractions.
        let manual = value(
            record_id,
            "company_name",
            TypedValue::text("Acme"),
            SourceKind::ManualEdit,
        )
        .with_confidence(0.1);

        let conflicts = detect(record_id, &[manual], &DetectorConfig::default());
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_scenario_b_missing_required() {
        let record_id = RecordId::new();
        let config =
            DetectorConfig::default().with_required_fields(vec!["effective_date".to_string()]);

        let conflicts = detect(record_id, &[], &config);
        assert_eq!(kinds(&conflicts), vec![ConflictKind::MissingRequired]);
        assert_eq!(conflicts[0].priority, Priority::High);
        assert_eq!(conflicts[0].field_name.as_deref(), Some("effective_date"));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let record_id = RecordId::new();
        let config =
            DetectorConfig::default().with_required_fields(vec!["effective_date".to_string()]);

        let blank = value(
            record_id,
            "effective_date",
            TypedValue::date("   "),
            SourceKind::AutomatedExtraction,
        )
        .with_confidence(0.99);

        let conflicts = detect(record_id, &[blank.clone()], &config);
        let missing: Vec<_> = conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::MissingRequired)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].value_ids, vec![blank.id]);
    }

    #[test]
    fn test_cross_field_date_order() {
        let record_id = RecordId::new();
        let config = DetectorConfig::default().with_cross_field_rules(vec![
            CrossFieldRule::DateOrder {
                earlier: "effective_date".to_string(),
                later: "expiration_date".to_string(),
            },
        ]);

        let effective = value(
            record_id,
            "effective_date",
            TypedValue::date("2025-06-01"),
            SourceKind::StructuredForm,
        );
        let expiration = value(
            record_id,
            "expiration_date",
            TypedValue::date("2024-01-01"),
            SourceKind::StructuredForm,
        );

        let conflicts = detect(
            record_id,
            &[effective.clone(), expiration.clone()],
            &config,
        );
        assert_eq!(kinds(&conflicts), vec![ConflictKind::CrossField]);
        let conflict = &conflicts[0];
        assert_eq!(conflict.field_name, None);
        assert_eq!(conflict.priority, Priority::High);

        let mut expected = vec![effective.id, expiration.id];
        expected.sort();
        assert_eq!(conflict.value_ids, expected);
    }

    #[test]
    fn test_cross_field_ordered_dates_pass() {
        let record_id = RecordId::new();
        let config = DetectorConfig::default().with_cross_field_rules(vec![
            CrossFieldRule::DateOrder {
                earlier: "effective_date".to_string(),
                later: "expiration_date".to_string(),
            },
        ]);

        let conflicts = detect(
            record_id,
            &[
                value(
                    record_id,
                    "effective_date",
                    TypedValue::date("2024-01-01"),
                    SourceKind::StructuredForm,
                ),
                value(
                    record_id,
                    "expiration_date",
                    TypedValue::date("2025-06-01"),
                    SourceKind::StructuredForm,
                ),
            ],
            &config,
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_outlier_range() {
        let record_id = RecordId::new();
        let config = DetectorConfig::default().with_outlier_range("headcount", 1.0, 10_000.0);

        let outlier = value(
            record_id,
            "headcount",
            TypedValue::numeric("250000"),
            SourceKind::StructuredForm,
        );

        let conflicts = detect(record_id, &[outlier.clone()], &config);
        assert_eq!(kinds(&conflicts), vec![ConflictKind::Outlier]);
        assert_eq!(conflicts[0].priority, Priority::Medium);
        assert_eq!(conflicts[0].value_ids, vec![outlier.id]);
    }

    #[test]
    fn test_unparsable_values_surface_as_mismatch() {
        let record_id = RecordId::new();
        let conflicts = detect(
            record_id,
            &[
                value(
                    record_id,
                    "annual_revenue",
                    TypedValue::numeric("about five million"),
                    SourceKind::AutomatedExtraction,
                )
                .with_confidence(0.99),
                value(
                    record_id,
                    "annual_revenue",
                    TypedValue::numeric("5000000"),
                    SourceKind::StructuredForm,
                ),
            ],
            &DetectorConfig::default(),
        );

        // Detection never fails on garbage; it reports it.
        assert_eq!(kinds(&conflicts), vec![ConflictKind::ValueMismatch]);
    }

    #[test]
    fn test_inactive_values_are_ignored() {
        let record_id = RecordId::new();
        let mut superseded = value(
            record_id,
            "annual_revenue",
            TypedValue::numeric("5000000"),
            SourceKind::AutomatedExtraction,
        )
        .with_confidence(0.85);
        superseded.active = false;

        let winner = value(
            record_id,
            "annual_revenue",
            TypedValue::numeric("8200000"),
            SourceKind::StructuredForm,
        );

        let conflicts = detect(
            record_id,
            &[superseded, winner],
            &DetectorConfig::default(),
        );
        assert!(conflicts.is_empty());
    }
}
