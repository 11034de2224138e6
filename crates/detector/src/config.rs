//! Detection configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declarative cross-field rule, checked against the active value set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrossFieldRule {
    /// The earlier field's date must strictly precede the later field's
    DateOrder { earlier: String, later: String },

    /// The smaller field's number must not exceed the larger field's
    NumericOrder { smaller: String, larger: String },
}

impl CrossFieldRule {
    pub fn describe(&self) -> String {
        match self {
            Self::DateOrder { earlier, later } => {
                format!("{earlier} must precede {later}")
            }
            Self::NumericOrder { smaller, larger } => {
                format!("{smaller} must not exceed {larger}")
            }
        }
    }
}

/// Detector configuration: thresholds, required fields, rules, ranges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Automated extractions at/above this confidence are taken as-is
    pub auto_accept_threshold: f64,

    /// Automated extractions below this confidence need human verification
    pub needs_verification_threshold: f64,

    /// Fields that must have a usable active value
    pub required_fields: Vec<String>,

    /// Declarative cross-field rules
    pub cross_field_rules: Vec<CrossFieldRule>,

    /// Allowed [min, max] per numeric field
    pub outlier_ranges: HashMap<String, (f64, f64)>,

    /// Relative numeric difference above which a mismatch is high priority
    pub mismatch_magnitude: f64,

    /// Date gap in days above which a mismatch is high priority
    pub mismatch_date_days: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            auto_accept_threshold: 0.95,
            needs_verification_threshold: 0.75,
            required_fields: Vec::new(),
            cross_field_rules: Vec::new(),
            outlier_ranges: HashMap::new(),
            mismatch_magnitude: 0.1,
            mismatch_date_days: 30,
        }
    }
}

impl DetectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(mut self, auto_accept: f64, needs_verification: f64) -> Self {
        self.auto_accept_threshold = auto_accept.clamp(0.0, 1.0);
        self.needs_verification_threshold = needs_verification.clamp(0.0, 1.0);
        self
    }

    pub fn with_required_fields(mut self, fields: Vec<String>) -> Self {
        self.required_fields = fields;
        self
    }

    pub fn with_cross_field_rules(mut self, rules: Vec<CrossFieldRule>) -> Self {
        self.cross_field_rules = rules;
        self
    }

    pub fn with_outlier_range(mut self, field: impl Into<String>, min: f64, max: f64) -> Self {
        self.outlier_ranges.insert(field.into(), (min, max));
        self
    }

    pub fn with_mismatch_magnitude(mut self, magnitude: f64) -> Self {
        self.mismatch_magnitude = magnitude;
        self
    }

    pub fn with_mismatch_date_days(mut self, days: i64) -> Self {
        self.mismatch_date_days = days;
        self
    }
}
