//! Engine configuration

use crosscheck_detector::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide configuration consumed at engine construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trigger strategy: "immediate", "deferred", or "mixed". Unrecognized
    /// values fall back to immediate with a logged warning rather than
    /// failing startup.
    pub trigger_mode: String,

    /// Fields eligible for synchronous detection under mixed mode
    pub immediate_fields: Vec<String>,

    /// Freshness window for cached detection results
    pub cache_ttl: Duration,

    /// Thresholds, required fields, rules, and ranges for detection
    pub detector: DetectorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trigger_mode: "immediate".to_string(),
            immediate_fields: Vec::new(),
            cache_ttl: Duration::from_secs(300),
            detector: DetectorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trigger_mode(mut self, mode: impl Into<String>) -> Self {
        self.trigger_mode = mode.into();
        self
    }

    pub fn with_immediate_fields(mut self, fields: Vec<String>) -> Self {
        self.immediate_fields = fields;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }
}
