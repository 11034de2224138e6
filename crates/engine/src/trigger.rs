//! Trigger strategy: when detection runs relative to writes

use std::collections::HashSet;

/// When detection runs relative to writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Detect synchronously after every write
    Immediate,

    /// Never detect on write; only mark the record's cache stale
    Deferred,

    /// Immediate for a configured field subset, deferred otherwise
    Mixed,
}

impl TriggerMode {
    /// Parse the configured mode string. Unrecognized values default to
    /// immediate with a warning; startup never fails on this.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "immediate" => Self::Immediate,
            "deferred" => Self::Deferred,
            "mixed" => Self::Mixed,
            other => {
                tracing::warn!(
                    mode = other,
                    "unrecognized trigger mode, defaulting to immediate"
                );
                Self::Immediate
            }
        }
    }
}

impl std::fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Deferred => write!(f, "deferred"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// What the controller decided for a given write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    DetectNow,
    MarkStale,
}

/// Policy object consulted on every value write
#[derive(Debug, Clone)]
pub struct TriggerController {
    mode: TriggerMode,
    immediate_fields: HashSet<String>,
}

impl TriggerController {
    pub fn new(mode: TriggerMode, immediate_fields: impl IntoIterator<Item = String>) -> Self {
        Self {
            mode,
            immediate_fields: immediate_fields.into_iter().collect(),
        }
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TriggerMode) {
        self.mode = mode;
    }

    /// Decide whether a write to this field runs detection synchronously
    pub fn action_for(&self, field_name: &str) -> TriggerAction {
        match self.mode {
            TriggerMode::Immediate => TriggerAction::DetectNow,
            TriggerMode::Deferred => TriggerAction::MarkStale,
            TriggerMode::Mixed => {
                if self.immediate_fields.contains(field_name) {
                    TriggerAction::DetectNow
                } else {
                    TriggerAction::MarkStale
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_modes() {
        assert_eq!(TriggerMode::parse("immediate"), TriggerMode::Immediate);
        assert_eq!(TriggerMode::parse("Deferred"), TriggerMode::Deferred);
        assert_eq!(TriggerMode::parse(" mixed "), TriggerMode::Mixed);
    }

    #[test]
    fn test_parse_unknown_mode_defaults_to_immediate() {
        assert_eq!(TriggerMode::parse("eventual"), TriggerMode::Immediate);
        assert_eq!(TriggerMode::parse(""), TriggerMode::Immediate);
    }

    #[test]
    fn test_mixed_mode_field_subset() {
        let controller = TriggerController::new(
            TriggerMode::Mixed,
            vec!["annual_revenue".to_string()],
        );

        assert_eq!(
            controller.action_for("annual_revenue"),
            TriggerAction::DetectNow
        );
        assert_eq!(controller.action_for("notes"), TriggerAction::MarkStale);
    }

    #[test]
    fn test_immediate_and_deferred() {
        let immediate = TriggerController::new(TriggerMode::Immediate, vec![]);
        assert_eq!(immediate.action_for("anything"), TriggerAction::DetectNow);

        let deferred = TriggerController::new(TriggerMode::Deferred, vec![]);
        assert_eq!(deferred.action_for("anything"), TriggerAction::MarkStale);
    }
}
