//! Sources observed in an experiment.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Target,
    PhaseCal,
    Fringefinder,
    Other,
}

/// A source from the correlated data, with the type it had in the
/// observing schedule and whether its data are proprietary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub kind: SourceType,
    /// Proprietary data: must not be publicly archived before release.
    #[serde(default)]
    pub protected: bool,
}

impl Source {
    pub fn new(name: &str, kind: SourceType, protected: bool) -> Self {
        Self { name: name.trim().to_string(), kind, protected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_serializes_snake_case() {
        let s = Source::new("J1159+2914", SourceType::PhaseCal, false);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"phase_cal\""));
        let back: Source = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, SourceType::PhaseCal);
    }

    #[test]
    fn protected_defaults_to_false_on_old_snapshots() {
        let back: Source =
            serde_json::from_str(r#"{"name":"3C84","kind":"fringefinder"}"#).unwrap();
        assert!(!back.protected);
    }
}
