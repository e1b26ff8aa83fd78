// ⚙️ Engine Configuration - Aliases, tier tables and trend settings as data
// Every section is optional in the JSON file and falls back to the
// standard fiscal-year extract layout.

use crate::columns::AliasRegistry;
use crate::tiers::TierTable;
use crate::transitions::TransitionWindow;
use crate::trends::TrendSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Canonical field → accepted header aliases
    #[serde(default)]
    pub columns: AliasRegistry,

    /// Tiers used for donor lists and per-year tier counts
    #[serde(default = "TierTable::giving_tiers")]
    pub giving_tiers: TierTable,

    /// Tiers used when counting tier-to-tier movement
    #[serde(default = "TierTable::ladder_tiers")]
    pub transition_tiers: TierTable,

    #[serde(default)]
    pub transitions: TransitionWindow,

    #[serde(default)]
    pub trend: TrendSettings,
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse engine config JSON")
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            columns: AliasRegistry::standard(),
            giving_tiers: TierTable::giving_tiers(),
            transition_tiers: TierTable::ladder_tiers(),
            transitions: TransitionWindow::default(),
            trend: TrendSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::CanonicalField;
    use crate::donor::FiscalYear;

    #[test]
    fn test_empty_object_is_default() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{
            "columns": {"vanId": ["Donor ID"]},
            "transitions": {"from_year": "FY23", "skip_missing": true},
            "trend": {"detect_fluctuation": true}
        }"#;
        let config = EngineConfig::from_json(json).unwrap();

        assert_eq!(config.columns.aliases_for(CanonicalField::Identifier), ["Donor ID"]);
        assert_eq!(config.transitions.from_year, FiscalYear::Fy23);
        assert_eq!(config.transitions.to_year, FiscalYear::Fy25);
        assert!(config.transitions.skip_missing);
        assert!(config.trend.detect_fluctuation);
        assert_eq!(config.trend.consistency_threshold_pct, 10.0);
        assert_eq!(config.giving_tiers, TierTable::giving_tiers());
    }

    #[test]
    fn test_invalid_tier_table_rejected() {
        let json = r#"{"giving_tiers": {"bands": [{"label": "big", "min": 100}]}}"#;
        let err = EngineConfig::from_json(json).unwrap_err();
        assert!(format!("{:#}", err).contains("must be <= 0"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{"trend": {"consistency_threshold_pct": 5.0}}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.trend.consistency_threshold_pct, 5.0);

        assert!(EngineConfig::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_default_round_trips_through_json() {
        let json = serde_json::to_string(&EngineConfig::default()).unwrap();
        let back = EngineConfig::from_json(&json).unwrap();
        assert_eq!(back, EngineConfig::default());
    }
}
