//! Engine configuration
//!
//! All tunables of a reconstruction run, loadable from a JSON document.
//! Missing keys take their defaults, so `{}` is a valid configuration.

use crate::adapters::ColumnSchema;
use crate::builder::{IntervalBuilder, RulePolicy};
use crate::complement::{ComplementComputer, DEFAULT_MIN_GAP_SECONDS};
use crate::error::ComputeError;
use crate::normalizer::{TimestampNormalizer, DEFAULT_DESCRIPTIVE_PHRASES};
use crate::types::DayIndex;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of trial days (day indices 0..=3)
pub const DEFAULT_TRIAL_DAYS: DayIndex = 4;

/// Upper bound on trial days accepted by `validate`
pub const MAX_TRIAL_DAYS: DayIndex = 31;

/// Configuration for a reconstruction run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Non-wear gaps shorter than this are dropped
    pub min_gap_seconds: i64,
    /// Number of day indices per subject
    pub trial_days: DayIndex,
    /// Append the second re-application rule to the standard policy
    pub extended_rules: bool,
    /// Subjects with no parsed time field get no wear intervals
    pub skip_empty_subjects: bool,
    pub descriptive_phrases: Vec<String>,
    /// Worker threads for batch runs
    pub workers: usize,
    pub columns: ColumnSchema,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_gap_seconds: DEFAULT_MIN_GAP_SECONDS,
            trial_days: DEFAULT_TRIAL_DAYS,
            extended_rules: false,
            skip_empty_subjects: true,
            descriptive_phrases: DEFAULT_DESCRIPTIVE_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            workers: 1,
            columns: ColumnSchema::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ComputeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.min_gap_seconds < 0 {
            return Err(ComputeError::InvalidConfig(format!(
                "min_gap_seconds must be >= 0, got {}",
                self.min_gap_seconds
            )));
        }
        if self.trial_days == 0 || self.trial_days > MAX_TRIAL_DAYS {
            return Err(ComputeError::InvalidConfig(format!(
                "trial_days must be in 1..={MAX_TRIAL_DAYS}, got {}",
                self.trial_days
            )));
        }
        if self.workers == 0 {
            return Err(ComputeError::InvalidConfig(
                "workers must be >= 1".to_string(),
            ));
        }
        self.columns.validate()
    }

    pub fn rule_policy(&self) -> RulePolicy {
        if self.extended_rules {
            RulePolicy::extended()
        } else {
            RulePolicy::standard()
        }
    }

    pub fn interval_builder(&self) -> IntervalBuilder {
        IntervalBuilder::new(self.rule_policy())
    }

    pub fn normalizer(&self) -> TimestampNormalizer {
        TimestampNormalizer::new(self.descriptive_phrases.as_slice())
    }

    pub fn complement(&self) -> ComplementComputer {
        ComplementComputer::new(Duration::seconds(self.min_gap_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RuleId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();

        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.min_gap_seconds, 60);
        assert_eq!(config.trial_days, 4);
        assert!(config.skip_empty_subjects);
        assert_eq!(config.rule_policy().rule_ids().len(), 5);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_json(
            r#"{"min_gap_seconds": 300, "extended_rules": true, "workers": 4}"#,
        )
        .unwrap();

        assert_eq!(config.min_gap_seconds, 300);
        assert_eq!(config.workers, 4);
        assert_eq!(config.complement().min_gap(), Duration::minutes(5));
        assert_eq!(
            config.rule_policy().rule_ids().last(),
            Some(&RuleId::SecondReapplication)
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for json in [
            r#"{"min_gap_seconds": -1}"#,
            r#"{"trial_days": 0}"#,
            r#"{"trial_days": 40}"#,
            r#"{"workers": 0}"#,
            r#"{"min_gap_seconds": "sixty"}"#,
        ] {
            let result = EngineConfig::from_json(json);
            assert!(
                matches!(result, Err(ComputeError::InvalidConfig(_))),
                "expected rejection for {json}"
            );
        }
    }

    #[test]
    fn test_custom_phrases_reach_normalizer() {
        let config = EngineConfig::from_json(r#"{"descriptive_phrases": ["feeding"]}"#).unwrap();
        let normalizer = config.normalizer();

        let field = normalizer.normalize_str("feeding 7:30").unwrap().unwrap();
        assert_eq!(field.time.to_string(), "07:30:00");
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = EngineConfig {
            min_gap_seconds: 120,
            ..Default::default()
        };
        let parsed = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();

        assert_eq!(parsed, config);
    }
}
