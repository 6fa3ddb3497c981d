//! Wear-log loaders
//!
//! This module provides adapters that parse exported wear logs and map them
//! to per-subject inputs of raw day records plus an optional observation window.

mod document;
mod spreadsheet;

pub use document::JsonAdapter;
pub use spreadsheet::{read_windows, ColumnSchema, CsvAdapter};

use crate::error::{ComputeError, SkipReason};
use crate::normalizer::parse_timestamp;
use crate::types::{Diagnostic, ObservationWindow, RawDayRecord};
use serde::{Deserialize, Serialize};

/// Everything the engine needs for one subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectInput {
    pub subject_id: String,
    /// Calendar date of day 0, as entered
    #[serde(default)]
    pub base_date: Option<String>,
    #[serde(default)]
    pub days: Vec<RawDayRecord>,
    #[serde(default)]
    pub window: Option<WindowRecord>,
    /// Problems found while loading this subject's rows
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Observation window bounds as entered, resolved per subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub data_start: Option<String>,
    #[serde(default)]
    pub data_end: Option<String>,
}

impl WindowRecord {
    pub fn new(subject_id: impl Into<String>, data_start: &str, data_end: &str) -> Self {
        Self {
            subject_id: subject_id.into(),
            data_start: Some(data_start.to_string()),
            data_end: Some(data_end.to_string()),
        }
    }

    /// Parse both bounds, naming the first one that is not a timestamp
    pub fn resolve(&self, subject_id: &str) -> Result<ObservationWindow, SkipReason> {
        let bound = |field: &str, raw: &Option<String>| {
            raw.as_deref()
                .and_then(parse_timestamp)
                .ok_or_else(|| SkipReason::MalformedObservationWindow {
                    field: field.to_string(),
                    raw: raw.clone(),
                })
        };
        let data_start = bound("data_start", &self.data_start)?;
        let data_end = bound("data_end", &self.data_end)?;

        let owner = if self.subject_id.is_empty() {
            subject_id
        } else {
            self.subject_id.as_str()
        };
        Ok(ObservationWindow::new(owner, data_start, data_end))
    }
}

/// Trait for wear-log loaders
pub trait RecordSource {
    /// Parse a raw export into subject inputs, in first-seen order
    fn parse(&self, raw: &str) -> Result<Vec<SubjectInput>, ComputeError>;
}

/// Parse a day label such as `day_0`, `Day 0` or `0`
pub fn parse_day_label(raw: &str) -> Option<u8> {
    let lowered = raw.trim().to_lowercase();
    let digits = lowered
        .strip_prefix("day")
        .unwrap_or(&lowered)
        .trim_start_matches(|c: char| c == '_' || c == '-' || c.is_whitespace());
    digits.parse().ok()
}
