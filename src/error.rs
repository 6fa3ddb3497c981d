//! Error types for the wear-log engine
//!
//! `ComputeError` stops a batch call (bad input document, bad config).
//! Everything scoped to a single subject is reported through
//! [`SkipReason`] and diagnostics instead, so one subject's data never
//! affects another's output.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a batch computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid CSV: {0}")]
    CsvError(#[from] csv::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Column schema mismatch: {0}")]
    Schema(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// A raw time field that did not reduce to a valid time of day.
///
/// The original text is carried unchanged so the caller can audit it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Malformed time field: {raw:?}")]
pub struct MalformedTimeField {
    /// Field text exactly as entered
    pub raw: String,
    /// A trailing `?` marked the entry as uncertain
    pub uncertain: bool,
}

/// Why a subject's interval output was withheld
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("day 0 has no resolvable calendar date (raw: {raw:?})")]
    MissingBaseDate { raw: Option<String> },

    #[error("wear intervals overlap after merging: [{first_start}, {first_end}) and [{second_start}, {second_end})")]
    OverlapAfterMerge {
        first_start: NaiveDateTime,
        first_end: NaiveDateTime,
        second_start: NaiveDateTime,
        second_end: NaiveDateTime,
    },

    #[error("no observation window supplied")]
    MissingObservationWindow,

    #[error("observation window {field} is not a timestamp (raw: {raw:?})")]
    MalformedObservationWindow { field: String, raw: Option<String> },

    #[error("observation window start {data_start} is not before end {data_end}")]
    InvalidObservationWindow {
        data_start: NaiveDateTime,
        data_end: NaiveDateTime,
    },
}
