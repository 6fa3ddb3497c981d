//! Timestamp normalization
//!
//! This module reduces hand-entered time fields to canonical times of day.
//! - `<time> - <note>` entries keep the note as an annotation
//! - a trailing `?` marks the entry as uncertain
//! - descriptive phrases and stray characters are stripped
//! - `H:MM`, `H:MM:SS` and the duplicated-seconds `H:MM:SS:SS` artifact are accepted
//!
//! It also parses the calendar dates and absolute timestamps that arrive
//! alongside the logged fields.

use crate::error::MalformedTimeField;
use crate::types::TimeField;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;

/// Phrases that annotate times inline without a separator
pub const DEFAULT_DESCRIPTIVE_PHRASES: &[&str] = &[
    "swimming and shower",
    "sometime in the evening",
    "slept with it",
    "shower",
    "rest",
    "fall",
    "date",
];

/// Spreadsheet exports write these for blank cells
const ABSENT_MARKERS: &[&str] = &["nan", "none", "nat"];

fn separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<time>[0-9][0-9:]*)\s*[-–]\s*(?P<note>.+)$")
            .expect("separator pattern is a valid regex")
    })
}

/// Normalizer for raw time-of-day fields
#[derive(Debug, Clone)]
pub struct TimestampNormalizer {
    /// Lowercased, longest first so compound phrases strip before their parts
    phrases: Vec<String>,
}

impl Default for TimestampNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_DESCRIPTIVE_PHRASES)
    }
}

impl TimestampNormalizer {
    /// Create a normalizer that strips the given descriptive phrases
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Self {
        let mut phrases: Vec<String> = phrases
            .iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        phrases.dedup();
        Self { phrases }
    }

    /// Normalize one raw field.
    ///
    /// `Ok(None)` means the field was blank. A failure carries the raw text unchanged.
    pub fn normalize(&self, raw: Option<&str>) -> Result<Option<TimeField>, MalformedTimeField> {
        let Some(original) = raw else {
            return Ok(None);
        };
        let text = original.trim();
        if text.is_empty() || is_absent_marker(text) {
            return Ok(None);
        }

        let malformed = |uncertain: bool| MalformedTimeField {
            raw: original.to_string(),
            uncertain,
        };

        if let Some(captures) = separator_pattern().captures(text) {
            let note = captures["note"].trim();
            let uncertain = note.ends_with('?');
            let note = note.trim_end_matches('?').trim();
            let time = self
                .clean_and_classify(&captures["time"])
                .ok_or_else(|| malformed(uncertain))?;
            return Ok(Some(TimeField {
                time,
                annotation: (!note.is_empty()).then(|| note.to_string()),
                uncertain,
            }));
        }

        let uncertain = text.ends_with('?');
        let text = text.trim_end_matches('?').trim();

        let time = self
            .clean_and_classify(text)
            .ok_or_else(|| malformed(uncertain))?;
        Ok(Some(TimeField {
            time,
            annotation: None,
            uncertain,
        }))
    }

    /// Normalize a field given as a plain string
    pub fn normalize_str(&self, raw: &str) -> Result<Option<TimeField>, MalformedTimeField> {
        self.normalize(Some(raw))
    }

    fn clean_and_classify(&self, text: &str) -> Option<NaiveTime> {
        let mut lowered = text.to_lowercase();
        for phrase in &self.phrases {
            lowered = lowered.replace(phrase.as_str(), " ");
        }
        let token: String = lowered
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == ':')
            .collect();
        classify_time_token(&token)
    }
}

/// Classify a token of digits and colons as a time of day.
///
/// `H:MM:SS` is taken as-is, `H:MM` gets `:00`, and a fourth group is dropped.
pub fn classify_time_token(token: &str) -> Option<NaiveTime> {
    let groups: Vec<&str> = token.split(':').collect();
    let (hour, minute, second) = match groups.as_slice() {
        [h, m] => (*h, *m, "00"),
        [h, m, s] | [h, m, s, _] => (*h, *m, *s),
        _ => return None,
    };

    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 || second.len() != 2 {
        return None;
    }
    if groups.len() == 4 && groups[3].len() != 2 {
        return None;
    }

    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    let second: u32 = second.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, second)
}

fn is_absent_marker(text: &str) -> bool {
    ABSENT_MARKERS
        .iter()
        .any(|marker| text.eq_ignore_ascii_case(marker))
}

/// Parse a calendar date as found in the day-0 date column.
///
/// Accepts `YYYY-MM-DD`, `M/D/YYYY` and `M/D/YY`, optionally followed by a time part.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() || is_absent_marker(text) {
        return None;
    }

    if let Some(timestamp) = parse_timestamp(text) {
        return Some(timestamp.date());
    }

    let date_part = text
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or(text);

    if let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return Some(date);
    }

    let year_len = date_part.rsplit('/').next().map(str::len).unwrap_or(0);
    let format = match year_len {
        2 => "%m/%d/%y",
        4 => "%m/%d/%Y",
        _ => return None,
    };
    NaiveDate::parse_from_str(date_part, format).ok()
}

/// Parse an absolute wall-clock timestamp. Offsets are dropped; all times are naive.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    for format in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_local());
    }

    // M/D/Y H:MM as written by the wear-period exports
    let (date_part, time_part) = text.split_once(' ')?;
    let date = parse_calendar_date(date_part)?;
    let time = classify_time_token(time_part.trim())?;
    Some(date.and_time(time))
}
