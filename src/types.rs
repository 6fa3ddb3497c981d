//! Core types for the wear-log engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: raw per-day records, typed daily events, per-day wear intervals,
//! merged wear periods, non-wear gaps, and the per-subject report.

use crate::error::SkipReason;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Trial day offset from the subject's first recorded day
pub type DayIndex = u8;

/// The six logged event fields of a subject-day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventField {
    StartTime,
    TakeOff1,
    PutOn1,
    TakeOff2,
    PutOn2,
    EndTime,
}

impl EventField {
    /// All fields in logging order
    pub const ALL: [EventField; 6] = [
        EventField::StartTime,
        EventField::TakeOff1,
        EventField::PutOn1,
        EventField::TakeOff2,
        EventField::PutOn2,
        EventField::EndTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventField::StartTime => "start_time",
            EventField::TakeOff1 => "take_off_1",
            EventField::PutOn1 => "put_on_1",
            EventField::TakeOff2 => "take_off_2",
            EventField::PutOn2 => "put_on_2",
            EventField::EndTime => "end_time",
        }
    }
}

/// One subject-day exactly as entered in the log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDayRecord {
    /// Day index (0..trial_days)
    pub day: DayIndex,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub take_off_1: Option<String>,
    #[serde(default)]
    pub put_on_1: Option<String>,
    #[serde(default)]
    pub take_off_2: Option<String>,
    #[serde(default)]
    pub put_on_2: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl RawDayRecord {
    /// Raw text of a field, if any was entered
    pub fn field(&self, field: EventField) -> Option<&str> {
        let value = match field {
            EventField::StartTime => &self.start_time,
            EventField::TakeOff1 => &self.take_off_1,
            EventField::PutOn1 => &self.put_on_1,
            EventField::TakeOff2 => &self.take_off_2,
            EventField::PutOn2 => &self.put_on_2,
            EventField::EndTime => &self.end_time,
        };
        value.as_deref()
    }
}

/// A normalized time-of-day with its optional free-text annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeField {
    pub time: NaiveTime,
    /// Event note entered after a separator, e.g. "swimming and shower"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    /// Entry was marked with a trailing `?`
    #[serde(default)]
    pub uncertain: bool,
}

impl TimeField {
    pub fn new(time: NaiveTime) -> Self {
        Self {
            time,
            annotation: None,
            uncertain: false,
        }
    }
}

/// Validated, typed events of one subject-day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyEventRecord {
    pub subject_id: String,
    pub day: DayIndex,
    pub start_time: Option<TimeField>,
    pub take_off_1: Option<TimeField>,
    pub put_on_1: Option<TimeField>,
    pub take_off_2: Option<TimeField>,
    pub put_on_2: Option<TimeField>,
    pub end_time: Option<TimeField>,
}

impl DailyEventRecord {
    pub fn new(subject_id: impl Into<String>, day: DayIndex) -> Self {
        Self {
            subject_id: subject_id.into(),
            day,
            ..Default::default()
        }
    }

    pub fn field(&self, field: EventField) -> Option<&TimeField> {
        match field {
            EventField::StartTime => self.start_time.as_ref(),
            EventField::TakeOff1 => self.take_off_1.as_ref(),
            EventField::PutOn1 => self.put_on_1.as_ref(),
            EventField::TakeOff2 => self.take_off_2.as_ref(),
            EventField::PutOn2 => self.put_on_2.as_ref(),
            EventField::EndTime => self.end_time.as_ref(),
        }
    }

    pub fn set(&mut self, field: EventField, value: Option<TimeField>) {
        let slot = match field {
            EventField::StartTime => &mut self.start_time,
            EventField::TakeOff1 => &mut self.take_off_1,
            EventField::PutOn1 => &mut self.put_on_1,
            EventField::TakeOff2 => &mut self.take_off_2,
            EventField::PutOn2 => &mut self.put_on_2,
            EventField::EndTime => &mut self.end_time,
        };
        *slot = value;
    }

    /// Time of day of a field, ignoring its annotation
    pub fn time(&self, field: EventField) -> Option<NaiveTime> {
        self.field(field).map(|f| f.time)
    }

    pub fn has(&self, field: EventField) -> bool {
        self.field(field).is_some()
    }

    /// Number of fields that carry a parsed time
    pub fn parsed_count(&self) -> usize {
        EventField::ALL.iter().filter(|f| self.has(**f)).count()
    }
}

/// Calendar placement of a single trial day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayContext {
    pub day: DayIndex,
    pub date: NaiveDate,
    /// 00:00:00 of `date`
    pub day_start: NaiveDateTime,
    /// 23:59:59 of `date`
    pub day_end: NaiveDateTime,
}

impl DayContext {
    /// Day `day` of a trial whose day 0 falls on `base_date`.
    ///
    /// The date is always `base_date + day`; stored per-day dates are never consulted.
    pub fn for_day(base_date: NaiveDate, day: DayIndex) -> Option<Self> {
        let date = base_date.checked_add_signed(Duration::days(i64::from(day)))?;
        Some(Self {
            day,
            date,
            day_start: date.and_hms_opt(0, 0, 0)?,
            day_end: date.and_hms_opt(23, 59, 59)?,
        })
    }

    /// Absolute timestamp of a time of day on this day
    pub fn at(&self, time: NaiveTime) -> NaiveDateTime {
        self.date.and_time(time)
    }
}

/// End of a wear interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum IntervalEnd {
    Closed(NaiveDateTime),
    /// Equipment presumed still on past the day's recorded data
    Open,
}

/// Rule of the interval policy that produced an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    /// start_time → take_off_1
    MorningThenRemoved,
    /// put_on_1 → take_off_2
    MidDayCycle,
    /// put_on_1 → end_time or open
    ReappliedNotRemoved,
    /// day start → take_off_1
    RemovedWithoutStart,
    /// whole known day, no removal logged
    NoRemovalEvents,
    /// put_on_2 → end_time or open
    SecondReapplication,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::MorningThenRemoved => "morning_then_removed",
            RuleId::MidDayCycle => "mid_day_cycle",
            RuleId::ReappliedNotRemoved => "reapplied_not_removed",
            RuleId::RemovedWithoutStart => "removed_without_start",
            RuleId::NoRemovalEvents => "no_removal_events",
            RuleId::SecondReapplication => "second_reapplication",
        }
    }
}

/// How directly an interval is backed by logged events.
///
/// Ordered from weakest to strongest, so `min` gives the confidence of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// No removal logged for the day; continuous wear is a modeling assumption
    Assumed,
    /// One boundary comes from a day edge or is open-ended
    Inferred,
    /// Both boundaries were logged
    Observed,
}

/// A wear interval produced for one subject-day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WearInterval {
    pub subject_id: String,
    pub start: NaiveDateTime,
    pub end: IntervalEnd,
    pub source_day: DayIndex,
    pub rule: RuleId,
    pub confidence: Confidence,
}

impl WearInterval {
    pub fn is_open(&self) -> bool {
        matches!(self.end, IntervalEnd::Open)
    }

    /// End timestamp, `None` while open
    pub fn end_time(&self) -> Option<NaiveDateTime> {
        match self.end {
            IntervalEnd::Closed(end) => Some(end),
            IntervalEnd::Open => None,
        }
    }
}

/// A closed wear interval after cross-day merging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WearPeriod {
    pub subject_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// First contributing day
    pub source_day: DayIndex,
    /// Last contributing day
    pub through_day: DayIndex,
    /// Lowest confidence among contributing intervals
    pub confidence: Confidence,
    pub rules: Vec<RuleId>,
}

impl WearPeriod {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// A gap in wear within the observation window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonWearInterval {
    pub subject_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl NonWearInterval {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Span of a subject's continuous sensor recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationWindow {
    #[serde(default)]
    pub subject_id: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub data_start: NaiveDateTime,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub data_end: NaiveDateTime,
}

impl ObservationWindow {
    pub fn new(subject_id: impl Into<String>, data_start: NaiveDateTime, data_end: NaiveDateTime) -> Self {
        Self {
            subject_id: subject_id.into(),
            data_start,
            data_end,
        }
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    crate::normalizer::parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// Classification tag of an audit diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Unparseable,
    UnrecognisedDay,
    MissingDate,
    InconsistentOrdering,
    OverlapAfterMerge,
    MissingWindow,
    InvalidWindow,
}

/// Audit record of a recoverable data problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub subject_id: String,
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<DayIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<EventField>,
    /// Original text, kept verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub message: String,
}

/// Result of reconstructing one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubjectOutcome {
    Reconstructed {
        wear: Vec<WearPeriod>,
        non_wear: Vec<NonWearInterval>,
    },
    Skipped {
        reason: SkipReason,
    },
}

/// Per-subject output handed to plotting/reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectReport {
    pub subject_id: String,
    pub outcome: SubjectOutcome,
    pub diagnostics: Vec<Diagnostic>,
}

impl SubjectReport {
    pub fn wear(&self) -> &[WearPeriod] {
        match &self.outcome {
            SubjectOutcome::Reconstructed { wear, .. } => wear,
            SubjectOutcome::Skipped { .. } => &[],
        }
    }

    pub fn non_wear(&self) -> &[NonWearInterval] {
        match &self.outcome {
            SubjectOutcome::Reconstructed { non_wear, .. } => non_wear,
            SubjectOutcome::Skipped { .. } => &[],
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match &self.outcome {
            SubjectOutcome::Skipped { reason } => Some(reason),
            SubjectOutcome::Reconstructed { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_context_offsets_from_base_date() {
        let base = NaiveDate::from_ymd_opt(2011, 1, 31).unwrap();
        let ctx = DayContext::for_day(base, 2).unwrap();

        assert_eq!(ctx.date, NaiveDate::from_ymd_opt(2011, 2, 2).unwrap());
        assert_eq!(ctx.day_start.to_string(), "2011-02-02 00:00:00");
        assert_eq!(ctx.day_end.to_string(), "2011-02-02 23:59:59");
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Assumed < Confidence::Inferred);
        assert!(Confidence::Inferred < Confidence::Observed);
        assert_eq!(
            Confidence::Observed.min(Confidence::Assumed),
            Confidence::Assumed
        );
    }

    #[test]
    fn test_observation_window_accepts_space_separated_timestamps() {
        let json = r#"{"data_start": "2011-01-05 00:00:00", "data_end": "2011-01-08T23:59:00"}"#;
        let window: ObservationWindow = serde_json::from_str(json).unwrap();

        assert_eq!(window.data_start.to_string(), "2011-01-05 00:00:00");
        assert_eq!(window.data_end.to_string(), "2011-01-08 23:59:00");
        assert!(window.subject_id.is_empty());
    }

    #[test]
    fn test_daily_record_field_access() {
        let mut record = DailyEventRecord::new("CO-010", 0);
        let t = NaiveTime::from_hms_opt(12, 59, 0).unwrap();
        record.set(EventField::StartTime, Some(TimeField::new(t)));

        assert_eq!(record.time(EventField::StartTime), Some(t));
        assert!(!record.has(EventField::TakeOff1));
        assert_eq!(record.parsed_count(), 1);
    }
}
