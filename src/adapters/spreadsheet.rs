//! CSV wear-log adapter
//!
//! Reads spreadsheet exports with one row per (subject, day). Column names
//! are resolved once through a [`ColumnSchema`] and checked against the
//! header row before any data row is read.

use crate::error::ComputeError;
use crate::normalizer::parse_timestamp;
use crate::types::{Diagnostic, DiagnosticKind, EventField, RawDayRecord};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{parse_day_label, RecordSource, SubjectInput, WindowRecord};

const WINDOW_COLUMNS: [&str; 3] = ["subject_id", "data_start", "data_end"];

/// Mapping of logical fields to CSV header names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSchema {
    pub subject_id: String,
    pub day: String,
    /// Calendar date column; only the day-0 row is consulted
    pub date: String,
    pub start_time: String,
    pub take_off_1: String,
    pub put_on_1: String,
    pub take_off_2: String,
    pub put_on_2: String,
    pub end_time: String,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            subject_id: "pig_id".to_string(),
            day: "day".to_string(),
            date: "date".to_string(),
            start_time: "start_time".to_string(),
            take_off_1: "take_off_1".to_string(),
            put_on_1: "put_on_1".to_string(),
            take_off_2: "take_off_2".to_string(),
            put_on_2: "put_on_2".to_string(),
            end_time: "end_time".to_string(),
        }
    }
}

impl ColumnSchema {
    pub fn event_column(&self, field: EventField) -> &str {
        match field {
            EventField::StartTime => &self.start_time,
            EventField::TakeOff1 => &self.take_off_1,
            EventField::PutOn1 => &self.put_on_1,
            EventField::TakeOff2 => &self.take_off_2,
            EventField::PutOn2 => &self.put_on_2,
            EventField::EndTime => &self.end_time,
        }
    }

    fn named_columns(&self) -> Vec<(&'static str, &str)> {
        let mut columns = vec![
            ("subject_id", self.subject_id.as_str()),
            ("day", self.day.as_str()),
            ("date", self.date.as_str()),
        ];
        columns.extend(EventField::ALL.iter().map(|f| (f.as_str(), self.event_column(*f))));
        columns
    }

    /// Every logical field needs a distinct, non-empty column name
    pub fn validate(&self) -> Result<(), ComputeError> {
        let columns = self.named_columns();
        for (i, (logical, header)) in columns.iter().enumerate() {
            if header.trim().is_empty() {
                return Err(ComputeError::Schema(format!(
                    "column for {logical} is empty"
                )));
            }
            if let Some((other, _)) = columns[..i].iter().find(|(_, h)| h == header) {
                return Err(ComputeError::Schema(format!(
                    "{other} and {logical} both map to column {header:?}"
                )));
            }
        }
        Ok(())
    }

    /// Resolve header positions, naming every missing column
    fn resolve(&self, headers: &::csv::StringRecord) -> Result<ColumnIndex, ComputeError> {
        self.validate()?;

        let position = |name: &str| headers.iter().position(|h| h.trim() == name);
        let missing: Vec<&str> = self
            .named_columns()
            .into_iter()
            .filter(|(_, header)| position(*header).is_none())
            .map(|(_, header)| header)
            .collect();
        if !missing.is_empty() {
            return Err(ComputeError::Schema(format!(
                "missing columns: {}",
                missing.join(", ")
            )));
        }

        let at = |name: &str| position(name).unwrap_or_default();
        Ok(ColumnIndex {
            subject_id: at(self.subject_id.as_str()),
            day: at(self.day.as_str()),
            date: at(self.date.as_str()),
            events: EventField::ALL.map(|f| (f, at(self.event_column(f)))),
        })
    }
}

struct ColumnIndex {
    subject_id: usize,
    day: usize,
    date: usize,
    events: [(EventField, usize); 6],
}

/// Read a `subject_id,data_start,data_end` table keyed by subject.
///
/// Bounds are kept as entered; a bound that is not a timestamp only skips
/// its own subject once the window is resolved. Unreadable rows are skipped.
pub fn read_windows(raw_csv: &str) -> Result<HashMap<String, WindowRecord>, ComputeError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw_csv.as_bytes());

    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h.trim() == name);
    let missing: Vec<&str> = WINDOW_COLUMNS
        .into_iter()
        .filter(|name| position(*name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(ComputeError::Schema(format!(
            "windows table is missing columns: {}",
            missing.join(", ")
        )));
    }
    let [subject_col, start_col, end_col] =
        WINDOW_COLUMNS.map(|name| position(name).unwrap_or_default());

    let mut windows = HashMap::new();
    for (row_number, row) in reader.records().enumerate() {
        let line = row_number + 2;
        let record = match row {
            Ok(record) => record,
            Err(e) => {
                warn!("windows line {line}: unreadable row skipped: {e}");
                continue;
            }
        };
        let Some(subject_id) = cell(&record, subject_col) else {
            continue;
        };

        let window = WindowRecord {
            subject_id: subject_id.clone(),
            data_start: cell(&record, start_col),
            data_end: cell(&record, end_col),
        };
        for raw in [&window.data_start, &window.data_end] {
            if raw.as_deref().and_then(parse_timestamp).is_none() {
                warn!("windows line {line}: {subject_id} has an unparseable bound {raw:?}");
            }
        }
        if windows.insert(subject_id.clone(), window).is_some() {
            warn!("windows line {line}: {subject_id} listed again, later row wins");
        }
    }

    debug!("loaded {} observation windows", windows.len());
    Ok(windows)
}

/// CSV adapter with an optional table of observation windows
#[derive(Debug, Clone, Default)]
pub struct CsvAdapter {
    schema: ColumnSchema,
    windows: HashMap<String, WindowRecord>,
}

impl CsvAdapter {
    pub fn new(schema: ColumnSchema) -> Self {
        Self {
            schema,
            windows: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Attach observation windows from a `subject_id,data_start,data_end` CSV
    pub fn with_windows(mut self, raw_csv: &str) -> Result<Self, ComputeError> {
        self.windows = read_windows(raw_csv)?;
        Ok(self)
    }

    /// Give subjects that carry no window of their own the loaded one
    pub fn attach_windows(&self, subjects: &mut [SubjectInput]) {
        for subject in subjects.iter_mut().filter(|s| s.window.is_none()) {
            subject.window = self.windows.get(&subject.subject_id).cloned();
        }
    }
}

fn cell(record: &::csv::StringRecord, index: usize) -> Option<String> {
    record
        .get(index)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl RecordSource for CsvAdapter {
    fn parse(&self, raw: &str) -> Result<Vec<SubjectInput>, ComputeError> {
        let mut reader = ::csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(raw.as_bytes());
        let index = self.schema.resolve(reader.headers()?)?;

        let mut subjects: Vec<SubjectInput> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (row_number, row) in reader.records().enumerate() {
            let record = row?;
            // Header is line 1
            let line = row_number + 2;

            let Some(subject_id) = cell(&record, index.subject_id) else {
                continue;
            };

            let slot = *positions.entry(subject_id.clone()).or_insert_with(|| {
                subjects.push(SubjectInput {
                    window: self.windows.get(&subject_id).cloned(),
                    subject_id: subject_id.clone(),
                    ..Default::default()
                });
                subjects.len() - 1
            });
            let subject = &mut subjects[slot];

            let label = cell(&record, index.day);
            let Some(day) = label.as_deref().and_then(parse_day_label) else {
                warn!("line {line}: unrecognised day label {label:?} for {subject_id}, row skipped");
                subject.diagnostics.push(Diagnostic {
                    subject_id,
                    kind: DiagnosticKind::UnrecognisedDay,
                    day: None,
                    field: None,
                    message: format!("line {line}: day label is not a day index, row skipped"),
                    raw: label,
                });
                continue;
            };

            if subject.days.iter().any(|d| d.day == day) {
                warn!("line {line}: duplicate day {day} for {subject_id}, row skipped");
                continue;
            }

            let mut day_record = RawDayRecord {
                day,
                ..Default::default()
            };
            for (field, column) in index.events {
                let value = cell(&record, column);
                match field {
                    EventField::StartTime => day_record.start_time = value,
                    EventField::TakeOff1 => day_record.take_off_1 = value,
                    EventField::PutOn1 => day_record.put_on_1 = value,
                    EventField::TakeOff2 => day_record.take_off_2 = value,
                    EventField::PutOn2 => day_record.put_on_2 = value,
                    EventField::EndTime => day_record.end_time = value,
                }
            }

            if day == 0 {
                subject.base_date = cell(&record, index.date);
            }
            subject.days.push(day_record);
        }

        debug!("parsed {} subjects from CSV", subjects.len());
        Ok(subjects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_csv() -> &'static str {
        "pig_id,day,date,start_time,take_off_1,put_on_1,take_off_2,put_on_2,end_time\n\
         FL-003 ,day_0,1/5/2011,12:59,14:30,16:00,,,\n\
         FL-003,day_1,,,,,,,\n\
         CO-010,Day 0,2011-01-12,8:00 - shower,,,,,20:00\n\
         ,day_0,1/1/2011,,,,,,\n\
         CO-010,2,,,06:45,,,,\n"
    }

    #[test]
    fn test_rows_grouped_by_subject_in_first_seen_order() {
        let subjects = CsvAdapter::default().parse(sample_csv()).unwrap();

        let ids: Vec<&str> = subjects.iter().map(|s| s.subject_id.as_str()).collect();
        assert_eq!(ids, vec!["FL-003", "CO-010"]);

        let fl = &subjects[0];
        assert_eq!(fl.base_date.as_deref(), Some("1/5/2011"));
        assert_eq!(fl.days.len(), 2);
        assert_eq!(fl.days[0].put_on_1.as_deref(), Some("16:00"));
        assert_eq!(fl.days[0].take_off_2, None);

        let co = &subjects[1];
        assert_eq!(co.base_date.as_deref(), Some("2011-01-12"));
        assert_eq!(co.days[0].start_time.as_deref(), Some("8:00 - shower"));
        assert_eq!(co.days[1].day, 2);
        assert_eq!(co.days[1].take_off_1.as_deref(), Some("06:45"));
    }

    #[test]
    fn test_missing_columns_are_named() {
        let err = CsvAdapter::default()
            .parse("pig_id,day,start_time\nFL-003,day_0,12:59\n")
            .unwrap_err();

        match err {
            ComputeError::Schema(message) => {
                assert!(message.contains("date"));
                assert!(message.contains("take_off_1"));
                assert!(!message.contains("pig_id"));
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_schema() {
        let schema = ColumnSchema {
            subject_id: "Pig ID".to_string(),
            date: "Day 0 Date".to_string(),
            ..Default::default()
        };
        let csv = "Pig ID,day,Day 0 Date,start_time,take_off_1,put_on_1,take_off_2,put_on_2,end_time\n\
                   FL-007,0,1/6/2011,,,,,,\n";
        let subjects = CsvAdapter::new(schema).parse(csv).unwrap();

        assert_eq!(subjects[0].subject_id, "FL-007");
        assert_eq!(subjects[0].base_date.as_deref(), Some("1/6/2011"));
    }

    #[test]
    fn test_duplicate_column_mapping_is_rejected() {
        let schema = ColumnSchema {
            end_time: "start_time".to_string(),
            ..Default::default()
        };

        assert!(matches!(schema.validate(), Err(ComputeError::Schema(_))));
    }

    #[test]
    fn test_windows_are_attached_by_subject() {
        let adapter = CsvAdapter::default()
            .with_windows(
                "subject_id,data_start,data_end\n\
                 FL-003,2011-01-05 12:00:00,2011-01-08 23:59:00\n",
            )
            .unwrap();
        let subjects = adapter.parse(sample_csv()).unwrap();

        let window = subjects[0].window.as_ref().unwrap();
        assert_eq!(window.data_start.as_deref(), Some("2011-01-05 12:00:00"));
        assert!(subjects[1].window.is_none());
    }

    #[test]
    fn test_bad_window_row_stays_with_its_subject() {
        let windows = read_windows(
            "subject_id,data_start,data_end\n\
             FL-003,2011-01-05 12:00:00,2011-01-08 23:59:00\n\
             CO-010,soon,later\n\
             FL-009\n",
        )
        .unwrap();

        assert_eq!(windows.len(), 3);
        assert!(windows["FL-003"].resolve("FL-003").is_ok());
        assert_eq!(windows["CO-010"].data_start.as_deref(), Some("soon"));
        assert!(windows["CO-010"].resolve("CO-010").is_err());
        assert_eq!(windows["FL-009"].data_start, None);
    }

    #[test]
    fn test_windows_table_needs_its_columns() {
        let result = read_windows("subject_id,start\nFL-003,2011-01-05 12:00:00\n");

        match result {
            Err(ComputeError::Schema(message)) => {
                assert!(message.contains("data_start"));
                assert!(message.contains("data_end"));
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_attach_windows_keeps_existing() {
        let adapter = CsvAdapter::default()
            .with_windows(
                "subject_id,data_start,data_end\n\
                 FL-003,2011-01-05 12:00:00,2011-01-08 23:59:00\n\
                 CO-010,2011-01-12 00:00:00,2011-01-15 23:59:00\n",
            )
            .unwrap();
        let inline = WindowRecord::new("CO-010", "2011-01-12 06:00:00", "2011-01-15 20:00:00");
        let mut subjects = vec![
            SubjectInput {
                subject_id: "FL-003".to_string(),
                ..Default::default()
            },
            SubjectInput {
                subject_id: "CO-010".to_string(),
                window: Some(inline.clone()),
                ..Default::default()
            },
            SubjectInput {
                subject_id: "FL-007".to_string(),
                ..Default::default()
            },
        ];

        adapter.attach_windows(&mut subjects);

        assert_eq!(
            subjects[0].window.as_ref().and_then(|w| w.data_start.as_deref()),
            Some("2011-01-05 12:00:00")
        );
        assert_eq!(subjects[1].window, Some(inline));
        assert_eq!(subjects[2].window, None);
    }

    #[test]
    fn test_bad_day_label_is_recorded_on_subject() {
        let csv = "pig_id,day,date,start_time,take_off_1,put_on_1,take_off_2,put_on_2,end_time\n\
                   FL-003,day_0,1/5/2011,12:59,,,,,\n\
                   FL-003,later,,09:00,,,,,\n\
                   CO-010,day_0,1/12/2011,08:00,,,,,20:00\n";
        let subjects = CsvAdapter::default().parse(csv).unwrap();

        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].days.len(), 1);
        assert_eq!(subjects[0].diagnostics.len(), 1);
        assert_eq!(subjects[0].diagnostics[0].kind, DiagnosticKind::UnrecognisedDay);
        assert_eq!(subjects[0].diagnostics[0].raw.as_deref(), Some("later"));
        assert!(subjects[1].diagnostics.is_empty());
    }
}
