//! JSON wear-log adapter
//!
//! Reads `{"subjects": [...]}` documents where each subject carries its raw
//! day records, day-0 date and observation window.
//!
//! Leaf values are read as loosely as the spreadsheet exports they come
//! from: numbers are taken as text, and a day or window that does not make
//! sense is reported against its own subject instead of rejecting the
//! document.

use crate::error::ComputeError;
use crate::types::{Diagnostic, DiagnosticKind, RawDayRecord};
use log::warn;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_day_label, RecordSource, SubjectInput, WindowRecord};

/// JSON document adapter
pub struct JsonAdapter;

#[derive(Debug, Deserialize)]
struct WearLogDocument {
    #[serde(default)]
    subjects: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubjectPayload {
    subject_id: Option<Value>,
    base_date: Option<Value>,
    days: Vec<DayPayload>,
    window: Option<WindowPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DayPayload {
    day: Option<Value>,
    start_time: Option<Value>,
    take_off_1: Option<Value>,
    put_on_1: Option<Value>,
    take_off_2: Option<Value>,
    put_on_2: Option<Value>,
    end_time: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WindowPayload {
    subject_id: Option<Value>,
    data_start: Option<Value>,
    data_end: Option<Value>,
}

/// Render a JSON leaf as entered text; `null` and blank strings are absent
fn text(value: Option<Value>) -> Option<String> {
    let rendered = match value? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!rendered.is_empty()).then_some(rendered)
}

fn day_index(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(s) => parse_day_label(s),
        _ => None,
    }
}

impl SubjectPayload {
    fn into_input(self) -> Option<SubjectInput> {
        let subject_id = text(self.subject_id)?;
        let mut input = SubjectInput {
            base_date: text(self.base_date),
            window: self.window.map(|window| WindowRecord {
                subject_id: text(window.subject_id).unwrap_or_else(|| subject_id.clone()),
                data_start: text(window.data_start),
                data_end: text(window.data_end),
            }),
            subject_id,
            ..Default::default()
        };

        for (position, day) in self.days.into_iter().enumerate() {
            let Some(index) = day.day.as_ref().and_then(day_index) else {
                let raw = day.day.as_ref().map(Value::to_string);
                warn!(
                    "{}: days[{position}] has no usable day index {raw:?}, skipped",
                    input.subject_id
                );
                input.diagnostics.push(Diagnostic {
                    subject_id: input.subject_id.clone(),
                    kind: DiagnosticKind::UnrecognisedDay,
                    day: None,
                    field: None,
                    message: format!("days[{position}] is not a day index, record skipped"),
                    raw,
                });
                continue;
            };
            input.days.push(RawDayRecord {
                day: index,
                start_time: text(day.start_time),
                take_off_1: text(day.take_off_1),
                put_on_1: text(day.put_on_1),
                take_off_2: text(day.take_off_2),
                put_on_2: text(day.put_on_2),
                end_time: text(day.end_time),
            });
        }

        Some(input)
    }
}

impl RecordSource for JsonAdapter {
    fn parse(&self, raw: &str) -> Result<Vec<SubjectInput>, ComputeError> {
        let document: WearLogDocument = serde_json::from_str(raw)?;

        let mut subjects = Vec::with_capacity(document.subjects.len());
        for (position, entry) in document.subjects.into_iter().enumerate() {
            match serde_json::from_value::<SubjectPayload>(entry) {
                Ok(payload) => subjects.extend(payload.into_input()),
                Err(e) => warn!("subjects[{position}] is not a subject record, skipped: {e}"),
            }
        }
        Ok(subjects)
    }
}
