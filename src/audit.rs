//! Timestamp sequence audit
//!
//! Flattens a subject's intervals into their boundary timestamps and checks
//! that the sequence only moves forward, never repeats a timestamp, and
//! finishes on an end. Findings are informational and never change the
//! reconstruction.

use crate::types::{IntervalEnd, WearInterval, WearPeriod};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Kind of audit finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A boundary is earlier than the one before it
    ChronologicalOrder,
    /// Two consecutive boundaries are equal
    DuplicateTimestamp,
    /// The last interval never ends
    UnterminatedFinal,
}

/// A single audit finding for a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditViolation {
    pub subject_id: String,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Start,
    End,
}

impl Boundary {
    fn label(&self, index: usize) -> String {
        match self {
            Boundary::Start => format!("wear_start_{}", index + 1),
            Boundary::End => format!("wear_end_{}", index + 1),
        }
    }
}

/// Audit the per-day intervals of a subject, in emission order
pub fn audit_subject(subject_id: &str, intervals: &[WearInterval]) -> Vec<AuditViolation> {
    let mut stamps: Vec<(String, NaiveDateTime)> = Vec::with_capacity(intervals.len() * 2);
    for (index, interval) in intervals.iter().enumerate() {
        stamps.push((Boundary::Start.label(index), interval.start));
        if let IntervalEnd::Closed(end) = interval.end {
            stamps.push((Boundary::End.label(index), end));
        }
    }

    let mut violations = check_sequence(subject_id, &stamps);

    if let Some(last) = intervals.last() {
        if last.is_open() {
            violations.push(AuditViolation {
                subject_id: subject_id.to_string(),
                kind: ViolationKind::UnterminatedFinal,
                description: format!(
                    "Last timestamp is in {} ({}), should be a wear end",
                    Boundary::Start.label(intervals.len() - 1),
                    last.start
                ),
            });
        }
    }

    violations
}

/// Audit merged wear periods (ordering and duplicates only; periods are always closed)
pub fn audit_periods(subject_id: &str, periods: &[WearPeriod]) -> Vec<AuditViolation> {
    let stamps: Vec<(String, NaiveDateTime)> = periods
        .iter()
        .enumerate()
        .flat_map(|(index, p)| {
            [
                (Boundary::Start.label(index), p.start),
                (Boundary::End.label(index), p.end),
            ]
        })
        .collect();
    check_sequence(subject_id, &stamps)
}

fn check_sequence(subject_id: &str, stamps: &[(String, NaiveDateTime)]) -> Vec<AuditViolation> {
    let mut violations = Vec::new();

    for pair in stamps.windows(2) {
        let ((prev_label, prev), (label, current)) = (&pair[0], &pair[1]);
        if current < prev {
            violations.push(AuditViolation {
                subject_id: subject_id.to_string(),
                kind: ViolationKind::ChronologicalOrder,
                description: format!(
                    "Timestamp in {label} ({current}) is earlier than {prev_label} ({prev})"
                ),
            });
        } else if current == prev {
            violations.push(AuditViolation {
                subject_id: subject_id.to_string(),
                kind: ViolationKind::DuplicateTimestamp,
                description: format!(
                    "Equal timestamps found: {prev_label} and {label} both have {current}"
                ),
            });
        }
    }

    violations
}
