//! Report encoding
//!
//! This module wraps per-subject results into a batch report with producer
//! metadata and summary counts, and renders it as JSON or NDJSON.

use crate::error::ComputeError;
use crate::types::SubjectReport;
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current batch report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Who produced a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Counts over a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub subjects: usize,
    pub reconstructed: usize,
    pub skipped: usize,
    pub wear_intervals: usize,
    pub non_wear_intervals: usize,
    pub diagnostics: usize,
}

impl BatchSummary {
    pub fn from_reports(reports: &[SubjectReport]) -> Self {
        reports.iter().fold(Self::default(), |mut summary, report| {
            summary.subjects += 1;
            if report.is_skipped() {
                summary.skipped += 1;
            } else {
                summary.reconstructed += 1;
            }
            summary.wear_intervals += report.wear().len();
            summary.non_wear_intervals += report.non_wear().len();
            summary.diagnostics += report.diagnostics.len();
            summary
        })
    }
}

/// Full output of a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub min_gap_seconds: i64,
    pub summary: BatchSummary,
    pub subjects: Vec<SubjectReport>,
}

/// Rendering of a batch report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Compact single-line JSON
    Json,
    #[default]
    JsonPretty,
    /// One subject report per line
    Ndjson,
}

/// Batch report encoder
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Wrap subject reports into a batch report
    pub fn encode(&self, subjects: Vec<SubjectReport>, min_gap_seconds: i64) -> BatchReport {
        BatchReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            min_gap_seconds,
            summary: BatchSummary::from_reports(&subjects),
            subjects,
        }
    }

    /// Encode to pretty JSON string
    pub fn encode_to_json(
        &self,
        subjects: Vec<SubjectReport>,
        min_gap_seconds: i64,
    ) -> Result<String, ComputeError> {
        let report = self.encode(subjects, min_gap_seconds);
        self.render(&report, OutputFormat::JsonPretty)
    }

    pub fn render(&self, report: &BatchReport, format: OutputFormat) -> Result<String, ComputeError> {
        match format {
            OutputFormat::Json => serde_json::to_string(report).map_err(ComputeError::JsonError),
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(report).map_err(ComputeError::JsonError)
            }
            OutputFormat::Ndjson => {
                let mut out = String::new();
                for subject in &report.subjects {
                    out.push_str(&serde_json::to_string(subject)?);
                    out.push('\n');
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkipReason;
    use crate::types::{Confidence, NonWearInterval, RuleId, SubjectOutcome, WearPeriod};
    use chrono::NaiveDateTime;
    use pretty_assertions::assert_eq;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn make_reports() -> Vec<SubjectReport> {
        vec![
            SubjectReport {
                subject_id: "FL-003".to_string(),
                outcome: SubjectOutcome::Reconstructed {
                    wear: vec![WearPeriod {
                        subject_id: "FL-003".to_string(),
                        start: ts("2011-01-05 12:59:00"),
                        end: ts("2011-01-05 14:30:00"),
                        source_day: 0,
                        through_day: 0,
                        confidence: Confidence::Observed,
                        rules: vec![RuleId::MorningThenRemoved],
                    }],
                    non_wear: vec![NonWearInterval {
                        subject_id: "FL-003".to_string(),
                        start: ts("2011-01-05 14:30:00"),
                        end: ts("2011-01-05 18:00:00"),
                    }],
                },
                diagnostics: vec![],
            },
            SubjectReport {
                subject_id: "FL-009".to_string(),
                outcome: SubjectOutcome::Skipped {
                    reason: SkipReason::MissingObservationWindow,
                },
                diagnostics: vec![],
            },
        ]
    }

    #[test]
    fn test_encode_batch_report() {
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let report = encoder.encode(make_reports(), 60);

        assert_eq!(report.report_version, REPORT_VERSION);
        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.producer.version, ENGINE_VERSION);
        assert_eq!(report.producer.instance_id, "test-instance");
        assert_eq!(
            report.summary,
            BatchSummary {
                subjects: 2,
                reconstructed: 1,
                skipped: 1,
                wear_intervals: 1,
                non_wear_intervals: 1,
                diagnostics: 0,
            }
        );
    }

    #[test]
    fn test_encode_to_json_layout() {
        let encoder = ReportEncoder::new();
        let json = encoder.encode_to_json(make_reports(), 60).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let first = &parsed["subjects"][0];
        assert_eq!(first["outcome"]["status"], "reconstructed");
        assert_eq!(first["outcome"]["wear"][0]["start"], "2011-01-05T12:59:00");
        assert_eq!(first["outcome"]["wear"][0]["confidence"], "observed");
        assert_eq!(parsed["subjects"][1]["outcome"]["status"], "skipped");
        assert_eq!(
            parsed["subjects"][1]["outcome"]["reason"]["kind"],
            "missing_observation_window"
        );
        assert!(!encoder.instance_id().is_empty());
    }

    #[test]
    fn test_ndjson_has_one_line_per_subject() {
        let encoder = ReportEncoder::with_instance_id("ndjson".to_string());
        let report = encoder.encode(make_reports(), 60);
        let out = encoder.render(&report, OutputFormat::Ndjson).unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["subject_id"], "FL-009");
    }
}
