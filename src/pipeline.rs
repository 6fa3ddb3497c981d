//! Pipeline orchestration
//!
//! This module provides the public API for the wear-log engine.
//! It orchestrates the full pipeline from loaded wear logs to interval reports.

use crate::adapters::{CsvAdapter, JsonAdapter, RecordSource, SubjectInput};
use crate::audit::{self, AuditViolation};
use crate::builder::IntervalBuilder;
use crate::complement::ComplementComputer;
use crate::config::EngineConfig;
use crate::encoder::{BatchReport, BatchSummary, ReportEncoder};
use crate::error::{ComputeError, SkipReason};
use crate::merger::{CrossDayMerger, DayIntervals};
use crate::normalizer::{parse_calendar_date, TimestampNormalizer};
use crate::types::{
    DailyEventRecord, DayContext, Diagnostic, DiagnosticKind, EventField, NonWearInterval,
    RawDayRecord, SubjectOutcome, SubjectReport, WearInterval, WearPeriod,
};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Reconstruct every subject of a JSON wear log with default settings.
///
/// # Arguments
/// * `raw_json` - `{"subjects": [...]}` document
///
/// # Returns
/// Pretty-printed batch report JSON
///
/// # Example
/// ```ignore
/// let report = reconstruct_json(wear_log_json)?;
/// ```
pub fn reconstruct_json(raw_json: String) -> Result<String, ComputeError> {
    let processor = WearProcessor::new();
    let report = processor.process_source(&JsonAdapter, &raw_json)?;
    processor.encoder.render(&report, Default::default())
}

/// Reconstruct every subject of a CSV wear log with default settings.
///
/// # Arguments
/// * `raw_csv` - One row per (subject, day) with the default column names
/// * `windows_csv` - Optional `subject_id,data_start,data_end` table
///
/// # Returns
/// Pretty-printed batch report JSON
pub fn reconstruct_csv(raw_csv: String, windows_csv: Option<String>) -> Result<String, ComputeError> {
    let processor = WearProcessor::new();
    let report = processor.process_csv(&raw_csv, windows_csv.as_deref())?;
    processor.encoder.render(&report, Default::default())
}

/// Audit findings for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAudit {
    pub subject_id: String,
    pub diagnostics: Vec<Diagnostic>,
    pub violations: Vec<AuditViolation>,
}

impl SubjectAudit {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty() && self.violations.is_empty()
    }
}

/// Processor holding the configured pipeline stages.
///
/// Stages per subject:
/// 1. TimestampNormalizer - Reduce raw fields to times of day
/// 2. IntervalBuilder - Apply the rule policy to each dated day
/// 3. CrossDayMerger - Join open intervals across days
/// 4. ComplementComputer - Derive non-wear gaps inside the observation window
pub struct WearProcessor {
    config: EngineConfig,
    normalizer: TimestampNormalizer,
    builder: IntervalBuilder,
    complement: ComplementComputer,
    encoder: ReportEncoder,
}

impl Default for WearProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl WearProcessor {
    /// Create a new processor with default settings
    pub fn new() -> Self {
        Self::from_valid_config(EngineConfig::default())
    }

    /// Create a processor from a configuration, validating it first
    pub fn with_config(config: EngineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: EngineConfig) -> Self {
        Self {
            normalizer: config.normalizer(),
            builder: config.interval_builder(),
            complement: config.complement(),
            encoder: ReportEncoder::new(),
            config,
        }
    }

    /// Use a fixed report instance ID
    pub fn with_instance_id(mut self, instance_id: String) -> Self {
        self.encoder = ReportEncoder::with_instance_id(instance_id);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn encoder(&self) -> &ReportEncoder {
        &self.encoder
    }

    /// Reconstruct wear and non-wear intervals for one subject
    pub fn reconstruct_subject(&self, input: &SubjectInput) -> SubjectReport {
        let mut diagnostics = input.diagnostics.clone();
        let mut intervals = Vec::new();

        let outcome = match self
            .build_wear(input, &mut intervals, &mut diagnostics)
            .and_then(|wear| {
                let non_wear = self.complement_for(input, &wear)?;
                Ok((wear, non_wear))
            }) {
            Ok((wear, non_wear)) => {
                debug!(
                    "{}: {} wear, {} non-wear intervals",
                    input.subject_id,
                    wear.len(),
                    non_wear.len()
                );
                SubjectOutcome::Reconstructed { wear, non_wear }
            }
            Err(reason) => {
                warn!("{}: skipped: {reason}", input.subject_id);
                diagnostics.push(skip_diagnostic(input, &reason));
                SubjectOutcome::Skipped { reason }
            }
        };

        SubjectReport {
            subject_id: input.subject_id.clone(),
            outcome,
            diagnostics,
        }
    }

    /// Check one subject's log without an observation window
    pub fn audit_subject(&self, input: &SubjectInput) -> SubjectAudit {
        let mut diagnostics = input.diagnostics.clone();
        let mut intervals = Vec::new();

        let mut violations = Vec::new();
        match self.build_wear(input, &mut intervals, &mut diagnostics) {
            Ok(wear) => {
                violations.extend(audit::audit_subject(&input.subject_id, &intervals));
                violations.extend(audit::audit_periods(&input.subject_id, &wear));
            }
            Err(reason) => {
                violations.extend(audit::audit_subject(&input.subject_id, &intervals));
                diagnostics.push(skip_diagnostic(input, &reason));
            }
        }

        SubjectAudit {
            subject_id: input.subject_id.clone(),
            diagnostics,
            violations,
        }
    }

    /// Reconstruct a batch of subjects, preserving input order.
    ///
    /// With more than one configured worker, subjects are processed on a
    /// dedicated thread pool.
    pub fn process_batch(&self, inputs: &[SubjectInput]) -> Result<Vec<SubjectReport>, ComputeError> {
        let reports: Vec<SubjectReport> = if self.config.workers > 1 && inputs.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.workers)
                .build()
                .map_err(|e| ComputeError::InvalidConfig(e.to_string()))?;
            pool.install(|| {
                inputs
                    .par_iter()
                    .map(|input| self.reconstruct_subject(input))
                    .collect()
            })
        } else {
            inputs
                .iter()
                .map(|input| self.reconstruct_subject(input))
                .collect()
        };

        let summary = BatchSummary::from_reports(&reports);
        info!(
            "processed {} subjects: {} reconstructed, {} skipped, {} diagnostics",
            summary.subjects, summary.reconstructed, summary.skipped, summary.diagnostics
        );
        Ok(reports)
    }

    /// Parse a raw export with `source` and reconstruct every subject
    pub fn process_source(
        &self,
        source: &dyn RecordSource,
        raw: &str,
    ) -> Result<BatchReport, ComputeError> {
        let inputs = source.parse(raw)?;
        let reports = self.process_batch(&inputs)?;
        Ok(self.encoder.encode(reports, self.config.min_gap_seconds))
    }

    /// Reconstruct a JSON wear log
    pub fn process_json(&self, raw_json: &str) -> Result<BatchReport, ComputeError> {
        self.process_source(&JsonAdapter, raw_json)
    }

    /// Load a JSON wear log, taking windows from `windows_csv` for subjects
    /// whose document entry has none
    pub fn load_json(
        &self,
        raw_json: &str,
        windows_csv: Option<&str>,
    ) -> Result<Vec<SubjectInput>, ComputeError> {
        let mut subjects = JsonAdapter.parse(raw_json)?;
        if let Some(windows) = windows_csv {
            self.csv_adapter(Some(windows))?.attach_windows(&mut subjects);
        }
        Ok(subjects)
    }

    /// Load a CSV wear log with the configured column schema
    pub fn load_csv(
        &self,
        raw_csv: &str,
        windows_csv: Option<&str>,
    ) -> Result<Vec<SubjectInput>, ComputeError> {
        self.csv_adapter(windows_csv)?.parse(raw_csv)
    }

    /// Reconstruct a CSV wear log using the configured column schema
    pub fn process_csv(
        &self,
        raw_csv: &str,
        windows_csv: Option<&str>,
    ) -> Result<BatchReport, ComputeError> {
        let adapter = self.csv_adapter(windows_csv)?;
        self.process_source(&adapter, raw_csv)
    }

    /// CSV adapter for the configured column schema
    pub fn csv_adapter(&self, windows_csv: Option<&str>) -> Result<CsvAdapter, ComputeError> {
        let adapter = CsvAdapter::new(self.config.columns.clone());
        match windows_csv {
            Some(windows) => adapter.with_windows(windows),
            None => Ok(adapter),
        }
    }

    /// Normalize, date, build and merge one subject's days.
    ///
    /// Builder output is appended to `intervals` as it is produced so that
    /// callers can audit it even when merging fails.
    fn build_wear(
        &self,
        input: &SubjectInput,
        intervals: &mut Vec<WearInterval>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Vec<WearPeriod>, SkipReason> {
        let records = self.normalize_days(input, diagnostics);

        if self.config.skip_empty_subjects && records.iter().all(|r| r.parsed_count() == 0) {
            debug!("{}: no parsed events, no wear intervals", input.subject_id);
            return Ok(Vec::new());
        }

        let base_date = input
            .base_date
            .as_deref()
            .and_then(parse_calendar_date)
            .ok_or_else(|| SkipReason::MissingBaseDate {
                raw: input.base_date.clone(),
            })?;

        let mut days = Vec::with_capacity(records.len());
        for record in &records {
            let Some(ctx) = DayContext::for_day(base_date, record.day) else {
                continue;
            };
            let build = self.builder.build(record, &ctx);
            for diagnostic in &build.diagnostics {
                warn!("{}: day {}: {}", input.subject_id, record.day, diagnostic.message);
            }
            diagnostics.extend(build.diagnostics);
            intervals.extend(build.intervals.iter().cloned());
            days.push(DayIntervals {
                ctx,
                intervals: build.intervals,
            });
        }

        CrossDayMerger::merge(days)
    }

    fn complement_for(
        &self,
        input: &SubjectInput,
        wear: &[WearPeriod],
    ) -> Result<Vec<NonWearInterval>, SkipReason> {
        let window = input
            .window
            .as_ref()
            .ok_or(SkipReason::MissingObservationWindow)?
            .resolve(&input.subject_id)?;
        self.complement.compute(wear, &window)
    }

    fn normalize_days(
        &self,
        input: &SubjectInput,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<DailyEventRecord> {
        let mut raw_days: Vec<&RawDayRecord> = input.days.iter().collect();
        raw_days.sort_by_key(|d| d.day);

        let mut records: Vec<DailyEventRecord> = Vec::with_capacity(raw_days.len());
        for raw in raw_days {
            if raw.day >= self.config.trial_days {
                warn!(
                    "{}: day {} is outside the {}-day trial, ignored",
                    input.subject_id, raw.day, self.config.trial_days
                );
                continue;
            }
            if records.last().is_some_and(|r| r.day == raw.day) {
                warn!("{}: duplicate day {}, ignored", input.subject_id, raw.day);
                continue;
            }

            let mut record = DailyEventRecord::new(input.subject_id.clone(), raw.day);
            for field in EventField::ALL {
                match self.normalizer.normalize(raw.field(field)) {
                    Ok(value) => record.set(field, value),
                    Err(malformed) => {
                        warn!(
                            "{}: day {}: unparseable {} {:?}",
                            input.subject_id,
                            raw.day,
                            field.as_str(),
                            malformed.raw
                        );
                        let note = if malformed.uncertain {
                            " (marked uncertain)"
                        } else {
                            ""
                        };
                        diagnostics.push(Diagnostic {
                            subject_id: input.subject_id.clone(),
                            kind: DiagnosticKind::Unparseable,
                            day: Some(raw.day),
                            field: Some(field),
                            message: format!(
                                "{} is not a time of day{note}",
                                field.as_str()
                            ),
                            raw: Some(malformed.raw),
                        });
                    }
                }
            }
            records.push(record);
        }

        records
    }
}

fn skip_diagnostic(input: &SubjectInput, reason: &SkipReason) -> Diagnostic {
    let (kind, day, raw) = match reason {
        SkipReason::MissingBaseDate { raw } => (DiagnosticKind::MissingDate, Some(0), raw.clone()),
        SkipReason::OverlapAfterMerge { .. } => (DiagnosticKind::OverlapAfterMerge, None, None),
        SkipReason::MissingObservationWindow => (DiagnosticKind::MissingWindow, None, None),
        SkipReason::InvalidObservationWindow { .. } => (DiagnosticKind::InvalidWindow, None, None),
        SkipReason::MalformedObservationWindow { raw, .. } => {
            (DiagnosticKind::InvalidWindow, None, raw.clone())
        }
    };
    Diagnostic {
        subject_id: input.subject_id.clone(),
        kind,
        day,
        field: None,
        raw,
        message: reason.to_string(),
    }
}
