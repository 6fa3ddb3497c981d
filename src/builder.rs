//! Per-day wear interval construction
//!
//! A day's sparse events are turned into wear intervals by an ordered
//! [`RulePolicy`]. Each rule pairs a presence predicate with an interval
//! constructor. Rules marked `exclusive` form a first-match chain: once one
//! of them fires, later exclusive rules are skipped. Non-exclusive rules are
//! evaluated independently.
//!
//! Standard order (load-bearing):
//! 1. start_time → take_off_1 (independent)
//! 2. put_on_1 → take_off_2 (chain)
//! 3. put_on_1 → end_time, or open-ended (chain)
//! 4. day start → take_off_1 when no start_time (chain)
//! 5. whole known day when no removal was logged (chain)

use crate::types::{
    Confidence, DailyEventRecord, DayContext, Diagnostic, DiagnosticKind, EventField,
    IntervalEnd, RuleId, WearInterval,
};
use chrono::NaiveDateTime;
use log::debug;

/// Interval proposed by a rule before ordering validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub start: NaiveDateTime,
    pub end: IntervalEnd,
    pub confidence: Confidence,
}

/// A candidate whose start is not before its end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistent {
    pub field: EventField,
    pub message: String,
}

type Predicate = fn(&DailyEventRecord, &[RuleId]) -> bool;
type Constructor = fn(&DailyEventRecord, &DayContext) -> Result<Candidate, Inconsistent>;

/// One predicate → interval-constructor pair
#[derive(Clone, Copy)]
pub struct Rule {
    pub id: RuleId,
    pub exclusive: bool,
    applies: Predicate,
    construct: Constructor,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

impl Rule {
    pub fn applies(&self, record: &DailyEventRecord, fired: &[RuleId]) -> bool {
        (self.applies)(record, fired)
    }

    pub fn construct(
        &self,
        record: &DailyEventRecord,
        ctx: &DayContext,
    ) -> Result<Candidate, Inconsistent> {
        (self.construct)(record, ctx)
    }

    pub fn morning_then_removed() -> Self {
        Self {
            id: RuleId::MorningThenRemoved,
            exclusive: false,
            applies: |r, _| r.has(EventField::StartTime) && r.has(EventField::TakeOff1),
            construct: |r, ctx| {
                closed_between(r, ctx, EventField::StartTime, EventField::TakeOff1)
            },
        }
    }

    pub fn mid_day_cycle() -> Self {
        Self {
            id: RuleId::MidDayCycle,
            exclusive: true,
            applies: |r, _| r.has(EventField::PutOn1) && r.has(EventField::TakeOff2),
            construct: |r, ctx| closed_between(r, ctx, EventField::PutOn1, EventField::TakeOff2),
        }
    }

    pub fn reapplied_not_removed() -> Self {
        Self {
            id: RuleId::ReappliedNotRemoved,
            exclusive: true,
            applies: |r, _| r.has(EventField::PutOn1),
            construct: |r, ctx| until_end_or_open(r, ctx, EventField::PutOn1),
        }
    }

    pub fn removed_without_start() -> Self {
        Self {
            id: RuleId::RemovedWithoutStart,
            exclusive: true,
            applies: |r, _| r.has(EventField::TakeOff1) && !r.has(EventField::StartTime),
            construct: |r, ctx| {
                let end = at(r, ctx, EventField::TakeOff1)?;
                ordered(ctx.day_start, end, EventField::TakeOff1, Confidence::Inferred)
                    .map_err(|_| Inconsistent {
                        field: EventField::TakeOff1,
                        message: format!("take_off_1 ({end}) is not after the start of the day"),
                    })
            },
        }
    }

    pub fn no_removal_events() -> Self {
        Self {
            id: RuleId::NoRemovalEvents,
            exclusive: true,
            applies: |r, _| {
                [
                    EventField::TakeOff1,
                    EventField::PutOn1,
                    EventField::TakeOff2,
                    EventField::PutOn2,
                ]
                .iter()
                .all(|f| !r.has(*f))
            },
            construct: |r, ctx| {
                let start = r.time(EventField::StartTime).map_or(ctx.day_start, |t| ctx.at(t));
                let end = r.time(EventField::EndTime).map_or(ctx.day_end, |t| ctx.at(t));
                ordered(start, end, EventField::EndTime, Confidence::Assumed)
            },
        }
    }

    pub fn second_reapplication() -> Self {
        Self {
            id: RuleId::SecondReapplication,
            exclusive: false,
            applies: |r, fired| fired.contains(&RuleId::MidDayCycle) && r.has(EventField::PutOn2),
            construct: |r, ctx| {
                let removed = at(r, ctx, EventField::TakeOff2)?;
                let reapplied = at(r, ctx, EventField::PutOn2)?;
                if reapplied <= removed {
                    return Err(Inconsistent {
                        field: EventField::PutOn2,
                        message: format!(
                            "put_on_2 ({reapplied}) is not after take_off_2 ({removed})"
                        ),
                    });
                }
                until_end_or_open(r, ctx, EventField::PutOn2)
            },
        }
    }
}

fn at(
    record: &DailyEventRecord,
    ctx: &DayContext,
    field: EventField,
) -> Result<NaiveDateTime, Inconsistent> {
    record
        .time(field)
        .map(|t| ctx.at(t))
        .ok_or_else(|| Inconsistent {
            field,
            message: format!("{} is required by this rule", field.as_str()),
        })
}

fn ordered(
    start: NaiveDateTime,
    end: NaiveDateTime,
    field: EventField,
    confidence: Confidence,
) -> Result<Candidate, Inconsistent> {
    if start >= end {
        return Err(Inconsistent {
            field,
            message: format!("interval end {end} is not after start {start}"),
        });
    }
    Ok(Candidate {
        start,
        end: IntervalEnd::Closed(end),
        confidence,
    })
}

fn closed_between(
    record: &DailyEventRecord,
    ctx: &DayContext,
    from: EventField,
    to: EventField,
) -> Result<Candidate, Inconsistent> {
    let start = at(record, ctx, from)?;
    let end = at(record, ctx, to)?;
    ordered(start, end, to, Confidence::Observed).map_err(|_| Inconsistent {
        field: to,
        message: format!(
            "{} ({end}) is not after {} ({start})",
            to.as_str(),
            from.as_str()
        ),
    })
}

fn until_end_or_open(
    record: &DailyEventRecord,
    ctx: &DayContext,
    from: EventField,
) -> Result<Candidate, Inconsistent> {
    let start = at(record, ctx, from)?;
    match record.time(EventField::EndTime).map(|t| ctx.at(t)) {
        Some(end) if start < end => Ok(Candidate {
            start,
            end: IntervalEnd::Closed(end),
            confidence: Confidence::Observed,
        }),
        other => {
            if let Some(end) = other {
                debug!(
                    "{} day {}: end_time {end} not after {} {start}, leaving interval open",
                    record.subject_id,
                    record.day,
                    from.as_str()
                );
            }
            Ok(Candidate {
                start,
                end: IntervalEnd::Open,
                confidence: Confidence::Inferred,
            })
        }
    }
}

/// Ordered rule set applied to each subject-day
#[derive(Debug, Clone)]
pub struct RulePolicy {
    rules: Vec<Rule>,
}

impl Default for RulePolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RulePolicy {
    /// The five standard rules in their fixed order
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Rule::morning_then_removed(),
                Rule::mid_day_cycle(),
                Rule::reapplied_not_removed(),
                Rule::removed_without_start(),
                Rule::no_removal_events(),
            ],
        }
    }

    /// Standard rules followed by the second re-application rule
    pub fn extended() -> Self {
        let mut policy = Self::standard();
        policy.rules.push(Rule::second_reapplication());
        policy
    }

    /// Build a policy from an explicit rule list, evaluated in order
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule_ids(&self) -> Vec<RuleId> {
        self.rules.iter().map(|r| r.id).collect()
    }
}

/// Intervals and diagnostics for one subject-day
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayBuild {
    pub intervals: Vec<WearInterval>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Applies a [`RulePolicy`] to daily event records
#[derive(Debug, Clone, Default)]
pub struct IntervalBuilder {
    policy: RulePolicy,
}

impl IntervalBuilder {
    pub fn new(policy: RulePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RulePolicy {
        &self.policy
    }

    /// Build the wear intervals of one day
    pub fn build(&self, record: &DailyEventRecord, ctx: &DayContext) -> DayBuild {
        let mut out = DayBuild::default();
        let mut fired: Vec<RuleId> = Vec::new();
        let mut chain_taken = false;

        for rule in self.policy.rules() {
            if rule.exclusive && chain_taken {
                continue;
            }
            if !rule.applies(record, &fired) {
                continue;
            }

            match rule.construct(record, ctx) {
                Ok(candidate) => {
                    debug!(
                        "{} day {}: rule {} -> {} .. {:?}",
                        record.subject_id,
                        record.day,
                        rule.id.as_str(),
                        candidate.start,
                        candidate.end
                    );
                    if rule.exclusive {
                        chain_taken = true;
                    }
                    fired.push(rule.id);
                    out.intervals.push(WearInterval {
                        subject_id: record.subject_id.clone(),
                        start: candidate.start,
                        end: candidate.end,
                        source_day: record.day,
                        rule: rule.id,
                        confidence: candidate.confidence,
                    });
                }
                Err(inconsistent) => {
                    out.diagnostics.push(Diagnostic {
                        subject_id: record.subject_id.clone(),
                        kind: DiagnosticKind::InconsistentOrdering,
                        day: Some(record.day),
                        field: Some(inconsistent.field),
                        raw: None,
                        message: format!("rule {}: {}", rule.id.as_str(), inconsistent.message),
                    });
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeField;
    use chrono::{NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;

    fn ctx() -> DayContext {
        DayContext::for_day(NaiveDate::from_ymd_opt(2011, 1, 5).unwrap(), 0).unwrap()
    }

    fn record(fields: &[(EventField, &str)]) -> DailyEventRecord {
        let mut record = DailyEventRecord::new("CO-010", 0);
        for (field, time) in fields {
            let t = NaiveTime::parse_from_str(time, "%H:%M").unwrap();
            record.set(*field, Some(TimeField::new(t)));
        }
        record
    }

    fn ts(time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("2011-01-05 {time}"), "%Y-%m-%d %H:%M:%S")
            .unwrap()
    }

    fn spans(build: &DayBuild) -> Vec<(NaiveDateTime, IntervalEnd, RuleId)> {
        build
            .intervals
            .iter()
            .map(|i| (i.start, i.end, i.rule))
            .collect()
    }

    #[test]
    fn test_rule_one_and_rule_three_same_day() {
        let build = IntervalBuilder::default().build(
            &record(&[
                (EventField::StartTime, "12:59"),
                (EventField::TakeOff1, "14:30"),
                (EventField::PutOn1, "16:00"),
            ]),
            &ctx(),
        );

        assert_eq!(
            spans(&build),
            vec![
                (
                    ts("12:59:00"),
                    IntervalEnd::Closed(ts("14:30:00")),
                    RuleId::MorningThenRemoved
                ),
                (ts("16:00:00"), IntervalEnd::Open, RuleId::ReappliedNotRemoved),
            ]
        );
        assert_eq!(build.intervals[1].confidence, Confidence::Inferred);
        assert!(build.diagnostics.is_empty());
    }

    #[test]
    fn test_rule_one_and_rule_two_both_fire() {
        let build = IntervalBuilder::default().build(
            &record(&[
                (EventField::StartTime, "07:00"),
                (EventField::TakeOff1, "09:00"),
                (EventField::PutOn1, "10:00"),
                (EventField::TakeOff2, "18:00"),
                (EventField::EndTime, "22:00"),
            ]),
            &ctx(),
        );

        assert_eq!(
            spans(&build),
            vec![
                (
                    ts("07:00:00"),
                    IntervalEnd::Closed(ts("09:00:00")),
                    RuleId::MorningThenRemoved
                ),
                (
                    ts("10:00:00"),
                    IntervalEnd::Closed(ts("18:00:00")),
                    RuleId::MidDayCycle
                ),
            ]
        );
    }

    #[test]
    fn test_rule_three_closes_on_end_time() {
        let build = IntervalBuilder::default().build(
            &record(&[(EventField::PutOn1, "10:10"), (EventField::EndTime, "23:30")]),
            &ctx(),
        );

        assert_eq!(
            spans(&build),
            vec![(
                ts("10:10:00"),
                IntervalEnd::Closed(ts("23:30:00")),
                RuleId::ReappliedNotRemoved
            )]
        );
        assert_eq!(build.intervals[0].confidence, Confidence::Observed);
    }

    #[test]
    fn test_rule_three_stays_open_when_end_time_precedes_put_on() {
        let build = IntervalBuilder::default().build(
            &record(&[(EventField::PutOn1, "20:00"), (EventField::EndTime, "08:00")]),
            &ctx(),
        );

        assert_eq!(
            spans(&build),
            vec![(ts("20:00:00"), IntervalEnd::Open, RuleId::ReappliedNotRemoved)]
        );
    }

    #[test]
    fn test_rule_four_and_rule_three_do_not_both_fire() {
        // put_on_1 wins the chain, so the morning stretch is not emitted
        let build = IntervalBuilder::default().build(
            &record(&[
                (EventField::TakeOff1, "06:45"),
                (EventField::PutOn1, "10:10"),
                (EventField::EndTime, "23:30"),
            ]),
            &ctx(),
        );

        assert_eq!(build.intervals.len(), 1);
        assert_eq!(build.intervals[0].rule, RuleId::ReappliedNotRemoved);
    }

    #[test]
    fn test_rule_four_wears_from_day_start() {
        let build =
            IntervalBuilder::default().build(&record(&[(EventField::TakeOff1, "06:45")]), &ctx());

        assert_eq!(
            spans(&build),
            vec![(
                ts("00:00:00"),
                IntervalEnd::Closed(ts("06:45:00")),
                RuleId::RemovedWithoutStart
            )]
        );
        assert_eq!(build.intervals[0].confidence, Confidence::Inferred);
    }

    #[test]
    fn test_rule_five_uses_logged_bounds() {
        let build = IntervalBuilder::default().build(
            &record(&[(EventField::StartTime, "08:00"), (EventField::EndTime, "20:00")]),
            &ctx(),
        );

        assert_eq!(
            spans(&build),
            vec![(
                ts("08:00:00"),
                IntervalEnd::Closed(ts("20:00:00")),
                RuleId::NoRemovalEvents
            )]
        );
        assert_eq!(build.intervals[0].confidence, Confidence::Assumed);
    }

    #[test]
    fn test_rule_five_on_empty_day_covers_whole_day() {
        let build = IntervalBuilder::default().build(&record(&[]), &ctx());

        assert_eq!(
            spans(&build),
            vec![(
                ts("00:00:00"),
                IntervalEnd::Closed(ts("23:59:59")),
                RuleId::NoRemovalEvents
            )]
        );
    }

    #[test]
    fn test_second_cycle_only_yields_nothing() {
        let build = IntervalBuilder::default().build(
            &record(&[(EventField::TakeOff2, "15:00"), (EventField::PutOn2, "16:00")]),
            &ctx(),
        );

        assert!(build.intervals.is_empty());
        assert!(build.diagnostics.is_empty());
    }

    #[test]
    fn test_inconsistent_rule_one_is_discarded_and_reported() {
        let build = IntervalBuilder::default().build(
            &record(&[(EventField::StartTime, "15:00"), (EventField::TakeOff1, "14:00")]),
            &ctx(),
        );

        assert!(build.intervals.is_empty());
        assert_eq!(build.diagnostics.len(), 1);
        assert_eq!(
            build.diagnostics[0].kind,
            DiagnosticKind::InconsistentOrdering
        );
        assert_eq!(build.diagnostics[0].field, Some(EventField::TakeOff1));
    }

    #[test]
    fn test_inconsistent_rule_two_falls_through_to_rule_three() {
        let build = IntervalBuilder::default().build(
            &record(&[
                (EventField::PutOn1, "18:00"),
                (EventField::TakeOff2, "12:00"),
                (EventField::EndTime, "22:00"),
            ]),
            &ctx(),
        );

        assert_eq!(
            spans(&build),
            vec![(
                ts("18:00:00"),
                IntervalEnd::Closed(ts("22:00:00")),
                RuleId::ReappliedNotRemoved
            )]
        );
        assert_eq!(build.diagnostics.len(), 1);
    }

    #[test]
    fn test_extended_policy_adds_second_reapplication() {
        let day = record(&[
            (EventField::PutOn1, "09:00"),
            (EventField::TakeOff2, "12:00"),
            (EventField::PutOn2, "13:00"),
        ]);

        let standard = IntervalBuilder::default().build(&day, &ctx());
        assert_eq!(standard.intervals.len(), 1);

        let extended = IntervalBuilder::new(RulePolicy::extended()).build(&day, &ctx());
        assert_eq!(
            spans(&extended),
            vec![
                (
                    ts("09:00:00"),
                    IntervalEnd::Closed(ts("12:00:00")),
                    RuleId::MidDayCycle
                ),
                (ts("13:00:00"), IntervalEnd::Open, RuleId::SecondReapplication),
            ]
        );
    }

    #[test]
    fn test_policy_order_is_fixed() {
        assert_eq!(
            RulePolicy::standard().rule_ids(),
            vec![
                RuleId::MorningThenRemoved,
                RuleId::MidDayCycle,
                RuleId::ReappliedNotRemoved,
                RuleId::RemovedWithoutStart,
                RuleId::NoRemovalEvents,
            ]
        );
    }
}
