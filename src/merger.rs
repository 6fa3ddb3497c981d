//! Cross-day merging
//!
//! Stitches a subject's per-day wear intervals into one sorted list of
//! closed periods. An open-ended interval at the end of day *n* is joined
//! with the first interval of day *n+1* when that interval starts at
//! midnight. Open intervals that nothing continues are closed at the end of
//! their own day.

use crate::error::SkipReason;
use crate::types::{Confidence, DayContext, DayIndex, RuleId, WearInterval, WearPeriod};
use chrono::{NaiveDate, NaiveDateTime};
use log::debug;

/// Intervals built for one dated trial day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayIntervals {
    pub ctx: DayContext,
    pub intervals: Vec<WearInterval>,
}

/// An open chain waiting for the next day
struct OpenChain {
    subject_id: String,
    start: NaiveDateTime,
    source_day: DayIndex,
    through_day: DayIndex,
    through_day_end: NaiveDateTime,
    confidence: Confidence,
    rules: Vec<RuleId>,
}

impl OpenChain {
    fn begin(interval: &WearInterval, ctx: &DayContext) -> Self {
        Self {
            subject_id: interval.subject_id.clone(),
            start: interval.start,
            source_day: interval.source_day,
            through_day: ctx.day,
            through_day_end: ctx.day_end,
            confidence: interval.confidence,
            rules: vec![interval.rule],
        }
    }

    fn extend(mut self, interval: &WearInterval, ctx: &DayContext) -> Self {
        self.through_day = ctx.day;
        self.through_day_end = ctx.day_end;
        self.confidence = self.confidence.min(interval.confidence);
        if !self.rules.contains(&interval.rule) {
            self.rules.push(interval.rule);
        }
        self
    }

    fn close_at(self, end: NaiveDateTime) -> WearPeriod {
        WearPeriod {
            subject_id: self.subject_id,
            start: self.start,
            end,
            source_day: self.source_day,
            through_day: self.through_day,
            confidence: self.confidence,
            rules: self.rules,
        }
    }

    fn close_at_day_end(self) -> WearPeriod {
        let end = self.through_day_end;
        self.close_at(end)
    }
}

/// Merger for a subject's multi-day interval lists
pub struct CrossDayMerger;

impl CrossDayMerger {
    /// Dated contexts for day indices `0..trial_days`, always `base_date + n`
    pub fn day_contexts(base_date: NaiveDate, trial_days: DayIndex) -> Vec<DayContext> {
        (0..trial_days)
            .filter_map(|day| DayContext::for_day(base_date, day))
            .collect()
    }

    /// Merge per-day intervals into sorted, non-overlapping closed periods.
    ///
    /// An overlap left after merging means the input or the rule order is
    /// defective; it is reported rather than resolved.
    pub fn merge(mut days: Vec<DayIntervals>) -> Result<Vec<WearPeriod>, SkipReason> {
        days.sort_by_key(|d| d.ctx.day);

        let mut periods: Vec<WearPeriod> = Vec::new();
        let mut pending: Option<OpenChain> = None;

        for day in &mut days {
            day.intervals.sort_by_key(|i| i.start);
            let ctx = day.ctx;
            let mut intervals = day.intervals.iter().peekable();

            if let Some(chain) = pending.take() {
                let continues = chain.through_day + 1 == ctx.day
                    && intervals.peek().is_some_and(|i| i.start == ctx.day_start);

                if continues {
                    if let Some(first) = intervals.next() {
                        debug!(
                            "{}: joining open interval from {} with day {} interval",
                            chain.subject_id, chain.start, ctx.day
                        );
                        let chain = chain.extend(first, &ctx);
                        match first.end_time() {
                            Some(end) => periods.push(chain.close_at(end)),
                            None if intervals.peek().is_none() => pending = Some(chain),
                            None => periods.push(chain.close_at_day_end()),
                        }
                    }
                } else {
                    periods.push(chain.close_at_day_end());
                }
            }

            while let Some(interval) = intervals.next() {
                match interval.end_time() {
                    Some(end) => periods.push(OpenChain::begin(interval, &ctx).close_at(end)),
                    None if intervals.peek().is_none() => {
                        pending = Some(OpenChain::begin(interval, &ctx));
                    }
                    None => periods.push(OpenChain::begin(interval, &ctx).close_at_day_end()),
                }
            }
        }

        if let Some(chain) = pending.take() {
            periods.push(chain.close_at_day_end());
        }

        periods.sort_by_key(|p| p.start);
        check_no_overlap(&periods)?;
        Ok(periods)
    }
}

fn check_no_overlap(periods: &[WearPeriod]) -> Result<(), SkipReason> {
    for pair in periods.windows(2) {
        let (first, second) = (&pair[0], &pair[1]);
        if second.start < first.end {
            return Err(SkipReason::OverlapAfterMerge {
                first_start: first.start,
                first_end: first.end,
                second_start: second.start,
                second_end: second.end,
            });
        }
    }
    Ok(())
}
