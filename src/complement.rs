//! Non-wear gap computation
//!
//! Derives the complement of a subject's wear periods inside its
//! observation window. Gaps shorter than the minimum duration are treated
//! as rounding or parsing noise and dropped.

use crate::error::SkipReason;
use crate::types::{NonWearInterval, ObservationWindow, WearPeriod};
use chrono::{Duration, NaiveDateTime};

/// Default minimum non-wear gap (seconds)
pub const DEFAULT_MIN_GAP_SECONDS: i64 = 60;

/// Computes non-wear intervals against an observation window
#[derive(Debug, Clone, Copy)]
pub struct ComplementComputer {
    min_gap: Duration,
}

impl Default for ComplementComputer {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_MIN_GAP_SECONDS))
    }
}

impl ComplementComputer {
    pub fn new(min_gap: Duration) -> Self {
        Self { min_gap }
    }

    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }

    /// Compute the non-wear gaps of `wear` within `window`, in chronological order.
    pub fn compute(
        &self,
        wear: &[WearPeriod],
        window: &ObservationWindow,
    ) -> Result<Vec<NonWearInterval>, SkipReason> {
        if window.data_start >= window.data_end {
            return Err(SkipReason::InvalidObservationWindow {
                data_start: window.data_start,
                data_end: window.data_end,
            });
        }

        let mut sorted: Vec<&WearPeriod> = wear.iter().collect();
        sorted.sort_by_key(|p| p.start);

        let mut gaps = Vec::new();
        let mut cursor = window.data_start;

        for period in sorted {
            if period.start > cursor {
                self.push_gap(&mut gaps, window, cursor, period.start);
            }
            cursor = cursor.max(period.end);
        }

        if cursor < window.data_end {
            self.push_gap(&mut gaps, window, cursor, window.data_end);
        }

        Ok(gaps)
    }

    fn push_gap(
        &self,
        gaps: &mut Vec<NonWearInterval>,
        window: &ObservationWindow,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) {
        let start = start.max(window.data_start);
        let end = end.min(window.data_end);
        if start >= end || end - start < self.min_gap {
            return;
        }
        gaps.push(NonWearInterval {
            subject_id: window.subject_id.clone(),
            start,
            end,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, RuleId};
    use pretty_assertions::assert_eq;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn period(start: &str, end: &str) -> WearPeriod {
        WearPeriod {
            subject_id: "CO-010".to_string(),
            start: ts(start),
            end: ts(end),
            source_day: 0,
            through_day: 0,
            confidence: Confidence::Observed,
            rules: vec![RuleId::MorningThenRemoved],
        }
    }

    fn window(start: &str, end: &str) -> ObservationWindow {
        ObservationWindow::new("CO-010", ts(start), ts(end))
    }

    fn bounds(gaps: &[NonWearInterval]) -> Vec<(String, String)> {
        gaps.iter()
            .map(|g| (g.start.to_string(), g.end.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_wear_is_whole_window() {
        let w = window("2011-01-05 00:00:00", "2011-01-08 23:59:00");
        let gaps = ComplementComputer::default().compute(&[], &w).unwrap();

        assert_eq!(
            bounds(&gaps),
            vec![("2011-01-05 00:00:00".to_string(), "2011-01-08 23:59:00".to_string())]
        );
    }

    #[test]
    fn test_gaps_before_between_and_after() {
        let w = window("2011-01-05 10:00:00", "2011-01-05 22:00:00");
        let wear = vec![
            period("2011-01-05 12:59:00", "2011-01-05 14:30:00"),
            period("2011-01-05 16:00:00", "2011-01-05 20:00:00"),
        ];
        let gaps = ComplementComputer::default().compute(&wear, &w).unwrap();

        assert_eq!(
            bounds(&gaps),
            vec![
                ("2011-01-05 10:00:00".to_string(), "2011-01-05 12:59:00".to_string()),
                ("2011-01-05 14:30:00".to_string(), "2011-01-05 16:00:00".to_string()),
                ("2011-01-05 20:00:00".to_string(), "2011-01-05 22:00:00".to_string()),
            ]
        );
    }

    #[test]
    fn test_sub_threshold_gaps_are_dropped() {
        let w = window("2011-01-05 00:00:00", "2011-01-06 23:59:59");
        let wear = vec![
            period("2011-01-05 00:00:00", "2011-01-05 23:59:59"),
            period("2011-01-06 00:00:00", "2011-01-06 23:59:59"),
        ];
        let gaps = ComplementComputer::default().compute(&wear, &w).unwrap();

        assert!(gaps.is_empty());
    }

    #[test]
    fn test_gap_of_exactly_threshold_is_kept() {
        let w = window("2011-01-05 08:00:00", "2011-01-05 09:00:00");
        let wear = vec![period("2011-01-05 08:01:00", "2011-01-05 09:00:00")];
        let gaps = ComplementComputer::default().compute(&wear, &w).unwrap();

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].duration(), Duration::minutes(1));
    }

    #[test]
    fn test_gaps_are_clipped_to_window() {
        let w = window("2011-01-05 12:00:00", "2011-01-05 18:00:00");
        let wear = vec![
            period("2011-01-05 06:00:00", "2011-01-05 10:00:00"),
            period("2011-01-05 14:00:00", "2011-01-05 20:00:00"),
        ];
        let gaps = ComplementComputer::default().compute(&wear, &w).unwrap();

        assert_eq!(
            bounds(&gaps),
            vec![("2011-01-05 12:00:00".to_string(), "2011-01-05 14:00:00".to_string())]
        );
    }

    #[test]
    fn test_unsorted_input_is_handled() {
        let w = window("2011-01-05 00:00:00", "2011-01-05 12:00:00");
        let wear = vec![
            period("2011-01-05 06:00:00", "2011-01-05 12:00:00"),
            period("2011-01-05 00:00:00", "2011-01-05 03:00:00"),
        ];
        let gaps = ComplementComputer::default().compute(&wear, &w).unwrap();

        assert_eq!(
            bounds(&gaps),
            vec![("2011-01-05 03:00:00".to_string(), "2011-01-05 06:00:00".to_string())]
        );
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let w = window("2011-01-06 00:00:00", "2011-01-05 00:00:00");
        let result = ComplementComputer::default().compute(&[], &w);

        assert!(matches!(
            result,
            Err(SkipReason::InvalidObservationWindow { .. })
        ));
    }
}
