//! §4.5 Range Planner: pure functions turning a requested window and the
//! set of already-cached dates into a minimal list of gap ranges, plus
//! the full-vs-gap fetch heuristic. Grounded structurally on the
//! teacher's `quotes::store` gap-computation helpers, but the algorithm
//! (coalescing, 80% heuristic) comes straight from spec.md §4.5.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// An inclusive `[start, end]` date range.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn day_count(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Enumerate every date in `[start, end]`, inclusive. Empty if `start > end`.
pub fn enumerate_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if start > end {
        return Vec::new();
    }
    let mut dates = Vec::with_capacity((end - start).num_days() as usize + 1);
    let mut d = start;
    while d <= end {
        dates.push(d);
        d += Duration::days(1);
    }
    dates
}

/// Step 1–4 of §4.5: all dates minus cached, sorted, coalesced into
/// contiguous ranges. Returns an empty vec when nothing is missing.
pub fn plan_gaps(start: NaiveDate, end: NaiveDate, cached_dates: &HashSet<NaiveDate>) -> Vec<DateRange> {
    let all = enumerate_dates(start, end);
    let mut missing: Vec<NaiveDate> = all.into_iter().filter(|d| !cached_dates.contains(d)).collect();
    if missing.is_empty() {
        return Vec::new();
    }
    missing.sort();

    let mut gaps = Vec::new();
    let mut range_start = missing[0];
    let mut range_end = missing[0];
    for &d in &missing[1..] {
        if (d - range_end).num_days() == 1 {
            range_end = d;
        } else {
            gaps.push(DateRange::new(range_start, range_end));
            range_start = d;
            range_end = d;
        }
    }
    gaps.push(DateRange::new(range_start, range_end));
    gaps
}

/// The full-vs-gap decision: fetch the whole `[start, end]` window in one
/// call when missing days exceed 80% of requested days, otherwise fetch
/// each gap individually.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchStrategy {
    FullRange,
    Gaps,
}

pub fn choose_strategy(requested_day_count: i64, missing_day_count: i64) -> FetchStrategy {
    if requested_day_count <= 0 {
        return FetchStrategy::Gaps;
    }
    let missing_ratio = missing_day_count as f64 / requested_day_count as f64;
    if missing_ratio > 0.8 {
        FetchStrategy::FullRange
    } else {
        FetchStrategy::Gaps
    }
}

/// Count of business days (Mon-Fri) in `[start, end]`, used by the
/// Historical Read-Through Service's completeness calculation for
/// asset types that don't trade weekends.
pub fn weekday_count(start: NaiveDate, end: NaiveDate) -> i64 {
    enumerate_dates(start, end)
        .into_iter()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn no_missing_dates_returns_empty() {
        let cached: HashSet<NaiveDate> = enumerate_dates(d(2025, 10, 1), d(2025, 10, 3)).into_iter().collect();
        assert!(plan_gaps(d(2025, 10, 1), d(2025, 10, 3), &cached).is_empty());
    }

    #[test]
    fn spec_example_gap_coalescing() {
        let cached: HashSet<NaiveDate> = [d(2025, 10, 2), d(2025, 10, 3), d(2025, 10, 6)].into_iter().collect();
        let gaps = plan_gaps(d(2025, 10, 1), d(2025, 10, 7), &cached);
        assert_eq!(
            gaps,
            vec![
                DateRange::new(d(2025, 10, 1), d(2025, 10, 1)),
                DateRange::new(d(2025, 10, 4), d(2025, 10, 5)),
                DateRange::new(d(2025, 10, 7), d(2025, 10, 7)),
            ]
        );
    }

    #[test]
    fn gaps_plus_cached_cover_full_enumeration_and_are_disjoint() {
        let cached: HashSet<NaiveDate> = [d(2025, 10, 2), d(2025, 10, 3), d(2025, 10, 6)].into_iter().collect();
        let gaps = plan_gaps(d(2025, 10, 1), d(2025, 10, 7), &cached);
        let mut covered: HashSet<NaiveDate> = cached.clone();
        for g in &gaps {
            for day in enumerate_dates(g.start, g.end) {
                assert!(!cached.contains(&day), "gap overlaps cached date");
                assert!(covered.insert(day), "gaps are not pairwise disjoint");
            }
        }
        let expected: HashSet<NaiveDate> = enumerate_dates(d(2025, 10, 1), d(2025, 10, 7)).into_iter().collect();
        assert_eq!(covered, expected);
    }

    #[test]
    fn strategy_full_range_above_80_percent_missing() {
        assert_eq!(choose_strategy(10, 9), FetchStrategy::FullRange);
        assert_eq!(choose_strategy(10, 8), FetchStrategy::Gaps);
    }

    #[test]
    fn weekday_count_excludes_weekends() {
        assert_eq!(weekday_count(d(2025, 10, 1), d(2025, 10, 7)), 5);
    }
}
