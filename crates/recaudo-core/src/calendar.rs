//! Business-day arithmetic for receipt effective dates
//!
//! A transaction source carries `effective_days`: the number of business days
//! until funds from that channel actually clear. The holiday set is supplied
//! by the caller so the core stays calendar-agnostic.

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Add `business_days` working days to `start`, skipping weekends and any
/// date present in `holidays`. Zero or negative day counts return `start`.
pub fn effective_date(start: NaiveDate, business_days: i64, holidays: &[NaiveDate]) -> NaiveDate {
    let mut current = start;
    let mut added = 0;
    while added < business_days {
        current = match current.checked_add_days(Days::new(1)) {
            Some(d) => d,
            None => return current,
        };
        if is_business_day(current, holidays) {
            added += 1;
        }
    }
    current
}

fn is_business_day(date: NaiveDate, holidays: &[NaiveDate]) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !holidays.contains(&date)
}

/// Fixed-date Colombian holidays for `year` (the movable feasts that shift to
/// Monday are not modeled; callers can append them when accuracy matters).
pub fn colombian_fixed_holidays(year: i32) -> Vec<NaiveDate> {
    const FIXED: [(u32, u32); 6] = [(1, 1), (5, 1), (7, 20), (8, 7), (12, 8), (12, 25)];
    FIXED
        .iter()
        .filter_map(|&(month, day)| NaiveDate::from_ymd_opt(year, month, day))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn zero_days_is_identity() {
        assert_eq!(effective_date(d(2024, 1, 10), 0, &[]), d(2024, 1, 10));
    }

    #[test]
    fn skips_weekend() {
        // Friday + 1 business day = Monday
        assert_eq!(effective_date(d(2024, 1, 12), 1, &[]), d(2024, 1, 15));
    }

    #[test]
    fn skips_holiday() {
        // Tuesday + 1 business day, but Wednesday is a holiday
        let holidays = [d(2024, 1, 10)];
        assert_eq!(effective_date(d(2024, 1, 9), 1, &holidays), d(2024, 1, 11));
    }

    #[test]
    fn counts_across_week_boundary() {
        // Thursday + 3 business days = Tuesday next week
        assert_eq!(effective_date(d(2024, 1, 11), 3, &[]), d(2024, 1, 16));
    }

    #[test]
    fn colombian_fixed_set() {
        let days = colombian_fixed_holidays(2024);
        assert_eq!(days.len(), 6);
        assert!(days.contains(&d(2024, 7, 20)));
        assert!(days.contains(&d(2024, 12, 25)));
    }
}
