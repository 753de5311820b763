//! Date-range arithmetic for the pipeline.
//!
//! All range operations are inclusive on both ends; an inverted range is
//! empty rather than an error, so callers can process it trivially.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};

/// Format a date as the canonical `YYYY-MM-DD` key used throughout the store.
pub fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Inclusive list of days from `since` through `until`. Empty when
/// `since > until`.
pub fn date_range(since: NaiveDate, until: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut current = since;
    while current <= until {
        out.push(current);
        current += Duration::days(1);
    }
    out
}

/// Last day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (y, m) = (date.year(), date.month());
    let first_of_next = if m == 12 {
        NaiveDate::from_ymd_opt(y + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(y, m + 1, 1)
    };
    first_of_next.expect("valid month start") - Duration::days(1)
}

/// Partition `[since, until]` into month-aligned chunks. The first and last
/// chunks may be partial months.
pub fn monthly_chunks(since: NaiveDate, until: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut chunks = Vec::new();
    let mut current = since;
    while current <= until {
        let chunk_end = month_end(current).min(until);
        chunks.push((current, chunk_end));
        current = chunk_end + Duration::days(1);
    }
    chunks
}

/// Monday and Sunday of the given ISO week, or `None` for an invalid week.
pub fn week_bounds(year: i32, week: u32) -> Option<(NaiveDate, NaiveDate)> {
    let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
    Some((monday, monday + Duration::days(6)))
}

/// First and last day of the given month, or `None` for an invalid month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some((first, month_end(first)))
}

/// First and last day of the given year.
pub fn year_bounds(year: i32) -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(year, 1, 1).expect("valid year start"),
        NaiveDate::from_ymd_opt(year, 12, 31).expect("valid year end"),
    )
}

/// Distinct ISO `(year, week)` pairs overlapping the given month, in order.
pub fn weeks_overlapping_month(year: i32, month: u32) -> Vec<(i32, u32)> {
    let Some((first, last)) = month_bounds(year, month) else {
        return Vec::new();
    };
    let mut weeks = Vec::new();
    let mut d = first;
    while d <= last {
        let iso = d.iso_week();
        let pair = (iso.year(), iso.week());
        if weeks.last() != Some(&pair) {
            weeks.push(pair);
        }
        d += Duration::days(7);
    }
    // A 7-day stride can step over the final partial week.
    let iso = last.iso_week();
    let pair = (iso.year(), iso.week());
    if weeks.last() != Some(&pair) {
        weeks.push(pair);
    }
    weeks
}

/// Catch-up window: the day after the checkpoint through today (UTC).
pub fn catchup_range(last_done: NaiveDate) -> (NaiveDate, NaiveDate) {
    (last_done + Duration::days(1), Utc::now().date_naive())
}
