use chrono::{Datelike, NaiveDate};

/// Zero-based day of year, relative to the date's own year
pub fn day_of_year(date: NaiveDate) -> u32 {
    date.ordinal0()
}

/// First calendar day of the given month, `None` for an invalid year/month
pub fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// All (year, month) pairs touched by the inclusive date range, in order
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    if end < start {
        return months;
    }

    let (mut year, mut month) = (start.year(), start.month());
    while (year, month) <= (end.year(), end.month()) {
        months.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }

    months
}
