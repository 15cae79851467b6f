// Civil time helpers for the settlement engine
//
// Every day and week boundary in this engine is computed in the fixed
// settlement timezone. "Today" is always derived by converting the instant
// into that offset and taking its calendar date, never by naive UTC date
// arithmetic, otherwise quota and cap windows drift around midnight.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, TimeZone};

use crate::config::SETTLEMENT_UTC_OFFSET_SECS;

// Millis timestamps used to determine it using its type
pub type TimestampMillis = u64;

// Seconds timestamps used to determine it using its type
pub type TimestampSeconds = u64;

/// Number of civil days in the withdrawal cap window
pub const DAYS_PER_WEEK: u64 = 7;

#[inline]
pub fn get_current_time() -> Duration {
    let start = SystemTime::now();

    start
        .duration_since(UNIX_EPOCH)
        .expect("Incorrect time returned from get_current_time")
}

// Return timestamp in seconds
pub fn get_current_time_in_seconds() -> TimestampSeconds {
    get_current_time().as_secs()
}

// Return timestamp in milliseconds
// We cast it to u64 as we have plenty of time before it overflows
pub fn get_current_time_in_millis() -> TimestampMillis {
    get_current_time().as_millis() as TimestampMillis
}

/// The fixed settlement timezone.
///
/// A constant offset with no DST rules, so local midnight is unambiguous and
/// civil date conversions are total functions.
pub fn settlement_timezone() -> FixedOffset {
    FixedOffset::east_opt(SETTLEMENT_UTC_OFFSET_SECS).expect("valid settlement offset")
}

/// Civil date of an instant, in the settlement timezone.
pub fn civil_date_of(timestamp: TimestampMillis) -> NaiveDate {
    DateTime::from_timestamp_millis(timestamp as i64)
        .expect("timestamp in representable range")
        .with_timezone(&settlement_timezone())
        .date_naive()
}

/// Civil date of the current instant.
pub fn civil_today() -> NaiveDate {
    civil_date_of(get_current_time_in_millis())
}

/// Millis timestamp of local midnight opening the given civil date.
pub fn day_start(date: NaiveDate) -> TimestampMillis {
    settlement_timezone()
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .expect("fixed offset datetimes are unambiguous")
        .timestamp_millis() as TimestampMillis
}

/// Half-open `[start, end)` millis window covering one civil day.
pub fn day_bounds(date: NaiveDate) -> (TimestampMillis, TimestampMillis) {
    let next = date.succ_opt().expect("civil date in representable range");
    (day_start(date), day_start(next))
}

/// First day (Sunday) of the civil week containing the given date.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let days_into_week = date.weekday().num_days_from_sunday() as u64;
    date.checked_sub_days(Days::new(days_into_week))
        .expect("civil date in representable range")
}

/// Half-open `[start, end)` millis window covering the Sunday-to-Sunday civil
/// week containing the given date.
pub fn week_bounds(date: NaiveDate) -> (TimestampMillis, TimestampMillis) {
    let start = week_start(date);
    let end = start
        .checked_add_days(Days::new(DAYS_PER_WEEK))
        .expect("civil date in representable range");
    (day_start(start), day_start(end))
}

/// Millis remaining until the next local midnight after `now`.
pub fn millis_until_next_midnight(now: TimestampMillis) -> TimestampMillis {
    let today = civil_date_of(now);
    let (_, end) = day_bounds(today);
    end.saturating_sub(now)
}

/// Compact `YYYYMMDD` encoding used for ordered storage keys.
pub fn encode_date(date: NaiveDate) -> u32 {
    let year = date.year() as u32;
    year * 10_000 + date.month() * 100 + date.day()
}

/// Inverse of [`encode_date`].
pub fn decode_date(code: u32) -> Option<NaiveDate> {
    let year = (code / 10_000) as i32;
    let month = (code / 100) % 100;
    let day = code % 100;
    NaiveDate::from_ymd_opt(year, month, day)
}
