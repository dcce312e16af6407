//! Time utilities: timezone-aware day boundaries and weekday numbering.
//!
//! Weekdays are numbered 0 = Sunday through 6 = Saturday throughout the engine.

use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse an IANA timezone name like "America/Chicago".
pub fn parse_tz(tz: &str) -> Result<Tz> {
    tz.parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone: {tz}"))
}

/// `hour:00` local time on `date`, as UTC.
///
/// For a DST gap the hour does not exist locally; we fall forward one hour.
pub fn local_hour_to_utc(date: NaiveDate, hour: u32, tz: Tz) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    let local = tz
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .or_else(|| {
            let next = NaiveTime::from_hms_opt((hour + 1) % 24, 0, 0)?;
            tz.from_local_datetime(&date.and_time(next)).earliest()
        })?;
    Some(local.with_timezone(&Utc))
}

/// Calendar date of `dt` in `tz`.
pub fn local_date(dt: DateTime<Utc>, tz: Tz) -> NaiveDate {
    dt.with_timezone(&tz).date_naive()
}

/// Weekday of `date`, 0 = Sunday.
pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// English weekday name, e.g. "Monday".
pub fn weekday_name(date: NaiveDate) -> String {
    date.format("%A").to_string()
}

/// Whole minutes from `from` to `to`, truncated toward zero.
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes()
}
