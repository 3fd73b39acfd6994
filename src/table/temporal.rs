//! Textual forms of dates and timestamps shared by the copy encoder, the
//! row-wise binder, the CSV reader, and result date parsing.

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

const DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIMESTAMP_OUT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");
const TIMESTAMP_IN: &[&[FormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
];

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(DATE).unwrap_or_else(|_| date.to_string())
}

/// Formats a timestamp as `YYYY-MM-DD HH:MM:SS.ffffff`.
pub fn format_timestamp(ts: PrimitiveDateTime) -> String {
    ts.format(TIMESTAMP_OUT).unwrap_or_else(|_| ts.to_string())
}

/// Parses `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), DATE).ok()
}

/// Parses the timestamp layouts engines commonly emit, with a space or `T`
/// separator and optional fractional seconds. A trailing `Z` is ignored.
pub fn parse_timestamp(raw: &str) -> Option<PrimitiveDateTime> {
    let raw = raw.trim();
    let raw = raw.strip_suffix('Z').unwrap_or(raw);
    TIMESTAMP_IN
        .iter()
        .find_map(|layout| PrimitiveDateTime::parse(raw, *layout).ok())
}

/// Interprets seconds since the Unix epoch as a UTC timestamp.
pub fn timestamp_from_epoch(seconds: i64) -> Option<PrimitiveDateTime> {
    let utc = OffsetDateTime::from_unix_timestamp(seconds).ok()?;
    Some(PrimitiveDateTime::new(utc.date(), utc.time()))
}
