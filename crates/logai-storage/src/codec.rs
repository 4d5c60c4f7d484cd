//! Column encoding shared by the DAOs.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with millisecond
//! precision, so lexical order in SQL equals chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

pub fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn decode_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Round-trip a timestamp through the storage precision.
pub fn truncate_ts(ts: &DateTime<Utc>) -> DateTime<Utc> {
    decode_ts(&encode_ts(ts)).unwrap_or(*ts)
}

fn conversion_error(idx: usize, raw: &str, what: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("invalid {} value '{}'", what, raw).into(),
    )
}

pub fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    decode_ts(&raw).ok_or_else(|| conversion_error(idx, &raw, "timestamp"))
}

pub fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(raw) => decode_ts(&raw)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, &raw, "timestamp")),
        None => Ok(None),
    }
}

pub fn enum_col<T>(
    row: &Row<'_>,
    idx: usize,
    what: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, &raw, what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let a = Utc.with_ymd_and_hms(2026, 10, 16, 9, 59, 59).unwrap();
        let b = a + chrono::Duration::milliseconds(1);
        let c = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();
        assert!(encode_ts(&a) < encode_ts(&b));
        assert!(encode_ts(&b) < encode_ts(&c));
        assert_eq!(encode_ts(&c), "2026-10-16T10:00:00.000Z");
    }

    #[test]
    fn decode_accepts_offsets() {
        let ts = decode_ts("2026-10-16T12:00:00+02:00").unwrap();
        assert_eq!(encode_ts(&ts), "2026-10-16T10:00:00.000Z");
        assert!(decode_ts("yesterday").is_none());
    }
}
