//! Timestamp helpers for the database layer.
//!
//! Timestamps are stored as `INTEGER` Unix epoch milliseconds (UTC).

use chrono::{DateTime, TimeZone, Utc};

/// Current time as Unix epoch milliseconds (UTC).
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a `DateTime<Utc>` to Unix epoch milliseconds.
#[inline]
pub fn datetime_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert Unix epoch milliseconds to `DateTime<Utc>`.
///
/// Out-of-range values fall back to the Unix epoch.
#[inline]
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .earliest()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_roundtrip() {
        let now = Utc::now();
        let ms = datetime_to_ms(now);
        assert_eq!(ms_to_datetime(ms).timestamp_millis(), ms);
    }

    #[test]
    fn test_out_of_range_falls_back() {
        assert_eq!(ms_to_datetime(i64::MAX), DateTime::UNIX_EPOCH);
    }
}
