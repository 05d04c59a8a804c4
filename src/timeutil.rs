use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const EASTERN: Tz = New_York;

const TIMESTAMP_WRITE_FMT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_READ_FMT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A UTC instant as it appears in snapshot files: `YYYY-MM-DD HH:MM:SS.mmmmmm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub NaiveDateTime);

#[derive(Debug, Error)]
#[error("invalid timestamp: {0}")]
pub struct TimestampParseError(pub String);

impl Timestamp {
    pub fn from_utc(instant: DateTime<Utc>) -> Self {
        Self(instant.naive_utc())
    }

    pub fn as_utc(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.0)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_WRITE_FMT))
    }
}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_READ_FMT)
            .map(Self)
            .map_err(|_| TimestampParseError(s.to_string()))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Calendar date in US Eastern time for the given instant.
pub fn eastern_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&EASTERN).date_naive()
}

/// Resolves an Eastern wall-clock time to a UTC instant.
///
/// Ambiguous times (the repeated hour in November) take the earlier instant.
/// Times inside the spring-forward gap move to the first valid instant after it.
pub fn eastern_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    let mut probe = local;
    loop {
        match EASTERN.from_local_datetime(&probe) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => probe += Duration::minutes(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid test datetime")
    }

    #[test]
    fn timestamp_uses_microsecond_format() {
        let ts = Timestamp(
            NaiveDate::from_ymd_opt(2023, 2, 11)
                .and_then(|d| d.and_hms_micro_opt(5, 5, 9, 42))
                .expect("valid"),
        );
        assert_eq!(ts.to_string(), "2023-02-11 05:05:09.000042");
        let parsed: Timestamp = "2023-02-11 05:05:09.000042".parse().expect("parse");
        assert_eq!(parsed, ts);
        let json = serde_json::to_string(&ts).expect("serialize");
        assert_eq!(json, "\"2023-02-11 05:05:09.000042\"");
    }

    #[test]
    fn timestamp_rejects_garbage() {
        assert!("yesterday".parse::<Timestamp>().is_err());
    }

    #[test]
    fn eastern_conversion_follows_dst() {
        // EST in February is UTC-5.
        let winter = eastern_to_utc(local(2023, 2, 10, 23, 59));
        assert_eq!(winter.to_rfc3339(), "2023-02-11T04:59:00+00:00");
        // EDT in July is UTC-4.
        let summer = eastern_to_utc(local(2023, 7, 1, 12, 0));
        assert_eq!(summer.to_rfc3339(), "2023-07-01T16:00:00+00:00");
    }

    #[test]
    fn spring_forward_gap_moves_to_next_valid_minute() {
        let resolved = eastern_to_utc(local(2023, 3, 12, 2, 30));
        assert_eq!(resolved.to_rfc3339(), "2023-03-12T07:00:00+00:00");
    }

    #[test]
    fn eastern_date_rolls_over_later_than_utc() {
        let utc = Utc.with_ymd_and_hms(2022, 9, 19, 2, 0, 0).unwrap();
        assert_eq!(
            eastern_date(utc),
            NaiveDate::from_ymd_opt(2022, 9, 18).unwrap()
        );
    }
}
