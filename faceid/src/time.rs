//! Detection timestamp type.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::FaceIdError;

const TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// When a camera saw a face.
///
/// Serializes as `"YYYY-MM-DD HH:MM:SS"` (UTC, fractional seconds only when
/// present). Deserializes from that form, from RFC 3339, or from a Unix
/// milliseconds integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DetectTime(DateTime<Utc>);

impl DetectTime {
    pub fn new(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a DetectTime from Unix milliseconds.
    pub fn from_millis(ms: i64) -> Result<Self, FaceIdError> {
        Utc.timestamp_millis_opt(ms)
            .single()
            .map(Self)
            .ok_or_else(|| FaceIdError::InvalidTimestamp(format!("{ms} ms out of range")))
    }

    pub fn parse(s: &str) -> Result<Self, FaceIdError> {
        let s = s.trim();
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, TEXT_FORMAT) {
            return Ok(Self(naive.and_utc()));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        Err(FaceIdError::InvalidTimestamp(s.to_string()))
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Start of the containing minute, in Unix milliseconds.
    pub fn minute_bucket_millis(&self) -> i64 {
        let secs = self.0.timestamp();
        (secs - secs.rem_euclid(60)) * 1000
    }
}

impl fmt::Display for DetectTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TEXT_FORMAT))
    }
}

impl fmt::Debug for DetectTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DetectTime({self})")
    }
}

impl From<DateTime<Utc>> for DetectTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl Serialize for DetectTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Millis(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for DetectTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Millis(ms) => Self::from_millis(ms),
            Repr::Text(s) => Self::parse(&s),
        }
        .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sql_style() {
        let t = DetectTime::parse("2020-02-03 10:15:42").unwrap();
        assert_eq!(t.datetime(), Utc.with_ymd_and_hms(2020, 2, 3, 10, 15, 42).unwrap());
        assert_eq!(t.to_string(), "2020-02-03 10:15:42");
    }

    #[test]
    fn parse_rfc3339_with_offset() {
        let t = DetectTime::parse("2020-02-03T17:15:42+07:00").unwrap();
        assert_eq!(t.to_string(), "2020-02-03 10:15:42");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            DetectTime::parse("yesterday"),
            Err(FaceIdError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn minute_bucket() {
        let t = DetectTime::parse("2020-02-03 10:15:42").unwrap();
        let start = DetectTime::parse("2020-02-03 10:15:00").unwrap();
        assert_eq!(t.minute_bucket_millis(), start.unix_millis());
    }

    #[test]
    fn serde_accepts_text_and_millis() {
        let a: DetectTime = serde_json::from_str("\"2024-01-15 10:30:00\"").unwrap();
        let b: DetectTime = serde_json::from_str("1705314600000").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"2024-01-15 10:30:00\"");
        assert!(serde_json::from_str::<DetectTime>("\"not a time\"").is_err());
    }
}
