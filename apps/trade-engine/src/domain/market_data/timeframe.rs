//! Bar sizes and boundary arithmetic.
//!
//! Intraday boundaries are aligned to multiples of the bar length since the
//! Unix epoch, so a 15min bar closes at :00, :15, :30 and :45. Daily bars close
//! once per calendar day at a configured UTC time of day.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported bar sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    /// One minute.
    #[serde(rename = "1min")]
    OneMinute,
    /// Five minutes.
    #[serde(rename = "5min")]
    FiveMinutes,
    /// Fifteen minutes.
    #[serde(rename = "15min")]
    FifteenMinutes,
    /// Thirty minutes.
    #[serde(rename = "30min")]
    ThirtyMinutes,
    /// One hour.
    #[serde(rename = "1hour")]
    OneHour,
    /// Four hours.
    #[serde(rename = "4hour")]
    FourHours,
    /// One trading day.
    #[serde(rename = "1day")]
    OneDay,
}

/// Unrecognized timeframe string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown timeframe '{0}' (expected one of 1min, 5min, 15min, 30min, 1hour, 4hour, 1day)")]
pub struct TimeframeParseError(pub String);

impl Timeframe {
    /// All supported timeframes, shortest first.
    pub const ALL: [Self; 7] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::OneHour,
        Self::FourHours,
        Self::OneDay,
    ];

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::FiveMinutes => "5min",
            Self::FifteenMinutes => "15min",
            Self::ThirtyMinutes => "30min",
            Self::OneHour => "1hour",
            Self::FourHours => "4hour",
            Self::OneDay => "1day",
        }
    }

    /// Bar length in seconds.
    #[must_use]
    pub const fn seconds(&self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::ThirtyMinutes => 1_800,
            Self::OneHour => 3_600,
            Self::FourHours => 14_400,
            Self::OneDay => 86_400,
        }
    }

    /// Bar length as a chrono duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// First bar boundary strictly after `now`.
    #[must_use]
    pub fn next_boundary_after(&self, now: DateTime<Utc>, daily_close: NaiveTime) -> DateTime<Utc> {
        match self {
            Self::OneDay => {
                let today = now.date_naive().and_time(daily_close).and_utc();
                if today > now {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            _ => {
                let len = self.seconds();
                from_epoch((now.timestamp().div_euclid(len) + 1) * len)
            }
        }
    }

    /// Most recent bar boundary at or before `now`.
    #[must_use]
    pub fn last_boundary_at_or_before(
        &self,
        now: DateTime<Utc>,
        daily_close: NaiveTime,
    ) -> DateTime<Utc> {
        match self {
            Self::OneDay => {
                let today = now.date_naive().and_time(daily_close).and_utc();
                if today <= now {
                    today
                } else {
                    today - Duration::days(1)
                }
            }
            _ => {
                let len = self.seconds();
                from_epoch(now.timestamp().div_euclid(len) * len)
            }
        }
    }
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TimeframeParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn close_2100() -> NaiveTime {
        NaiveTime::from_hms_opt(21, 0, 0).unwrap()
    }

    #[test_case(Timeframe::OneMinute, "2024-03-01T14:29:10Z", "2024-03-01T14:30:00Z")]
    #[test_case(Timeframe::FiveMinutes, "2024-03-01T14:31:00Z", "2024-03-01T14:35:00Z")]
    #[test_case(Timeframe::FifteenMinutes, "2024-03-01T14:44:59Z", "2024-03-01T14:45:00Z")]
    #[test_case(Timeframe::ThirtyMinutes, "2024-03-01T14:30:00Z", "2024-03-01T15:00:00Z")]
    #[test_case(Timeframe::OneHour, "2024-03-01T14:30:00Z", "2024-03-01T15:00:00Z")]
    #[test_case(Timeframe::FourHours, "2024-03-01T14:30:00Z", "2024-03-01T16:00:00Z")]
    #[test_case(Timeframe::OneDay, "2024-03-01T14:30:00Z", "2024-03-01T21:00:00Z")]
    #[test_case(Timeframe::OneDay, "2024-03-01T21:00:00Z", "2024-03-02T21:00:00Z")]
    fn next_boundary(tf: Timeframe, now: &str, expected: &str) {
        assert_eq!(tf.next_boundary_after(at(now), close_2100()), at(expected));
    }

    #[test]
    fn boundary_exactly_now_is_not_next() {
        let now = at("2024-03-01T14:30:00Z");
        assert_eq!(
            Timeframe::OneMinute.next_boundary_after(now, close_2100()),
            at("2024-03-01T14:31:00Z")
        );
        assert_eq!(
            Timeframe::OneMinute.last_boundary_at_or_before(now, close_2100()),
            now
        );
    }

    #[test]
    fn last_daily_boundary_before_close_is_yesterday() {
        let now = at("2024-03-01T20:59:59Z");
        assert_eq!(
            Timeframe::OneDay.last_boundary_at_or_before(now, close_2100()),
            at("2024-02-29T21:00:00Z")
        );
    }

    #[test]
    fn parses_and_serializes_canonical_names() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
            assert_eq!(serde_json::to_string(&tf).unwrap(), format!("\"{tf}\""));
        }
        assert!("2min".parse::<Timeframe>().is_err());
    }
}
