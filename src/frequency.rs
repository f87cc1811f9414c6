//! Rotation period boundaries.
//!
//! [`Frequency`] maps a point in time to the enclosing rotation period
//! `[prev, next)`. Calendar frequencies align to the start of the
//! month/week/day/hour in local time; fixed intervals align to the interval
//! size modulo the epoch, truncated to millisecond precision.

use std::str::FromStr;
use std::time::Duration;

use chrono::{
    DateTime, Datelike, Days, Local, LocalResult, Months, NaiveDateTime, NaiveTime, TimeZone,
    Timelike,
};

use crate::error::Error;

/// How often the boundary timer fires.
///
/// Calendar variants align to calendar starts in local time. [`Frequency::Interval`]
/// covers the fixed short intervals (`"3s"`, `"10s"`, ...) used for
/// high-frequency and testing scenarios; it is also what enables sequence
/// numbers in archive names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Start of the month, local time.
    Monthly,
    /// Start of the ISO week (Monday 00:00), local time.
    Weekly,
    /// Start of the day, local time.
    Daily,
    /// Start of the hour, local time.
    Hourly,
    /// Fixed interval aligned to the epoch.
    Interval(Duration),
}

impl Frequency {
    /// Whether this frequency rotates more than once per calendar day, which
    /// makes archive names require a sequence number to stay unique.
    pub fn is_high_frequency(&self) -> bool {
        matches!(self, Frequency::Interval(_))
    }

    /// Compute the rotation period enclosing `now`.
    ///
    /// Returns `(prev, next)` with `prev <= now < next`.
    pub fn boundary(&self, now: DateTime<Local>) -> (DateTime<Local>, DateTime<Local>) {
        match self {
            Frequency::Monthly => {
                let date = now.date_naive();
                let first = date.with_day(1).unwrap_or(date);
                let next = first.checked_add_months(Months::new(1)).unwrap_or(first);
                (
                    resolve_local(first.and_time(NaiveTime::MIN)),
                    resolve_local(next.and_time(NaiveTime::MIN)),
                )
            }
            Frequency::Weekly => {
                let date = now.date_naive();
                let monday = date
                    .checked_sub_days(Days::new(u64::from(
                        date.weekday().num_days_from_monday(),
                    )))
                    .unwrap_or(date);
                let next = monday.checked_add_days(Days::new(7)).unwrap_or(monday);
                (
                    resolve_local(monday.and_time(NaiveTime::MIN)),
                    resolve_local(next.and_time(NaiveTime::MIN)),
                )
            }
            Frequency::Daily => {
                let date = now.date_naive();
                let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
                (
                    resolve_local(date.and_time(NaiveTime::MIN)),
                    resolve_local(next.and_time(NaiveTime::MIN)),
                )
            }
            Frequency::Hourly => {
                let naive = now.naive_local();
                let hour = NaiveTime::from_hms_opt(naive.hour(), 0, 0).unwrap_or(NaiveTime::MIN);
                let prev = naive.date().and_time(hour);
                let next = prev
                    .checked_add_signed(chrono::Duration::hours(1))
                    .unwrap_or(prev);
                (resolve_local(prev), resolve_local(next))
            }
            Frequency::Interval(interval) => {
                let step = interval.as_millis() as i64;
                let now_ms = now.timestamp_millis();
                let prev_ms = now_ms - now_ms.rem_euclid(step);
                (from_millis(prev_ms, now), from_millis(prev_ms + step, now))
            }
        }
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "monthly" => Ok(Frequency::Monthly),
            "weekly" => Ok(Frequency::Weekly),
            "daily" => Ok(Frequency::Daily),
            "hourly" => Ok(Frequency::Hourly),
            other => {
                let secs = other
                    .strip_suffix('s')
                    .and_then(|digits| digits.parse::<u64>().ok())
                    .filter(|secs| *secs > 0);
                match secs {
                    Some(secs) => Ok(Frequency::Interval(Duration::from_secs(secs))),
                    None => Err(Error::validation(format!(
                        "frequency not recognized: {s:?} (expected monthly, weekly, daily, hourly or an interval like \"10s\")"
                    ))),
                }
            }
        }
    }
}

impl<'de> serde::Deserialize<'de> for Frequency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Map a naive local datetime back to a zoned one. DST-ambiguous instants
/// resolve to the earlier mapping; instants inside a DST gap fall back to the
/// UTC reading of the same wall-clock value.
fn resolve_local(naive: NaiveDateTime) -> DateTime<Local> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => Local.from_utc_datetime(&naive),
    }
}

fn from_millis(ms: i64, fallback: DateTime<Local>) -> DateTime<Local> {
    match Local.timestamp_millis_opt(ms) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => fallback,
    }
}
