//! Time helpers for the fountain protocol.
//!
//! The device schedules LED and do-not-disturb windows as minutes since
//! midnight ([`MinuteOfDay`]) and keeps its clock as seconds since
//! 2000-01-01T00:00:00Z ([`device_epoch`]).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes in a day.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Unix timestamp of the device epoch (2000-01-01T00:00:00Z).
pub const DEVICE_EPOCH_UNIX: i64 = 946_684_800;

/// Returns the device epoch as a UTC datetime.
pub fn device_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(DEVICE_EPOCH_UNIX, 0)
        .single()
        .unwrap_or_default()
}

/// Seconds elapsed between the device epoch and `now`, saturating at the
/// bounds of `u32`.
pub fn seconds_since_device_epoch(now: DateTime<Utc>) -> u32 {
    let secs = now.timestamp() - DEVICE_EPOCH_UNIX;
    secs.clamp(0, i64::from(u32::MAX)) as u32
}

/// Error returned when parsing a `HH:MM` string fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time of day {input:?}: expected HH:MM between 00:00 and 23:59")]
pub struct ParseMinuteError {
    input: String,
}

/// A time of day expressed in minutes since midnight.
///
/// Values read off the wire are kept as-is even when they exceed a day so a
/// misbehaving device does not make a whole frame undecodable; values built
/// with [`MinuteOfDay::new`] or parsed from `HH:MM` are always valid.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MinuteOfDay(u16);

impl MinuteOfDay {
    /// 00:00.
    pub const MIDNIGHT: Self = Self(0);

    /// Creates a minute of day, returning `None` past 23:59.
    pub fn new(minutes: u16) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes))
    }

    /// Creates a minute of day from hours and minutes.
    pub fn from_hm(hour: u8, minute: u8) -> Option<Self> {
        if hour >= 24 || minute >= 60 {
            return None;
        }
        Some(Self(u16::from(hour) * 60 + u16::from(minute)))
    }

    /// Wraps a raw value read from a frame without validation.
    pub fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw number of minutes since midnight.
    pub fn minutes(self) -> u16 {
        self.0
    }

    /// Returns the hour component.
    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    /// Returns the minute component.
    pub fn minute(self) -> u16 {
        self.0 % 60
    }

    /// Returns true when the value is within a single day.
    pub fn is_valid(self) -> bool {
        self.0 < MINUTES_PER_DAY
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for MinuteOfDay {
    type Err = ParseMinuteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMinuteError {
            input: s.to_string(),
        };
        let (hour, minute) = s.trim().split_once(':').ok_or_else(err)?;
        let hour: u8 = hour.parse().map_err(|_| err())?;
        let minute: u8 = minute.parse().map_err(|_| err())?;
        Self::from_hm(hour, minute).ok_or_else(err)
    }
}

/// Formats a long runtime as `N days, H hours`.
pub fn format_runtime_days(runtime: Duration) -> String {
    let secs = runtime.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let day_unit = if days == 1 { "day" } else { "days" };
    let hour_unit = if hours == 1 { "hour" } else { "hours" };
    format!("{days} {day_unit}, {hours} {hour_unit}")
}

/// Formats a daily runtime as `H:MMh`.
pub fn format_runtime_hours(runtime: Duration) -> String {
    let secs = runtime.as_secs();
    format!("{}:{:02}h", secs / 3_600, (secs % 3_600) / 60)
}
