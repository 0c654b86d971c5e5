//! Millisecond-precision wall-clock types with humantime-formatted config
//! representation.

use std::{
    fmt::{self, Display, Formatter},
    ops::{Add, Mul, Sub},
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use datasize::DataSize;
use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// An error parsing a [`TimeDiff`] from its humantime string form.
#[derive(Debug, Error)]
#[error("could not parse time diff: {0}")]
pub struct TimeDiffParseError(#[from] humantime::DurationError);

/// A duration with millisecond precision.
///
/// Parses from humantime strings (`"10min"`, `"500ms"`) in configuration
/// files and serializes back to them in human-readable formats.
#[derive(
    Copy, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, DataSize,
)]
pub struct TimeDiff(u64);

impl TimeDiff {
    /// Returns a `TimeDiff` of `millis` milliseconds.
    pub const fn from_millis(millis: u64) -> TimeDiff {
        TimeDiff(millis)
    }

    /// Returns a `TimeDiff` of `seconds` seconds.
    pub const fn from_seconds(seconds: u32) -> TimeDiff {
        TimeDiff(seconds as u64 * 1_000)
    }

    /// Returns the duration in milliseconds.
    pub fn millis(self) -> u64 {
        self.0
    }
}

impl Display for TimeDiff {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(Duration::from(*self)))
    }
}

impl FromStr for TimeDiff {
    type Err = TimeDiffParseError;

    fn from_str(value: &str) -> Result<TimeDiff, TimeDiffParseError> {
        let duration = humantime::parse_duration(value)?;
        Ok(TimeDiff(duration.as_millis() as u64))
    }
}

impl Serialize for TimeDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            self.to_string().serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for TimeDiff {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let value = String::deserialize(deserializer)?;
            TimeDiff::from_str(&value).map_err(SerdeError::custom)
        } else {
            let millis = u64::deserialize(deserializer)?;
            Ok(TimeDiff(millis))
        }
    }
}

impl From<TimeDiff> for Duration {
    fn from(diff: TimeDiff) -> Duration {
        Duration::from_millis(diff.0)
    }
}

impl Mul<u64> for TimeDiff {
    type Output = TimeDiff;

    fn mul(self, rhs: u64) -> TimeDiff {
        TimeDiff(self.0.saturating_mul(rhs))
    }
}

/// A timestamp; milliseconds since the Unix epoch.
#[derive(
    Copy, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Serialize, Deserialize,
    DataSize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Returns the timestamp of the current moment.
    pub fn now() -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after the Unix epoch")
            .as_millis() as u64;
        Timestamp(millis)
    }

    /// Returns a timestamp of `millis` milliseconds after the Unix epoch.
    pub const fn from_millis(millis: u64) -> Timestamp {
        Timestamp(millis)
    }

    /// Returns the number of milliseconds since the Unix epoch.
    pub fn millis(self) -> u64 {
        self.0
    }

    /// Returns the difference to an earlier timestamp, or zero if `earlier`
    /// is in fact later.
    pub fn saturating_diff(self, earlier: Timestamp) -> TimeDiff {
        TimeDiff(self.0.saturating_sub(earlier.0))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let system_time = UNIX_EPOCH + Duration::from_millis(self.0);
        write!(f, "{}", humantime::format_rfc3339_millis(system_time))
    }
}

impl Add<TimeDiff> for Timestamp {
    type Output = Timestamp;

    fn add(self, diff: TimeDiff) -> Timestamp {
        Timestamp(self.0.saturating_add(diff.0))
    }
}

impl Sub<TimeDiff> for Timestamp {
    type Output = Timestamp;

    fn sub(self, diff: TimeDiff) -> Timestamp {
        Timestamp(self.0.saturating_sub(diff.0))
    }
}
