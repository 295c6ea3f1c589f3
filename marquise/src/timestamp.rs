//! Nanosecond timestamps as carried on the wire.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::error::{MarquiseError, Result};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Nanoseconds since the Unix epoch as an unsigned 64-bit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(nanos)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        let secs = (self.0 / NANOS_PER_SEC) as i64;
        let nanos = (self.0 % NANOS_PER_SEC) as u32;
        DateTime::from_timestamp(secs, nanos).unwrap_or_default()
    }
}

impl TryFrom<DateTime<Utc>> for Timestamp {
    type Error = MarquiseError;

    /// Converts exactly, keeping every sub-second nanosecond.
    ///
    /// # Errors
    ///
    /// Returns [`MarquiseError::ArgumentRange`] for times before the epoch or
    /// past the last representable nanosecond.
    fn try_from(time: DateTime<Utc>) -> Result<Self> {
        let secs = u64::try_from(time.timestamp()).map_err(|_| MarquiseError::ArgumentRange {
            message: format!("Timestamp {time} is before the Unix epoch"),
        })?;

        secs.checked_mul(NANOS_PER_SEC)
            .and_then(|n| n.checked_add(u64::from(time.timestamp_subsec_nanos())))
            .map(Self)
            .ok_or_else(|| MarquiseError::ArgumentRange {
                message: format!("Timestamp {time} does not fit in 64-bit nanoseconds"),
            })
    }
}

impl TryFrom<SystemTime> for Timestamp {
    type Error = MarquiseError;

    fn try_from(time: SystemTime) -> Result<Self> {
        Self::try_from(DateTime::<Utc>::from(time))
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.to_datetime()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}
