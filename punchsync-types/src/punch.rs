//! Punch events as reported by terminals

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};

/// Wall-clock layouts used by terminals that do not emit RFC 3339
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Punch direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Wire code meaning check-in
    pub const IN_CODE: &'static str = "1";

    /// Map a wire direction code
    ///
    /// Only [`Direction::IN_CODE`] means check-in. Every other code is a
    /// check-out; firmware variants disagree on the remaining codes so none
    /// are rejected.
    pub fn from_code(code: &str) -> Self {
        if code == Self::IN_CODE { Self::In } else { Self::Out }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device clock reading, trusted as-is
///
/// Keeps the wall-clock value exactly as the terminal wrote it, plus the UTC
/// offset when the terminal supplied one. The calendar day of a punch is the
/// date of the wall-clock value; it is never shifted into another zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceTimestamp {
    local: NaiveDateTime,
    offset: Option<FixedOffset>,
}

impl DeviceTimestamp {
    /// Timestamp without zone information
    pub fn naive(local: NaiveDateTime) -> Self {
        Self { local, offset: None }
    }

    /// Timestamp whose wall clock is `local` at the given offset
    pub fn with_offset(local: NaiveDateTime, offset: FixedOffset) -> Self {
        Self {
            local,
            offset: Some(offset),
        }
    }

    /// Parse RFC 3339 or one of the plain wall-clock layouts
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self::with_offset(parsed.naive_local(), *parsed.offset()));
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(Self::naive)
            .ok_or_else(|| Error::InvalidTimestamp(raw.to_string()))
    }

    pub fn local(&self) -> NaiveDateTime {
        self.local
    }

    pub fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// Calendar day on the device clock
    pub fn date(&self) -> NaiveDate {
        self.local.date()
    }

    /// Elapsed time since `earlier`
    ///
    /// Uses absolute time when both readings carry an offset and the raw
    /// wall-clock difference otherwise. Negative when `earlier` is later.
    pub fn elapsed_since(&self, earlier: &DeviceTimestamp) -> Duration {
        match (self.offset, earlier.offset) {
            (Some(ours), Some(theirs)) => {
                let ours_utc = self.local - Duration::seconds(ours.local_minus_utc().into());
                let theirs_utc = earlier.local - Duration::seconds(theirs.local_minus_utc().into());
                ours_utc - theirs_utc
            }
            _ => self.local - earlier.local,
        }
    }
}

impl fmt::Display for DeviceTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.local.format("%Y-%m-%dT%H:%M:%S"))?;
        match self.offset {
            Some(offset) if offset.local_minus_utc() == 0 => f.write_str("Z"),
            Some(offset) => write!(f, "{}", offset),
            None => Ok(()),
        }
    }
}

/// One physical punch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunchEvent {
    /// Device the punch was recorded on
    pub device_id: String,

    /// User identifier local to the device
    pub device_user_id: String,

    /// Device clock at the time of the punch
    pub timestamp: DeviceTimestamp,

    pub direction: Direction,
}

impl fmt::Display for PunchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Punch[{} {} {} on {}]",
            self.device_user_id, self.direction, self.timestamp, self.device_id
        )
    }
}
