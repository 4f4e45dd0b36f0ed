//! Fixed-point hour quantities

use std::fmt;
use std::ops::{Add, Sub};

use chrono::Duration;
use serde::{Deserialize, Serialize};

const MILLIS_PER_HUNDREDTH: i64 = 36_000;

/// Hours with 2-digit decimal precision
///
/// Stored as signed hundredths of an hour so that `9.50` is exactly `950`.
/// Negative values are representable; they only arise from a punch-out
/// that precedes its punch-in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Hours(i64);

impl Hours {
    pub const ZERO: Hours = Hours(0);

    pub const fn from_hundredths(hundredths: i64) -> Self {
        Hours(hundredths)
    }

    pub const fn from_whole(hours: i64) -> Self {
        Hours(hours * 100)
    }

    /// Convert an elapsed duration, rounding half away from zero
    pub fn from_duration(elapsed: Duration) -> Self {
        let millis = elapsed.num_milliseconds();
        let quotient = millis / MILLIS_PER_HUNDREDTH;
        let remainder = millis % MILLIS_PER_HUNDREDTH;

        if remainder.abs() * 2 >= MILLIS_PER_HUNDREDTH {
            Hours(quotient + millis.signum())
        } else {
            Hours(quotient)
        }
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Hours {
    type Output = Hours;

    fn add(self, rhs: Hours) -> Hours {
        Hours(self.0 + rhs.0)
    }
}

impl Sub for Hours {
    type Output = Hours;

    fn sub(self, rhs: Hours) -> Hours {
        Hours(self.0 - rhs.0)
    }
}

impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
