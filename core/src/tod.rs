//! Time-of-day value: a non-negative wall-clock offset from local midnight,
//! stored as integer ticks (10_000 ticks/second, i.e. 0.1 ms resolution) so
//! split arithmetic never drifts under repeated addition/subtraction.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub const TICKS_PER_SECOND: i64 = 10_000;

/// A wall-clock offset from local midnight, in tenths-of-a-millisecond ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tod(i64);

/// Signed delta between two [`Tod`] values, also in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TodDelta(pub i64);

impl TodDelta {
    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    pub fn from_seconds(s: f64) -> Self {
        TodDelta((s * TICKS_PER_SECOND as f64).round() as i64)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Tod {
    pub const ZERO: Tod = Tod(0);

    pub fn from_ticks(ticks: i64) -> Self {
        Tod(ticks.max(0))
    }

    pub fn ticks(&self) -> i64 {
        self.0
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    /// `self - other`, as a signed delta (may be negative).
    pub fn delta(&self, other: Tod) -> TodDelta {
        TodDelta(self.0 - other.0)
    }

    pub fn checked_add(&self, delta: TodDelta) -> Option<Tod> {
        let v = self.0 + delta.0;
        if v < 0 {
            None
        } else {
            Some(Tod(v))
        }
    }

    /// Parses `HH:MM:SS.fff`, `M:SS.fff`, bare seconds, or the sentinels
    /// `now` and `0`. Fields fill from the least-significant end: `1:23.4`
    /// is interpreted as `0h 1m 23.4s`.
    pub fn parse(input: &str) -> Option<Tod> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("now") {
            return Some(Tod::now());
        }
        if input == "0" {
            return Some(Tod::ZERO);
        }

        let (int_part, frac_part) = match input.split_once('.') {
            Some((i, f)) => (i, f),
            None => (input, ""),
        };

        // Fractional digits taken verbatim up to 4, zero-padded beyond.
        let mut frac_digits: String = frac_part.chars().filter(|c| c.is_ascii_digit()).take(4).collect();
        while frac_digits.len() < 4 {
            frac_digits.push('0');
        }
        let frac_ticks: i64 = frac_digits.parse().ok()?;

        let fields: Vec<&str> = int_part.split(':').collect();
        if fields.is_empty() || fields.len() > 3 {
            return None;
        }
        // Fill from the least significant end: seconds, minutes, hours.
        let mut rev = fields.iter().rev();
        let secs: i64 = rev.next()?.parse().ok()?;
        let mins: i64 = match rev.next() {
            Some(s) => s.parse().ok()?,
            None => 0,
        };
        let hours: i64 = match rev.next() {
            Some(s) => s.parse().ok()?,
            None => 0,
        };
        if secs < 0 || mins < 0 || hours < 0 {
            return None;
        }

        let total_ticks = ((hours * 3600 + mins * 60 + secs) * TICKS_PER_SECOND) + frac_ticks;
        Some(Tod(total_ticks))
    }

    /// Current local time of day, resolved from host wall time.
    pub fn now() -> Tod {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let secs_since_epoch = now.as_secs() as i64;
        let secs_today = secs_since_epoch.rem_euclid(86_400);
        let sub_ticks = (now.subsec_nanos() as i64) / 100_000; // ns -> 0.1ms ticks
        Tod(secs_today * TICKS_PER_SECOND + sub_ticks)
    }

    /// Formats at 10 ms precision (two fractional digits), truncating
    /// toward zero. Suppresses a leading `0:` hour component when the
    /// elapsed magnitude fits in minutes:seconds.
    pub fn format_dc(&self) -> String {
        self.format_with_frac_digits(2)
    }

    /// Formats at 1 ms precision (three fractional digits).
    pub fn format_dcm(&self) -> String {
        self.format_with_frac_digits(3)
    }

    fn format_with_frac_digits(&self, frac_digits: usize) -> String {
        let ticks = self.0;
        let total_secs = ticks / TICKS_PER_SECOND;
        let rem_ticks = ticks % TICKS_PER_SECOND; // 0..9999, 4 digits available
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        let secs = total_secs % 60;

        // Truncate the 4-digit tick remainder down to `frac_digits` digits.
        let divisor = 10i64.pow((4 - frac_digits) as u32);
        let frac = rem_ticks / divisor;

        if hours > 0 {
            format!("{hours}:{mins:02}:{secs:02}.{frac:0width$}", width = frac_digits)
        } else if mins > 0 {
            format!("{mins}:{secs:02}.{frac:0width$}", width = frac_digits)
        } else {
            format!("{secs}.{frac:0width$}", width = frac_digits)
        }
    }
}

impl fmt::Display for Tod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_dcm())
    }
}

impl TryFrom<String> for Tod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Tod::parse(&value).ok_or_else(|| format!("invalid Tod: {value}"))
    }
}

impl From<Tod> for String {
    fn from(tod: Tod) -> Self {
        tod.format_dcm()
    }
}
