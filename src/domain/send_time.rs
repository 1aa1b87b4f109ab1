//! Optional time-of-day attached to a step.

use std::fmt;

use time::Time;

/// A validated `H:MM` / `HH:MM[:SS]` time-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SendTime(Time);

impl SendTime {
    /// Parse a stored time-of-day. Returns `None` for anything that is not a
    /// well-formed wall-clock time so callers fall back to their default.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split(':');
        let hour = field(parts.next()?, 1..=2)?;
        let minute = field(parts.next()?, 2..=2)?;
        let second = match parts.next() {
            Some(part) => field(part, 2..=2)?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }

        Time::from_hms(hour, minute, second).ok().map(Self)
    }

    pub fn from_time(time: Time) -> Self {
        Self(time)
    }

    pub fn time(self) -> Time {
        self.0
    }
}

fn field(part: &str, width: std::ops::RangeInclusive<usize>) -> Option<u8> {
    if !width.contains(&part.len()) || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for SendTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }
}
