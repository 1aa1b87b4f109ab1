//! Send-time computation for one (enrollment, step) pair.
//!
//! All calendar reasoning happens on wall-clock time in the configured
//! scheduling zone; the result is converted back to UTC for storage.

use std::sync::Arc;

use chrono_tz::Tz;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, Time, Weekday};

use super::{calendar::HolidayCalendar, error::DomainError, rules::StepRules, send_time::SendTime};
use crate::util::timezone::{local_wall_clock, resolve_wall_clock};

/// Upper bound on day moves during holiday adjustment.
const MAX_ADJUSTMENT_DAYS: usize = 370;

/// Timing fields of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTiming {
    pub day_offset: i32,
    pub send_time: Option<SendTime>,
    pub delay_minutes: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulePolicy {
    pub zone: Tz,
    /// First local hour considered too late to send.
    pub late_hour: u8,
    /// Delay used for same-day steps with neither delay nor time-of-day.
    pub fallback_delay: Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            zone: Tz::UTC,
            late_hour: 20,
            fallback_delay: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendTimeCalculator {
    calendar: Arc<HolidayCalendar>,
    policy: SchedulePolicy,
}

impl SendTimeCalculator {
    pub fn new(calendar: Arc<HolidayCalendar>, policy: SchedulePolicy) -> Self {
        Self { calendar, policy }
    }

    /// Final UTC send instant for a step, truncated to whole seconds.
    pub fn schedule(
        &self,
        enrolled_at: OffsetDateTime,
        timing: &StepTiming,
        rules: &StepRules,
    ) -> Result<OffsetDateTime, DomainError> {
        let zone = self.policy.zone;
        let enrolled = local_wall_clock(enrolled_at, zone)
            .ok_or_else(|| DomainError::invariant("enrollment instant is out of range"))?;

        let candidate = self.candidate(enrolled, timing)?;
        let adjusted = self.apply_rules(candidate, rules)?;

        let instant = resolve_wall_clock(adjusted, zone)
            .ok_or_else(|| DomainError::invariant("send instant is out of range"))?;
        instant
            .replace_nanosecond(0)
            .map_err(|err| DomainError::invariant(err.to_string()))
    }

    /// Unadjusted send time derived from the step's offset fields.
    pub fn candidate(
        &self,
        enrolled: PrimitiveDateTime,
        timing: &StepTiming,
    ) -> Result<PrimitiveDateTime, DomainError> {
        match timing.day_offset {
            offset if offset < 0 => Err(DomainError::validation(format!(
                "step day offset must not be negative, got {offset}"
            ))),
            0 => {
                if timing.delay_minutes > 0 {
                    return shift(enrolled, Duration::minutes(i64::from(timing.delay_minutes)));
                }
                match timing.send_time {
                    Some(send_time) => {
                        let same_day = enrolled.replace_time(send_time.time());
                        if same_day < enrolled {
                            shift(same_day, Duration::DAY)
                        } else {
                            Ok(same_day)
                        }
                    }
                    None => shift(enrolled, self.policy.fallback_delay),
                }
            }
            offset => {
                let moved = shift(enrolled, Duration::days(i64::from(offset)))?;
                Ok(match timing.send_time {
                    Some(send_time) => moved.replace_time(send_time.time()),
                    None => moved,
                })
            }
        }
    }

    /// Weekend, holiday and late-hour adjustments, in that order.
    pub fn apply_rules(
        &self,
        candidate: PrimitiveDateTime,
        rules: &StepRules,
    ) -> Result<PrimitiveDateTime, DomainError> {
        let mut adjusted = candidate;
        if rules.suppress_weekend {
            adjusted = skip_weekend(adjusted)?;
        }
        if rules.suppress_holiday {
            adjusted = self.skip_holidays(adjusted)?;
        }
        self.defer_late_hour(adjusted)
    }

    fn skip_holidays(&self, start: PrimitiveDateTime) -> Result<PrimitiveDateTime, DomainError> {
        let mut current = start;
        let mut year = current.year();
        let mut holidays = self.calendar.holidays_for(year);

        for _ in 0..MAX_ADJUSTMENT_DAYS {
            if current.year() != year {
                year = current.year();
                holidays = self.calendar.holidays_for(year);
            }

            if holidays.contains(&current.date()) {
                current = shift(current, Duration::DAY)?;
                continue;
            }

            match days_until_monday(current.weekday()) {
                Some(days) => current = shift(current, Duration::days(days))?,
                None => return Ok(current),
            }
        }

        Err(DomainError::invariant(format!(
            "no working day found within {MAX_ADJUSTMENT_DAYS} days of {start}"
        )))
    }

    fn defer_late_hour(&self, at: PrimitiveDateTime) -> Result<PrimitiveDateTime, DomainError> {
        if at.hour() < self.policy.late_hour {
            return Ok(at);
        }
        let next_day = shift(at, Duration::DAY)?;
        let time = Time::from_hms(next_day.hour(), next_day.minute(), 0)
            .map_err(|err| DomainError::invariant(err.to_string()))?;
        Ok(next_day.replace_time(time))
    }
}

fn skip_weekend(at: PrimitiveDateTime) -> Result<PrimitiveDateTime, DomainError> {
    match days_until_monday(at.weekday()) {
        Some(days) => shift(at, Duration::days(days)),
        None => Ok(at),
    }
}

fn days_until_monday(weekday: Weekday) -> Option<i64> {
    match weekday {
        Weekday::Saturday => Some(2),
        Weekday::Sunday => Some(1),
        _ => None,
    }
}

fn shift(at: PrimitiveDateTime, by: Duration) -> Result<PrimitiveDateTime, DomainError> {
    at.checked_add(by)
        .ok_or_else(|| DomainError::invariant(format!("date arithmetic overflow from {at}")))
}
