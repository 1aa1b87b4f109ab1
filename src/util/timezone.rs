use chrono::{NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Wall-clock reading of `instant` in `tz`.
pub fn local_wall_clock(instant: OffsetDateTime, tz: Tz) -> Option<PrimitiveDateTime> {
    let utc = instant.to_offset(UtcOffset::UTC);
    let naive =
        chrono::DateTime::<chrono::Utc>::from_timestamp(utc.unix_timestamp(), utc.nanosecond())?
            .naive_utc();
    let offset_seconds = tz.offset_from_utc_datetime(&naive).fix().local_minus_utc();
    let local = utc.to_offset(UtcOffset::from_whole_seconds(offset_seconds).ok()?);
    Some(PrimitiveDateTime::new(local.date(), local.time()))
}

/// Resolve a wall-clock time in `tz` back to an instant.
///
/// Ambiguous readings (clocks going back) resolve to the earlier instant.
/// Readings inside a gap (clocks going forward) move forward by one hour.
pub fn resolve_wall_clock(local: PrimitiveDateTime, tz: Tz) -> Option<OffsetDateTime> {
    if let Some(offset) = offset_at(local, tz) {
        return Some(local.assume_offset(offset).to_offset(UtcOffset::UTC));
    }

    let shifted = local.checked_add(Duration::HOUR)?;
    let offset = offset_at(shifted, tz)?;
    Some(shifted.assume_offset(offset).to_offset(UtcOffset::UTC))
}

fn offset_at(local: PrimitiveDateTime, tz: Tz) -> Option<UtcOffset> {
    let naive = NaiveDate::from_ymd_opt(
        local.year(),
        u32::from(u8::from(local.month())),
        u32::from(local.day()),
    )?
    .and_hms_nano_opt(
        u32::from(local.hour()),
        u32::from(local.minute()),
        u32::from(local.second()),
        local.nanosecond(),
    )?;

    let resolved = tz.from_local_datetime(&naive).earliest()?;
    UtcOffset::from_whole_seconds(resolved.offset().fix().local_minus_utc()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn utc_is_identity() {
        let instant = datetime!(2024-06-10 12:00 UTC);
        let local = local_wall_clock(instant, Tz::UTC).expect("local");
        assert_eq!(local, datetime!(2024-06-10 12:00));
        assert_eq!(resolve_wall_clock(local, Tz::UTC), Some(instant));
    }

    #[test]
    fn paris_summer_offset() {
        let instant = datetime!(2024-06-10 18:30 UTC);
        let local = local_wall_clock(instant, Tz::Europe__Paris).expect("local");
        assert_eq!(local, datetime!(2024-06-10 20:30));
        assert_eq!(resolve_wall_clock(local, Tz::Europe__Paris), Some(instant));
    }

    #[test]
    fn gap_moves_forward() {
        let resolved =
            resolve_wall_clock(datetime!(2024-03-31 02:30), Tz::Europe__Paris).expect("resolved");
        assert_eq!(resolved, datetime!(2024-03-31 01:30 UTC));
    }
}
