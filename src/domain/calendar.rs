//! Public holiday calendar used to push sends off non-working days.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use time::{Date, Duration, Month};

/// Easter Sunday for `year` (anonymous Gregorian algorithm).
pub fn easter_sunday(year: i32) -> Option<Date> {
    let a = year.rem_euclid(19);
    let b = year.div_euclid(100);
    let c = year.rem_euclid(100);
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15).rem_euclid(30);
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k).rem_euclid(7);
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
    Date::from_calendar_date(year, month, u8::try_from(day).ok()?).ok()
}

/// Civil and Easter-relative holidays of a single year.
pub fn holidays_in(year: i32) -> Vec<Date> {
    let fixed = [
        (Month::January, 1),
        (Month::May, 1),
        (Month::May, 8),
        (Month::July, 14),
        (Month::August, 15),
        (Month::November, 1),
        (Month::November, 11),
        (Month::December, 25),
    ];

    let mut days: Vec<Date> = fixed
        .into_iter()
        .filter_map(|(month, day)| Date::from_calendar_date(year, month, day).ok())
        .collect();

    if let Some(easter) = easter_sunday(year) {
        for offset in [1, 39, 50] {
            if let Some(day) = easter.checked_add(Duration::days(offset)) {
                days.push(day);
            }
        }
    }

    days.sort();
    days
}

/// Lazily populated holiday cache, keyed by year.
///
/// Each entry holds the holidays of the year and of the following one, so an
/// adjustment that walks over New Year still sees January holidays.
#[derive(Debug, Default)]
pub struct HolidayCalendar {
    cache: Mutex<HashMap<i32, Arc<HashSet<Date>>>>,
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holidays_for(&self, year: i32) -> Arc<HashSet<Date>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(year)
            .or_insert_with(|| {
                let mut set: HashSet<Date> = holidays_in(year).into_iter().collect();
                set.extend(holidays_in(year + 1));
                Arc::new(set)
            })
            .clone()
    }

    pub fn is_holiday(&self, date: Date) -> bool {
        self.holidays_for(date.year()).contains(&date)
    }
}
