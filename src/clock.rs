use std::sync::Mutex;

use chrono::{
    DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Timezone that decides where a local day starts and ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DayZone {
    Local,
    Fixed(FixedOffset),
}

impl DayZone {
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            DayZone::Local => day_window(now, &Local),
            DayZone::Fixed(offset) => day_window(now, offset),
        }
    }

    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        match self {
            DayZone::Local => now.with_timezone(&Local).date_naive(),
            DayZone::Fixed(offset) => now.with_timezone(offset).date_naive(),
        }
    }
}

/// `[start of local day, start of next local day)` around `now`, in UTC.
/// Both ends are resolved in `tz` separately, so a day that crosses a
/// DST change is 23 or 25 hours long.
pub fn day_window<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.with_timezone(tz).date_naive();
    let tomorrow = today.succ_opt().unwrap_or(NaiveDate::MAX);
    (local_midnight(today, tz), local_midnight(tomorrow, tz))
}

fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match midnight.and_local_timezone(tz.clone()).earliest() {
        Some(start) => start.with_timezone(&Utc),
        // Midnight skipped by a forward jump: the day starts at the jump.
        None => {
            let before = tz
                .offset_from_utc_datetime(&(midnight - Duration::days(1)))
                .fix();
            (midnight - Duration::seconds(i64::from(before.local_minus_utc()))).and_utc()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{MappedLocalTime, NaiveDateTime};

    /// US Eastern around the 2026 fall-back: EDT until 2026-11-01 06:00 UTC,
    /// EST after.
    #[derive(Debug, Clone, Copy)]
    struct Eastern;

    fn edt() -> FixedOffset {
        FixedOffset::west_opt(4 * 3600).unwrap()
    }

    fn est() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    impl TimeZone for Eastern {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            Eastern
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> MappedLocalTime<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> MappedLocalTime<FixedOffset> {
            let valid: Vec<FixedOffset> = [edt(), est()]
                .into_iter()
                .filter(|offset| {
                    let utc = *local - Duration::seconds(i64::from(offset.local_minus_utc()));
                    self.offset_from_utc_datetime(&utc) == *offset
                })
                .collect();
            match valid.as_slice() {
                [] => MappedLocalTime::None,
                [one] => MappedLocalTime::Single(*one),
                [first, second, ..] => MappedLocalTime::Ambiguous(*first, *second),
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            let fall_back = NaiveDate::from_ymd_opt(2026, 11, 1)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap();
            if *utc < fall_back {
                edt()
            } else {
                est()
            }
        }
    }

    #[test]
    fn window_tracks_midnight_across_fall_back() {
        let now = Utc.with_ymd_and_hms(2026, 11, 1, 15, 0, 0).unwrap();
        let (start, end) = day_window(now, &Eastern);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 11, 1, 4, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 11, 2, 5, 0, 0).unwrap());

        let just_after_midnight = Utc.with_ymd_and_hms(2026, 11, 1, 4, 30, 0).unwrap();
        assert!(start <= just_after_midnight && just_after_midnight < end);
        assert_eq!(end - start, Duration::hours(25));
    }

    #[test]
    fn window_for_fixed_zone() {
        let zone = DayZone::Fixed(FixedOffset::west_opt(3 * 3600).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 2, 0, 0).unwrap();
        assert_eq!(zone.window(now), day_window(now, &FixedOffset::west_opt(3 * 3600).unwrap()));
        assert_eq!(zone.local_date(now), NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
    }

    #[test]
    fn window_follows_local_midnight() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 2, 0, 0).unwrap();
        let (start, end) = day_window(now, &offset);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 10, 16, 3, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 10, 17, 3, 0, 0).unwrap());
        assert!(start <= now && now < end);
    }

    #[test]
    fn utc_window_is_calendar_day() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 23, 59, 59).unwrap();
        let (start, end) = day_window(now, &offset);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap());
    }

    #[test]
    fn fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::days(2));
        assert_eq!(clock.now(), start + Duration::days(2));
    }
}
