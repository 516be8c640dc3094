//! Working-window and grid arithmetic for the slot search

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

/// Search policy: grid, working hours, working days, horizon
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPolicy {
    /// Candidate starts are multiples of this many minutes from midnight
    pub grid_minutes: u32,
    /// Workday open (grid aligned)
    pub day_open: NaiveTime,
    /// Workday close; jobs and their post-job buffer must end by then
    pub day_close: NaiveTime,
    pub working_days: Vec<Weekday>,
    /// How far past `not_before` the search may look
    pub horizon_days: u32,
    /// Hard cap on jump iterations per crew
    pub max_iterations: usize,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            grid_minutes: 15,
            day_open: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            day_close: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            working_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
            ],
            horizon_days: 14,
            max_iterations: 4096,
        }
    }
}

impl SearchPolicy {
    pub fn horizon(&self) -> Duration {
        Duration::days(i64::from(self.horizon_days))
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_days.contains(&date.weekday())
    }

    pub fn open_at(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.day_open)
    }

    pub fn close_at(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.day_close)
    }

    /// Round up to the next grid boundary (identity when already aligned)
    pub fn ceil_to_grid(&self, t: NaiveDateTime) -> NaiveDateTime {
        let step = i64::from(self.grid_minutes.max(1)) * 60;
        let midnight = t.date().and_time(NaiveTime::MIN);
        let elapsed = i64::from(t.time().num_seconds_from_midnight());

        if elapsed % step == 0 && t.nanosecond() == 0 {
            return t;
        }
        midnight + Duration::seconds((elapsed / step + 1) * step)
    }

    /// Earliest grid-aligned instant at or after `t` inside a working window
    pub fn align(&self, t: NaiveDateTime) -> NaiveDateTime {
        let mut candidate = self.ceil_to_grid(t);

        // a working day is at most a week away
        for _ in 0..8 {
            let date = candidate.date();
            if self.is_working_day(date) {
                let open = self.open_at(date);
                if candidate < open {
                    return open;
                }
                if candidate < self.close_at(date) {
                    return candidate;
                }
            }
            candidate = next_midnight(date);
        }
        candidate
    }

    /// Open of the first working day strictly after `date`
    pub fn next_working_open(&self, date: NaiveDate) -> NaiveDateTime {
        self.align(next_midnight(date))
    }
}

fn next_midnight(date: NaiveDate) -> NaiveDateTime {
    date.succ_opt().unwrap_or(date).and_time(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-13 is a Saturday, 2024-01-14 a Sunday
    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_ceil_to_grid() {
        let policy = SearchPolicy::default();
        assert_eq!(policy.ceil_to_grid(at(16, 9, 0)), at(16, 9, 0));
        assert_eq!(policy.ceil_to_grid(at(16, 9, 1)), at(16, 9, 15));
        assert_eq!(policy.ceil_to_grid(at(16, 9, 14)), at(16, 9, 15));
        assert_eq!(policy.ceil_to_grid(at(16, 23, 50)), at(17, 0, 0));

        let half_second = at(16, 9, 0) + Duration::milliseconds(500);
        assert_eq!(policy.ceil_to_grid(half_second), at(16, 9, 15));
    }

    #[test]
    fn test_align_inside_window() {
        let policy = SearchPolicy::default();
        assert_eq!(policy.align(at(16, 6, 30)), at(16, 8, 0));
        assert_eq!(policy.align(at(16, 12, 5)), at(16, 12, 15));
    }

    #[test]
    fn test_align_after_close_rolls_to_next_day() {
        let policy = SearchPolicy::default();
        assert_eq!(policy.align(at(16, 18, 0)), at(17, 8, 0));
        assert_eq!(policy.align(at(16, 17, 50)), at(17, 8, 0));
    }

    #[test]
    fn test_align_skips_sunday() {
        let policy = SearchPolicy::default();
        assert_eq!(policy.align(at(13, 19, 0)), at(15, 8, 0));
        assert_eq!(policy.align(at(14, 10, 0)), at(15, 8, 0));
        assert_eq!(policy.next_working_open(NaiveDate::from_ymd_opt(2024, 1, 13).unwrap()), at(15, 8, 0));
    }

    #[test]
    fn test_custom_grid_and_days() {
        let policy = SearchPolicy {
            grid_minutes: 30,
            working_days: vec![Weekday::Wed],
            ..SearchPolicy::default()
        };
        assert_eq!(policy.align(at(16, 9, 10)), at(17, 8, 0));
        assert_eq!(policy.align(at(17, 9, 10)), at(17, 9, 30));
    }
}
