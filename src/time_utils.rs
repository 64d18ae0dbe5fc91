use std::fmt;

/// Calendar attribute written on every time axis
pub const CALENDAR: &str = "360_day";

/// Units attribute written on every time axis
pub const TIME_UNITS: &str = "days since 00-01-01 00:00:00";

pub const DAYS_PER_MONTH: i64 = 30;
pub const MONTHS_PER_YEAR: i64 = 12;
pub const DAYS_PER_YEAR: i64 = DAYS_PER_MONTH * MONTHS_PER_YEAR;

/// Date on the 360-day calendar (twelve 30-day months)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CalendarDate {
    pub year: i64,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Convert a time value in days since the reference date to a calendar date
pub fn days_to_date(days: f64) -> CalendarDate {
    let whole = days.floor() as i64;
    let frac = days - whole as f64;

    let year = whole.div_euclid(DAYS_PER_YEAR);
    let day_of_year = whole.rem_euclid(DAYS_PER_YEAR);
    let month = day_of_year / DAYS_PER_MONTH + 1;
    let day = day_of_year % DAYS_PER_MONTH + 1;

    // Rounding can land exactly on the next day
    let total_seconds = ((frac * 86400.0).round() as u32).min(86399);
    CalendarDate {
        year,
        month: month as u8,
        day: day as u8,
        hour: (total_seconds / 3600) as u8,
        minute: ((total_seconds % 3600) / 60) as u8,
        second: (total_seconds % 60) as u8,
    }
}

/// Evenly spaced time axis: `k / divisor` days for `k = 1..=ntime`.
///
/// The first value lies one step after the reference date and the last at
/// `ntime / divisor`, so `ntime` steps give exactly `ntime` values at a
/// uniform `1 / divisor` day spacing. Step index `i` maps to
/// `(i + 1) / divisor` days, which keeps every time block's values a pure
/// function of its offset.
pub fn time_axis(ntime: usize, divisor: f64) -> Vec<f64> {
    (1..=ntime).map(|k| k as f64 / divisor).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_date() {
        let date = days_to_date(0.0);
        assert_eq!(date.to_string(), "0000-01-01 00:00:00");
    }

    #[test]
    fn test_half_day_steps() {
        let date = days_to_date(0.5);
        assert_eq!((date.day, date.hour), (1, 12));

        let date = days_to_date(45.0);
        assert_eq!((date.month, date.day), (2, 16));
    }
}
