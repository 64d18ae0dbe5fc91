use atmos_bench::time_utils::{days_to_date, time_axis, CalendarDate, DAYS_PER_YEAR};

#[test]
fn test_dates_advance_over_several_years() {
    let mut previous = days_to_date(0.0);
    for whole in (7..3 * DAYS_PER_YEAR).step_by(7) {
        for half in [0.0, 0.5] {
            let date = days_to_date(whole as f64 + half);
            assert!(date > previous, "{} after {}", date, previous);
            assert_eq!(date.year, whole / DAYS_PER_YEAR);
            assert_eq!(date.hour, if half == 0.0 { 0 } else { 12 });
            previous = date;
        }
    }
}

#[test]
fn test_month_boundaries() {
    // Day 30 is the first of the second month
    assert_eq!(
        days_to_date(30.0),
        CalendarDate {
            year: 0,
            month: 2,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0
        }
    );
    let end_of_year = days_to_date(359.75);
    assert_eq!((end_of_year.month, end_of_year.day, end_of_year.hour), (12, 30, 18));
    assert_eq!(days_to_date(360.0).year, 1);
}

#[test]
fn test_generated_time_axis() {
    let axis = time_axis(200, 2.0);
    assert_eq!(axis.len(), 200);
    assert_eq!(axis[0], 0.5);
    assert_eq!(axis[199], 100.0);
    assert!(axis.windows(2).all(|w| w[1] - w[0] == 0.5));
    assert_eq!(days_to_date(axis[1]).to_string(), "0000-01-02 00:00:00");
}
