use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};

use crate::daemon::storage::entities::HabitEntity;

use super::clock::Clock;

/// This is the standard way of converting a date to a string in habitrack. Every persisted key
/// uses it, and because the result is fixed width it sorts the same way the dates do.
pub fn date_to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn today_iso(clock: &dyn Clock) -> String {
    date_to_iso(clock.today())
}

/// Day of the week with Sunday as 0 and Saturday as 6.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn is_scheduled_today(habit: &HabitEntity, now: NaiveDateTime) -> bool {
    habit.schedule.is_due_on(now.date())
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).expect("Every month has a first day")
}

/// Returns the first day of the month `delta` months away from the month of `date`. Day of month
/// is always normalized to 1, so moving from January 31st never lands in March. `None` when the
/// result is outside of the dates chrono can represent.
pub fn add_months(date: NaiveDate, delta: i32) -> Option<NaiveDate> {
    let first = first_of_month(date);
    let months = Months::new(delta.unsigned_abs());
    if delta >= 0 {
        first.checked_add_months(months)
    } else {
        first.checked_sub_months(months)
    }
}

/// First and last calendar day of the month containing `date`.
pub fn month_start_end(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = first_of_month(date);
    // Only the last representable month has no next month.
    let end = add_months(date, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX);
    (start, end)
}

pub fn month_start_end_iso(date: NaiveDate) -> (String, String) {
    let (start, end) = month_start_end(date);
    (date_to_iso(start), date_to_iso(end))
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    month_start_end(date).1.day()
}

/// Weekday of the first day of the month, Sunday as 0.
pub fn first_day_of_month(date: NaiveDate) -> u8 {
    day_of_week(first_of_month(date))
}
