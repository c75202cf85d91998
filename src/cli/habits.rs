use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::ValueEnum;

use crate::{
    daemon::storage::{
        entities::{HabitEntity, ReminderTime, Schedule},
        habit_storage::HabitStorage,
    },
    notification::NotificationBridge,
    tracker::HabitTracker,
    utils::time::date_to_iso,
};

const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Parses a weekday for `--days`: a number with Sunday as 0, or an English name or prefix of at
/// least three letters.
pub fn parse_weekday(value: &str) -> Result<u8, String> {
    let value = value.trim().to_lowercase();
    if let Ok(day) = value.parse::<u8>() {
        return if day < 7 {
            Ok(day)
        } else {
            Err(format!("Weekday number must be between 0 and 6, got {day}"))
        };
    }
    WEEKDAY_NAMES
        .iter()
        .position(|name| value.len() >= 3 && value.starts_with(name))
        .map(|day| day as u8)
        .ok_or_else(|| format!("Unknown weekday {value:?}"))
}

pub fn schedule_from_days(days: Vec<u8>) -> Schedule {
    if days.is_empty() {
        Schedule::Daily
    } else {
        Schedule::Weekly {
            days: BTreeSet::from_iter(days),
        }
    }
}

async fn resolve_habit<S: HabitStorage>(
    tracker: &HabitTracker<S>,
    query: &str,
) -> Result<HabitEntity> {
    tracker
        .find_habit(query)
        .await?
        .ok_or_else(|| anyhow!("No habit matches {query:?}. See `habitrack list`"))
}

pub async fn add_habit<S: HabitStorage>(
    tracker: &HabitTracker<S>,
    name: &str,
    days: Vec<u8>,
) -> Result<()> {
    let habit = tracker.create_habit(name, schedule_from_days(days)).await?;
    println!("Added {} ({})", habit.name, habit.schedule);
    Ok(())
}

pub fn format_habit_line(habit: &HabitEntity) -> String {
    format!("{}\t{}\t{}", habit.id, habit.name, habit.schedule)
}

pub async fn list_habits<S: HabitStorage>(tracker: &HabitTracker<S>) -> Result<()> {
    let habits = tracker.habits().await?;
    if habits.is_empty() {
        println!("No habits yet. Add one with `habitrack add <name>`");
    }
    for habit in habits {
        println!("{}", format_habit_line(&habit));
    }
    Ok(())
}

pub fn format_today_line(habit: &HabitEntity, done: bool) -> String {
    format!("[{}] {}", if done { "x" } else { " " }, habit.name)
}

pub async fn show_today<S: HabitStorage>(tracker: &HabitTracker<S>) -> Result<()> {
    let status = tracker.today_status().await?;
    println!("Today ({})", date_to_iso(tracker.today()));
    if status.is_empty() {
        println!("Nothing is due today");
    }
    for (habit, done) in status {
        println!("{}", format_today_line(&habit, done));
    }
    Ok(())
}

/// Marks or un-marks `query` on `date`, today by default.
pub async fn set_done<S: HabitStorage>(
    tracker: &HabitTracker<S>,
    query: &str,
    date: Option<NaiveDate>,
    done: bool,
) -> Result<()> {
    let habit = resolve_habit(tracker, query).await?;
    let date = date.unwrap_or_else(|| tracker.today());
    tracker.toggle_completion(&habit.id, date, done).await?;
    let state = if done { "done" } else { "not done" };
    println!("{} is {state} on {}", habit.name, date_to_iso(date));
    Ok(())
}

pub async fn toggle_today<S: HabitStorage>(tracker: &HabitTracker<S>, query: &str) -> Result<()> {
    let habit = resolve_habit(tracker, query).await?;
    let done = tracker.toggle_today(&habit.id).await?;
    println!("{}", format_today_line(&habit, done));
    Ok(())
}

pub async fn remind<S: HabitStorage>(
    tracker: &HabitTracker<S>,
    time: Option<ReminderTime>,
) -> Result<()> {
    let settings = match time {
        Some(time) => tracker.set_reminder_time(time).await?,
        None => tracker.settings().await?,
    };
    println!("Daily reminder at {}", settings.reminder_time);
    Ok(())
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum NotificationsAction {
    Enable,
    Disable,
    Status,
}

pub async fn notifications<S: HabitStorage>(
    bridge: &NotificationBridge<S>,
    action: NotificationsAction,
) -> Result<()> {
    let status = match action {
        NotificationsAction::Enable => bridge.request_permission().await?,
        NotificationsAction::Disable => bridge.revoke_permission().await?,
        NotificationsAction::Status => bridge.permission_status().await?,
    };
    println!("{status}");
    Ok(())
}
