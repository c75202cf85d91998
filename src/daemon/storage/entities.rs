use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use crate::utils::time::{date_to_iso, day_of_week};

/// Opaque identifier of a habit. Ids end up in file names, so only ascii alphanumerics, `-` and
/// `_` are accepted.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HabitId(String);

impl HabitId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for HabitId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            bail!("Habit id can't be empty");
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!("Habit id {s:?} contains illegal characters");
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for HabitId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HabitId> for String {
    fn from(value: HabitId) -> Self {
        value.0
    }
}

impl Display for HabitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rule that decides on which days a habit is due.
#[derive(PartialEq, Eq, Debug, Serialize, Clone, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schedule {
    #[default]
    Daily,
    /// Weekday numbers, Sunday is 0 and Saturday is 6.
    Weekly { days: BTreeSet<u8> },
    /// Any shape this version can't read, `null` included. Such habits are treated as due every
    /// day.
    Unrecognized,
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(tag = "type", rename_all = "lowercase")]
        enum KnownSchedule {
            Daily,
            Weekly { days: BTreeSet<u8> },
        }

        // Never fails, anything that isn't a known schedule becomes `Unrecognized`.
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match KnownSchedule::deserialize(value) {
            Ok(KnownSchedule::Daily) => Schedule::Daily,
            Ok(KnownSchedule::Weekly { days }) => Schedule::Weekly { days },
            Err(_) => Schedule::Unrecognized,
        })
    }
}

impl Schedule {
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        match self {
            Schedule::Daily => true,
            Schedule::Weekly { days } => days.contains(&day_of_week(date)),
            Schedule::Unrecognized => true,
        }
    }
}

impl Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
        match self {
            Schedule::Daily => write!(f, "daily"),
            Schedule::Weekly { days } => {
                let names = days
                    .iter()
                    .filter_map(|d| NAMES.get(*d as usize).copied())
                    .collect::<Vec<_>>();
                write!(f, "weekly ({})", names.join(", "))
            }
            Schedule::Unrecognized => write!(f, "unknown"),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HabitEntity {
    pub id: HabitId,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub schedule: Schedule,
}

/// Identifies a completion log. Serialized as `<habitId>:<isoDate>`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub struct LogKey {
    pub habit_id: HabitId,
    pub date: NaiveDate,
}

impl LogKey {
    pub fn new(habit_id: HabitId, date: NaiveDate) -> Self {
        Self { habit_id, date }
    }
}

impl Display for LogKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.habit_id, date_to_iso(self.date))
    }
}

impl FromStr for LogKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (habit_id, date) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("Log key {s:?} is missing a date"))?;
        Ok(Self {
            habit_id: habit_id.parse()?,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d")?,
        })
    }
}

impl Serialize for LogKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LogKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Marks a habit as done on a date. Only done days are stored; un-marking deletes the record, so
/// `done` is always true.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CompletionLogEntity {
    pub key: LogKey,
    pub habit_id: HabitId,
    pub date: NaiveDate,
    pub done: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ts: DateTime<Utc>,
}

impl CompletionLogEntity {
    pub fn done(habit_id: HabitId, date: NaiveDate, ts: DateTime<Utc>) -> Self {
        Self {
            key: LogKey::new(habit_id.clone(), date),
            habit_id,
            date,
            done: true,
            ts,
        }
    }
}

/// Wall clock time of the daily reminder, `HH:MM` in 24h format.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReminderTime(#[serde(with = "reminder_time_ser")] NaiveTime);

impl ReminderTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl Default for ReminderTime {
    fn default() -> Self {
        Self(NaiveTime::from_hms_opt(9, 0, 0).expect("09:00 is a valid time"))
    }
}

impl FromStr for ReminderTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| anyhow!("Reminder time {s:?} should look like HH:MM"))?;
        let hour = hour.parse::<u32>()?;
        let minute = minute.parse::<u32>()?;
        ReminderTime::new(hour, minute).ok_or_else(|| anyhow!("{s:?} is not a valid time of day"))
    }
}

impl Display for ReminderTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

mod reminder_time_ser {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    use super::ReminderTime;

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&ReminderTime(*time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let time = s
            .parse::<ReminderTime>()
            .map_err(serde::de::Error::custom)?;
        Ok(time.0)
    }
}

/// Global user settings.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub reminder_time: ReminderTime,
}

/// What the user decided about notifications. Mirrors the permission model of notification
/// services: nothing asked yet, allowed, refused.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    #[default]
    Default,
    Granted,
    Denied,
}

impl Display for NotificationPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationPermission::Default => write!(f, "default"),
            NotificationPermission::Granted => write!(f, "granted"),
            NotificationPermission::Denied => write!(f, "denied"),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
pub struct NotificationPreference {
    pub permission: NotificationPermission,
}

/// Keyed record of the settings collection.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct SettingsRecord {
    pub key: String,
    pub value: serde_json::Value,
}
