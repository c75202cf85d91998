//! Habit bookkeeping on top of [HabitStorage]: creating habits, marking days done, and
//! aggregating completion logs into months.

use std::{collections::BTreeSet, sync::Arc};

use anyhow::{bail, Result};
use chrono::NaiveDate;
use futures::future::try_join_all;
use tracing::{debug, info, instrument};

use crate::{
    daemon::storage::{
        entities::{
            CompletionLogEntity, HabitEntity, HabitId, LogKey, ReminderTime, Schedule, Settings,
        },
        habit_storage::HabitStorage,
    },
    utils::{
        clock::Clock,
        time::{is_scheduled_today, month_start_end},
    },
};

/// Completion history of one habit over one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthLogs {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub done_dates: BTreeSet<NaiveDate>,
}

impl MonthLogs {
    pub fn is_done(&self, date: NaiveDate) -> bool {
        self.done_dates.contains(&date)
    }
}

pub struct HabitTracker<S> {
    storage: S,
    clock: Arc<dyn Clock>,
}

impl<S: HabitStorage> HabitTracker<S> {
    pub fn new(storage: S, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub async fn create_habit(&self, name: &str, schedule: Schedule) -> Result<HabitEntity> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Habit name can't be empty");
        }
        let habit = HabitEntity {
            id: HabitId::generate(),
            name: name.to_string(),
            created_at: self.clock.time(),
            schedule,
        };
        self.storage.put_habit(habit.clone()).await?;
        info!("Created habit {} ({})", habit.name, habit.id);
        Ok(habit)
    }

    /// All habits, oldest first.
    pub async fn habits(&self) -> Result<Vec<HabitEntity>> {
        let mut habits = self.storage.get_all_habits().await?;
        habits.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(habits)
    }

    /// Looks a habit up by its id, or by its name ignoring case.
    pub async fn find_habit(&self, query: &str) -> Result<Option<HabitEntity>> {
        let query = query.trim();
        let habits = self.habits().await?;
        if let Some(habit) = habits.iter().find(|h| h.id.as_str() == query) {
            return Ok(Some(habit.clone()));
        }
        Ok(habits
            .into_iter()
            .find(|h| h.name.to_lowercase() == query.to_lowercase()))
    }

    pub async fn due_today(&self) -> Result<Vec<HabitEntity>> {
        let now = self.clock.local_time();
        Ok(self
            .habits()
            .await?
            .into_iter()
            .filter(|h| is_scheduled_today(h, now))
            .collect())
    }

    /// Habits due today together with whether they are already done.
    pub async fn today_status(&self) -> Result<Vec<(HabitEntity, bool)>> {
        let today = self.today();
        let habits = self.due_today().await?;
        let done = try_join_all(habits.iter().map(|h| self.is_done(&h.id, today))).await?;
        Ok(habits.into_iter().zip(done).collect())
    }

    pub async fn is_done(&self, habit_id: &HabitId, date: NaiveDate) -> Result<bool> {
        Ok(self.storage.get_log(habit_id, date).await?.is_some())
    }

    /// Marks or un-marks a day. Setting the state a day already has changes nothing.
    #[instrument(skip(self))]
    pub async fn toggle_completion(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
        done: bool,
    ) -> Result<()> {
        if done {
            let log = CompletionLogEntity::done(habit_id.clone(), date, self.clock.time());
            self.storage.put_log(log).await
        } else {
            self.storage
                .delete_log(&LogKey::new(habit_id.clone(), date))
                .await
        }
    }

    /// Flips today's state of a habit and returns the new one. The new state is only returned
    /// once it was written.
    pub async fn toggle_today(&self, habit_id: &HabitId) -> Result<bool> {
        let today = self.today();
        let next = !self.is_done(habit_id, today).await?;
        self.toggle_completion(habit_id, today, next).await?;
        Ok(next)
    }

    pub async fn habit_logs_for_month(
        &self,
        habit_id: &HabitId,
        month: NaiveDate,
    ) -> Result<MonthLogs> {
        let (start, end) = month_start_end(month);
        let logs = self.storage.get_logs_between(habit_id, start, end).await?;
        debug!("Found {} logs for {habit_id} between {start} and {end}", logs.len());
        Ok(MonthLogs {
            start,
            end,
            done_dates: logs
                .into_iter()
                .filter(|log| log.done && log.date >= start && log.date <= end)
                .map(|log| log.date)
                .collect(),
        })
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.storage.get_settings().await
    }

    pub async fn set_reminder_time(&self, reminder_time: ReminderTime) -> Result<Settings> {
        let settings = Settings { reminder_time };
        self.storage.put_settings(settings.clone()).await?;
        info!("Reminder time set to {reminder_time}");
        Ok(settings)
    }
}
