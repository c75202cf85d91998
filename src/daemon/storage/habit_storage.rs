use std::{
    collections::BTreeMap,
    future::Future,
    ops::Deref,
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{
    fs::operations::{read_document, update_document},
    utils::time::date_to_iso,
};

use super::entities::{
    CompletionLogEntity, HabitEntity, HabitId, LogKey, NotificationPermission,
    NotificationPreference, Settings, SettingsRecord,
};

const GLOBAL_SETTINGS_KEY: &str = "global";
const NOTIFICATION_SETTINGS_KEY: &str = "notifications";

/// Interface for abstracting storage of habits, completion logs and settings. Storage errors are
/// not handled here, they are propagated to whoever asked.
pub trait HabitStorage {
    fn get_all_habits(&self) -> impl Future<Output = Result<Vec<HabitEntity>>> + Send;

    fn put_habit(&self, habit: HabitEntity) -> impl Future<Output = Result<()>> + Send;

    fn get_log(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Option<CompletionLogEntity>>> + Send;

    /// Inserts or replaces the log stored under `log.key`.
    fn put_log(&self, log: CompletionLogEntity) -> impl Future<Output = Result<()>> + Send;

    /// Deleting a log that doesn't exist is not an error.
    fn delete_log(&self, key: &LogKey) -> impl Future<Output = Result<()>> + Send;

    /// Logs of a single habit with `start <= date <= end`, ordered by date.
    fn get_logs_between(
        &self,
        habit_id: &HabitId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<CompletionLogEntity>>> + Send;

    /// Returns default settings if none were saved yet.
    fn get_settings(&self) -> impl Future<Output = Result<Settings>> + Send;

    fn put_settings(&self, settings: Settings) -> impl Future<Output = Result<()>> + Send;

    fn get_permission(&self) -> impl Future<Output = Result<NotificationPermission>> + Send;

    fn put_permission(
        &self,
        permission: NotificationPermission,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<T: Deref> HabitStorage for T
where
    T::Target: HabitStorage,
{
    fn get_all_habits(&self) -> impl Future<Output = Result<Vec<HabitEntity>>> + Send {
        self.deref().get_all_habits()
    }

    fn put_habit(&self, habit: HabitEntity) -> impl Future<Output = Result<()>> + Send {
        self.deref().put_habit(habit)
    }

    fn get_log(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Option<CompletionLogEntity>>> + Send {
        self.deref().get_log(habit_id, date)
    }

    fn put_log(&self, log: CompletionLogEntity) -> impl Future<Output = Result<()>> + Send {
        self.deref().put_log(log)
    }

    fn delete_log(&self, key: &LogKey) -> impl Future<Output = Result<()>> + Send {
        self.deref().delete_log(key)
    }

    fn get_logs_between(
        &self,
        habit_id: &HabitId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<CompletionLogEntity>>> + Send {
        self.deref().get_logs_between(habit_id, start, end)
    }

    fn get_settings(&self) -> impl Future<Output = Result<Settings>> + Send {
        self.deref().get_settings()
    }

    fn put_settings(&self, settings: Settings) -> impl Future<Output = Result<()>> + Send {
        self.deref().put_settings(settings)
    }

    fn get_permission(&self) -> impl Future<Output = Result<NotificationPermission>> + Send {
        self.deref().get_permission()
    }

    fn put_permission(
        &self,
        permission: NotificationPermission,
    ) -> impl Future<Output = Result<()>> + Send {
        self.deref().put_permission(permission)
    }
}

type HabitDocument = BTreeMap<HabitId, HabitEntity>;
/// Logs of one habit keyed by ISO date. ISO dates are fixed width, so key order is date order.
type LogDocument = BTreeMap<String, CompletionLogEntity>;
type SettingsDocument = BTreeMap<String, SettingsRecord>;

/// The main realization of [HabitStorage]. Every collection is a JSON document inside
/// `data_dir`:
///  - `habits.json` holds every habit keyed by id.
///  - `logs/<habit id>.json` holds the logs of one habit keyed by date. Splitting logs per habit
///    means a month lookup only ever reads the logs of the habit it is interested in.
///  - `settings.json` holds keyed settings records.
pub struct JsonHabitStorage {
    data_dir: PathBuf,
}

impl JsonHabitStorage {
    pub fn new(data_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(data_dir.join("logs"))?;

        Ok(Self { data_dir })
    }

    fn habits_path(&self) -> PathBuf {
        self.data_dir.join("habits.json")
    }

    fn logs_path(&self, habit_id: &HabitId) -> PathBuf {
        self.data_dir
            .join("logs")
            .join(format!("{}.json", habit_id.as_str()))
    }

    fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    async fn get_setting<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        let document: SettingsDocument = read_document(&self.settings_path()).await?;
        match document.get(key) {
            Some(record) => Ok(serde_json::from_value(record.value.clone())?),
            None => Ok(T::default()),
        }
    }

    async fn put_setting<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let record = SettingsRecord {
            key: key.to_string(),
            value: serde_json::to_value(value)?,
        };
        update_document(&self.settings_path(), |document: &mut SettingsDocument| {
            document.insert(record.key.clone(), record)
        })
        .await?;
        Ok(())
    }
}

impl HabitStorage for JsonHabitStorage {
    async fn get_all_habits(&self) -> Result<Vec<HabitEntity>> {
        let document: HabitDocument = read_document(&self.habits_path()).await?;
        Ok(document.into_values().collect())
    }

    async fn put_habit(&self, habit: HabitEntity) -> Result<()> {
        debug!("Saving habit {:?}", habit);
        update_document(&self.habits_path(), |document: &mut HabitDocument| {
            document.insert(habit.id.clone(), habit)
        })
        .await?;
        Ok(())
    }

    async fn get_log(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
    ) -> Result<Option<CompletionLogEntity>> {
        let mut document: LogDocument = read_document(&self.logs_path(habit_id)).await?;
        Ok(document.remove(&date_to_iso(date)))
    }

    async fn put_log(&self, log: CompletionLogEntity) -> Result<()> {
        let path = self.logs_path(&log.key.habit_id);
        update_document(&path, |document: &mut LogDocument| {
            document.insert(date_to_iso(log.key.date), log)
        })
        .await?;
        Ok(())
    }

    async fn delete_log(&self, key: &LogKey) -> Result<()> {
        let path = self.logs_path(&key.habit_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        let removed = update_document(&path, |document: &mut LogDocument| {
            document.remove(&date_to_iso(key.date))
        })
        .await?;
        if removed.is_none() {
            debug!("Log {key} was already absent");
        }
        Ok(())
    }

    async fn get_logs_between(
        &self,
        habit_id: &HabitId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompletionLogEntity>> {
        if start > end {
            return Ok(vec![]);
        }
        let document: LogDocument = read_document(&self.logs_path(habit_id)).await?;
        Ok(document
            .range(date_to_iso(start)..=date_to_iso(end))
            .map(|(_, log)| log.clone())
            .collect())
    }

    async fn get_settings(&self) -> Result<Settings> {
        self.get_setting(GLOBAL_SETTINGS_KEY).await
    }

    async fn put_settings(&self, settings: Settings) -> Result<()> {
        self.put_setting(GLOBAL_SETTINGS_KEY, settings).await
    }

    async fn get_permission(&self) -> Result<NotificationPermission> {
        let preference: NotificationPreference =
            self.get_setting(NOTIFICATION_SETTINGS_KEY).await?;
        Ok(preference.permission)
    }

    async fn put_permission(&self, permission: NotificationPermission) -> Result<()> {
        self.put_setting(
            NOTIFICATION_SETTINGS_KEY,
            NotificationPreference { permission },
        )
        .await
    }
}

#[derive(Default)]
struct MemoryState {
    habits: HabitDocument,
    logs: BTreeMap<(HabitId, NaiveDate), CompletionLogEntity>,
    settings: Option<Settings>,
    permission: Option<NotificationPermission>,
}

/// Keeps everything in memory. Used for ephemeral sessions and tests.
#[derive(Default)]
pub struct MemoryHabitStorage {
    state: Mutex<MemoryState>,
}

impl MemoryHabitStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Memory storage was poisoned"))
    }
}

impl HabitStorage for MemoryHabitStorage {
    async fn get_all_habits(&self) -> Result<Vec<HabitEntity>> {
        Ok(self.state()?.habits.values().cloned().collect())
    }

    async fn put_habit(&self, habit: HabitEntity) -> Result<()> {
        self.state()?.habits.insert(habit.id.clone(), habit);
        Ok(())
    }

    async fn get_log(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
    ) -> Result<Option<CompletionLogEntity>> {
        Ok(self.state()?.logs.get(&(habit_id.clone(), date)).cloned())
    }

    async fn put_log(&self, log: CompletionLogEntity) -> Result<()> {
        let key = (log.key.habit_id.clone(), log.key.date);
        self.state()?.logs.insert(key, log);
        Ok(())
    }

    async fn delete_log(&self, key: &LogKey) -> Result<()> {
        self.state()?
            .logs
            .remove(&(key.habit_id.clone(), key.date));
        Ok(())
    }

    async fn get_logs_between(
        &self,
        habit_id: &HabitId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompletionLogEntity>> {
        if start > end {
            return Ok(vec![]);
        }
        Ok(self
            .state()?
            .logs
            .range((habit_id.clone(), start)..=(habit_id.clone(), end))
            .map(|(_, log)| log.clone())
            .collect())
    }

    async fn get_settings(&self) -> Result<Settings> {
        Ok(self.state()?.settings.clone().unwrap_or_default())
    }

    async fn put_settings(&self, settings: Settings) -> Result<()> {
        self.state()?.settings = Some(settings);
        Ok(())
    }

    async fn get_permission(&self) -> Result<NotificationPermission> {
        Ok(self.state()?.permission.unwrap_or_default())
    }

    async fn put_permission(&self, permission: NotificationPermission) -> Result<()> {
        self.state()?.permission = Some(permission);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{DateTime, NaiveDate, Utc};
    use tempfile::tempdir;

    use crate::daemon::storage::{
        entities::{
            CompletionLogEntity, HabitEntity, HabitId, LogKey, NotificationPermission, Schedule,
            Settings,
        },
        habit_storage::{HabitStorage, JsonHabitStorage, MemoryHabitStorage},
    };

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap()
    }

    fn habit(name: &str) -> HabitEntity {
        HabitEntity {
            id: HabitId::generate(),
            name: name.into(),
            created_at: ts(0),
            schedule: Schedule::Daily,
        }
    }

    async fn check_logs(storage: impl HabitStorage) -> Result<()> {
        let read = habit("Read");
        let gym = habit("Gym");

        storage
            .put_log(CompletionLogEntity::done(read.id.clone(), date(4), ts(1)))
            .await?;
        storage
            .put_log(CompletionLogEntity::done(read.id.clone(), date(4), ts(2)))
            .await?;
        storage
            .put_log(CompletionLogEntity::done(read.id.clone(), date(9), ts(3)))
            .await?;
        storage
            .put_log(CompletionLogEntity::done(gym.id.clone(), date(5), ts(4)))
            .await?;

        let logs = storage.get_logs_between(&read.id, date(1), date(31)).await?;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].date, date(4));
        assert_eq!(logs[0].ts, ts(2));
        assert_eq!(logs[1].date, date(9));

        let logs = storage.get_logs_between(&read.id, date(5), date(9)).await?;
        assert_eq!(logs.iter().map(|l| l.date).collect::<Vec<_>>(), vec![date(9)]);

        assert!(storage.get_log(&gym.id, date(5)).await?.is_some());
        assert!(storage.get_log(&gym.id, date(4)).await?.is_none());

        storage.delete_log(&LogKey::new(read.id.clone(), date(4))).await?;
        storage.delete_log(&LogKey::new(read.id.clone(), date(4))).await?;
        storage
            .delete_log(&LogKey::new(HabitId::generate(), date(4)))
            .await?;
        assert!(storage.get_log(&read.id, date(4)).await?.is_none());
        assert_eq!(
            storage.get_logs_between(&read.id, date(1), date(31)).await?.len(),
            1
        );
        Ok(())
    }

    async fn check_settings(storage: impl HabitStorage) -> Result<()> {
        assert_eq!(storage.get_settings().await?, Settings::default());
        assert_eq!(
            storage.get_permission().await?,
            NotificationPermission::Default
        );

        let settings = Settings {
            reminder_time: "18:45".parse()?,
        };
        storage.put_settings(settings.clone()).await?;
        storage.put_permission(NotificationPermission::Denied).await?;

        assert_eq!(storage.get_settings().await?, settings);
        assert_eq!(
            storage.get_permission().await?,
            NotificationPermission::Denied
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_json_storage_logs() -> Result<()> {
        let dir = tempdir()?;
        check_logs(JsonHabitStorage::new(dir.path().to_owned())?).await
    }

    #[tokio::test]
    async fn test_memory_storage_logs() -> Result<()> {
        check_logs(MemoryHabitStorage::new()).await
    }

    #[tokio::test]
    async fn test_json_storage_settings() -> Result<()> {
        let dir = tempdir()?;
        check_settings(JsonHabitStorage::new(dir.path().to_owned())?).await
    }

    #[tokio::test]
    async fn test_memory_storage_settings() -> Result<()> {
        check_settings(MemoryHabitStorage::new()).await
    }

    #[tokio::test]
    async fn test_json_storage_survives_reopening() -> Result<()> {
        let dir = tempdir()?;
        let read = habit("Read");
        {
            let storage = JsonHabitStorage::new(dir.path().to_owned())?;
            storage.put_habit(read.clone()).await?;
            storage.put_habit(habit("Gym")).await?;
            storage
                .put_log(CompletionLogEntity::done(read.id.clone(), date(1), ts(5)))
                .await?;
        }

        let storage = JsonHabitStorage::new(dir.path().to_owned())?;
        let habits = storage.get_all_habits().await?;
        assert_eq!(habits.len(), 2);
        assert!(habits.contains(&read));
        assert_eq!(
            storage.get_log(&read.id, date(1)).await?,
            Some(CompletionLogEntity::done(read.id.clone(), date(1), ts(5)))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_json_storage_record_layout() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonHabitStorage::new(dir.path().to_owned())?;
        let id: HabitId = "habit-1".parse()?;
        storage
            .put_log(CompletionLogEntity::done(id.clone(), date(2), ts(7)))
            .await?;

        let raw = tokio::fs::read_to_string(dir.path().join("logs").join("habit-1.json")).await?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(value["2024-03-02"]["key"], "habit-1:2024-03-02");
        assert_eq!(value["2024-03-02"]["habitId"], "habit-1");
        assert_eq!(value["2024-03-02"]["done"], true);

        storage.put_settings(Settings::default()).await?;
        let raw = tokio::fs::read_to_string(dir.path().join("settings.json")).await?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(value["global"]["key"], "global");
        assert_eq!(value["global"]["value"]["reminderTime"], "09:00");
        Ok(())
    }

    #[tokio::test]
    async fn test_broken_schedule_does_not_hide_other_habits() -> Result<()> {
        let dir = tempdir()?;
        let raw = serde_json::json!({
            "good": {
                "id": "good", "name": "Read", "createdAt": 1, "schedule": { "type": "daily" }
            },
            "bad": { "id": "bad", "name": "Gym", "createdAt": 2, "schedule": {} },
        });
        tokio::fs::write(dir.path().join("habits.json"), raw.to_string()).await?;

        let storage = JsonHabitStorage::new(dir.path().to_owned())?;
        let mut habits = storage.get_all_habits().await?;
        habits.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        assert_eq!(
            habits
                .iter()
                .map(|h| (h.name.as_str(), h.schedule.clone()))
                .collect::<Vec<_>>(),
            vec![("Read", Schedule::Daily), ("Gym", Schedule::Unrecognized)]
        );
        assert!(habits[1].schedule.is_due_on(date(6)));
        Ok(())
    }
}
