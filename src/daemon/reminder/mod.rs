//! Daily reminders. [ReminderScheduler] owns the timers, [watcher::SettingsWatcher] keeps it in
//! line with the stored reminder time.

pub mod watcher;

use std::{sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{
    daemon::storage::{entities::ReminderTime, habit_storage::HabitStorage},
    notification::NotificationDisplay,
    tracker::HabitTracker,
    utils::clock::Clock,
};

/// Period between reminders once the first one was aligned to the wall clock. Fixed, so it drifts
/// by an hour across daylight saving changes.
pub const REMINDER_PERIOD: Duration = Duration::from_secs(60 * 60 * 24);

/// Time until the next occurrence of `time` strictly after `now`. If today's occurrence is now or
/// already passed, tomorrow's is used.
pub fn ms_until_next(time: ReminderTime, now: NaiveDateTime) -> Duration {
    let mut next = now.date().and_time(time.time());
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(REMINDER_PERIOD)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    Idle,
    Armed(ReminderTime),
}

struct ArmedReminder {
    time: ReminderTime,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Fires a notification for every habit due today at the configured time, then every
/// [REMINDER_PERIOD]. Timers live as long as the scheduler; dropping it cancels them.
pub struct ReminderScheduler<S> {
    tracker: Arc<HabitTracker<S>>,
    notifier: Arc<dyn NotificationDisplay>,
    clock: Arc<dyn Clock>,
    armed: Option<ArmedReminder>,
}

impl<S> ReminderScheduler<S>
where
    S: HabitStorage + Send + Sync + 'static,
{
    pub fn new(
        tracker: Arc<HabitTracker<S>>,
        notifier: Arc<dyn NotificationDisplay>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            notifier,
            clock,
            armed: None,
        }
    }

    pub fn state(&self) -> ReminderState {
        match &self.armed {
            Some(armed) => ReminderState::Armed(armed.time),
            None => ReminderState::Idle,
        }
    }

    /// Cancels whatever is pending and arms a reminder for `time`.
    pub fn reconfigure(&mut self, time: ReminderTime) {
        self.stop();

        let delay = ms_until_next(time, self.clock.local_time());
        info!("Next reminder at {time}, in {}s", delay.as_secs());

        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            run_reminders(
                self.tracker.clone(),
                self.notifier.clone(),
                self.clock.clone(),
                delay,
                cancel.clone(),
            )
            .instrument(info_span!("reminder", %time)),
        );
        self.armed = Some(ArmedReminder { time, cancel, task });
    }

    /// Cancels both the pending first reminder and the recurring ones.
    pub fn stop(&mut self) {
        if let Some(armed) = self.armed.take() {
            debug!("Cancelling reminder at {}", armed.time);
            armed.cancel.cancel();
            armed.task.abort();
        }
    }
}

impl<S> Drop for ReminderScheduler<S> {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.cancel.cancel();
            armed.task.abort();
        }
    }
}

async fn run_reminders<S: HabitStorage>(
    tracker: Arc<HabitTracker<S>>,
    notifier: Arc<dyn NotificationDisplay>,
    clock: Arc<dyn Clock>,
    delay: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = clock.sleep(delay) => (),
    }

    let mut next_fire = clock.instant();
    loop {
        next_fire += REMINDER_PERIOD;
        fire(&tracker, notifier.as_ref()).await;

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = clock.sleep_until(next_fire) => (),
        }
    }
}

/// Asks for a notification for every habit due today. Returns how many were requested.
pub async fn fire<S: HabitStorage>(
    tracker: &HabitTracker<S>,
    notifier: &dyn NotificationDisplay,
) -> usize {
    let habits = match tracker.due_today().await {
        Ok(habits) => habits,
        Err(e) => {
            error!("Couldn't load habits for reminders {e:?}");
            return 0;
        }
    };
    info!("Reminding about {} habits", habits.len());

    let mut requested = 0;
    for habit in &habits {
        match notifier.display(habit).await {
            Ok(()) => requested += 1,
            Err(e) => error!("Failed to display reminder for {}: {e:?}", habit.name),
        }
    }
    requested
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeSet,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    use crate::{
        daemon::storage::{
            entities::{HabitEntity, ReminderTime, Schedule},
            habit_storage::MemoryHabitStorage,
        },
        notification::{MockNotificationDisplay, NotificationDisplay},
        tracker::HabitTracker,
        utils::{
            clock::{Clock, TestClock},
            logging::TEST_LOGGING,
        },
    };

    use super::{fire, ms_until_next, ReminderScheduler, ReminderState};

    /// Records every habit it was asked to display, together with the local time of the request.
    #[derive(Clone)]
    struct RecordingNotifier {
        clock: TestClock,
        shown: Arc<Mutex<Vec<(String, NaiveDateTime)>>>,
    }

    impl RecordingNotifier {
        fn new(clock: TestClock) -> Self {
            Self {
                clock,
                shown: Default::default(),
            }
        }

        fn shown(&self) -> Vec<(String, NaiveDateTime)> {
            self.shown.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationDisplay for RecordingNotifier {
        async fn display(&self, habit: &HabitEntity) -> Result<()> {
            self.shown
                .lock()
                .unwrap()
                .push((habit.name.clone(), self.clock.local_time()));
            Ok(())
        }
    }

    fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    // 2024-03-06 is a Wednesday
    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()
    }

    fn time(s: &str) -> ReminderTime {
        s.parse().unwrap()
    }

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn setup(
        now: NaiveDateTime,
    ) -> (
        Arc<HabitTracker<MemoryHabitStorage>>,
        RecordingNotifier,
        ReminderScheduler<MemoryHabitStorage>,
    ) {
        let clock = TestClock::starting_at(now);
        let tracker = Arc::new(HabitTracker::new(
            MemoryHabitStorage::new(),
            Arc::new(clock.clone()),
        ));
        let notifier = RecordingNotifier::new(clock.clone());
        let scheduler = ReminderScheduler::new(
            tracker.clone(),
            Arc::new(notifier.clone()),
            Arc::new(clock),
        );
        (tracker, notifier, scheduler)
    }

    #[test]
    fn test_ms_until_next_later_today() {
        let delay = ms_until_next(time("09:00"), at(wednesday(), 8, 0));
        assert_eq!(delay, minutes(60));
    }

    #[test]
    fn test_ms_until_next_already_passed() {
        let delay = ms_until_next(time("09:00"), at(wednesday(), 9, 1));
        assert_eq!(delay, minutes(24 * 60 - 1));
    }

    #[test]
    fn test_ms_until_next_exactly_now_is_tomorrow() {
        let delay = ms_until_next(time("09:00"), at(wednesday(), 9, 0));
        assert_eq!(delay, minutes(24 * 60));

        let almost = wednesday()
            .and_time(NaiveTime::from_hms_milli_opt(8, 59, 59, 999).unwrap());
        assert_eq!(ms_until_next(time("09:00"), almost), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_time_then_daily() -> Result<()> {
        *TEST_LOGGING;
        let (tracker, notifier, mut scheduler) = setup(at(wednesday(), 8, 0));
        tracker.create_habit("Read", Schedule::Daily).await?;

        scheduler.reconfigure(time("09:00"));
        assert_eq!(scheduler.state(), ReminderState::Armed(time("09:00")));

        tokio::time::sleep(minutes(59)).await;
        assert!(notifier.shown().is_empty());

        tokio::time::sleep(minutes(2)).await;
        assert_eq!(
            notifier.shown(),
            vec![("Read".to_string(), at(wednesday(), 9, 0))]
        );

        tokio::time::sleep(minutes(2 * 24 * 60)).await;
        let shown = notifier.shown();
        assert_eq!(shown.len(), 3);
        assert_eq!(shown[1].1, at(wednesday().succ_opt().unwrap(), 9, 0));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_cancels_previous_timer() -> Result<()> {
        let (tracker, notifier, mut scheduler) = setup(at(wednesday(), 8, 0));
        tracker.create_habit("Read", Schedule::Daily).await?;

        scheduler.reconfigure(time("09:00"));
        tokio::time::sleep(minutes(30)).await;
        scheduler.reconfigure(time("10:00"));
        assert_eq!(scheduler.state(), ReminderState::Armed(time("10:00")));

        tokio::time::sleep(minutes(60)).await;
        assert!(notifier.shown().is_empty(), "old 09:00 timer fired");

        tokio::time::sleep(minutes(31)).await;
        assert_eq!(
            notifier.shown(),
            vec![("Read".to_string(), at(wednesday(), 10, 0))]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_after_first_fire_cancels_recurring_timer() -> Result<()> {
        let (tracker, notifier, mut scheduler) = setup(at(wednesday(), 8, 0));
        tracker.create_habit("Read", Schedule::Daily).await?;

        scheduler.reconfigure(time("09:00"));
        tokio::time::sleep(minutes(61)).await;
        assert_eq!(notifier.shown().len(), 1);

        scheduler.reconfigure(time("20:00"));
        tokio::time::sleep(minutes(24 * 60)).await;
        let shown = notifier.shown();
        assert_eq!(
            shown,
            vec![
                ("Read".to_string(), at(wednesday(), 9, 0)),
                ("Read".to_string(), at(wednesday(), 20, 0)),
            ]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_any_fire() -> Result<()> {
        let (tracker, notifier, mut scheduler) = setup(at(wednesday(), 8, 0));
        tracker.create_habit("Read", Schedule::Daily).await?;

        scheduler.reconfigure(time("09:00"));
        scheduler.stop();
        assert_eq!(scheduler.state(), ReminderState::Idle);
        scheduler.stop();

        tokio::time::sleep(minutes(3 * 24 * 60)).await;
        assert!(notifier.shown().is_empty());

        scheduler.reconfigure(time("09:00"));
        drop(scheduler);
        tokio::time::sleep(minutes(3 * 24 * 60)).await;
        assert!(notifier.shown().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_due_habits_are_reminded() -> Result<()> {
        let (tracker, notifier, mut scheduler) = setup(at(wednesday(), 8, 0));
        tracker.create_habit("Read", Schedule::Daily).await?;
        tokio::time::sleep(Duration::from_millis(1)).await;
        tracker
            .create_habit(
                "Gym",
                Schedule::Weekly {
                    days: BTreeSet::from([1, 5]),
                },
            )
            .await?;

        scheduler.reconfigure(time("09:00"));
        // Wednesday, Thursday, Friday
        tokio::time::sleep(minutes(2 * 24 * 60 + 61)).await;

        let names = notifier
            .shown()
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Read", "Read", "Read", "Gym"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_fire_continues_after_failed_display() -> Result<()> {
        let clock = TestClock::starting_at(at(wednesday(), 8, 0));
        let tracker = HabitTracker::new(MemoryHabitStorage::new(), Arc::new(clock));
        tracker.create_habit("Read", Schedule::Daily).await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
        tracker.create_habit("Walk", Schedule::Daily).await?;

        let mut notifier = MockNotificationDisplay::new();
        notifier
            .expect_display()
            .withf(|habit| habit.name == "Read")
            .times(1)
            .returning(|_| bail!("notification service is down"));
        notifier
            .expect_display()
            .withf(|habit| habit.name == "Walk")
            .times(1)
            .returning(|_| Ok(()));

        assert_eq!(fire(&tracker, &notifier).await, 1);
        Ok(())
    }
}
