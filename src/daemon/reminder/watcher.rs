use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    daemon::storage::{entities::ReminderTime, habit_storage::HabitStorage},
    tracker::HabitTracker,
    utils::clock::Clock,
};

use super::ReminderScheduler;

/// Keeps the [ReminderScheduler] armed for whatever reminder time is currently stored. The cli
/// writes settings directly into storage, so the daemon has to look for changes itself.
pub struct SettingsWatcher<S> {
    tracker: Arc<HabitTracker<S>>,
    scheduler: ReminderScheduler<S>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl<S> SettingsWatcher<S>
where
    S: HabitStorage + Send + Sync + 'static,
{
    pub fn new(
        tracker: Arc<HabitTracker<S>>,
        scheduler: ReminderScheduler<S>,
        shutdown: CancellationToken,
        poll_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            scheduler,
            shutdown,
            poll_interval,
            clock,
        }
    }

    /// Executes the watcher event loop. The scheduler is stopped before returning.
    pub async fn run(mut self) -> Result<()> {
        let mut current: Option<ReminderTime> = None;
        let mut check_point = self.clock.instant();
        loop {
            check_point += self.poll_interval;

            match self.tracker.settings().await {
                Ok(settings) if current != Some(settings.reminder_time) => {
                    info!("Reminder time is now {}", settings.reminder_time);
                    self.scheduler.reconfigure(settings.reminder_time);
                    current = Some(settings.reminder_time);
                }
                Ok(_) => (),
                Err(e) => error!("Failed to read settings {e:?}"),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.scheduler.stop();
                    return Ok(())
                }
                _ = self.clock.sleep_until(check_point) => ()
            }
        }
    }
}
