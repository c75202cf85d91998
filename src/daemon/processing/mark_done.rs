use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::{
    daemon::storage::habit_storage::HabitStorage,
    notification::{NotificationMessage, DONE_ACTION},
    tracker::HabitTracker,
};

use super::module::EventProcessor;

/// Applies the "Mark done" button of a reminder: the habit is marked done for the local day the
/// button was pressed on, which is not necessarily the day the reminder was shown.
pub struct MarkDoneProcessor<S> {
    tracker: Arc<HabitTracker<S>>,
}

impl<S> MarkDoneProcessor<S> {
    pub fn new(tracker: Arc<HabitTracker<S>>) -> Self {
        Self { tracker }
    }
}

impl<S> EventProcessor for MarkDoneProcessor<S>
where
    S: HabitStorage + Send + Sync + 'static,
{
    async fn process_next(&mut self, message: NotificationMessage) -> Result<()> {
        match message {
            NotificationMessage::Action {
                action,
                habit_id: Some(habit_id),
            } if action == DONE_ACTION => {
                let today = self.tracker.today();
                self.tracker
                    .toggle_completion(&habit_id, today, true)
                    .await?;
                info!("Marked {habit_id} done for {today} from a notification");
            }
            NotificationMessage::Action { action, habit_id } => {
                warn!("Ignoring notification action {action:?} for {habit_id:?}");
            }
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
