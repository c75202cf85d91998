use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use processing::{mark_done::MarkDoneProcessor, ProcessingModule};
use reminder::{watcher::SettingsWatcher, ReminderScheduler};
use storage::habit_storage::{HabitStorage, JsonHabitStorage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    notification::{
        GenericNotificationBackend, NotificationBackend, NotificationBridge, NotificationMessage,
    },
    tracker::HabitTracker,
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod processing;
pub mod reminder;
pub mod shutdown;
pub mod storage;

const DEFAULT_SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Directory inside of the application directory where habits, logs and settings are kept.
pub const DATA_DIR: &str = "data";

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    let data_dir = dir.join(DATA_DIR);
    std::env::set_current_dir("/")?;

    let shutdown_token = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let storage = Arc::new(JsonHabitStorage::new(data_dir)?);
    let backend: Arc<dyn NotificationBackend> = Arc::new(GenericNotificationBackend::new());
    info!("Notifications supported: {}", backend.is_supported());

    let (watcher, processor) = create_modules(
        storage,
        backend,
        clock,
        &shutdown_token,
        DEFAULT_SETTINGS_POLL_INTERVAL,
    );

    let (_, watcher_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        watcher.run(),
        processor.run(),
    );

    if let Err(watcher_result) = watcher_result {
        error!("Reminder module got an error {:?}", watcher_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

type Modules<S> = (
    SettingsWatcher<Arc<S>>,
    ProcessingModule<MarkDoneProcessor<Arc<S>>>,
);

fn create_modules<S>(
    storage: Arc<S>,
    backend: Arc<dyn NotificationBackend>,
    clock: Arc<dyn Clock>,
    shutdown_token: &CancellationToken,
    poll_interval: Duration,
) -> Modules<S>
where
    S: Send + Sync + 'static,
    Arc<S>: HabitStorage,
{
    let (sender, receiver) = mpsc::channel::<NotificationMessage>(10);

    let tracker = Arc::new(HabitTracker::new(storage.clone(), clock.clone()));
    let bridge = Arc::new(NotificationBridge::new(storage, backend).with_actions(sender));
    let scheduler = ReminderScheduler::new(tracker.clone(), bridge, clock.clone());

    let watcher = SettingsWatcher::new(
        tracker.clone(),
        scheduler,
        shutdown_token.clone(),
        poll_interval,
        clock,
    );
    let processor = ProcessingModule::new(
        receiver,
        MarkDoneProcessor::new(tracker),
        shutdown_token.clone(),
    );
    (watcher, processor)
}
