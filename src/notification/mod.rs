//! Contains logic for showing habit reminders to the user and relaying what the user did with
//! them. [NotificationBridge] is the main artifact of this module, [GenericNotificationBackend]
//! picks whatever the current platform supports.

#[cfg(unix)]
pub mod notify_send;

use std::{fmt::Display, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::daemon::storage::{
    entities::{HabitEntity, HabitId, NotificationPermission},
    habit_storage::HabitStorage,
};

/// Action id sent back when the user presses "Mark done".
pub const DONE_ACTION: &str = "done";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
    pub id: String,
    pub title: String,
}

/// Everything a backend needs to show a reminder for one habit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitNotification {
    pub habit_id: HabitId,
    pub title: String,
    pub body: String,
    pub actions: Vec<NotificationAction>,
}

impl HabitNotification {
    pub fn for_habit(habit: &HabitEntity) -> Self {
        Self {
            habit_id: habit.id.clone(),
            title: format!("Habit: {}", habit.name),
            body: "Tap to open. Or mark done now.".into(),
            actions: vec![NotificationAction {
                id: DONE_ACTION.into(),
                title: "Mark done".into(),
            }],
        }
    }
}

/// Message relayed from a delivered notification to the running application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationMessage {
    #[serde(rename = "NOTIF_ACTION")]
    Action {
        action: String,
        #[serde(rename = "habitId", default)]
        habit_id: Option<HabitId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionReason {
    Granted,
    Denied,
    Default,
    /// There is no way to show notifications on this system.
    Unsupported,
}

impl From<NotificationPermission> for PermissionReason {
    fn from(value: NotificationPermission) -> Self {
        match value {
            NotificationPermission::Default => Self::Default,
            NotificationPermission::Granted => Self::Granted,
            NotificationPermission::Denied => Self::Denied,
        }
    }
}

impl Display for PermissionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionReason::Granted => write!(f, "granted"),
            PermissionReason::Denied => write!(f, "denied"),
            PermissionReason::Default => write!(f, "default"),
            PermissionReason::Unsupported => write!(f, "unsupported"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionStatus {
    pub granted: bool,
    pub reason: PermissionReason,
}

impl PermissionStatus {
    fn unsupported() -> Self {
        Self {
            granted: false,
            reason: PermissionReason::Unsupported,
        }
    }
}

impl From<NotificationPermission> for PermissionStatus {
    fn from(value: NotificationPermission) -> Self {
        Self {
            granted: value == NotificationPermission::Granted,
            reason: value.into(),
        }
    }
}

impl Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.granted {
            write!(f, "Notifications: enabled")
        } else {
            write!(f, "Notifications: not enabled ({})", self.reason)
        }
    }
}

/// Anything that can put a habit reminder in front of the user. Displaying is fire-and-forget:
/// returning means the request was accepted, not that the user saw it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDisplay: Send + Sync {
    async fn display(&self, habit: &HabitEntity) -> Result<()>;
}

/// Intended to serve as a contract different notification services must implement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Shows the notification and waits for the user. Returns the id of the action the user
    /// picked, `None` if the notification was dismissed.
    async fn show(&self, notification: HabitNotification) -> Result<Option<String>>;
}

/// Backend used when nothing on the system can show notifications.
pub struct UnsupportedBackend;

#[async_trait]
impl NotificationBackend for UnsupportedBackend {
    fn is_supported(&self) -> bool {
        false
    }

    async fn show(&self, notification: HabitNotification) -> Result<Option<String>> {
        debug!("Dropping notification {:?}", notification.title);
        Ok(None)
    }
}

/// Serves as a cross-compatible NotificationBackend implementation.
pub struct GenericNotificationBackend {
    inner: Box<dyn NotificationBackend>,
}

impl GenericNotificationBackend {
    pub fn new() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                let inner: Box<dyn NotificationBackend> =
                    match notify_send::NotifySendBackend::detect() {
                        Some(backend) => Box::new(backend),
                        None => Box::new(UnsupportedBackend),
                    };
            } else {
                let inner: Box<dyn NotificationBackend> = Box::new(UnsupportedBackend);
            }
        }
        Self { inner }
    }
}

impl Default for GenericNotificationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationBackend for GenericNotificationBackend {
    fn is_supported(&self) -> bool {
        self.inner.is_supported()
    }

    async fn show(&self, notification: HabitNotification) -> Result<Option<String>> {
        self.inner.show(notification).await
    }
}

/// Connects habits with a [NotificationBackend]: keeps track of the user's permission, shows
/// reminders, and forwards actions picked on a notification into the action channel.
pub struct NotificationBridge<S> {
    storage: S,
    backend: Arc<dyn NotificationBackend>,
    actions: Option<mpsc::Sender<NotificationMessage>>,
}

impl<S: HabitStorage> NotificationBridge<S> {
    pub fn new(storage: S, backend: Arc<dyn NotificationBackend>) -> Self {
        Self {
            storage,
            backend,
            actions: None,
        }
    }

    /// Actions picked on displayed notifications will be sent into `actions`.
    pub fn with_actions(self, actions: mpsc::Sender<NotificationMessage>) -> Self {
        Self {
            actions: Some(actions),
            ..self
        }
    }

    pub async fn permission_status(&self) -> Result<PermissionStatus> {
        if !self.backend.is_supported() {
            return Ok(PermissionStatus::unsupported());
        }
        Ok(self.storage.get_permission().await?.into())
    }

    /// Invoked when the user opts in to notifications.
    pub async fn request_permission(&self) -> Result<PermissionStatus> {
        if !self.backend.is_supported() {
            info!("Notifications are not supported on this system");
            return Ok(PermissionStatus::unsupported());
        }
        self.storage
            .put_permission(NotificationPermission::Granted)
            .await?;
        Ok(NotificationPermission::Granted.into())
    }

    pub async fn revoke_permission(&self) -> Result<PermissionStatus> {
        self.storage
            .put_permission(NotificationPermission::Denied)
            .await?;
        self.permission_status().await
    }
}

#[async_trait]
impl<S: HabitStorage + Send + Sync> NotificationDisplay for NotificationBridge<S> {
    async fn display(&self, habit: &HabitEntity) -> Result<()> {
        let status = self.permission_status().await?;
        if !status.granted {
            debug!("Not showing {}, {status}", habit.name);
            return Ok(());
        }

        let notification = HabitNotification::for_habit(habit);
        let backend = self.backend.clone();
        let actions = self.actions.clone();
        tokio::spawn(async move {
            let habit_id = notification.habit_id.clone();
            match backend.show(notification).await {
                Ok(Some(action)) => {
                    debug!("User picked {action} for {habit_id}");
                    let Some(actions) = actions else {
                        return;
                    };
                    let message = NotificationMessage::Action {
                        action,
                        habit_id: Some(habit_id),
                    };
                    if let Err(e) = actions.send(message).await {
                        error!("Failed to relay notification action {e:?}");
                    }
                }
                Ok(None) => debug!("Notification for {habit_id} was dismissed"),
                Err(e) => error!("Failed to show notification for {habit_id}: {e:?}"),
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::daemon::storage::{
        entities::{HabitEntity, NotificationPermission, Schedule},
        habit_storage::{HabitStorage, MemoryHabitStorage},
    };

    use super::*;

    fn habit() -> HabitEntity {
        HabitEntity {
            id: "read-1".parse().unwrap(),
            name: "Read".into(),
            created_at: DateTime::<Utc>::from_timestamp_millis(0).unwrap(),
            schedule: Schedule::Daily,
        }
    }

    #[test]
    fn test_message_wire_format() -> Result<()> {
        let message: NotificationMessage = serde_json::from_value(json!({
            "type": "NOTIF_ACTION", "action": "done", "habitId": "read-1"
        }))?;
        assert_eq!(
            message,
            NotificationMessage::Action {
                action: "done".into(),
                habit_id: Some("read-1".parse()?),
            }
        );

        let message: NotificationMessage =
            serde_json::from_value(json!({ "type": "NOTIF_ACTION", "action": "" }))?;
        assert_eq!(
            message,
            NotificationMessage::Action {
                action: "".into(),
                habit_id: None,
            }
        );
        assert!(serde_json::from_value::<NotificationMessage>(json!({ "type": "OTHER" })).is_err());
        Ok(())
    }

    #[test]
    fn test_notification_content() {
        let notification = HabitNotification::for_habit(&habit());
        assert_eq!(notification.title, "Habit: Read");
        assert_eq!(notification.body, "Tap to open. Or mark done now.");
        assert_eq!(notification.actions.len(), 1);
        assert_eq!(notification.actions[0].id, "done");
        assert_eq!(notification.actions[0].title, "Mark done");
    }

    #[test]
    fn test_status_strings() {
        let granted: PermissionStatus = NotificationPermission::Granted.into();
        assert_eq!(granted.to_string(), "Notifications: enabled");
        let denied: PermissionStatus = NotificationPermission::Denied.into();
        assert_eq!(denied.to_string(), "Notifications: not enabled (denied)");
        assert_eq!(
            PermissionStatus::unsupported().to_string(),
            "Notifications: not enabled (unsupported)"
        );
    }

    #[tokio::test]
    async fn test_unsupported_backend_reports_unsupported() -> Result<()> {
        let mut backend = MockNotificationBackend::new();
        backend.expect_is_supported().return_const(false);
        backend.expect_show().never();

        let storage = Arc::new(MemoryHabitStorage::new());
        let bridge = NotificationBridge::new(storage.clone(), Arc::new(backend));

        let status = bridge.request_permission().await?;
        assert!(!status.granted);
        assert_eq!(status.reason, PermissionReason::Unsupported);
        assert_eq!(
            storage.get_permission().await?,
            NotificationPermission::Default
        );

        bridge.display(&habit()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_display_is_inert_without_permission() -> Result<()> {
        let mut backend = MockNotificationBackend::new();
        backend.expect_is_supported().return_const(true);
        backend.expect_show().never();

        let storage = Arc::new(MemoryHabitStorage::new());
        let bridge = NotificationBridge::new(storage.clone(), Arc::new(backend));

        bridge.display(&habit()).await?;

        let status = bridge.revoke_permission().await?;
        assert_eq!(status.reason, PermissionReason::Denied);
        bridge.display(&habit()).await?;

        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_picked_action_is_relayed() -> Result<()> {
        let mut backend = MockNotificationBackend::new();
        backend.expect_is_supported().return_const(true);
        backend
            .expect_show()
            .withf(|n| n.title == "Habit: Read" && n.habit_id.as_str() == "read-1")
            .times(1)
            .returning(|_| Ok(Some(DONE_ACTION.to_string())));

        let (sender, mut receiver) = mpsc::channel(4);
        let bridge = NotificationBridge::new(Arc::new(MemoryHabitStorage::new()), Arc::new(backend))
            .with_actions(sender);

        let status = bridge.request_permission().await?;
        assert!(status.granted);
        bridge.display(&habit()).await?;

        let message = tokio::time::timeout(Duration::from_secs(5), receiver.recv()).await?;
        assert_eq!(
            message,
            Some(NotificationMessage::Action {
                action: "done".into(),
                habit_id: Some("read-1".parse()?),
            })
        );
        Ok(())
    }
}
