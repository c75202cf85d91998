use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{HabitNotification, NotificationBackend};

const APP_NAME: &str = "habitrack";

/// Nobody is going to answer a reminder from yesterday.
const WAIT_LIMIT: Duration = Duration::from_secs(60 * 60 * 12);

/// Shows notifications through `notify-send` from libnotify. `--wait` keeps the process alive
/// until the notification is closed, and the id of the picked action is printed to stdout.
pub struct NotifySendBackend {
    program: PathBuf,
}

impl NotifySendBackend {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Finds `notify-send` on `PATH`.
    pub fn detect() -> Option<Self> {
        let paths = std::env::var_os("PATH")?;
        find_program(std::env::split_paths(&paths), "notify-send").map(Self::new)
    }

    fn command(&self, notification: &HabitNotification) -> Command {
        let mut command = Command::new(&self.program);
        command.arg(format!("--app-name={APP_NAME}"));
        command.arg("--wait");
        for action in &notification.actions {
            command.arg(format!("--action={}={}", action.id, action.title));
        }
        command.arg(&notification.title);
        command.arg(&notification.body);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

fn find_program(paths: impl IntoIterator<Item = PathBuf>, name: &str) -> Option<PathBuf> {
    paths
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Output of `notify-send --wait` is either empty or the id of the picked action.
fn parse_picked_action(stdout: &[u8]) -> Option<String> {
    let picked = String::from_utf8_lossy(stdout).trim().to_string();
    if picked.is_empty() {
        None
    } else {
        Some(picked)
    }
}

#[async_trait]
impl NotificationBackend for NotifySendBackend {
    fn is_supported(&self) -> bool {
        true
    }

    async fn show(&self, notification: HabitNotification) -> Result<Option<String>> {
        debug!("Showing {:?} through {:?}", notification.title, self.program);
        let child = self.command(&notification).spawn()?;
        let output = match tokio::time::timeout(WAIT_LIMIT, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("Nobody answered notification {:?}", notification.title);
                return Ok(None);
            }
        };
        if !output.status.success() {
            bail!(
                "notify-send exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(parse_picked_action(&output.stdout))
    }
}
