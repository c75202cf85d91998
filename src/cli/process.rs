use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

use super::daemon_path::to_daemon_path;

pub fn daemon_executable() -> Result<PathBuf> {
    Ok(to_daemon_path(env::current_exe()?))
}

/// Terminates every running process started from `name`, except for this one. Returns how many
/// were stopped.
pub fn kill_previous_servers(name: &Path) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't get own pid {e}"))?;
    let mut killed = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            info!("Stopping daemon {pid}");
            // This will forcefully terminate the process on Windows.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            killed += 1;
        }
    }
    Ok(killed)
}

/// Shuts down previous daemons and starts a new one. On unix the daemon detaches by itself, so
/// the spawned process exits right after forking.
pub fn restart_server(dir: Option<&Path>) -> Result<()> {
    let daemon = daemon_executable()?;
    kill_previous_servers(&daemon)?;
    let mut command = std::process::Command::new(&daemon);
    if let Some(dir) = dir {
        command.arg("--dir").arg(dir);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());

    info!("Spawning {daemon:?}");
    #[cfg(unix)]
    {
        let status = command.status()?;
        if !status.success() {
            return Err(anyhow!("{daemon:?} exited with {status}"));
        }
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::zombie_processes)]
        let _ = command.spawn()?;
    }
    println!("Daemon started");
    Ok(())
}
