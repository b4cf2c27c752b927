//! Native process adapter built on `tokio::process`

use super::{ProcessAdapter, WorkerProcess};
use crate::window::WindowHandle;
use crate::{CoreError, Result};
use async_trait::async_trait;
use schema::{FleetEvent, ProcessExit, Project};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Spawns real OS processes for fleet members
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProcessAdapter;

impl NativeProcessAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessAdapter for NativeProcessAdapter {
    async fn spawn(&self, project: &Project) -> Result<Box<dyn WorkerProcess>> {
        let executable = project.executable_path();
        let mut command = Command::new(executable);
        // Workers resolve their data files relative to the executable
        if let Some(dir) = executable.parent() {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            CoreError::ProcessError(format!(
                "Failed to spawn '{}' ({}): {}",
                project.name(),
                executable.display(),
                e
            ))
        })?;
        let pid = child.id().ok_or_else(|| {
            CoreError::ProcessError(format!("Process for '{}' exited before start", project.name()))
        })?;

        debug!(project = %project.name(), pid, "Spawned worker process");
        Ok(Box::new(NativeProcess {
            pid,
            child,
            exit: None,
        }))
    }
}

struct NativeProcess {
    pid: u32,
    child: Child,
    exit: Option<ProcessExit>,
}

impl NativeProcess {
    fn record_exit(&mut self, status: std::process::ExitStatus) -> ProcessExit {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        let exit = ProcessExit {
            pid: self.pid,
            exit_code: status.code(),
            signal,
            timestamp: FleetEvent::current_timestamp(),
        };
        self.exit = Some(exit.clone());
        exit
    }
}

#[async_trait]
impl WorkerProcess for NativeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        if let Some(exit) = &self.exit {
            return Ok(Some(exit.clone()));
        }
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(self.record_exit(status))),
            Ok(None) => Ok(None),
            Err(e) => Err(CoreError::ProcessError(format!(
                "Failed to poll process {}: {}",
                self.pid, e
            ))),
        }
    }

    async fn wait_for_input_idle(&mut self) -> Result<()> {
        // No portable readiness signal; the main-window poll that follows
        // covers the startup window.
        Ok(())
    }

    fn main_window(&self) -> Result<Option<WindowHandle>> {
        // Window enumeration is owned by the window system, which is absent
        // on headless platforms.
        Ok(None)
    }

    async fn close_main_window(&mut self) -> Result<bool> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            match kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                Ok(()) => {
                    debug!(pid = self.pid, "Sent SIGTERM");
                    Ok(true)
                }
                Err(nix::errno::Errno::ESRCH) => Ok(false),
                Err(e) => Err(CoreError::ProcessError(format!(
                    "Failed to signal process {}: {}",
                    self.pid, e
                ))),
            }
        }
        #[cfg(not(unix))]
        {
            tracing::warn!(pid = self.pid, "No graceful close mechanism on this platform");
            Ok(false)
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await.map_err(|e| {
            CoreError::ProcessError(format!("Failed to kill process {}: {}", self.pid, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for_exit(proc: &mut Box<dyn WorkerProcess>) -> Option<ProcessExit> {
        for _ in 0..100 {
            if let Some(exit) = proc.try_wait().await.unwrap() {
                return Some(exit);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_spawn_missing_executable_fails() {
        let adapter = NativeProcessAdapter::new();
        let project = Project::new("ghost", "/nonexistent/fleet/bin/ghost");
        let result = adapter.spawn(&project).await;
        assert!(matches!(result, Err(CoreError::ProcessError(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_info_is_stable_after_exit() {
        let adapter = NativeProcessAdapter::new();
        let mut project = Project::new("true", "/bin/true");
        project.set_run(true);
        let Ok(mut proc) = adapter.spawn(&project).await else {
            // binary not present in this environment
            return;
        };

        let exit = wait_for_exit(&mut proc).await.unwrap();
        assert!(exit.is_success());
        assert_eq!(proc.try_wait().await.unwrap(), Some(exit));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_main_window_reports_dead_process() {
        let adapter = NativeProcessAdapter::new();
        let mut project = Project::new("cat", "/bin/cat");
        project.set_run(true);
        let Ok(mut proc) = adapter.spawn(&project).await else {
            return;
        };

        proc.kill().await.unwrap();
        let exit = wait_for_exit(&mut proc).await.unwrap();
        assert!(exit.is_failure());
        // the process is reaped, so the graceful close can no longer land
        assert!(!proc.close_main_window().await.unwrap());
    }
}
