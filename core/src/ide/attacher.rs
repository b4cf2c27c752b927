//! Build and debugger-attach workflow against a located IDE session
//!
//! A [`DebugAttacher`] is created once per launch cycle. It wraps the bound
//! automation handle, forwards build failures and attach outcomes as fleet
//! events, and watches the debugger for a user-initiated stop so the
//! orchestrator can tear the fleet down in response.

use super::{DebuggerEvent, DebuggerMode, DesignModeReason, IdeSession, IdeSessionLocator};
use crate::retry::RetryPolicy;
use crate::Result;
use schema::FleetEvent;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Warning code emitted when no IDE instance has the target solution open
pub const SOLUTION_NOT_FOUND: &str = "SOLUTION_NOT_FOUND";

/// Signal that the user stopped the debug session from inside the IDE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebuggerStop;

/// Drives build, attach, and session teardown for one launch cycle
pub struct DebugAttacher {
    session: Option<IdeSession>,
    solution_name: String,
    event_tx: broadcast::Sender<FleetEvent>,
    stop_tx: mpsc::Sender<DebuggerStop>,
    retry: RetryPolicy,
    enum_retry: RetryPolicy,
    stop_listener: Option<JoinHandle<()>>,
}

impl DebugAttacher {
    /// Locate the IDE session for `solution_name` and wrap it. When no
    /// instance has the solution open a warning event is emitted and the
    /// attacher is inert: builds report failure and attach requests skip.
    pub async fn connect(
        locator: &IdeSessionLocator,
        solution_name: &str,
        event_tx: broadcast::Sender<FleetEvent>,
        stop_tx: mpsc::Sender<DebuggerStop>,
    ) -> Result<Self> {
        let session = locator.locate(solution_name).await?;

        let mut attacher = Self {
            session,
            solution_name: solution_name.to_string(),
            event_tx,
            stop_tx,
            retry: RetryPolicy::transient_automation(),
            enum_retry: RetryPolicy::attach_enumeration(),
            stop_listener: None,
        };

        match &attacher.session {
            Some(session) => {
                info!(pid = session.pid(), solution = %session.solution_path(), "Connected to IDE session");
            }
            None => {
                warn!(solution = %solution_name, "No IDE instance has the solution open");
                attacher.emit(FleetEvent::warning(
                    format!(
                        "Error: Unable to locate the '{}' solution.",
                        solution_name
                    ),
                    Some(SOLUTION_NOT_FOUND.to_string()),
                ));
            }
        }

        Ok(attacher)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    #[cfg(test)]
    pub fn with_retries(mut self, retry: RetryPolicy, enum_retry: RetryPolicy) -> Self {
        self.retry = retry;
        self.enum_retry = enum_retry;
        self
    }

    /// Build the solution. Per-project failures are forwarded as warning
    /// events before this returns; the aggregate outcome is the error count
    /// of the completed build. Returns whether the build succeeded.
    pub async fn build(&self) -> Result<bool> {
        let Some(session) = &self.session else {
            return Ok(false);
        };
        let ide = session.automation();

        // Subscribe before triggering the build so per-project outcomes
        // published while it runs are still pending here afterwards.
        let mut build_rx = ide.subscribe_build_events();

        let handle = Arc::clone(&ide);
        self.retry
            .run(|| {
                let handle = Arc::clone(&handle);
                async move { handle.build_solution().await }
            })
            .await?;

        let handle = Arc::clone(&ide);
        let errors = self
            .retry
            .run(|| {
                let handle = Arc::clone(&handle);
                async move { handle.last_build_error_count().await }
            })
            .await?;

        loop {
            match build_rx.try_recv() {
                Ok(super::BuildEvent::ProjectDone { project, success }) => {
                    if !success {
                        warn!(project = %project, "Project build failed");
                        self.emit(FleetEvent::warning(
                            format!("Build failed, project: {}", project),
                            Some("BUILD_PROJECT_FAILED".to_string()),
                        ));
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Build events lagged");
                }
                Err(_) => break,
            }
        }

        let success = errors == 0;
        if success {
            info!(solution = %self.solution_name, "Solution build succeeded");
        } else {
            warn!(solution = %self.solution_name, errors, "Solution build failed");
        }
        self.emit(FleetEvent::build_finished(
            self.solution_name.clone(),
            success,
        ));
        Ok(success)
    }

    /// Attach the debugger to each process whose name matches one of
    /// `file_names`. Per-name failures are reported as skip events rather
    /// than aborting the rest. After the attach pass the debugger is watched
    /// for a user-initiated stop, whether or not any attachment succeeded.
    pub async fn attach(&mut self, file_names: &[String]) -> Result<()> {
        let Some(session) = &self.session else {
            for name in file_names {
                self.emit(FleetEvent::attach_skipped(name.clone()));
            }
            return Ok(());
        };
        let ide = session.automation();

        for name in file_names {
            // The target may not appear in the debugger's process list
            // immediately after spawn; re-enumerate with backoff.
            let handle = Arc::clone(&ide);
            let target = name.clone();
            let found = self
                .enum_retry
                .run_until(
                    move || {
                        let handle = Arc::clone(&handle);
                        let target = target.clone();
                        async move {
                            match handle.debuggable_processes().await {
                                Ok(list) => list
                                    .into_iter()
                                    .find(|d| Self::name_matches(&d.name, &target)),
                                Err(e) => {
                                    debug!(error = %e, "Debuggee enumeration failed");
                                    None
                                }
                            }
                        }
                    },
                    Option::is_some,
                )
                .await;

            match found {
                Some(debuggee) => {
                    let handle = Arc::clone(&ide);
                    let pid = debuggee.pid;
                    match self
                        .retry
                        .run(|| {
                            let handle = Arc::clone(&handle);
                            async move { handle.attach_to(pid).await }
                        })
                        .await
                    {
                        Ok(()) => {
                            info!(process = %name, pid, "Debugger attached");
                            self.emit(FleetEvent::debugger_attached(name.clone(), pid));
                        }
                        Err(e) => {
                            warn!(process = %name, pid, error = %e, "Debugger attach failed");
                            self.emit(FleetEvent::attach_skipped(name.clone()));
                        }
                    }
                }
                None => {
                    warn!(process = %name, "No debuggable process matched");
                    self.emit(FleetEvent::attach_skipped(name.clone()));
                }
            }
        }

        if !file_names.is_empty() {
            self.spawn_stop_listener();
        }
        Ok(())
    }

    /// Terminate the debug session if one is active. A debugger already in
    /// design mode is left alone.
    pub async fn terminate_session(&self) -> Result<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        let ide = session.automation();

        let handle = Arc::clone(&ide);
        let mode = self
            .retry
            .run(|| {
                let handle = Arc::clone(&handle);
                async move { handle.debugger_mode().await }
            })
            .await?;
        if mode == DebuggerMode::Design {
            debug!("Debugger already in design mode, nothing to terminate");
            return Ok(());
        }

        let handle = Arc::clone(&ide);
        self.retry
            .run(|| {
                let handle = Arc::clone(&handle);
                async move { handle.terminate_all_debuggees().await }
            })
            .await?;
        info!("Debug session terminated");
        self.emit(FleetEvent::debug_session_terminated());
        Ok(())
    }

    /// Drop the debugger-stop subscription. Safe to call more than once.
    pub fn dispose(&mut self) {
        if let Some(handle) = self.stop_listener.take() {
            handle.abort();
        }
    }

    fn emit(&self, event: FleetEvent) {
        // Nobody listening is fine
        let _ = self.event_tx.send(event);
    }

    /// Case-insensitive substring match of an executable file name against
    /// a debuggee name, so a missing or present extension on either side
    /// does not defeat the match
    fn name_matches(debuggee: &str, file_name: &str) -> bool {
        debuggee.to_lowercase().contains(&file_name.to_lowercase())
    }

    /// One-shot watch for a user-initiated debugger stop. The subscription
    /// ends after the first matching transition so a stop triggered by our
    /// own teardown later does not fire a second time.
    fn spawn_stop_listener(&mut self) {
        if let Some(handle) = self.stop_listener.take() {
            handle.abort();
        }
        let Some(session) = &self.session else {
            return;
        };
        let mut rx = session.automation().subscribe_debugger_events();
        let stop_tx = self.stop_tx.clone();
        self.stop_listener = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(DebuggerEvent::EnteredDesignMode {
                        reason: DesignModeReason::StopDebugging,
                    }) => {
                        info!("Debugger stopped from the IDE");
                        let _ = stop_tx.send(DebuggerStop).await;
                        break;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
}

impl Drop for DebugAttacher {
    fn drop(&mut self) {
        self.dispose();
    }
}
