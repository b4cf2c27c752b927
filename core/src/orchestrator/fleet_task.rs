//! The orchestrator task: state machine and launch/teardown phases

use super::ControlMsg;
use crate::ide::{DebugAttacher, DebuggerStop, IdeSessionLocator};
use crate::process::{ProcessAdapter, WorkerProcess};
use crate::retry::RetryPolicy;
use crate::window::WindowTiler;
use schema::{FleetEvent, FleetState, ProcessExit, Project};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Exit-polling cadence while the fleet is running
const TICK_INTERVAL: Duration = Duration::from_millis(50);

struct Worker {
    name: String,
    proc: Box<dyn WorkerProcess>,
}

pub(crate) struct FleetOrchestrator {
    solution: String,
    projects: Vec<Project>,
    adapter: Arc<dyn ProcessAdapter>,
    locator: IdeSessionLocator,
    tiler: WindowTiler,
    attacher: Option<DebugAttacher>,
    workers: Vec<Worker>,
    state: FleetState,
    state_tx: watch::Sender<FleetState>,
    event_tx: broadcast::Sender<FleetEvent>,
    control_rx: mpsc::Receiver<ControlMsg>,
    stop_tx: mpsc::Sender<DebuggerStop>,
    stop_rx: mpsc::Receiver<DebuggerStop>,
    main_window_retry: RetryPolicy,
    exit_retry: RetryPolicy,
}

impl FleetOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        solution: String,
        mut projects: Vec<Project>,
        adapter: Arc<dyn ProcessAdapter>,
        locator: IdeSessionLocator,
        tiler: WindowTiler,
        state_tx: watch::Sender<FleetState>,
        event_tx: broadcast::Sender<FleetEvent>,
        control_rx: mpsc::Receiver<ControlMsg>,
        stop_tx: mpsc::Sender<DebuggerStop>,
        stop_rx: mpsc::Receiver<DebuggerStop>,
    ) -> Self {
        for project in &mut projects {
            project.normalize();
        }
        Self {
            solution,
            projects,
            adapter,
            locator,
            tiler,
            attacher: None,
            workers: Vec::new(),
            state: FleetState::Idle,
            state_tx,
            event_tx,
            control_rx,
            stop_tx,
            stop_rx,
            main_window_retry: RetryPolicy::main_window(),
            exit_retry: RetryPolicy::process_exit(),
        }
    }

    pub(crate) async fn run(mut self) {
        info!(solution = %self.solution, projects = self.projects.len(), "Fleet orchestrator started");
        let mut tick = interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = self.control_rx.recv() => match msg {
                    Some(ControlMsg::RunAndAttach) => self.handle_run_and_attach().await,
                    Some(ControlMsg::Stop) => self.handle_stop("stop requested").await,
                    Some(ControlMsg::RestartAll) => {
                        self.handle_stop("restart requested").await;
                        self.handle_run_and_attach().await;
                    }
                    Some(ControlMsg::SetRun { project, run }) => self.handle_set_run(&project, run),
                    Some(ControlMsg::SetAttach { project, attach }) => {
                        self.handle_set_attach(&project, attach)
                    }
                    Some(ControlMsg::GetProjects { reply }) => {
                        let _ = reply.send(self.projects.clone());
                    }
                    Some(ControlMsg::Shutdown) | None => break,
                },
                Some(DebuggerStop) = self.stop_rx.recv() => {
                    self.handle_stop("debug session stopped from the IDE").await;
                }
                _ = tick.tick() => {
                    if self.state == FleetState::Running && self.check_for_exits().await {
                        self.handle_stop("worker process exited").await;
                    }
                }
            }
        }

        self.handle_stop("shutdown").await;
        info!("Fleet orchestrator stopped");
    }

    /// One full launch cycle. Ignored unless the fleet is idle; a fleet with
    /// nothing marked to run stays idle without touching the IDE.
    async fn handle_run_and_attach(&mut self) {
        if !self.state.can_run_and_attach() {
            debug!(state = ?self.state, "Run request ignored, fleet is not idle");
            return;
        }
        let runnable: Vec<Project> = self.projects.iter().filter(|p| p.run()).cloned().collect();
        if runnable.is_empty() {
            debug!("No projects marked to run");
            return;
        }

        // a stop signal buffered during a previous teardown must not kill
        // the fleet we are about to launch
        while self.stop_rx.try_recv().is_ok() {
            debug!("Discarded stale debugger-stop signal");
        }

        self.set_state(FleetState::Launching, Some("run and attach"));
        if let Some(mut old) = self.attacher.take() {
            old.dispose();
        }

        let mut attacher = match DebugAttacher::connect(
            &self.locator,
            &self.solution,
            self.event_tx.clone(),
            self.stop_tx.clone(),
        )
        .await
        {
            Ok(attacher) => attacher,
            Err(e) => {
                warn!(error = %e, "Could not connect to the IDE");
                self.set_state(FleetState::Idle, Some("ide connection failed"));
                return;
            }
        };

        let built = match attacher.build().await {
            Ok(success) => success,
            Err(e) => {
                warn!(error = %e, "Solution build errored");
                false
            }
        };
        if !built {
            // nothing was spawned; the gate reopens
            self.set_state(FleetState::Idle, Some("build failed"));
            return;
        }

        for project in &runnable {
            match self.adapter.spawn(project).await {
                Ok(proc) => {
                    let pid = proc.pid();
                    info!(project = %project.name(), pid, "Worker started");
                    self.emit(FleetEvent::process_started(
                        project.name().to_string(),
                        pid,
                        project.executable_path().display().to_string(),
                    ));
                    self.workers.push(Worker {
                        name: project.name().to_string(),
                        proc,
                    });
                }
                Err(e) => {
                    warn!(project = %project.name(), error = %e, "Worker failed to start");
                    self.emit(FleetEvent::warning(
                        format!("Failed to launch '{}': {}", project.name(), e),
                        Some("LAUNCH_FAILED".to_string()),
                    ));
                }
            }
        }

        let attach_names: Vec<String> = runnable
            .iter()
            .filter(|p| p.attach())
            .map(|p| p.executable_file_name())
            .collect();
        if !attach_names.is_empty() {
            if let Err(e) = attacher.attach(&attach_names).await {
                warn!(error = %e, "Debugger attachment errored");
            }
        }
        self.attacher = Some(attacher);

        self.tile_workers().await;

        if self.workers.is_empty() {
            warn!("No worker started, tearing back down");
            self.handle_stop("no worker started").await;
        } else {
            self.set_state(FleetState::Running, None);
        }
    }

    /// Wait for each worker's startup to settle, then pin its windows. A
    /// worker that never shows a main window is skipped for tiling but stays
    /// tracked for teardown.
    async fn tile_workers(&mut self) {
        for worker in &mut self.workers {
            if let Err(e) = worker.proc.wait_for_input_idle().await {
                debug!(project = %worker.name, error = %e, "Input-idle wait failed");
            }

            let mut window = None;
            for attempt in 1..=self.main_window_retry.max_attempts() {
                match worker.proc.main_window() {
                    Ok(Some(handle)) => {
                        window = Some(handle);
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(project = %worker.name, error = %e, "Main window query failed");
                        break;
                    }
                }
                if attempt < self.main_window_retry.max_attempts() {
                    tokio::time::sleep(self.main_window_retry.backoff(attempt)).await;
                }
            }

            if window.is_some() {
                self.tiler.position_windows(&worker.name, worker.proc.pid());
            } else {
                debug!(project = %worker.name, "No main window, skipping tiling");
            }
        }
    }

    /// Fleet-wide teardown. Idempotent: with the gate open and nothing
    /// tracked it returns immediately.
    async fn handle_stop(&mut self, reason: &str) {
        if self.state == FleetState::Idle && self.workers.is_empty() && self.attacher.is_none() {
            debug!("Stop ignored, nothing to tear down");
            return;
        }
        self.set_state(FleetState::Stopping, Some(reason));

        // per-worker teardown is isolated so one stubborn process cannot
        // leave the rest running
        let workers = std::mem::take(&mut self.workers);
        for worker in workers {
            self.tear_down_worker(worker).await;
        }

        if let Some(mut attacher) = self.attacher.take() {
            if let Err(e) = attacher.terminate_session().await {
                warn!(error = %e, "Failed to terminate the debug session");
            }
            attacher.dispose();
        }

        self.set_state(FleetState::Idle, Some(reason));
    }

    /// Graceful close, bounded exit poll, then force kill
    async fn tear_down_worker(&mut self, mut worker: Worker) {
        let pid = worker.proc.pid();

        match worker.proc.try_wait().await {
            Ok(Some(exit)) => {
                debug!(project = %worker.name, pid, "Worker already exited");
                self.emit(FleetEvent::process_exited(worker.name.clone(), exit));
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(project = %worker.name, pid, error = %e, "Exit check failed"),
        }

        match worker.proc.close_main_window().await {
            Ok(true) => debug!(project = %worker.name, pid, "Requested graceful close"),
            Ok(false) => debug!(project = %worker.name, pid, "Graceful close not delivered"),
            Err(e) => warn!(project = %worker.name, pid, error = %e, "Graceful close failed"),
        }
        if let Some(exit) = Self::poll_exit(self.exit_retry, &mut worker).await {
            info!(project = %worker.name, pid, "Worker closed gracefully");
            self.emit(FleetEvent::process_exited(worker.name.clone(), exit));
            return;
        }

        warn!(project = %worker.name, pid, "Worker ignored graceful close, killing");
        if let Err(e) = worker.proc.kill().await {
            warn!(project = %worker.name, pid, error = %e, "Kill failed");
        }
        if let Some(exit) = Self::poll_exit(self.exit_retry, &mut worker).await {
            self.emit(FleetEvent::process_exited(worker.name.clone(), exit));
            return;
        }

        warn!(project = %worker.name, pid, "Worker did not exit");
        self.emit(FleetEvent::warning(
            format!("Process {} for '{}' did not exit", pid, worker.name),
            Some("TEARDOWN_INCOMPLETE".to_string()),
        ));
    }

    // takes the policy by value so no shared borrow of the orchestrator is
    // held across the await
    async fn poll_exit(policy: RetryPolicy, worker: &mut Worker) -> Option<ProcessExit> {
        for attempt in 1..=policy.max_attempts() {
            match worker.proc.try_wait().await {
                Ok(Some(exit)) => return Some(exit),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Exit poll failed"),
            }
            if attempt < policy.max_attempts() {
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
        }
        None
    }

    /// Poll every tracked worker once. Exited workers are reported and
    /// dropped from tracking; returns whether any exit was observed.
    async fn check_for_exits(&mut self) -> bool {
        let mut exited = false;
        let mut remaining = Vec::with_capacity(self.workers.len());
        for mut worker in std::mem::take(&mut self.workers) {
            match worker.proc.try_wait().await {
                Ok(Some(exit)) => {
                    warn!(project = %worker.name, pid = exit.pid, code = ?exit.exit_code, "Worker exited unexpectedly");
                    self.emit(FleetEvent::process_exited(worker.name.clone(), exit));
                    exited = true;
                }
                Ok(None) => remaining.push(worker),
                Err(e) => {
                    warn!(project = %worker.name, error = %e, "Exit poll failed");
                    remaining.push(worker);
                }
            }
        }
        self.workers = remaining;
        exited
    }

    fn handle_set_run(&mut self, name: &str, run: bool) {
        match self.projects.iter_mut().find(|p| p.name() == name) {
            Some(project) => {
                project.set_run(run);
                debug!(project = %name, run, attach = project.attach(), "Run flag updated");
            }
            None => warn!(project = %name, "Unknown project in set_run"),
        }
    }

    fn handle_set_attach(&mut self, name: &str, attach: bool) {
        match self.projects.iter_mut().find(|p| p.name() == name) {
            Some(project) => {
                project.set_attach(attach);
                debug!(project = %name, attach, run = project.run(), "Attach flag updated");
            }
            None => warn!(project = %name, "Unknown project in set_attach"),
        }
    }

    fn set_state(&mut self, to: FleetState, reason: Option<&str>) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        let _ = self.state_tx.send(to);
        info!(?from, ?to, reason, "Fleet state changed");
        self.emit(FleetEvent::state_changed(from, to, reason.map(String::from)));
    }

    fn emit(&self, event: FleetEvent) {
        // nobody listening is fine
        let _ = self.event_tx.send(event);
    }
}
