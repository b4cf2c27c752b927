//! Fleet orchestrator
//!
//! A single tokio task owns all mutable orchestration state: the project
//! list, the tracked worker processes, and the debug attacher. Callers hold
//! an [`OrchestratorHandle`] and talk to the task over an mpsc control
//! channel; state is published through a watch channel and observability
//! through a broadcast event channel. Confining the state to one task means
//! launch and teardown phases are strictly serialized with no locks.

use crate::ide::{AutomationRegistry, IdeSessionLocator};
use crate::process::ProcessAdapter;
use crate::window::{WindowSystem, WindowTiler};
use crate::{CoreError, Result};
use schema::{FleetEvent, FleetState, Project};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

mod fleet_task;

#[cfg(test)]
mod integration_tests;

use fleet_task::FleetOrchestrator;

/// Capacity of the broadcast event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Control messages handled by the orchestrator task
#[derive(Debug)]
pub(crate) enum ControlMsg {
    RunAndAttach,
    Stop,
    RestartAll,
    SetRun { project: String, run: bool },
    SetAttach { project: String, attach: bool },
    GetProjects { reply: oneshot::Sender<Vec<Project>> },
    Shutdown,
}

/// Handle to a running orchestrator task
pub struct OrchestratorHandle {
    control_tx: mpsc::Sender<ControlMsg>,
    state_rx: watch::Receiver<FleetState>,
    event_tx: broadcast::Sender<FleetEvent>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Start an orchestration cycle: build, spawn, attach, tile. Ignored
    /// unless the fleet is idle.
    pub async fn run_and_attach(&self) -> Result<()> {
        self.send(ControlMsg::RunAndAttach).await
    }

    /// Tear the fleet down. A no-op when nothing is running.
    pub async fn stop(&self) -> Result<()> {
        self.send(ControlMsg::Stop).await
    }

    /// Stop, then immediately start a fresh cycle
    pub async fn restart_all(&self) -> Result<()> {
        self.send(ControlMsg::RestartAll).await
    }

    /// Toggle a project's run flag. Clearing run also clears attach.
    pub async fn set_run(&self, project: impl Into<String>, run: bool) -> Result<()> {
        self.send(ControlMsg::SetRun {
            project: project.into(),
            run,
        })
        .await
    }

    /// Toggle a project's attach flag. Setting attach also sets run.
    pub async fn set_attach(&self, project: impl Into<String>, attach: bool) -> Result<()> {
        self.send(ControlMsg::SetAttach {
            project: project.into(),
            attach,
        })
        .await
    }

    /// Snapshot of the fleet's projects with their current flags
    pub async fn projects(&self) -> Result<Vec<Project>> {
        let (reply, rx) = oneshot::channel();
        self.send(ControlMsg::GetProjects { reply }).await?;
        rx.await
            .map_err(|_| CoreError::OrchestratorError("Orchestrator task is gone".to_string()))
    }

    /// Current fleet state
    pub fn current_state(&self) -> FleetState {
        *self.state_rx.borrow()
    }

    /// Watch channel following fleet state transitions
    pub fn state_watch(&self) -> watch::Receiver<FleetState> {
        self.state_rx.clone()
    }

    /// Subscribe to the orchestrator's event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<FleetEvent> {
        self.event_tx.subscribe()
    }

    /// Stop the fleet and end the orchestrator task
    pub async fn shutdown(self) -> Result<()> {
        // the task drains by tearing down anything still running
        let _ = self.send(ControlMsg::Shutdown).await;
        self.task
            .await
            .map_err(|e| CoreError::OrchestratorError(format!("Orchestrator task panicked: {}", e)))
    }

    async fn send(&self, msg: ControlMsg) -> Result<()> {
        self.control_tx
            .send(msg)
            .await
            .map_err(|_| CoreError::OrchestratorError("Orchestrator task is gone".to_string()))
    }
}

/// Spawn the orchestrator task for a fleet
pub fn spawn_orchestrator(
    solution: impl Into<String>,
    projects: Vec<Project>,
    process_adapter: Arc<dyn ProcessAdapter>,
    registry: Arc<dyn AutomationRegistry>,
    window_system: Box<dyn WindowSystem>,
) -> OrchestratorHandle {
    let (control_tx, control_rx) = mpsc::channel(32);
    let (state_tx, state_rx) = watch::channel(FleetState::Idle);
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let (stop_tx, stop_rx) = mpsc::channel(4);

    let orchestrator = FleetOrchestrator::new(
        solution.into(),
        projects,
        process_adapter,
        IdeSessionLocator::new(registry),
        WindowTiler::new(window_system, event_tx.clone()),
        state_tx,
        event_tx.clone(),
        control_rx,
        stop_tx,
        stop_rx,
    );
    let task = tokio::spawn(orchestrator.run());

    OrchestratorHandle {
        control_tx,
        state_rx,
        event_tx,
        task,
    }
}
