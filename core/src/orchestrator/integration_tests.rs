//! End-to-end orchestrator scenarios against the scripted mock boundaries

use super::*;
use crate::ide::mock::{MockIde, MockRegistry};
use crate::process::mock::{MockInstruction, MockProcessAdapter};
use crate::window::mock::MockWindowSystem;
use schema::Project;
use std::time::Duration;
use tokio::time::timeout;

const SOLUTION: &str = "AllApps";
const WAIT: Duration = Duration::from_secs(10);

struct Fixture {
    handle: OrchestratorHandle,
    adapter: Arc<MockProcessAdapter>,
    ide: Arc<MockIde>,
    registry: Arc<MockRegistry>,
    windows: Arc<MockWindowSystem>,
    events: broadcast::Receiver<FleetEvent>,
}

fn project(name: &str, run: bool, attach: bool) -> Project {
    let mut p = Project::new(name, format!("/fleet/bin/{}", name));
    p.set_run(run);
    if attach {
        p.set_attach(true);
    }
    p
}

fn start(projects: Vec<Project>, ide: Arc<MockIde>) -> Fixture {
    let adapter = Arc::new(MockProcessAdapter::new());
    let windows = Arc::new(MockWindowSystem::new());
    let registry = Arc::new(MockRegistry::new().with_ide(7000, Arc::clone(&ide)));
    let handle = spawn_orchestrator(
        SOLUTION,
        projects,
        Arc::clone(&adapter) as Arc<dyn ProcessAdapter>,
        Arc::clone(&registry) as Arc<dyn AutomationRegistry>,
        Box::new(Arc::clone(&windows)),
    );
    let events = handle.subscribe_events();
    Fixture {
        handle,
        adapter,
        ide,
        registry,
        windows,
        events,
    }
}

/// Spawn instruction for a worker whose main window appears immediately
fn windowed(handle: u64) -> MockInstruction {
    MockInstruction {
        main_window: Some(handle),
        ..Default::default()
    }
}

async fn wait_for_state(fixture: &Fixture, state: FleetState) {
    let mut rx = fixture.handle.state_watch();
    timeout(WAIT, async {
        loop {
            if *rx.borrow() == state {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "timed out waiting for {:?}, current {:?}",
            state,
            fixture.handle.current_state()
        )
    });
}

fn drain(events: &mut broadcast::Receiver<FleetEvent>) -> Vec<FleetEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn test_nothing_marked_to_run_is_a_no_op() {
    let ide = Arc::new(MockIde::new(r"C:\src\AllApps.sln"));
    let fixture = start(
        vec![project("ISA", false, false), project("MDA", false, false)],
        ide,
    );

    fixture.handle.run_and_attach().await.unwrap();
    // round-trip through the task to be sure the command was processed
    let _ = fixture.handle.projects().await.unwrap();

    assert_eq!(fixture.handle.current_state(), FleetState::Idle);
    assert!(fixture.adapter.spawned().is_empty());
    // the IDE was never consulted
    assert_eq!(fixture.registry.bind_calls(), 0);
    assert!(fixture.ide.attached_pids().is_empty());

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_single_run_attach_tile_cycle() {
    let ide = Arc::new(
        MockIde::new(r"C:\src\AllApps.sln").with_debuggee("ISA.exe", 9001),
    );
    let mut fixture = start(vec![project("ISA", true, true)], ide);
    fixture.adapter.push_instruction(windowed(0x100));
    // mock pids are deterministic, the first spawn gets 3000
    fixture
        .windows
        .add_window(3000, crate::window::WindowHandle(0x100));

    fixture.handle.run_and_attach().await.unwrap();
    wait_for_state(&fixture, FleetState::Running).await;

    let spawned = fixture.adapter.spawned();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].0, "ISA");
    assert_eq!(spawned[0].1, 3000);
    assert_eq!(fixture.ide.attached_pids(), vec![9001]);
    assert_eq!(
        fixture.windows.pinned(),
        vec![crate::window::WindowHandle(0x100)]
    );

    let events = drain(&mut fixture.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, FleetEvent::BuildFinished { success: true, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        FleetEvent::ProcessStarted { project, .. } if project == "ISA"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        FleetEvent::DebuggerAttached { process_name, .. } if process_name == "ISA"
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, FleetEvent::WindowsTiled { project, .. } if project == "ISA")));

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_attach_subset_exactness() {
    let ide = Arc::new(
        MockIde::new(r"C:\src\AllApps.sln").with_debuggee("ISA.exe", 9001),
    );
    let mut fixture = start(
        vec![
            project("ISA", true, true),
            project("MDA", true, false),
            project("OGA", false, false),
        ],
        ide,
    );
    fixture
        .adapter
        .push_instruction(windowed(0x100));
    fixture
        .adapter
        .push_instruction(windowed(0x200));

    fixture.handle.run_and_attach().await.unwrap();
    wait_for_state(&fixture, FleetState::Running).await;

    let names: Vec<String> = fixture
        .adapter
        .spawned()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["ISA", "MDA"]);
    // only the attach subset reached the debugger
    assert_eq!(fixture.ide.attached_pids().len(), 1);

    let events = drain(&mut fixture.events);
    assert!(!events.iter().any(|e| matches!(
        e,
        FleetEvent::AttachSkipped { process_name, .. } if process_name == "ModelDevApp"
    )));

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_build_failure_spawns_nothing_and_reopens_gate() {
    let ide = Arc::new(
        MockIde::new(r"C:\src\AllApps.sln")
            .with_build_error_count(3)
            .with_project_result("ModelDevApp", false),
    );
    let mut fixture = start(vec![project("ISA", true, true)], ide);

    fixture.handle.run_and_attach().await.unwrap();
    let _ = fixture.handle.projects().await.unwrap();

    assert_eq!(fixture.handle.current_state(), FleetState::Idle);
    assert!(fixture.adapter.spawned().is_empty());

    let events = drain(&mut fixture.events);
    assert!(events.iter().any(|e| matches!(
        e,
        FleetEvent::Warning { message, .. } if message == "Build failed, project: ModelDevApp"
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, FleetEvent::BuildFinished { success: false, .. })));

    // the gate reopened; another attempt is accepted and processed
    fixture.handle.run_and_attach().await.unwrap();
    let _ = fixture.handle.projects().await.unwrap();
    assert_eq!(fixture.handle.current_state(), FleetState::Idle);

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_solution_aborts_with_warning() {
    let adapter = Arc::new(MockProcessAdapter::new());
    let registry = Arc::new(MockRegistry::new());
    let handle = spawn_orchestrator(
        SOLUTION,
        vec![project("ISA", true, true)],
        Arc::clone(&adapter) as Arc<dyn ProcessAdapter>,
        registry,
        Box::new(crate::window::NullWindowSystem),
    );
    let mut events = handle.subscribe_events();

    handle.run_and_attach().await.unwrap();
    let _ = handle.projects().await.unwrap();

    assert_eq!(handle.current_state(), FleetState::Idle);
    assert!(adapter.spawned().is_empty());
    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        FleetEvent::Warning { code, .. } if code.as_deref() == Some("SOLUTION_NOT_FOUND")
    )));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unexpected_exit_tears_down_whole_fleet() {
    let ide = Arc::new(
        MockIde::new(r"C:\src\AllApps.sln").with_debuggee("ISA.exe", 9001),
    );
    let mut fixture = start(
        vec![project("ISA", true, true), project("MDA", true, false)],
        ide,
    );
    fixture
        .adapter
        .push_instruction(windowed(0x100));
    fixture
        .adapter
        .push_instruction(windowed(0x200));

    fixture.handle.run_and_attach().await.unwrap();
    wait_for_state(&fixture, FleetState::Running).await;

    let spawned = fixture.adapter.spawned();
    let (isa_pid, mda_pid) = (spawned[0].1, spawned[1].1);
    fixture.adapter.exit_process(isa_pid, 3);

    wait_for_state(&fixture, FleetState::Idle).await;

    // the surviving worker was torn down too
    assert!(fixture.adapter.close_requests(mda_pid) >= 1);
    // the active debug session was terminated
    assert_eq!(fixture.ide.terminate_calls(), 1);

    let events = drain(&mut fixture.events);
    let exited: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            FleetEvent::ProcessExited { exit_info, .. } => Some(exit_info.pid),
            _ => None,
        })
        .collect();
    assert!(exited.contains(&isa_pid));
    assert!(exited.contains(&mda_pid));
    assert!(events
        .iter()
        .any(|e| matches!(e, FleetEvent::DebugSessionTerminated { .. })));

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_kills_workers_that_ignore_graceful_close() {
    let ide = Arc::new(MockIde::new(r"C:\src\AllApps.sln"));
    let fixture = start(vec![project("ISA", true, false)], ide);
    fixture.adapter.push_instruction(MockInstruction {
        ignore_close: true,
        main_window: Some(0x100),
        ..Default::default()
    });

    fixture.handle.run_and_attach().await.unwrap();
    wait_for_state(&fixture, FleetState::Running).await;
    let pid = fixture.adapter.spawned()[0].1;

    fixture.handle.stop().await.unwrap();
    wait_for_state(&fixture, FleetState::Idle).await;

    assert!(fixture.adapter.close_requests(pid) >= 1);
    assert!(fixture.adapter.was_killed(pid));

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_idempotent_when_idle() {
    let ide = Arc::new(MockIde::new(r"C:\src\AllApps.sln"));
    let mut fixture = start(vec![project("ISA", true, false)], ide);

    fixture.handle.stop().await.unwrap();
    fixture.handle.stop().await.unwrap();
    let _ = fixture.handle.projects().await.unwrap();

    assert_eq!(fixture.handle.current_state(), FleetState::Idle);
    let events = drain(&mut fixture.events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, FleetEvent::StateChanged { .. })));

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_never_overlaps_fleets() {
    let ide = Arc::new(MockIde::new(r"C:\src\AllApps.sln"));
    let mut fixture = start(vec![project("ISA", true, false)], ide);
    fixture
        .adapter
        .push_instruction(windowed(0x100));
    fixture
        .adapter
        .push_instruction(windowed(0x200));

    fixture.handle.run_and_attach().await.unwrap();
    wait_for_state(&fixture, FleetState::Running).await;
    let first_pid = fixture.adapter.spawned()[0].1;

    fixture.handle.restart_all().await.unwrap();
    let _ = fixture.handle.projects().await.unwrap();
    wait_for_state(&fixture, FleetState::Running).await;

    let spawned = fixture.adapter.spawned();
    assert_eq!(spawned.len(), 2);
    let second_pid = spawned[1].1;
    assert_ne!(first_pid, second_pid);

    // the first worker was fully down before the second came up
    let events = drain(&mut fixture.events);
    let exit_index = events
        .iter()
        .position(|e| matches!(e, FleetEvent::ProcessExited { exit_info, .. } if exit_info.pid == first_pid))
        .expect("first worker exit");
    let start_index = events
        .iter()
        .position(|e| matches!(e, FleetEvent::ProcessStarted { pid, .. } if *pid == second_pid))
        .expect("second worker start");
    assert!(exit_index < start_index);

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_debugger_stop_from_ide_tears_down() {
    let ide = Arc::new(
        MockIde::new(r"C:\src\AllApps.sln").with_debuggee("ISA.exe", 9001),
    );
    let fixture = start(vec![project("ISA", true, true)], ide);
    fixture
        .adapter
        .push_instruction(windowed(0x100));

    fixture.handle.run_and_attach().await.unwrap();
    wait_for_state(&fixture, FleetState::Running).await;
    let pid = fixture.adapter.spawned()[0].1;

    fixture
        .ide
        .emit_debugger_event(crate::ide::DebuggerEvent::EnteredDesignMode {
            reason: crate::ide::DesignModeReason::StopDebugging,
        });
    wait_for_state(&fixture, FleetState::Idle).await;

    assert!(fixture.adapter.close_requests(pid) >= 1);

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stale_debugger_stop_does_not_kill_next_fleet() {
    let ide = Arc::new(
        MockIde::new(r"C:\src\AllApps.sln").with_debuggee("ISA.exe", 9001),
    );
    let fixture = start(vec![project("ISA", true, true)], ide);
    fixture.adapter.push_instruction(windowed(0x100));
    fixture.adapter.push_instruction(windowed(0x200));

    fixture.handle.run_and_attach().await.unwrap();
    wait_for_state(&fixture, FleetState::Running).await;

    // an IDE-side stop racing an explicit stop can leave the debugger
    // signal queued behind the teardown
    fixture
        .ide
        .emit_debugger_event(crate::ide::DebuggerEvent::EnteredDesignMode {
            reason: crate::ide::DesignModeReason::StopDebugging,
        });
    fixture.handle.stop().await.unwrap();
    wait_for_state(&fixture, FleetState::Idle).await;

    fixture.handle.run_and_attach().await.unwrap();
    wait_for_state(&fixture, FleetState::Running).await;

    // the leftover signal must not tear the new fleet down
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fixture.handle.current_state(), FleetState::Running);
    assert_eq!(fixture.adapter.spawned().len(), 2);

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_flag_updates_through_handle() {
    let ide = Arc::new(MockIde::new(r"C:\src\AllApps.sln"));
    let fixture = start(
        vec![project("ISA", false, false), project("MDA", true, true)],
        ide,
    );

    fixture.handle.set_attach("ISA", true).await.unwrap();
    fixture.handle.set_run("MDA", false).await.unwrap();

    let projects = fixture.handle.projects().await.unwrap();
    let isa = projects.iter().find(|p| p.name() == "ISA").unwrap();
    assert!(isa.run() && isa.attach());
    let mda = projects.iter().find(|p| p.name() == "MDA").unwrap();
    assert!(!mda.run() && !mda.attach());

    fixture.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_spawn_failure_warns_and_continues() {
    let ide = Arc::new(MockIde::new(r"C:\src\AllApps.sln"));
    let mut fixture = start(
        vec![project("ISA", true, false), project("MDA", true, false)],
        ide,
    );
    fixture.adapter.push_instruction(MockInstruction {
        fail_spawn: true,
        ..Default::default()
    });
    fixture
        .adapter
        .push_instruction(windowed(0x200));

    fixture.handle.run_and_attach().await.unwrap();
    wait_for_state(&fixture, FleetState::Running).await;

    let spawned = fixture.adapter.spawned();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].0, "MDA");

    let events = drain(&mut fixture.events);
    assert!(events.iter().any(|e| matches!(
        e,
        FleetEvent::Warning { message, code, .. }
            if message.contains("'ISA'") && code.as_deref() == Some("LAUNCH_FAILED")
    )));

    fixture.handle.shutdown().await.unwrap();
}
