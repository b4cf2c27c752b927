//! Worker process boundary
//!
//! The orchestrator spawns and tears down worker processes through the
//! [`ProcessAdapter`] trait. The native implementation in [`native`] wraps
//! `tokio::process`; tests run against [`mock::MockProcessAdapter`], whose
//! per-spawn instructions script spawn failures, immediate exits, and
//! workers that ignore the graceful close request.

use crate::window::WindowHandle;
use crate::Result;
use async_trait::async_trait;
use schema::Project;

pub mod native;

pub use native::NativeProcessAdapter;

/// Spawns worker processes
#[async_trait]
pub trait ProcessAdapter: Send + Sync {
    /// Launch the project's executable. The working directory is the
    /// executable's parent directory.
    async fn spawn(&self, project: &Project) -> Result<Box<dyn WorkerProcess>>;
}

/// One spawned worker process
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id
    fn pid(&self) -> u32;

    /// Non-blocking exit check. Keeps returning the same exit info once the
    /// process has exited.
    async fn try_wait(&mut self) -> Result<Option<schema::ProcessExit>>;

    /// Wait until the process is ready for interaction (has finished its
    /// startup message-loop initialization, where the platform can tell)
    async fn wait_for_input_idle(&mut self) -> Result<()>;

    /// The process's main window, if it has created one yet
    fn main_window(&self) -> Result<Option<WindowHandle>>;

    /// Ask the process to close gracefully. Returns false when the request
    /// could not be delivered.
    async fn close_main_window(&mut self) -> Result<bool>;

    /// Forcefully terminate the process
    async fn kill(&mut self) -> Result<()>;
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::*;
    use schema::ProcessExit;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted behavior for the next spawned process
    #[derive(Debug, Clone, Default)]
    pub struct MockInstruction {
        /// Fail the spawn itself
        pub fail_spawn: bool,
        /// Exit with this code immediately after spawn
        pub exit_immediately: Option<i32>,
        /// Do not exit when asked to close gracefully
        pub ignore_close: bool,
        /// Main window handle reported once input-idle completes
        pub main_window: Option<u64>,
    }

    #[derive(Debug, Default)]
    struct ProcState {
        exit: Option<ProcessExit>,
        close_requests: u32,
        killed: bool,
    }

    /// Process adapter with a per-spawn instruction queue and shared state
    /// the test can inspect and poke
    #[derive(Default)]
    pub struct MockProcessAdapter {
        instructions: Mutex<Vec<MockInstruction>>,
        next_pid: AtomicU32,
        states: Mutex<HashMap<u32, Arc<Mutex<ProcState>>>>,
        spawned: Mutex<Vec<(String, u32)>>,
    }

    impl MockProcessAdapter {
        pub fn new() -> Self {
            Self {
                next_pid: AtomicU32::new(3000),
                ..Self::default()
            }
        }

        /// Queue the behavior for the next spawn. Spawns beyond the queue
        /// get default behavior.
        pub fn push_instruction(&self, instruction: MockInstruction) {
            self.instructions.lock().unwrap().push(instruction);
        }

        /// Project names and pids in spawn order
        pub fn spawned(&self) -> Vec<(String, u32)> {
            self.spawned.lock().unwrap().clone()
        }

        /// Simulate the process exiting on its own
        pub fn exit_process(&self, pid: u32, code: i32) {
            if let Some(state) = self.states.lock().unwrap().get(&pid) {
                let mut state = state.lock().unwrap();
                if state.exit.is_none() {
                    state.exit = Some(ProcessExit {
                        pid,
                        exit_code: Some(code),
                        signal: None,
                        timestamp: schema::FleetEvent::current_timestamp(),
                    });
                }
            }
        }

        pub fn close_requests(&self, pid: u32) -> u32 {
            self.states
                .lock()
                .unwrap()
                .get(&pid)
                .map(|s| s.lock().unwrap().close_requests)
                .unwrap_or(0)
        }

        pub fn was_killed(&self, pid: u32) -> bool {
            self.states
                .lock()
                .unwrap()
                .get(&pid)
                .map(|s| s.lock().unwrap().killed)
                .unwrap_or(false)
        }
    }

    #[async_trait]
    impl ProcessAdapter for MockProcessAdapter {
        async fn spawn(&self, project: &Project) -> Result<Box<dyn WorkerProcess>> {
            let instruction = {
                let mut queue = self.instructions.lock().unwrap();
                if queue.is_empty() {
                    MockInstruction::default()
                } else {
                    queue.remove(0)
                }
            };

            if instruction.fail_spawn {
                return Err(crate::CoreError::ProcessError(format!(
                    "Failed to spawn '{}'",
                    project.name()
                )));
            }

            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            let state = Arc::new(Mutex::new(ProcState::default()));
            if let Some(code) = instruction.exit_immediately {
                state.lock().unwrap().exit = Some(ProcessExit {
                    pid,
                    exit_code: Some(code),
                    signal: None,
                    timestamp: schema::FleetEvent::current_timestamp(),
                });
            }
            self.states.lock().unwrap().insert(pid, Arc::clone(&state));
            self.spawned
                .lock()
                .unwrap()
                .push((project.name().to_string(), pid));

            Ok(Box::new(MockProcess {
                pid,
                state,
                ignore_close: instruction.ignore_close,
                main_window: instruction.main_window,
            }))
        }
    }

    struct MockProcess {
        pid: u32,
        state: Arc<Mutex<ProcState>>,
        ignore_close: bool,
        main_window: Option<u64>,
    }

    #[async_trait]
    impl WorkerProcess for MockProcess {
        fn pid(&self) -> u32 {
            self.pid
        }

        async fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
            Ok(self.state.lock().unwrap().exit.clone())
        }

        async fn wait_for_input_idle(&mut self) -> Result<()> {
            Ok(())
        }

        fn main_window(&self) -> Result<Option<WindowHandle>> {
            Ok(self.main_window.map(WindowHandle))
        }

        async fn close_main_window(&mut self) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            state.close_requests += 1;
            if state.exit.is_some() {
                return Ok(false);
            }
            if !self.ignore_close {
                state.exit = Some(ProcessExit {
                    pid: self.pid,
                    exit_code: Some(0),
                    signal: None,
                    timestamp: schema::FleetEvent::current_timestamp(),
                });
            }
            Ok(true)
        }

        async fn kill(&mut self) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.killed = true;
            if state.exit.is_none() {
                state.exit = Some(ProcessExit {
                    pid: self.pid,
                    exit_code: None,
                    signal: Some(9),
                    timestamp: schema::FleetEvent::current_timestamp(),
                });
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn project(name: &str) -> Project {
            let mut p = Project::new(name, format!("/fleet/bin/{}", name));
            p.set_run(true);
            p
        }

        #[tokio::test]
        async fn test_spawn_assigns_unique_pids() {
            let adapter = MockProcessAdapter::new();
            let a = adapter.spawn(&project("A")).await.unwrap();
            let b = adapter.spawn(&project("B")).await.unwrap();
            assert_ne!(a.pid(), b.pid());
            assert_eq!(
                adapter.spawned().iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
                vec!["A", "B"]
            );
        }

        #[tokio::test]
        async fn test_graceful_close_exits_cleanly() {
            let adapter = MockProcessAdapter::new();
            let mut proc = adapter.spawn(&project("A")).await.unwrap();
            assert!(proc.try_wait().await.unwrap().is_none());

            assert!(proc.close_main_window().await.unwrap());
            let exit = proc.try_wait().await.unwrap().unwrap();
            assert!(exit.is_success());
            // exit info is stable across repeated polls
            assert_eq!(proc.try_wait().await.unwrap(), Some(exit));
        }

        #[tokio::test]
        async fn test_stubborn_process_needs_kill() {
            let adapter = MockProcessAdapter::new();
            adapter.push_instruction(MockInstruction {
                ignore_close: true,
                ..Default::default()
            });
            let mut proc = adapter.spawn(&project("A")).await.unwrap();

            proc.close_main_window().await.unwrap();
            assert!(proc.try_wait().await.unwrap().is_none());

            proc.kill().await.unwrap();
            let exit = proc.try_wait().await.unwrap().unwrap();
            assert_eq!(exit.signal, Some(9));
            assert!(adapter.was_killed(proc.pid()));
        }
    }
}
