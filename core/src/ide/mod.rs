//! IDE automation boundary
//!
//! The orchestrator drives an externally running IDE instance through a
//! small automation surface: query the open solution, trigger a build,
//! attach the debugger, and terminate a debug session. The IDE advertises
//! its automation object through an OS-level live-object registry whose
//! entry display names encode the owning process id.
//!
//! Both sides of the boundary are traits so the engine can be exercised
//! against scripted mocks:
//!
//! - [`AutomationRegistry`]: process enumeration + live-object registry
//! - [`IdeAutomation`]: one bound automation handle
//!
//! The automation layer can throw spuriously while the IDE is mid-transition,
//! so every call through these traits is wrapped in the transient retry
//! policy by the callers in [`locator`] and [`attacher`].

use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

pub mod attacher;
pub mod locator;

pub use attacher::{DebugAttacher, DebuggerStop};
pub use locator::{IdeSession, IdeSessionLocator};

/// Executable name of the IDE process, without extension
pub const IDE_PROCESS_NAME: &str = "devenv";

/// Debugger mode of a bound IDE instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerMode {
    /// Idle, no debuggee (design mode)
    Design,
    /// Actively debugging
    Run,
    /// Stopped at a breakpoint
    Break,
}

/// Reason the debugger entered design mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignModeReason {
    /// The user stopped debugging from the IDE
    StopDebugging,
    /// A debuggee was detached
    Detach,
    /// Any other transition
    Other,
}

/// Debugger-mode-change notifications from the IDE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerEvent {
    /// The debugger returned to design (idle) mode
    EnteredDesignMode { reason: DesignModeReason },
}

/// Per-project build progress notifications from the IDE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// One project configuration finished building
    ProjectDone { project: String, success: bool },
}

/// A process the IDE's debugger can attach to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggeeInfo {
    /// Process name as reported by the debugger (usually the executable
    /// file name)
    pub name: String,
    /// Process ID
    pub pid: u32,
}

/// One entry of the live-object registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Moniker display name, e.g. `!VisualStudio.DTE.17.0:1234`
    pub display_name: String,
}

/// A bound IDE automation handle
///
/// The handle is a borrowed external resource: the IDE process owns the
/// underlying object, and a holder must re-locate rather than outlive it.
#[async_trait]
pub trait IdeAutomation: Send + Sync {
    /// Full path of the solution currently open in this IDE instance
    async fn solution_path(&self) -> Result<String>;

    /// Trigger a synchronous solution build
    async fn build_solution(&self) -> Result<()>;

    /// Error count of the last completed build
    async fn last_build_error_count(&self) -> Result<u32>;

    /// Enumerate the processes the debugger can attach to locally
    async fn debuggable_processes(&self) -> Result<Vec<DebuggeeInfo>>;

    /// Attach the debugger to the given process
    async fn attach_to(&self, pid: u32) -> Result<()>;

    /// Current debugger mode
    async fn debugger_mode(&self) -> Result<DebuggerMode>;

    /// Terminate all debuggees
    async fn terminate_all_debuggees(&self) -> Result<()>;

    /// Subscribe to per-project build completion notifications
    fn subscribe_build_events(&self) -> broadcast::Receiver<BuildEvent>;

    /// Subscribe to debugger-mode-change notifications
    fn subscribe_debugger_events(&self) -> broadcast::Receiver<DebuggerEvent>;
}

/// Process enumeration plus the live-object registry
#[async_trait]
pub trait AutomationRegistry: Send + Sync {
    /// Process ids of all running IDE instances
    async fn ide_process_ids(&self) -> Result<Vec<u32>>;

    /// All currently advertised live-object entries
    async fn running_entries(&self) -> Result<Vec<RegistryEntry>>;

    /// Bind an entry to an automation handle
    async fn bind(&self, entry: &RegistryEntry) -> Result<Arc<dyn IdeAutomation>>;
}

/// Registry for platforms without a live-object registry: no IDE instances
/// are ever found, so attach-enabled launches abort with the
/// solution-not-found warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAutomationRegistry;

#[async_trait]
impl AutomationRegistry for NullAutomationRegistry {
    async fn ide_process_ids(&self) -> Result<Vec<u32>> {
        Ok(Vec::new())
    }

    async fn running_entries(&self) -> Result<Vec<RegistryEntry>> {
        Ok(Vec::new())
    }

    async fn bind(&self, entry: &RegistryEntry) -> Result<Arc<dyn IdeAutomation>> {
        Err(crate::CoreError::automation(format!(
            "No automation registry on this platform (entry '{}')",
            entry.display_name
        )))
    }
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    //! Scripted mock implementations of the automation boundary

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted IDE automation handle for tests
    pub struct MockIde {
        solution_path: String,
        /// Number of leading `solution_path` calls that fail transiently
        solution_path_failures: AtomicU32,
        /// Error count reported after the build completes
        build_error_count: u32,
        /// Per-project build results emitted when the build is triggered
        project_results: Vec<(String, bool)>,
        debuggees: Vec<DebuggeeInfo>,
        attached: Mutex<Vec<u32>>,
        mode: Mutex<DebuggerMode>,
        terminate_calls: AtomicUsize,
        build_tx: broadcast::Sender<BuildEvent>,
        debugger_tx: broadcast::Sender<DebuggerEvent>,
    }

    impl MockIde {
        pub fn new(solution_path: impl Into<String>) -> Self {
            let (build_tx, _) = broadcast::channel(64);
            let (debugger_tx, _) = broadcast::channel(64);
            Self {
                solution_path: solution_path.into(),
                solution_path_failures: AtomicU32::new(0),
                build_error_count: 0,
                project_results: Vec::new(),
                debuggees: Vec::new(),
                attached: Mutex::new(Vec::new()),
                mode: Mutex::new(DebuggerMode::Design),
                terminate_calls: AtomicUsize::new(0),
                build_tx,
                debugger_tx,
            }
        }

        /// Make the first `count` solution-path reads fail transiently
        pub fn with_solution_path_failures(self, count: u32) -> Self {
            self.solution_path_failures.store(count, Ordering::SeqCst);
            self
        }

        pub fn with_build_error_count(mut self, count: u32) -> Self {
            self.build_error_count = count;
            self
        }

        pub fn with_project_result(mut self, project: impl Into<String>, success: bool) -> Self {
            self.project_results.push((project.into(), success));
            self
        }

        pub fn with_debuggee(mut self, name: impl Into<String>, pid: u32) -> Self {
            self.debuggees.push(DebuggeeInfo {
                name: name.into(),
                pid,
            });
            self
        }

        /// Pids the debugger attached to so far
        pub fn attached_pids(&self) -> Vec<u32> {
            self.attached.lock().unwrap().clone()
        }

        pub fn terminate_calls(&self) -> usize {
            self.terminate_calls.load(Ordering::SeqCst)
        }

        pub fn set_mode(&self, mode: DebuggerMode) {
            *self.mode.lock().unwrap() = mode;
        }

        /// Inject a debugger-mode-change notification
        pub fn emit_debugger_event(&self, event: DebuggerEvent) {
            let _ = self.debugger_tx.send(event);
        }
    }

    #[async_trait]
    impl IdeAutomation for MockIde {
        async fn solution_path(&self) -> Result<String> {
            let remaining = self.solution_path_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.solution_path_failures
                    .store(remaining - 1, Ordering::SeqCst);
                return Err(crate::CoreError::transient_automation(
                    "solution unavailable mid-transition",
                ));
            }
            Ok(self.solution_path.clone())
        }

        async fn build_solution(&self) -> Result<()> {
            for (project, success) in &self.project_results {
                let _ = self.build_tx.send(BuildEvent::ProjectDone {
                    project: project.clone(),
                    success: *success,
                });
            }
            Ok(())
        }

        async fn last_build_error_count(&self) -> Result<u32> {
            Ok(self.build_error_count)
        }

        async fn debuggable_processes(&self) -> Result<Vec<DebuggeeInfo>> {
            Ok(self.debuggees.clone())
        }

        async fn attach_to(&self, pid: u32) -> Result<()> {
            self.attached.lock().unwrap().push(pid);
            *self.mode.lock().unwrap() = DebuggerMode::Run;
            Ok(())
        }

        async fn debugger_mode(&self) -> Result<DebuggerMode> {
            Ok(*self.mode.lock().unwrap())
        }

        async fn terminate_all_debuggees(&self) -> Result<()> {
            self.terminate_calls.fetch_add(1, Ordering::SeqCst);
            *self.mode.lock().unwrap() = DebuggerMode::Design;
            Ok(())
        }

        fn subscribe_build_events(&self) -> broadcast::Receiver<BuildEvent> {
            self.build_tx.subscribe()
        }

        fn subscribe_debugger_events(&self) -> broadcast::Receiver<DebuggerEvent> {
            self.debugger_tx.subscribe()
        }
    }

    /// Scripted registry mapping moniker display names to mock IDE handles
    #[derive(Default)]
    pub struct MockRegistry {
        pids: Vec<u32>,
        entries: Vec<RegistryEntry>,
        handles: HashMap<String, Arc<MockIde>>,
        bind_calls: AtomicUsize,
    }

    impl MockRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a running IDE instance with its automation handle,
        /// advertised under the canonical moniker display name for `pid`
        pub fn with_ide(mut self, pid: u32, ide: Arc<MockIde>) -> Self {
            let display_name = format!("!VisualStudio.DTE.17.0:{}", pid);
            self.pids.push(pid);
            self.entries.push(RegistryEntry {
                display_name: display_name.clone(),
            });
            self.handles.insert(display_name, ide);
            self
        }

        /// Register an unrelated registry entry (never binds to an IDE)
        pub fn with_stray_entry(mut self, display_name: impl Into<String>) -> Self {
            self.entries.push(RegistryEntry {
                display_name: display_name.into(),
            });
            self
        }

        pub fn bind_calls(&self) -> usize {
            self.bind_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AutomationRegistry for MockRegistry {
        async fn ide_process_ids(&self) -> Result<Vec<u32>> {
            Ok(self.pids.clone())
        }

        async fn running_entries(&self) -> Result<Vec<RegistryEntry>> {
            Ok(self.entries.clone())
        }

        async fn bind(&self, entry: &RegistryEntry) -> Result<Arc<dyn IdeAutomation>> {
            self.bind_calls.fetch_add(1, Ordering::SeqCst);
            self.handles
                .get(&entry.display_name)
                .cloned()
                .map(|ide| ide as Arc<dyn IdeAutomation>)
                .ok_or_else(|| {
                    crate::CoreError::automation(format!(
                        "No object registered for '{}'",
                        entry.display_name
                    ))
                })
        }
    }
}
