//! Window tiling for launched workers
//!
//! After a worker's main window appears, every top-level window owned by its
//! process is pinned into the project's screen slot: topmost in the z-order,
//! but never moved, resized, or activated. The window system itself is a
//! trait so the engine runs against a scripted mock in tests and a null
//! implementation on headless platforms.

use crate::Result;
use schema::FleetEvent;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Opaque handle to a top-level window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Minimal window-system surface used by the tiler
pub trait WindowSystem: Send + Sync {
    /// All top-level windows owned by the given process
    fn windows_of_process(&self, pid: u32) -> Result<Vec<WindowHandle>>;

    /// Pin a window to the top of the z-order without moving, resizing, or
    /// activating it
    fn pin_topmost(&self, window: WindowHandle) -> Result<()>;
}

/// Window system for headless platforms: no windows, pinning is an error
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWindowSystem;

impl WindowSystem for NullWindowSystem {
    fn windows_of_process(&self, _pid: u32) -> Result<Vec<WindowHandle>> {
        Ok(Vec::new())
    }

    fn pin_topmost(&self, window: WindowHandle) -> Result<()> {
        Err(crate::CoreError::WindowError(format!(
            "No window system on this platform (handle {:#x})",
            window.0
        )))
    }
}

/// Pins worker windows into their slots, best-effort
pub struct WindowTiler {
    system: Box<dyn WindowSystem>,
    event_tx: broadcast::Sender<FleetEvent>,
}

impl WindowTiler {
    pub fn new(system: Box<dyn WindowSystem>, event_tx: broadcast::Sender<FleetEvent>) -> Self {
        Self { system, event_tx }
    }

    /// Pin every top-level window of `pid`, returning the handles actually
    /// pinned. A window that fails to pin is skipped; the launch continues
    /// either way. Emits a tiling event with the pinned count.
    pub fn position_windows(&self, project: &str, pid: u32) -> Vec<WindowHandle> {
        let windows = match self.system.windows_of_process(pid) {
            Ok(windows) => windows,
            Err(e) => {
                debug!(project, pid, error = %e, "Window enumeration unavailable");
                return Vec::new();
            }
        };

        let mut pinned = Vec::with_capacity(windows.len());
        for window in &windows {
            match self.system.pin_topmost(*window) {
                Ok(()) => pinned.push(*window),
                Err(e) => {
                    warn!(project, pid, handle = window.0, error = %e, "Failed to pin window");
                }
            }
        }

        debug!(project, pid, pinned = pinned.len(), total = windows.len(), "Windows tiled");
        let _ = self.event_tx.send(FleetEvent::windows_tiled(
            project.to_string(),
            pid,
            pinned.len(),
        ));
        pinned
    }
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted window system recording pin calls
    #[derive(Default)]
    pub struct MockWindowSystem {
        windows: Mutex<HashMap<u32, Vec<WindowHandle>>>,
        failing: Mutex<Vec<WindowHandle>>,
        pinned: Mutex<Vec<WindowHandle>>,
    }

    impl MockWindowSystem {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_window(&self, pid: u32, handle: WindowHandle) {
            self.windows.lock().unwrap().entry(pid).or_default().push(handle);
        }

        /// Make pinning this handle fail
        pub fn fail_pin(&self, handle: WindowHandle) {
            self.failing.lock().unwrap().push(handle);
        }

        pub fn pinned(&self) -> Vec<WindowHandle> {
            self.pinned.lock().unwrap().clone()
        }
    }

    // lets a test keep a handle while the tiler owns the system
    impl WindowSystem for std::sync::Arc<MockWindowSystem> {
        fn windows_of_process(&self, pid: u32) -> Result<Vec<WindowHandle>> {
            self.as_ref().windows_of_process(pid)
        }

        fn pin_topmost(&self, window: WindowHandle) -> Result<()> {
            self.as_ref().pin_topmost(window)
        }
    }

    impl WindowSystem for MockWindowSystem {
        fn windows_of_process(&self, pid: u32) -> Result<Vec<WindowHandle>> {
            Ok(self
                .windows
                .lock()
                .unwrap()
                .get(&pid)
                .cloned()
                .unwrap_or_default())
        }

        fn pin_topmost(&self, window: WindowHandle) -> Result<()> {
            if self.failing.lock().unwrap().contains(&window) {
                return Err(crate::CoreError::WindowError(format!(
                    "pin rejected for {:#x}",
                    window.0
                )));
            }
            self.pinned.lock().unwrap().push(window);
            Ok(())
        }
    }
}
