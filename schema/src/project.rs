//! Fleet member and orchestrator state types
//!
//! A [`Project`] describes one member of the fleet: its identity (name and
//! executable path) is fixed at configuration time, while the `run` and
//! `attach` flags may be toggled between orchestration cycles. The two flags
//! carry a bidirectional invariant: a project marked for debugger attachment
//! must also be marked to run, so enabling `attach` enables `run` and
//! disabling `run` disables `attach`.
//!
//! ## Orchestrator lifecycle
//!
//! The fleet as a whole progresses through the following states:
//! - `Idle`: no cycle active, new launches are accepted
//! - `Launching`: build, spawn, attach, and tiling are in progress
//! - `Running`: the fleet is up and monitored for unexpected exits
//! - `Stopping`: fleet-wide teardown is in progress

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One member of the fleet
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Short display name (e.g. "ISA")
    name: String,

    /// Absolute path to the executable
    executable_path: PathBuf,

    /// Optional display color as `#AARRGGBB` hex, consumed by presentation
    /// collaborators only
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,

    /// Whether this project is launched during a cycle
    #[serde(default)]
    run: bool,

    /// Whether the debugger is attached to this project's process
    #[serde(default)]
    attach: bool,
}

impl Project {
    /// Create a new project with both flags cleared
    pub fn new(name: impl Into<String>, executable_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable_path: executable_path.into(),
            color: None,
            run: false,
            attach: false,
        }
    }

    /// Create a new project with a display color
    pub fn with_color(
        name: impl Into<String>,
        executable_path: impl Into<PathBuf>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            color: Some(color.into()),
            ..Self::new(name, executable_path)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    /// The executable's file name, used to identify the process for
    /// debugger attachment
    pub fn executable_file_name(&self) -> String {
        self.executable_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    pub fn run(&self) -> bool {
        self.run
    }

    pub fn attach(&self) -> bool {
        self.attach
    }

    /// Set the run flag. Clearing it also clears `attach`.
    pub fn set_run(&mut self, run: bool) {
        self.run = run;
        if !run {
            self.attach = false;
        }
    }

    /// Set the attach flag. Setting it also sets `run`.
    pub fn set_attach(&mut self, attach: bool) {
        self.attach = attach;
        if attach {
            self.run = true;
        }
    }

    /// Re-establish the attach-implies-run invariant after deserialization
    /// of raw flag values
    pub fn normalize(&mut self) {
        if self.attach {
            self.run = true;
        }
    }
}

/// Current state of the fleet orchestrator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FleetState {
    /// No cycle active; launches are accepted
    Idle,
    /// Build, spawn, attach, and tiling are in progress
    Launching,
    /// The fleet is up and monitored for exits
    Running,
    /// Fleet-wide teardown is in progress
    Stopping,
}

impl FleetState {
    /// The gate: a new orchestration cycle may only start while idle
    pub fn can_run_and_attach(&self) -> bool {
        matches!(self, FleetState::Idle)
    }

    /// Check if a cycle is active in any form
    pub fn is_active(&self) -> bool {
        !matches!(self, FleetState::Idle)
    }
}

/// Information about a worker process exit
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExit {
    /// Process ID that exited
    pub pid: u32,

    /// Exit code (None if killed by signal)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Signal that killed the process (Unix only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,

    /// Timestamp when the exit was observed, RFC3339
    pub timestamp: String,
}

impl ProcessExit {
    /// Check if this represents a successful exit (code 0)
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Check if this represents a failure (non-zero exit code or signal)
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}
