//! Event system for the devfleet orchestrator
//!
//! This module defines the event types broadcast by the orchestrator to
//! provide observability into launch cycles, build outcomes, debugger
//! attachment, window tiling, and teardown.
//!
//! Events are serializable and can be rendered by a UI collaborator, logged
//! to structured log files, or consumed by tests. The `Warning` variant is
//! the single user-facing notification channel: everything else is internal
//! observability.

use crate::project::{FleetState, ProcessExit};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Events emitted by the fleet orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "eventType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FleetEvent {
    /// Orchestrator state has changed
    StateChanged {
        /// Previous state
        from_state: FleetState,
        /// New state
        to_state: FleetState,
        /// Event timestamp in RFC3339 format
        timestamp: String,
        /// Optional reason for the transition
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Solution build finished
    BuildFinished {
        /// Target solution name
        solution: String,
        /// Whether the aggregate build had zero errors
        success: bool,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// A worker process has been launched
    ProcessStarted {
        /// Fleet member name
        project: String,
        /// Process ID of the launched worker
        pid: u32,
        /// Executable that was started
        command: String,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// A tracked worker process has exited
    ProcessExited {
        /// Fleet member name
        project: String,
        /// Exit information
        exit_info: ProcessExit,
    },

    /// The debugger was attached to a worker process
    DebuggerAttached {
        /// Process name that was matched
        process_name: String,
        /// Process ID attached to
        pid: u32,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// No debuggable process matched the requested name; attachment skipped
    AttachSkipped {
        /// Process name that had no match
        process_name: String,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// Windows of a worker process were pinned into the tiling slot
    WindowsTiled {
        /// Fleet member name
        project: String,
        /// Owning process ID
        pid: u32,
        /// Number of top-level windows repositioned
        window_count: usize,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// The active debug session was terminated
    DebugSessionTerminated {
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// A warning condition to surface to the user
    Warning {
        /// Human-readable warning message
        message: String,
        /// Event timestamp in RFC3339 format
        timestamp: String,
        /// Optional warning code for categorization
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

/// Event severity level for filtering and rendering
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord,
)]
#[serde(rename_all = "camelCase")]
pub enum EventSeverity {
    /// Debug information
    Debug,
    /// Informational events
    Info,
    /// Warning conditions
    Warning,
    /// Error conditions
    Error,
}

impl FleetEvent {
    /// Get the timestamp for this event
    #[must_use]
    pub fn timestamp(&self) -> &str {
        match self {
            Self::ProcessExited { exit_info, .. } => &exit_info.timestamp,
            Self::StateChanged { timestamp, .. }
            | Self::BuildFinished { timestamp, .. }
            | Self::ProcessStarted { timestamp, .. }
            | Self::DebuggerAttached { timestamp, .. }
            | Self::AttachSkipped { timestamp, .. }
            | Self::WindowsTiled { timestamp, .. }
            | Self::DebugSessionTerminated { timestamp }
            | Self::Warning { timestamp, .. } => timestamp,
        }
    }

    /// Get the severity level for this event
    #[must_use]
    pub fn severity(&self) -> EventSeverity {
        match self {
            Self::StateChanged { .. }
            | Self::ProcessStarted { .. }
            | Self::DebuggerAttached { .. }
            | Self::DebugSessionTerminated { .. } => EventSeverity::Info,
            Self::WindowsTiled { .. } => EventSeverity::Debug,
            Self::BuildFinished { success, .. } => {
                if *success {
                    EventSeverity::Info
                } else {
                    EventSeverity::Error
                }
            }
            Self::ProcessExited { exit_info, .. } => {
                if exit_info.is_success() {
                    EventSeverity::Info
                } else {
                    EventSeverity::Warning
                }
            }
            Self::AttachSkipped { .. } | Self::Warning { .. } => EventSeverity::Warning,
        }
    }

    /// Create a current timestamp string in RFC3339 format
    #[must_use]
    pub fn current_timestamp() -> String {
        format!(
            "{}Z",
            humantime::format_rfc3339_seconds(SystemTime::now())
                .to_string()
                .trim_end_matches('Z')
        )
    }

    /// Create a state changed event
    #[must_use]
    pub fn state_changed(
        from_state: FleetState,
        to_state: FleetState,
        reason: Option<String>,
    ) -> Self {
        Self::StateChanged {
            from_state,
            to_state,
            timestamp: Self::current_timestamp(),
            reason,
        }
    }

    /// Create a build finished event
    #[must_use]
    pub fn build_finished(solution: String, success: bool) -> Self {
        Self::BuildFinished {
            solution,
            success,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create a process started event
    #[must_use]
    pub fn process_started(project: String, pid: u32, command: String) -> Self {
        Self::ProcessStarted {
            project,
            pid,
            command,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create a process exited event
    #[must_use]
    pub fn process_exited(project: String, exit_info: ProcessExit) -> Self {
        Self::ProcessExited { project, exit_info }
    }

    /// Create a debugger attached event
    #[must_use]
    pub fn debugger_attached(process_name: String, pid: u32) -> Self {
        Self::DebuggerAttached {
            process_name,
            pid,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create an attach skipped event
    #[must_use]
    pub fn attach_skipped(process_name: String) -> Self {
        Self::AttachSkipped {
            process_name,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create a windows tiled event
    #[must_use]
    pub fn windows_tiled(project: String, pid: u32, window_count: usize) -> Self {
        Self::WindowsTiled {
            project,
            pid,
            window_count,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create a debug session terminated event
    #[must_use]
    pub fn debug_session_terminated() -> Self {
        Self::DebugSessionTerminated {
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create a warning event
    #[must_use]
    pub fn warning(message: String, code: Option<String>) -> Self {
        Self::Warning {
            message,
            timestamp: Self::current_timestamp(),
            code,
        }
    }
}
