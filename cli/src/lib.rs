//! Rendering helpers for the devfleet CLI
//!
//! The orchestrator's event stream is the CLI's whole user interface:
//! warnings are rendered prominently, everything else as one-line progress
//! notes.

use devfleet_core::FleetConfig;
use schema::{EventSeverity, FleetEvent};

pub mod error;

pub use error::{CliError, Result};

/// One-line rendering of a fleet event
pub fn format_event(event: &FleetEvent) -> String {
    let body = match event {
        FleetEvent::StateChanged {
            from_state,
            to_state,
            reason,
            ..
        } => match reason {
            Some(reason) => format!("fleet {:?} -> {:?} ({})", from_state, to_state, reason),
            None => format!("fleet {:?} -> {:?}", from_state, to_state),
        },
        FleetEvent::BuildFinished {
            solution, success, ..
        } => {
            if *success {
                format!("build succeeded: {}", solution)
            } else {
                format!("build FAILED: {}", solution)
            }
        }
        FleetEvent::ProcessStarted {
            project, pid, command, ..
        } => format!("started {} (pid {}): {}", project, pid, command),
        FleetEvent::ProcessExited {
            project, exit_info, ..
        } => match (exit_info.exit_code, exit_info.signal) {
            (Some(code), _) => format!("{} exited with code {}", project, code),
            (None, Some(signal)) => format!("{} killed by signal {}", project, signal),
            (None, None) => format!("{} exited", project),
        },
        FleetEvent::DebuggerAttached {
            process_name, pid, ..
        } => format!("debugger attached to {} (pid {})", process_name, pid),
        FleetEvent::AttachSkipped { process_name, .. } => {
            format!("no debuggable process matched {}", process_name)
        }
        FleetEvent::WindowsTiled {
            project,
            window_count,
            ..
        } => format!("pinned {} window(s) of {}", window_count, project),
        FleetEvent::DebugSessionTerminated { .. } => "debug session terminated".to_string(),
        FleetEvent::Warning { message, .. } => message.clone(),
    };

    match event.severity() {
        EventSeverity::Warning => format!("!! {}", body),
        EventSeverity::Error => format!("EE {}", body),
        _ => format!("   {}", body),
    }
}

/// Plain-text table of the fleet's projects and flags
pub fn fleet_table(config: &FleetConfig) -> String {
    let mut out = format!("solution: {}\n", config.solution());
    out.push_str(&format!(
        "{:<12} {:>5} {:>7}  {}\n",
        "NAME", "RUN", "ATTACH", "EXECUTABLE"
    ));
    for project in config.projects() {
        out.push_str(&format!(
            "{:<12} {:>5} {:>7}  {}\n",
            project.name(),
            project.run(),
            project.attach(),
            project.executable_path().display()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::ProcessExit;

    #[test]
    fn test_warnings_render_prominently() {
        let event = FleetEvent::warning("Build failed, project: MDA".to_string(), None);
        assert_eq!(format_event(&event), "!! Build failed, project: MDA");
    }

    #[test]
    fn test_failed_build_renders_as_error() {
        let event = FleetEvent::build_finished("AllApps".to_string(), false);
        assert_eq!(format_event(&event), "EE build FAILED: AllApps");
    }

    #[test]
    fn test_signal_exit_rendering() {
        let event = FleetEvent::process_exited(
            "ISA".to_string(),
            ProcessExit {
                pid: 42,
                exit_code: None,
                signal: Some(9),
                timestamp: FleetEvent::current_timestamp(),
            },
        );
        assert_eq!(format_event(&event), "!! ISA killed by signal 9");
    }

    #[test]
    fn test_info_events_are_indented() {
        let event = FleetEvent::debugger_attached("ISA".to_string(), 42);
        assert!(format_event(&event).starts_with("   "));
    }
}
