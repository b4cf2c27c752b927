//! Schema definitions for devfleet
//!
//! This crate contains the shared data structures used across the devfleet
//! workspace: fleet member descriptions, orchestrator states, process exit
//! information, and the event types broadcast by the orchestrator. All types
//! implement JSON Schema generation for external consumption.

pub mod events;
pub mod project;


pub use events::{EventSeverity, FleetEvent};
pub use project::{FleetState, ProcessExit, Project};
