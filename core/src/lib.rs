//! Core functionality for the devfleet project
//!
//! This crate contains the orchestration engine: configuration loading,
//! the IDE automation boundary, the worker process boundary, window
//! tiling, and the fleet orchestrator task that ties them together.

pub mod config;
pub mod error;
pub mod ide;
pub mod orchestrator;
pub mod process;
pub mod retry;
pub mod window;

// Re-export schema types for convenience
pub use schema::*;

pub use config::FleetConfig;
pub use error::{CoreError, Result};
pub use orchestrator::{spawn_orchestrator, OrchestratorHandle};
pub use retry::RetryPolicy;

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
