//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// Error raised by the IDE automation boundary. The automation layer can
    /// throw spuriously during mode transitions; such errors are flagged as
    /// transient and retried at the call site.
    #[error("Automation error: {message}")]
    AutomationError { message: String, transient: bool },

    #[error("Process error: {0}")]
    ProcessError(String),

    #[error("Window error: {0}")]
    WindowError(String),

    #[error("Orchestrator error: {0}")]
    OrchestratorError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Other(String),
}

impl CoreError {
    /// Construct a transient automation error (retried with backoff)
    pub fn transient_automation(message: impl Into<String>) -> Self {
        CoreError::AutomationError {
            message: message.into(),
            transient: true,
        }
    }

    /// Construct a permanent automation error
    pub fn automation(message: impl Into<String>) -> Self {
        CoreError::AutomationError {
            message: message.into(),
            transient: false,
        }
    }

    /// Whether this error is worth retrying at the automation boundary
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::AutomationError { transient: true, .. })
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::ValidationError(_) => "CORE002",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::AutomationError { .. } => "CORE004",
            CoreError::ProcessError(_) => "CORE005",
            CoreError::WindowError(_) => "CORE006",
            CoreError::OrchestratorError(_) => "CORE007",
            CoreError::IoError(_) => "CORE008",
            CoreError::SerializationError(_) => "CORE009",
            CoreError::Other(_) => "CORE999",
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;

// Convenience implementations
impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CoreError::ConfigurationError("test".to_string()).code(),
            "CORE001"
        );
        assert_eq!(CoreError::transient_automation("test").code(), "CORE004");
        assert_eq!(CoreError::ProcessError("test".to_string()).code(), "CORE005");
        assert_eq!(CoreError::Other("test".to_string()).code(), "CORE999");
    }

    #[test]
    fn test_transient_flag() {
        assert!(CoreError::transient_automation("flaky COM call").is_transient());
        assert!(!CoreError::automation("bad moniker").is_transient());
        assert!(!CoreError::ProcessError("spawn failed".to_string()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let error = CoreError::ConfigurationError("missing solution".to_string());
        assert_eq!(error.to_string(), "Configuration error: missing solution");

        let error = CoreError::transient_automation("RPC unavailable");
        assert_eq!(error.to_string(), "Automation error: RPC unavailable");
    }
}
