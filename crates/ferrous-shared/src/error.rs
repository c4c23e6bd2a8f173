//! Error types for Ferrous Control.
//!
//! Rejected confirmations and cancels with nothing pending are normal
//! outcomes and deliberately absent here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Another confirmation is already pending")]
    ConfirmationBusy,

    #[error("A shutdown is already scheduled")]
    AlreadyScheduled,

    #[error("{0}")]
    PlatformFailure(String),

    #[error("Platform did not respond within {0}s")]
    PlatformTimeout(u64),

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Autostart error: {0}")]
    Autostart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ControlError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::ConfirmationBusy => "confirmation_busy",
            ControlError::AlreadyScheduled => "already_scheduled",
            ControlError::PlatformFailure(_) => "platform_failure",
            ControlError::PlatformTimeout(_) => "platform_timeout",
            ControlError::UnsupportedCommand(_) => "unsupported_command",
            ControlError::NetworkUnavailable(_) => "network_unavailable",
            ControlError::Autostart(_) => "autostart",
            ControlError::Io(_) => "io",
            ControlError::Json(_) => "json",
        }
    }

    /// HTTP status code the network endpoint answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            ControlError::ConfirmationBusy | ControlError::AlreadyScheduled => 409,
            ControlError::UnsupportedCommand(_) => 404,
            ControlError::PlatformTimeout(_) => 504,
            ControlError::NetworkUnavailable(_) => 503,
            ControlError::Json(_) => 400,
            ControlError::PlatformFailure(_)
            | ControlError::Autostart(_)
            | ControlError::Io(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_map_to_409() {
        assert_eq!(ControlError::ConfirmationBusy.http_status(), 409);
        assert_eq!(ControlError::AlreadyScheduled.http_status(), 409);
    }

    #[test]
    fn test_platform_failure_message_is_unchanged() {
        let err = ControlError::PlatformFailure("Failed to execute shutdown: denied".into());
        assert_eq!(err.to_string(), "Failed to execute shutdown: denied");
        assert_eq!(err.code(), "platform_failure");
    }
}
