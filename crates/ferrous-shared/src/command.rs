//! Command vocabulary and the uniform result returned to every caller.

use crate::error::ControlError;
use crate::DEFAULT_VOLUME_STEP;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Commands the control plane knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Shutdown,
    Sleep,
    Restart,
    CancelShutdown,
    VolumeUp,
    VolumeDown,
    SetVolume,
}

impl CommandKind {
    pub const ALL: [CommandKind; 7] = [
        CommandKind::Shutdown,
        CommandKind::Sleep,
        CommandKind::Restart,
        CommandKind::CancelShutdown,
        CommandKind::VolumeUp,
        CommandKind::VolumeDown,
        CommandKind::SetVolume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Shutdown => "shutdown",
            CommandKind::Sleep => "sleep",
            CommandKind::Restart => "restart",
            CommandKind::CancelShutdown => "cancel",
            CommandKind::VolumeUp => "volume_up",
            CommandKind::VolumeDown => "volume_down",
            CommandKind::SetVolume => "set_volume",
        }
    }

    /// Destructive commands wait for a human before reaching the platform.
    pub fn requires_confirmation(&self) -> bool {
        matches!(
            self,
            CommandKind::Shutdown | CommandKind::Sleep | CommandKind::Restart
        )
    }

    /// Title and body of the confirmation prompt for destructive commands.
    pub fn confirmation_prompt(&self) -> Option<(&'static str, &'static str)> {
        match self {
            CommandKind::Shutdown => Some((
                "Confirm Action",
                "Are you sure you want to shutdown the PC?",
            )),
            CommandKind::Sleep => Some((
                "Confirm Action",
                "Are you sure you want to put the PC to sleep?",
            )),
            CommandKind::Restart => Some((
                "Confirm Action",
                "Are you sure you want to restart the PC?",
            )),
            _ => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "shutdown" => Ok(CommandKind::Shutdown),
            "sleep" => Ok(CommandKind::Sleep),
            "restart" | "reboot" => Ok(CommandKind::Restart),
            "cancel" | "cancel_shutdown" => Ok(CommandKind::CancelShutdown),
            "volume_up" | "up" | "increase" => Ok(CommandKind::VolumeUp),
            "volume_down" | "down" | "decrease" => Ok(CommandKind::VolumeDown),
            "set_volume" | "set" => Ok(CommandKind::SetVolume),
            other => Err(ControlError::UnsupportedCommand(other.to_string())),
        }
    }
}

/// A single request to the dispatcher. Built per request, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    /// Volume delta magnitude, or the absolute level for `SetVolume`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i32>,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self { kind, amount: None }
    }

    pub fn with_amount(kind: CommandKind, amount: i32) -> Self {
        Self {
            kind,
            amount: Some(amount),
        }
    }

    pub fn shutdown() -> Self {
        Self::new(CommandKind::Shutdown)
    }

    pub fn sleep() -> Self {
        Self::new(CommandKind::Sleep)
    }

    pub fn restart() -> Self {
        Self::new(CommandKind::Restart)
    }

    pub fn cancel_shutdown() -> Self {
        Self::new(CommandKind::CancelShutdown)
    }

    pub fn volume_up(amount: Option<i32>) -> Self {
        Self {
            kind: CommandKind::VolumeUp,
            amount,
        }
    }

    pub fn volume_down(amount: Option<i32>) -> Self {
        Self {
            kind: CommandKind::VolumeDown,
            amount,
        }
    }

    pub fn set_volume(level: i32) -> Self {
        Self::with_amount(CommandKind::SetVolume, level)
    }

    /// Signed volume delta for relative volume commands.
    ///
    /// The sign comes from the kind, never from the amount, so `VolumeUp(-5)`
    /// still raises the volume. Magnitudes are capped at 100.
    pub fn volume_delta(&self) -> Option<i32> {
        let magnitude = self
            .amount
            .unwrap_or(DEFAULT_VOLUME_STEP)
            .saturating_abs()
            .min(100);
        match self.kind {
            CommandKind::VolumeUp => Some(magnitude),
            CommandKind::VolumeDown => Some(-magnitude),
            _ => None,
        }
    }
}

/// Result handed back to every caller, whatever the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    pub fn cancelled_by_user() -> Self {
        Self::failure("cancelled by user")
    }
}

impl From<ControlError> for CommandResult {
    fn from(err: ControlError) -> Self {
        CommandResult::failure(err.to_string())
    }
}
