//! Shared types for Ferrous Control components.
//!
//! Everything that crosses a front-end boundary lives here: the command
//! vocabulary, the uniform result shape, status and volume snapshots, and the
//! error taxonomy. The daemon and any client agree on these types.

pub mod command;
pub mod confirmation;
pub mod error;
pub mod power;
pub mod status;
pub mod volume;

pub use command::{Command, CommandKind, CommandResult};
pub use confirmation::{ConfirmationOutcome, ConfirmationRequest};
pub use error::ControlError;
pub use power::{ShutdownSnapshot, ShutdownState};
pub use status::{Severity, StatusView};
pub use volume::{VolumeLevel, VolumeResponse};

use std::time::Duration;

/// Fixed port of the network control endpoint.
pub const DEFAULT_PORT: u16 = 7777;

/// Volume delta used when a volume command carries no amount.
pub const DEFAULT_VOLUME_STEP: i32 = 2;

/// How long a published status stays visible.
pub const STATUS_TTL: Duration = Duration::from_secs(5);

/// Minimum delay before a volume read is expected to reflect a mutation.
pub const VOLUME_REPOLL_DELAY: Duration = Duration::from_millis(300);

/// Placeholder shown when the LAN address cannot be resolved.
pub const UNKNOWN_ADDRESS: &str = "Unable to get IP";
