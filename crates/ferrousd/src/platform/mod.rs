//! Platform power/audio interface.
//!
//! The dispatcher treats every call as opaque, possibly slow and possibly
//! failing. Success carries a human-readable message; failure carries
//! `ControlError::PlatformFailure` with the message to show.

pub mod simulated;
pub mod system;

pub use simulated::{PlatformCall, SimulatedPlatform};
pub use system::SystemPlatform;

use async_trait::async_trait;
use ferrous_shared::{ControlError, VolumeLevel};
use std::time::Duration;

/// What the OS actually agreed to when a shutdown was scheduled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReceipt {
    pub message: String,
    /// Delay the OS applied; may be longer than requested (whole minutes on Linux)
    pub fires_in: Duration,
}

#[async_trait]
pub trait PowerPlatform: Send + Sync {
    /// Schedule a shutdown that fires no earlier than `delay`.
    async fn shutdown(&self, delay: Duration) -> Result<ShutdownReceipt, ControlError>;

    async fn sleep(&self) -> Result<String, ControlError>;

    async fn restart(&self) -> Result<String, ControlError>;

    /// Abort a shutdown scheduled by `shutdown`.
    async fn cancel_shutdown(&self) -> Result<String, ControlError>;

    async fn get_volume(&self) -> Result<VolumeLevel, ControlError>;

    /// Set an absolute level; returns the level actually applied.
    async fn set_volume(&self, level: VolumeLevel) -> Result<VolumeLevel, ControlError>;

    /// Read, apply a clamped delta, write back.
    async fn adjust_volume(&self, delta: i32) -> Result<VolumeLevel, ControlError> {
        let current = self.get_volume().await?;
        self.set_volume(current.adjusted(delta)).await
    }

    async fn increase_volume(&self, amount: i32) -> Result<VolumeLevel, ControlError> {
        self.adjust_volume(amount.saturating_abs()).await
    }

    async fn decrease_volume(&self, amount: i32) -> Result<VolumeLevel, ControlError> {
        self.adjust_volume(-amount.saturating_abs()).await
    }

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
