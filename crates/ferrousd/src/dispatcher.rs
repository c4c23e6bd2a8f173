//! Command dispatcher - the single entry point for every front end
//!
//! Flow for one command:
//! 1. destructive kinds pass the confirmation gate (network callers are
//!    pre-confirmed by their own browser unless configured otherwise)
//! 2. the platform is invoked under a bounded timeout
//! 3. shutdown/cancel update the tracker while holding the schedule lock,
//!    so a cancel that reports success can never be overtaken by the
//!    shutdown it cancelled
//! 4. the outcome is published to the caller's status channel

use crate::config::Config;
use crate::gate::ConfirmationGate;
use crate::platform::PowerPlatform;
use crate::status::StatusChannel;
use crate::tracker::{CancelOutcome, ScheduleId, ShutdownTracker};
use ferrous_shared::{
    Command, CommandKind, CommandResult, ControlError, Severity, ShutdownSnapshot,
    ShutdownState, StatusView, VolumeLevel, VolumeResponse,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Message returned when a cancel finds nothing pending.
pub const NOTHING_TO_CANCEL: &str = "No shutdown is pending; nothing to cancel";

/// Which front end issued a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// The in-process control panel, which can answer confirmations
    Local,
    /// A LAN peer over the HTTP endpoint
    Network,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => f.write_str("local"),
            Origin::Network => f.write_str("network"),
        }
    }
}

/// Knobs the dispatcher needs, lifted out of [`Config`]
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub shutdown_delay: Duration,
    pub platform_timeout: Duration,
    pub reset_grace: Duration,
    pub confirmation_timeout: Option<Duration>,
    pub require_network_confirmation: bool,
    pub network_confirmation_timeout: Duration,
    pub repoll_delay: Duration,
}

impl DispatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            shutdown_delay: config.shutdown_delay(),
            platform_timeout: config.platform_timeout(),
            reset_grace: config.reset_grace(),
            confirmation_timeout: config.confirmation.timeout(),
            require_network_confirmation: config.confirmation.require_for_network,
            network_confirmation_timeout: config.confirmation.network_timeout(),
            repoll_delay: config.repoll_delay(),
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct CommandDispatcher {
    platform: Arc<dyn PowerPlatform>,
    gate: Arc<ConfirmationGate>,
    /// Serializes every schedule-touching platform call
    tracker: Arc<Mutex<ShutdownTracker>>,
    local_status: StatusChannel,
    network_status: StatusChannel,
    settings: DispatcherSettings,
}

impl CommandDispatcher {
    pub fn new(platform: Arc<dyn PowerPlatform>, settings: DispatcherSettings) -> Self {
        Self {
            gate: Arc::new(ConfirmationGate::new(settings.confirmation_timeout)),
            tracker: Arc::new(Mutex::new(ShutdownTracker::new(settings.reset_grace))),
            local_status: StatusChannel::new(),
            network_status: StatusChannel::new(),
            platform,
            settings,
        }
    }

    pub fn from_config(config: &Config, platform: Arc<dyn PowerPlatform>) -> Self {
        Self::new(platform, DispatcherSettings::from_config(config))
    }

    pub fn gate(&self) -> &Arc<ConfirmationGate> {
        &self.gate
    }

    pub fn platform_name(&self) -> &'static str {
        self.platform.name()
    }

    /// Run one command and publish its outcome to the caller's status.
    ///
    /// `Err` is reserved for dispatcher-level failures (busy gate, already
    /// scheduled, platform failure or timeout); a rejected confirmation or an
    /// empty cancel is an `Ok` result.
    pub async fn execute(
        &self,
        command: Command,
        origin: Origin,
    ) -> Result<CommandResult, ControlError> {
        info!("[{}] {} requested", origin, command.kind);
        let outcome = self.run(command, origin).await;

        let status = self.status_channel(origin);
        match &outcome {
            Ok(result) => {
                info!(
                    "[{}] {} -> success={} ({})",
                    origin, command.kind, result.success, result.message
                );
                status.publish(result.message.clone(), Severity::for_result(result));
            }
            Err(e) => {
                warn!(
                    "[{}] {} failed [{}]: {}",
                    origin,
                    command.kind,
                    e.code(),
                    e
                );
                status.publish(e.to_string(), Severity::Error);
            }
        }
        outcome
    }

    /// [`execute`](Self::execute) with failures folded into the result.
    pub async fn execute_uniform(&self, command: Command, origin: Origin) -> CommandResult {
        self.execute(command, origin)
            .await
            .unwrap_or_else(CommandResult::from)
    }

    /// Best-effort volume snapshot; never cached.
    pub async fn volume(&self) -> Result<VolumeResponse, ControlError> {
        let volume = self
            .call_platform("volume read", self.platform.get_volume())
            .await?;
        Ok(VolumeResponse {
            volume,
            repoll_after_ms: self.settings.repoll_delay.as_millis() as u64,
        })
    }

    pub async fn shutdown_snapshot(&self) -> ShutdownSnapshot {
        self.tracker.lock().await.snapshot(Instant::now())
    }

    pub fn status(&self, origin: Origin) -> Option<StatusView> {
        self.status_channel(origin).current()
    }

    /// Publish a front-end message that is not a command outcome.
    pub fn publish(&self, origin: Origin, message: impl Into<String>, severity: Severity) {
        self.status_channel(origin).publish(message, severity);
    }

    fn status_channel(&self, origin: Origin) -> &StatusChannel {
        match origin {
            Origin::Local => &self.local_status,
            Origin::Network => &self.network_status,
        }
    }

    async fn run(&self, command: Command, origin: Origin) -> Result<CommandResult, ControlError> {
        match command.kind {
            CommandKind::Shutdown => self.shutdown(origin).await,
            CommandKind::Sleep | CommandKind::Restart => {
                self.immediate_power(command.kind, origin).await
            }
            CommandKind::CancelShutdown => self.cancel_shutdown().await,
            CommandKind::VolumeUp | CommandKind::VolumeDown => self.adjust_volume(command).await,
            CommandKind::SetVolume => self.set_volume(command).await,
        }
    }

    /// Returns true when the command may proceed.
    async fn confirm(&self, kind: CommandKind, origin: Origin) -> Result<bool, ControlError> {
        let Some((title, message)) = kind.confirmation_prompt() else {
            return Ok(true);
        };

        let outcome = match origin {
            Origin::Local => self.gate.request(title, message).await?,
            Origin::Network if self.settings.require_network_confirmation => {
                self.gate
                    .request_with_timeout(
                        title,
                        message,
                        Some(self.settings.network_confirmation_timeout),
                    )
                    .await?
            }
            Origin::Network => {
                debug!("{} confirmed by the remote client", kind);
                return Ok(true);
            }
        };
        Ok(outcome.is_approved())
    }

    async fn shutdown(&self, origin: Origin) -> Result<CommandResult, ControlError> {
        // Refuse before prompting a human for something that cannot happen.
        if self.tracker.lock().await.state(Instant::now()) == ShutdownState::Scheduled {
            return Err(ControlError::AlreadyScheduled);
        }

        if !self.confirm(CommandKind::Shutdown, origin).await? {
            return Ok(CommandResult::cancelled_by_user());
        }
        self.publish(origin, "Executing shutdown...", Severity::Info);

        let mut tracker = self.tracker.lock().await;
        // Another approved shutdown may have won while we waited.
        if tracker.state(Instant::now()) == ShutdownState::Scheduled {
            return Err(ControlError::AlreadyScheduled);
        }

        let receipt = self
            .call_platform(
                "shutdown",
                self.platform.shutdown(self.settings.shutdown_delay),
            )
            .await?;
        let id = tracker.schedule(Instant::now())?;
        drop(tracker);

        // Never mark executed before the OS could actually have fired.
        self.arm_fire_timer(id, receipt.fires_in.max(self.settings.shutdown_delay));
        Ok(CommandResult::ok(receipt.message))
    }

    async fn cancel_shutdown(&self) -> Result<CommandResult, ControlError> {
        let mut tracker = self.tracker.lock().await;
        if tracker.state(Instant::now()) != ShutdownState::Scheduled {
            return Ok(CommandResult::ok(NOTHING_TO_CANCEL));
        }

        let message = self
            .call_platform("cancel", self.platform.cancel_shutdown())
            .await?;
        match tracker.cancel(Instant::now()) {
            CancelOutcome::Cancelled => Ok(CommandResult::ok(message)),
            CancelOutcome::NothingToCancel => Ok(CommandResult::ok(NOTHING_TO_CANCEL)),
        }
    }

    /// Sleep and restart: gated, not cancellable, outside the schedule lock.
    async fn immediate_power(
        &self,
        kind: CommandKind,
        origin: Origin,
    ) -> Result<CommandResult, ControlError> {
        if !self.confirm(kind, origin).await? {
            return Ok(CommandResult::cancelled_by_user());
        }
        self.publish(origin, format!("Executing {}...", kind), Severity::Info);

        let message = match kind {
            CommandKind::Restart => self.call_platform("restart", self.platform.restart()).await?,
            _ => self.call_platform("sleep", self.platform.sleep()).await?,
        };
        Ok(CommandResult::ok(message))
    }

    async fn adjust_volume(&self, command: Command) -> Result<CommandResult, ControlError> {
        let delta = command
            .volume_delta()
            .ok_or_else(|| ControlError::UnsupportedCommand(command.kind.to_string()))?;
        let level = self
            .call_platform("volume change", self.platform.adjust_volume(delta))
            .await?;
        let verb = if delta >= 0 { "increased" } else { "decreased" };
        Ok(CommandResult::ok(format!("Volume {} to {}", verb, level)))
    }

    async fn set_volume(&self, command: Command) -> Result<CommandResult, ControlError> {
        let level = command.amount.ok_or_else(|| {
            ControlError::UnsupportedCommand("set_volume without a level".to_string())
        })?;
        let level = self
            .call_platform(
                "volume change",
                self.platform.set_volume(VolumeLevel::new(level)),
            )
            .await?;
        Ok(CommandResult::ok(format!("Volume set to {}", level)))
    }

    /// Every platform call is bounded; expiry leaves state untouched.
    async fn call_platform<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T, ControlError>>,
    ) -> Result<T, ControlError> {
        match tokio::time::timeout(self.settings.platform_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("Platform {} failed ({}): {}", what, self.platform.name(), e);
                Err(e)
            }
            Err(_) => {
                let secs = self.settings.platform_timeout.as_secs();
                error!("Platform {} timed out after {}s", what, secs);
                Err(ControlError::PlatformTimeout(secs))
            }
        }
    }

    /// The OS fires the shutdown on its own after the delay; mirror that.
    fn arm_fire_timer(&self, id: ScheduleId, delay: Duration) {
        let tracker = Arc::clone(&self.tracker);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut tracker = tracker.lock().await;
            if !tracker.mark_executed(id, Instant::now()) {
                debug!("Shutdown #{} no longer pending when its timer elapsed", id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PlatformCall, SimulatedPlatform};

    fn dispatcher_with(platform: Arc<SimulatedPlatform>) -> CommandDispatcher {
        CommandDispatcher::new(platform, DispatcherSettings::default())
    }

    #[tokio::test]
    async fn test_network_shutdown_is_pre_confirmed() {
        let platform = Arc::new(SimulatedPlatform::new());
        let dispatcher = dispatcher_with(platform.clone());

        let result = dispatcher
            .execute(Command::shutdown(), Origin::Network)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(platform.call_count(PlatformCall::Shutdown), 1);
        assert!(!dispatcher.gate().is_pending());
        assert_eq!(
            dispatcher.shutdown_snapshot().await.state,
            ShutdownState::Scheduled
        );
    }

    #[tokio::test]
    async fn test_status_is_per_origin() {
        let platform = Arc::new(SimulatedPlatform::with_volume(VolumeLevel::new(40)));
        let dispatcher = dispatcher_with(platform);

        dispatcher
            .execute(Command::volume_up(None), Origin::Network)
            .await
            .unwrap();

        assert_eq!(
            dispatcher.status(Origin::Network).map(|s| s.message),
            Some("Volume increased to 42%".to_string())
        );
        assert!(dispatcher.status(Origin::Local).is_none());
    }

    #[tokio::test]
    async fn test_failure_publishes_error_status() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.fail(PlatformCall::SetVolume, "Failed to change volume: no mixer");
        let dispatcher = dispatcher_with(platform);

        let err = dispatcher
            .execute(Command::volume_down(Some(5)), Origin::Local)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to change volume: no mixer");

        let status = dispatcher.status(Origin::Local).unwrap();
        assert_eq!(status.severity, Severity::Error);
        assert_eq!(status.message, "Failed to change volume: no mixer");
    }

    #[tokio::test]
    async fn test_set_volume_requires_level() {
        let dispatcher = dispatcher_with(Arc::new(SimulatedPlatform::new()));
        let err = dispatcher
            .execute(Command::new(CommandKind::SetVolume), Origin::Network)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::UnsupportedCommand(_)));
    }

    #[tokio::test]
    async fn test_volume_snapshot_carries_repoll_hint() {
        let platform = Arc::new(SimulatedPlatform::with_volume(VolumeLevel::new(30)));
        let dispatcher = dispatcher_with(platform);
        let snapshot = dispatcher.volume().await.unwrap();
        assert_eq!(snapshot.volume, VolumeLevel::new(30));
        assert_eq!(snapshot.repoll_after_ms, 300);
    }
}
