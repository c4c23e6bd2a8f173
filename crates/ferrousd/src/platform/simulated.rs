//! In-memory platform for `--simulate` runs and tests.

use super::{PowerPlatform, ShutdownReceipt};
use async_trait::async_trait;
use ferrous_shared::{ControlError, VolumeLevel};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// Calls recorded by the simulated platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformCall {
    Shutdown,
    Sleep,
    Restart,
    CancelShutdown,
    GetVolume,
    SetVolume,
}

#[derive(Debug)]
struct SimState {
    volume: VolumeLevel,
    calls: Vec<PlatformCall>,
    failures: HashMap<PlatformCall, String>,
    latency: Duration,
    shutdown_granularity: Option<Duration>,
}

#[derive(Debug)]
pub struct SimulatedPlatform {
    state: Mutex<SimState>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self::with_volume(VolumeLevel::new(50))
    }

    pub fn with_volume(volume: VolumeLevel) -> Self {
        Self {
            state: Mutex::new(SimState {
                volume,
                calls: Vec::new(),
                failures: HashMap::new(),
                latency: Duration::ZERO,
                shutdown_granularity: None,
            }),
        }
    }

    /// Make every future `call` fail with `message`.
    pub fn fail(&self, call: PlatformCall, message: impl Into<String>) {
        self.lock().failures.insert(call, message.into());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Delay every call, to exercise timeouts.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Round shutdown delays up to a multiple of `step`, as `shutdown -h +N`
    /// does with whole minutes.
    pub fn set_shutdown_granularity(&self, step: Duration) {
        self.lock().shutdown_granularity = Some(step);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, call: PlatformCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    /// Out-of-band volume change, as another application would make.
    pub fn set_volume_externally(&self, volume: VolumeLevel) {
        self.lock().volume = volume;
    }

    pub fn volume(&self) -> VolumeLevel {
        self.lock().volume
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn record(&self, call: PlatformCall) -> Result<(), ControlError> {
        let latency = {
            let mut state = self.lock();
            state.calls.push(call);
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.lock().failures.get(&call) {
            Some(message) => Err(ControlError::PlatformFailure(message.clone())),
            None => Ok(()),
        }
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PowerPlatform for SimulatedPlatform {
    async fn shutdown(&self, delay: Duration) -> Result<ShutdownReceipt, ControlError> {
        self.record(PlatformCall::Shutdown).await?;
        let fires_in = match self.lock().shutdown_granularity {
            Some(step) if !step.is_zero() => {
                let steps = delay.as_secs().div_ceil(step.as_secs().max(1)).max(1);
                Duration::from_secs(steps * step.as_secs().max(1))
            }
            _ => delay,
        };
        info!("[simulated] shutdown in {}s", fires_in.as_secs());
        Ok(ShutdownReceipt {
            message: format!("Shutdown scheduled in {} seconds", fires_in.as_secs()),
            fires_in,
        })
    }

    async fn sleep(&self) -> Result<String, ControlError> {
        self.record(PlatformCall::Sleep).await?;
        info!("[simulated] sleep");
        Ok("Sleep command executed".to_string())
    }

    async fn restart(&self) -> Result<String, ControlError> {
        self.record(PlatformCall::Restart).await?;
        info!("[simulated] restart");
        Ok("Restart command executed".to_string())
    }

    async fn cancel_shutdown(&self) -> Result<String, ControlError> {
        self.record(PlatformCall::CancelShutdown).await?;
        info!("[simulated] cancel shutdown");
        Ok("Shutdown cancelled".to_string())
    }

    async fn get_volume(&self) -> Result<VolumeLevel, ControlError> {
        self.record(PlatformCall::GetVolume).await?;
        Ok(self.lock().volume)
    }

    async fn set_volume(&self, level: VolumeLevel) -> Result<VolumeLevel, ControlError> {
        self.record(PlatformCall::SetVolume).await?;
        self.lock().volume = level;
        Ok(level)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_granularity_rounds_up() {
        let platform = SimulatedPlatform::new();
        platform.set_shutdown_granularity(Duration::from_secs(60));
        let receipt = platform.shutdown(Duration::from_secs(30)).await.unwrap();
        assert_eq!(receipt.fires_in, Duration::from_secs(60));
        assert_eq!(receipt.message, "Shutdown scheduled in 60 seconds");
    }

    #[tokio::test]
    async fn test_adjust_clamps_at_max() {
        let platform = SimulatedPlatform::with_volume(VolumeLevel::new(99));
        let level = platform.increase_volume(2).await.unwrap();
        assert_eq!(level.percent(), 100);
        assert_eq!(platform.volume().percent(), 100);
    }

    #[tokio::test]
    async fn test_decrease_ignores_amount_sign() {
        let platform = SimulatedPlatform::with_volume(VolumeLevel::new(10));
        let level = platform.decrease_volume(-4).await.unwrap();
        assert_eq!(level.percent(), 6);
    }

    #[tokio::test]
    async fn test_injected_failure_is_reported_and_recorded() {
        let platform = SimulatedPlatform::new();
        platform.fail(PlatformCall::Sleep, "Failed to execute sleep: no permission");

        let err = platform.sleep().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to execute sleep: no permission");
        assert_eq!(platform.call_count(PlatformCall::Sleep), 1);

        platform.clear_failures();
        assert!(platform.sleep().await.is_ok());
    }
}
