//! Status channel - the latest human-readable outcome, auto-expiring.
//!
//! One value per front end. Each publish replaces the previous one, so a
//! burst of commands only ever shows the last outcome.

use ferrous_shared::{Severity, StatusView, STATUS_TTL};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Status {
    message: String,
    severity: Severity,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct StatusChannel {
    current: Mutex<Option<Status>>,
    ttl: Duration,
}

impl StatusChannel {
    pub fn new() -> Self {
        Self::with_ttl(STATUS_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            current: Mutex::new(None),
            ttl,
        }
    }

    pub fn publish(&self, message: impl Into<String>, severity: Severity) {
        *self.lock() = Some(Status {
            message: message.into(),
            severity,
            expires_at: Instant::now() + self.ttl,
        });
    }

    /// Live status, or `None` once it has expired.
    pub fn current(&self) -> Option<StatusView> {
        let now = Instant::now();
        let mut current = self.lock();
        match current.as_ref() {
            Some(status) if status.expires_at > now => Some(StatusView {
                message: status.message.clone(),
                severity: status.severity,
                expires_in_ms: (status.expires_at - now).as_millis() as u64,
            }),
            Some(_) => {
                *current = None;
                None
            }
            None => None,
        }
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<Status>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_status_expires_after_ttl() {
        let channel = StatusChannel::new();
        channel.publish("Shutdown scheduled", Severity::Success);

        let live = channel.current().unwrap();
        assert_eq!(live.message, "Shutdown scheduled");
        assert_eq!(live.expires_in_ms, 5_000);

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert!(channel.current().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(channel.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_replaces_and_restarts_expiry() {
        let channel = StatusChannel::new();
        channel.publish("Executing shutdown...", Severity::Info);
        tokio::time::advance(Duration::from_secs(4)).await;
        channel.publish("Volume 52%", Severity::Success);

        tokio::time::advance(Duration::from_secs(3)).await;
        let live = channel.current().unwrap();
        assert_eq!(live.message, "Volume 52%");
        assert_eq!(live.severity, Severity::Success);
    }

    #[test]
    fn test_empty_and_clear() {
        let channel = StatusChannel::new();
        assert!(channel.current().is_none());
        channel.publish("x", Severity::Error);
        channel.clear();
        assert!(channel.current().is_none());
    }
}
