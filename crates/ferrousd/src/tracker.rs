//! Pending-shutdown tracker.
//!
//! Allowed transitions:
//!
//! ```text
//! Idle --schedule--> Scheduled --cancel--> Cancelled --grace or schedule--> Idle
//!                              --fired---> Executed  --grace or schedule--> Idle
//! ```
//!
//! Time is passed in rather than read so the reset policy can be tested
//! without waiting.

use chrono::{DateTime, Utc};
use ferrous_shared::{ControlError, ShutdownSnapshot, ShutdownState};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Result of a cancel request. Neither variant is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NothingToCancel,
}

/// Identifies one schedule, so a late "fired" signal for an old schedule
/// cannot mark a newer one executed.
pub type ScheduleId = u64;

#[derive(Debug)]
pub struct ShutdownTracker {
    state: ShutdownState,
    scheduled_at: Option<DateTime<Utc>>,
    /// When the current terminal state was entered
    terminal_since: Option<Instant>,
    generation: ScheduleId,
    grace: Duration,
}

impl ShutdownTracker {
    pub fn new(grace: Duration) -> Self {
        Self {
            state: ShutdownState::Idle,
            scheduled_at: None,
            terminal_since: None,
            generation: 0,
            grace,
        }
    }

    /// Current state after applying the reset policy.
    pub fn state(&mut self, now: Instant) -> ShutdownState {
        self.settle(now);
        self.state
    }

    pub fn snapshot(&mut self, now: Instant) -> ShutdownSnapshot {
        self.settle(now);
        ShutdownSnapshot {
            state: self.state,
            scheduled_at: self.scheduled_at,
        }
    }

    /// `Idle -> Scheduled`. A terminal state is reset first.
    pub fn schedule(&mut self, now: Instant) -> Result<ScheduleId, ControlError> {
        self.settle(now);
        match self.state {
            ShutdownState::Scheduled => Err(ControlError::AlreadyScheduled),
            ShutdownState::Cancelled | ShutdownState::Executed => {
                self.reset();
                self.enter_scheduled()
            }
            ShutdownState::Idle => self.enter_scheduled(),
        }
    }

    /// `Scheduled -> Cancelled`; anything else has nothing to cancel.
    pub fn cancel(&mut self, now: Instant) -> CancelOutcome {
        self.settle(now);
        if self.state != ShutdownState::Scheduled {
            debug!("Cancel requested in state {:?}: nothing to cancel", self.state);
            return CancelOutcome::NothingToCancel;
        }
        self.state = ShutdownState::Cancelled;
        self.terminal_since = Some(now);
        info!("Pending shutdown #{} cancelled", self.generation);
        CancelOutcome::Cancelled
    }

    /// `Scheduled -> Executed` for the given schedule only.
    pub fn mark_executed(&mut self, id: ScheduleId, now: Instant) -> bool {
        if self.state != ShutdownState::Scheduled || id != self.generation {
            return false;
        }
        self.state = ShutdownState::Executed;
        self.terminal_since = Some(now);
        info!("Pending shutdown #{} fired", id);
        true
    }

    /// Back to `Idle`; only legal from a terminal state.
    pub fn reset(&mut self) {
        if self.state.is_terminal() {
            debug!("Shutdown tracker reset from {:?}", self.state);
            self.state = ShutdownState::Idle;
            self.scheduled_at = None;
            self.terminal_since = None;
        }
    }

    fn enter_scheduled(&mut self) -> Result<ScheduleId, ControlError> {
        self.generation += 1;
        self.state = ShutdownState::Scheduled;
        self.scheduled_at = Some(Utc::now());
        self.terminal_since = None;
        info!("Shutdown #{} scheduled", self.generation);
        Ok(self.generation)
    }

    fn settle(&mut self, now: Instant) {
        if let Some(since) = self.terminal_since {
            if now.saturating_duration_since(since) >= self.grace {
                self.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(5);

    #[test]
    fn test_schedule_then_cancel() {
        let now = Instant::now();
        let mut tracker = ShutdownTracker::new(GRACE);
        assert_eq!(tracker.state(now), ShutdownState::Idle);

        tracker.schedule(now).unwrap();
        assert_eq!(tracker.state(now), ShutdownState::Scheduled);
        assert!(tracker.snapshot(now).scheduled_at.is_some());

        assert_eq!(tracker.cancel(now), CancelOutcome::Cancelled);
        assert_eq!(tracker.state(now), ShutdownState::Cancelled);
    }

    #[test]
    fn test_second_schedule_is_rejected() {
        let now = Instant::now();
        let mut tracker = ShutdownTracker::new(GRACE);
        tracker.schedule(now).unwrap();
        assert!(matches!(tracker.schedule(now), Err(ControlError::AlreadyScheduled)));
        assert_eq!(tracker.state(now), ShutdownState::Scheduled);
    }

    #[test]
    fn test_cancel_without_schedule_is_nothing_to_cancel() {
        let now = Instant::now();
        let mut tracker = ShutdownTracker::new(GRACE);
        assert_eq!(tracker.cancel(now), CancelOutcome::NothingToCancel);
        assert_eq!(tracker.state(now), ShutdownState::Idle);

        tracker.schedule(now).unwrap();
        tracker.cancel(now);
        // Cancelled is terminal: a second cancel finds nothing
        assert_eq!(tracker.cancel(now), CancelOutcome::NothingToCancel);
        assert_eq!(tracker.state(now), ShutdownState::Cancelled);
    }

    #[test]
    fn test_terminal_states_reset_after_grace() {
        let start = Instant::now();
        let mut tracker = ShutdownTracker::new(GRACE);
        tracker.schedule(start).unwrap();
        tracker.cancel(start);

        assert_eq!(tracker.state(start + Duration::from_secs(4)), ShutdownState::Cancelled);
        let later = start + GRACE;
        assert_eq!(tracker.state(later), ShutdownState::Idle);
        assert_eq!(tracker.snapshot(later).scheduled_at, None);
    }

    #[test]
    fn test_schedule_from_terminal_resets_immediately() {
        let now = Instant::now();
        let mut tracker = ShutdownTracker::new(GRACE);
        let first = tracker.schedule(now).unwrap();
        assert!(tracker.mark_executed(first, now));
        assert_eq!(tracker.state(now), ShutdownState::Executed);

        let second = tracker.schedule(now).unwrap();
        assert_ne!(first, second);
        assert_eq!(tracker.state(now), ShutdownState::Scheduled);
    }

    #[test]
    fn test_stale_fire_signal_is_ignored() {
        let now = Instant::now();
        let mut tracker = ShutdownTracker::new(GRACE);
        let first = tracker.schedule(now).unwrap();
        tracker.cancel(now);
        let second = tracker.schedule(now).unwrap();

        assert!(!tracker.mark_executed(first, now));
        assert_eq!(tracker.state(now), ShutdownState::Scheduled);
        assert!(tracker.mark_executed(second, now));
    }

    #[test]
    fn test_mark_executed_requires_scheduled() {
        let now = Instant::now();
        let mut tracker = ShutdownTracker::new(GRACE);
        assert!(!tracker.mark_executed(0, now));
        assert_eq!(tracker.state(now), ShutdownState::Idle);
    }

    #[test]
    fn test_reset_is_noop_while_scheduled() {
        let now = Instant::now();
        let mut tracker = ShutdownTracker::new(GRACE);
        tracker.schedule(now).unwrap();
        tracker.reset();
        assert_eq!(tracker.state(now), ShutdownState::Scheduled);
    }
}
